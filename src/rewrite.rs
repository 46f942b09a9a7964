//! ESM → CommonJS syntax rewriting.
//!
//! An ordered list of narrow textual substitution rules, no AST. Each rule
//! targets one construct shape of the upstream compiler's output and is
//! independently testable; ordering matters because later rules assume
//! earlier ones already fired (dynamic `import()` calls are folded before
//! anything that would re-interpret a remaining `import` keyword, the
//! `react` combined-import rule only sees lines the generic import rules
//! left alone).
//!
//! Rules are purely textual and cannot fail; correctness is carried by the
//! per-rule round-trip tests in `rewrite_tests.rs`.

use std::path::Path;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;

use crate::detect::has_strict_prologue;

// ═══════════════════════════════════════════════════════════════════════════════
// RULE TABLE
// ═══════════════════════════════════════════════════════════════════════════════

type RuleFn = fn(&str) -> String;

/// The rewrite rules in their required order, tagged by rule class.
pub const RULES: &[(&str, RuleFn)] = &[
    ("env-constants", rewrite_env_accessors),
    ("named-imports", rewrite_named_imports),
    ("default-imports", rewrite_default_imports),
    ("side-effect-imports", rewrite_side_effect_imports),
    ("namespace-imports", rewrite_namespace_imports),
    ("dynamic-imports", rewrite_dynamic_imports),
    ("default-exports", rewrite_default_exports),
    ("named-export-lists", rewrite_named_export_lists),
    ("re-export-all", rewrite_reexport_all),
    ("declaration-exports", rewrite_declaration_exports),
    ("empty-export-markers", remove_empty_export_markers),
    ("type-only-constructs", remove_type_only_constructs),
    ("enum-exports", rewrite_enum_exports),
    ("react-hook-imports", rewrite_react_hook_imports),
];

/// Apply every rule in order, then the final cleanup. Returns the input
/// unchanged (byte-identical) when no rule fires.
pub fn rewrite(content: &str, file_path: &Path) -> String {
    let mut out = content.to_string();
    for (class, rule) in RULES {
        let next = rule(&out);
        if next != out {
            debug!(rule = %class, file = %file_path.display(), "rewrite rule fired");
        }
        out = next;
    }

    if out == content {
        return out;
    }

    out = cleanup(&out);
    if out.trim().is_empty() {
        return "\"use strict\";\n".to_string();
    }
    if !has_strict_prologue(&out) {
        out = format!("\"use strict\";\n\n{}", out);
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPECIFIER HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Relative specifiers carrying a source extension are retargeted to the
/// canonical output extension at substitution time; everything else is
/// left for the tree-wide path fixer.
fn normalize_specifier(spec: &str) -> String {
    if spec.starts_with('.') && !spec.ends_with(".min.js") && !spec.ends_with(".min.mjs") {
        if let Some(stem) = spec.strip_suffix(".mjs") {
            return format!("{}.cjs", stem);
        }
        if let Some(stem) = spec.strip_suffix(".js") {
            return format!("{}.cjs", stem);
        }
    }
    spec.to_string()
}

/// `a, b as c` → `a, b: c` for a destructuring require binding.
fn destructure_bindings(list: &str) -> String {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(" as ") {
            Some((local, alias)) => format!("{}: {}", local.trim(), alias.trim()),
            None => entry.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULE 1: COMPILE-TIME ENVIRONMENT CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref ENV_DEV_RE: Regex = Regex::new(r"import\.meta\.env\.DEV\b").unwrap();
    static ref ENV_PROD_RE: Regex = Regex::new(r"import\.meta\.env\.PROD\b").unwrap();
    static ref ENV_VAR_RE: Regex = Regex::new(r"import\.meta\.env\.([A-Za-z_$][\w$]*)").unwrap();
}

fn rewrite_env_accessors(content: &str) -> String {
    let out = ENV_DEV_RE.replace_all(content, "(process.env.NODE_ENV !== \"production\")");
    let out = ENV_PROD_RE.replace_all(&out, "(process.env.NODE_ENV === \"production\")");
    ENV_VAR_RE
        .replace_all(&out, "process.env.${1}")
        .into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULES 2-6: IMPORT FORMS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref NAMED_IMPORT_RE: Regex =
        Regex::new(r#"(?m)^([ \t]*)import\s*\{([^}]*)\}\s*from\s*(['"])([^'"]+)['"]\s*;?"#)
            .unwrap();
    static ref DEFAULT_IMPORT_RE: Regex =
        Regex::new(r#"(?m)^([ \t]*)import\s+([A-Za-z_$][\w$]*)\s+from\s*(['"])([^'"]+)['"]\s*;?"#)
            .unwrap();
    static ref SIDE_EFFECT_IMPORT_RE: Regex =
        Regex::new(r#"(?m)^([ \t]*)import\s*(['"])([^'"]+)['"]\s*;?"#).unwrap();
    static ref NAMESPACE_IMPORT_RE: Regex = Regex::new(
        r#"(?m)^([ \t]*)import\s*\*\s*as\s+([A-Za-z_$][\w$]*)\s+from\s*(['"])([^'"]+)['"]\s*;?"#
    )
    .unwrap();
    static ref AWAIT_DYNAMIC_IMPORT_RE: Regex = Regex::new(r"await\s+import\s*\(").unwrap();
    static ref DYNAMIC_IMPORT_RE: Regex = Regex::new(r"\bimport\s*\(").unwrap();
}

fn rewrite_named_imports(content: &str) -> String {
    NAMED_IMPORT_RE
        .replace_all(content, |caps: &Captures| {
            let quote = &caps[3];
            let spec = normalize_specifier(&caps[4]);
            format!(
                "{}const {{ {} }} = require({}{}{});",
                &caps[1],
                destructure_bindings(&caps[2]),
                quote,
                spec,
                quote
            )
        })
        .into_owned()
}

fn rewrite_default_imports(content: &str) -> String {
    DEFAULT_IMPORT_RE
        .replace_all(content, |caps: &Captures| {
            let quote = &caps[3];
            let spec = normalize_specifier(&caps[4]);
            format!(
                "{}const {} = require({}{}{});",
                &caps[1], &caps[2], quote, spec, quote
            )
        })
        .into_owned()
}

fn rewrite_side_effect_imports(content: &str) -> String {
    SIDE_EFFECT_IMPORT_RE
        .replace_all(content, |caps: &Captures| {
            let quote = &caps[2];
            let spec = normalize_specifier(&caps[3]);
            format!("{}require({}{}{});", &caps[1], quote, spec, quote)
        })
        .into_owned()
}

fn rewrite_namespace_imports(content: &str) -> String {
    NAMESPACE_IMPORT_RE
        .replace_all(content, |caps: &Captures| {
            let quote = &caps[3];
            let spec = normalize_specifier(&caps[4]);
            format!(
                "{}const {} = require({}{}{});",
                &caps[1], &caps[2], quote, spec, quote
            )
        })
        .into_owned()
}

fn rewrite_dynamic_imports(content: &str) -> String {
    let out = AWAIT_DYNAMIC_IMPORT_RE.replace_all(content, "require(");
    DYNAMIC_IMPORT_RE.replace_all(&out, "require(").into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULES 7-11: EXPORT FORMS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref DEFAULT_EXPORT_RE: Regex =
        Regex::new(r"(?m)^([ \t]*)export\s+default\s+").unwrap();
    static ref NAMED_EXPORT_LIST_RE: Regex = Regex::new(
        r#"(?m)^([ \t]*)export\s*\{([^}]*)\}(?:\s*from\s*(['"])([^'"]+)['"])?\s*;?[ \t]*$"#
    )
    .unwrap();
    static ref REEXPORT_ALL_RE: Regex =
        Regex::new(r#"(?m)^([ \t]*)export\s*\*\s*from\s*(['"])([^'"]+)['"]\s*;?"#).unwrap();
    static ref DECL_EXPORT_RE: Regex = Regex::new(
        r"(?m)^([ \t]*)export\s+(async\s+function\s*\*?|function\s*\*?|class|const|let|var)\s+([A-Za-z_$][\w$]*)"
    )
    .unwrap();
    static ref EMPTY_EXPORT_RE: Regex =
        Regex::new(r"(?m)^[ \t]*export\s*\{\s*\}\s*;?[ \t]*\r?\n?").unwrap();
}

fn rewrite_default_exports(content: &str) -> String {
    DEFAULT_EXPORT_RE
        .replace_all(content, "${1}module.exports = ")
        .into_owned()
}

fn rewrite_named_export_lists(content: &str) -> String {
    NAMED_EXPORT_LIST_RE
        .replace_all(content, |caps: &Captures| {
            let indent = &caps[1];
            let entries: Vec<(String, String)> = caps[2]
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(|entry| match entry.split_once(" as ") {
                    Some((local, alias)) => (local.trim().to_string(), alias.trim().to_string()),
                    None => (entry.to_string(), entry.to_string()),
                })
                .collect();
            // `export {};` is the empty marker, handled by its own rule.
            if entries.is_empty() {
                return caps[0].to_string();
            }

            let source = caps.get(4).map(|m| {
                let quote = &caps[3];
                format!("require({}{}{})", quote, normalize_specifier(m.as_str()), quote)
            });
            entries
                .iter()
                .map(|(local, exported)| match &source {
                    Some(require) => {
                        format!("{}module.exports.{} = {}.{};", indent, exported, require, local)
                    }
                    None => format!("{}module.exports.{} = {};", indent, exported, local),
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .into_owned()
}

fn rewrite_reexport_all(content: &str) -> String {
    REEXPORT_ALL_RE
        .replace_all(content, |caps: &Captures| {
            let quote = &caps[2];
            let spec = normalize_specifier(&caps[3]);
            format!(
                "{}Object.assign(module.exports, require({}{}{}));",
                &caps[1], quote, spec, quote
            )
        })
        .into_owned()
}

/// `export const x = ...` → plain declaration, plus one trailing
/// `module.exports.x = x;` per exported name appended at end of file.
fn rewrite_declaration_exports(content: &str) -> String {
    let mut names: Vec<String> = Vec::new();
    let replaced = DECL_EXPORT_RE.replace_all(content, |caps: &Captures| {
        let name = caps[3].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
        format!("{}{} {}", &caps[1], &caps[2], &caps[3])
    });
    if names.is_empty() {
        return replaced.into_owned();
    }

    let mut out = replaced.trim_end().to_string();
    out.push('\n');
    for name in &names {
        out.push_str(&format!("module.exports.{} = {};\n", name, name));
    }
    out
}

fn remove_empty_export_markers(content: &str) -> String {
    EMPTY_EXPORT_RE.replace_all(content, "").into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULE 12: COMPILE-TIME-ONLY CONSTRUCTS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref IMPORT_TYPE_RE: Regex =
        Regex::new(r"(?m)^[ \t]*import\s+type\b[^;]*;[ \t]*\r?\n?").unwrap();
    static ref EXPORT_TYPE_RE: Regex =
        Regex::new(r"(?m)^[ \t]*export\s+type\b[^;]*;[ \t]*\r?\n?").unwrap();
    static ref INTERFACE_BLOCK_RE: Regex = Regex::new(
        r"(?ms)^[ \t]*(?:export\s+)?interface\s+[A-Za-z_$][\w$]*[^\{\n]*\{.*?^\}[ \t]*;?[ \t]*\r?\n?"
    )
    .unwrap();
    static ref INTERFACE_INLINE_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export\s+)?interface\s+[A-Za-z_$][\w$]*[^\{\n]*\{[^\{\}\n]*\}[ \t]*;?[ \t]*\r?\n?"
    )
    .unwrap();
}

fn remove_type_only_constructs(content: &str) -> String {
    let out = IMPORT_TYPE_RE.replace_all(content, "");
    let out = EXPORT_TYPE_RE.replace_all(&out, "");
    let out = INTERFACE_INLINE_RE.replace_all(&out, "");
    INTERFACE_BLOCK_RE.replace_all(&out, "").into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULE 13: ENUMERATED-CONSTANT EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref ENUM_EXPORT_RE: Regex =
        Regex::new(r"(?s)export\s+enum\s+([A-Za-z_$][\w$]*)\s*\{([^}]*)\}").unwrap();
}

fn rewrite_enum_exports(content: &str) -> String {
    ENUM_EXPORT_RE
        .replace_all(content, |caps: &Captures| {
            let name = &caps[1];
            let members: Vec<String> = caps[2]
                .split(',')
                .map(str::trim)
                .filter(|member| !member.is_empty())
                .map(|member| match member.split_once('=') {
                    Some((key, value)) => format!("  {}: {},", key.trim(), value.trim()),
                    // A member with no explicit value defaults to its own
                    // name as a string.
                    None => format!("  {}: \"{}\",", member, member),
                })
                .collect();
            format!(
                "const {} = {{\n{}\n}};\nmodule.exports.{} = {};",
                name,
                members.join("\n"),
                name,
                name
            )
        })
        .into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULE 14: COMBINED DEFAULT+NAMED REACT IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    // `import React, { useState } from "react"`: the generic rules alone
    // produce the wrong shape for this one library, so the default import
    // and the hook destructuring are emitted as a pair.
    static ref REACT_IMPORT_RE: Regex = Regex::new(
        r#"(?m)^([ \t]*)import\s+([A-Za-z_$][\w$]*)\s*,\s*\{([^}]*)\}\s*from\s*(['"])react['"]\s*;?"#
    )
    .unwrap();
}

fn rewrite_react_hook_imports(content: &str) -> String {
    REACT_IMPORT_RE
        .replace_all(content, |caps: &Captures| {
            let indent = &caps[1];
            let default_name = &caps[2];
            let quote = &caps[4];
            format!(
                "{}const {} = require({}react{});\n{}const {{ {} }} = {};",
                indent,
                default_name,
                quote,
                quote,
                indent,
                destructure_bindings(&caps[3]),
                default_name
            )
        })
        .into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// FINAL CLEANUP
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref BLANK_RUN_RE: Regex = Regex::new(r"\n{4,}").unwrap();
}

/// Collapse blank-line runs, drop a stray trailing semicolon line, and
/// re-run the empty-export-marker removal (earlier rules can reveal one
/// that used to sit inside a larger expression).
fn cleanup(content: &str) -> String {
    let out = BLANK_RUN_RE.replace_all(content, "\n\n").into_owned();
    let mut out = out.trim_end().trim_start_matches('\n').to_string();
    if out.lines().last().map(str::trim) == Some(";") {
        if let Some(cut) = out.rfind(';') {
            out.truncate(cut);
        }
        out = out.trim_end().to_string();
    }
    let out = remove_empty_export_markers(&out);
    let mut out = out.trim_end().to_string();
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn rewrite_is_a_no_op_on_converted_content() {
        let src = "\"use strict\";\n\nconst { Router } = require(\"express\");\nmodule.exports.router = Router();\n";
        assert_eq!(rewrite(src, Path::new("a.cjs")), src);
    }

    #[test]
    fn rewrite_inserts_strict_prologue_on_conversion() {
        let out = rewrite("import \"./boot.mjs\";\n", Path::new("a.mjs"));
        assert_eq!(out, "\"use strict\";\n\nrequire(\"./boot.cjs\");\n");
    }

    #[test]
    fn specifier_extension_translation_is_relative_only() {
        assert_eq!(normalize_specifier("./util.mjs"), "./util.cjs");
        assert_eq!(normalize_specifier("../lib/db.js"), "../lib/db.cjs");
        assert_eq!(normalize_specifier("express"), "express");
        assert_eq!(normalize_specifier("chart.js"), "chart.js");
    }

    #[test]
    fn cleanup_collapses_blank_runs_and_trailing_semicolon() {
        let out = cleanup("const a = 1;\n\n\n\n\nconst b = 2;\n;\n");
        assert_eq!(out, "const a = 1;\n\nconst b = 2;\n");
    }
}
