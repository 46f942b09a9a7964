//! Namespace-alias expansion.
//!
//! The upstream compiler leaves `@`-prefixed logical specifiers in its
//! output. Each table entry maps a prefix to a target inside one of two
//! semantic roots: the application subtree (the output root, duplicated
//! one level deeper for files that live under `<output>/src`) or the
//! shared subtree one directory above the referencing file's parent.
//!
//! Matching is first-match in declared order; declaration order is part of
//! the contract, so more specific prefixes are listed first.

use std::path::Path;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::trace;

use crate::resolve::{relative_require_path, ResolutionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasRoot {
    /// Resolved against the output root, falling back to the duplicated
    /// `src` level for files that live under it.
    App,
    /// Resolved one directory above the referencing file's parent. The
    /// fixed one-level offset mirrors the upstream layout and is not
    /// re-derived per file.
    Shared,
}

pub struct AliasEntry {
    /// A prefix ending in `/` matches as a wildcard (the remainder is
    /// appended to `target`); otherwise the literal must match exactly.
    pub prefix: &'static str,
    pub root: AliasRoot,
    pub target: &'static str,
}

/// The reference alias table. Order matters.
pub const ALIAS_TABLE: &[AliasEntry] = &[
    AliasEntry {
        prefix: "@api/modules/",
        root: AliasRoot::App,
        target: "modules/",
    },
    AliasEntry {
        prefix: "@api/",
        root: AliasRoot::App,
        target: "",
    },
    AliasEntry {
        prefix: "@shared/",
        root: AliasRoot::Shared,
        target: "shared/",
    },
    AliasEntry {
        prefix: "@config",
        root: AliasRoot::App,
        target: "config/configuration",
    },
];

lazy_static! {
    static ref ALIAS_LITERAL_RE: Regex = Regex::new(r#"(['"])(@[^'"]*)['"]"#).unwrap();
}

/// Expand every aliased string literal in `content` to a concrete relative
/// path. Returns the rewritten content and the number of literals fixed.
pub fn resolve_aliases(content: &str, file_path: &Path, output_root: &Path) -> (String, usize) {
    let ctx = ResolutionContext::new(file_path, output_root);
    let mut fixed = 0usize;

    let out = ALIAS_LITERAL_RE.replace_all(content, |caps: &Captures| {
        let quote = &caps[1];
        let literal = &caps[2];
        let entry = match lookup(literal) {
            Some(hit) => hit,
            // Scoped package names also start with `@`; anything the table
            // does not claim is external and passes through.
            None => return caps[0].to_string(),
        };

        let logical = expand(entry, literal);
        let concrete = concretize(entry.root, &logical, &ctx);
        trace!(alias = %literal, path = %concrete, file = %ctx.file_path.display(),
               "alias expanded");
        fixed += 1;
        format!("{}{}{}", quote, concrete, quote)
    });

    (out.into_owned(), fixed)
}

fn lookup(literal: &str) -> Option<&'static AliasEntry> {
    ALIAS_TABLE.iter().find(|entry| {
        if entry.prefix.ends_with('/') {
            literal.starts_with(entry.prefix)
        } else {
            literal == entry.prefix
        }
    })
}

fn expand(entry: &AliasEntry, literal: &str) -> String {
    if entry.prefix.ends_with('/') {
        format!("{}{}", entry.target, &literal[entry.prefix.len()..])
    } else {
        entry.target.to_string()
    }
}

fn concretize(root: AliasRoot, logical: &str, ctx: &ResolutionContext) -> String {
    match root {
        AliasRoot::App => {
            if let Some(hit) = probe(&ctx.output_root, logical) {
                return relative_require_path(&ctx.file_dir, Path::new(&hit));
            }
            if ctx.file_dir.starts_with(&ctx.dup_root) {
                if let Some(hit) = probe(&ctx.dup_root, logical) {
                    return relative_require_path(&ctx.file_dir, Path::new(&hit));
                }
            }
            // Unverified but deterministic: naive join with the current
            // directory.
            format!("./{}", logical)
        }
        AliasRoot::Shared => format!("../{}", logical),
    }
}

/// Check the expanded target under `base`, as given, with the canonical
/// extension, and in `index` form. Returns the first real file.
fn probe(base: &Path, logical: &str) -> Option<String> {
    // Appending rather than swapping the extension: dotted basenames like
    // `users.service` are the common case in this output shape.
    for candidate in [
        base.join(logical),
        base.join(format!("{}.cjs", logical)),
        base.join(logical).join("index.cjs"),
    ] {
        if candidate.is_file() {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn verified_app_target_uses_the_real_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "modules/users/service.cjs");

        let file = root.join("modules/health/index.cjs");
        let (out, fixed) = resolve_aliases(
            "const svc = require(\"@api/modules/users/service\");\n",
            &file,
            root,
        );
        assert_eq!(
            out,
            "const svc = require(\"../users/service.cjs\");\n"
        );
        assert_eq!(fixed, 1);
    }

    #[test]
    fn duplicated_root_fallback_applies_to_files_under_it() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/config/configuration.cjs");

        let file = root.join("src/modules/health/index.cjs");
        let (out, _) = resolve_aliases("require(\"@config\");\n", &file, root);
        assert_eq!(out, "require(\"../../config/configuration.cjs\");\n");
    }

    #[test]
    fn unverified_target_falls_back_to_naive_join() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let file = root.join("src/app.cjs");
        let (out, fixed) = resolve_aliases("require(\"@api/missing/thing\");\n", &file, root);
        assert_eq!(out, "require(\"./missing/thing\");\n");
        assert_eq!(fixed, 1);
    }

    #[test]
    fn shared_targets_walk_up_one_from_the_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let file = root.join("src/modules/users/service.cjs");
        let (out, _) = resolve_aliases("require(\"@shared/utils/dates\");\n", &file, root);
        assert_eq!(out, "require(\"../shared/utils/dates\");\n");
    }

    #[test]
    fn declared_order_wins_over_later_entries() {
        // `@api/modules/...` must hit the modules entry, not the generic
        // `@api/` one; both would match by prefix.
        let entry = lookup("@api/modules/users").unwrap();
        assert_eq!(entry.target, "modules/");
        let generic = lookup("@api/jobs/runner").unwrap();
        assert_eq!(generic.target, "");
    }

    #[test]
    fn scoped_packages_are_not_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let file = root.join("app.cjs");
        let src = "require(\"@nestjs/common\");\n";
        let (out, fixed) = resolve_aliases(src, &file, root);
        assert_eq!(out, src);
        assert_eq!(fixed, 0);
    }

    #[test]
    fn resolution_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "modules/users/index.cjs");
        let file = root.join("modules/health/index.cjs");
        let src = "require(\"@api/modules/users\");\n";

        let (first, _) = resolve_aliases(src, &file, root);
        let (second, _) = resolve_aliases(src, &file, root);
        assert_eq!(first, second);
        assert_eq!(first, "require(\"../users/index.cjs\");\n");
    }

    #[test]
    fn naive_join_is_forced_into_relative_form() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let file: PathBuf = root.join("app.cjs");
        let (out, _) = resolve_aliases("require(\"@api/db/pool\");\n", &file, root);
        assert!(out.contains("\"./db/pool\""));
    }
}
