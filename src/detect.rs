//! Module-dialect detection.
//!
//! Pattern-based classification of file content as ES-module syntax,
//! already-converted CommonJS, or a mix of both. A file can be mixed when
//! the upstream build only partially converted it; the orchestrator runs
//! both the full rewrite and the path passes over those.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Declarative import/export forms that only exist in ES modules.
    static ref ESM_PATTERNS: Vec<Regex> = vec![
        // import { a, b as c } from "m"
        Regex::new(r#"(?m)^\s*import\s*\{"#).unwrap(),
        // import X from "m"  /  import X, { a } from "m"
        Regex::new(r#"(?m)^\s*import\s+[A-Za-z_$][\w$]*\s*(,|\s+from\b)"#).unwrap(),
        // import * as X from "m"
        Regex::new(r#"(?m)^\s*import\s*\*\s*as\s+"#).unwrap(),
        // import "m"
        Regex::new(r#"(?m)^\s*import\s*['"]"#).unwrap(),
        // import type { T } from "m"
        Regex::new(r#"(?m)^\s*import\s+type\b"#).unwrap(),
        // await import("m") / import("m")
        Regex::new(r#"\bimport\s*\("#).unwrap(),
        // import.meta accessors
        Regex::new(r#"\bimport\.meta\."#).unwrap(),
        Regex::new(r#"(?m)^\s*export\s+default\b"#).unwrap(),
        // export { ... }  (including the bare "export {};" marker)
        Regex::new(r#"(?m)^\s*export\s*\{"#).unwrap(),
        Regex::new(r#"(?m)^\s*export\s*\*\s*from\b"#).unwrap(),
        Regex::new(r#"(?m)^\s*export\s+(const|let|var|function|class|async\s+function)\b"#)
            .unwrap(),
        Regex::new(r#"(?m)^\s*export\s+enum\b"#).unwrap(),
        Regex::new(r#"(?m)^\s*export\s+(type|interface)\b"#).unwrap(),
    ];

    /// Runtime markers of the dynamic loader dialect.
    static ref CJS_PATTERNS: Vec<Regex> = vec![
        Regex::new(r#"\brequire\s*\("#).unwrap(),
        Regex::new(r#"\bmodule\.exports\b"#).unwrap(),
        Regex::new(r#"(?m)^\s*exports\.[\w$]+\s*="#).unwrap(),
        Regex::new(r#"__esModule"#).unwrap(),
    ];
}

/// Classification of a single file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub is_esm: bool,
    pub is_cjs: bool,
}

impl Dialect {
    /// Both dialects present: the upstream step converted the file only
    /// partially, so the syntax rewrite has to run again.
    pub fn is_mixed(&self) -> bool {
        self.is_esm && self.is_cjs
    }

    /// Neither dialect present: the file is passed through with
    /// path-fixing only.
    pub fn is_plain(&self) -> bool {
        !self.is_esm && !self.is_cjs
    }
}

pub fn classify(content: &str) -> Dialect {
    let is_esm = ESM_PATTERNS.iter().any(|re| re.is_match(content));
    let is_cjs =
        has_strict_prologue(content) && CJS_PATTERNS.iter().any(|re| re.is_match(content));
    Dialect { is_esm, is_cjs }
}

pub fn has_strict_prologue(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with("\"use strict\"") || trimmed.starts_with("'use strict'")
}

/// A file whose content is empty (or exactly the bare strict-mode
/// prologue) is a dead build artifact: it is deleted instead of rewritten.
pub fn is_dead_artifact(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.is_empty() || trimmed == "\"use strict\";" || trimmed == "'use strict';"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_named_import_as_esm() {
        let d = classify("import { Router } from \"express\";\n");
        assert!(d.is_esm);
        assert!(!d.is_cjs);
    }

    #[test]
    fn classifies_export_forms_as_esm() {
        for src in [
            "export default app;\n",
            "export { a, b as c };\n",
            "export * from \"./models.mjs\";\n",
            "export const PORT = 3000;\n",
            "export enum Status { Active }\n",
            "export interface User { id: string }\n",
            "export {};\n",
        ] {
            assert!(classify(src).is_esm, "not detected: {src}");
        }
    }

    #[test]
    fn classifies_converted_output_as_cjs() {
        let src = "\"use strict\";\nconst { Router } = require(\"express\");\nmodule.exports.router = router;\n";
        let d = classify(src);
        assert!(d.is_cjs);
        assert!(!d.is_esm);
    }

    #[test]
    fn prologue_alone_is_not_cjs() {
        let d = classify("\"use strict\";\nconst x = 1;\n");
        assert!(!d.is_cjs);
    }

    #[test]
    fn require_without_prologue_is_not_cjs() {
        // The upstream emitter always writes the prologue; without it the
        // require call is not trusted as a conversion marker.
        let d = classify("const x = require(\"./x.cjs\");\n");
        assert!(!d.is_cjs);
    }

    #[test]
    fn partially_converted_file_is_mixed() {
        let src = "\"use strict\";\nconst { api } = require(\"./api.cjs\");\nexport default api;\n";
        let d = classify(src);
        assert!(d.is_mixed());
    }

    #[test]
    fn plain_script_is_neither() {
        let d = classify("const answer = 42;\nconsole.log(answer);\n");
        assert!(d.is_plain());
    }

    #[test]
    fn dead_artifacts() {
        assert!(is_dead_artifact(""));
        assert!(is_dead_artifact("   \n\n"));
        assert!(is_dead_artifact("\"use strict\";\n"));
        assert!(is_dead_artifact("'use strict';"));
        assert!(!is_dead_artifact("\"use strict\";\nconst x = 1;"));
    }
}
