//! Removal of injected current-directory shims.
//!
//! The upstream step injects `__dirname`/`__filename` declarations built
//! from `import.meta.url` so ESM output can emulate the CommonJS globals.
//! After conversion the runtime provides both implicitly, so every
//! recognized spelling of the shim declaration is deleted. Re-run after
//! path fixing: rewriting a require argument can expose a shim that was
//! embedded in a now-rewritten expression.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    // Covers the helper-call form `dirname(fileURLToPath(import.meta.url))`,
    // the qualified `path.dirname(...)` form, the literal-require form
    // `require("url").fileURLToPath(...)`, and the `new URL(".", ...)`
    // variant, in either quote style.
    static ref DIRNAME_SHIM_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:const|let|var)\s+(__dirname|__filename)\s*=\s*[^;\n]*import\.meta\.url[^;\n]*;?[ \t]*$"
    )
    .unwrap();
}

pub fn strip_shims(content: &str) -> String {
    DIRNAME_SHIM_RE
        .replace_all(content, |caps: &Captures| {
            format!("// {} is provided by the CommonJS runtime", &caps[1])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_every_recognized_spelling() {
        let src = "\
const __filename = fileURLToPath(import.meta.url);
const __dirname = path.dirname(fileURLToPath(import.meta.url));
let __dirname = dirname(fileURLToPath(import.meta.url))
var __dirname = require('url').fileURLToPath(import.meta.url);
const __dirname = new URL('.', import.meta.url).pathname;
";
        let out = strip_shims(src);
        assert!(!out.contains("import.meta.url"));
        assert_eq!(
            out.matches("// __dirname is provided by the CommonJS runtime").count(),
            4
        );
        assert!(out.contains("// __filename is provided by the CommonJS runtime"));
    }

    #[test]
    fn leaves_ordinary_declarations_alone() {
        let src = "const dir = path.dirname(file);\n";
        assert_eq!(strip_shims(src), src);
    }

    #[test]
    fn stripping_is_idempotent() {
        let src = "const __dirname = dirname(fileURLToPath(import.meta.url));\n";
        let once = strip_shims(src);
        assert_eq!(strip_shims(&once), once);
    }
}
