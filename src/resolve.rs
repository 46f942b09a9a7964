//! Dependency path and extension repair.
//!
//! Runs only over files already in CommonJS form. `require(...)` arguments
//! that still carry a source extension, a doubled extension, or no
//! extension at all are resolved against the real tree through an ordered
//! candidate-path search. Candidate generation is a pure function kept
//! separate from the probing step, and the correction table of hard-coded
//! structural offsets is kept separate from the generic search.

use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::{trace, warn};

/// Per-file inputs the resolvers work from. Created per processed file,
/// never persisted.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub file_path: PathBuf,
    pub file_dir: PathBuf,
    /// The duplicated source level (`<output>/src`) the upstream build
    /// introduces; probed as a rooted fallback.
    pub dup_root: PathBuf,
    pub output_root: PathBuf,
}

impl ResolutionContext {
    pub fn new(file_path: &Path, output_root: &Path) -> Self {
        let file_dir = file_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        ResolutionContext {
            file_path: file_path.to_path_buf(),
            file_dir,
            dup_root: output_root.join("src"),
            output_root: output_root.to_path_buf(),
        }
    }
}

/// Result of one file's path-fixing pass.
#[derive(Debug, Default)]
pub struct FixOutcome {
    pub content: String,
    pub fixed: usize,
    /// References nothing on disk matched; a best-guess path was emitted.
    /// Normal outcome for partially built trees, not an error.
    pub unresolved: usize,
}

lazy_static! {
    static ref REQUIRE_ARG_RE: Regex =
        Regex::new(r#"require\s*\(\s*(['"])([^'"]+)['"]\s*\)"#).unwrap();
}

const RESOLVABLE_SOURCE_EXTS: &[&str] = &[".mjs", ".js"];
const OPAQUE_EXTS: &[&str] = &[".cjs", ".json", ".node"];

/// Fix every local `require` argument in `content`. Two passes: extension
/// normalization first, then bare-reference resolution; both lean on the
/// same candidate search.
pub fn fix_paths(content: &str, file_path: &Path, output_root: &Path) -> FixOutcome {
    let ctx = ResolutionContext::new(file_path, output_root);
    let mut fixed = 0usize;
    let mut unresolved = 0usize;

    // Pass 1: arguments still ending in a source extension.
    let pass1 = REQUIRE_ARG_RE.replace_all(content, |caps: &Captures| {
        let quote = &caps[1];
        let arg = &caps[2];
        if !is_relative(arg) || !has_source_extension(arg) {
            return caps[0].to_string();
        }
        let stem = strip_source_extension(arg);
        let rewritten = match first_existing(&candidate_paths(&stem, &ctx)) {
            Some(hit) => relative_require_path(&ctx.file_dir, &hit),
            None => format!("{}.cjs", stem),
        };
        fixed += 1;
        format!("require({}{}{})", quote, rewritten, quote)
    });

    // Pass 2: bare references and doubled extensions.
    let pass2 = REQUIRE_ARG_RE.replace_all(&pass1, |caps: &Captures| {
        let quote = &caps[1];
        let mut arg = caps[2].to_string();

        if is_external(&arg) {
            return caps[0].to_string();
        }

        let mut changed = false;
        while arg.ends_with(".cjs.cjs") {
            arg.truncate(arg.len() - ".cjs".len());
            changed = true;
        }

        if !has_opaque_extension(&arg) {
            match first_existing(&candidate_paths(&arg, &ctx)) {
                Some(hit) => {
                    arg = relative_require_path(&ctx.file_dir, &hit);
                    changed = true;
                }
                None if is_relative(&arg) => {
                    // Deterministic best guess so the output is stable even
                    // when unresolved.
                    warn!(reference = %arg, file = %ctx.file_path.display(),
                          "could not locate referenced module, emitting best guess");
                    arg = format!("{}.cjs", arg);
                    unresolved += 1;
                    changed = true;
                }
                // A local-looking bare reference that resolves nowhere is
                // treated as an external package path and left alone.
                None => return caps[0].to_string(),
            }
        }

        if changed {
            fixed += 1;
            format!("require({}{}{})", quote, arg, quote)
        } else {
            caps[0].to_string()
        }
    });

    FixOutcome {
        content: pass2.into_owned(),
        fixed,
        unresolved,
    }
}

fn is_relative(arg: &str) -> bool {
    arg.starts_with("./") || arg.starts_with("../")
}

/// Package specifiers (`express`, `@nestjs/common`) are passed through
/// unchanged. Multi-segment bare paths get a chance at local resolution.
fn is_external(arg: &str) -> bool {
    if is_relative(arg) {
        return false;
    }
    arg.starts_with('@') || !arg.contains('/')
}

fn has_source_extension(arg: &str) -> bool {
    RESOLVABLE_SOURCE_EXTS.iter().any(|ext| arg.ends_with(ext)) && !arg.ends_with(".min.js")
}

fn strip_source_extension(arg: &str) -> String {
    for ext in RESOLVABLE_SOURCE_EXTS {
        if let Some(stem) = arg.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    arg.to_string()
}

fn has_opaque_extension(arg: &str) -> bool {
    OPAQUE_EXTS.iter().any(|ext| arg.ends_with(ext))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CANDIDATE-PATH SEARCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Generate the ordered probe list for a logical reference. Pure: no
/// filesystem access here, so the ordering contract is unit-testable.
///
/// Order: the file's own directory, then one/two/three levels up, then the
/// duplicated root, each in exact-name and `index` form; for multi-segment
/// references the same ladder repeats with the leading segment (then the
/// leading two segments) stripped, which catches directories the build
/// renamed or collapsed. Shallow and local candidates always order before
/// deep and rooted ones.
pub fn candidate_paths(reference: &str, ctx: &ResolutionContext) -> Vec<PathBuf> {
    let mut levels: Vec<PathBuf> = vec![
        ctx.file_dir.clone(),
        ctx.file_dir.join(".."),
        ctx.file_dir.join("../.."),
        ctx.file_dir.join("../../.."),
    ];
    levels.push(ctx.dup_root.clone());

    let mut shapes: Vec<String> = vec![reference.trim_start_matches("./").to_string()];
    if !reference.starts_with("../") {
        let segments: Vec<&str> = reference
            .trim_start_matches("./")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() >= 2 {
            shapes.push(segments[1..].join("/"));
        }
        if segments.len() >= 3 {
            shapes.push(segments[2..].join("/"));
        }
    }

    let mut out: Vec<PathBuf> = Vec::new();
    for shape in &shapes {
        for level in &levels {
            for candidate in [
                normalize_lexical(&level.join(format!("{}.cjs", shape))),
                normalize_lexical(&level.join(shape).join("index.cjs")),
            ] {
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
    }
    out
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    let hit = candidates.iter().find(|path| path.is_file()).cloned();
    if let Some(ref path) = hit {
        trace!(path = %path.display(), "candidate search hit");
    }
    hit
}

// ═══════════════════════════════════════════════════════════════════════════════
// CORRECTION TABLE
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    /// Known systematic mis-resolutions the generic search cannot derive:
    /// the expected directory really is one level different from where the
    /// search would look. Keyed on the referencing file's own path, and
    /// anchored at the opening quote so the corrected form never matches
    /// again.
    static ref CORRECTIONS: Vec<(Regex, Regex, &'static str)> = vec![
        (
            Regex::new(r"modules/[^/]+/index\.cjs$").unwrap(),
            Regex::new(r#"require\((['"])\.\./config/"#).unwrap(),
            "require(${1}../../config/",
        ),
        (
            Regex::new(r"queues/index\.cjs$").unwrap(),
            Regex::new(r#"require\((['"])\./workers/"#).unwrap(),
            "require(${1}../workers/",
        ),
    ];
}

pub fn apply_corrections(content: &str, file_path: &Path) -> (String, usize) {
    let path_str = file_path.to_string_lossy().replace('\\', "/");
    let mut out = content.to_string();
    let mut fixed = 0usize;
    for (file_re, find, replacement) in CORRECTIONS.iter() {
        if !file_re.is_match(&path_str) {
            continue;
        }
        let hits = find.find_iter(&out).count();
        if hits > 0 {
            out = find.replace_all(&out, *replacement).into_owned();
            fixed += hits;
        }
    }
    (out, fixed)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolve `.` and `..` components without touching the filesystem.
pub(crate) fn normalize_lexical(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                } else {
                    parts.push(component);
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// The relative path from `from_dir` to `to`, in forward-slash form,
/// always carrying a `./` or `../` marker so the loader treats it as a
/// file path.
pub(crate) fn relative_require_path(from_dir: &Path, to: &Path) -> String {
    let from = normalize_lexical(from_dir);
    let to = normalize_lexical(to);
    let from_parts: Vec<Component> = from.components().collect();
    let to_parts: Vec<Component> = to.components().collect();

    let mut shared = 0;
    while shared < from_parts.len()
        && shared < to_parts.len()
        && from_parts[shared] == to_parts[shared]
    {
        shared += 1;
    }

    let mut segments: Vec<String> = Vec::new();
    for _ in shared..from_parts.len() {
        segments.push("..".to_string());
    }
    for part in &to_parts[shared..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }

    if segments.is_empty() {
        return "./".to_string();
    }
    let joined = segments.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}
