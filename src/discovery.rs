//! Output-tree discovery.
//!
//! Walks the compiled output directory and returns the files a conversion
//! pass should look at, split by extension. Results are held in a
//! short-lived cache so the orchestrator's repeated scans within one run
//! do not re-walk an unchanged tree.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::config::{CJS_EXTENSION, ESM_EXTENSIONS};

/// Directory names the scanner never descends into.
pub const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git", "client", "coverage", ".cache"];

/// Generated minified bundles are never conversion candidates.
const MINIFIED_SUFFIXES: &[&str] = &[".min.js", ".min.mjs", ".min.cjs"];

const CACHE_TTL: Duration = Duration::from_secs(5);

/// One walk's worth of results. Invalidated after [`CACHE_TTL`] or an
/// explicit [`Scanner::clear_cache`].
struct ScanCache {
    /// ESM-extension files still to be converted.
    source_files: Vec<PathBuf>,
    /// Files already carrying the canonical CommonJS extension.
    converted_files: Vec<PathBuf>,
    taken_at: Instant,
}

pub struct Scanner {
    root: PathBuf,
    cache: Option<ScanCache>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Scanner {
            root: root.into(),
            cache: None,
        }
    }

    /// Return every non-excluded file under the root whose extension is in
    /// `extensions`, in a stable sorted order.
    ///
    /// Unreadable directories are skipped silently: partial trees are
    /// expected during incremental builds and are not an error.
    pub fn scan(&mut self, extensions: &[&str]) -> Vec<PathBuf> {
        let fresh = match &self.cache {
            Some(cache) => cache.taken_at.elapsed() < CACHE_TTL,
            None => false,
        };
        if !fresh {
            self.cache = Some(self.walk());
        }
        let cache = self.cache.as_ref().expect("cache populated above");
        cache
            .source_files
            .iter()
            .chain(cache.converted_files.iter())
            .filter(|path| has_extension(path, extensions))
            .cloned()
            .collect()
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    fn walk(&self) -> ScanCache {
        let mut source_files = Vec::new();
        let mut converted_files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| !is_excluded_dir(entry.path()));

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || is_minified(path) {
                continue;
            }
            if has_extension(path, ESM_EXTENSIONS) {
                source_files.push(path.to_path_buf());
            } else if has_extension(path, &[CJS_EXTENSION]) {
                converted_files.push(path.to_path_buf());
            }
        }

        source_files.sort();
        converted_files.sort();

        ScanCache {
            source_files,
            converted_files,
            taken_at: Instant::now(),
        }
    }
}

fn is_excluded_dir(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => EXCLUDED_DIRS.contains(&name) || name.ends_with("_backup"),
        None => false,
    }
}

fn is_minified(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    MINIFIED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export {};").unwrap();
    }

    #[test]
    fn scan_returns_only_requested_extensions_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.mjs"));
        touch(&dir.path().join("a.mjs"));
        touch(&dir.path().join("c.cjs"));
        touch(&dir.path().join("notes.txt"));

        let mut scanner = Scanner::new(dir.path());
        let sources = scanner.scan(&["mjs"]);
        assert_eq!(
            sources,
            vec![dir.path().join("a.mjs"), dir.path().join("b.mjs")]
        );

        let converted = scanner.scan(&["cjs"]);
        assert_eq!(converted, vec![dir.path().join("c.cjs")]);
    }

    #[test]
    fn scan_prunes_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep.mjs"));
        touch(&dir.path().join("node_modules/pkg/index.mjs"));
        touch(&dir.path().join(".git/hooks/sample.mjs"));
        touch(&dir.path().join("dist_backup/old.mjs"));
        touch(&dir.path().join("client/app.mjs"));

        let mut scanner = Scanner::new(dir.path());
        assert_eq!(scanner.scan(&["mjs"]), vec![dir.path().join("keep.mjs")]);
    }

    #[test]
    fn scan_skips_minified_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("app.mjs"));
        touch(&dir.path().join("vendor.min.js"));
        touch(&dir.path().join("vendor.min.mjs"));

        let mut scanner = Scanner::new(dir.path());
        assert_eq!(
            scanner.scan(&["mjs", "js"]),
            vec![dir.path().join("app.mjs")]
        );
    }

    #[test]
    fn cache_serves_repeat_scans_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mjs"));

        let mut scanner = Scanner::new(dir.path());
        assert_eq!(scanner.scan(&["mjs"]).len(), 1);

        // A file added after the first walk is invisible until the cache
        // is cleared.
        touch(&dir.path().join("late.mjs"));
        assert_eq!(scanner.scan(&["mjs"]).len(), 1);

        scanner.clear_cache();
        assert_eq!(scanner.scan(&["mjs"]).len(), 2);
    }
}
