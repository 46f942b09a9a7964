use std::path::{Path, PathBuf};

/// Extensions the upstream compiler emits for ES-module output.
pub const ESM_EXTENSIONS: &[&str] = &["mjs", "js"];

/// Canonical extension for converted CommonJS output.
pub const CJS_EXTENSION: &str = "cjs";

/// Immutable configuration for one conversion run.
///
/// Built once from CLI arguments (or defaults) and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root the tool was invoked from.
    pub root_dir: PathBuf,
    /// Compiled output tree to convert in place.
    pub output_dir: PathBuf,
    pub verbose: bool,
    pub dry_run: bool,
    pub create_backup: bool,
    pub resolve_aliases: bool,
    pub fix_dependency_paths: bool,
}

impl Config {
    pub fn new(root_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Config {
            root_dir: root_dir.into(),
            output_dir: output_dir.into(),
            verbose: false,
            dry_run: false,
            create_backup: true,
            resolve_aliases: true,
            fix_dependency_paths: true,
        }
    }

    /// Sibling directory the pre-run snapshot is copied into.
    pub fn backup_dir(&self) -> PathBuf {
        let name = self
            .output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        match self.output_dir.parent() {
            Some(parent) if parent != Path::new("") => parent.join(format!("{}_backup", name)),
            _ => PathBuf::from(format!("{}_backup", name)),
        }
    }

    /// The duplicated source level the upstream build nests inside the
    /// output tree (`<output>/src`). Referenced throughout path resolution;
    /// it may or may not exist on disk.
    pub fn duplicated_root(&self) -> PathBuf {
        self.output_dir.join("src")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_dir_is_a_sibling_of_the_output_dir() {
        let config = Config::new(".", "build/dist");
        assert_eq!(config.backup_dir(), PathBuf::from("build/dist_backup"));
    }

    #[test]
    fn backup_dir_for_bare_output_name() {
        let config = Config::new(".", "dist");
        assert_eq!(config.backup_dir(), PathBuf::from("dist_backup"));
    }

    #[test]
    fn duplicated_root_is_output_src() {
        let config = Config::new(".", "dist");
        assert_eq!(config.duplicated_root(), PathBuf::from("dist/src"));
    }
}
