//! Conversion orchestration.
//!
//! Drives the full pipeline as a small state machine:
//! `Validate → Backup → ConvertNew → ConvertResidualMixed → FixPaths →
//! Cleanup → Done`, with `Failed` reachable from anywhere. Owns the backup
//! snapshot, the rollback path, the per-file failure threshold, and every
//! statistic the run reports. All filesystem mutation happens on this
//! thread; only the side-effect-free read-and-classify step fans out.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::alias::resolve_aliases;
use crate::config::{Config, CJS_EXTENSION, ESM_EXTENSIONS};
use crate::detect::{classify, is_dead_artifact};
use crate::discovery::Scanner;
use crate::error::ConvertError;
use crate::resolve::{apply_corrections, fix_paths};
use crate::rewrite::rewrite;
use crate::shims::strip_shims;

/// Per-file conversion failures tolerated before the run aborts and rolls
/// back.
pub const MAX_CONVERSION_FAILURES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Backup,
    ConvertNew,
    ConvertResidualMixed,
    FixPaths,
    Cleanup,
    Done,
    Failed,
}

/// Counters accumulated over one run. Mutated only by the orchestrator;
/// read at the end for reporting and the exit status.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    pub files_processed: usize,
    pub files_converted: usize,
    pub files_deleted: usize,
    pub aliases_fixed: usize,
    pub dependency_paths_fixed: usize,
    pub unresolved_references: usize,
    pub errors: usize,
}

impl ConversionStats {
    pub fn error_rate(&self) -> f64 {
        if self.files_processed == 0 {
            0.0
        } else {
            self.errors as f64 / self.files_processed as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Files processed:        {}\n\
             Files converted:        {}\n\
             Dead artifacts deleted: {}\n\
             Aliases fixed:          {}\n\
             Dependency paths fixed: {}\n\
             Unresolved references:  {}\n\
             Errors:                 {} ({:.1}% of files)",
            self.files_processed,
            self.files_converted,
            self.files_deleted,
            self.aliases_fixed,
            self.dependency_paths_fixed,
            self.unresolved_references,
            self.errors,
            self.error_rate() * 100.0
        )
    }
}

pub struct Converter {
    config: Config,
    scanner: Scanner,
    stats: ConversionStats,
    backup_dir: Option<PathBuf>,
    phase: Phase,
}

impl Converter {
    pub fn new(config: Config) -> Self {
        let scanner = Scanner::new(&config.output_dir);
        Converter {
            config,
            scanner,
            stats: ConversionStats::default(),
            backup_dir: None,
            phase: Phase::Validate,
        }
    }

    pub fn stats(&self) -> &ConversionStats {
        &self.stats
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn run(&mut self) -> Result<(), ConvertError> {
        match self.run_inner() {
            Ok(()) => {
                self.enter(Phase::Done);
                Ok(())
            }
            Err(err) => {
                self.enter(Phase::Failed);
                error!(error = %err, "conversion run failed");
                self.rollback();
                Err(err)
            }
        }
    }

    fn run_inner(&mut self) -> Result<(), ConvertError> {
        self.enter(Phase::Validate);
        if !self.config.output_dir.is_dir() {
            return Err(ConvertError::OutputDirMissing(
                self.config.output_dir.clone(),
            ));
        }

        self.enter(Phase::Backup);
        if self.config.dry_run {
            info!("dry run: skipping backup snapshot");
        } else if self.config.create_backup {
            self.create_backup();
        }

        self.enter(Phase::ConvertNew);
        self.convert_new()?;

        self.enter(Phase::ConvertResidualMixed);
        self.convert_residual_mixed();

        self.enter(Phase::FixPaths);
        if self.config.fix_dependency_paths {
            self.fix_all_paths();
        }

        // Reporting only; the backup snapshot is retained as a recovery
        // artifact.
        self.enter(Phase::Cleanup);
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        debug!(phase = ?phase, "entering phase");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BACKUP / ROLLBACK
    // ═══════════════════════════════════════════════════════════════════════════

    fn create_backup(&mut self) {
        let backup = self.config.backup_dir();
        info!(path = %backup.display(), "creating backup snapshot");
        let result = copy_tree(&self.config.output_dir, &backup)
            .and_then(|_| verify_snapshot(&self.config.output_dir, &backup));
        match result {
            Ok(()) => self.backup_dir = Some(backup),
            // Non-fatal: the run continues, but rollback is disabled.
            Err(err) => warn!(error = %err, "backup creation failed; continuing without rollback"),
        }
    }

    fn rollback(&mut self) {
        if self.config.dry_run {
            return;
        }
        let backup = match &self.backup_dir {
            Some(backup) => backup.clone(),
            None => {
                warn!("rollback impossible: no backup snapshot was created");
                return;
            }
        };
        warn!(path = %backup.display(), "restoring output directory from backup");
        if let Err(err) = fs::remove_dir_all(&self.config.output_dir) {
            error!(error = %err, "could not clear output directory for rollback");
            return;
        }
        match copy_tree(&backup, &self.config.output_dir) {
            Ok(()) => info!("output directory restored from backup"),
            Err(err) => error!(error = %err, "rollback restore failed"),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONVERSION PASSES
    // ═══════════════════════════════════════════════════════════════════════════

    fn convert_new(&mut self) -> Result<(), ConvertError> {
        let files = self.scanner.scan(ESM_EXTENSIONS);
        info!(count = files.len(), "converting source-dialect files");

        let mut failures = 0usize;
        for path in files {
            self.stats.files_processed += 1;
            if let Err(err) = self.convert_file(&path) {
                error!(file = %path.display(), error = %err, "file conversion failed");
                failures += 1;
                self.stats.errors += 1;
                if failures > MAX_CONVERSION_FAILURES {
                    return Err(ConvertError::TooManyFailures {
                        failures,
                        limit: MAX_CONVERSION_FAILURES,
                    });
                }
            }
        }
        Ok(())
    }

    fn convert_file(&mut self, path: &Path) -> Result<(), ConvertError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConvertError::io("read", path, e))?;

        if is_dead_artifact(&content) {
            if self.config.dry_run {
                info!(file = %path.display(), "would delete dead build artifact");
            } else {
                fs::remove_file(path).map_err(|e| ConvertError::io("delete", path, e))?;
                debug!(file = %path.display(), "deleted dead build artifact");
            }
            self.stats.files_deleted += 1;
            return Ok(());
        }

        let dialect = classify(&content);
        let mut out = if dialect.is_esm {
            rewrite(&content, path)
        } else {
            // Already converted, or a plain script: carried through with
            // path fixing only.
            content.clone()
        };

        if self.config.resolve_aliases {
            let (next, fixed) = resolve_aliases(&out, path, &self.config.output_dir);
            out = next;
            self.stats.aliases_fixed += fixed;
        }
        out = strip_shims(&out);

        let target = path.with_extension(CJS_EXTENSION);
        if self.config.dry_run {
            debug!(file = %path.display(), target = %target.display(), "dry run: skipping write");
            return Ok(());
        }

        self.atomic_write(&target, &out)?;
        if target.as_path() != path {
            fs::remove_file(path).map_err(|e| ConvertError::io("remove", path, e))?;
        }
        self.stats.files_converted += 1;
        Ok(())
    }

    fn convert_residual_mixed(&mut self) {
        self.scanner.clear_cache();
        let files = self.scanner.scan(&[CJS_EXTENSION]);

        // Read + classify is side-effect-free; fan it out. Mutation stays
        // on this thread so no two workers ever write the same file.
        let mixed: Vec<(PathBuf, String)> = files
            .par_iter()
            .filter_map(|path| fs::read_to_string(path).ok().map(|c| (path.clone(), c)))
            .filter(|(_, content)| classify(content).is_mixed())
            .collect();

        if mixed.is_empty() {
            debug!("no residual mixed-dialect files");
            return;
        }
        info!(count = mixed.len(), "reprocessing residual mixed-dialect files");

        for (path, content) in mixed {
            self.stats.files_processed += 1;
            let mut out = rewrite(&content, &path);
            if self.config.resolve_aliases {
                let (next, fixed) = resolve_aliases(&out, &path, &self.config.output_dir);
                out = next;
                self.stats.aliases_fixed += fixed;
            }
            if self.config.dry_run {
                continue;
            }
            match self.atomic_write(&path, &out) {
                Ok(()) => self.stats.files_converted += 1,
                Err(err) => {
                    error!(file = %path.display(), error = %err, "residual rewrite failed");
                    self.stats.errors += 1;
                }
            }
        }
    }

    fn fix_all_paths(&mut self) {
        self.scanner.clear_cache();
        let files = self.scanner.scan(&[CJS_EXTENSION]);
        info!(count = files.len(), "fixing dependency paths");

        for path in files {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(err) => {
                    error!(file = %path.display(), error = %err, "could not read for path fixing");
                    self.stats.errors += 1;
                    continue;
                }
            };

            let outcome = fix_paths(&content, &path, &self.config.output_dir);
            self.stats.dependency_paths_fixed += outcome.fixed;
            self.stats.unresolved_references += outcome.unresolved;

            let (corrected, table_fixed) = apply_corrections(&outcome.content, &path);
            self.stats.dependency_paths_fixed += table_fixed;

            // Path fixing can expose a shim that used to sit inside a
            // now-rewritten expression.
            let finished = strip_shims(&corrected);

            if self.config.dry_run || finished == content {
                continue;
            }
            if let Err(err) = self.atomic_write(&path, &finished) {
                error!(file = %path.display(), error = %err, "path fix write failed");
                self.stats.errors += 1;
            }
        }
    }

    /// Write to a temp file in the target directory, then rename over the
    /// destination.
    fn atomic_write(&self, path: &Path, content: &str) -> Result<(), ConvertError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| ConvertError::io("stage", path, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| ConvertError::io("write", path, e))?;
        tmp.persist(path)
            .map_err(|e| ConvertError::io("persist", path, e.error))?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    for entry in WalkDir::new(from).into_iter().filter_map(|e| e.ok()) {
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Rollback is only trusted when every copied file hashes identical to its
/// source; a mismatched snapshot counts as a failed backup.
fn verify_snapshot(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let copied = to.join(rel);
        if file_hash(entry.path())? != file_hash(&copied)? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("snapshot mismatch for {:?}", rel),
            ));
        }
    }
    Ok(())
}

fn file_hash(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_handles_zero_processed() {
        let stats = ConversionStats::default();
        assert_eq!(stats.error_rate(), 0.0);
    }

    #[test]
    fn error_rate_is_a_fraction_of_processed_files() {
        let stats = ConversionStats {
            files_processed: 20,
            errors: 5,
            ..Default::default()
        };
        assert!((stats.error_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_serialize_to_camel_case_json() {
        let stats = ConversionStats {
            files_processed: 3,
            dependency_paths_fixed: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["filesProcessed"], 3);
        assert_eq!(json["dependencyPathsFixed"], 2);
    }

    #[test]
    fn summary_always_prints_counters() {
        let stats = ConversionStats {
            files_processed: 4,
            files_converted: 3,
            errors: 1,
            ..Default::default()
        };
        let text = stats.summary();
        assert!(text.contains("Files processed:        4"));
        assert!(text.contains("(25.0% of files)"));
    }
}
