use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the conversion pipeline.
///
/// Path-resolution misses are deliberately NOT represented here: resolvers
/// return a best-guess path instead of failing. Only I/O on the file being
/// mutated and run-level preconditions produce an error.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("output directory {0:?} does not exist - run the build before converting")]
    OutputDirMissing(PathBuf),

    #[error("aborted after {failures} file conversion failures (limit {limit})")]
    TooManyFailures { failures: usize, limit: usize },

    #[error("failed to {action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub fn io(action: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        ConvertError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}
