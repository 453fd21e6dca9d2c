/// Error types for fixedline.
///
/// Errors fall into two groups:
///
/// 1. **Run errors** abort the whole run before any chunk is launched: a missing
///    or unreadable input, an empty input, bad configuration, or a failure to
///    build the worker pool.
/// 2. **Chunk errors** (`ChunkRead`, `ChunkEncoding`, `ChunkWrite`) belong to a
///    single worker. They are recorded in that worker's outcome and never abort
///    sibling workers:
///    ```rust,ignore
///    match outcome.status {
///        ChunkStatus::Written { lines, .. } => // chunk landed in the output,
///        ChunkStatus::Empty => // range was past the end of the input,
///        ChunkStatus::Failed { error } => // this chunk's lines are missing,
///    }
///    ```
///
/// A caller that wants an all-or-nothing run turns a partial report into
/// [`ChunkError::PartialRun`] with `RunReport::into_result(true)`.
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for chunking operations
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Errors that can occur while planning, reading or writing chunks
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Input file is empty: {0}")]
    EmptyInput(PathBuf),
    #[error("Line {line} of {path} does not end at the expected width of {expected} bytes")]
    LineWidthMismatch {
        path: PathBuf,
        line: u64,
        expected: u64,
    },
    #[error("Failed to read chunk {index}: {source}")]
    ChunkRead {
        index: usize,
        source: std::io::Error,
    },
    #[error("Invalid UTF-8 in chunk {index} at byte {offset}: {source}")]
    ChunkEncoding {
        index: usize,
        offset: u64,
        source: std::str::Utf8Error,
    },
    #[error("Failed to write chunk {index}: {source}")]
    ChunkWrite {
        index: usize,
        source: std::io::Error,
    },
    #[error("{failed} of {total} chunks failed")]
    PartialRun { failed: usize, total: usize },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Canonicalize the path and strip UNC prefixes so that
/// comparisons on Windows are consistent.
pub fn unify_path(original: &Path) -> PathBuf {
    let canonical = original
        .canonicalize()
        .unwrap_or_else(|_| original.to_path_buf());
    strip_unc_prefix(&canonical)
}

/// Strips the Windows UNC prefix (\\?\) from a path if present
fn strip_unc_prefix(p: &Path) -> PathBuf {
    let s = p.display().to_string();
    if let Some(stripped) = s.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        p.to_path_buf()
    }
}

impl ChunkError {
    pub fn input_not_found(path: impl Into<PathBuf>) -> Self {
        Self::InputNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn empty_input(path: impl Into<PathBuf>) -> Self {
        Self::EmptyInput(path.into())
    }

    pub fn line_width_mismatch(path: impl Into<PathBuf>, line: u64, expected: u64) -> Self {
        Self::LineWidthMismatch {
            path: path.into(),
            line,
            expected,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Maps an error from opening `path` onto the path-carrying variants.
    pub fn from_open(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::input_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }

    /// True for errors that belong to a single chunk rather than the whole run
    pub fn is_chunk_error(&self) -> bool {
        matches!(
            self,
            Self::ChunkRead { .. } | Self::ChunkEncoding { .. } | Self::ChunkWrite { .. }
        )
    }
}
