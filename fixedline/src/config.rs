use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{unify_path, ChunkError, ChunkResult};

/// Default soft target for lines per chunk
pub const DEFAULT_SOFT_LINES_PER_CHUNK: usize = 1000;
/// Default hard cap on the number of chunks (and concurrent workers)
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 10;
const DEFAULT_VERIFY_SAMPLES: usize = 16;

/// Configuration for a chunked rebuild run.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.fixedline.yaml` in the current directory
/// 3. Global `$HOME/.config/fixedline/config.yaml`
///
/// # Configuration Format
///
/// The configuration uses YAML format. Example:
/// ```yaml
/// input_path: "data/records.txt"
/// output_path: "data/rebuilt.txt"
///
/// # Soft target; raised automatically when the chunk cap is hit
/// soft_lines_per_chunk: 1000
///
/// # Hard cap on chunks and worker threads
/// max_concurrent_chunks: 10
///
/// # completion | chunk_index
/// output_order: "completion"
///
/// # failfast | lossy
/// encoding_mode: "failfast"
///
/// # auto | positioned | mmap
/// read_strategy: "auto"
///
/// log_level: "info"
/// ```
///
/// Command-line arguments take precedence over config file values, see
/// [`ChunkConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// File to split; every line is assumed to share the width of the first one
    pub input_path: PathBuf,

    /// File the rebuilt lines are written to. Truncated at the start of a run.
    pub output_path: PathBuf,

    /// Lines per chunk when the chunk cap is not reached
    pub soft_lines_per_chunk: NonZeroUsize,

    /// Upper bound on the number of chunks, and therefore on worker threads
    pub max_concurrent_chunks: NonZeroUsize,

    /// Pause between successive worker launches, in milliseconds
    pub launch_delay_ms: u64,

    /// Order in which finished chunks reach the output
    pub output_order: OutputOrder,

    /// How invalid UTF-8 in a chunk is handled
    pub encoding_mode: EncodingMode,

    /// How workers read their byte range
    pub read_strategy: ReadStrategy,

    /// Check sampled lines against the width derived from the first line
    pub verify_line_width: bool,

    /// Number of lines sampled when `verify_line_width` is set
    pub verify_samples: usize,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Output ordering of finished chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputOrder {
    /// Chunks are written as workers finish
    #[default]
    Completion,
    /// Chunks are held back and written in chunk index order
    ChunkIndex,
}

/// Handling of byte sequences that are not valid UTF-8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Fail the chunk on the first invalid sequence
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and log a warning
    Lossy,
}

/// How a worker obtains the bytes of its chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStrategy {
    /// Memory map large inputs, use offset reads otherwise
    #[default]
    Auto,
    /// Offset reads on the open file handle
    Positioned,
    /// Slices of a read-only memory map
    Mmap,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            output_path: PathBuf::from("output.txt"),
            soft_lines_per_chunk: default_soft_lines_per_chunk(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            launch_delay_ms: 0,
            output_order: OutputOrder::default(),
            encoding_mode: EncodingMode::default(),
            read_strategy: ReadStrategy::default(),
            verify_line_width: false,
            verify_samples: DEFAULT_VERIFY_SAMPLES,
            log_level: default_log_level(),
        }
    }
}

fn default_soft_lines_per_chunk() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_SOFT_LINES_PER_CHUNK).unwrap()
}

fn default_max_concurrent_chunks() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_MAX_CONCURRENT_CHUNKS).unwrap()
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Values supplied on the command line; `None` leaves the loaded value alone
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub soft_lines_per_chunk: Option<NonZeroUsize>,
    pub max_concurrent_chunks: Option<NonZeroUsize>,
    pub launch_delay: Option<Duration>,
    pub output_order: Option<OutputOrder>,
    pub encoding_mode: Option<EncodingMode>,
    pub read_strategy: Option<ReadStrategy>,
    pub verify_line_width: bool,
    pub log_level: Option<String>,
}

impl ChunkConfig {
    /// Creates a configuration for `input` and `output` with default tuning
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input.into(),
            output_path: output.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> ChunkResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus an optional explicit file
    pub fn load_from(config_path: Option<&Path>) -> ChunkResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("fixedline/config.yaml")),
            Some(PathBuf::from(".fixedline.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            if !path.is_file() {
                return Err(ChunkError::config_error(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if let Some(input) = cli.input_path {
            self.input_path = input;
        }
        if let Some(output) = cli.output_path {
            self.output_path = output;
        }
        if let Some(lines) = cli.soft_lines_per_chunk {
            self.soft_lines_per_chunk = lines;
        }
        if let Some(cap) = cli.max_concurrent_chunks {
            self.max_concurrent_chunks = cap;
        }
        if let Some(delay) = cli.launch_delay {
            self.launch_delay_ms = delay.as_millis() as u64;
        }
        if let Some(order) = cli.output_order {
            self.output_order = order;
        }
        if let Some(mode) = cli.encoding_mode {
            self.encoding_mode = mode;
        }
        if let Some(strategy) = cli.read_strategy {
            self.read_strategy = strategy;
        }
        if cli.verify_line_width {
            self.verify_line_width = true;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }

    /// Checks the settings that cannot be expressed in the types
    pub fn validate(&self) -> ChunkResult<()> {
        if self.input_path.as_os_str().is_empty() {
            return Err(ChunkError::config_error("input path is required"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ChunkError::config_error("output path is required"));
        }
        if unify_path(&self.input_path) == unify_path(&self.output_path) {
            return Err(ChunkError::config_error(format!(
                "input and output refer to the same file: {}",
                self.input_path.display()
            )));
        }
        if self.verify_line_width && self.verify_samples == 0 {
            return Err(ChunkError::config_error(
                "verify_samples must be at least 1 when line width verification is enabled",
            ));
        }
        Ok(())
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    /// Renders the effective configuration as YAML
    pub fn to_yaml(&self) -> ChunkResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Parses a human readable delay such as `100ms` or `1s`
pub fn parse_launch_delay(value: &str) -> ChunkResult<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ChunkError::config_error(format!("invalid launch delay '{}': {}", value, e)))
}

impl FromStr for OutputOrder {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completion" => Ok(Self::Completion),
            "chunk_index" | "chunk-index" | "index" => Ok(Self::ChunkIndex),
            other => Err(ChunkError::config_error(format!(
                "unknown output order '{}'",
                other
            ))),
        }
    }
}

impl FromStr for EncodingMode {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "failfast" | "fail-fast" => Ok(Self::FailFast),
            "lossy" => Ok(Self::Lossy),
            other => Err(ChunkError::config_error(format!(
                "unknown encoding mode '{}'",
                other
            ))),
        }
    }
}

impl FromStr for ReadStrategy {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "positioned" => Ok(Self::Positioned),
            "mmap" => Ok(Self::Mmap),
            other => Err(ChunkError::config_error(format!(
                "unknown read strategy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion => write!(f, "completion"),
            Self::ChunkIndex => write!(f, "chunk_index"),
        }
    }
}

impl fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Positioned => write!(f, "positioned"),
            Self::Mmap => write!(f, "mmap"),
        }
    }
}
