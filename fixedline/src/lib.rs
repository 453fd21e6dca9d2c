pub mod config;
pub mod errors;
pub mod gate;
pub mod metrics;
pub mod results;
pub mod source;
pub mod split;

pub use config::{ChunkConfig, ConfigOverrides, EncodingMode, OutputOrder, ReadStrategy};
pub use errors::{ChunkError, ChunkResult};
pub use results::{ChunkOutcome, ChunkStatus, RunReport};
pub use split::run;
