//! The chunked read/parse/write pipeline.
//!
//! A run moves through four stages:
//!
//! 1. **Probe** ([`probe`]): the first line of the input gives the width every
//!    line is assumed to share, terminator included.
//! 2. **Plan** ([`planner`]): the input is divided into at most
//!    `max_concurrent_chunks` contiguous byte ranges. Chunks hold
//!    `soft_lines_per_chunk` lines unless the cap forces them to grow.
//! 3. **Work** ([`worker`]): each chunk is read with an offset read of its own,
//!    cut into line-width strides, decoded, and handed to the output sink as a
//!    single write.
//! 4. **Orchestrate** ([`engine`]): one worker per chunk runs on a bounded
//!    pool; the run waits for every worker and collects one outcome per chunk.
//!
//! ```rust,ignore
//! let config = ChunkConfig::new("records.txt", "rebuilt.txt");
//! let report = fixedline::split::run(&config)?;
//! println!("{} lines in {} chunks", report.lines_written(), report.plan.task_count);
//! ```
//!
//! Output order follows worker completion unless `output_order` is
//! `chunk_index`, in which case finished chunks are held back and written in
//! input order.
pub mod engine;
pub mod planner;
pub mod probe;
pub mod worker;

pub use engine::run;
pub use planner::{ChunkTask, Plan};
pub use probe::{probe_line_plan, verify_line_width, LinePlan};
pub use worker::{parse_lines, ChunkWorker, ParsedChunk};
