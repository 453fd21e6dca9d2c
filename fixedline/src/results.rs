/// Outcome types for a chunked rebuild.
///
/// Every chunk produces exactly one [`ChunkOutcome`]; the orchestrator collects
/// them into a [`RunReport`]. A failed chunk never aborts its siblings, so a
/// report can describe a partial run. Callers decide what a partial run means:
/// ```rust,ignore
/// let report = fixedline::run(&config)?;
/// if !report.is_complete() {
///     for outcome in report.failed() {
///         eprintln!("chunk {} missing", outcome.index);
///     }
/// }
/// // or make any missing chunk an error
/// let report = report.into_result(true)?;
/// ```
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{ChunkError, ChunkResult};
use crate::metrics::RunStats;
use crate::split::planner::Plan;
use crate::split::probe::LinePlan;

fn serialize_error<S: Serializer>(error: &ChunkError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// What happened to a single chunk
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkStatus {
    /// The chunk's lines reached the output
    Written { lines: u64, bytes: u64 },
    /// The chunk's range held no bytes
    Empty,
    /// The chunk was read, decoded or written unsuccessfully; its lines are absent
    Failed {
        #[serde(serialize_with = "serialize_error")]
        error: ChunkError,
    },
}

/// Result of one worker
#[derive(Debug, Serialize)]
pub struct ChunkOutcome {
    /// Chunk index in input order
    pub index: usize,
    /// First byte of the chunk in the input
    pub start_offset: u64,
    #[serde(flatten)]
    pub status: ChunkStatus,
}

impl ChunkOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ChunkStatus::Failed { .. })
    }

    /// Lines this chunk contributed to the output
    pub fn lines_written(&self) -> u64 {
        match self.status {
            ChunkStatus::Written { lines, .. } => lines,
            _ => 0,
        }
    }
}

/// Summary of a complete run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Input size in bytes
    pub file_size: u64,
    pub line: LinePlan,
    pub plan: Plan,
    /// One outcome per chunk, sorted by chunk index
    pub outcomes: Vec<ChunkOutcome>,
    pub stats: RunStats,
    pub elapsed: Duration,
}

impl RunReport {
    /// Creates a report with no outcomes yet
    pub fn new(
        input_path: PathBuf,
        output_path: PathBuf,
        file_size: u64,
        line: LinePlan,
        plan: Plan,
    ) -> Self {
        Self {
            input_path,
            output_path,
            file_size,
            line,
            plan,
            outcomes: Vec::with_capacity(plan.task_count),
            stats: RunStats::default(),
            elapsed: Duration::ZERO,
        }
    }

    /// Adds a chunk outcome, keeping outcomes in chunk index order
    pub fn add_outcome(&mut self, outcome: ChunkOutcome) {
        let at = self
            .outcomes
            .partition_point(|existing| existing.index < outcome.index);
        self.outcomes.insert(at, outcome);
    }

    /// Marks chunk `index` as failed, replacing whatever was recorded for it.
    /// Returns the outcome it replaced.
    pub fn mark_failed(&mut self, index: usize, error: ChunkError) -> Option<ChunkStatus> {
        let outcome = self.outcomes.iter_mut().find(|o| o.index == index)?;
        Some(std::mem::replace(
            &mut outcome.status,
            ChunkStatus::Failed { error },
        ))
    }

    /// True when no chunk failed
    pub fn is_complete(&self) -> bool {
        !self.outcomes.iter().any(ChunkOutcome::is_failed)
    }

    /// Outcomes of the chunks that failed
    pub fn failed(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// Total lines written across all chunks
    pub fn lines_written(&self) -> u64 {
        self.outcomes.iter().map(ChunkOutcome::lines_written).sum()
    }

    /// Returns the report, or [`ChunkError::PartialRun`] if `strict` is set and
    /// any chunk failed
    pub fn into_result(self, strict: bool) -> ChunkResult<Self> {
        if strict && !self.is_complete() {
            return Err(ChunkError::PartialRun {
                failed: self.failed_count(),
                total: self.outcomes.len(),
            });
        }
        Ok(self)
    }

    /// Renders the report as pretty-printed JSON
    pub fn to_json(&self) -> ChunkResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::num::NonZeroUsize;

    fn report() -> RunReport {
        let line = LinePlan::new(12, 2).unwrap();
        let plan = Plan::compute(
            3000 * 12,
            &line,
            NonZeroUsize::new(1000).unwrap(),
            NonZeroUsize::new(10).unwrap(),
        );
        RunReport::new(
            PathBuf::from("in.txt"),
            PathBuf::from("out.txt"),
            3000 * 12,
            line,
            plan,
        )
    }

    fn written(index: usize, lines: u64) -> ChunkOutcome {
        ChunkOutcome {
            index,
            start_offset: index as u64 * 12_000,
            status: ChunkStatus::Written {
                lines,
                bytes: lines * 12,
            },
        }
    }

    fn failed(index: usize) -> ChunkOutcome {
        ChunkOutcome {
            index,
            start_offset: index as u64 * 12_000,
            status: ChunkStatus::Failed {
                error: ChunkError::ChunkRead {
                    index,
                    source: io::Error::from(io::ErrorKind::UnexpectedEof),
                },
            },
        }
    }

    #[test]
    fn test_add_outcome_keeps_index_order() {
        let mut report = report();
        report.add_outcome(written(2, 1000));
        report.add_outcome(written(0, 1000));
        report.add_outcome(written(1, 1000));

        let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(report.lines_written(), 3000);
        assert!(report.is_complete());
    }

    #[test]
    fn test_partial_run() {
        let mut report = report();
        report.add_outcome(written(0, 1000));
        report.add_outcome(failed(1));
        report.add_outcome(written(2, 1000));

        assert!(!report.is_complete());
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed().next().unwrap().index, 1);
        assert_eq!(report.lines_written(), 2000);

        let err = report.into_result(true).unwrap_err();
        assert!(matches!(err, ChunkError::PartialRun { failed: 1, total: 3 }));
    }

    #[test]
    fn test_partial_run_tolerated_when_not_strict() {
        let mut report = report();
        report.add_outcome(failed(0));
        assert!(report.into_result(false).is_ok());
    }

    #[test]
    fn test_mark_failed_replaces_status() {
        let mut report = report();
        report.add_outcome(written(0, 1000));

        let previous = report.mark_failed(
            0,
            ChunkError::ChunkWrite {
                index: 0,
                source: io::Error::from(io::ErrorKind::BrokenPipe),
            },
        );
        assert!(matches!(
            previous,
            Some(ChunkStatus::Written { lines: 1000, .. })
        ));
        assert!(!report.is_complete());
        assert!(report.mark_failed(7, ChunkError::config_error("x")).is_none());
    }

    #[test]
    fn test_report_json() {
        let mut report = report();
        report.add_outcome(written(0, 1000));
        report.add_outcome(failed(1));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["plan"]["task_count"], 3);
        assert_eq!(json["line"]["line_bytes"], 12);
        assert_eq!(json["outcomes"][0]["status"], "written");
        assert_eq!(json["outcomes"][0]["lines"], 1000);
        assert_eq!(json["outcomes"][1]["status"], "failed");
        assert!(json["outcomes"][1]["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to read chunk 1"));
    }
}
