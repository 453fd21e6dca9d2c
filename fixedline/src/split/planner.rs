use serde::Serialize;
use std::num::NonZeroUsize;

use super::probe::LinePlan;

/// How the input is divided into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Number of chunks, never more than the concurrency cap
    pub task_count: usize,
    /// Nominal lines per chunk
    pub lines_per_chunk: u64,
    /// Nominal bytes per chunk (`lines_per_chunk * line_bytes`)
    pub buffer_bytes: u64,
    /// Line width the plan was computed for
    pub line_bytes: u64,
}

/// One contiguous byte range of the input, consumed by exactly one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkTask {
    pub index: usize,
    pub start_offset: u64,
    pub line_count: u64,
    pub buffer_bytes: u64,
    /// Bytes of this range that exist in the input; smaller than
    /// `buffer_bytes` for the final chunk and zero past the end
    pub readable_bytes: u64,
}

impl Plan {
    /// Computes the chunk layout for an input of `file_size` bytes.
    ///
    /// Chunks hold `soft_lines_per_chunk` lines unless that would need more
    /// than `max_concurrent_chunks` chunks. In that case the chunk count is
    /// clamped to the cap and lines per chunk are raised so the capped chunks
    /// still span the whole input.
    pub fn compute(
        file_size: u64,
        line: &LinePlan,
        soft_lines_per_chunk: NonZeroUsize,
        max_concurrent_chunks: NonZeroUsize,
    ) -> Self {
        let width = line.line_bytes;
        let soft = soft_lines_per_chunk.get() as u64;
        let cap = max_concurrent_chunks.get() as u64;

        let raw_task_count = file_size.div_ceil(soft.saturating_mul(width));

        let (task_count, lines_per_chunk) = if raw_task_count > cap {
            // ceil(ceil(size / width) / cap) == ceil(size / width / cap)
            let total_lines = file_size.div_ceil(width);
            (cap, total_lines.div_ceil(cap))
        } else {
            (raw_task_count, soft)
        };

        Self {
            task_count: task_count as usize,
            lines_per_chunk,
            buffer_bytes: lines_per_chunk.saturating_mul(width),
            line_bytes: width,
        }
    }

    /// Total bytes spanned by all chunks' nominal ranges
    pub fn nominal_coverage(&self) -> u64 {
        (self.task_count as u64).saturating_mul(self.buffer_bytes)
    }

    /// True when the nominal ranges reach at least `file_size` bytes
    pub fn covers(&self, file_size: u64) -> bool {
        self.nominal_coverage() >= file_size
    }

    /// Builds the chunk tasks, clamping each readable range to the input end
    pub fn tasks(&self, file_size: u64) -> Vec<ChunkTask> {
        (0..self.task_count)
            .map(|index| {
                let start_offset = index as u64 * self.buffer_bytes;
                ChunkTask {
                    index,
                    start_offset,
                    line_count: self.lines_per_chunk,
                    buffer_bytes: self.buffer_bytes,
                    readable_bytes: self
                        .buffer_bytes
                        .min(file_size.saturating_sub(start_offset)),
                }
            })
            .collect()
    }
}

impl ChunkTask {
    /// End of the nominal range (exclusive)
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.buffer_bytes
    }
}
