use serde::Serialize;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, trace};

use crate::errors::{ChunkError, ChunkResult};
use crate::source::InputSource;

/// Uniform byte width of every line in the input, terminator included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinePlan {
    /// Bytes per line including the terminator; always greater than zero
    pub line_bytes: u64,
    /// Bytes of the terminator observed on the first line (2 for `\r\n`, 1 for `\n`)
    pub terminator_bytes: u64,
}

impl LinePlan {
    /// Returns `None` for a zero width
    pub fn new(line_bytes: u64, terminator_bytes: u64) -> Option<Self> {
        (line_bytes > 0 && terminator_bytes <= line_bytes).then_some(Self {
            line_bytes,
            terminator_bytes,
        })
    }

    /// Width of the line content without its terminator
    pub fn content_bytes(&self) -> u64 {
        self.line_bytes - self.terminator_bytes
    }
}

/// Reads the first line of `reader` and derives the line width from it.
///
/// The reader's position is only meaningful to the probe itself; chunk reads
/// use explicit offsets.
pub fn probe_line_plan<R: BufRead>(reader: &mut R, path: &Path) -> ChunkResult<LinePlan> {
    let mut first = Vec::new();
    let read = reader.read_until(b'\n', &mut first)?;
    if read == 0 {
        return Err(ChunkError::empty_input(path));
    }

    let terminator_bytes = if first.ends_with(b"\r\n") {
        2
    } else if first.ends_with(b"\n") {
        1
    } else {
        0
    };

    debug!(
        "First line of {} is {} bytes ({} byte terminator)",
        path.display(),
        read,
        terminator_bytes
    );
    LinePlan::new(read as u64, terminator_bytes).ok_or_else(|| ChunkError::empty_input(path))
}

/// Picks up to `samples` zero-based line numbers spread evenly over `0..lines`
fn sample_lines(lines: u64, samples: usize) -> Vec<u64> {
    let samples = samples as u64;
    if lines == 0 || samples == 0 {
        return Vec::new();
    }
    if lines <= samples {
        return (0..lines).collect();
    }
    let last = lines - 1;
    let steps = (samples - 1).max(1);
    let mut picked: Vec<u64> = (0..samples).map(|i| i * last / steps).collect();
    picked.dedup();
    picked
}

/// Checks sampled lines against the width derived from the first line.
///
/// Each sampled line must end with the same terminator where the uniform width
/// predicts. A trailing partial line is accepted only if it is exactly one
/// unterminated line.
pub fn verify_line_width(
    source: &dyn InputSource,
    line: &LinePlan,
    samples: usize,
    path: &Path,
) -> ChunkResult<()> {
    if line.terminator_bytes == 0 {
        // The first line ran to the end of the input; it is the only line.
        return Ok(());
    }

    let len = source.len();
    let width = line.line_bytes;
    let full_lines = len / width;
    let remainder = len % width;

    let terminator: &[u8] = if line.terminator_bytes == 2 {
        b"\r\n"
    } else {
        b"\n"
    };
    let mut tail = [0u8; 2];
    let tail = &mut tail[..terminator.len()];

    for index in sample_lines(full_lines, samples) {
        let offset = (index + 1) * width - terminator.len() as u64;
        let read = source.read_at(offset, tail)?;
        trace!("Sampled line {} terminator at offset {}", index + 1, offset);
        if read != tail.len() || tail != terminator {
            return Err(ChunkError::line_width_mismatch(path, index + 1, width));
        }
    }

    if remainder != 0 && remainder != line.content_bytes() {
        return Err(ChunkError::line_width_mismatch(path, full_lines + 1, width));
    }
    Ok(())
}
