use std::borrow::Cow;
use std::str::Utf8Error;
use tracing::{debug, trace, warn};

use super::planner::ChunkTask;
use super::probe::LinePlan;
use crate::config::EncodingMode;
use crate::errors::{ChunkError, ChunkResult};
use crate::gate::ChunkSink;
use crate::metrics::RunMetrics;
use crate::results::{ChunkOutcome, ChunkStatus};
use crate::source::{read_chunk, InputSource};

/// Text rebuilt from one chunk's bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChunk {
    pub text: String,
    /// Number of strides decoded; the last one may be a partial line
    pub lines: u64,
    /// True if lossy decoding replaced at least one invalid sequence
    pub replaced: bool,
}

/// Invalid UTF-8 in the stride starting at `offset` within the chunk buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrideError {
    pub offset: usize,
    pub source: Utf8Error,
}

/// Helper function to decode one stride according to encoding mode
fn decode_stride(bytes: &[u8], encoding_mode: EncodingMode) -> Result<Cow<'_, str>, Utf8Error> {
    match encoding_mode {
        EncodingMode::FailFast => std::str::from_utf8(bytes).map(Cow::Borrowed),
        EncodingMode::Lossy => Ok(String::from_utf8_lossy(bytes)),
    }
}

/// Splits `bytes` into strides of `line_bytes` and decodes each one.
///
/// The final stride is bounded by the bytes actually present, so a short read
/// at the end of the input yields a short last line instead of an error.
pub fn parse_lines(
    bytes: &[u8],
    line_bytes: usize,
    encoding_mode: EncodingMode,
) -> Result<ParsedChunk, StrideError> {
    let stride = line_bytes.max(1);
    let mut text = String::with_capacity(bytes.len());
    let mut lines = 0u64;
    let mut replaced = false;

    for (i, line) in bytes.chunks(stride).enumerate() {
        let decoded = decode_stride(line, encoding_mode).map_err(|source| StrideError {
            offset: i * stride,
            source,
        })?;
        // from_utf8_lossy only allocates when it had to replace something
        if let Cow::Owned(_) = decoded {
            replaced = true;
        }
        text.push_str(&decoded);
        lines += 1;
    }

    Ok(ParsedChunk {
        text,
        lines,
        replaced,
    })
}

/// Reads, parses and submits one chunk at a time
#[derive(Debug, Clone)]
pub struct ChunkWorker {
    line: LinePlan,
    encoding_mode: EncodingMode,
    metrics: RunMetrics,
}

impl ChunkWorker {
    pub fn new(line: LinePlan, encoding_mode: EncodingMode, metrics: RunMetrics) -> Self {
        Self {
            line,
            encoding_mode,
            metrics,
        }
    }

    /// Gets the metrics shared with the other workers of the run
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Processes `task` and reports its outcome. Failures stay local to the chunk.
    pub fn process(
        &self,
        task: &ChunkTask,
        source: &dyn InputSource,
        sink: &dyn ChunkSink,
    ) -> ChunkOutcome {
        debug!(
            "Chunk {} starting at offset {} ({} bytes)",
            task.index, task.start_offset, task.readable_bytes
        );

        let status = match self.process_chunk(task, source, sink) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    "Chunk {} failed, its lines are missing from the output: {}",
                    task.index, e
                );
                self.metrics.record_failed();
                sink.skip(task.index);
                ChunkStatus::Failed { error: e }
            }
        };

        ChunkOutcome {
            index: task.index,
            start_offset: task.start_offset,
            status,
        }
    }

    fn process_chunk(
        &self,
        task: &ChunkTask,
        source: &dyn InputSource,
        sink: &dyn ChunkSink,
    ) -> ChunkResult<ChunkStatus> {
        let index = task.index;
        let read_error = |err: std::io::Error| ChunkError::ChunkRead { index, source: err };

        let len = usize::try_from(task.readable_bytes).map_err(|_| {
            read_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "chunk does not fit in memory",
            ))
        })?;
        let bytes = read_chunk(source, task.start_offset, len).map_err(read_error)?;
        self.metrics.record_read(source.kind(), bytes.len() as u64);

        if bytes.is_empty() {
            trace!("Chunk {} is past the end of the input", index);
            self.metrics.record_empty();
            sink.skip(index);
            return Ok(ChunkStatus::Empty);
        }

        let parsed = parse_lines(&bytes, self.line.line_bytes as usize, self.encoding_mode)
            .map_err(|e| ChunkError::ChunkEncoding {
                index,
                offset: task.start_offset + e.offset as u64,
                source: e.source,
            })?;
        if parsed.replaced {
            warn!("Invalid UTF-8 replaced in chunk {}", index);
        }

        sink.submit(index, parsed.text.as_bytes())?;

        let written = parsed.text.len() as u64;
        self.metrics.record_written(written, parsed.lines);
        debug!("Chunk {} wrote {} lines ({} bytes)", index, parsed.lines, written);

        Ok(ChunkStatus::Written {
            lines: parsed.lines,
            bytes: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{OrderedOutput, OutputGate};
    use crate::source::SourceKind;
    use std::io;

    /// In-memory source for driving workers without a file
    struct MemorySource(Vec<u8>);

    impl InputSource for MemorySource {
        fn len(&self) -> u64 {
            self.0.len() as u64
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Positioned
        }
    }

    struct FailingSource;

    impl InputSource for FailingSource {
        fn len(&self) -> u64 {
            100
        }

        fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device went away"))
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Positioned
        }
    }

    fn task(index: usize, start_offset: u64, buffer_bytes: u64, readable_bytes: u64) -> ChunkTask {
        ChunkTask {
            index,
            start_offset,
            line_count: buffer_bytes / 5,
            buffer_bytes,
            readable_bytes,
        }
    }

    fn worker(mode: EncodingMode) -> ChunkWorker {
        ChunkWorker::new(LinePlan::new(5, 2).unwrap(), mode, RunMetrics::new())
    }

    #[test]
    fn test_parse_full_strides() {
        let parsed = parse_lines(b"abc\r\ndef\r\nghi\r\n", 5, EncodingMode::FailFast).unwrap();
        assert_eq!(parsed.text, "abc\r\ndef\r\nghi\r\n");
        assert_eq!(parsed.lines, 3);
        assert!(!parsed.replaced);
    }

    #[test]
    fn test_parse_short_final_stride() {
        let parsed = parse_lines(b"abc\r\ndef\r\ngh", 5, EncodingMode::FailFast).unwrap();
        assert_eq!(parsed.text, "abc\r\ndef\r\ngh");
        assert_eq!(parsed.lines, 3);
    }

    #[test]
    fn test_parse_multibyte_lines() {
        // "é" is two bytes, so each line is 4 bytes including \n
        let parsed = parse_lines("aé\nbé\n".as_bytes(), 4, EncodingMode::FailFast).unwrap();
        assert_eq!(parsed.text, "aé\nbé\n");
        assert_eq!(parsed.lines, 2);
    }

    #[test]
    fn test_parse_invalid_utf8_failfast() {
        let err = parse_lines(b"abc\r\nd\xffe\r\n", 5, EncodingMode::FailFast).unwrap_err();
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn test_parse_invalid_utf8_lossy() {
        let parsed = parse_lines(b"abc\r\nd\xffe\r\n", 5, EncodingMode::Lossy).unwrap();
        assert_eq!(parsed.text, "abc\r\nd\u{FFFD}e\r\n");
        assert!(parsed.replaced);
    }

    #[test]
    fn test_process_writes_chunk() {
        let source = MemorySource(b"aaa\r\nbbb\r\nccc\r\nddd\r\n".to_vec());
        let sink = OutputGate::new(Vec::new());
        let worker = worker(EncodingMode::FailFast);

        let outcome = worker.process(&task(1, 10, 10, 10), &source, &sink);
        assert_eq!(outcome.index, 1);
        assert!(matches!(
            outcome.status,
            ChunkStatus::Written { lines: 2, bytes: 10 }
        ));
        assert_eq!(sink.into_inner().unwrap(), b"ccc\r\nddd\r\n");

        let stats = worker.metrics().get_stats();
        assert_eq!(stats.bytes_read, 10);
        assert_eq!(stats.chunks_written, 1);
    }

    #[test]
    fn test_process_past_end_is_empty() {
        let source = MemorySource(b"aaa\r\n".to_vec());
        let sink = OrderedOutput::new(Vec::new());
        let worker = worker(EncodingMode::FailFast);

        let outcome = worker.process(&task(0, 5, 10, 0), &source, &sink);
        assert!(matches!(outcome.status, ChunkStatus::Empty));
        assert!(sink.finish().is_empty());
        assert!(sink.into_inner().unwrap().is_empty());
        assert_eq!(worker.metrics().get_stats().chunks_empty, 1);
    }

    #[test]
    fn test_process_read_failure_is_local() {
        let sink = OrderedOutput::new(Vec::new());
        let worker = worker(EncodingMode::FailFast);

        let outcome = worker.process(&task(0, 0, 10, 10), &FailingSource, &sink);
        assert!(matches!(
            outcome.status,
            ChunkStatus::Failed {
                error: ChunkError::ChunkRead { index: 0, .. }
            }
        ));

        // The failed chunk was skipped, so the next one is written straight away
        sink.submit(1, b"next\r\n").unwrap();
        assert_eq!(sink.into_inner().unwrap(), b"next\r\n");
        assert_eq!(worker.metrics().get_stats().chunks_failed, 1);
    }

    #[test]
    fn test_process_encoding_failure_reports_file_offset() {
        let source = MemorySource(b"aaa\r\nb\xffb\r\n".to_vec());
        let sink = OutputGate::new(Vec::new());
        let worker = worker(EncodingMode::FailFast);

        let outcome = worker.process(&task(0, 0, 10, 10), &source, &sink);
        assert!(matches!(
            outcome.status,
            ChunkStatus::Failed {
                error: ChunkError::ChunkEncoding {
                    index: 0,
                    offset: 5,
                    ..
                }
            }
        ));
        assert!(sink.into_inner().unwrap().is_empty());
    }
}
