use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::source::SourceKind;

/// Tracks I/O volume and chunk outcomes across all workers of a run
#[derive(Debug, Clone)]
pub struct RunMetrics {
    // I/O volume
    bytes_read: Arc<AtomicU64>,
    bytes_written: Arc<AtomicU64>,
    lines_written: Arc<AtomicU64>,

    // Chunk outcomes
    chunks_written: Arc<AtomicU64>,
    chunks_empty: Arc<AtomicU64>,
    chunks_failed: Arc<AtomicU64>,

    // Read primitive usage
    positioned_reads: Arc<AtomicU64>,
    mmap_reads: Arc<AtomicU64>,
}

impl RunMetrics {
    /// Creates a new RunMetrics instance
    pub fn new() -> Self {
        Self {
            bytes_read: Arc::new(AtomicU64::new(0)),
            bytes_written: Arc::new(AtomicU64::new(0)),
            lines_written: Arc::new(AtomicU64::new(0)),
            chunks_written: Arc::new(AtomicU64::new(0)),
            chunks_empty: Arc::new(AtomicU64::new(0)),
            chunks_failed: Arc::new(AtomicU64::new(0)),
            positioned_reads: Arc::new(AtomicU64::new(0)),
            mmap_reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a completed chunk read
    pub fn record_read(&self, kind: SourceKind, bytes: u64) {
        let total = self.bytes_read.fetch_add(bytes, Ordering::Relaxed) + bytes;
        match kind {
            SourceKind::Positioned => self.positioned_reads.fetch_add(1, Ordering::Relaxed),
            SourceKind::Mmap => self.mmap_reads.fetch_add(1, Ordering::Relaxed),
        };
        debug!("Read {} bytes, total read: {} bytes", bytes, total);
    }

    /// Records a chunk that reached the output sink
    pub fn record_written(&self, bytes: u64, lines: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.lines_written.fetch_add(lines, Ordering::Relaxed);
        self.chunks_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a chunk whose range held no bytes
    pub fn record_empty(&self) {
        self.chunks_empty.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a chunk that failed to read, decode or write
    pub fn record_failed(&self) {
        self.chunks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Moves a chunk counted as written to failed, undoing its volume counts.
    /// Used when a write failure surfaces after submission.
    pub fn record_late_failure(&self, bytes: u64, lines: u64) {
        self.bytes_written.fetch_sub(bytes, Ordering::Relaxed);
        self.lines_written.fetch_sub(lines, Ordering::Relaxed);
        self.chunks_written.fetch_sub(1, Ordering::Relaxed);
        self.chunks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets current statistics
    pub fn get_stats(&self) -> RunStats {
        RunStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            lines_written: self.lines_written.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            chunks_empty: self.chunks_empty.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            positioned_reads: self.positioned_reads.load(Ordering::Relaxed),
            mmap_reads: self.mmap_reads.load(Ordering::Relaxed),
        }
    }

    /// Logs current statistics
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Run stats:\n\
             Bytes read/written: {}/{}\n\
             Lines written: {}\n\
             Chunks written/empty/failed: {}/{}/{}\n\
             Reads (positioned/mmap): {}/{}",
            stats.bytes_read,
            stats.bytes_written,
            stats.lines_written,
            stats.chunks_written,
            stats.chunks_empty,
            stats.chunks_failed,
            stats.positioned_reads,
            stats.mmap_reads
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of run statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub lines_written: u64,
    pub chunks_written: u64,
    pub chunks_empty: u64,
    pub chunks_failed: u64,
    pub positioned_reads: u64,
    pub mmap_reads: u64,
}
