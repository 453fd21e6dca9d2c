//! Serialized access to the output file.
//!
//! [`OutputGate`] admits one writer at a time and imposes no order: chunks
//! land in the order their workers acquire the gate. [`OrderedOutput`] sits in
//! front of a gate and holds finished chunks back until every lower chunk
//! index has been written or skipped.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::errors::{ChunkError, ChunkResult};

/// Destination for the text produced by chunk workers
pub trait ChunkSink: Send + Sync {
    /// Hands over the rebuilt text of chunk `index`.
    /// An error returned here belongs to chunk `index`.
    fn submit(&self, index: usize, payload: &[u8]) -> ChunkResult<()>;

    /// Records that chunk `index` produced no output (empty range or failure)
    fn skip(&self, index: usize);

    /// Completes the run and returns write failures that surfaced after the
    /// owning chunk had already been submitted.
    fn finish(&self) -> Vec<ChunkError>;
}

/// Mutual-exclusion guard around the single shared output writer
#[derive(Debug)]
pub struct OutputGate<W> {
    writer: Mutex<W>,
}

fn poisoned<T>(_: PoisonError<T>) -> io::Error {
    io::Error::new(io::ErrorKind::Other, "output gate poisoned by a panicked writer")
}

impl<W: Write> OutputGate<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Blocks until no other holder is active. Dropping the guard releases the gate.
    pub fn acquire(&self) -> io::Result<MutexGuard<'_, W>> {
        self.writer.lock().map_err(poisoned)
    }

    /// Writes `payload` as one uninterrupted write while holding the gate
    pub fn write_exclusive(&self, payload: &[u8]) -> io::Result<()> {
        let mut writer = self.acquire()?;
        writer.write_all(payload)?;
        writer.flush()
    }

    /// Releases the underlying writer
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(poisoned)
    }
}

impl<W: Write + Send> ChunkSink for OutputGate<W> {
    fn submit(&self, index: usize, payload: &[u8]) -> ChunkResult<()> {
        trace!("Chunk {} writing {} bytes", index, payload.len());
        self.write_exclusive(payload)
            .map_err(|source| ChunkError::ChunkWrite { index, source })
    }

    fn skip(&self, _index: usize) {}

    fn finish(&self) -> Vec<ChunkError> {
        match self.acquire().and_then(|mut w| w.flush()) {
            Ok(()) => Vec::new(),
            Err(source) => vec![ChunkError::IoError(source)],
        }
    }
}

#[derive(Debug, Default)]
struct Sequence {
    next: usize,
    // None marks a skipped chunk
    pending: BTreeMap<usize, Option<Vec<u8>>>,
    failures: Vec<ChunkError>,
}

/// Re-sequencing sink that writes chunks strictly in index order
#[derive(Debug)]
pub struct OrderedOutput<W> {
    gate: OutputGate<W>,
    sequence: Mutex<Sequence>,
}

impl<W: Write> OrderedOutput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            gate: OutputGate::new(writer),
            sequence: Mutex::new(Sequence::default()),
        }
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.gate.into_inner()
    }

    fn sequence(&self) -> MutexGuard<'_, Sequence> {
        self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entry(&self, seq: &mut Sequence, index: usize, entry: Option<Vec<u8>>) {
        if let Some(payload) = entry {
            if let Err(source) = self.gate.write_exclusive(&payload) {
                seq.failures.push(ChunkError::ChunkWrite { index, source });
            }
        }
    }

    // Writes the contiguous run of held chunks starting at `next`
    fn drain_ready(&self, seq: &mut Sequence) {
        while let Some(entry) = seq.pending.remove(&seq.next) {
            let index = seq.next;
            self.write_entry(seq, index, entry);
            seq.next += 1;
        }
    }
}

impl<W: Write + Send> ChunkSink for OrderedOutput<W> {
    fn submit(&self, index: usize, payload: &[u8]) -> ChunkResult<()> {
        let mut seq = self.sequence();
        seq.pending.insert(index, Some(payload.to_vec()));
        if index != seq.next {
            debug!(
                "Holding chunk {} until chunk {} is written",
                index, seq.next
            );
        }
        self.drain_ready(&mut seq);
        Ok(())
    }

    fn skip(&self, index: usize) {
        let mut seq = self.sequence();
        seq.pending.insert(index, None);
        self.drain_ready(&mut seq);
    }

    fn finish(&self) -> Vec<ChunkError> {
        let mut seq = self.sequence();
        // Anything still held means an index was never reported; keep the
        // remaining chunks in index order rather than dropping them.
        let held = std::mem::take(&mut seq.pending);
        for (index, entry) in held {
            self.write_entry(&mut seq, index, entry);
            seq.next = index + 1;
        }
        let mut failures = std::mem::take(&mut seq.failures);
        if let Err(source) = self.gate.acquire().and_then(|mut w| w.flush()) {
            failures.push(ChunkError::IoError(source));
        }
        failures
    }
}
