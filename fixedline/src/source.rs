//! Positioned access to the input file.
//!
//! Every read names its own offset. Workers share one [`InputSource`] by
//! reference and never touch a shared cursor, so concurrent reads of
//! different chunks cannot disturb each other.

use memmap2::Mmap;
use std::fs::File;
use std::io;
use tracing::{debug, trace, warn};

use crate::config::ReadStrategy;

/// Inputs at or above this size are memory mapped under [`ReadStrategy::Auto`]
pub(crate) const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Which primitive a source uses to serve reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Positioned,
    Mmap,
}

/// Read-only input that serves reads at explicit offsets
pub trait InputSource: Send + Sync {
    /// Total length of the input in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads into `buf` starting at `offset`, returning the number of bytes read.
    /// Returns 0 at or past the end of the input.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    fn kind(&self) -> SourceKind;
}

/// Offset reads on an open file handle (`pread` on unix, `seek_read` on windows)
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl InputSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Positioned
    }
}

/// Reads served from a read-only memory map of the whole input
#[derive(Debug)]
pub struct MmapSource {
    mmap: Mmap,
}

impl MmapSource {
    pub fn new(file: &File) -> io::Result<Self> {
        // The input is opened read-only and not modified for the duration of the run.
        let mmap = unsafe { Mmap::map(file) }?;
        Ok(Self { mmap })
    }
}

impl InputSource for MmapSource {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.mmap.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.mmap.len() - start);
        buf[..n].copy_from_slice(&self.mmap[start..start + n]);
        Ok(n)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Mmap
    }
}

/// Opens the input with the configured read strategy.
///
/// `Auto` maps inputs of at least 10MB and falls back to offset reads if the
/// mapping fails.
pub fn open_source(file: File, strategy: ReadStrategy) -> io::Result<Box<dyn InputSource>> {
    let len = file.metadata()?.len();
    match strategy {
        ReadStrategy::Positioned => Ok(Box::new(FileSource::new(file)?)),
        ReadStrategy::Mmap => Ok(Box::new(MmapSource::new(&file)?)),
        ReadStrategy::Auto if len >= LARGE_FILE_THRESHOLD => match MmapSource::new(&file) {
            Ok(source) => {
                debug!("Memory mapping {} byte input", len);
                Ok(Box::new(source))
            }
            Err(e) => {
                warn!("Memory map failed, using positioned reads: {}", e);
                Ok(Box::new(FileSource::new(file)?))
            }
        },
        ReadStrategy::Auto => Ok(Box::new(FileSource::new(file)?)),
    }
}

/// Reads up to `max_len` bytes starting at `offset`.
///
/// Short reads are retried until the buffer is full or the input ends, so the
/// returned length is `max_len` unless the range runs past the end of the input.
pub fn read_chunk(source: &dyn InputSource, offset: u64, max_len: usize) -> io::Result<Vec<u8>> {
    if max_len == 0 {
        return Ok(Vec::new());
    }
    let mut buf = vec![0u8; max_len];
    let mut read = 0usize;
    while read < buf.len() {
        match source.read_at(offset + read as u64, &mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    trace!("Read {} of {} bytes at offset {}", read, max_len, offset);
    buf.truncate(read);
    Ok(buf)
}
