//! Where the archive's bytes come from.
//!
//! [`HrotArchive`](crate::HrotArchive) only needs a `&[u8]`, so any buffer
//! will do. [`ArchiveSource`] is a convenience that owns one for as long as
//! extraction runs, memory-mapping the file when it can.

use std::fs::{self, File};
use std::io::{self, Read};
use std::ops::Deref;
use std::path::Path;

use log::*;
#[cfg(feature = "mmap")]
use memmap2::Mmap;

use crate::result::*;

/// The bytes of an archive, either mapped from a file or read into memory.
///
/// Derefs to `[u8]`, and the mapping (or buffer) is released on drop.
#[derive(Debug)]
pub enum ArchiveSource {
    #[cfg(feature = "mmap")]
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl ArchiveSource {
    /// Opens the archive at the given path.
    ///
    /// With the `mmap` feature (on by default), the file is memory-mapped.
    /// Otherwise it's read into a buffer.
    pub fn open<P: AsRef<Path>>(path: P) -> HrotResult<Self> {
        let path = path.as_ref();
        #[cfg(feature = "mmap")]
        {
            info!("Memory mapping {}", path.display());
            let file = File::open(path)?;
            if file.metadata()?.len() == 0 {
                return Err(empty_archive());
            }
            // The mapping is read-only; another process truncating the file
            // out from under us is the usual mmap caveat.
            let mapping = unsafe { Mmap::map(&file)? };
            Ok(ArchiveSource::Mapped(mapping))
        }
        #[cfg(not(feature = "mmap"))]
        {
            Self::read(path)
        }
    }

    /// Reads the whole archive at the given path into memory.
    pub fn read<P: AsRef<Path>>(path: P) -> HrotResult<Self> {
        let path = path.as_ref();
        info!("Reading {}", path.display());
        Self::from_bytes(fs::read(path)?)
    }

    /// Reads everything from the given reader into memory.
    pub fn from_reader<R: Read>(mut reader: R) -> HrotResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes)
    }

    /// Wraps bytes already in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> HrotResult<Self> {
        if bytes.is_empty() {
            return Err(empty_archive());
        }
        Ok(ArchiveSource::Buffered(bytes))
    }
}

fn empty_archive() -> HrotError {
    HrotError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "Archive is empty",
    ))
}

impl Deref for ArchiveSource {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            #[cfg(feature = "mmap")]
            ArchiveSource::Mapped(mapping) => &mapping[..],
            ArchiveSource::Buffered(bytes) => &bytes[..],
        }
    }
}

impl AsRef<[u8]> for ArchiveSource {
    fn as_ref(&self) -> &[u8] {
        self
    }
}
