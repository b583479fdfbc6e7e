//! Error types and the related `Result<T>`

use camino::Utf8PathBuf;
use thiserror::Error;

pub type HrotResult<T> = Result<T, HrotError>;

#[derive(Debug, Error)]
pub enum HrotError {
    /// An error from underlying I/O while opening or reading the archive
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The archive is too short to even hold its header.
    #[error("Truncated archive: {len} bytes is too short for a header")]
    TruncatedArchive { len: usize },

    /// The archive doesn't start with `HROT`.
    #[error("Invalid magic {0:02x?}, expected \"HROT\"")]
    InvalidMagic([u8; 4]),

    /// The header's table of contents doesn't fit in the archive.
    #[error("Corrupt table of contents: {0}")]
    CorruptToc(&'static str),

    /// A TOC record points outside the archive.
    #[error(
        "Entry {index} ({name}) spans {offset}+{size} bytes, \
         but the archive is only {archive_len} bytes"
    )]
    InvalidEntryRange {
        index: usize,
        name: String,
        offset: u32,
        size: u32,
        archive_len: usize,
    },

    /// A TOC record's name would land outside the output directory.
    #[error("Entry {index} has an unsafe path {name:?}: {reason}")]
    UnsafeEntryPath {
        index: usize,
        name: String,
        reason: &'static str,
    },

    /// A TOC record's path is already taken by an earlier record,
    /// either as the same file or as a file/directory clash.
    #[error("Entry {index} ({name}) collides with entry {first} at {path}")]
    DuplicateEntry {
        index: usize,
        name: String,
        path: Utf8PathBuf,
        first: usize,
    },

    /// Writing an extracted entry failed.
    #[error("Couldn't write {path}: {source}")]
    Output {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cast from a 32-bit archive offset to a usize failed,
    /// which only happens on targets with a 16-bit address space.
    #[error("Archive too large for address space")]
    InsufficientAddressSpace,

    /// The worker pool for parallel extraction couldn't be started.
    #[error("Couldn't build extraction thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl HrotError {
    /// Returns true if the error only concerns a single entry,
    /// so extraction of the remaining entries can go on.
    pub fn is_entry_level(&self) -> bool {
        matches!(
            self,
            HrotError::InvalidEntryRange { .. }
                | HrotError::UnsafeEntryPath { .. }
                | HrotError::DuplicateEntry { .. }
                | HrotError::Output { .. }
        )
    }
}
