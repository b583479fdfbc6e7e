//! hrot reads HROT packs and extracts their entries with a simple API:
//!
//! ```no_run
//! # use std::fs;
//! # use hrot::*;
//! // For smaller files,
//! let bytes = fs::read("assets.pak")?;
//! let archive = HrotArchive::new(&bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//! works just fine. [`ArchiveSource`] memory maps larger ones for you:
//! ```no_run
//! # use std::sync::Arc;
//! # use std::sync::atomic::AtomicBool;
//! # use hrot::*;
//! #
//! let source = ArchiveSource::open("assets.pak")?;
//! let archive = HrotArchive::new(&source)?;
//!
//! // We can walk the table of contents directly...
//! for metadata in archive.entries() {
//!     // ...but nothing stops a record from pointing past the end of the
//!     // archive, or from naming a file like ../../.bashrc.
//!     // resolve() checks both before handing back the entry's bytes.
//!     match archive.resolve(&metadata) {
//!         Ok(entry) => println!("{} ({} bytes)", entry.path, entry.data.len()),
//!         Err(e) => eprintln!("Skipping {}: {}", metadata.name, e),
//!     }
//! }
//!
//! // Or let extract() do all of that, writing entries on four threads.
//! // Bad entries are skipped and reported instead of stopping the whole thing.
//! let sink = DirectorySink::new("assets")?;
//! let options = ExtractOptions {
//!     jobs: 4,
//!     cancel: Some(Arc::new(AtomicBool::new(false))),
//! };
//! let report = extract(&archive, &sink, &options)?;
//! for skipped in &report.skipped {
//!     eprintln!("{}: {}", skipped.name, skipped.error);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! An HROT pack is about as simple as archives get:
//! a 12-byte header pointing at a table of contents,
//! where each 128-byte record names a file and gives the byte range
//! holding its (uncompressed) contents.
//! Since every entry is just a slice of the archive,
//! nothing is copied until it's written out,
//! and entries can be written in parallel.

pub mod extract;
pub mod read;
pub mod result;
pub mod source;

pub use extract::{
    extract, DirectorySink, ExtractOptions, ExtractPlan, ExtractReport, OutputSink, SkippedEntry,
};
pub use read::{Entry, EntryMetadata, HrotArchive};
pub use result::{HrotError, HrotResult};
pub use source::ArchiveSource;
pub use spec::{Header, HEADER_SIZE, MAGIC, NAME_SIZE, RECORD_SIZE};

mod arch;
mod spec;
