//! Tools for reading an HROT pack.
//!
//! To start reading an archive, first create an [`HrotArchive`] from its bytes,
//! then walk its [`entries()`](HrotArchive::entries) and
//! [`resolve()`](HrotArchive::resolve) each one into a path and a slice of data.
//!
//! [`HrotArchive`]: struct.HrotArchive.html

use std::borrow::Cow;
use std::iter::{Enumerate, FusedIterator};
use std::slice::ChunksExact;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use codepage_437::*;
use log::*;

use crate::arch::usize;
use crate::result::*;
use crate::spec::{self, Header, TocRecord};

/// An entry's table of contents record, decoded but not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata<'a> {
    /// Position of the record in the table of contents
    pub index: usize,

    /// The name stored in the record, as-is.
    ///
    /// This comes straight from the archive and might not be a safe path.
    /// Use [`HrotArchive::resolve()`] to get one that is.
    pub name: Cow<'a, str>,

    /// Absolute offset of the entry's data in the archive
    pub offset: u32,

    /// Size of the entry's data in bytes
    pub size: u32,
}

impl<'a> EntryMetadata<'a> {
    fn from_record(index: usize, record: &TocRecord<'a>) -> Self {
        let name_bytes = record.name_bytes();
        // Packs were made by a Windows tool that wrote names in the local
        // code page. If they aren't UTF-8, CP437 is the best we can guess.
        let name = match std::str::from_utf8(name_bytes) {
            Ok(utf8) => Cow::Borrowed(utf8),
            Err(_) => Cow::borrow_from_cp437(name_bytes, &CP437_CONTROL),
        };
        Self {
            index,
            name,
            offset: record.offset,
            size: record.size,
        }
    }

    pub fn into_owned(self) -> EntryMetadata<'static> {
        EntryMetadata {
            name: Cow::Owned(self.name.into_owned()),
            ..self
        }
    }
}

/// A validated entry, ready to be written out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<'a> {
    /// Position of the entry's record in the table of contents
    pub index: usize,

    /// The name stored in the record, as-is
    pub name: Cow<'a, str>,

    /// A relative path that stays inside whatever directory it's joined to
    pub path: Utf8PathBuf,

    /// The entry's contents, borrowed from the archive
    pub data: &'a [u8],
}

/// An HROT pack to be read
#[derive(Debug, Clone, Copy)]
pub struct HrotArchive<'a> {
    /// The contents of the archive, as a byte slice.
    mapping: &'a [u8],
    header: Header,
    /// Just the table of contents, already checked against `mapping`
    toc: &'a [u8],
}

impl<'a> HrotArchive<'a> {
    /// Reads an HROT pack from a byte slice.
    ///
    /// ```no_run
    /// # use hrot::*;
    /// let source = ArchiveSource::open("assets.pak")?;
    /// let archive = HrotArchive::new(&source)?;
    /// for metadata in archive.entries() {
    ///     let entry = archive.resolve(&metadata)?;
    ///     println!("{}: {} bytes", entry.path, entry.data.len());
    /// }
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// If the table of contents isn't a whole number of records long,
    /// the leftover bytes are ignored. Use [`HrotArchive::strict()`]
    /// to reject such archives instead.
    pub fn new(mapping: &'a [u8]) -> HrotResult<Self> {
        let archive = Self::parse(mapping)?;
        let remainder = archive.toc_remainder();
        if remainder != 0 {
            warn!(
                "Table of contents is {} bytes, ignoring {} trailing bytes",
                archive.header.toc_size, remainder
            );
        }
        Ok(archive)
    }

    /// Like `HrotArchive::new()`, but fails with [`HrotError::CorruptToc`]
    /// if the table of contents isn't a whole number of records long.
    pub fn strict(mapping: &'a [u8]) -> HrotResult<Self> {
        let archive = Self::parse(mapping)?;
        if archive.toc_remainder() != 0 {
            return Err(HrotError::CorruptToc(
                "Table of contents size isn't a multiple of the record size",
            ));
        }
        Ok(archive)
    }

    fn parse(mapping: &'a [u8]) -> HrotResult<Self> {
        let header = Header::parse(mapping)?;
        trace!("{:?}", header);

        if header.magic != spec::MAGIC {
            return Err(HrotError::InvalidMagic(header.magic));
        }

        let toc_start = usize(header.toc_offset)?;
        if toc_start > mapping.len() {
            return Err(HrotError::CorruptToc(
                "Table of contents starts past the end of the archive",
            ));
        }
        let toc_end = header
            .toc_offset
            .checked_add(header.toc_size)
            .ok_or(HrotError::CorruptToc(
                "Table of contents offset + size overflows",
            ))?;
        let toc_end = usize(toc_end)?;
        if toc_end > mapping.len() {
            return Err(HrotError::CorruptToc(
                "Table of contents runs past the end of the archive",
            ));
        }

        let toc = &mapping[toc_start..toc_end];
        debug!(
            "{} entries at offset {}",
            toc.len() / spec::RECORD_SIZE,
            toc_start
        );

        Ok(Self {
            mapping,
            header,
            toc,
        })
    }

    fn toc_remainder(&self) -> usize {
        self.toc.len() % spec::RECORD_SIZE
    }

    /// Returns the archive's (validated) header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the whole archive this was read from.
    pub fn mapping(&self) -> &'a [u8] {
        self.mapping
    }

    /// Returns the number of records in the table of contents.
    pub fn len(&self) -> usize {
        self.toc.len() / spec::RECORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the table of contents.
    ///
    /// Records are decoded as they're reached, and each call starts over
    /// from the first one. No effort is made to validate them here:
    /// that's what [`HrotArchive::resolve()`] is for.
    pub fn entries(&self) -> TocIter<'a> {
        TocIter {
            records: self.toc.chunks_exact(spec::RECORD_SIZE).enumerate(),
        }
    }

    /// Checks the given entry against the archive, returning its
    /// sanitized path and its data.
    ///
    /// The data isn't copied, so entries can be handed off to as many
    /// threads as you'd like while the archive is alive.
    pub fn resolve(&self, metadata: &EntryMetadata<'a>) -> HrotResult<Entry<'a>> {
        let range_error = || HrotError::InvalidEntryRange {
            index: metadata.index,
            name: metadata.name.clone().into_owned(),
            offset: metadata.offset,
            size: metadata.size,
            archive_len: self.mapping.len(),
        };

        let end = metadata
            .offset
            .checked_add(metadata.size)
            .ok_or_else(range_error)?;
        let start = usize(metadata.offset)?;
        let end = usize(end)?;
        if end > self.mapping.len() {
            return Err(range_error());
        }

        let path = sanitize_path(&metadata.name).map_err(|reason| HrotError::UnsafeEntryPath {
            index: metadata.index,
            name: metadata.name.clone().into_owned(),
            reason,
        })?;

        Ok(Entry {
            index: metadata.index,
            name: metadata.name.clone(),
            path,
            data: &self.mapping[start..end],
        })
    }
}

/// Iterates over the records in an archive's table of contents
///
/// Trailing bytes that don't make up a whole record are skipped.
#[derive(Debug, Clone)]
pub struct TocIter<'a> {
    records: Enumerate<ChunksExact<'a, u8>>,
}

impl<'a> Iterator for TocIter<'a> {
    type Item = EntryMetadata<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, bytes) = self.records.next()?;
        let record = TocRecord::parse(bytes);
        trace!("{:?}", record);
        Some(EntryMetadata::from_record(index, &record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for TocIter<'_> {}

impl FusedIterator for TocIter<'_> {}

/// Turns a name from the archive into a relative path that can't escape
/// the directory it's extracted into.
///
/// Both `/` and `\` separate components.
/// Empty and `.` components are dropped,
/// while `..`, rooted paths, and drive prefixes are refused.
/// So are names Windows would turn into something else:
/// device names like `NUL` or `com1.txt`, and components ending in a dot or
/// space, which Windows silently trims. These are refused on every platform
/// so that a pack extracts to the same tree everywhere.
pub fn sanitize_path(name: &str) -> Result<Utf8PathBuf, &'static str> {
    if name.starts_with(&['/', '\\'][..]) {
        return Err("rooted path");
    }

    let normalized = name.replace('\\', "/");
    let mut path = Utf8PathBuf::new();

    for component in Utf8Path::new(&normalized).components() {
        match component {
            Utf8Component::Prefix(_) => return Err("path prefix"),
            Utf8Component::RootDir => return Err("rooted path"),
            Utf8Component::ParentDir => return Err("parent dir (..)"),
            Utf8Component::CurDir => {}
            Utf8Component::Normal(part) => {
                // C:, or NTFS stream names like foo:bar
                if part.contains(':') {
                    return Err("drive or stream specifier");
                }
                if part.ends_with(&['.', ' '][..]) {
                    return Err("trailing dot or space");
                }
                if is_device_name(part) {
                    return Err("reserved device name");
                }
                path.push(part);
            }
        }
    }

    if path.as_str().is_empty() {
        return Err("empty path");
    }
    Ok(path)
}

/// Returns true if Windows would open a device instead of a file named `part`.
///
/// The extension doesn't matter (`nul.txt` is still NUL), and neither does case.
fn is_device_name(part: &str) -> bool {
    const DEVICES: [&str; 4] = ["CON", "PRN", "AUX", "NUL"];

    let stem = part.split('.').next().unwrap_or(part).trim_end_matches(' ');
    if DEVICES.iter().any(|d| stem.eq_ignore_ascii_case(d)) {
        return true;
    }
    // COM1-COM9, LPT1-LPT9
    match stem.as_bytes() {
        [a, b, c, digit] => {
            let port = [*a, *b, *c];
            (port.eq_ignore_ascii_case(b"COM") || port.eq_ignore_ascii_case(b"LPT"))
                && (b'1'..=b'9').contains(digit)
        }
        _ => false,
    }
}
