//! Code specific to the HROT pack format.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] module.
//!
//! An HROT pack is laid out as
//!
//! ```text
//! [header]       12 bytes at offset 0
//! [file data]    anywhere, referenced by TOC records
//! [TOC record 1] 128 bytes each, starting at the header's TOC offset
//! .
//! .
//! .
//! [TOC record n]
//! ```
//!
//! Fields are packed with no padding and all integers are little-endian.
//!
//! [`read`]: ../read/index.html

use std::convert::TryInto;

use memchr::memchr;

use crate::result::*;

/// Header magic number
pub const MAGIC: [u8; 4] = *b"HROT";

/// Size of the header at the front of the archive
pub const HEADER_SIZE: usize = 12;

/// Size of each table of contents record
pub const RECORD_SIZE: usize = 128;

/// Size of the zero-padded name field at the front of a TOC record
pub const NAME_SIZE: usize = 120;

// Straight from the Rust docs:

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Data from the archive header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub toc_offset: u32,
    pub toc_size: u32,
}

impl Header {
    /// Decodes the header from the front of `header`.
    ///
    /// Only the length is checked here; the magic and TOC bounds are left to
    /// [`HrotArchive`](crate::HrotArchive).
    pub fn parse(mut header: &[u8]) -> HrotResult<Self> {
        if header.len() < HEADER_SIZE {
            return Err(HrotError::TruncatedArchive { len: header.len() });
        }
        // magic        4 bytes  ("HROT")
        // TOC offset   4 bytes
        // TOC size     4 bytes
        let (magic, rest) = header.split_at(MAGIC.len());
        let magic: [u8; 4] = magic.try_into().expect("less than four bytes for magic");
        header = rest;
        let toc_offset = read_u32(&mut header);
        let toc_size = read_u32(&mut header);

        Ok(Self {
            magic,
            toc_offset,
            toc_size,
        })
    }
}

/// Data from a table of contents record
///
/// Each of these describes one file stored in the archive.
#[derive(Debug, Clone, Copy)]
pub struct TocRecord<'a> {
    pub name: &'a [u8],
    pub offset: u32,
    pub size: u32,
}

impl<'a> TocRecord<'a> {
    /// Decodes a record from the front of `record`.
    ///
    /// The caller must make sure at least [`RECORD_SIZE`] bytes are present.
    pub(crate) fn parse(mut record: &'a [u8]) -> Self {
        // name     120 bytes  (zero-padded)
        // offset     4 bytes
        // size       4 bytes
        let (name, rest) = record.split_at(NAME_SIZE);
        record = rest;
        let offset = read_u32(&mut record);
        let size = read_u32(&mut record);

        Self { name, offset, size }
    }

    /// Returns the name up to its first NUL.
    ///
    /// A name that fills the whole field without a terminator is fine;
    /// we take all of it.
    pub fn name_bytes(&self) -> &'a [u8] {
        match memchr(0, self.name) {
            Some(nul) => &self.name[..nul],
            None => self.name,
        }
    }
}
