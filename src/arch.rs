use crate::result::*;

/// A checked cast from u32 to usize
///
/// Every offset and length in an HROT archive is 32 bits,
/// which fits in a usize on anything but 16-bit targets.
pub fn usize<I: Into<u64>>(i: I) -> HrotResult<usize> {
    let i: u64 = i.into();
    usize::try_from(i).map_err(|_| HrotError::InsufficientAddressSpace)
}
