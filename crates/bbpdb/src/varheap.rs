//! Decoding of the offsets stored in the primary heap of variable-width
//! columns.

use crate::{Oid, Var, Version};

/// Number of buckets in the string hash table at the start of a variable heap.
pub const STRHASHTABLE: usize = 1 << 10;
/// Width of one string hash bucket.
pub const STRIDX_SIZE: usize = if size_of::<Oid>() < size_of::<usize>() {
    2
} else {
    size_of::<Oid>()
};
/// Byte size of the string hash table.
pub const STRHASHSIZE: usize = STRHASHTABLE * STRIDX_SIZE;
/// Offsets were stored in units of `1 << VARSHIFT` bytes in older stores.
pub const VARSHIFT: u32 = 3;

/// How stored offsets map to byte positions in the variable heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarEra {
    /// Offsets count `1 << VARSHIFT` byte units.
    Shifted,
    /// Offsets count bytes.
    Bytes,
}

impl VarEra {
    pub fn for_version(version: Version) -> Self {
        if version.needs_migration() {
            Self::Shifted
        } else {
            Self::Bytes
        }
    }

    /// Bias added to 1- and 2-byte offsets.
    #[inline]
    pub const fn var_offset(self) -> usize {
        match self {
            Self::Shifted => STRHASHSIZE >> VARSHIFT,
            Self::Bytes => STRHASHSIZE,
        }
    }
}

/// Whether `width` is a valid offset width on this build.
#[inline]
pub fn is_offset_width(width: u16) -> bool {
    match width {
        1 | 2 | 4 => true,
        8 => size_of::<usize>() == 8,
        _ => false,
    }
}

/// Byte offset into the variable heap of the value at position `p`.
///
/// `base` is the primary heap holding offsets of `width` bytes each. Returns
/// `None` when `p` lies past `base` or `width` is not an offset width.
#[inline]
pub fn var_heap_val(base: &[u8], p: usize, width: u16, era: VarEra) -> Option<usize> {
    let w = width as usize;
    let start = p.checked_mul(w)?;
    let bytes = base.get(start..start.checked_add(w)?)?;
    let raw = match width {
        1 => bytes[0] as usize + era.var_offset(),
        2 => u16::from_ne_bytes([bytes[0], bytes[1]]) as usize + era.var_offset(),
        4 => u32::from_ne_bytes(bytes.try_into().ok()?) as usize,
        8 if size_of::<usize>() == 8 => {
            usize::try_from(Var::from_ne_bytes(bytes.try_into().ok()?)).ok()?
        }
        _ => return None,
    };
    match era {
        VarEra::Shifted => raw.checked_mul(1 << VARSHIFT),
        VarEra::Bytes => Some(raw),
    }
}
