use std::{any::type_name, ffi::CStr, path::PathBuf, str};

use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::{
    AtomType, AtomValue, Bat, ColumnRecord, Error, HeapKind, Nil, OID_NIL, Oid, PhysicalName,
    Pool, Result, STR_NIL, SqlName, StorageMode,
    varheap::{VarEra, var_heap_val},
};

mod cursor;

pub use cursor::{ColumnIter, Cursor};
use cursor::Layout;

/// Lightweight handle on one column of a [`Pool`].
///
/// Holds no resources of its own; heaps are materialized in the pool on first
/// element access.
#[derive(Debug, Clone, Copy)]
pub struct ColumnProxy<'a> {
    pool: &'a Pool,
    id: Bat,
    desc: &'a ColumnRecord,
}

impl<'a> ColumnProxy<'a> {
    #[inline]
    pub(crate) fn new(pool: &'a Pool, id: Bat, desc: &'a ColumnRecord) -> Self {
        Self { pool, id, desc }
    }

    #[inline(always)]
    pub fn id(&self) -> Bat {
        self.id
    }

    /// `false` for columns the catalog marks as deleted.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.pool
            .disk_status(self.id)
            .is_some_and(|status| !status.is_deleted())
    }

    #[inline(always)]
    pub fn record(&self) -> &'a ColumnRecord {
        self.desc
    }

    #[inline(always)]
    pub fn atom(&self) -> &'a AtomType {
        self.desc.atom()
    }

    #[inline]
    pub fn type_name(&self) -> &'a str {
        self.desc.atom().name()
    }

    #[inline(always)]
    pub fn width(&self) -> u16 {
        self.desc.width()
    }

    #[inline(always)]
    pub fn length(&self) -> usize {
        self.desc.count()
    }

    #[inline(always)]
    pub fn allocated_capacity(&self) -> usize {
        self.desc.capacity()
    }

    #[inline(always)]
    pub fn storage_type(&self) -> StorageMode {
        self.desc.heap().storage()
    }

    #[inline]
    pub fn physical_name(&self) -> PhysicalName {
        PhysicalName::new(self.id)
    }

    pub fn logical_name(&self) -> Option<&'a str> {
        self.pool.table().get(self.id).map(|slot| slot.logical_name())
    }

    /// `None` for columns that still carry their default `tmp_` name.
    pub fn sql_name(&self) -> Option<SqlName> {
        SqlName::from_logical(self.id, self.logical_name()?)
    }

    /// Farm-relative file name of the column's heaps, without extension.
    pub fn filename(&self) -> Option<&'a str> {
        self.pool.table().get(self.id).map(|slot| slot.physical_name())
    }

    /// Location of the primary heap file.
    pub fn heap_path(&self) -> PathBuf {
        self.desc.heap().path(self.pool.farm())
    }

    /// Primary heap image, up to its `free` offset.
    pub fn heap_bytes(&self) -> Result<&'a [u8]> {
        let bytes = self.pool.heap_image(self.id, HeapKind::Tail)?;
        Ok(&bytes[..self.desc.heap().free().min(bytes.len())])
    }

    /// Variable heap image, up to its `free` offset. `None` for fixed-width
    /// columns.
    pub fn var_heap_bytes(&self) -> Result<Option<&'a [u8]>> {
        let Some(vheap) = self.desc.vheap() else {
            return Ok(None);
        };
        let bytes = self.pool.heap_image(self.id, HeapKind::Var)?;
        Ok(Some(&bytes[..vheap.free().min(bytes.len())]))
    }

    /// Primary heap bytes covering `length()` elements.
    fn element_bytes(&self) -> Result<&'a [u8]> {
        let bytes = self.pool.heap_image(self.id, HeapKind::Tail)?;
        let needed = self
            .length()
            .checked_mul(self.width() as usize)
            .unwrap_or(usize::MAX);
        bytes.get(..needed).ok_or_else(|| Error::HeapTooShort {
            bat: self.id,
            path: self.heap_path(),
            needed,
            actual: bytes.len(),
        })
    }

    /// The primary heap as `length()` values of `T`.
    ///
    /// For variable-width columns these are the offsets into the variable
    /// heap. Only the size of `T` is checked against the column width; use
    /// [`ColumnProxy::values`] to also check the type.
    pub fn as_span<T>(&self) -> Result<&'a [T]>
    where
        T: FromBytes + Immutable + KnownLayout,
    {
        if self.atom().is_unknown() {
            return Err(Error::TypeMismatch {
                atom: self.type_name().to_owned(),
                requested: type_name::<T>(),
            });
        }
        if size_of::<T>() != self.width() as usize {
            return Err(Error::WidthMismatch {
                width: self.width(),
                size: size_of::<T>(),
            });
        }
        let bytes = self.element_bytes()?;
        <[T]>::ref_from_bytes(bytes).map_err(|_| Error::Misaligned {
            requested: type_name::<T>(),
        })
    }

    /// The column's values, checking that its type stores `T`.
    pub fn values<T: AtomValue>(&self) -> Result<&'a [T]> {
        if self.desc.is_varsized() || !T::stores(self.atom()) {
            return Err(Error::TypeMismatch {
                atom: self.type_name().to_owned(),
                requested: T::NAME,
            });
        }
        self.as_span()
    }

    /// Value at `p` of a dense `void` column: `tseqbase + p`, or nil when the
    /// column is not dense.
    pub fn dense_value(&self, p: usize) -> Oid {
        let base = self.desc.tseqbase();
        if base == OID_NIL || !self.desc.is_dense() {
            return Oid::NIL;
        }
        base.saturating_add(p as Oid).min(OID_NIL)
    }

    fn layout(&self) -> Result<Layout<'a>> {
        let heap: &'a [u8] = if self.atom().is_void() {
            &[]
        } else {
            self.element_bytes()?
        };
        let vheap = if self.desc.vheap().is_some() {
            Some(self.pool.heap_image(self.id, HeapKind::Var)?)
        } else {
            None
        };
        Ok(Layout {
            heap,
            vheap,
            width: self.width(),
            era: self.era(),
        })
    }

    #[inline]
    fn era(&self) -> VarEra {
        VarEra::for_version(self.pool.version())
    }

    /// Cursor at position 0. Materializes the column's heaps.
    pub fn begin(&self) -> Result<Cursor<'a>> {
        Ok(Cursor::new(self.layout()?, 0))
    }

    /// Cursor one past the last element.
    pub fn end(&self) -> Result<Cursor<'a>> {
        Ok(Cursor::new(self.layout()?, self.length()))
    }

    /// Iterates element addresses over `[0, length())`.
    pub fn iter(&self) -> Result<ColumnIter<'a>> {
        Ok(ColumnIter::new(self.layout()?, self.length()))
    }

    /// Iterates the values of a `str`-family column. Nil strings yield
    /// `None`.
    pub fn strings(&self) -> Result<StrIter<'a>> {
        if !self.atom().is_str_family() || self.desc.vheap().is_none() {
            return Err(Error::TypeMismatch {
                atom: self.type_name().to_owned(),
                requested: "str",
            });
        }
        let heap = self.element_bytes()?;
        let vheap = self.pool.heap_image(self.id, HeapKind::Var)?;
        Ok(StrIter {
            id: self.id,
            heap,
            vheap,
            width: self.width(),
            era: self.era(),
            pos: 0,
            end: self.length(),
        })
    }
}

/// Iterator over the values of a string column.
#[derive(Debug, Clone)]
pub struct StrIter<'a> {
    id: Bat,
    heap: &'a [u8],
    vheap: &'a [u8],
    width: u16,
    era: VarEra,
    pos: usize,
    end: usize,
}

impl<'a> StrIter<'a> {
    fn resolve(&self, position: usize) -> Result<Option<&'a str>> {
        let offset = var_heap_val(self.heap, position, self.width, self.era).ok_or(
            Error::OffsetOutOfBounds {
                bat: self.id,
                position,
                offset: usize::MAX,
            },
        )?;
        let tail = self
            .vheap
            .get(offset..)
            .filter(|tail| !tail.is_empty())
            .ok_or(Error::OffsetOutOfBounds {
                bat: self.id,
                position,
                offset,
            })?;
        let value = CStr::from_bytes_until_nul(tail)
            .map_err(|_| Error::InvalidString {
                bat: self.id,
                position,
            })?
            .to_bytes();
        if value == STR_NIL {
            return Ok(None);
        }
        str::from_utf8(value)
            .map(Some)
            .map_err(|_| Error::InvalidString {
                bat: self.id,
                position,
            })
    }
}

impl<'a> Iterator for StrIter<'a> {
    type Item = Result<Option<&'a str>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let item = self.resolve(self.pos);
        self.pos += 1;
        Some(item)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for StrIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        self.end -= 1;
        Some(self.resolve(self.end))
    }
}

impl ExactSizeIterator for StrIter<'_> {}
