use std::{
    cmp::Ordering,
    iter::FusedIterator,
    ops::{Add, AddAssign, Sub, SubAssign},
    ptr,
};

use crate::varheap::{VarEra, var_heap_val};

/// Heap images and decoding rules shared by every position of one column.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout<'a> {
    /// Primary heap: values, or offsets for variable-width columns.
    pub heap: &'a [u8],
    /// Variable heap, present for variable-width columns.
    pub vheap: Option<&'a [u8]>,
    pub width: u16,
    pub era: VarEra,
}

impl<'a> Layout<'a> {
    #[inline]
    fn same_column(&self, other: &Self) -> bool {
        self.width == other.width
            && ptr::eq(self.heap.as_ptr(), other.heap.as_ptr())
            && match (self.vheap, other.vheap) {
                (None, None) => true,
                (Some(a), Some(b)) => ptr::eq(a.as_ptr(), b.as_ptr()),
                _ => false,
            }
    }

    #[inline]
    fn offset(&self, pos: usize) -> Option<usize> {
        var_heap_val(self.heap, pos, self.width, self.era)
    }

    #[inline]
    fn ptr(&self, pos: usize) -> *const u8 {
        match self.vheap {
            None => self
                .heap
                .as_ptr()
                .wrapping_add(pos.wrapping_mul(self.width as usize)),
            Some(vheap) => self
                .offset(pos)
                .map_or(ptr::null(), |o| vheap.as_ptr().wrapping_add(o)),
        }
    }

    #[inline]
    fn bytes(&self, pos: usize) -> Option<&'a [u8]> {
        match self.vheap {
            None => {
                let w = self.width as usize;
                let start = pos.checked_mul(w)?;
                self.heap.get(start..start.checked_add(w)?)
            }
            Some(vheap) => vheap.get(self.offset(pos)?..),
        }
    }
}

/// Random-access position in a column.
///
/// Dereferencing yields the address of the element: `heap + p * width` for
/// fixed-width columns, and the start of the value in the variable heap for
/// variable-width ones. Cursors of different columns don't compare.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    layout: Layout<'a>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    #[inline]
    pub(crate) fn new(layout: Layout<'a>, pos: usize) -> Self {
        Self { layout, pos }
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Address of the element. Null when the offset of a variable-width
    /// element lies outside the primary heap.
    #[inline]
    pub fn ptr(&self) -> *const u8 {
        self.layout.ptr(self.pos)
    }

    /// Address of the element `n` positions ahead.
    #[inline]
    pub fn get(&self, n: usize) -> *const u8 {
        self.layout.ptr(self.pos.wrapping_add(n))
    }

    /// Bytes of the element: exactly `width` bytes for fixed-width columns,
    /// the remainder of the variable heap from the element's start otherwise.
    /// `None` when the element lies outside the heap image.
    #[inline]
    pub fn bytes(&self) -> Option<&'a [u8]> {
        self.layout.bytes(self.pos)
    }

    /// Signed distance from `other` to `self`, in elements.
    #[inline]
    pub fn distance(&self, other: &Self) -> isize {
        self.pos.wrapping_sub(other.pos) as isize
    }

    #[inline]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.layout.same_column(&other.layout)
    }
}

impl Add<usize> for Cursor<'_> {
    type Output = Self;

    #[inline]
    fn add(mut self, n: usize) -> Self {
        self.pos = self.pos.wrapping_add(n);
        self
    }
}

impl Sub<usize> for Cursor<'_> {
    type Output = Self;

    #[inline]
    fn sub(mut self, n: usize) -> Self {
        self.pos = self.pos.wrapping_sub(n);
        self
    }
}

impl AddAssign<usize> for Cursor<'_> {
    #[inline]
    fn add_assign(&mut self, n: usize) {
        self.pos = self.pos.wrapping_add(n);
    }
}

impl SubAssign<usize> for Cursor<'_> {
    #[inline]
    fn sub_assign(&mut self, n: usize) {
        self.pos = self.pos.wrapping_sub(n);
    }
}

impl<'a> Sub<Cursor<'a>> for Cursor<'a> {
    type Output = isize;

    #[inline]
    fn sub(self, other: Cursor<'a>) -> isize {
        self.distance(&other)
    }
}

impl PartialEq for Cursor<'_> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.is_compatible(other) && self.pos == other.pos
    }
}

impl PartialOrd for Cursor<'_> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.is_compatible(other)
            .then(|| self.pos.cmp(&other.pos))
    }
}

/// Iterator over the element addresses of a column, in position order.
#[derive(Debug, Clone)]
pub struct ColumnIter<'a> {
    layout: Layout<'a>,
    pos: usize,
    end: usize,
}

impl<'a> ColumnIter<'a> {
    #[inline]
    pub(crate) fn new(layout: Layout<'a>, len: usize) -> Self {
        Self {
            layout,
            pos: 0,
            end: len,
        }
    }

    /// Like [`Iterator::next`], but yields the element bytes as
    /// [`Cursor::bytes`] does.
    #[inline]
    pub fn next_bytes(&mut self) -> Option<Option<&'a [u8]>> {
        if self.pos >= self.end {
            return None;
        }
        let bytes = self.layout.bytes(self.pos);
        self.pos += 1;
        Some(bytes)
    }

    #[inline]
    pub fn cursor(&self) -> Cursor<'a> {
        Cursor::new(self.layout, self.pos)
    }
}

impl Iterator for ColumnIter<'_> {
    type Item = *const u8;

    #[inline(always)]
    fn next(&mut self) -> Option<*const u8> {
        if self.pos >= self.end {
            return None;
        }
        let ptr = self.layout.ptr(self.pos);
        self.pos += 1;
        Some(ptr)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.pos);
        (remaining, Some(remaining))
    }

    #[inline]
    fn nth(&mut self, n: usize) -> Option<*const u8> {
        self.pos = self.pos.saturating_add(n).min(self.end);
        self.next()
    }
}

impl DoubleEndedIterator for ColumnIter<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<*const u8> {
        if self.pos >= self.end {
            return None;
        }
        self.end -= 1;
        Some(self.layout.ptr(self.end))
    }
}

impl ExactSizeIterator for ColumnIter<'_> {}

impl FusedIterator for ColumnIter<'_> {}
