use bitflags::bitflags;

use crate::{AtomType, Heap, OID_NIL, Oid};

bitflags! {
    /// Tail properties as persisted in the catalog.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColumnProps: u16 {
        const SORTED = 0x0001;
        const REVSORTED = 0x0080;
        const KEY = 0x0100;
        const DENSE = 0x0200;
        const NONIL = 0x0400;
        const NIL = 0x0800;
    }
}

impl ColumnProps {
    /// Every bit a catalog entry may set.
    pub const KNOWN_BITS: u16 = 0x0F81;
}

/// Access restriction recorded in an entry's property word.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    #[default]
    Writable,
    ReadOnly,
    AppendOnly,
}

impl Restriction {
    pub const MASK: u32 = 0x0006;

    /// Decodes the two-bit field of an entry's property word.
    pub fn from_properties(properties: u32) -> Option<Self> {
        match (properties & Self::MASK) >> 1 {
            0 => Some(Self::Writable),
            1 => Some(Self::ReadOnly),
            2 => Some(Self::AppendOnly),
            _ => None,
        }
    }
}

/// Floor of log2 of an element width; 0 for a zero width.
#[inline]
pub fn elm_shift(width: u16) -> u8 {
    if width == 0 {
        0
    } else {
        (u16::BITS - 1 - width.leading_zeros()) as u8
    }
}

/// Descriptor of one persistent column.
#[derive(Debug)]
pub struct ColumnRecord {
    atom: AtomType,
    width: u16,
    shift: u8,
    varsized: bool,
    count: usize,
    capacity: usize,
    hseqbase: Oid,
    tseqbase: Oid,
    props: ColumnProps,
    nokey: [usize; 2],
    nosorted: usize,
    norevsorted: usize,
    restriction: Restriction,
    heap: Heap,
    vheap: Option<Heap>,
}

impl ColumnRecord {
    pub fn new(atom: AtomType, width: u16, count: usize, capacity: usize, heap: Heap) -> Self {
        Self {
            atom,
            width,
            shift: elm_shift(width),
            varsized: false,
            count,
            capacity,
            hseqbase: 0,
            tseqbase: OID_NIL,
            props: ColumnProps::empty(),
            nokey: [0; 2],
            nosorted: 0,
            norevsorted: 0,
            restriction: Restriction::Writable,
            heap,
            vheap: None,
        }
    }

    /// Attaches the variable-width heap. `void` columns never carry one.
    pub fn with_vheap(mut self, vheap: Heap) -> Self {
        if !self.atom.is_void() {
            self.varsized = true;
            self.vheap = Some(vheap);
        }
        self
    }

    pub fn with_seqbases(mut self, hseqbase: Oid, tseqbase: Oid) -> Self {
        self.hseqbase = hseqbase;
        self.tseqbase = tseqbase;
        self
    }

    pub fn with_props(mut self, props: ColumnProps) -> Self {
        self.props = props;
        self
    }

    pub fn with_counterexamples(mut self, nokey: [usize; 2], nosorted: usize, norevsorted: usize) -> Self {
        self.nokey = nokey;
        self.nosorted = nosorted;
        self.norevsorted = norevsorted;
        self
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }

    #[inline(always)]
    pub fn atom(&self) -> &AtomType {
        &self.atom
    }

    #[inline(always)]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline(always)]
    pub fn shift(&self) -> u8 {
        self.shift
    }

    #[inline(always)]
    pub fn is_varsized(&self) -> bool {
        self.varsized
    }

    #[inline(always)]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn hseqbase(&self) -> Oid {
        self.hseqbase
    }

    /// Start of the run for dense columns; nil otherwise.
    #[inline(always)]
    pub fn tseqbase(&self) -> Oid {
        self.tseqbase
    }

    #[inline(always)]
    pub fn props(&self) -> ColumnProps {
        self.props
    }

    #[inline]
    pub fn is_sorted(&self) -> bool {
        self.props.contains(ColumnProps::SORTED)
    }

    #[inline]
    pub fn is_revsorted(&self) -> bool {
        self.props.contains(ColumnProps::REVSORTED)
    }

    #[inline]
    pub fn is_key(&self) -> bool {
        self.props.contains(ColumnProps::KEY)
    }

    #[inline]
    pub fn is_nonil(&self) -> bool {
        self.props.contains(ColumnProps::NONIL)
    }

    #[inline]
    pub fn has_nil(&self) -> bool {
        self.props.contains(ColumnProps::NIL)
    }

    /// A consecutive run of object identifiers starting at `tseqbase`.
    #[inline]
    pub fn is_dense(&self) -> bool {
        self.props.contains(ColumnProps::DENSE) || (self.atom.is_void() && self.tseqbase != OID_NIL)
    }

    /// Positions of a duplicate pair, when one is known.
    #[inline(always)]
    pub fn nokey(&self) -> [usize; 2] {
        self.nokey
    }

    #[inline(always)]
    pub fn nosorted(&self) -> usize {
        self.nosorted
    }

    #[inline(always)]
    pub fn norevsorted(&self) -> usize {
        self.norevsorted
    }

    #[inline(always)]
    pub fn restriction(&self) -> Restriction {
        self.restriction
    }

    #[inline(always)]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline(always)]
    pub fn vheap(&self) -> Option<&Heap> {
        self.vheap.as_ref()
    }
}
