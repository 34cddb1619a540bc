use std::{cell::Cell, collections::HashMap};

use crate::{BAT_NIL, Bat, BbpStatus, ColumnRecord, Error, Result};

pub const BBPINIT_LOG: u32 = 14;
/// Slots per chunk.
pub const BBPINIT: usize = 1 << BBPINIT_LOG;
/// Upper bound on the number of chunks.
pub const N_BBPINIT: usize = 1000;
/// Hard limit on identifiers: every id must be below it.
pub const BBP_LIMIT: usize = N_BBPINIT * BBPINIT;

/// One entry of the buffer pool.
#[derive(Debug, Default)]
pub struct Slot {
    desc: Option<Box<ColumnRecord>>,
    logical_name: String,
    physical_name: String,
    options: Option<String>,
    status: BbpStatus,
    disk_status: BbpStatus,
    refs: Cell<u32>,
    lrefs: Cell<u32>,
}

impl Slot {
    #[inline(always)]
    pub fn descriptor(&self) -> Option<&ColumnRecord> {
        self.desc.as_deref()
    }

    #[inline(always)]
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Farm-relative file name without extension, as cataloged.
    #[inline(always)]
    pub fn physical_name(&self) -> &str {
        &self.physical_name
    }

    #[inline(always)]
    pub fn options(&self) -> Option<&str> {
        self.options.as_deref()
    }

    #[inline(always)]
    pub fn status(&self) -> BbpStatus {
        self.status
    }

    /// Status word as written in the catalog.
    #[inline(always)]
    pub fn disk_status(&self) -> BbpStatus {
        self.disk_status
    }

    /// Physical reference count.
    #[inline(always)]
    pub fn refs(&self) -> u32 {
        self.refs.get()
    }

    /// Logical reference count.
    #[inline(always)]
    pub fn lrefs(&self) -> u32 {
        self.lrefs.get()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.desc.is_none()
    }
}

/// What to insert into an empty slot.
#[derive(Debug)]
pub struct NewSlot {
    pub desc: ColumnRecord,
    pub logical_name: String,
    pub physical_name: String,
    pub options: Option<String>,
    pub disk_status: BbpStatus,
}

/// Sparse two-level table of slots addressed by identifier.
#[derive(Debug)]
pub struct BbpTable {
    chunks: Vec<Box<[Slot]>>,
    size: usize,
    logical_to_id: HashMap<String, Bat>,
    physical_to_id: HashMap<String, Bat>,
}

impl Default for BbpTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BbpTable {
    /// An empty table; slot 0 is reserved, so `size` starts at 1.
    pub fn new() -> Self {
        Self {
            chunks: vec![],
            size: 1,
            logical_to_id: HashMap::new(),
            physical_to_id: HashMap::new(),
        }
    }

    /// One past the highest identifier in use.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of allocated slots.
    #[inline(always)]
    pub fn limit(&self) -> usize {
        self.chunks.len() * BBPINIT
    }

    /// Ensures slot `i` is allocated.
    pub fn extend(&mut self, i: usize) -> Result<()> {
        if i >= BBP_LIMIT {
            return Err(Error::LimitExceeded {
                id: i,
                limit: BBP_LIMIT,
            });
        }
        while self.limit() <= i {
            self.chunks
                .push((0..BBPINIT).map(|_| Slot::default()).collect());
        }
        Ok(())
    }

    /// Fills the empty slot `id` with status `EXISTING`, no physical
    /// references and one logical reference.
    pub fn insert(&mut self, id: Bat, new: NewSlot) -> Result<()> {
        if id <= 0 {
            return Err(Error::InvalidArgument(format!(
                "BAT id {id} can't hold a column"
            )));
        }
        let index = id as usize;
        self.extend(index)?;

        if self
            .slot_at(index)
            .is_some_and(|slot| !slot.is_empty())
        {
            return Err(Error::InvalidArgument(format!("duplicate entry for BAT {id}")));
        }
        if self.logical_to_id.contains_key(&new.logical_name) {
            return Err(Error::InvalidArgument(format!(
                "duplicate logical name `{}`",
                new.logical_name
            )));
        }

        self.logical_to_id.insert(new.logical_name.clone(), id);
        self.physical_to_id.insert(new.physical_name.clone(), id);

        let slot = &mut self.chunks[index >> BBPINIT_LOG][index & (BBPINIT - 1)];
        *slot = Slot {
            desc: Some(Box::new(new.desc)),
            logical_name: new.logical_name,
            physical_name: new.physical_name,
            options: new.options,
            status: BbpStatus::EXISTING,
            disk_status: new.disk_status,
            refs: Cell::new(0),
            lrefs: Cell::new(1),
        };

        self.size = self.size.max(index + 1);
        Ok(())
    }

    #[inline]
    fn slot_at(&self, index: usize) -> Option<&Slot> {
        self.chunks
            .get(index >> BBPINIT_LOG)
            .map(|chunk| &chunk[index & (BBPINIT - 1)])
    }

    /// Populated slot of `id`. Nil and zero are absent; negative identifiers
    /// resolve to `|id|`.
    #[inline]
    pub fn get(&self, id: Bat) -> Option<&Slot> {
        if id == 0 || id == BAT_NIL {
            return None;
        }
        self.slot_at(id.unsigned_abs() as usize)
            .filter(|slot| !slot.is_empty())
    }

    #[inline]
    pub fn descriptor(&self, id: Bat) -> Option<&ColumnRecord> {
        self.get(id).and_then(Slot::descriptor)
    }

    #[inline]
    pub fn find_by_name(&self, logical_name: &str) -> Option<Bat> {
        self.logical_to_id.get(logical_name).copied()
    }

    #[inline]
    pub fn find_by_physical(&self, physical_name: &str) -> Option<Bat> {
        self.physical_to_id.get(physical_name).copied()
    }

    pub fn incref_physical(&self, id: Bat) -> Option<u32> {
        Self::bump(&self.get(id)?.refs, 1)
    }

    pub fn decref_physical(&self, id: Bat) -> Option<u32> {
        Self::bump(&self.get(id)?.refs, -1)
    }

    pub fn incref_logical(&self, id: Bat) -> Option<u32> {
        Self::bump(&self.get(id)?.lrefs, 1)
    }

    pub fn decref_logical(&self, id: Bat) -> Option<u32> {
        Self::bump(&self.get(id)?.lrefs, -1)
    }

    /// Counts never go below zero; a decrement of zero returns `None`.
    #[inline]
    fn bump(counter: &Cell<u32>, delta: i32) -> Option<u32> {
        let value = counter.get().checked_add_signed(delta)?;
        counter.set(value);
        Some(value)
    }

    /// Populated slots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (Bat, &Slot)> {
        (1..self.size).filter_map(|i| {
            let id = i as Bat;
            self.get(id).map(|slot| (id, slot))
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.logical_to_id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.logical_to_id.is_empty()
    }
}
