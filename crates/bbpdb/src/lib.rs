#![doc = include_str!("../README.md")]

use std::path::{Path, PathBuf};

use log::debug;

mod catalog;
mod column;
pub mod error;
mod heap;
pub mod names;
mod options;
mod proxy;
mod status;
mod table;
mod types;
pub mod varheap;
mod version;

pub use column::*;
pub use error::*;
pub use heap::*;
pub use names::{ColumnName, PhysicalName, SqlName};
pub use options::*;
pub use proxy::*;
pub use status::*;
pub use table::*;
pub use types::*;
pub use version::*;

/// Longest chain of shared heaps followed before giving up.
const MAX_VIEW_DEPTH: usize = 16;

/// Read-only buffer pool of a database farm.
///
/// Built from `<farm>/BACKUP/BBP.dir`. Heaps are read or mapped lazily, the
/// first time a column's elements are accessed, and stay materialized until
/// the pool is dropped.
#[derive(Debug)]
#[must_use = "Pool should be stored to keep its heaps mapped"]
pub struct Pool {
    farm: PathBuf,
    heap_access: HeapAccess,
    version: Version,
    table: BbpTable,
}

/// Opens the pool of the farm at `farm`.
pub fn open(farm: &Path) -> Result<Pool> {
    Pool::open(farm)
}

impl Pool {
    /// Opens the pool of the farm at `farm`.
    pub fn open(farm: &Path) -> Result<Self> {
        Self::open_with(PoolOptions::new(farm))
    }

    pub fn open_with(options: PoolOptions) -> Result<Self> {
        let path = options.catalog_path();
        if !path.is_file() {
            return Err(Error::MustRecover(format!(
                "{} not found; run the database server on {} to create it",
                path.display(),
                options.farm.display()
            )));
        }

        let loaded = catalog::read(&path)?;

        if loaded.needs_commit {
            return Err(Error::MustRecover(format!(
                "{} holds data the database server must rewrite; run it on {} first",
                path.display(),
                options.farm.display()
            )));
        }
        if loaded.version.needs_migration() {
            return Err(Error::MustRecover(format!(
                "catalog version {} needs to be upgraded to {}; run the database server on {} first",
                loaded.version,
                Version::BASELINE,
                options.farm.display()
            )));
        }

        let pool = Self::from_table(options, loaded.version, loaded.table);
        debug!(
            "Pool opened: {} columns, size {}, limit {}.",
            pool.table.len(),
            pool.size(),
            pool.limit()
        );
        Ok(pool)
    }

    /// Builds a pool over an already populated table.
    pub fn from_table(options: PoolOptions, version: Version, table: BbpTable) -> Self {
        Self {
            farm: options.farm,
            heap_access: options.heap_access,
            version,
            table,
        }
    }

    /// Releases every descriptor and heap.
    pub fn close(self) {
        debug!("Pool of {} closed.", self.farm.display());
    }

    #[inline(always)]
    pub fn farm(&self) -> &Path {
        &self.farm
    }

    #[inline(always)]
    pub fn version(&self) -> Version {
        self.version
    }

    /// One past the highest identifier in use.
    #[inline]
    pub fn size(&self) -> usize {
        self.table.size()
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.table.limit()
    }

    #[inline(always)]
    pub fn table(&self) -> &BbpTable {
        &self.table
    }

    /// Identifier of the column with the given logical or SQL name.
    pub fn find_column<N>(&self, name: &N) -> Option<Bat>
    where
        N: ColumnName + ?Sized,
    {
        self.table.find_by_name(&name.logical_name())
    }

    /// Identifier of the column whose heaps are stored under `filename`.
    pub fn find_physical(&self, filename: &str) -> Option<Bat> {
        self.table
            .find_by_physical(&names::normalize_separators(filename))
    }

    pub fn column(&self, id: Bat) -> Option<ColumnProxy<'_>> {
        let desc = self.table.descriptor(id)?;
        Some(ColumnProxy::new(self, id.abs(), desc))
    }

    /// Every column, in identifier order.
    pub fn columns(&self) -> impl Iterator<Item = ColumnProxy<'_>> {
        self.table.iter().filter_map(|(id, slot)| {
            slot.descriptor()
                .map(|desc| ColumnProxy::new(self, id, desc))
        })
    }

    /// Every logical name, in identifier order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.iter().map(|(_, slot)| slot.logical_name())
    }

    #[inline]
    pub fn status(&self, id: Bat) -> Option<BbpStatus> {
        self.table.get(id).map(Slot::status)
    }

    #[inline]
    pub fn disk_status(&self, id: Bat) -> Option<BbpStatus> {
        self.table.get(id).map(Slot::disk_status)
    }

    /// Options text that followed the heap records in the catalog.
    #[inline]
    pub fn options_of(&self, id: Bat) -> Option<&str> {
        self.table.get(id).and_then(Slot::options)
    }

    /// Takes a physical reference and returns the new count.
    ///
    /// The first reference to a column whose tail heap is shared with a
    /// parent materializes the parent's heap.
    pub fn fix(&self, id: Bat) -> Result<u32> {
        let refs = self
            .table
            .incref_physical(id)
            .ok_or(Error::InvalidColumn(id))?;
        if refs == 1
            && let Some(parent) = self
                .table
                .descriptor(id)
                .and_then(|desc| desc.heap().view_parent(id))
        {
            if let Err(e) = self.heap_image(parent, HeapKind::Tail) {
                self.table.decref_physical(id);
                return Err(e);
            }
            debug!("BAT {id} fixed, parent {parent} materialized.");
        }
        Ok(refs)
    }

    /// Drops a physical reference and returns the new count.
    pub fn unfix(&self, id: Bat) -> Result<u32> {
        self.table.get(id).ok_or(Error::InvalidColumn(id))?;
        self.table
            .decref_physical(id)
            .ok_or_else(|| Error::InvalidArgument(format!("BAT {id} is not fixed")))
    }

    /// Takes a logical reference and returns the new count.
    pub fn retain(&self, id: Bat) -> Result<u32> {
        self.table
            .incref_logical(id)
            .ok_or(Error::InvalidColumn(id))
    }

    /// Drops a logical reference and returns the new count.
    pub fn release(&self, id: Bat) -> Result<u32> {
        self.table.get(id).ok_or(Error::InvalidColumn(id))?;
        self.table
            .decref_logical(id)
            .ok_or_else(|| Error::InvalidArgument(format!("BAT {id} is not retained")))
    }

    /// Image of one heap of `id`, following shared heaps to their owner.
    pub(crate) fn heap_image(&self, id: Bat, kind: HeapKind) -> Result<&[u8]> {
        self.resolve_heap(id, kind, 0)
    }

    fn resolve_heap(&self, id: Bat, kind: HeapKind, depth: usize) -> Result<&[u8]> {
        let desc = self.table.descriptor(id).ok_or(Error::InvalidColumn(id))?;
        let heap = match kind {
            HeapKind::Tail => desc.heap(),
            HeapKind::Var => desc.vheap().ok_or(Error::InvalidColumn(id))?,
        };

        let Some(parent) = heap.view_parent(id) else {
            return heap.materialize(&self.farm, self.heap_access, id);
        };
        if depth >= MAX_VIEW_DEPTH {
            return Err(Error::UnresolvedView(id));
        }
        let bytes = self.resolve_heap(parent, kind, depth + 1)?;
        bytes
            .get(heap.parent_offset()..)
            .ok_or(Error::UnresolvedView(id))
    }
}
