use std::path::{Path, PathBuf};

/// How heap files are brought into memory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HeapAccess {
    /// Map heaps the catalog marks as mapped, read the others.
    #[default]
    AsStored,
    /// Always read heaps into memory.
    ReadAll,
    /// Always memory-map heaps.
    MapAll,
}

/// Options for opening a [`crate::Pool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub farm: PathBuf,
    pub heap_access: HeapAccess,
}

impl PoolOptions {
    pub fn new(farm: impl Into<PathBuf>) -> Self {
        Self {
            farm: farm.into(),
            heap_access: HeapAccess::default(),
        }
    }

    pub fn with_heap_access(mut self, heap_access: HeapAccess) -> Self {
        self.heap_access = heap_access;
        self
    }

    /// `<farm>/BACKUP/BBP.dir`
    pub fn catalog_path(&self) -> PathBuf {
        self.farm.join("BACKUP").join("BBP.dir")
    }
}

impl From<&Path> for PoolOptions {
    fn from(value: &Path) -> Self {
        Self::new(value)
    }
}

impl From<PathBuf> for PoolOptions {
    fn from(value: PathBuf) -> Self {
        Self::new(value)
    }
}
