use bitflags::bitflags;

bitflags! {
    /// Persistence and life-cycle state of a buffer pool slot.
    ///
    /// The low bits up to [`BbpStatus::STATUS`] are persisted in the catalog;
    /// the rest only describe transient in-memory activity.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BbpStatus: u32 {
        /// Heaps are in memory.
        const LOADED = 1;
        /// Dirty BAT is not in memory.
        const SWAPPED = 2;
        /// Non-persistent BAT has an image on disk.
        const TMP = 4;
        /// Was persistent at the last commit, deleted since.
        const DELETED = 16;
        /// Was persistent at the last commit and still is.
        const EXISTING = 32;
        /// Became persistent since the last commit.
        const NEW = 64;
        const PERSISTENT = Self::EXISTING.bits() | Self::NEW.bits();
        const STATUS = 127;
        const UNLOADING = 128;
        const LOADING = 256;
        const SAVING = 512;
        const RENAMED = 1024;
        const DELETING = 2048;
        const UNSTABLE = Self::UNLOADING.bits() | Self::DELETING.bits();
        const WAITING = Self::UNLOADING.bits()
            | Self::LOADING.bits()
            | Self::SAVING.bits()
            | Self::DELETING.bits();
    }
}

/// Where a slot stands relative to the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Transient,
    Deleted,
    Existing,
    New,
}

impl BbpStatus {
    const PERSISTENCE_BITS: Self = Self::DELETED.union(Self::PERSISTENT);

    /// Returns the single persistence state, or `None` when the word
    /// combines more than one of `DELETED`, `EXISTING` and `NEW`.
    pub fn persistence(self) -> Option<Persistence> {
        let bits = self.intersection(Self::PERSISTENCE_BITS);
        if bits.is_empty() {
            Some(Persistence::Transient)
        } else if bits == Self::DELETED {
            Some(Persistence::Deleted)
        } else if bits == Self::EXISTING {
            Some(Persistence::Existing)
        } else if bits == Self::NEW {
            Some(Persistence::New)
        } else {
            None
        }
    }

    /// Persistent as of the last commit.
    #[inline]
    pub fn was_persistent(self) -> bool {
        self.intersects(Self::DELETED | Self::EXISTING)
    }

    /// Persistent once the next commit happens.
    #[inline]
    pub fn will_be_persistent(self) -> bool {
        self.intersects(Self::PERSISTENT)
    }

    #[inline]
    pub fn is_deleted(self) -> bool {
        self.contains(Self::DELETED)
    }

    #[inline]
    pub fn is_busy(self) -> bool {
        self.intersects(Self::WAITING)
    }
}
