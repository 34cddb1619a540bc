use std::fmt;

/// Catalog format version, as found on the first line of `BBP.dir`.
///
/// Versions are conventionally written in octal.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[must_use = "Version values should be used for compatibility checks"]
pub struct Version(u32);

impl Version {
    /// Entries carry `inserted` and `deleted` counts (16-field shape).
    pub const INSERTED: Self = Self(0o61032);
    /// Entries carry a head column (14-field shape).
    pub const HEADED: Self = Self(0o61033);
    /// `nokey` values written by this version and before can't be trusted.
    pub const NOKEY: Self = Self(0o61034);
    pub const BADEMPTY: Self = Self(0o61035);
    /// Heap records carry an `align` field.
    pub const TALIGN: Self = Self(0o61036);
    pub const NIL_NAN: Self = Self(0o61037);
    pub const BLOB_SORT: Self = Self(0o61040);
    pub const CURRENT: Self = Self(0o61041);

    /// Oldest version that can be read without migrating the store.
    pub const BASELINE: Self = Self::CURRENT;

    pub const RECOGNIZED: [Self; 8] = [
        Self::INSERTED,
        Self::HEADED,
        Self::NOKEY,
        Self::BADEMPTY,
        Self::TALIGN,
        Self::NIL_NAN,
        Self::BLOB_SORT,
        Self::CURRENT,
    ];

    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    pub fn is_recognized(self) -> bool {
        Self::RECOGNIZED.contains(&self)
    }

    #[inline]
    pub fn is_newer_than_supported(self) -> bool {
        self > Self::CURRENT
    }

    #[inline]
    pub fn needs_migration(self) -> bool {
        self < Self::BASELINE
    }

    #[inline]
    pub fn has_align(self) -> bool {
        self <= Self::TALIGN
    }

    #[inline]
    pub fn trusts_nokey(self) -> bool {
        self > Self::NOKEY
    }

    #[inline]
    pub fn has_head_column(self) -> bool {
        self <= Self::HEADED
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0{:o}", self.0)
    }
}

impl From<Version> for u32 {
    fn from(value: Version) -> u32 {
        value.0
    }
}

impl From<u32> for Version {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
