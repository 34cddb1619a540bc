use std::{
    cell::OnceCell,
    fmt,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use log::debug;
use memmap2::{Mmap, MmapOptions};
use zerocopy::IntoBytes;

use crate::{Bat, Error, HeapAccess, Result};

/// Longest heap file name (extension included) the catalog can describe.
pub const MAX_HEAP_FILENAME_LEN: usize = 32;

/// How a heap was kept by the database that wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StorageMode {
    /// Allocated in memory and read from the file.
    Memory = 0,
    /// Memory-mapped from the file.
    Mapped = 1,
    /// Memory-mapped copy-on-write.
    MappedPrivate = 2,
    /// Allocated with the C allocator.
    CMalloced = 3,
    /// Memory not owned by the database.
    Unowned = 4,
    /// Memory-mapped from an absolute path.
    MappedAbsolute = 5,
}

impl StorageMode {
    #[inline]
    pub fn is_mapped(self) -> bool {
        matches!(
            self,
            Self::Mapped | Self::MappedPrivate | Self::MappedAbsolute
        )
    }
}

impl TryFrom<u16> for StorageMode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, u16> {
        match value {
            0 => Ok(Self::Memory),
            1 => Ok(Self::Mapped),
            2 => Ok(Self::MappedPrivate),
            3 => Ok(Self::CMalloced),
            4 => Ok(Self::Unowned),
            5 => Ok(Self::MappedAbsolute),
            v => Err(v),
        }
    }
}

/// Which of a column's two heaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapKind {
    /// Fixed-width values, or offsets into the variable heap.
    Tail,
    /// Variable-width payload.
    Var,
}

impl HeapKind {
    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Tail => "tail",
            Self::Var => "theap",
        }
    }
}

/// Metadata of one on-disk heap file, plus its lazily materialized image.
pub struct Heap {
    kind: HeapKind,
    free: usize,
    size: usize,
    storage: StorageMode,
    filename: String,
    parent: Bat,
    parent_offset: usize,
    hashash: bool,
    cleanhash: bool,
    copied: bool,
    image: OnceCell<HeapImage>,
}

impl Heap {
    /// `filename` is relative to the farm directory and carries no
    /// extension.
    pub fn new(
        kind: HeapKind,
        filename: &str,
        free: usize,
        size: usize,
        storage: StorageMode,
    ) -> Self {
        Self {
            kind,
            free,
            size,
            storage,
            filename: format!("{filename}.{}", kind.extension()),
            parent: 0,
            parent_offset: 0,
            hashash: false,
            cleanhash: false,
            copied: false,
            image: OnceCell::new(),
        }
    }

    /// Makes this heap a view starting `offset` bytes into the same kind of
    /// heap of `parent`.
    pub fn with_parent(mut self, parent: Bat, offset: usize) -> Self {
        self.parent = parent;
        self.parent_offset = offset;
        self
    }

    pub fn with_hash_bits(mut self, hashash: bool, cleanhash: bool) -> Self {
        self.hashash = hashash;
        self.cleanhash = cleanhash;
        self
    }

    #[inline(always)]
    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    #[inline(always)]
    pub fn free(&self) -> usize {
        self.free
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline(always)]
    pub fn storage(&self) -> StorageMode {
        self.storage
    }

    #[inline(always)]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Zero when the heap is not shared with another column.
    #[inline(always)]
    pub fn parent(&self) -> Bat {
        self.parent
    }

    #[inline(always)]
    pub fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    /// The column whose heap this one borrows, if it is not `owner` itself.
    #[inline]
    pub fn view_parent(&self, owner: Bat) -> Option<Bat> {
        (self.parent != 0 && self.parent.unsigned_abs() != owner.unsigned_abs())
            .then_some(self.parent)
    }

    #[inline(always)]
    pub fn hashash(&self) -> bool {
        self.hashash
    }

    #[inline(always)]
    pub fn cleanhash(&self) -> bool {
        self.cleanhash
    }

    #[inline(always)]
    pub fn copied(&self) -> bool {
        self.copied
    }

    #[inline]
    pub fn is_materialized(&self) -> bool {
        self.image.get().is_some()
    }

    /// Location of the heap file for a farm rooted at `farm`.
    pub fn path(&self, farm: &Path) -> PathBuf {
        if self.storage == StorageMode::MappedAbsolute {
            PathBuf::from(&self.filename)
        } else {
            farm.join(&self.filename)
        }
    }

    /// Returns the heap image, reading or mapping the file on first use.
    ///
    /// A failure leaves the heap unmaterialized so a later call can retry.
    pub(crate) fn materialize(&self, farm: &Path, access: HeapAccess, bat: Bat) -> Result<&[u8]> {
        if let Some(image) = self.image.get() {
            return Ok(image.as_bytes());
        }
        let image = self.load(farm, access, bat)?;
        Ok(self.image.get_or_init(|| image).as_bytes())
    }

    fn load(&self, farm: &Path, access: HeapAccess, bat: Bat) -> Result<HeapImage> {
        let path = self.path(farm);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.free == 0 => {
                debug!("Heap {} absent and empty.", path.display());
                return Ok(HeapImage::Empty);
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len() as usize;
        if len < self.free {
            return Err(Error::HeapTooShort {
                bat,
                path,
                needed: self.free,
                actual: len,
            });
        }

        let map = match access {
            HeapAccess::AsStored => self.storage.is_mapped(),
            HeapAccess::ReadAll => false,
            HeapAccess::MapAll => true,
        };

        let image = if len == 0 {
            HeapImage::Empty
        } else if map {
            let mut options = MmapOptions::new();
            options.len(len);
            // SAFETY: the store is opened read-only and this library never
            // writes to it; concurrent modification by another process is
            // outside the supported usage.
            let mmap = if self.storage == StorageMode::MappedPrivate {
                unsafe { options.map_copy_read_only(&file)? }
            } else {
                unsafe { options.map(&file)? }
            };
            HeapImage::Mapped(mmap)
        } else {
            HeapImage::Memory(AlignedBuf::read(file, len)?)
        };

        debug!(
            "Heap {} materialized ({:?}, {} bytes).",
            path.display(),
            self.storage,
            image.as_bytes().len()
        );

        Ok(image)
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("kind", &self.kind)
            .field("free", &self.free)
            .field("size", &self.size)
            .field("storage", &self.storage)
            .field("filename", &self.filename)
            .field("parent", &self.parent)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// Materialized bytes of a heap file.
enum HeapImage {
    Empty,
    Memory(AlignedBuf),
    Mapped(Mmap),
}

impl HeapImage {
    #[inline]
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Memory(buf) => buf.as_bytes(),
            Self::Mapped(mmap) => &mmap[..],
        }
    }
}

/// Heap bytes read into memory, aligned for the widest fixed-width atom.
struct AlignedBuf {
    words: Vec<u128>,
    len: usize,
}

impl AlignedBuf {
    fn read(mut file: File, len: usize) -> Result<Self> {
        let mut words = vec![0u128; len.div_ceil(size_of::<u128>())];
        file.read_exact(&mut words.as_mut_bytes()[..len])?;
        Ok(Self { words, len })
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        &self.words.as_bytes()[..self.len]
    }
}
