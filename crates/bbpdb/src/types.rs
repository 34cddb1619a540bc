use std::fmt;

use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Identifier of a column in the buffer pool.
///
/// Zero is reserved as "absent". A negative value is an aliased reference to
/// the column `|id|`.
pub type Bat = i32;
pub const BAT_NIL: Bat = Bat::MIN;

pub type Bit = i8;
pub type Bte = i8;
pub type Sht = i16;
pub type Int = i32;
pub type Lng = i64;
pub type Hge = i128;
pub type Flt = f32;
pub type Dbl = f64;
pub type Oid = u64;
/// Offset into a variable-width heap.
pub type Var = u64;
pub type Date = Int;
pub type Daytime = Int;
pub type Timestamp = Lng;

pub const OID_NIL: Oid = 1 << (Oid::BITS - 1);
pub const OID_MAX: Oid = OID_NIL - 1;

/// The byte sequence stored for a nil string.
pub const STR_NIL: &[u8] = b"\x80";

pub const SIZEOF_PTR: usize = size_of::<usize>();
pub const SIZEOF_OID: usize = size_of::<Oid>();
pub const SIZEOF_MAX_INT: usize = size_of::<Hge>();

/// Per-type absent value.
pub trait Nil: Copy {
    const NIL: Self;

    fn is_nil(&self) -> bool;
}

macro_rules! impl_nil_for_integer {
    ($($t:ty => $nil:expr),*) => {
        $(
            impl Nil for $t {
                const NIL: Self = $nil;

                #[inline(always)]
                fn is_nil(&self) -> bool {
                    *self == Self::NIL
                }
            }
        )*
    };
}

impl_nil_for_integer!(
    i8 => i8::MIN,
    i16 => i16::MIN,
    i32 => i32::MIN,
    i64 => i64::MIN,
    i128 => i128::MIN,
    u64 => OID_NIL
);

impl Nil for f32 {
    const NIL: Self = f32::NAN;

    #[inline(always)]
    fn is_nil(&self) -> bool {
        self.is_nan()
    }
}

impl Nil for f64 {
    const NIL: Self = f64::NAN;

    #[inline(always)]
    fn is_nil(&self) -> bool {
        self.is_nan()
    }
}

/// Element type of a column, as named in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomType {
    Void,
    Bit,
    Bte,
    Sht,
    Int,
    Oid,
    Ptr,
    Flt,
    Dbl,
    Lng,
    Hge,
    Date,
    Daytime,
    Timestamp,
    Inet,
    Uuid,
    Mbr,
    Str,
    Blob,
    SqlBlob,
    Json,
    Url,
    Wkb,
    /// A type this library does not know. The column stays enumerable but
    /// cannot be viewed as typed values.
    Unknown(Box<str>),
}

impl AtomType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "void" => Self::Void,
            "bit" => Self::Bit,
            "bte" => Self::Bte,
            "sht" => Self::Sht,
            "int" => Self::Int,
            "oid" => Self::Oid,
            "ptr" => Self::Ptr,
            "flt" => Self::Flt,
            "dbl" => Self::Dbl,
            "lng" => Self::Lng,
            "hge" => Self::Hge,
            "date" => Self::Date,
            "daytime" => Self::Daytime,
            "timestamp" => Self::Timestamp,
            "inet" => Self::Inet,
            "uuid" => Self::Uuid,
            "mbr" => Self::Mbr,
            "str" => Self::Str,
            "blob" => Self::Blob,
            "sqlblob" => Self::SqlBlob,
            "json" => Self::Json,
            "url" => Self::Url,
            "wkb" => Self::Wkb,
            other => Self::Unknown(other.into()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Void => "void",
            Self::Bit => "bit",
            Self::Bte => "bte",
            Self::Sht => "sht",
            Self::Int => "int",
            Self::Oid => "oid",
            Self::Ptr => "ptr",
            Self::Flt => "flt",
            Self::Dbl => "dbl",
            Self::Lng => "lng",
            Self::Hge => "hge",
            Self::Date => "date",
            Self::Daytime => "daytime",
            Self::Timestamp => "timestamp",
            Self::Inet => "inet",
            Self::Uuid => "uuid",
            Self::Mbr => "mbr",
            Self::Str => "str",
            Self::Blob => "blob",
            Self::SqlBlob => "sqlblob",
            Self::Json => "json",
            Self::Url => "url",
            Self::Wkb => "wkb",
            Self::Unknown(name) => &**name,
        }
    }

    /// Nominal size in bytes. Variable-width types report the size of an
    /// offset. `None` for unknown atoms.
    pub fn size(&self) -> Option<usize> {
        let size = match self {
            Self::Void => 0,
            Self::Bit | Self::Bte => 1,
            Self::Sht => 2,
            Self::Int | Self::Flt | Self::Date | Self::Daytime => 4,
            Self::Oid => SIZEOF_OID,
            Self::Ptr => SIZEOF_PTR,
            Self::Dbl | Self::Lng | Self::Timestamp | Self::Inet => 8,
            Self::Hge | Self::Uuid | Self::Mbr => 16,
            Self::Str | Self::Blob | Self::SqlBlob | Self::Json | Self::Url | Self::Wkb => {
                size_of::<Var>()
            }
            Self::Unknown(_) => return None,
        };
        Some(size)
    }

    /// Whether values live in a separate variable-width heap. `None` for
    /// unknown atoms.
    pub fn is_varsized(&self) -> Option<bool> {
        match self {
            Self::Str | Self::Blob | Self::SqlBlob | Self::Json | Self::Url | Self::Wkb => {
                Some(true)
            }
            Self::Unknown(_) => None,
            _ => Some(false),
        }
    }

    /// Types whose variable heap holds NUL-terminated text.
    pub fn is_str_family(&self) -> bool {
        matches!(self, Self::Str | Self::Json | Self::Url)
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        *self == Self::Void
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-width values that can be viewed in place over a primary heap.
pub trait AtomValue: Nil + FromBytes + Immutable + KnownLayout {
    const NAME: &'static str;

    /// Whether columns of `atom` store their values as `Self`.
    fn stores(atom: &AtomType) -> bool;
}

macro_rules! impl_atom_value {
    ($($t:ty => $name:literal: $($atom:pat_param)|+),* $(,)?) => {
        $(
            impl AtomValue for $t {
                const NAME: &'static str = $name;

                #[inline]
                fn stores(atom: &AtomType) -> bool {
                    matches!(atom, $($atom)|+)
                }
            }
        )*
    };
}

impl_atom_value!(
    i8 => "bte": AtomType::Bte | AtomType::Bit,
    i16 => "sht": AtomType::Sht,
    i32 => "int": AtomType::Int | AtomType::Date | AtomType::Daytime,
    i64 => "lng": AtomType::Lng | AtomType::Timestamp,
    i128 => "hge": AtomType::Hge,
    u64 => "oid": AtomType::Oid,
    f32 => "flt": AtomType::Flt,
    f64 => "dbl": AtomType::Dbl,
);
