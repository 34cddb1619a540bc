use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    path::{MAIN_SEPARATOR, MAIN_SEPARATOR_STR, PathBuf},
    str::FromStr,
};

use xxhash_rust::xxh3::xxh3_64;

use crate::{Bat, Error, Result};

const TMP_PREFIX: &str = "tmp_";
const GOLDEN_RATIO: u64 = 0x9e37_79b9_7f4a_7c15;

/// Default logical name of a column: `tmp_<octal id>`.
pub fn tmp_name(id: Bat) -> String {
    format!("{TMP_PREFIX}{:o}", id.unsigned_abs())
}

/// Subdirectory holding the files of `id`, built from the octal digits above
/// the lowest two. Empty for identifiers below `0o100`.
pub fn subdir(id: Bat) -> String {
    let mut dir = String::new();
    let id = id.unsigned_abs();
    if id >= 0o100 {
        push_subdir(&mut dir, id >> 6);
    }
    dir
}

fn push_subdir(dir: &mut String, i: u32) {
    if i >= 0o100 {
        push_subdir(dir, i >> 6);
        dir.push(MAIN_SEPARATOR);
    }
    let i = i & 0o77;
    dir.push(char::from(b'0' + (i >> 3) as u8));
    dir.push(char::from(b'0' + (i & 7) as u8));
}

/// Replaces both `/` and `\\` with the host separator.
pub fn normalize_separators(path: &str) -> Cow<'_, str> {
    let is_foreign = |c: char| (c == '/' || c == '\\') && c != MAIN_SEPARATOR;
    if path.contains(is_foreign) {
        Cow::Owned(path.replace(is_foreign, MAIN_SEPARATOR_STR))
    } else {
        Cow::Borrowed(path)
    }
}

/// Logical name recorded for a catalog head name.
///
/// A leading `~` stands for the default name; a later `~` cuts off a legacy
/// tail name.
pub fn logical_from_catalog(id: Bat, headname: &str) -> String {
    match headname.find('~') {
        Some(0) => tmp_name(id),
        Some(i) => headname[..i].to_owned(),
        None => headname.to_owned(),
    }
}

#[inline]
pub fn is_default_logical(id: Bat, name: &str) -> bool {
    name.strip_prefix(TMP_PREFIX)
        .is_some_and(|octal| u32::from_str_radix(octal, 8).is_ok_and(|v| v == id.unsigned_abs()))
}

/// Identifier-derived physical name of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalName(Bat);

impl PhysicalName {
    pub fn new(id: Bat) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub fn id(&self) -> Bat {
        self.0
    }

    /// Farm-relative location without extension, e.g. `11/1121`.
    pub fn path(&self) -> PathBuf {
        let dir = subdir(self.0);
        let file = format!("{:o}", self.0.unsigned_abs());
        if dir.is_empty() {
            PathBuf::from(file)
        } else {
            PathBuf::from(dir).join(file)
        }
    }
}

impl fmt::Display for PhysicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TMP_PREFIX}{:o}", self.0.unsigned_abs())
    }
}

/// Three-part SQL name of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlName {
    schema: String,
    table: String,
    column: String,
}

impl SqlName {
    pub const DEFAULT_SCHEMA: &str = "sys";

    /// An empty schema stands for [`SqlName::DEFAULT_SCHEMA`]. Table and
    /// column must be non-empty.
    pub fn new(schema: &str, table: &str, column: &str) -> Result<Self> {
        if table.is_empty() {
            return Err(Error::InvalidArgument("SQL table name is empty".into()));
        }
        if column.is_empty() {
            return Err(Error::InvalidArgument("SQL column name is empty".into()));
        }
        let schema = if schema.is_empty() {
            Self::DEFAULT_SCHEMA
        } else {
            schema
        };
        Ok(Self {
            schema: schema.to_owned(),
            table: table.to_owned(),
            column: column.to_owned(),
        })
    }

    /// Reads the SQL name encoded in a logical name `schema_table_column`.
    ///
    /// Schema and table names containing `_` can't be told apart from the
    /// separator; the first two underscores are taken as separators.
    pub fn from_logical(id: Bat, name: &str) -> Option<Self> {
        if is_default_logical(id, name) {
            return None;
        }
        let (schema, rest) = name.split_once('_')?;
        let (table, column) = rest.split_once('_')?;
        if schema.is_empty() {
            return None;
        }
        Self::new(schema, table, column).ok()
    }

    /// Logical name under which the column is cataloged.
    pub fn to_logical(&self) -> String {
        format!("{}_{}_{}", self.schema, self.table, self.column)
    }

    #[inline(always)]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[inline(always)]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[inline(always)]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Hash that stays the same across processes and builds.
    pub fn stable_hash(&self) -> u64 {
        let mut seed = xxh3_64(self.schema.as_bytes());
        for part in [&self.table, &self.column] {
            let h = xxh3_64(part.as_bytes());
            seed ^= h
                .wrapping_add(GOLDEN_RATIO)
                .wrapping_add(seed << 6)
                .wrapping_add(seed >> 2);
        }
        seed
    }
}

impl Hash for SqlName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.stable_hash());
    }
}

impl fmt::Display for SqlName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.column)
    }
}

impl FromStr for SqlName {
    type Err = Error;

    /// Accepts `schema.table.column` or `table.column`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(schema), Some(table), Some(column)) => Self::new(schema, table, column),
            (Some(table), Some(column), None) => Self::new("", table, column),
            _ => Err(Error::InvalidArgument(format!(
                "`{s}` is not a qualified column name"
            ))),
        }
    }
}

/// Anything a column can be looked up by.
pub trait ColumnName {
    fn logical_name(&self) -> Cow<'_, str>;
}

impl ColumnName for str {
    #[inline]
    fn logical_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl ColumnName for String {
    #[inline]
    fn logical_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl ColumnName for SqlName {
    #[inline]
    fn logical_name(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_logical())
    }
}
