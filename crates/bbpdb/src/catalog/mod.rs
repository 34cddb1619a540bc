//! Reader for the `BBP.dir` catalog.
//!
//! ```text
//! BBP.dir, GDKversion <version>
//! <ptrsize> <oidsize> <intsize> [BBPsize=<n>]
//! [BBPsize=<n>]
//! <entry>
//! ...
//! ```

use std::{fs, path::Path};

use log::debug;

use crate::{BbpTable, Error, Result, Version};

mod entry;
mod header;

/// Outcome of reading a catalog.
#[derive(Debug)]
pub(crate) struct Loaded {
    pub version: Version,
    pub table: BbpTable,
    /// Some entry holds data that the database server must rewrite first.
    pub needs_commit: bool,
}

pub(crate) fn read(path: &Path) -> Result<Loaded> {
    let text = fs::read_to_string(path)?;
    let loaded = parse(&text)?;
    debug!(
        "Read {} entries from {} (version {}).",
        loaded.table.len(),
        path.display(),
        loaded.version
    );
    Ok(loaded)
}

pub(crate) fn parse(text: &str) -> Result<Loaded> {
    let mut lines = Lines::new(text);

    let (line_no, line) = lines
        .next()
        .transpose()?
        .ok_or_else(|| Error::format(1, "missing header"))?;
    let version = header::parse_version(line_no, line)?;

    let (line_no, line) = lines
        .next()
        .transpose()?
        .ok_or_else(|| Error::format(2, "missing header"))?;
    let mut bbp_size = header::parse_sizes(line_no, line)?;

    if bbp_size.is_none() && lines.peek().is_some_and(header::is_bbp_size_line) {
        if let Some((line_no, line)) = lines.next().transpose()? {
            bbp_size = Some(header::parse_bbp_size(line_no, line)?);
        }
    }

    debug!("Catalog header parsed: version {version}, BBPsize {bbp_size:?}.");

    let mut table = BbpTable::new();
    if let Some(n) = bbp_size.map(header::reserve_for).filter(|&n| n > 0) {
        table.extend(n - 1)?;
    }

    let mut needs_commit = false;
    while let Some((line_no, line)) = lines.next().transpose()? {
        let (id, slot) = entry::parse(line_no, line, version, &mut needs_commit)?;
        if table.get(id).is_some() {
            return Err(Error::format(line_no, "duplicate entry"));
        }
        if table.find_by_name(&slot.logical_name).is_some() {
            return Err(Error::format(
                line_no,
                format!("duplicate logical name `{}`", slot.logical_name),
            ));
        }
        table.insert(id, slot)?;
    }

    Ok(Loaded {
        version,
        table,
        needs_commit,
    })
}

/// Catalog lines with their 1-based numbers.
///
/// `\r\n` ends a line like `\n` does. Any other `\r`, or an empty line, is an
/// error. The last line may lack its terminator.
struct Lines<'a> {
    rest: &'a str,
    line_no: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            rest: text,
            line_no: 0,
        }
    }

    /// The raw text of the next line, unchecked.
    fn peek(&self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let line = self.rest.split('\n').next().unwrap_or_default();
        Some(line.strip_suffix('\r').unwrap_or(line))
    }

    fn next(&mut self) -> Option<Result<(usize, &'a str)>> {
        if self.rest.is_empty() {
            return None;
        }
        self.line_no += 1;

        let (line, rest) = self.rest.split_once('\n').unwrap_or((self.rest, ""));
        self.rest = rest;

        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.contains('\r') {
            return Some(Err(Error::format(self.line_no, "stray carriage return")));
        }
        if line.is_empty() {
            return Some(Err(Error::format(self.line_no, "empty line")));
        }
        Some(Ok((self.line_no, line)))
    }
}
