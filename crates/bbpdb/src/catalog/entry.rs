use std::{path::Path, str::FromStr};

use log::warn;
use smallvec::SmallVec;

use crate::{
    AtomType, BBP_LIMIT, Bat, BbpStatus, ColumnProps, ColumnRecord, Error, Heap, HeapKind,
    MAX_HEAP_FILENAME_LEN, NewSlot, OID_MAX, OID_NIL, Oid, Restriction, Result, StorageMode,
    Version,
    names::{logical_from_catalog, normalize_separators},
    varheap::is_offset_width,
};

/// Space-separated fields of one catalog line.
struct Fields<'a> {
    line_no: usize,
    tokens: SmallVec<[&'a str; 32]>,
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(line_no: usize, line: &'a str) -> Self {
        Self {
            line_no,
            tokens: line.split(' ').collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::format(self.line_no, reason)
    }

    fn str(&mut self, what: &str) -> Result<&'a str> {
        match self.peek() {
            Some("") => Err(self.error(format!("unexpected empty field at {what}"))),
            Some(token) => {
                self.pos += 1;
                Ok(token)
            }
            None => Err(self.error(format!("missing {what}"))),
        }
    }

    fn num<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.str(what)?;
        token
            .parse()
            .map_err(|_| self.error(format!("malformed {what} `{token}`")))
    }

    #[inline]
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn skip_num(&mut self, what: &str) -> Result<()> {
        self.num::<i64>(what).map(|_| ())
    }

    /// Fields left before the end of the line.
    #[inline]
    fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }

    /// Leading fields left that are all integers.
    fn numeric_run(&self) -> usize {
        self.tokens[self.pos..]
            .iter()
            .take_while(|t| t.parse::<i128>().is_ok())
            .count()
    }

    /// Whether `free size storage`, starting `offset` fields ahead, reads as
    /// a valid heap tail.
    fn is_heap_tail(&self, offset: usize) -> bool {
        let at = |i: usize| self.tokens.get(self.pos + offset + i).copied();
        let free = at(0).and_then(|t| t.parse::<usize>().ok());
        let size = at(1).and_then(|t| t.parse::<usize>().ok());
        let storage = at(2)
            .and_then(|t| t.parse::<u16>().ok())
            .map(StorageMode::try_from);
        matches!((free, size, storage), (Some(free), Some(size), Some(Ok(_))) if free <= size)
    }

    /// Whatever follows the fixed fields, verbatim.
    fn rest(&self) -> Option<String> {
        (self.pos < self.tokens.len()).then(|| self.tokens[self.pos..].join(" "))
    }
}

/// Line layout, chosen by catalog version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Legacy head and tail columns, with `inserted` and `deleted` counts.
    Sixteen,
    /// Legacy head and tail columns.
    Fourteen,
    /// Tail column only.
    Eight,
}

impl Shape {
    fn for_version(version: Version) -> Self {
        if version <= Version::INSERTED {
            Self::Sixteen
        } else if version.has_head_column() {
            Self::Fourteen
        } else {
            Self::Eight
        }
    }
}

/// A heap sub-record before its type-dependent checks.
struct HeapRecord<'a> {
    type_name: &'a str,
    width: u16,
    var: u16,
    properties: u16,
    nokey: [i64; 2],
    nosorted: i64,
    norevsorted: i64,
    base: i128,
    free: usize,
    size: usize,
    storage: u16,
}

impl<'a> HeapRecord<'a> {
    /// `type width var properties nokey0 nokey1 nosorted norevsorted base
    /// [align] free size storage`
    ///
    /// A catalog version without `align` may still carry one. When a single
    /// extra number ends the line, it is read as options unless only the
    /// reading with `align` yields a valid heap tail.
    fn parse(fields: &mut Fields<'a>, version: Version) -> Result<Self> {
        let type_name = fields.str("heap type")?;
        let width = fields.num("heap width")?;
        let var: u16 = fields.num("heap var")?;
        let properties = fields.num("heap properties")?;
        let nokey = [fields.num("nokey")?, fields.num("nokey")?];
        let nosorted = fields.num("nosorted")?;
        let norevsorted = fields.num("norevsorted")?;
        let base = fields.num("heap base")?;

        // free size storage, plus the variable heap record if one follows.
        let vheap_fields = if var & !2 != 0 && type_name != "void" { 3 } else { 0 };
        let after_base = 3 + vheap_fields;
        let stray_align = fields.remaining() == after_base + 1
            && fields.numeric_run() == after_base + 1
            && !fields.is_heap_tail(0)
            && fields.is_heap_tail(1);
        if version.has_align() || stray_align {
            fields.skip_num("heap align")?;
        }

        Ok(Self {
            type_name,
            width,
            var,
            properties,
            nokey,
            nosorted,
            norevsorted,
            base,
            free: fields.num("heap free")?,
            size: fields.num("heap size")?,
            storage: fields.num("heap storage")?,
        })
    }

    fn storage(&self, fields: &Fields<'_>) -> Result<StorageMode> {
        StorageMode::try_from(self.storage)
            .map_err(|v| fields.error(format!("unknown storage mode {v}")))
    }
}

/// Legacy fields of the 14- and 16-field shapes that only get validated.
fn skip_legacy_maps(fields: &mut Fields<'_>) -> Result<()> {
    for what in ["map_head", "map_tail", "map_hheap", "map_theap"] {
        fields.skip_num(what)?;
    }
    Ok(())
}

/// Parses one entry line into its identifier and slot contents.
pub(super) fn parse(
    line_no: usize,
    line: &str,
    version: Version,
    needs_commit: &mut bool,
) -> Result<(Bat, NewSlot)> {
    let shape = Shape::for_version(version);
    let mut fields = Fields::new(line_no, line);

    let id: i64 = fields.num("BAT id")?;
    if id <= 0 {
        return Err(fields.error(format!("invalid BAT id {id}")));
    }
    if id >= BBP_LIMIT as i64 {
        return Err(fields.error(format!(
            "BAT id {id} is beyond the pool limit of {BBP_LIMIT}"
        )));
    }
    let id = id as Bat;

    let status: u32 = fields.num("status")?;
    let headname = fields.str("name")?;
    if shape != Shape::Eight {
        fields.str("tail name")?;
    }
    let filename = normalize_separators(fields.str("filename")?).into_owned();
    if shape != Shape::Eight {
        fields.skip_num("lastused")?;
    }
    let properties: u32 = fields.num("properties")?;
    if shape == Shape::Sixteen {
        fields.skip_num("inserted")?;
        fields.skip_num("deleted")?;
    }
    if shape != Shape::Eight {
        let first: u64 = fields.num("first")?;
        if first != 0 {
            return Err(fields.error("first != 0"));
        }
    }
    let count: usize = fields.num("count")?;
    let capacity: usize = fields.num("capacity")?;

    let hseqbase = if shape == Shape::Eight {
        let base: u64 = fields.num("seqbase")?;
        check_hseqbase(&fields, base)?
    } else {
        skip_legacy_maps(&mut fields)?;
        if fields.peek() != Some("void") {
            return Err(fields.error("head column must be VOID"));
        }
        let head = HeapRecord::parse(&mut fields, version)?;
        if head.free > head.size {
            return Err(fields.error("free > size"));
        }
        // A nil head seqbase is written as a negative number.
        let base = if head.base < 0 {
            0
        } else {
            u64::try_from(head.base).unwrap_or(u64::MAX)
        };
        check_hseqbase(&fields, base)?
    };

    if Path::new(&filename).is_relative()
        && filename.len() + HeapKind::Var.extension().len() + 1 >= MAX_HEAP_FILENAME_LEN
    {
        return Err(fields.error(format!("file name `{filename}` too long")));
    }
    if count > capacity {
        return Err(fields.error(format!("count {count} > capacity {capacity}")));
    }
    let restriction = Restriction::from_properties(properties)
        .ok_or_else(|| fields.error("invalid access restriction"))?;

    let tail = HeapRecord::parse(&mut fields, version)?;
    let atom = match tail.type_name {
        "chr" => AtomType::Bte,
        "wrd" if tail.width == 4 => AtomType::Int,
        "wrd" => AtomType::Lng,
        name => AtomType::from_name(name),
    };

    let hashash = tail.var & 2 != 0;
    let var = tail.var & !2;
    if let Some(varsized) = atom.is_varsized()
        && !atom.is_void()
        && (var != 0) != varsized
    {
        return Err(fields.error(format!(
            "inconsistent variable-size flag for type `{atom}`"
        )));
    }
    check_width(&fields, &atom, tail.width, var != 0)?;
    if !atom.is_void() && count.checked_mul(tail.width as usize).is_none() {
        return Err(fields.error(format!(
            "count {count} overflows a heap of width {}",
            tail.width
        )));
    }
    if tail.properties & !ColumnProps::KNOWN_BITS != 0 {
        return Err(fields.error("unknown properties are set"));
    }

    let mut nokey = tail.nokey;
    if !version.trusts_nokey() && nokey != [0, 0] {
        warn!(
            "BAT {id}: discarding untrusted nokey positions {} {} written by catalog version {version}.",
            nokey[0], nokey[1]
        );
        nokey = [0, 0];
        *needs_commit = true;
    }

    if tail.free > tail.size {
        return Err(fields.error("free > size"));
    }
    let storage = tail.storage(&fields)?;

    let tseqbase = match Oid::try_from(tail.base) {
        Err(_) if tail.base < 0 => OID_NIL,
        Ok(base) if base <= OID_NIL => base,
        _ => return Err(fields.error("seqbase out of range")),
    };

    let heap =
        Heap::new(HeapKind::Tail, &filename, tail.free, tail.size, storage).with_parent(id, 0);
    let mut desc = ColumnRecord::new(atom, tail.width, count, capacity, heap)
        .with_seqbases(hseqbase, tseqbase)
        .with_props(ColumnProps::from_bits_truncate(tail.properties))
        .with_counterexamples(
            nokey.map(position),
            position(tail.nosorted),
            position(tail.norevsorted),
        )
        .with_restriction(restriction);

    if var != 0 && !desc.atom().is_void() {
        let free: usize = fields.num("var heap free")?;
        let size: usize = fields.num("var heap size")?;
        let storage: u16 = fields.num("var heap storage")?;
        if free > size {
            return Err(fields.error("free > size"));
        }
        let storage = StorageMode::try_from(storage)
            .map_err(|v| fields.error(format!("unknown storage mode {v}")))?;
        let vheap = Heap::new(HeapKind::Var, &filename, free, size, storage)
            .with_parent(id, 0)
            .with_hash_bits(hashash, true);
        desc = desc.with_vheap(vheap);
    }

    let options = fields.rest();

    Ok((
        id,
        NewSlot {
            desc,
            logical_name: logical_from_catalog(id, headname),
            physical_name: filename,
            options,
            disk_status: BbpStatus::from_bits_retain(status),
        },
    ))
}

fn check_hseqbase(fields: &Fields<'_>, base: u64) -> Result<Oid> {
    if base > OID_MAX {
        return Err(fields.error("seqbase out of range"));
    }
    Ok(base)
}

/// Fixed-width types store values of the atom's size; variable-width types
/// store offsets of 1, 2, 4 or 8 bytes.
fn check_width(fields: &Fields<'_>, atom: &AtomType, width: u16, varsized: bool) -> Result<()> {
    let Some(size) = atom.size() else {
        return Ok(());
    };
    let ok = if atom.is_void() {
        width == 0 || width as usize == size_of::<Oid>()
    } else if varsized {
        is_offset_width(width) && width as usize <= size
    } else {
        width as usize == size
    };
    if ok {
        Ok(())
    } else {
        Err(fields.error(format!("inconsistent width {width} for type `{atom}`")))
    }
}

/// Counter-example positions; negative values mean "none".
#[inline]
fn position(v: i64) -> usize {
    usize::try_from(v).unwrap_or(0)
}
