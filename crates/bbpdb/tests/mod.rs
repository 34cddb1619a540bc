use std::{
    fs,
    path::{Path, PathBuf},
};

use bbpdb::{
    AtomType, BAT_NIL, BBP_LIMIT, BbpStatus, BbpTable, ColumnRecord, Error, Heap, HeapAccess,
    HeapKind, NewSlot, OID_NIL, Persistence, PhysicalName, Pool, PoolOptions, Result, SqlName,
    StorageMode, Version,
    names::{subdir, tmp_name},
    varheap::{STRHASHSIZE, VARSHIFT, VarEra, var_heap_val},
};
use tempfile::TempDir;

const HEADER: &str = "BBP.dir, GDKversion 61041\n8 8 8\n";

/// Helper to create a temporary farm holding `BACKUP/BBP.dir`
fn setup_test_farm(catalog: &str) -> Result<TempDir> {
    let temp_dir = TempDir::new()?;
    let backup = temp_dir.path().join("BACKUP");
    fs::create_dir_all(&backup)?;
    fs::write(backup.join("BBP.dir"), catalog)?;
    Ok(temp_dir)
}

/// Writes a heap file under the farm, creating its subdirectory.
fn write_heap(farm: &Path, file: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = farm.join(file);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&path, bytes)?;
    Ok(path)
}

fn int_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

/// Catalog line of a fixed-width column with no counter-examples.
fn entry(id: i32, name: &str, file: &str, atom: &str, width: u16, count: usize) -> String {
    let free = count * width as usize;
    format!("{id} 32 {name} {file} 0 {count} {count} 0 {atom} {width} 0 0 0 0 0 0 0 {free} {free} 0")
}

fn open_err(catalog: &str) -> Error {
    let temp = setup_test_farm(catalog).unwrap();
    Pool::open(temp.path()).unwrap_err()
}

fn format_reason(catalog: &str) -> String {
    let err = open_err(catalog);
    assert!(err.is_format(), "expected a format error, got {err}");
    err.format_reason().unwrap().to_owned()
}

#[test]
fn test_open_single_int_column() -> Result<()> {
    let temp = setup_test_farm(
        "BBP.dir, GDKversion 61041\n\
         8 8 8 BBPsize=2\n\
         1 32 user_col 01/1 2176 10 20 0 int 4 0 0 0 0 0 0 0 0 40 4096 0\n",
    )?;
    write_heap(temp.path(), "01/1.tail", &int_bytes(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]))?;

    let pool = Pool::open(temp.path())?;
    assert_eq!(pool.version(), Version::new(0o61041));
    assert_eq!(pool.version().to_string(), "061041");
    assert_eq!(pool.size(), 2);

    let id = pool.find_column("user_col").unwrap();
    assert_eq!(id, 1);
    let column = pool.column(id).unwrap();
    assert_eq!(column.type_name(), "int");
    assert_eq!(column.length(), 10);
    assert_eq!(column.allocated_capacity(), 20);
    assert_eq!(column.width(), 4);
    assert_eq!(column.storage_type(), StorageMode::Memory);
    assert!(column.is_valid());
    assert_eq!(column.filename(), Some("01/1"));

    assert_eq!(column.values::<i32>()?, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

    pool.close();
    Ok(())
}

#[test]
fn test_empty_catalog() -> Result<()> {
    let temp = setup_test_farm(HEADER)?;
    let pool = Pool::open(temp.path())?;

    assert_eq!(pool.size(), 1);
    assert_eq!(pool.columns().count(), 0);
    assert_eq!(pool.names().count(), 0);
    assert!(pool.column(1).is_none());
    assert!(pool.column(0).is_none());
    assert!(pool.column(BAT_NIL).is_none());

    Ok(())
}

#[test]
fn test_missing_backup_must_recover() -> Result<()> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("BBP.dir"), HEADER)?;

    let err = Pool::open(temp.path()).unwrap_err();
    assert!(matches!(err, Error::MustRecover(_)));
    assert!(err.to_string().contains("BACKUP"));

    Ok(())
}

#[test]
fn test_duplicate_entry() {
    let catalog = format!(
        "{HEADER}{}\n{}\n",
        entry(5, "a", "05", "int", 4, 0),
        entry(5, "b", "05", "int", 4, 0)
    );
    assert_eq!(format_reason(&catalog), "duplicate entry");
}

#[test]
fn test_duplicate_logical_name() {
    let catalog = format!(
        "{HEADER}{}\n{}\n",
        entry(5, "a", "05", "int", 4, 0),
        entry(6, "a", "06", "int", 4, 0)
    );
    assert!(format_reason(&catalog).contains("duplicate logical name"));
}

#[test]
fn test_legacy_head_must_be_void() {
    let catalog = "BBP.dir, GDKversion 61033\n8 8 8\n\
        5 32 h t 05 0 0 0 10 10 0 0 0 0 \
        int 4 0 0 0 0 0 0 0 0 0 0 0 \
        int 4 0 0 0 0 0 0 0 0 40 4096 0\n";
    assert_eq!(format_reason(catalog), "head column must be VOID");
}

#[test]
fn test_legacy_catalog_must_recover() {
    let catalog = "BBP.dir, GDKversion 61033\n8 8 8\n\
        5 32 h t 05 0 0 0 10 10 0 0 0 0 \
        void 0 0 0 0 0 0 0 0 0 0 0 0 \
        int 4 0 0 0 0 0 0 0 0 40 4096 0\n";
    assert!(matches!(open_err(catalog), Error::MustRecover(_)));
}

#[test]
fn test_legacy_first_must_be_zero() {
    let catalog = "BBP.dir, GDKversion 61032\n8 8 8\n\
        5 32 h t 05 0 0 0 0 3 10 10 0 0 0 0 \
        void 0 0 0 0 0 0 0 0 0 0 0 0 \
        int 4 0 0 0 0 0 0 0 0 40 4096 0\n";
    assert_eq!(format_reason(catalog), "first != 0");
}

#[test]
fn test_untrusted_nokey_must_recover() {
    let catalog = "BBP.dir, GDKversion 61034\n8 8 8\n\
        5 32 c 05 0 10 10 0 int 4 0 0 3 7 0 0 0 0 40 40 0\n";
    assert!(matches!(open_err(catalog), Error::MustRecover(_)));
}

#[test]
fn test_version_too_new() {
    let err = open_err("BBP.dir, GDKversion 99999999\n8 8 8\n");
    assert!(matches!(
        err,
        Error::Version {
            supported: Version::CURRENT,
            ..
        }
    ));
}

#[test]
fn test_version_in_decimal() -> Result<()> {
    let temp = setup_test_farm("BBP.dir, GDKversion 25121\n8 8 8\n")?;
    let pool = Pool::open(temp.path())?;
    assert_eq!(pool.version(), Version::CURRENT);
    Ok(())
}

#[test]
fn test_unrecognized_version() {
    assert!(format_reason("BBP.dir, GDKversion 25113\n8 8 8\n").contains("unrecognized version"));
    assert_eq!(format_reason("BBP.dir\n8 8 8\n"), "malformed header");
    assert_eq!(format_reason(""), "missing header");
}

#[test]
fn test_size_mismatch() {
    assert!(format_reason("BBP.dir, GDKversion 61041\n4 8 8\n").contains("pointer size"));
    assert!(format_reason("BBP.dir, GDKversion 61041\n8 4 8\n").contains("OID size"));
    assert!(format_reason("BBP.dir, GDKversion 61041\n8 8 32\n").contains("integer size"));
}

#[test]
fn test_bbp_size_on_its_own_line() -> Result<()> {
    let temp = setup_test_farm("BBP.dir, GDKversion 61041\n8 8 8\nBBPsize=20000\n")?;
    let pool = Pool::open(temp.path())?;
    assert_eq!(pool.size(), 1);
    assert!(pool.limit() >= 24000);
    Ok(())
}

#[test]
fn test_bbp_size_raises_limit() -> Result<()> {
    let plain = setup_test_farm(HEADER)?;
    assert_eq!(Pool::open(plain.path())?.limit(), 0);

    let sized = setup_test_farm("BBP.dir, GDKversion 61041\n8 8 8 BBPsize=20000\n")?;
    let pool = Pool::open(sized.path())?;
    assert_eq!(pool.size(), 1);
    assert!(pool.limit() >= 24000);
    Ok(())
}

#[test]
fn test_next_version_in_decimal_is_too_new() {
    // 061042 as the server writes it.
    let err = open_err("BBP.dir, GDKversion 25122\n8 8 8\n");
    assert!(
        matches!(
            err,
            Error::Version {
                supported: Version::CURRENT,
                ..
            }
        ),
        "expected a version error, got {err}"
    );
    assert!(matches!(
        open_err("BBP.dir, GDKversion 61042\n8 8 8\n"),
        Error::Version { .. }
    ));
}

#[test]
fn test_align_field_in_talign_catalog() {
    let catalog = "BBP.dir, GDKversion 61036\n8 8 8\n\
        5 32 c 05 0 10 10 0 int 4 0 0 0 0 0 0 0 4 40 40 0\n";
    assert!(matches!(open_err(catalog), Error::MustRecover(_)));

    let without_align = "BBP.dir, GDKversion 61036\n8 8 8\n\
        5 32 c 05 0 10 10 0 int 4 0 0 0 0 0 0 0 40 40 0\n";
    assert!(format_reason(without_align).contains("missing heap storage"));
}

#[test]
fn test_numeric_options_are_not_align() -> Result<()> {
    let temp = setup_test_farm(&format!(
        "{HEADER}1 32 a 01/1 0 0 0 0 int 4 0 0 0 0 0 0 0 0 0 0 7\n"
    ))?;
    let pool = Pool::open(temp.path())?;

    assert_eq!(pool.options_of(1), Some("7"));
    let heap = pool.column(1).unwrap().record().heap();
    assert_eq!(heap.free(), 0);
    assert_eq!(heap.size(), 0);
    assert_eq!(heap.storage(), StorageMode::Memory);

    Ok(())
}

#[test]
fn test_empty_field() {
    let catalog = format!("{HEADER}1 32 a  01/1 0 0 0 0 int 4 0 0 0 0 0 0 0 0 0 0\n");
    assert!(format_reason(&catalog).contains("unexpected empty field"));
}

#[test]
fn test_count_overflowing_heap() -> Result<()> {
    let huge = 1usize << 62;
    let catalog = format!("{HEADER}1 32 a 01/1 0 {huge} {huge} 0 lng 8 0 0 0 0 0 0 0 0 0 0\n");
    assert!(format_reason(&catalog).contains("overflows"));

    let temp = TempDir::new()?;
    let mut table = BbpTable::new();
    table.insert(
        1,
        NewSlot {
            desc: ColumnRecord::new(
                AtomType::Lng,
                8,
                huge,
                huge,
                Heap::new(HeapKind::Tail, "01/1", 0, 0, StorageMode::Memory),
            ),
            logical_name: "huge".into(),
            physical_name: "01/1".into(),
            options: None,
            disk_status: BbpStatus::EXISTING,
        },
    )?;
    let pool = Pool::from_table(PoolOptions::new(temp.path()), Version::CURRENT, table);
    assert!(matches!(
        pool.column(1).unwrap().values::<i64>(),
        Err(Error::HeapTooShort { actual: 0, .. })
    ));

    Ok(())
}

#[test]
fn test_id_at_limit() {
    let catalog = format!("{HEADER}{}\n", entry(BBP_LIMIT as i32, "x", "1", "int", 4, 0));
    assert!(format_reason(&catalog).contains("beyond the pool limit"));
}

#[test]
fn test_crlf_lines() -> Result<()> {
    let lines = [
        entry(1, "a", "01/1", "int", 4, 0),
        entry(2, "b", "02/2", "lng", 8, 0),
    ];
    let lf = setup_test_farm(&format!("{HEADER}{}\n", lines.join("\n")))?;
    let crlf = setup_test_farm(&format!("{HEADER}{}\n", lines.join("\n")).replace('\n', "\r\n"))?;

    let lf = Pool::open(lf.path())?;
    let crlf = Pool::open(crlf.path())?;
    assert_eq!(lf.version(), crlf.version());
    assert_eq!(lf.size(), crlf.size());
    assert!(lf.names().eq(crlf.names()));
    assert_eq!(
        crlf.column(2).map(|column| column.type_name().to_owned()),
        Some("lng".to_owned())
    );

    Ok(())
}

#[test]
fn test_stray_carriage_return() {
    let catalog = format!("{HEADER}1 32 a\r 01/1 0 0 0 0 int 4 0 0 0 0 0 0 0 0 0 0\n");
    assert_eq!(format_reason(&catalog), "stray carriage return");
}

#[test]
fn test_missing_final_newline() -> Result<()> {
    let temp = setup_test_farm(&format!("{HEADER}{}", entry(1, "a", "01/1", "int", 4, 0)))?;
    let pool = Pool::open(temp.path())?;
    assert_eq!(pool.find_column("a"), Some(1));
    Ok(())
}

#[test]
fn test_heap_record_violations() {
    let free_over_size = format!("{HEADER}1 32 a 01/1 0 0 0 0 int 4 0 0 0 0 0 0 0 80 40 0\n");
    assert_eq!(format_reason(&free_over_size), "free > size");

    let unknown_props = format!("{HEADER}1 32 a 01/1 0 0 0 0 int 4 0 4096 0 0 0 0 0 0 0 0\n");
    assert_eq!(format_reason(&unknown_props), "unknown properties are set");

    let count_over_capacity = format!("{HEADER}1 32 a 01/1 0 5 4 0 int 4 0 0 0 0 0 0 0 0 0 0\n");
    assert!(format_reason(&count_over_capacity).contains("capacity"));

    let bad_width = format!("{HEADER}1 32 a 01/1 0 0 0 0 int 8 0 0 0 0 0 0 0 0 0 0\n");
    assert!(format_reason(&bad_width).contains("inconsistent width"));

    let var_fixed = format!("{HEADER}1 32 a 01/1 0 0 0 0 int 4 1 0 0 0 0 0 0 0 0 0 0 0 0\n");
    assert!(format_reason(&var_fixed).contains("variable-size flag"));

    let bad_storage = format!("{HEADER}1 32 a 01/1 0 0 0 0 int 4 0 0 0 0 0 0 0 0 0 9\n");
    assert!(format_reason(&bad_storage).contains("storage mode"));

    let bad_seqbase = format!("{HEADER}1 32 a 01/1 0 0 0 {OID_NIL} int 4 0 0 0 0 0 0 0 0 0 0\n");
    assert_eq!(format_reason(&bad_seqbase), "seqbase out of range");

    let zero_id = format!("{HEADER}0 32 a 01/1 0 0 0 0 int 4 0 0 0 0 0 0 0 0 0 0\n");
    assert!(format_reason(&zero_id).contains("invalid BAT id"));

    let short = format!("{HEADER}1 32 a 01/1 0 0 0 0 int 4 0\n");
    assert!(format_reason(&short).contains("missing"));
}

#[test]
fn test_unknown_type_is_indexed() -> Result<()> {
    let temp = setup_test_farm(&format!("{HEADER}{}\n", entry(3, "geo", "03", "mystery", 12, 2)))?;
    write_heap(temp.path(), "03.tail", &[0; 24])?;
    let pool = Pool::open(temp.path())?;

    let column = pool.column(pool.find_column("geo").unwrap()).unwrap();
    assert!(column.atom().is_unknown());
    assert_eq!(column.type_name(), "mystery");
    assert_eq!(column.length(), 2);
    assert!(matches!(
        column.as_span::<[u8; 12]>(),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(pool.columns().any(|c| c.id() == 3));

    Ok(())
}

#[test]
fn test_legacy_type_names() -> Result<()> {
    let catalog = format!(
        "{HEADER}{}\n{}\n{}\n",
        entry(1, "c", "01/1", "chr", 1, 0),
        entry(2, "w4", "02/2", "wrd", 4, 0),
        entry(3, "w8", "03/3", "wrd", 8, 0)
    );
    let temp = setup_test_farm(&catalog)?;
    let pool = Pool::open(temp.path())?;

    assert_eq!(pool.column(1).unwrap().atom(), &AtomType::Bte);
    assert_eq!(pool.column(2).unwrap().atom(), &AtomType::Int);
    assert_eq!(pool.column(3).unwrap().atom(), &AtomType::Lng);

    Ok(())
}

#[test]
fn test_fixed_width_pointers() -> Result<()> {
    let values = [10, -20, 30, i32::MIN, 50];
    let temp = setup_test_farm(&format!("{HEADER}{}\n", entry(7, "ints", "07", "int", 4, 5)))?;
    write_heap(temp.path(), "07.tail", &int_bytes(&values))?;
    let pool = Pool::open(temp.path())?;
    let column = pool.column(7).unwrap();

    let span = column.as_span::<i32>()?;
    assert_eq!(span.len(), column.length());
    assert_eq!(span, &values);

    let base = column.heap_bytes()?.as_ptr();
    for (i, ptr) in column.iter()?.enumerate() {
        assert_eq!(ptr, base.wrapping_add(i * 4));
    }
    assert_eq!(column.iter()?.rev().next(), Some(base.wrapping_add(16)));
    assert_eq!(column.iter()?.len(), 5);

    let begin = column.begin()?;
    let end = column.end()?;
    assert_eq!(end - begin, 5);
    assert!(begin < end);
    assert_eq!(begin + 5, end);
    assert_eq!(begin.get(3), base.wrapping_add(12));
    assert_eq!((begin + 1).bytes(), Some(&(-20i32).to_ne_bytes()[..]));

    let mut cursor = end;
    cursor -= 2;
    assert_eq!(cursor.position(), 3);
    cursor += 1;
    assert_eq!(cursor.ptr(), base.wrapping_add(16));

    assert!(matches!(
        column.as_span::<i64>(),
        Err(Error::WidthMismatch { width: 4, size: 8 })
    ));
    assert!(matches!(column.values::<f32>(), Err(Error::TypeMismatch { .. })));

    Ok(())
}

#[test]
fn test_cursors_of_different_columns() -> Result<()> {
    let catalog = format!(
        "{HEADER}{}\n{}\n",
        entry(1, "a", "01/1", "int", 4, 2),
        entry(2, "b", "02/2", "int", 4, 2)
    );
    let temp = setup_test_farm(&catalog)?;
    write_heap(temp.path(), "01/1.tail", &int_bytes(&[1, 2]))?;
    write_heap(temp.path(), "02/2.tail", &int_bytes(&[1, 2]))?;
    let pool = Pool::open(temp.path())?;

    let a = pool.column(1).unwrap().begin()?;
    let b = pool.column(2).unwrap().begin()?;
    assert_ne!(a, b);
    assert_eq!(a.partial_cmp(&b), None);
    assert_eq!(a, pool.column(1).unwrap().begin()?);

    Ok(())
}

#[test]
fn test_var_heap_pointers() -> Result<()> {
    let catalog = format!("{HEADER}4 32 s 04 0 3 3 0 str 1 1 0 0 0 0 0 0 3 3 0 64 4096 1\n");
    let temp = setup_test_farm(&catalog)?;
    write_heap(temp.path(), "04.tail", &[0, 7, 200])?;
    write_heap(temp.path(), "04.theap", &[0; 64])?;
    let pool = Pool::open(temp.path())?;
    let column = pool.column(4).unwrap();

    assert_eq!(column.as_span::<u8>()?.len(), column.length());
    assert!(column.record().is_varsized());
    assert_eq!(column.record().vheap().map(Heap::storage), Some(StorageMode::Mapped));

    let heap = column.heap_bytes()?;
    let vbase = column.var_heap_bytes()?.unwrap().as_ptr();
    for (p, ptr) in column.iter()?.enumerate() {
        let expected = vbase.wrapping_add(heap[p] as usize + STRHASHSIZE);
        assert_eq!(ptr, expected);
    }

    Ok(())
}

#[test]
fn test_string_column() -> Result<()> {
    let mut vheap = vec![0u8; STRHASHSIZE];
    vheap.extend_from_slice(b"alpha\0beta\0\x80\0");
    let free = vheap.len();

    let catalog = format!(
        "{HEADER}9 32 sys_t_name 11 0 4 4 0 str 2 3 0 0 0 0 0 0 8 8 0 {free} {free} 0 sql\n"
    );
    let temp = setup_test_farm(&catalog)?;
    let offsets: Vec<u8> = [0u16, 6, 11, 0].iter().flat_map(|o| o.to_ne_bytes()).collect();
    write_heap(temp.path(), "11.tail", &offsets)?;
    write_heap(temp.path(), "11.theap", &vheap)?;
    let pool = Pool::open(temp.path())?;

    let id = pool.find_column(&SqlName::new("", "t", "name")?).unwrap();
    let column = pool.column(id).unwrap();
    assert!(column.record().vheap().unwrap().hashash());
    assert_eq!(pool.options_of(id), Some("sql"));

    let strings = column.strings()?.collect::<Result<Vec<_>>>()?;
    assert_eq!(strings, [Some("alpha"), Some("beta"), None, Some("alpha")]);

    let first = column.begin()?.bytes().unwrap();
    assert!(first.starts_with(b"alpha\0"));

    assert!(matches!(column.values::<i16>(), Err(Error::TypeMismatch { .. })));
    assert_eq!(column.as_span::<u16>()?, &[0, 6, 11, 0]);

    Ok(())
}

#[test]
fn test_string_offset_out_of_bounds() -> Result<()> {
    let catalog = format!("{HEADER}2 32 s 02 0 1 1 0 str 4 1 0 0 0 0 0 0 4 4 0 16 16 0\n");
    let temp = setup_test_farm(&catalog)?;
    write_heap(temp.path(), "02.tail", &1000u32.to_ne_bytes())?;
    write_heap(temp.path(), "02.theap", &[0; 16])?;
    let pool = Pool::open(temp.path())?;

    let mut strings = pool.column(2).unwrap().strings()?;
    assert!(matches!(
        strings.next(),
        Some(Err(Error::OffsetOutOfBounds { offset: 1000, .. }))
    ));

    Ok(())
}

#[test]
fn test_dense_void_column() -> Result<()> {
    let catalog = format!("{HEADER}3 32 ids 03 0 5 5 0 void 0 0 0 0 0 0 0 100 0 0 0\n");
    let temp = setup_test_farm(&catalog)?;
    let pool = Pool::open(temp.path())?;
    let column = pool.column(3).unwrap();

    assert!(column.record().is_dense());
    assert_eq!(column.dense_value(0), 100);
    assert_eq!(column.dense_value(4), 104);
    assert!(column.heap_bytes()?.is_empty());
    assert_eq!(column.iter()?.len(), 5);

    let not_dense = format!("{HEADER}3 32 ids 03 0 5 5 0 void 0 0 0 0 0 0 0 -1 0 0 0\n");
    let temp = setup_test_farm(&not_dense)?;
    let pool = Pool::open(temp.path())?;
    assert_eq!(pool.column(3).unwrap().dense_value(2), OID_NIL);

    Ok(())
}

#[test]
fn test_heap_access_modes() -> Result<()> {
    let values = [3, 1, 4, 1, 5, 9];
    let temp = setup_test_farm(&format!("{HEADER}{}\n", entry(1, "pi", "01/1", "int", 4, 6)))?;
    write_heap(temp.path(), "01/1.tail", &int_bytes(&values))?;

    for access in [HeapAccess::AsStored, HeapAccess::ReadAll, HeapAccess::MapAll] {
        let pool = Pool::open_with(PoolOptions::new(temp.path()).with_heap_access(access))?;
        let column = pool.column(1).unwrap();
        assert!(!column.record().heap().is_materialized());
        assert_eq!(column.values::<i32>()?, &values);
        assert!(column.record().heap().is_materialized());
    }

    Ok(())
}

#[test]
fn test_heap_too_short() -> Result<()> {
    let temp = setup_test_farm(&format!("{HEADER}{}\n", entry(1, "a", "01/1", "lng", 8, 4)))?;
    write_heap(temp.path(), "01/1.tail", &[0; 8])?;
    let pool = Pool::open(temp.path())?;
    let column = pool.column(1).unwrap();

    assert!(matches!(
        column.values::<i64>(),
        Err(Error::HeapTooShort {
            needed: 32,
            actual: 8,
            ..
        })
    ));
    assert!(!column.record().heap().is_materialized());

    // A later attempt succeeds once the file is complete.
    write_heap(temp.path(), "01/1.tail", &[0; 32])?;
    assert_eq!(column.values::<i64>()?, &[0; 4]);

    Ok(())
}

#[test]
fn test_missing_heap_file() -> Result<()> {
    let temp = setup_test_farm(&format!("{HEADER}{}\n", entry(1, "a", "01/1", "int", 4, 2)))?;
    let pool = Pool::open(temp.path())?;
    assert!(matches!(pool.column(1).unwrap().values::<i32>(), Err(Error::IO(_))));
    Ok(())
}

#[test]
fn test_deleted_slot_is_findable_but_invalid() -> Result<()> {
    let temp = setup_test_farm(&format!("{HEADER}5 16 gone 05 0 0 0 0 int 4 0 0 0 0 0 0 0 0 0 0\n"))?;
    let pool = Pool::open(temp.path())?;

    let id = pool.find_column("gone").unwrap();
    let column = pool.column(id).unwrap();
    assert!(!column.is_valid());
    assert_eq!(pool.disk_status(id), Some(BbpStatus::DELETED));
    assert_eq!(pool.status(id), Some(BbpStatus::EXISTING));

    Ok(())
}

#[test]
fn test_names_and_tilde() -> Result<()> {
    let catalog = format!(
        "{HEADER}{}\n{}\n{}\n",
        entry(0o1121, "~anything", "11/1121", "int", 4, 0),
        entry(2, "sys_orders_o_id", "02", "int", 4, 0),
        entry(3, "head~tail", "03", "int", 4, 0)
    );
    let temp = setup_test_farm(&catalog)?;
    let pool = Pool::open(temp.path())?;

    let column = pool.column(0o1121).unwrap();
    assert_eq!(column.logical_name(), Some("tmp_1121"));
    assert_eq!(column.physical_name().to_string(), "tmp_1121");
    assert_eq!(column.physical_name().path(), Path::new("11/1121"));
    assert!(column.sql_name().is_none());
    assert_eq!(pool.find_physical("11/1121"), Some(0o1121));
    assert_eq!(pool.find_physical("11\\1121"), Some(0o1121));

    let orders = pool.column(2).unwrap();
    let sql = orders.sql_name().unwrap();
    assert_eq!(sql.to_string(), "sys.orders.o_id");
    assert_eq!(pool.find_column(&sql), Some(2));
    assert_eq!(pool.find_column(&"sys.orders.o_id".parse::<SqlName>()?), Some(2));

    assert_eq!(pool.find_column("head"), Some(3));
    assert_eq!(pool.size(), 0o1121 + 1);

    // Every enumerated name leads back to itself.
    for name in pool.names() {
        let id = pool.find_column(name).unwrap();
        assert_eq!(pool.column(id).unwrap().logical_name(), Some(name));
    }

    // Negative identifiers alias the same column.
    assert_eq!(pool.column(-2).unwrap().id(), 2);

    Ok(())
}

#[test]
fn test_reopen_is_idempotent() -> Result<()> {
    let catalog = format!(
        "{HEADER}{}\n{}\n{}\n",
        entry(1, "a", "01/1", "int", 4, 0),
        entry(40, "b", "50", "dbl", 8, 0),
        entry(9, "c", "11", "sht", 2, 0)
    );
    let temp = setup_test_farm(&catalog)?;

    let first = Pool::open(temp.path())?;
    let second = Pool::open(temp.path())?;
    assert_eq!(first.version(), second.version());
    assert_eq!(first.size(), second.size());
    assert_eq!(first.size(), 41);
    assert!(first.names().eq(second.names()));
    assert_eq!(first.names().collect::<Vec<_>>(), ["a", "c", "b"]);

    Ok(())
}

#[test]
fn test_pool_invariants() -> Result<()> {
    let catalog = format!(
        "{HEADER}{}\n{}\n3 32 s 03 0 0 0 0 str 1 1 0 0 0 0 0 0 0 0 0 0 0 0\n",
        entry(1, "a", "01/1", "int", 4, 0),
        entry(2, "b", "02/2", "void", 0, 0),
    );
    let temp = setup_test_farm(&catalog)?;
    let pool = Pool::open(temp.path())?;

    let mut seen = std::collections::HashSet::new();
    for column in pool.columns() {
        let record = column.record();
        assert!(!column.logical_name().unwrap().is_empty());
        assert!(!column.filename().unwrap().is_empty());
        assert!(seen.insert(column.logical_name().unwrap()));
        assert!(record.heap().free() <= record.heap().size());
        if let Some(vheap) = record.vheap() {
            assert!(vheap.free() <= vheap.size());
        }
        assert_eq!(
            record.is_varsized(),
            record.vheap().is_some(),
            "varsized and vheap disagree for {}",
            column.type_name()
        );
        assert!(
            column
                .physical_name()
                .to_string()
                .starts_with("tmp_")
        );
    }
    assert_eq!(seen.len(), 3);

    Ok(())
}

#[test]
fn test_reference_counts() -> Result<()> {
    let temp = setup_test_farm(&format!("{HEADER}{}\n", entry(1, "a", "01/1", "int", 4, 0)))?;
    let pool = Pool::open(temp.path())?;

    assert_eq!(pool.table().get(1).unwrap().refs(), 0);
    assert_eq!(pool.table().get(1).unwrap().lrefs(), 1);

    assert_eq!(pool.fix(1)?, 1);
    assert_eq!(pool.fix(1)?, 2);
    assert_eq!(pool.unfix(1)?, 1);
    assert_eq!(pool.unfix(1)?, 0);
    assert!(matches!(pool.unfix(1), Err(Error::InvalidArgument(_))));

    assert_eq!(pool.retain(1)?, 2);
    assert_eq!(pool.release(1)?, 1);
    assert_eq!(pool.release(1)?, 0);
    assert!(pool.release(1).is_err());

    assert!(matches!(pool.fix(2), Err(Error::InvalidColumn(2))));

    Ok(())
}

#[test]
fn test_shared_heap_resolves_through_parent() -> Result<()> {
    let temp = TempDir::new()?;
    write_heap(temp.path(), "01/1.tail", &int_bytes(&[1, 2, 3, 4, 5, 6]))?;

    let parent_heap = Heap::new(HeapKind::Tail, "01/1", 24, 24, StorageMode::Memory);
    let child_heap =
        Heap::new(HeapKind::Tail, "02/2", 16, 16, StorageMode::Memory).with_parent(1, 8);

    let mut table = BbpTable::new();
    table.insert(
        1,
        NewSlot {
            desc: ColumnRecord::new(AtomType::Int, 4, 6, 6, parent_heap),
            logical_name: "parent".into(),
            physical_name: "01/1".into(),
            options: None,
            disk_status: BbpStatus::EXISTING,
        },
    )?;
    table.insert(
        2,
        NewSlot {
            desc: ColumnRecord::new(AtomType::Int, 4, 4, 4, child_heap),
            logical_name: "child".into(),
            physical_name: "02/2".into(),
            options: None,
            disk_status: BbpStatus::EXISTING,
        },
    )?;
    let pool = Pool::from_table(PoolOptions::new(temp.path()), Version::CURRENT, table);

    let parent = pool.column(1).unwrap();
    assert!(!parent.record().heap().is_materialized());
    assert_eq!(pool.fix(2)?, 1);
    assert!(parent.record().heap().is_materialized());

    let child = pool.column(2).unwrap();
    assert_eq!(child.values::<i32>()?, &[3, 4, 5, 6]);
    assert_eq!(
        child.heap_bytes()?.as_ptr(),
        parent.heap_bytes()?.as_ptr().wrapping_add(8)
    );

    Ok(())
}

#[test]
fn test_table_limits() -> Result<()> {
    let mut table = BbpTable::new();
    assert_eq!(table.size(), 1);
    assert_eq!(table.limit(), 0);

    table.extend(5)?;
    assert!(table.limit() > 5);
    assert!(matches!(
        table.extend(BBP_LIMIT),
        Err(Error::LimitExceeded { .. })
    ));
    assert!(table.get(5).is_none());
    assert!(table.is_empty());

    Ok(())
}

#[test]
fn test_sql_names() -> Result<()> {
    let name = SqlName::new("", "lineitem", "l_suppkey")?;
    assert_eq!(name.schema(), "sys");
    assert_eq!(name.to_string(), "sys.lineitem.l_suppkey");
    assert_eq!(name.to_logical(), "sys_lineitem_l_suppkey");
    assert_eq!(name.stable_hash(), SqlName::new("sys", "lineitem", "l_suppkey")?.stable_hash());
    assert_ne!(name.stable_hash(), SqlName::new("sys", "l_suppkey", "lineitem")?.stable_hash());
    assert_eq!(name, "lineitem.l_suppkey".parse::<SqlName>()?);

    assert!(matches!(SqlName::new("sys", "", "x"), Err(Error::InvalidArgument(_))));
    assert!(matches!(SqlName::new("sys", "t", ""), Err(Error::InvalidArgument(_))));
    assert!("nodots".parse::<SqlName>().is_err());

    assert_eq!(
        SqlName::from_logical(7, "sys_lineitem_l_suppkey"),
        Some(SqlName::new("sys", "lineitem", "l_suppkey")?)
    );
    assert_eq!(SqlName::from_logical(7, "tmp_7"), None);
    assert_eq!(SqlName::from_logical(7, "plain"), None);

    Ok(())
}

#[test]
fn test_physical_names() {
    assert_eq!(tmp_name(0o1121), "tmp_1121");
    assert_eq!(subdir(0o1121), "11");
    assert_eq!(subdir(0o77), "");
    assert_eq!(subdir(0o123456), "12/34");
    assert_eq!(PhysicalName::new(0o123456).path(), Path::new("12/34/123456"));
    assert_eq!(PhysicalName::new(5).path(), Path::new("5"));
    assert_eq!(PhysicalName::new(5).to_string(), "tmp_5");
}

#[test]
fn test_var_heap_val() {
    let narrow = [3u8];
    assert_eq!(var_heap_val(&narrow, 0, 1, VarEra::Bytes), Some(3 + STRHASHSIZE));
    assert_eq!(
        var_heap_val(&narrow, 0, 1, VarEra::Shifted),
        Some((3 + (STRHASHSIZE >> VARSHIFT)) << VARSHIFT)
    );
    assert_eq!(var_heap_val(&narrow, 1, 1, VarEra::Bytes), None);

    let short = 700u16.to_ne_bytes();
    assert_eq!(var_heap_val(&short, 0, 2, VarEra::Bytes), Some(700 + STRHASHSIZE));

    let wide = 100u32.to_ne_bytes();
    assert_eq!(var_heap_val(&wide, 0, 4, VarEra::Bytes), Some(100));
    assert_eq!(var_heap_val(&wide, 0, 4, VarEra::Shifted), Some(800));

    let widest = (1u64 << 40).to_ne_bytes();
    assert_eq!(var_heap_val(&widest, 0, 8, VarEra::Bytes), Some(1 << 40));

    assert_eq!(var_heap_val(&[0; 6], 0, 3, VarEra::Bytes), None);

    assert_eq!(VarEra::for_version(Version::CURRENT), VarEra::Bytes);
    assert_eq!(VarEra::for_version(Version::BLOB_SORT), VarEra::Shifted);
}

#[test]
fn test_status_bits() {
    assert_eq!(BbpStatus::EXISTING.persistence(), Some(Persistence::Existing));
    assert_eq!(BbpStatus::NEW.persistence(), Some(Persistence::New));
    assert_eq!(BbpStatus::DELETED.persistence(), Some(Persistence::Deleted));
    assert_eq!(BbpStatus::LOADED.persistence(), Some(Persistence::Transient));
    assert_eq!((BbpStatus::EXISTING | BbpStatus::NEW).persistence(), None);

    assert!(BbpStatus::EXISTING.was_persistent());
    assert!(BbpStatus::EXISTING.will_be_persistent());
    assert!(BbpStatus::DELETED.was_persistent());
    assert!(!BbpStatus::DELETED.will_be_persistent());
    assert!(!BbpStatus::NEW.was_persistent());
    assert!((BbpStatus::EXISTING | BbpStatus::SAVING).is_busy());
    assert!(!BbpStatus::LOADED.is_busy());
}

#[test]
fn test_versions() {
    assert_eq!(Version::RECOGNIZED.len(), 8);
    assert!(Version::RECOGNIZED.iter().all(|v| v.is_recognized()));
    assert!(Version::TALIGN.has_align());
    assert!(!Version::NIL_NAN.has_align());
    assert!(!Version::NOKEY.trusts_nokey());
    assert!(Version::BADEMPTY.trusts_nokey());
    assert!(Version::HEADED.has_head_column());
    assert!(!Version::CURRENT.needs_migration());
    assert!(Version::new(0o61042).is_newer_than_supported());
}
