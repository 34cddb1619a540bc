use crate::{BBP_LIMIT, Error, Result, SIZEOF_MAX_INT, SIZEOF_OID, SIZEOF_PTR, Version};

const VERSION_PREFIX: &str = "BBP.dir, GDKversion ";
const BBPSIZE_PREFIX: &str = "BBPsize=";

/// Reads the version from `BBP.dir, GDKversion <n>`.
///
/// `<n>` is taken as decimal first and then, failing that, as octal digits.
/// An unknown number above the current version in decimal is a version error.
pub(super) fn parse_version(line_no: usize, line: &str) -> Result<Version> {
    let digits = line
        .strip_prefix(VERSION_PREFIX)
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| Error::format(line_no, "malformed header"))?;

    let decimal = digits.parse::<u64>().unwrap_or(u64::MAX);
    let octal = u64::from_str_radix(digits, 8).ok();

    let recognized = [Some(decimal), octal]
        .into_iter()
        .flatten()
        .filter_map(|v| u32::try_from(v).ok())
        .map(Version::new)
        .find(|v| v.is_recognized());
    if let Some(version) = recognized {
        return Ok(version);
    }

    // The server writes the number in decimal; octal digits are only a
    // fallback spelling of a known version.
    if decimal > u64::from(u32::from(Version::CURRENT)) {
        return Err(Error::Version {
            found: Version::new(u32::try_from(decimal).unwrap_or(u32::MAX)),
            supported: Version::CURRENT,
        });
    }

    Err(Error::format(
        line_no,
        format!("unrecognized version {digits}"),
    ))
}

/// Checks `<ptrsize> <oidsize> <intsize> [BBPsize=<n>]` against this build.
/// Returns the `BBPsize` hint if present.
pub(super) fn parse_sizes(line_no: usize, line: &str) -> Result<Option<usize>> {
    let mut fields = line.split_ascii_whitespace();
    let mut next_size = |what: &str| -> Result<usize> {
        fields
            .next()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| Error::format(line_no, format!("malformed {what} size")))
    };

    let ptr = next_size("pointer")?;
    let oid = next_size("OID")?;
    let int = next_size("integer")?;

    if ptr != SIZEOF_PTR {
        return Err(Error::format(
            line_no,
            format!("database created with incompatible pointer size {ptr}, this build has {SIZEOF_PTR}"),
        ));
    }
    if oid != SIZEOF_OID {
        return Err(Error::format(
            line_no,
            format!("database created with incompatible OID size {oid}, this build has {SIZEOF_OID}"),
        ));
    }
    if int > SIZEOF_MAX_INT {
        return Err(Error::format(
            line_no,
            format!("database created with incompatible integer size {int}, largest supported is {SIZEOF_MAX_INT}"),
        ));
    }

    let bbp_size = match fields.next() {
        Some(field) => Some(parse_bbp_size(line_no, field)?),
        None => None,
    };
    if fields.next().is_some() {
        return Err(Error::format(line_no, "unexpected text after sizes"));
    }

    Ok(bbp_size)
}

#[inline]
pub(super) fn is_bbp_size_line(line: &str) -> bool {
    line.starts_with(BBPSIZE_PREFIX)
}

/// Reads `BBPsize=<n>`.
pub(super) fn parse_bbp_size(line_no: usize, line: &str) -> Result<usize> {
    let n = line
        .trim()
        .strip_prefix(BBPSIZE_PREFIX)
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| Error::format(line_no, "malformed BBPsize"))?;
    if n >= BBP_LIMIT {
        return Err(Error::format(
            line_no,
            format!("BBPsize {n} is beyond the pool limit of {BBP_LIMIT}"),
        ));
    }
    Ok(n)
}

/// Number of slots to allocate for a `BBPsize` hint, with room to spare.
#[inline]
pub(super) fn reserve_for(bbp_size: usize) -> usize {
    bbp_size.saturating_add(bbp_size / 5).min(BBP_LIMIT)
}
