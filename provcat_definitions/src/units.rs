/// Quantity canonicalization for cpu and memory values.
///
/// The api server echoes quantities back in whatever unit it stored, so a
/// desired `1Gi` must compare equal to an observed `1073741824`. Everything
/// is reduced to a single canonical unit before comparison: millicores for
/// cpu, bytes for memory.

// All errors that can happen canonicalizing quantities
#[derive(Debug)]
struct UnitError {
    inner: Context<UErrKind>,
}
// its associated enum
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
enum UErrKind {
    #[fail(display = "malformed quantity '{}'", _0)]
    MalformedQuantity(String),
}
use failure::{Backtrace, Context, Error, Fail};
use std::fmt::{self, Display};

// boilerplate error wrapping (might go away)
impl Fail for UnitError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<UErrKind> for UnitError {
    fn from(kind: UErrKind) -> UnitError {
        UnitError { inner: Context::new(kind) }
    }
}
impl From<Context<UErrKind>> for UnitError {
    fn from(inner: Context<UErrKind>) -> UnitError {
        UnitError { inner: inner }
    }
}
type Result<T> = std::result::Result<T, Error>;

/// Memory suffix table in match priority order
///
/// The binary suffixes must be tried before their single-letter decimal
/// counterparts so `1Mi` is not read as mega + trailing garbage.
const MEMORY_SUFFIXES: &[(&str, i128)] = &[
    ("Ki", 1_024),
    ("Mi", 1_048_576),
    ("Gi", 1_073_741_824),
    ("K", 1_000),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
];

/// Canonicalize a cpu quantity to millicores
///
/// `500m` stays `500m`, plain core counts are scaled: `2` becomes `2000m`
/// and `0.5` becomes `500m`. Values that are neither millicores nor a
/// number are passed through untouched and will compare as plain strings.
pub fn canonical_cpu(quantity: &str) -> Result<String> {
    if quantity.ends_with('m') {
        return Ok(quantity.to_string());
    }
    if let Ok(cores) = quantity.parse::<i64>() {
        return Ok(format!("{}m", cores * 1000));
    }
    if let Ok(cores) = quantity.parse::<f64>() {
        return Ok(format!("{}m", (cores * 1000.0).round() as i64));
    }
    Ok(quantity.to_string())
}

/// Canonicalize a memory quantity to bytes
///
/// Suffixed quantities must have integer prefixes (`1.5Gi` is rejected the
/// way the api server rejects it). The `m` suffix is millibytes, which
/// openshift uses to represent fractional byte quantities; those come out
/// as plain decimals.
pub fn canonical_memory(quantity: &str) -> Result<String> {
    for (suffix, multiplier) in MEMORY_SUFFIXES {
        if let Some(prefix) = strip_suffix(quantity, suffix) {
            let n = prefix
                .parse::<i128>()
                .map_err(|_| UErrKind::MalformedQuantity(quantity.to_string()))?;
            return Ok((n * multiplier).to_string());
        }
    }
    if let Some(prefix) = strip_suffix(quantity, "m") {
        let n = prefix
            .parse::<i128>()
            .map_err(|_| UErrKind::MalformedQuantity(quantity.to_string()))?;
        if n % 1000 == 0 {
            return Ok((n / 1000).to_string());
        }
        return Ok(format!("{}", n as f64 / 1000.0));
    }
    if let Ok(n) = quantity.parse::<i128>() {
        return Ok(n.to_string());
    }
    if let Ok(f) = quantity.parse::<f64>() {
        return Ok(format!("{}", f));
    }
    Ok(quantity.to_string())
}

// str::strip_suffix is not in our msrv yet
fn strip_suffix<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.ends_with(suffix) {
        Some(&s[..s.len() - suffix.len()])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{canonical_cpu, canonical_memory};

    #[test]
    fn cpu_canonical_forms() {
        assert_eq!(canonical_cpu("500m").unwrap(), "500m");
        assert_eq!(canonical_cpu("2").unwrap(), "2000m");
        assert_eq!(canonical_cpu("0.5").unwrap(), "500m");
        assert_eq!(canonical_cpu("1.5").unwrap(), "1500m");
        // non-numeric values compare as themselves
        assert_eq!(canonical_cpu("lots").unwrap(), "lots");
    }

    #[test]
    fn memory_canonical_forms() {
        assert_eq!(canonical_memory("1Gi").unwrap(), "1073741824");
        assert_eq!(canonical_memory("2G").unwrap(), "2000000000");
        assert_eq!(canonical_memory("512Ki").unwrap(), "524288");
        assert_eq!(canonical_memory("300Mi").unwrap(), "314572800");
        assert_eq!(canonical_memory("5k").unwrap(), "5000");
        assert_eq!(canonical_memory("5M").unwrap(), "5000000");
        assert_eq!(canonical_memory("1073741824").unwrap(), "1073741824");
    }

    #[test]
    fn memory_millibytes() {
        assert_eq!(canonical_memory("100m").unwrap(), "0.1");
        assert_eq!(canonical_memory("1500m").unwrap(), "1.5");
        assert_eq!(canonical_memory("2000m").unwrap(), "2");
    }

    #[test]
    fn memory_rejects_fractional_prefixes() {
        assert!(canonical_memory("1.5Gi").is_err());
        assert!(canonical_memory("xGi").is_err());
        assert!(canonical_memory("0.5m").is_err());
    }
}
