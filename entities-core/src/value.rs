//! Helpers over raw value and name bytes.
//!
//! Values are kept exactly as written (strings keep their quotes). These
//! functions interpret them on demand.

/// Strip one pair of surrounding double quotes, if present.
#[inline]
pub fn unquote(bytes: &[u8]) -> &[u8] {
    match bytes {
        [b'"', inner @ .., b'"'] => inner,
        _ => bytes,
    }
}

/// Index of a list item name: `item[12]` → `Some(12)`.
pub fn list_index(name: &[u8]) -> Option<usize> {
    let digits = name.strip_prefix(b"item[")?.strip_suffix(b"]")?;
    parse_digits(digits)
}

/// Name of the list item at `index`.
pub fn list_item_name(index: usize) -> Vec<u8> {
    format!("item[{index}]").into_bytes()
}

/// Integer value of a number token, or 0 when it is not one.
///
/// Coercions in the core are permissive: a value that cannot be read as a
/// number counts as zero.
pub fn int_or_zero(bytes: &[u8]) -> i64 {
    let (negative, rest) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, bytes),
    };
    match parse_digits(rest).and_then(|v| i64::try_from(v).ok()) {
        Some(v) if negative => -v,
        Some(v) => v,
        None => 0,
    }
}

fn parse_digits(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: usize = 0;
    for &b in bytes {
        match b {
            b'0'..=b'9' => {
                result = result.checked_mul(10)?.checked_add((b - b'0') as usize)?;
            }
            _ => return None,
        }
    }
    Some(result)
}
