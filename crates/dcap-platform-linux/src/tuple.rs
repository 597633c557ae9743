//! Loosely typed values from ScreenCast stream property dictionaries.
//!
//! Portal implementations disagree on how `size` and `position` are encoded:
//! some send a D-Bus struct `(ii)`, some an `ai` array, a few send 64-bit or
//! unsigned members. Everything funnels through [`try_parse_tuple2`].

/// A value taken from a stream's `a{sv}` property map.
#[derive(Debug, Clone, PartialEq)]
pub enum PortalValue {
    I32(i32),
    I64(i64),
    U32(u32),
    F64(f64),
    Str(String),
    TupleI32(i32, i32),
    TupleI64(i64, i64),
    /// D-Bus struct with heterogeneous members.
    Struct(Vec<PortalValue>),
    /// D-Bus array.
    Array(Vec<PortalValue>),
}

/// Coerce a scalar to `i32`. Wider integers are truncated, floats drop their
/// fractional part.
pub fn try_convert_to_int(value: &PortalValue) -> Option<i32> {
    match *value {
        PortalValue::I32(v) => Some(v),
        PortalValue::I64(v) => Some(v as i32),
        PortalValue::U32(v) => Some(v as i32),
        PortalValue::F64(v) => Some(v.trunc() as i32),
        _ => None,
    }
}

/// Read an `(x, y)` or `(width, height)` pair.
///
/// Sequences longer than two use their first two members.
pub fn try_parse_tuple2(value: &PortalValue) -> Option<(i32, i32)> {
    match value {
        PortalValue::TupleI32(a, b) => Some((*a, *b)),
        PortalValue::TupleI64(a, b) => Some((*a as i32, *b as i32)),
        PortalValue::Struct(items) | PortalValue::Array(items) if items.len() >= 2 => {
            Some((try_convert_to_int(&items[0])?, try_convert_to_int(&items[1])?))
        }
        _ => None,
    }
}

/// `"x,y"` for a parseable pair, empty otherwise. Used in change snapshots.
pub fn format_tuple2(value: Option<&PortalValue>) -> String {
    value
        .and_then(try_parse_tuple2)
        .map(|(a, b)| format!("{a},{b}"))
        .unwrap_or_default()
}
