//! Shared scalar, column and schema types used across the `framedb` workspace.
//!
//! Nothing in this crate touches bytes on the wire or owns any storage; it is
//! the vocabulary the rest of the workspace is built from, the same role
//! `spacetimedb-primitives`/`spacetimedb-sats` play for `spacetimedb-core`.

use std::cmp::Ordering;
use std::fmt;

mod schema;

pub use schema::{ColumnDef, DatabaseSchema, SchemaError, TableDef};

/// The scalar type of a [`Value`], independent of any particular instance.
///
/// Mirrors the tag order used for cross-type comparison in [`Value::cmp`]:
/// `Null < Bool < I8 < I16 < I32 < I64 < U8 < U16 < U32 < U64 < F32 < F64 <
/// String < Bytes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Bytes,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::U8 => "u8",
            ValueType::U16 => "u16",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
        };
        f.write_str(s)
    }
}

/// A tagged scalar value.
///
/// `Value` defines a total order (see [`Value::cmp`]) so it can be used
/// directly as a `BTreeSet`/`BTreeMap` key in `framedb-index`. Floats order
/// by [`f32::total_cmp`]/[`f64::total_cmp`], which gives NaN a well-defined
/// (if otherwise meaningless) position; `framedb-index` is the layer that
/// rejects NaN keys outright, per the index's own contract, not this type.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::I8(_) => ValueType::I8,
            Value::I16(_) => ValueType::I16,
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::U8(_) => ValueType::U8,
            Value::U16(_) => ValueType::U16,
            Value::U32(_) => ValueType::U32,
            Value::U64(_) => ValueType::U64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `true` if this value is a float and holds NaN; `framedb-index` rejects
    /// such values on insert.
    pub fn is_nan(&self) -> bool {
        match self {
            Value::F32(f) => f.is_nan(),
            Value::F64(f) => f.is_nan(),
            _ => false,
        }
    }

    fn tag_index(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::I8(_) => 2,
            Value::I16(_) => 3,
            Value::I32(_) => 4,
            Value::I64(_) => 5,
            Value::U8(_) => 6,
            Value::U16(_) => 7,
            Value::U32(_) => 8,
            Value::U64(_) => 9,
            Value::F32(_) => 10,
            Value::F64(_) => 11,
            Value::String(_) => 12,
            Value::Bytes(_) => 13,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    /// Total order: null compares equal only to null; cross-tag comparison
    /// orders by [`Value::tag_index`]; same-tag values compare by payload.
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (I8(a), I8(b)) => a.cmp(b),
            (I16(a), I16(b)) => a.cmp(b),
            (I32(a), I32(b)) => a.cmp(b),
            (I64(a), I64(b)) => a.cmp(b),
            (U8(a), U8(b)) => a.cmp(b),
            (U16(a), U16(b)) => a.cmp(b),
            (U32(a), U32(b)) => a.cmp(b),
            (U64(a), U64(b)) => a.cmp(b),
            (F32(a), F32(b)) => a.total_cmp(b),
            (F64(a), F64(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            _ => self.tag_index().cmp(&other.tag_index()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "0x{}", hex_encode(b)),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_compares_equal_only_to_null() {
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Null, Value::Bool(false));
        assert!(Value::Null < Value::Bool(false));
    }

    #[test]
    fn cross_tag_orders_by_tag_index() {
        assert!(Value::Bool(true) < Value::I8(-100));
        assert!(Value::I64(i64::MAX) < Value::U8(0));
        assert!(Value::F64(0.0) < Value::String(String::new()));
        assert!(Value::String("z".into()) < Value::Bytes(vec![]));
    }

    #[test]
    fn same_tag_orders_by_payload() {
        assert!(Value::I32(1) < Value::I32(2));
        assert!(Value::String("a".into()) < Value::String("b".into()));
        assert!(Value::Bytes(vec![1]) < Value::Bytes(vec![1, 0]));
    }

    #[test]
    fn nan_is_detected_but_still_orders_totally() {
        let nan = Value::F64(f64::NAN);
        assert!(nan.is_nan());
        // total_cmp gives NaN a deterministic (if arbitrary) slot; it must
        // not panic, even though framedb-index refuses to store it.
        let _ = nan.cmp(&Value::F64(1.0));
    }
}
