//! Conversions between [`framedb_primitives::Value`] and the types SQLite's
//! C API understands through `rusqlite`.

use framedb_primitives::Value;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::vtab::Context;
use rusqlite::Result as SqliteResult;

/// Writes a [`Value`] into a virtual-table column result.
pub fn write_result(ctx: &mut Context, value: &Value) -> SqliteResult<()> {
    match value {
        Value::Null => ctx.set_result(&rusqlite::types::Null),
        Value::Bool(b) => ctx.set_result(&(*b as i64)),
        Value::I8(v) => ctx.set_result(&(*v as i64)),
        Value::I16(v) => ctx.set_result(&(*v as i64)),
        Value::I32(v) => ctx.set_result(&(*v as i64)),
        Value::I64(v) => ctx.set_result(v),
        Value::U8(v) => ctx.set_result(&(*v as i64)),
        Value::U16(v) => ctx.set_result(&(*v as i64)),
        Value::U32(v) => ctx.set_result(&(*v as i64)),
        // SQLite has no unsigned 64-bit type; values above i64::MAX lose
        // their top bit on the round trip, a documented limitation shared
        // with every other SQLite-backed store.
        Value::U64(v) => ctx.set_result(&(*v as i64)),
        Value::F32(v) => ctx.set_result(&(*v as f64)),
        Value::F64(v) => ctx.set_result(v),
        Value::String(s) => ctx.set_result(s),
        Value::Bytes(b) => ctx.set_result(b),
    }
}

/// Converts a bound SQL parameter (from `Values`/`ValueRef`) into a [`Value`].
/// Used both for fast-path parameter binding and for constraint arguments
/// handed to `filter`.
pub fn from_value_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::I64(i),
        ValueRef::Real(f) => Value::F64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// The reverse conversion, used when a [`Value`] needs to be bound as a
/// parameter to an inner prepared statement (not currently needed by the
/// fast path, but kept alongside `from_value_ref` since the two always travel
/// together in the teacher's codecs).
pub fn to_sql_output(value: &Value) -> ToSqlOutput<'_> {
    match value {
        Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
        Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*b as i64)),
        Value::I8(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v as i64)),
        Value::I16(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v as i64)),
        Value::I32(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v as i64)),
        Value::I64(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v)),
        Value::U8(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v as i64)),
        Value::U16(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v as i64)),
        Value::U32(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v as i64)),
        Value::U64(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v as i64)),
        Value::F32(v) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*v as f64)),
        Value::F64(v) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*v)),
        Value::String(s) => ToSqlOutput::Owned(rusqlite::types::Value::Text(s.clone())),
        Value::Bytes(b) => ToSqlOutput::Owned(rusqlite::types::Value::Blob(b.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_ref_round_trips_through_to_sql_output() {
        let value = Value::String("hello".into());
        match to_sql_output(&value) {
            ToSqlOutput::Owned(rusqlite::types::Value::Text(s)) => assert_eq!(s, "hello"),
            other => panic!("unexpected conversion: {other:?}"),
        }
    }
}
