//! The shape of one registered SQL relation: a real table's columns plus the
//! four virtual columns every relation in this bridge carries.

use framedb_primitives::{TableDef, ValueType};

/// Virtual columns appended after a [`TableDef`]'s real columns, in this
/// fixed order, on every relation the bridge registers.
pub const VIRTUAL_COLUMNS: [(&str, &str); 4] =
    [("_source", "TEXT"), ("_rowid", "INTEGER"), ("_offset", "INTEGER"), ("_data", "BLOB")];

/// One relation as exposed to SQLite: which [`framedb_store`] table backs it
/// (`lookup_name`, e.g. `"users"` or `"users@siteA"`), and the literal value
/// its `_source` column reports (`None` for a table that was never part of a
/// multi-source registration).
#[derive(Clone, Debug)]
pub struct RelationView {
    pub lookup_name: String,
    pub source_label: Option<String>,
    pub def: TableDef,
}

impl RelationView {
    pub fn new(lookup_name: impl Into<String>, source_label: Option<String>, def: TableDef) -> Self {
        Self { lookup_name: lookup_name.into(), source_label, def }
    }

    pub fn real_column_count(&self) -> usize {
        self.def.columns.len()
    }

    pub fn source_column_index(&self) -> usize {
        self.real_column_count()
    }

    pub fn rowid_column_index(&self) -> usize {
        self.real_column_count() + 1
    }

    pub fn offset_column_index(&self) -> usize {
        self.real_column_count() + 2
    }

    pub fn data_column_index(&self) -> usize {
        self.real_column_count() + 3
    }

    pub fn total_column_count(&self) -> usize {
        self.real_column_count() + VIRTUAL_COLUMNS.len()
    }

    /// `CREATE TABLE`-shaped DDL handed to `sqlite3_declare_vtab`.
    pub fn declare_sql(&self) -> String {
        let mut cols = Vec::with_capacity(self.total_column_count());
        for col in &self.def.columns {
            cols.push(format!("\"{}\" {}", col.name, sqlite_type_name(col.ty)));
        }
        for (name, ty) in VIRTUAL_COLUMNS {
            cols.push(format!("\"{name}\" {ty}"));
        }
        format!("CREATE TABLE x({})", cols.join(", "))
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        if index < self.real_column_count() {
            self.def.columns.get(index).map(|c| c.name.as_str())
        } else {
            VIRTUAL_COLUMNS.get(index - self.real_column_count()).map(|(n, _)| *n)
        }
    }
}

fn sqlite_type_name(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Null => "NULL",
        ValueType::Bool | ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::I64 => "INTEGER",
        ValueType::U8 | ValueType::U16 | ValueType::U32 | ValueType::U64 => "INTEGER",
        ValueType::F32 | ValueType::F64 => "REAL",
        ValueType::String => "TEXT",
        ValueType::Bytes => "BLOB",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framedb_primitives::ColumnDef;

    #[test]
    fn virtual_columns_follow_real_columns() {
        let def = TableDef::new(
            "users",
            vec![ColumnDef::new("id", ValueType::I64).primary_key(), ColumnDef::new("email", ValueType::String)],
        )
        .unwrap();
        let relation = RelationView::new("users", None, def);
        assert_eq!(relation.source_column_index(), 2);
        assert_eq!(relation.rowid_column_index(), 3);
        assert_eq!(relation.offset_column_index(), 4);
        assert_eq!(relation.data_column_index(), 5);
        assert_eq!(relation.total_column_count(), 6);
        assert_eq!(relation.column_name(3), Some("_rowid"));
    }
}
