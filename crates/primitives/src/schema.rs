use std::collections::HashSet;

use thiserror::Error;

use crate::{Value, ValueType};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("column `{0}` is marked primary_key but not indexed; primary_key implies indexed")]
    PrimaryKeyNotIndexed(String),
    #[error("duplicate column name `{0}` in table `{1}`")]
    DuplicateColumn(String, String),
    #[error("duplicate table name `{0}` in schema `{1}`")]
    DuplicateTable(String, String),
    #[error("default value for column `{0}` has type `{1}` but column type is `{2}`")]
    DefaultTypeMismatch(String, ValueType, ValueType),
}

/// One column of a [`TableDef`].
///
/// `primary_key` implies `indexed` and implies uniqueness of the column's
/// values; `indexed` alone permits duplicates. Enforced by
/// [`ColumnDef::new`], not left to callers to get right.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ValueType,
    pub nullable: bool,
    pub indexed: bool,
    pub primary_key: bool,
    pub encrypted_field_id: Option<u32>,
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            indexed: false,
            primary_key: false,
            encrypted_field_id: None,
            default: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.indexed = true;
        self
    }

    pub fn encrypted(mut self, field_id: u32) -> Self {
        self.encrypted_field_id = Some(field_id);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// `true` if this column's index must reject duplicate keys.
    pub fn is_unique(&self) -> bool {
        self.primary_key
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.primary_key && !self.indexed {
            // Unreachable via the builder, but defends against manual construction.
            return Err(SchemaError::PrimaryKeyNotIndexed(self.name.clone()));
        }
        if let Some(default) = &self.default {
            if !default.is_null() && default.value_type() != self.ty {
                return Err(SchemaError::DefaultTypeMismatch(
                    self.name.clone(),
                    default.value_type(),
                    self.ty,
                ));
            }
        }
        Ok(())
    }
}

/// A table's shape: ordered columns plus the subset that forms its primary
/// key. Column lookup by name is O(#columns) and case-sensitive, matching
/// spec.md's contract.
#[derive(Clone, Debug, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key_columns: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Result<Self, SchemaError> {
        let name = name.into();
        let mut seen = HashSet::with_capacity(columns.len());
        for col in &columns {
            col.validate()?;
            if !seen.insert(col.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(col.name.clone(), name));
            }
        }
        let primary_key_columns = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        Ok(Self {
            name,
            columns,
            primary_key_columns,
        })
    }

    /// O(#columns) lookup by exact (case-sensitive) name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn indexed_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.indexed)
    }
}

/// A named set of [`TableDef`]s; table names are unique within a schema.
#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseSchema {
    pub name: String,
    pub tables: Vec<TableDef>,
}

impl DatabaseSchema {
    pub fn new(name: impl Into<String>, tables: Vec<TableDef>) -> Result<Self, SchemaError> {
        let name = name.into();
        let mut seen = HashSet::with_capacity(tables.len());
        for table in &tables {
            if !seen.insert(table.name.as_str()) {
                return Err(SchemaError::DuplicateTable(table.name.clone(), name));
            }
        }
        Ok(Self { name, tables })
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> TableDef {
        TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ValueType::I64).primary_key(),
                ColumnDef::new("email", ValueType::String).indexed(),
                ColumnDef::new("age", ValueType::I64),
            ],
        )
        .unwrap()
    }

    #[test]
    fn primary_key_implies_indexed_and_unique() {
        let table = users_table();
        let id = table.column("id").unwrap();
        assert!(id.indexed);
        assert!(id.is_unique());
    }

    #[test]
    fn duplicate_column_names_rejected() {
        let err = TableDef::new(
            "t",
            vec![ColumnDef::new("a", ValueType::I64), ColumnDef::new("a", ValueType::I64)],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateColumn("a".into(), "t".into()));
    }

    #[test]
    fn duplicate_table_names_rejected() {
        let err = DatabaseSchema::new("db", vec![users_table(), users_table()]).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateTable("users".into(), "db".into()));
    }

    #[test]
    fn column_lookup_is_case_sensitive() {
        let table = users_table();
        assert!(table.column("Email").is_none());
        assert!(table.column("email").is_some());
    }
}
