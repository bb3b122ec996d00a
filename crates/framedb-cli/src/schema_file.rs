//! A minimal schema file reader: just enough to build a [`DatabaseSchema`]
//! for standalone CLI use. This is a stand-in for the external schema IDL
//! parser named as a collaborator in the component design, not that parser
//! — a real deployment generates `framedb-primitives` types from its own
//! schema compiler and skips this module entirely.
//!
//! Format, line-oriented, `#` starts a comment:
//!
//! ```text
//! table users
//! column id I64 primary_key
//! column email String indexed
//! column age I64
//! ```

use anyhow::{bail, Context, Result};
use framedb_primitives::{ColumnDef, DatabaseSchema, TableDef, ValueType};

pub fn parse(text: &str) -> Result<DatabaseSchema> {
    let mut tables = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_columns: Vec<ColumnDef> = Vec::new();

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["table", name] => {
                if let Some(finished) = current_name.take() {
                    tables.push(build_table(finished, std::mem::take(&mut current_columns))?);
                }
                current_name = Some(name.to_string());
            }
            ["column", name, ty, rest @ ..] => {
                if current_name.is_none() {
                    bail!("line {}: `column` before any `table` directive", line_no + 1);
                }
                let value_type = parse_value_type(ty).with_context(|| format!("line {}", line_no + 1))?;
                let mut column = ColumnDef::new(*name, value_type);
                for flag in rest {
                    column = match *flag {
                        "primary_key" => column.primary_key(),
                        "indexed" => column.indexed(),
                        "not_null" => column.nullable(false),
                        other => bail!("line {}: unknown column flag `{other}`", line_no + 1),
                    };
                }
                current_columns.push(column);
            }
            other => bail!("line {}: malformed directive `{}`", line_no + 1, other.join(" ")),
        }
    }
    if let Some(finished) = current_name.take() {
        tables.push(build_table(finished, current_columns)?);
    }

    Ok(DatabaseSchema::new("framedb-cli", tables)?)
}

fn build_table(name: String, columns: Vec<ColumnDef>) -> Result<TableDef> {
    Ok(TableDef::new(name, columns)?)
}

fn parse_value_type(token: &str) -> Result<ValueType> {
    Ok(match token {
        "Null" => ValueType::Null,
        "Bool" => ValueType::Bool,
        "I8" => ValueType::I8,
        "I16" => ValueType::I16,
        "I32" => ValueType::I32,
        "I64" => ValueType::I64,
        "U8" => ValueType::U8,
        "U16" => ValueType::U16,
        "U32" => ValueType::U32,
        "U64" => ValueType::U64,
        "F32" => ValueType::F32,
        "F64" => ValueType::F64,
        "String" => ValueType::String,
        "Bytes" => ValueType::Bytes,
        other => bail!("unknown column type `{other}`"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_with_mixed_flags() {
        let schema = parse(
            "table users\n\
             column id I64 primary_key\n\
             column email String indexed\n\
             column age I64\n",
        )
        .unwrap();
        let table = schema.table("users").unwrap();
        assert!(table.column("id").unwrap().primary_key);
        assert!(table.column("email").unwrap().indexed);
        assert!(!table.column("age").unwrap().indexed);
    }

    #[test]
    fn parses_multiple_tables() {
        let schema = parse(
            "table users\n\
             column id I64 primary_key\n\
             table orders\n\
             column id I64 primary_key\n\
             column user_id I64 indexed\n",
        )
        .unwrap();
        assert!(schema.table("users").is_some());
        assert!(schema.table("orders").is_some());
    }

    #[test]
    fn rejects_column_before_table() {
        assert!(parse("column id I64\n").is_err());
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let schema = parse(
            "# a users table\n\
             table users\n\n\
             column id I64 primary_key # the primary key\n",
        )
        .unwrap();
        assert!(schema.table("users").is_some());
    }
}
