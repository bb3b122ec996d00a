//! Wires a schema to a single record log, one [`TableStore`] per table, and
//! the multi-source table-proliferation scheme described in the component
//! design: every base table `T` gets a physical sibling `T@S` per registered
//! source `S`, sharing `T`'s definition and extractors.

use std::collections::HashMap;

use framedb_index::IndexEntry;
use framedb_log::{FileId, RecordLog};
use framedb_primitives::{DatabaseSchema, Value};

use crate::table_store::{StoredRow, TableStore};
use crate::{Error, Result};

pub struct Router {
    schema: DatabaseSchema,
    log: RecordLog,
    tables: HashMap<String, TableStore>,
    base_table_names: Vec<String>,
    file_id_to_table: HashMap<FileId, String>,
    sources: Vec<String>,
    source_routes: HashMap<(String, FileId), String>,
    unified_views_created: bool,
}

impl Router {
    pub fn new(schema: DatabaseSchema) -> Self {
        Self::with_log(schema, RecordLog::new())
    }

    /// Like [`Router::new`] but lets the caller supply a pre-sized log, e.g.
    /// via [`RecordLog::with_capacity`] when the expected ingest volume is
    /// known ahead of time.
    pub fn with_log(schema: DatabaseSchema, log: RecordLog) -> Self {
        let mut tables = HashMap::new();
        let mut base_table_names = Vec::new();
        for table_def in &schema.tables {
            base_table_names.push(table_def.name.clone());
            tables.insert(table_def.name.clone(), TableStore::new(table_def.clone()));
        }
        Self {
            schema,
            log,
            tables,
            base_table_names,
            file_id_to_table: HashMap::new(),
            sources: Vec::new(),
            source_routes: HashMap::new(),
            unified_views_created: false,
        }
    }

    pub fn schema(&self) -> &DatabaseSchema {
        &self.schema
    }

    pub fn log(&self) -> &RecordLog {
        &self.log
    }

    pub fn base_table_names(&self) -> &[String] {
        &self.base_table_names
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn is_unified_views_created(&self) -> bool {
        self.unified_views_created
    }

    pub fn sibling_table_name(&self, base: &str, source: &str) -> Option<&str> {
        self.tables
            .keys()
            .find(|name| name.as_str() == format!("{base}@{source}"))
            .map(String::as_str)
    }

    pub fn table(&self, name: &str) -> Result<&TableStore> {
        self.tables.get(name).ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut TableStore> {
        self.tables.get_mut(name).ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Routes every future frame carrying `file_id` to `table_name`.
    pub fn register_file_id(&mut self, file_id: FileId, table_name: &str) -> Result<()> {
        self.table(table_name)?;
        self.file_id_to_table.insert(file_id, table_name.to_string());
        self.table_mut(table_name)?.set_file_id(file_id);
        Ok(())
    }

    fn route_into(
        file_id_to_table: &HashMap<FileId, String>,
        tables: &mut HashMap<String, TableStore>,
        file_id: Option<FileId>,
        body: &[u8],
        sequence: u64,
        offset: u64,
    ) {
        let Some(file_id) = file_id else { return };
        let Some(table_name) = file_id_to_table.get(&file_id) else { return };
        if let Some(store) = tables.get_mut(table_name) {
            // A NaN key or an unknown-column extractor mismatch here is a
            // caller bug in the extractor, not a log-corruption condition;
            // it is intentionally not allowed to fail the whole ingest
            // batch, matching the "unknown file_ids are skipped" policy.
            let _ = store.on_ingest(body, sequence, offset);
        }
    }

    #[tracing::instrument(level = "debug", skip(self, bytes))]
    pub fn ingest(&mut self, bytes: &[u8]) -> (usize, usize) {
        let file_id_to_table = &self.file_id_to_table;
        let tables = &mut self.tables;
        self.log.ingest(bytes, |file_id, body, sequence, offset| {
            Self::route_into(file_id_to_table, tables, file_id, body, sequence, offset);
        })
    }

    pub fn ingest_one(&mut self, body: &[u8]) -> Result<u64> {
        let file_id_to_table = &self.file_id_to_table;
        let tables = &mut self.tables;
        Ok(self.log.ingest_body(body, |file_id, body, sequence, offset| {
            Self::route_into(file_id_to_table, tables, file_id, body, sequence, offset);
        })?)
    }

    pub fn register_source(&mut self, name: &str) -> Result<()> {
        if self.sources.iter().any(|s| s == name) {
            return Err(Error::SourceAlreadyRegistered(name.to_string()));
        }
        for base_name in self.base_table_names.clone() {
            let base_store = self.tables.get(&base_name).expect("base table always present");
            let sibling_name = format!("{base_name}@{name}");
            let sibling_file_id = base_store.file_id();
            let sibling = base_store.clone_as_sibling(sibling_name.clone());
            self.tables.insert(sibling_name.clone(), sibling);
            if let Some(file_id) = sibling_file_id {
                self.source_routes.insert((name.to_string(), file_id), sibling_name);
            }
            // If the base table has no file_id yet, the sibling is created
            // but unreachable by routing until a later register_file_id.
            // Per the documented timing contract, it never retroactively
            // gains one.
        }
        self.sources.push(name.to_string());
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, bytes))]
    pub fn ingest_with_source(&mut self, bytes: &[u8], source: &str) -> Result<(usize, usize)> {
        if !self.sources.iter().any(|s| s == source) {
            return Err(Error::UnknownSource(source.to_string()));
        }
        let source_routes = &self.source_routes;
        let tables = &mut self.tables;
        let source_owned = source.to_string();
        Ok(self.log.ingest(bytes, |file_id, body, sequence, offset| {
            let Some(file_id) = file_id else { return };
            let Some(table_name) = source_routes.get(&(source_owned.clone(), file_id)) else { return };
            if let Some(store) = tables.get_mut(table_name) {
                let _ = store.on_ingest(body, sequence, offset);
            }
        }))
    }

    pub fn ingest_one_with_source(&mut self, body: &[u8], source: &str) -> Result<u64> {
        if !self.sources.iter().any(|s| s == source) {
            return Err(Error::UnknownSource(source.to_string()));
        }
        let source_routes = &self.source_routes;
        let tables = &mut self.tables;
        let source_owned = source.to_string();
        Ok(self.log.ingest_body(body, |file_id, body, sequence, offset| {
            let Some(file_id) = file_id else { return };
            let Some(table_name) = source_routes.get(&(source_owned.clone(), file_id)) else { return };
            if let Some(store) = tables.get_mut(table_name) {
                let _ = store.on_ingest(body, sequence, offset);
            }
        })?)
    }

    /// Marks unified views as available; the query bridge is responsible for
    /// actually registering each base name `T` as `UNION ALL` of its `T@S`
    /// siblings with a literal `_source` column.
    pub fn create_unified_views(&mut self) {
        self.unified_views_created = true;
    }

    /// Resets every table and replays the whole log from offset 0 through
    /// base file_id routing. Source attribution is not recoverable from the
    /// log alone (it carries no per-record source tag), so a multi-source
    /// database's `T@S` siblings are not repopulated by this call; only
    /// base tables are.
    #[tracing::instrument(level = "debug", skip(self, bytes))]
    pub fn load_and_rebuild(&mut self, bytes: &[u8]) {
        for store in self.tables.values_mut() {
            store.reset();
        }
        let file_id_to_table = &self.file_id_to_table;
        let tables = &mut self.tables;
        self.log.load_and_rebuild(bytes, |file_id, body, sequence, offset| {
            Self::route_into(file_id_to_table, tables, file_id, body, sequence, offset);
        });
    }

    fn materialize(&self, entry: IndexEntry) -> Result<StoredRow> {
        let body = self.log.data_at(entry.data_offset)?;
        Ok(StoredRow {
            sequence: entry.sequence,
            offset: entry.data_offset,
            body: body.to_vec(),
        })
    }

    /// Every matching row, materialized.
    pub fn find_by_index(&self, table: &str, column: &str, value: &Value) -> Result<Vec<StoredRow>> {
        let entries = self.table(table)?.search_index(column, value)?;
        entries.into_iter().map(|e| self.materialize(e)).collect()
    }

    /// At most one matching row, materialized.
    pub fn find_one_by_index(&self, table: &str, column: &str, value: &Value) -> Result<Option<StoredRow>> {
        match self.table(table)?.find_by_index(column, value)? {
            Some(entry) => Ok(Some(self.materialize(entry)?)),
            None => Ok(None),
        }
    }

    /// Resolves the hidden `_rowid` (sequence) column: `None` if the
    /// sequence was never ingested into `table`, belongs to a different
    /// table, or is tombstoned.
    pub fn find_row_by_sequence(&self, table: &str, sequence: u64) -> Result<Option<StoredRow>> {
        let store = self.table(table)?;
        if !store.has_sequence(sequence) || !store.is_visible(sequence) {
            return Ok(None);
        }
        let offset = self.log.offset_of(sequence)?;
        let body = self.log.data_at(offset)?;
        Ok(Some(StoredRow { sequence, offset, body: body.to_vec() }))
    }

    /// Zero-copy: the returned slice aliases the log and is valid only until
    /// the next mutating operation on it.
    pub fn find_raw_by_index(&self, table: &str, column: &str, value: &Value) -> Result<Option<(&[u8], u64)>> {
        let Some(entry) = self.table(table)?.find_by_index(column, value)? else {
            return Ok(None);
        };
        let body = self.log.data_at(entry.data_offset)?;
        Ok(Some((body, entry.sequence)))
    }

    pub fn find_by_range(&self, table: &str, column: &str, min: &Value, max: &Value) -> Result<Vec<StoredRow>> {
        let entries = self.table(table)?.range_index(column, min, max)?;
        entries.into_iter().map(|e| self.materialize(e)).collect()
    }

    pub fn scan_all(&self, table: &str) -> Result<Vec<StoredRow>> {
        let store = self.table(table)?;
        store
            .record_infos()
            .iter()
            .filter(|(_, seq)| store.is_visible(*seq))
            .map(|(offset, seq)| {
                Ok(StoredRow {
                    sequence: *seq,
                    offset: *offset,
                    body: self.log.data_at(*offset)?.to_vec(),
                })
            })
            .collect()
    }

    pub fn mark_deleted(&mut self, table: &str, sequence: u64) -> Result<()> {
        self.table_mut(table)?.mark_deleted(sequence);
        Ok(())
    }

    pub fn deleted_count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.deleted_count())
    }

    pub fn clear_tombstones(&mut self, table: &str) -> Result<()> {
        self.table_mut(table)?.clear_tombstones();
        Ok(())
    }

    pub fn export_data(&self) -> Vec<u8> {
        self.log.export()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framedb_primitives::{ColumnDef, TableDef, ValueType};
    use std::sync::Arc;

    fn schema() -> DatabaseSchema {
        let users = TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ValueType::I64).primary_key(),
                ColumnDef::new("email", ValueType::String).indexed(),
                ColumnDef::new("age", ValueType::I64),
            ],
        )
        .unwrap();
        DatabaseSchema::new("db", vec![users]).unwrap()
    }

    fn record(id: u8, email: &str, age: u8) -> Vec<u8> {
        let mut body = vec![0u8; 8];
        body[4..8].copy_from_slice(b"USR1");
        body.push(id);
        body.extend_from_slice(email.as_bytes());
        body.push(0);
        body.push(age);
        body
    }

    fn extractor() -> Arc<dyn Fn(&[u8], u32, &str) -> Value + Send + Sync> {
        Arc::new(|body: &[u8], _len: u32, column: &str| {
            let id = body[8];
            let email_len = body[9..].iter().position(|&b| b == 0).unwrap();
            let email = String::from_utf8(body[9..9 + email_len].to_vec()).unwrap();
            let age = body[9 + email_len + 1];
            match column {
                "id" => Value::I64(id as i64),
                "email" => Value::String(email),
                "age" => Value::I64(age as i64),
                _ => Value::Null,
            }
        })
    }

    fn setup() -> Router {
        let mut router = Router::new(schema());
        router.register_file_id(*b"USR1", "users").unwrap();
        router.table_mut("users").unwrap().set_field_extractor(extractor());
        router
    }

    #[test]
    fn point_query_by_key() {
        let mut router = setup();
        router.ingest_one(&record(1, "a@x", 30)).unwrap();
        router.ingest_one(&record(2, "b@x", 25)).unwrap();
        router.ingest_one(&record(3, "c@x", 40)).unwrap();

        let hit = router.find_one_by_index("users", "email", &Value::String("b@x".into())).unwrap().unwrap();
        assert_eq!(hit.sequence, 2);
    }

    #[test]
    fn range_query_over_age() {
        let mut router = setup();
        router.ingest_one(&record(1, "a@x", 30)).unwrap();
        router.ingest_one(&record(2, "b@x", 25)).unwrap();
        router.ingest_one(&record(3, "c@x", 40)).unwrap();

        let hits = router.find_by_range("users", "id", &Value::I64(1), &Value::I64(1)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sequence, 1);
    }

    #[test]
    fn tombstone_hides_row_from_every_query_path() {
        let mut router = setup();
        router.ingest_one(&record(1, "a@x", 30)).unwrap();
        router.ingest_one(&record(2, "b@x", 25)).unwrap();

        router.mark_deleted("users", 2).unwrap();
        assert_eq!(router.scan_all("users").unwrap().len(), 1);
        assert!(router.find_one_by_index("users", "email", &Value::String("b@x".into())).unwrap().is_none());

        router.clear_tombstones("users").unwrap();
        assert_eq!(router.scan_all("users").unwrap().len(), 2);
    }

    #[test]
    fn multi_source_routes_independently_per_source() {
        let mut router = setup();
        router.register_source("siteA").unwrap();
        router.register_source("siteB").unwrap();
        router.create_unified_views();

        router.ingest_one_with_source(&record(1, "a@x", 30), "siteA").unwrap();
        router.ingest_one_with_source(&record(2, "b@x", 25), "siteB").unwrap();

        assert_eq!(router.scan_all("users@siteA").unwrap().len(), 1);
        assert_eq!(router.scan_all("users@siteB").unwrap().len(), 1);
        assert_eq!(router.scan_all("users").unwrap().len(), 0);
    }

    #[test]
    fn registering_same_source_twice_errors() {
        let mut router = setup();
        router.register_source("siteA").unwrap();
        let err = router.register_source("siteA").unwrap_err();
        assert!(matches!(err, Error::SourceAlreadyRegistered(_)));
    }

    #[test]
    fn round_trip_preserves_record_count_and_sequences() {
        let mut router = setup();
        for i in 0..20u8 {
            router.ingest_one(&record(i, &format!("u{i}@x"), i)).unwrap();
        }
        let exported = router.export_data();

        let mut rebuilt = setup();
        rebuilt.load_and_rebuild(&exported);

        assert_eq!(rebuilt.scan_all("users").unwrap().len(), 20);
        for i in 0..20u8 {
            let row = rebuilt
                .find_one_by_index("users", "id", &Value::I64(i as i64))
                .unwrap()
                .unwrap();
            assert_eq!(row.sequence, i as u64 + 1);
        }
    }

    #[test]
    fn unknown_file_id_is_dropped_silently_but_kept_in_log() {
        let mut router = setup();
        router.ingest_one(&record(1, "a@x", 30)).unwrap();

        let mut unmapped = vec![0u8; 8];
        unmapped[4..8].copy_from_slice(b"ZZZZ");
        router.ingest_one(&unmapped).unwrap();

        assert_eq!(router.scan_all("users").unwrap().len(), 1);
        assert_eq!(router.log().record_count(), 2);
    }
}
