//! Owns one table's indexes and extractor callbacks, and reacts to ingest
//! callbacks fired by the [`crate::Router`]. Mirrors the teacher's `Table`,
//! which owns its `BTreeIndex` map and drives key extraction on insert.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use framedb_index::{Index, IndexEntry};
use framedb_log::FileId;
use framedb_primitives::{TableDef, Value};

use crate::tombstone::TombstoneSet;
use crate::Result;

/// Writes one extracted value into the SQL engine's result slot. Implemented
/// by `framedb-query` for whatever cell type the embedded engine expects;
/// kept engine-agnostic here so `framedb-store` has no dependency on it.
pub trait ResultSink {
    fn write(&mut self, value: &Value);
}

pub type FieldExtractor = Arc<dyn Fn(&[u8], u32, &str) -> Value + Send + Sync>;
pub type FastFieldExtractor = Arc<dyn Fn(&[u8], u32, usize, &mut dyn ResultSink) -> bool + Send + Sync>;
pub type BatchExtractor = Arc<dyn Fn(&[u8], u32, &mut Vec<Value>) + Send + Sync>;

/// A fully materialized record: its sequence, log offset, and an owned copy
/// of its body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRow {
    pub sequence: u64,
    pub offset: u64,
    pub body: Vec<u8>,
}

pub struct TableStore {
    def: TableDef,
    file_id: Option<FileId>,
    indexes: HashMap<String, Index>,
    record_infos: Vec<(u64, u64)>, // (offset, sequence), insertion order
    sequences: HashSet<u64>,
    tombstones: TombstoneSet,
    field_extractor: Option<FieldExtractor>,
    fast_field_extractor: Option<FastFieldExtractor>,
    batch_extractor: Option<BatchExtractor>,
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("name", &self.def.name)
            .field("file_id", &self.file_id)
            .field("records", &self.record_infos.len())
            .field("has_field_extractor", &self.field_extractor.is_some())
            .finish()
    }
}

impl TableStore {
    /// Creates one [`Index`] for every column marked `indexed` or
    /// `primary_key`.
    pub fn new(def: TableDef) -> Self {
        let mut indexes = HashMap::new();
        for col in def.indexed_columns() {
            indexes.insert(col.name.clone(), Index::new());
        }
        Self {
            def,
            file_id: None,
            indexes,
            record_infos: Vec::new(),
            sequences: HashSet::new(),
            tombstones: TombstoneSet::new(),
            field_extractor: None,
            fast_field_extractor: None,
            batch_extractor: None,
        }
    }

    /// Clones this table's definition and extractors (cheaply, via `Arc`)
    /// into a fresh sibling store for a registered source, renamed `T@S`.
    pub fn clone_as_sibling(&self, sibling_name: impl Into<String>) -> Self {
        let mut def = self.def.clone();
        def.name = sibling_name.into();
        let mut indexes = HashMap::new();
        for col in def.indexed_columns() {
            indexes.insert(col.name.clone(), Index::new());
        }
        Self {
            def,
            file_id: self.file_id,
            indexes,
            record_infos: Vec::new(),
            sequences: HashSet::new(),
            tombstones: TombstoneSet::new(),
            field_extractor: self.field_extractor.clone(),
            fast_field_extractor: self.fast_field_extractor.clone(),
            batch_extractor: self.batch_extractor.clone(),
        }
    }

    pub fn def(&self) -> &TableDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn file_id(&self) -> Option<FileId> {
        self.file_id
    }

    pub fn set_file_id(&mut self, file_id: FileId) {
        self.file_id = Some(file_id);
    }

    pub fn set_field_extractor(&mut self, extractor: FieldExtractor) {
        self.field_extractor = Some(extractor);
    }

    pub fn set_fast_field_extractor(&mut self, extractor: FastFieldExtractor) {
        self.fast_field_extractor = Some(extractor);
    }

    pub fn set_batch_extractor(&mut self, extractor: BatchExtractor) {
        self.batch_extractor = Some(extractor);
    }

    pub fn has_field_extractor(&self) -> bool {
        self.field_extractor.is_some()
    }

    pub fn record_count(&self) -> usize {
        self.record_infos.len()
    }

    /// Drops all records, index entries and tombstones, leaving the table's
    /// definition and extractors untouched. Used by `load_and_rebuild` to
    /// reset before replaying the log from offset 0.
    pub fn reset(&mut self) {
        self.record_infos.clear();
        self.sequences.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
        self.tombstones.clear();
    }

    /// Reacts to one ingested record: remembers its position and, if a field
    /// extractor is set, indexes every indexed column. Without an extractor
    /// indexing is a silent no-op — indexed queries simply return nothing
    /// for this table, which is not treated as an error.
    #[tracing::instrument(level = "trace", skip(self, body))]
    pub fn on_ingest(&mut self, body: &[u8], sequence: u64, offset: u64) -> Result<()> {
        self.record_infos.push((offset, sequence));
        self.sequences.insert(sequence);
        let Some(extractor) = &self.field_extractor else {
            return Ok(());
        };
        for col in self.def.indexed_columns() {
            let key = extractor(body, body.len() as u32, &col.name);
            let index = self.indexes.get_mut(&col.name).expect("index created for every indexed column");
            index.insert(key, offset, body.len() as u32, sequence)?;
        }
        Ok(())
    }

    fn index_for(&self, column: &str) -> Result<&Index> {
        self.indexes
            .get(column)
            .ok_or_else(|| crate::Error::UnknownColumn(column.to_string(), self.def.name.clone()))
    }

    /// At most a single entry (fast path, no data copy), with any tombstoned
    /// sequence already filtered out.
    pub fn find_by_index(&self, column: &str, value: &Value) -> Result<Option<IndexEntry>> {
        let entry = self.index_for(column)?.search_first(value);
        Ok(entry.filter(|e| !self.tombstones.is_deleted(e.sequence)))
    }

    /// Every entry with an exactly equal key, tombstoned sequences removed.
    pub fn search_index(&self, column: &str, value: &Value) -> Result<Vec<IndexEntry>> {
        let hits = self.index_for(column)?.search(value);
        Ok(hits.into_iter().filter(|e| !self.tombstones.is_deleted(e.sequence)).collect())
    }

    /// Inclusive range over an indexed column, tombstoned sequences removed.
    pub fn range_index(&self, column: &str, min: &Value, max: &Value) -> Result<Vec<IndexEntry>> {
        let hits = self.index_for(column)?.range(min, max);
        Ok(hits.into_iter().filter(|e| !self.tombstones.is_deleted(e.sequence)).collect())
    }

    /// Every entry for an indexed column, in key order, tombstoned sequences
    /// removed. Used when a scan has only a one-sided bound (e.g. `WHERE c >=
    /// ?` with no upper bound): the inclusive `range(min, max)` primitive
    /// can't express an open end, so the cursor materializes the full column
    /// and leans on SQLite's own re-check (constraints are never marked
    /// omit) to drop the rows outside the bound.
    pub fn all_index(&self, column: &str) -> Result<Vec<IndexEntry>> {
        let hits = self.index_for(column)?.all();
        Ok(hits.into_iter().filter(|e| !self.tombstones.is_deleted(e.sequence)).collect())
    }

    pub fn record_infos(&self) -> &[(u64, u64)] {
        &self.record_infos
    }

    pub fn is_visible(&self, sequence: u64) -> bool {
        !self.tombstones.is_deleted(sequence)
    }

    /// Whether `sequence` was ingested into *this* table (as opposed to a
    /// sibling table sharing the same file_id). Used by the rowid-lookup
    /// scan strategy to reject a sequence that belongs to another table.
    pub fn has_sequence(&self, sequence: u64) -> bool {
        self.sequences.contains(&sequence)
    }

    pub fn mark_deleted(&mut self, sequence: u64) {
        self.tombstones.mark_deleted(sequence);
    }

    pub fn deleted_count(&self) -> usize {
        self.tombstones.deleted_count()
    }

    pub fn clear_tombstones(&mut self) {
        self.tombstones.clear();
    }

    pub fn field_extractor(&self) -> Option<&FieldExtractor> {
        self.field_extractor.as_ref()
    }

    pub fn fast_field_extractor(&self) -> Option<&FastFieldExtractor> {
        self.fast_field_extractor.as_ref()
    }

    pub fn batch_extractor(&self) -> Option<&BatchExtractor> {
        self.batch_extractor.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framedb_primitives::ColumnDef;
    use framedb_primitives::ValueType;

    fn users_def() -> TableDef {
        TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ValueType::I64).primary_key(),
                ColumnDef::new("email", ValueType::String).indexed(),
            ],
        )
        .unwrap()
    }

    fn extractor() -> FieldExtractor {
        Arc::new(|body: &[u8], _len: u32, column: &str| match column {
            "id" => Value::I64(body[0] as i64),
            "email" => Value::String(format!("user{}@x", body[0])),
            _ => Value::Null,
        })
    }

    #[test]
    fn on_ingest_without_extractor_leaves_indexes_empty() {
        let mut store = TableStore::new(users_def());
        store.on_ingest(&[1, 2, 3], 1, 0).unwrap();
        assert_eq!(store.record_count(), 1);
        assert!(store.find_by_index("id", &Value::I64(1)).unwrap().is_none());
    }

    #[test]
    fn on_ingest_with_extractor_populates_every_indexed_column() {
        let mut store = TableStore::new(users_def());
        store.set_field_extractor(extractor());
        store.on_ingest(&[7], 1, 100).unwrap();

        let by_id = store.find_by_index("id", &Value::I64(7)).unwrap().unwrap();
        assert_eq!(by_id.sequence, 1);
        let by_email = store.find_by_index("email", &Value::String("user7@x".into())).unwrap().unwrap();
        assert_eq!(by_email.sequence, 1);
    }

    #[test]
    fn tombstoned_sequence_is_hidden_from_index_lookup() {
        let mut store = TableStore::new(users_def());
        store.set_field_extractor(extractor());
        store.on_ingest(&[7], 1, 0).unwrap();
        store.mark_deleted(1);
        assert!(store.find_by_index("id", &Value::I64(7)).unwrap().is_none());
        store.clear_tombstones();
        assert!(store.find_by_index("id", &Value::I64(7)).unwrap().is_some());
    }

    #[test]
    fn unknown_column_is_reported() {
        let store = TableStore::new(users_def());
        let err = store.find_by_index("nonexistent", &Value::I64(1)).unwrap_err();
        assert!(matches!(err, crate::Error::UnknownColumn(_, _)));
    }

    #[test]
    fn clone_as_sibling_shares_extractor_but_not_data() {
        let mut base = TableStore::new(users_def());
        base.set_field_extractor(extractor());
        base.on_ingest(&[1], 1, 0).unwrap();

        let sibling = base.clone_as_sibling("users@siteA");
        assert_eq!(sibling.name(), "users@siteA");
        assert_eq!(sibling.record_count(), 0);
        assert!(sibling.has_field_extractor());
    }
}
