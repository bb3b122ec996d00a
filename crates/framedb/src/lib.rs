//! Wires the record log, table stores, multi-source router and query bridge
//! into one public `Database` facade — the single entry point spec.md names
//! as the surface external callers (and `framedb-cli`) use.

mod config;
mod error;

pub use config::Config;
pub use error::{Error, Result};

pub use framedb_log::FileId;
pub use framedb_primitives::{ColumnDef, DatabaseSchema, TableDef, Value, ValueType};
pub use framedb_query::{Decryptor, FastQuery, QueryResult};
pub use framedb_store::{BatchExtractor, FastFieldExtractor, FieldExtractor, StoredRow};

use std::cell::RefCell;
use std::rc::Rc;

use framedb_log::RecordLog;
use framedb_query::QueryBridge;
use framedb_store::Router;

/// An embedded, single-threaded query engine over an append-only binary
/// record log. `!Sync` by convention: its zero-copy reads and thread-local
/// fast-path caches are not safe to share across threads without external
/// synchronization, the same assumption the teacher documents rather than
/// enforcing with a wrapper type around its own single-writer log.
pub struct Database {
    router: Rc<RefCell<Router>>,
    bridge: QueryBridge,
}

impl Database {
    pub fn open(schema: DatabaseSchema) -> Result<Self> {
        Self::open_with_config(schema, Config::default())
    }

    #[tracing::instrument(skip_all)]
    pub fn open_with_config(schema: DatabaseSchema, config: Config) -> Result<Self> {
        let log = RecordLog::with_capacity(config.initial_log_capacity);
        let router = Rc::new(RefCell::new(Router::with_log(schema, log)));
        let bridge = QueryBridge::with_statement_cache_capacity(router.clone(), config.statement_cache_capacity)?;
        Ok(Self { router, bridge })
    }

    /// Installs a hook that decrypts one column's value given its schema
    /// `encrypted_field_id`. Encryption itself is out of scope (spec.md
    /// §1); this only wires the hook into the column-materialization path.
    pub fn set_decryptor(&mut self, decryptor: Decryptor) {
        self.bridge.set_decryptor(decryptor);
    }

    pub fn register_file_id(&mut self, file_id: FileId, table_name: &str) -> Result<()> {
        self.router.borrow_mut().register_file_id(file_id, table_name)?;
        Ok(())
    }

    pub fn ingest(&mut self, bytes: &[u8]) -> (usize, usize) {
        self.router.borrow_mut().ingest(bytes)
    }

    pub fn ingest_one(&mut self, body: &[u8]) -> Result<u64> {
        Ok(self.router.borrow_mut().ingest_one(body)?)
    }

    pub fn load_and_rebuild(&mut self, bytes: &[u8]) {
        self.router.borrow_mut().load_and_rebuild(bytes);
    }

    pub fn register_source(&mut self, name: &str) -> Result<()> {
        Ok(self.router.borrow_mut().register_source(name)?)
    }

    /// Marks every base table's `T@S` siblings ready to be exposed as a
    /// `UNION ALL` view; the view itself is created lazily the next time a
    /// query runs (`QueryBridge::sync_schema`).
    pub fn create_unified_views(&mut self) {
        self.router.borrow_mut().create_unified_views();
    }

    pub fn ingest_with_source(&mut self, bytes: &[u8], source: &str) -> Result<(usize, usize)> {
        Ok(self.router.borrow_mut().ingest_with_source(bytes, source)?)
    }

    pub fn ingest_one_with_source(&mut self, body: &[u8], source: &str) -> Result<u64> {
        Ok(self.router.borrow_mut().ingest_one_with_source(body, source)?)
    }

    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        Ok(self.bridge.query(sql, params)?)
    }

    pub fn query_count(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        Ok(self.bridge.query_count(sql, params)?)
    }

    /// Specialization of [`Database::query`] for a single `i64` parameter,
    /// the hottest bind shape (rowid/primary-key lookups) and so the one
    /// worth a dedicated entry point rather than making every caller build a
    /// one-element `&[Value]` slice.
    pub fn query_with_i64(&mut self, sql: &str, param: i64) -> Result<QueryResult> {
        self.query(sql, &[Value::I64(param)])
    }

    pub fn find_by_index(&self, table: &str, column: &str, value: &Value) -> Result<Vec<StoredRow>> {
        Ok(self.router.borrow().find_by_index(table, column, value)?)
    }

    pub fn find_one_by_index(&self, table: &str, column: &str, value: &Value) -> Result<Option<StoredRow>> {
        Ok(self.router.borrow().find_one_by_index(table, column, value)?)
    }

    /// Zero-copy variant of [`Database::find_one_by_index`]: `f` runs while
    /// the router's borrow is held, so it sees a slice that aliases the log
    /// directly rather than a materialized copy. The slice does not outlive
    /// the call — attempting to stash it would not compile, since the
    /// `Router` borrow backing it is scoped to this function.
    pub fn with_raw_by_index<R>(
        &self,
        table: &str,
        column: &str,
        value: &Value,
        f: impl FnOnce(Option<(&[u8], u64)>) -> R,
    ) -> Result<R> {
        let router = self.router.borrow();
        let hit = router.find_raw_by_index(table, column, value)?;
        Ok(f(hit))
    }

    pub fn find_by_range(&self, table: &str, column: &str, min: &Value, max: &Value) -> Result<Vec<StoredRow>> {
        Ok(self.router.borrow().find_by_range(table, column, min, max)?)
    }

    pub fn mark_deleted(&mut self, table: &str, sequence: u64) -> Result<()> {
        Ok(self.router.borrow_mut().mark_deleted(table, sequence)?)
    }

    pub fn deleted_count(&self, table: &str) -> Result<usize> {
        Ok(self.router.borrow().deleted_count(table)?)
    }

    pub fn clear_tombstones(&mut self, table: &str) -> Result<()> {
        Ok(self.router.borrow_mut().clear_tombstones(table)?)
    }

    pub fn export_data(&self) -> Vec<u8> {
        self.router.borrow().export_data()
    }

    /// Every base table name declared in the schema this database was
    /// opened with (not including `T@S` source siblings).
    pub fn table_names(&self) -> Vec<String> {
        self.router.borrow().base_table_names().to_vec()
    }

    pub fn record_count(&self, table: &str) -> Result<usize> {
        Ok(self.router.borrow().table(table)?.record_count())
    }

    /// Installs the three extractor callbacks a table needs to answer
    /// indexed and generic-column queries: a field extractor (required for
    /// any indexing at all), and the optional fast/batch extractors the
    /// query bridge prefers when present.
    pub fn set_field_extractor(&mut self, table: &str, extractor: FieldExtractor) -> Result<()> {
        self.router.borrow_mut().table_mut(table)?.set_field_extractor(extractor);
        Ok(())
    }

    pub fn set_fast_field_extractor(&mut self, table: &str, extractor: FastFieldExtractor) -> Result<()> {
        self.router.borrow_mut().table_mut(table)?.set_fast_field_extractor(extractor);
        Ok(())
    }

    pub fn set_batch_extractor(&mut self, table: &str, extractor: BatchExtractor) -> Result<()> {
        self.router.borrow_mut().table_mut(table)?.set_batch_extractor(extractor);
        Ok(())
    }
}
