//! Registers every table as a SQLite virtual relation and answers SQL
//! queries either through a cheap fast-path interception of the two common
//! `SELECT * FROM t [WHERE c = ?]` shapes, or by handing the statement to an
//! embedded SQLite engine (`rusqlite`, built with its `vtab` feature) that
//! drives the generic cursor protocol in [`vtab`].

mod error;
mod fast_path;
mod planner;
mod relation;
mod value;
mod vtab;

pub use error::{Error, Result};
pub use fast_path::FastQuery;
pub use planner::{Constraint, Op, Plan, ScanType};
pub use relation::RelationView;
pub use vtab::{Decryptor, SharedRouter, TableAux};

use std::collections::HashSet;

use framedb_primitives::Value;
use rusqlite::vtab::eponymous_only_module;
use rusqlite::Connection;

use vtab::FrameVTab;

/// Column names plus row values, the uniform shape both the fast path and
/// the generic engine path return.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Default bound on the facade's own prepared-statement cache (spec'd
/// policy: clear the whole cache once this many distinct statements have
/// been prepared, rather than evicting least-recently-used entries).
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 100;

/// Owns the `rusqlite::Connection` that hosts the cursor protocol and the
/// shared handle to the [`framedb_store::Router`] every registered table
/// reads through.
pub struct QueryBridge {
    conn: Connection,
    router: SharedRouter,
    decryptor: Option<Decryptor>,
    registered_tables: HashSet<String>,
    registered_views: HashSet<String>,
    cached_statements: HashSet<String>,
    statement_cache_capacity: usize,
}

impl QueryBridge {
    pub fn new(router: SharedRouter) -> Result<Self> {
        Self::with_statement_cache_capacity(router, DEFAULT_STATEMENT_CACHE_CAPACITY)
    }

    #[tracing::instrument(skip(router))]
    pub fn with_statement_cache_capacity(router: SharedRouter, statement_cache_capacity: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.set_prepared_statement_cache_capacity(statement_cache_capacity);
        Ok(Self {
            conn,
            router,
            decryptor: None,
            registered_tables: HashSet::new(),
            registered_views: HashSet::new(),
            cached_statements: HashSet::new(),
            statement_cache_capacity,
        })
    }

    pub fn set_decryptor(&mut self, decryptor: Decryptor) {
        self.decryptor = Some(decryptor);
    }

    /// Registers any base/source tables the router knows about but the
    /// bridge hasn't yet exposed as SQLite relations, and (re)creates the
    /// unified `UNION ALL` views once `create_unified_views` has been
    /// called on the router. Idempotent; cheap to call before every query.
    #[tracing::instrument(skip_all)]
    pub fn sync_schema(&mut self) -> Result<()> {
        let (has_sources, base_names, sources, unified) = {
            let router = self.router.borrow();
            (
                !router.sources().is_empty(),
                router.base_table_names().to_vec(),
                router.sources().to_vec(),
                router.is_unified_views_created(),
            )
        };

        let mut to_register = Vec::new();
        {
            let router = self.router.borrow();
            for base in &base_names {
                if has_sources {
                    for source in &sources {
                        let sibling_name = format!("{base}@{source}");
                        if self.registered_tables.contains(&sibling_name) {
                            continue;
                        }
                        if let Ok(store) = router.table(&sibling_name) {
                            let relation = RelationView::new(sibling_name.clone(), Some(source.clone()), store.def().clone());
                            to_register.push((sibling_name, relation));
                        }
                    }
                } else if !self.registered_tables.contains(base) {
                    if let Ok(store) = router.table(base) {
                        let relation = RelationView::new(base.clone(), None, store.def().clone());
                        to_register.push((base.clone(), relation));
                    }
                }
            }
        }
        for (name, relation) in to_register {
            self.register_relation(&name, relation)?;
        }

        if has_sources && unified {
            for base in &base_names {
                if self.registered_views.contains(base) || sources.is_empty() {
                    continue;
                }
                let branches: Vec<String> =
                    sources.iter().map(|s| format!("SELECT * FROM \"{base}@{s}\"")).collect();
                let sql = format!("CREATE VIEW \"{base}\" AS {}", branches.join(" UNION ALL "));
                self.conn.execute_batch(&sql)?;
                self.registered_views.insert(base.clone());
            }
        }
        Ok(())
    }

    fn register_relation(&mut self, name: &str, relation: RelationView) -> Result<()> {
        let aux = TableAux { router: self.router.clone(), relation, decryptor: self.decryptor.clone() };
        let module = eponymous_only_module::<FrameVTab>();
        self.conn.create_module(name, module, Some(aux))?;
        self.registered_tables.insert(name.to_string());
        Ok(())
    }

    /// Resolves `table` case-insensitively against whatever relations are
    /// currently registered, the same normalization the fast path's
    /// thread-local table-name cache applies.
    fn resolve_table_name(&self, table: &str) -> Option<String> {
        let wanted = table.to_ascii_lowercase();
        self.registered_tables
            .iter()
            .chain(self.registered_views.iter())
            .find(|name| name.to_ascii_lowercase() == wanted)
            .cloned()
    }

    #[tracing::instrument(skip(self, params))]
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.sync_schema()?;
        if let Some(result) = self.try_fast_path(sql, params)? {
            return Ok(result);
        }
        self.query_via_engine(sql, params)
    }

    pub fn query_count(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        Ok(self.query(sql, params)?.row_count())
    }

    fn try_fast_path(&mut self, sql: &str, params: &[Value]) -> Result<Option<QueryResult>> {
        let Some(parsed) = fast_path::parse_cached(sql) else {
            return Ok(None);
        };
        match parsed {
            FastQuery::SelectStar { table } => {
                let Some(table_name) = self.resolve_table_name(&table) else { return Ok(None) };
                self.scan_star(&table_name).map(Some)
            }
            FastQuery::SelectStarWhereEq { table, column } => {
                if params.len() != 1 {
                    return Err(Error::ParameterBind { expected: 1, actual: params.len() });
                }
                let Some(table_name) = self.resolve_table_name(&table) else { return Ok(None) };
                // The fast path only answers a `WHERE c = ?` that a single
                // index lookup can resolve to at most one row. An unindexed
                // or unknown column falls back to the engine rather than
                // erroring (spec requires a silent fallback on any
                // deviation); a real but non-unique `.indexed()` column also
                // falls back, since the engine's `IndexEquality` scan can
                // return more than the one row this path is allowed to emit,
                // and the two paths must otherwise agree on every row.
                if !self.column_is_primary_key(&table_name, &column) {
                    return Ok(None);
                }
                self.point_lookup(&table_name, &column, &params[0]).map(Some)
            }
        }
    }

    /// Whether `column` exists on `table_name` and is the table's primary
    /// key, the only case where an equality lookup is guaranteed both
    /// indexed and unique. Missing table/column resolves to `false` rather
    /// than an error; the caller treats that as a fast-path miss.
    fn column_is_primary_key(&self, table_name: &str, column: &str) -> bool {
        let router = self.router.borrow();
        let Ok(store) = router.table(table_name) else { return false };
        store.def().column(column).map(|c| c.primary_key).unwrap_or(false)
    }

    fn relation_for(&self, table_name: &str) -> Result<RelationView> {
        let router = self.router.borrow();
        let store = router.table(table_name)?;
        let source_label = table_name.split_once('@').map(|(_, s)| s.to_string());
        Ok(RelationView::new(table_name, source_label, store.def().clone()))
    }

    fn column_names(&self, relation: &RelationView) -> Vec<String> {
        let mut names: Vec<String> = relation.def.columns.iter().map(|c| c.name.clone()).collect();
        names.extend(relation::VIRTUAL_COLUMNS.iter().map(|(n, _)| n.to_string()));
        names
    }

    fn row_from_store(&self, relation: &RelationView, sequence: u64, offset: u64, body: &[u8]) -> Result<Vec<Value>> {
        let router = self.router.borrow();
        let store = router.table(&relation.lookup_name)?;
        let mut row = if let Some(batch) = store.batch_extractor() {
            let mut values = Vec::with_capacity(relation.real_column_count());
            batch(body, body.len() as u32, &mut values);
            values
        } else if let Some(extractor) = store.field_extractor() {
            relation.def.columns.iter().map(|c| extractor(body, body.len() as u32, &c.name)).collect()
        } else {
            vec![Value::Null; relation.real_column_count()]
        };
        if let Some(decryptor) = &self.decryptor {
            for (col, value) in relation.def.columns.iter().zip(row.iter_mut()) {
                if let Some(field_id) = col.encrypted_field_id {
                    *value = decryptor(field_id, value);
                }
            }
        }
        row.push(match &relation.source_label {
            Some(label) => Value::String(label.clone()),
            None => Value::Null,
        });
        row.push(Value::I64(sequence as i64));
        row.push(Value::I64(offset as i64));
        row.push(Value::Bytes(body.to_vec()));
        Ok(row)
    }

    /// `SELECT * FROM <table>`: scans the per-file-id record vector directly
    /// and fills virtual columns, skipping tombstoned sequences (checked
    /// only if the tombstone set is non-empty, since the common case has
    /// none).
    fn scan_star(&self, table_name: &str) -> Result<QueryResult> {
        let relation = self.relation_for(table_name)?;
        let rows_raw = self.router.borrow().scan_all(table_name)?;
        let mut rows = Vec::with_capacity(rows_raw.len());
        for r in rows_raw {
            rows.push(self.row_from_store(&relation, r.sequence, r.offset, &r.body)?);
        }
        Ok(QueryResult { columns: self.column_names(&relation), rows })
    }

    /// `SELECT * FROM <table> WHERE <col> = ?`: a single typed index lookup,
    /// tombstone-filtered, emitting at most one row.
    fn point_lookup(&self, table_name: &str, column: &str, value: &Value) -> Result<QueryResult> {
        let relation = self.relation_for(table_name)?;
        let hit = self.router.borrow().find_one_by_index(table_name, column, value)?;
        let rows = match hit {
            Some(row) => vec![self.row_from_store(&relation, row.sequence, row.offset, &row.body)?],
            None => Vec::new(),
        };
        Ok(QueryResult { columns: self.column_names(&relation), rows })
    }

    /// Falls back to the generic cursor protocol for any statement the fast
    /// path didn't recognize. Statements are prepared through `rusqlite`'s
    /// own cache; once more than `statement_cache_capacity` distinct
    /// statements have gone through it, the whole cache is cleared rather
    /// than evicted entry-by-entry.
    fn query_via_engine(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        if self.cached_statements.len() >= self.statement_cache_capacity && !self.cached_statements.contains(sql) {
            self.conn.flush_prepared_statement_cache();
            self.cached_statements.clear();
        }
        self.cached_statements.insert(sql.to_string());

        let mut stmt = self.conn.prepare_cached(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let param_refs: Vec<rusqlite::types::ToSqlOutput<'_>> = params.iter().map(value::to_sql_output).collect();
        let param_slice: Vec<&dyn rusqlite::ToSql> = param_refs.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let column_count = column_names.len();
        let mut rows_out = Vec::new();
        let mut rows = stmt.query(param_slice.as_slice())?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let v: rusqlite::types::ValueRef<'_> = row.get_ref(i)?;
                values.push(value::from_value_ref(v));
            }
            rows_out.push(values);
        }
        Ok(QueryResult { columns: column_names, rows: rows_out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framedb_primitives::{ColumnDef, DatabaseSchema, TableDef, ValueType};
    use framedb_store::Router;
    use std::cell::RefCell;
    use std::rc::Rc;
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

    fn setup() -> (Rc<RefCell<Router>>, QueryBridge) {
        let mut router = Router::new(schema());
        router.register_file_id(*b"USR1", "users").unwrap();
        router.table_mut("users").unwrap().set_field_extractor(extractor());
        let router = Rc::new(RefCell::new(router));
        let bridge = QueryBridge::new(router.clone()).unwrap();
        (router, bridge)
    }

    #[test]
    fn fast_path_select_star() {
        let (router, mut bridge) = setup();
        router.borrow_mut().ingest_one(&record(1, "a@x", 30)).unwrap();
        router.borrow_mut().ingest_one(&record(2, "b@x", 25)).unwrap();

        let result = bridge.query("SELECT * FROM users", &[]).unwrap();
        assert_eq!(result.row_count(), 2);
        assert!(result.columns.contains(&"_rowid".to_string()));
    }

    #[test]
    fn fast_path_point_query_by_key() {
        let (router, mut bridge) = setup();
        router.borrow_mut().ingest_one(&record(1, "a@x", 30)).unwrap();
        router.borrow_mut().ingest_one(&record(2, "b@x", 25)).unwrap();
        router.borrow_mut().ingest_one(&record(3, "c@x", 40)).unwrap();

        let result = bridge.query("SELECT * FROM users WHERE email = ?", &[Value::String("b@x".into())]).unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.rows[0][0], Value::I64(2));
    }

    #[test]
    fn where_eq_on_duplicate_non_unique_indexed_column_matches_engine_row_count() {
        let (router, mut bridge) = setup();
        router.borrow_mut().ingest_one(&record(1, "shared@x", 30)).unwrap();
        router.borrow_mut().ingest_one(&record(2, "shared@x", 25)).unwrap();
        router.borrow_mut().ingest_one(&record(3, "other@x", 40)).unwrap();

        // "email" is `.indexed()` but not a primary key, so two rows can
        // share a value; the fast path must fall back to the engine rather
        // than answer with `search_first`'s single row.
        let result = bridge.query("SELECT * FROM users WHERE email = ?", &[Value::String("shared@x".into())]).unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn where_eq_on_unindexed_column_falls_back_instead_of_erroring() {
        let (router, mut bridge) = setup();
        router.borrow_mut().ingest_one(&record(1, "a@x", 30)).unwrap();
        router.borrow_mut().ingest_one(&record(2, "b@x", 25)).unwrap();

        // "age" carries no index at all; the fast path must defer to the
        // engine instead of propagating an unknown-column error.
        let result = bridge.query("SELECT * FROM users WHERE age = ?", &[Value::I64(25)]).unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.rows[0][0], Value::I64(2));
    }

    #[test]
    fn where_eq_on_unknown_column_falls_back_instead_of_erroring() {
        let (router, mut bridge) = setup();
        router.borrow_mut().ingest_one(&record(1, "a@x", 30)).unwrap();

        let result = bridge.query("SELECT * FROM users WHERE nope = ?", &[Value::I64(1)]);
        assert!(result.is_err());
    }

    #[test]
    fn tombstone_hides_row_from_fast_path() {
        let (router, mut bridge) = setup();
        router.borrow_mut().ingest_one(&record(1, "a@x", 30)).unwrap();
        router.borrow_mut().ingest_one(&record(2, "b@x", 25)).unwrap();
        router.borrow_mut().mark_deleted("users", 2).unwrap();

        let result = bridge.query("SELECT * FROM users", &[]).unwrap();
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn engine_path_handles_range_query() {
        let (router, mut bridge) = setup();
        router.borrow_mut().ingest_one(&record(1, "a@x", 30)).unwrap();
        router.borrow_mut().ingest_one(&record(2, "b@x", 25)).unwrap();
        router.borrow_mut().ingest_one(&record(3, "c@x", 40)).unwrap();

        let result = bridge.query("SELECT id FROM users WHERE age BETWEEN 26 AND 35", &[]).unwrap();
        assert_eq!(result.rows, vec![vec![Value::I64(1)]]);
    }
}
