//! The generic cursor protocol: registers each [`RelationView`] as a SQLite
//! virtual table (`rusqlite::vtab`) backed by a shared, `RefCell`-guarded
//! [`framedb_store::Router`]. Implements the `Init → Filtered → Row* → Eof`
//! cursor state machine and the column-materialization algorithm described
//! in the component design: fast extractor first, else a per-row cache built
//! from the generic field extractor, with virtual columns served directly
//! from cursor state.

use std::cell::RefCell;
use std::os::raw::c_int;
use std::rc::Rc;

use framedb_primitives::Value;
use framedb_store::Router;
use rusqlite::vtab::{
    Context, CreateVTab, IndexConstraintOp, IndexInfo, VTab, VTabConnection, VTabCursor, VTabKind, Values,
};
use rusqlite::Result as SqliteResult;

use crate::planner::{self, ArgBinding, Constraint, Op, Plan, ScanType};
use crate::relation::RelationView;
use crate::value;

pub type SharedRouter = Rc<RefCell<Router>>;

/// Decrypts one encrypted column's value, keyed by its schema-declared
/// `encrypted_field_id`. `framedb-query` has no cryptography of its own
/// (out of scope per spec.md §1); callers that enable field-level encryption
/// supply this hook.
pub type Decryptor = Rc<dyn Fn(u32, &Value) -> Value>;

/// Per-table auxiliary data handed to [`FrameVTab::connect`] through
/// `rusqlite`'s module `Aux` slot.
pub struct TableAux {
    pub router: SharedRouter,
    pub relation: RelationView,
    pub decryptor: Option<Decryptor>,
}

#[repr(C)]
pub struct FrameVTab {
    base: rusqlite::vtab::sqlite3_vtab,
    router: SharedRouter,
    relation: RelationView,
    decryptor: Option<Decryptor>,
}

fn convert_op(op: IndexConstraintOp) -> Option<Op> {
    match op {
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ => Some(Op::Eq),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LT => Some(Op::Lt),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LE => Some(Op::Le),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GT => Some(Op::Gt),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GE => Some(Op::Ge),
        _ => None,
    }
}

unsafe impl<'vtab> VTab<'vtab> for FrameVTab {
    type Aux = TableAux;
    type Cursor = FrameCursor;

    fn connect(
        db: &mut VTabConnection,
        aux: Option<&TableAux>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let _ = db;
        let aux = aux.expect("framedb always registers table modules with an Aux");
        let sql = aux.relation.declare_sql();
        let vtab = FrameVTab {
            base: rusqlite::vtab::sqlite3_vtab::default(),
            router: aux.router.clone(),
            relation: aux.relation.clone(),
            decryptor: aux.decryptor.clone(),
        };
        Ok((sql, vtab))
    }

    /// Implements the planner contract in full: translates SQLite's offered
    /// constraints into [`Constraint`]s, asks [`planner::plan`] for a
    /// [`Plan`], then writes cost/row estimates and argv bindings back.
    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let record_count = self.router.borrow().table(&self.relation.lookup_name).map(|t| t.record_count()).unwrap_or(0);

        let constraints: Vec<Constraint> = info
            .constraints()
            .enumerate()
            .filter(|(_, c)| c.usable())
            .filter_map(|(i, c)| convert_op(c.operator()).map(|op| Constraint { constraint_index: i, column: c.column() as usize, op }))
            .collect();

        let plan = planner::plan(&self.relation, record_count, &constraints);

        for (argv_index, binding) in plan.args.iter().enumerate() {
            let mut usage = info.constraint_usage(binding.constraint_index);
            usage.set_argv_index(Some((argv_index + 1) as c_int));
            usage.set_omit(binding.omit);
        }

        info.set_estimated_cost(plan.estimated_cost);
        info.set_estimated_rows(plan.estimated_rows);
        info.set_idx_num(encode_idx_num(&plan));
        info.set_idx_str(&encode_idx_str(&plan));
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<FrameCursor> {
        Ok(FrameCursor::new(self.router.clone(), self.relation.clone(), self.decryptor.clone()))
    }
}

/// Eponymous-only virtual tables never receive an `xCreate` call; `create`
/// falls back to `connect` only to satisfy the trait, matching `rusqlite`'s
/// own `csvtab` example.
unsafe impl<'vtab> CreateVTab<'vtab> for FrameVTab {
    const KIND: VTabKind = VTabKind::Eponymous;
}

/// `idx_num` packs the scan-type tag in the low byte and, for the strategies
/// that target one column, that column's index in the remaining bits.
const TAG_FULL: c_int = 0;
const TAG_ROWID: c_int = 1;
const TAG_EQ: c_int = 2;
const TAG_PK: c_int = 3;
const TAG_RANGE: c_int = 4;

fn encode_idx_num(plan: &Plan) -> c_int {
    match plan.scan_type {
        ScanType::FullScan => TAG_FULL,
        ScanType::RowidLookup => TAG_ROWID,
        ScanType::IndexEquality { column } => TAG_EQ | ((column as c_int) << 8),
        ScanType::IndexSingleLookup { column } => TAG_PK | ((column as c_int) << 8),
        ScanType::IndexRange { column } => TAG_RANGE | ((column as c_int) << 8),
    }
}

fn decode_idx_num(idx_num: c_int) -> (c_int, usize) {
    (idx_num & 0xff, ((idx_num >> 8) & 0xffff) as usize)
}

/// One byte per `plan.args` entry, in argv order, naming that arg's
/// operator: the side channel `filter` needs to tell a range scan's lower
/// bound from its upper bound. SQLite hands `idx_str` back to `filter`
/// verbatim and in the same order `best_index` bound `argv_index`, so
/// position `i` here always lines up with `args.get_raw(i)` there.
fn encode_idx_str(plan: &Plan) -> String {
    plan.args
        .iter()
        .map(|a| match a.op {
            Op::Eq => 'E',
            Op::Lt => 'l',
            Op::Le => 'L',
            Op::Gt => 'g',
            Op::Ge => 'G',
        })
        .collect()
}

/// Which rows a cursor has already resolved to iterate over, chosen once in
/// `filter` and never changed for the cursor's lifetime.
enum Rows {
    /// `RowidLookup` / `IndexSingleLookup`: at most one row, already
    /// resolved.
    Single(Option<MaterializedRow>),
    /// `FullScan` / `IndexEquality` / `IndexRange`: a materialized sequence,
    /// walked by position.
    Many(Vec<MaterializedRow>, usize),
}

struct MaterializedRow {
    sequence: u64,
    offset: u64,
    body: Vec<u8>,
}

/// Per-row cache of real-column values, built lazily from the table's
/// generic field extractor and invalidated every time the cursor advances.
struct RowCache {
    values: Option<Vec<Value>>,
}

#[repr(C)]
pub struct FrameCursor {
    base: rusqlite::vtab::sqlite3_vtab_cursor,
    router: SharedRouter,
    relation: RelationView,
    decryptor: Option<Decryptor>,
    rows: Rows,
    cache: RowCache,
}

impl FrameCursor {
    fn new(router: SharedRouter, relation: RelationView, decryptor: Option<Decryptor>) -> Self {
        Self {
            base: rusqlite::vtab::sqlite3_vtab_cursor::default(),
            router,
            relation,
            decryptor,
            rows: Rows::Many(Vec::new(), 0),
            cache: RowCache { values: None },
        }
    }

    fn current(&self) -> Option<(u64, u64, &[u8])> {
        match &self.rows {
            Rows::Single(Some(r)) => Some((r.sequence, r.offset, &r.body)),
            Rows::Single(None) => None,
            Rows::Many(rows, pos) => rows.get(*pos).map(|r| (r.sequence, r.offset, r.body.as_slice())),
        }
    }

    fn arg_value(args: &Values<'_>, index: usize) -> rusqlite::Result<Value> {
        let v = args.get_raw(index);
        Ok(value::from_value_ref(v))
    }
}

unsafe impl VTabCursor for FrameCursor {
    fn filter(&mut self, idx_num: c_int, idx_str: Option<&str>, args: &Values<'_>) -> rusqlite::Result<()> {
        self.cache.values = None;
        let (tag, column) = decode_idx_num(idx_num);
        let router = self.router.borrow();
        let table = router
            .table(&self.relation.lookup_name)
            .map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;

        self.rows = match tag {
            TAG_ROWID => {
                let sequence = match Self::arg_value(args, 0)? {
                    Value::I64(v) => v as u64,
                    Value::U64(v) => v,
                    other => return Err(rusqlite::Error::ModuleError(format!("_rowid must be an integer, got {other:?}"))),
                };
                let row = router
                    .find_row_by_sequence(&self.relation.lookup_name, sequence)
                    .map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?
                    .map(|stored| MaterializedRow { sequence: stored.sequence, offset: stored.offset, body: stored.body });
                Rows::Single(row)
            }
            TAG_EQ | TAG_PK => {
                let column_name = self.relation.column_name(column).unwrap_or_default().to_string();
                let value = Self::arg_value(args, 0)?;
                if tag == TAG_PK {
                    let row = table
                        .find_by_index(&column_name, &value)
                        .map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?
                        .map(|entry| {
                            let body = router.log().data_at(entry.data_offset).map(|b| b.to_vec()).unwrap_or_default();
                            MaterializedRow { sequence: entry.sequence, offset: entry.data_offset, body }
                        });
                    Rows::Single(row)
                } else {
                    let hits = table.search_index(&column_name, &value).map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;
                    let rows = hits
                        .into_iter()
                        .map(|entry| {
                            let body = router.log().data_at(entry.data_offset).map(|b| b.to_vec()).unwrap_or_default();
                            MaterializedRow { sequence: entry.sequence, offset: entry.data_offset, body }
                        })
                        .collect();
                    Rows::Many(rows, 0)
                }
            }
            TAG_RANGE => {
                let column_name = self.relation.column_name(column).unwrap_or_default().to_string();
                // `idx_str` carries one operator byte per arg, in the same
                // order `best_index` bound `argv_index`. It's what tells a
                // lower bound (Ge/Gt) from an upper bound (Le/Lt) instead of
                // guessing from argv position, which breaks the moment
                // SQLite offers the upper-bound term of a WHERE clause
                // before the lower-bound one (e.g. `WHERE id <= 35 AND id >=
                // 26`). `Lt`/`Gt` are folded in as inclusive the same as
                // `Le`/`Ge`: `Index::range` is inclusive on both ends, and
                // SQLite's own do-not-omit re-check (these args are never
                // marked omit) trims the exclusive edge back off.
                let ops = idx_str.unwrap_or_default().as_bytes();
                let (mut lo, mut hi) = (None::<Value>, None::<Value>);
                for i in 0..args.len() {
                    let v = Self::arg_value(args, i)?;
                    match ops.get(i) {
                        Some(b'G') | Some(b'g') => {
                            lo = Some(match lo.take() {
                                Some(existing) if existing > v => existing,
                                _ => v,
                            });
                        }
                        Some(b'L') | Some(b'l') => {
                            hi = Some(match hi.take() {
                                Some(existing) if existing < v => existing,
                                _ => v,
                            });
                        }
                        _ => {} // a ride-along _source equality arg, not a range bound
                    }
                }
                let hits = match (lo, hi) {
                    (Some(lo), Some(hi)) => {
                        table.range_index(&column_name, &lo, &hi).map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?
                    }
                    // A one-sided bound can't be expressed as an inclusive
                    // range(min, max) pair; materialize the full column and
                    // let SQLite's re-check drop rows outside the bound.
                    (Some(_), None) | (None, Some(_)) => {
                        table.all_index(&column_name).map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?
                    }
                    (None, None) => return Err(rusqlite::Error::ModuleError("range scan requires at least one bound".into())),
                };
                let rows = hits
                    .into_iter()
                    .map(|entry| {
                        let body = router.log().data_at(entry.data_offset).map(|b| b.to_vec()).unwrap_or_default();
                        MaterializedRow { sequence: entry.sequence, offset: entry.data_offset, body }
                    })
                    .collect();
                Rows::Many(rows, 0)
            }
            _ => {
                let all = router.scan_all(&self.relation.lookup_name).map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;
                let rows = all.into_iter().map(|r| MaterializedRow { sequence: r.sequence, offset: r.offset, body: r.body }).collect();
                Rows::Many(rows, 0)
            }
        };
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.cache.values = None;
        match &mut self.rows {
            Rows::Single(row) => *row = None,
            Rows::Many(_, pos) => *pos += 1,
        }
        Ok(())
    }

    fn eof(&self) -> bool {
        match &self.rows {
            Rows::Single(row) => row.is_none(),
            Rows::Many(rows, pos) => *pos >= rows.len(),
        }
    }

    fn column(&self, ctx: &mut Context, col: c_int) -> rusqlite::Result<()> {
        let col = col as usize;
        let Some((sequence, offset, body)) = self.current() else {
            return value::write_result(ctx, &Value::Null);
        };

        if col == self.relation.source_column_index() {
            return match &self.relation.source_label {
                Some(label) => value::write_result(ctx, &Value::String(label.clone())),
                None => value::write_result(ctx, &Value::Null),
            };
        }
        if col == self.relation.rowid_column_index() {
            return value::write_result(ctx, &Value::I64(sequence as i64));
        }
        if col == self.relation.offset_column_index() {
            return value::write_result(ctx, &Value::I64(offset as i64));
        }
        if col == self.relation.data_column_index() {
            return value::write_result(ctx, &Value::Bytes(body.to_vec()));
        }

        let router = self.router.borrow();
        let table = router.table(&self.relation.lookup_name).map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;
        let col_def = self
            .relation
            .def
            .columns
            .get(col)
            .ok_or_else(|| rusqlite::Error::ModuleError(format!("column index {col} out of range")))?;

        let no_encryption_on_this_column = col_def.encrypted_field_id.is_none();
        if no_encryption_on_this_column {
            if let Some(fast) = table.fast_field_extractor() {
                let mut sink = ContextSink { ctx };
                if fast(body, body.len() as u32, col, &mut sink) {
                    return Ok(());
                }
            }
        }

        self.fill_cache_if_needed(table, body);
        let value = match &self.cache.values {
            Some(values) => values.get(col).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        };
        value::write_result(ctx, &value)
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.current().map(|(seq, _, _)| seq as i64).unwrap_or(0))
    }
}

impl FrameCursor {
    fn fill_cache_if_needed(&mut self, table: &framedb_store::TableStore, body: &[u8]) {
        if self.cache.values.is_some() {
            return;
        }
        let Some(extractor) = table.field_extractor() else {
            self.cache.values = Some(vec![Value::Null; self.relation.real_column_count()]);
            return;
        };
        let mut values: Vec<Value> = self
            .relation
            .def
            .columns
            .iter()
            .map(|col| extractor(body, body.len() as u32, &col.name))
            .collect();
        if let Some(decryptor) = &self.decryptor {
            for (col, value) in self.relation.def.columns.iter().zip(values.iter_mut()) {
                if let Some(field_id) = col.encrypted_field_id {
                    *value = decryptor(field_id, value);
                }
            }
        }
        self.cache.values = Some(values);
    }
}

struct ContextSink<'a, 'b> {
    ctx: &'a mut Context<'b>,
}

impl framedb_store::ResultSink for ContextSink<'_, '_> {
    fn write(&mut self, value: &Value) {
        let _ = value::write_result(self.ctx, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idx_num_round_trips_tag_and_column() {
        let plan = Plan { scan_type: ScanType::IndexEquality { column: 3 }, estimated_cost: 10.0, estimated_rows: 10, args: vec![] };
        let encoded = encode_idx_num(&plan);
        assert_eq!(decode_idx_num(encoded), (TAG_EQ, 3));
    }

    #[test]
    fn full_scan_encodes_to_zero() {
        let plan = Plan { scan_type: ScanType::FullScan, estimated_cost: 1.0, estimated_rows: 1, args: vec![] };
        assert_eq!(encode_idx_num(&plan), 0);
    }

    #[test]
    fn idx_str_encodes_one_op_byte_per_arg_in_order() {
        let plan = Plan {
            scan_type: ScanType::IndexRange { column: 0 },
            estimated_cost: 100.0,
            estimated_rows: 10,
            args: vec![
                ArgBinding { constraint_index: 0, op: Op::Le, omit: false },
                ArgBinding { constraint_index: 1, op: Op::Ge, omit: false },
            ],
        };
        assert_eq!(encode_idx_str(&plan), "LG");
    }
}
