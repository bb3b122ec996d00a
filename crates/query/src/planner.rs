//! Best-index planning, decoupled from `rusqlite::vtab::IndexInfo` so the
//! selection/tie-break logic can be unit tested without a live SQLite
//! connection. `vtab.rs` translates `IndexInfo` into [`Constraint`]s, calls
//! [`plan`], then writes the resulting [`Plan`] back onto `IndexInfo`.

use framedb_primitives::ValueType;

use crate::relation::RelationView;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One constraint SQLite is offering the planner, already filtered to
/// `usable` ones by the caller.
#[derive(Clone, Copy, Debug)]
pub struct Constraint {
    pub constraint_index: usize,
    pub column: usize,
    pub op: Op,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanType {
    FullScan,
    RowidLookup,
    IndexEquality { column: usize },
    IndexSingleLookup { column: usize },
    IndexRange { column: usize },
}

/// How to bind SQLite's positional filter arguments to the constraints that
/// were chosen, and whether SQLite may skip re-checking a bound constraint
/// itself (`omit`).
#[derive(Clone, Debug)]
pub struct ArgBinding {
    pub constraint_index: usize,
    pub op: Op,
    pub omit: bool,
}

#[derive(Clone, Debug)]
pub struct Plan {
    pub scan_type: ScanType,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    pub args: Vec<ArgBinding>,
}

/// Priority used for the tie-break rule: equality beats range; range beats
/// full scan; a strategy already chosen is never displaced by a less
/// selective one.
fn priority(scan_type: &ScanType) -> u8 {
    match scan_type {
        ScanType::FullScan => 0,
        ScanType::IndexRange { .. } => 1,
        ScanType::IndexEquality { .. } | ScanType::IndexSingleLookup { .. } => 2,
        ScanType::RowidLookup => 3,
    }
}

fn is_range_op(op: Op) -> bool {
    matches!(op, Op::Lt | Op::Le | Op::Gt | Op::Ge)
}

/// Chooses a [`ScanType`] for `relation` given the constraints SQLite is
/// offering, per the planner contract: rowid equality beats everything;
/// equality on an indexed column beats a range; a range on an indexed column
/// beats a full scan; anything else is a full scan over `record_count` rows.
pub fn plan(relation: &RelationView, record_count: usize, constraints: &[Constraint]) -> Plan {
    let rowid_col = relation.rowid_column_index();
    let source_col = relation.source_column_index();

    let mut best: Option<(ScanType, f64, i64)> = None;
    let mut range_constraints: Vec<Constraint> = Vec::new();
    let mut source_eq: Option<Constraint> = None;

    for c in constraints {
        if c.column == source_col && c.op == Op::Eq {
            source_eq = Some(*c);
            continue;
        }
        if c.column == rowid_col && c.op == Op::Eq {
            maybe_upgrade(&mut best, ScanType::RowidLookup, 1.0, 1);
            continue;
        }
        if c.column >= relation.real_column_count() {
            continue; // _offset / _data are never indexed constraint targets
        }
        let Some(col_def) = relation.def.columns.get(c.column) else { continue };
        if !col_def.indexed {
            continue;
        }
        if c.op == Op::Eq {
            let scan_type = if col_def.primary_key {
                ScanType::IndexSingleLookup { column: c.column }
            } else {
                ScanType::IndexEquality { column: c.column }
            };
            let rows = if col_def.primary_key { 1 } else { (record_count / 10).max(1) as i64 };
            maybe_upgrade(&mut best, scan_type, 10.0, rows);
        } else if is_range_op(c.op) {
            range_constraints.push(*c);
        }
    }

    // Only record range constraints toward the plan if nothing more
    // selective (equality/rowid) was already chosen on a *different*
    // selection, and only keep the ones on the single best range column.
    if priority(&best.as_ref().map(|b| b.0).unwrap_or(ScanType::FullScan)) < priority(&ScanType::IndexRange { column: 0 })
        && !range_constraints.is_empty()
    {
        let column = range_constraints[0].column;
        let rows = (record_count / 10).max(1) as i64;
        maybe_upgrade(&mut best, ScanType::IndexRange { column }, 100.0, rows);
    }

    let (scan_type, cost, rows) = best.unwrap_or((ScanType::FullScan, record_count.max(1) as f64, record_count as i64));

    let mut args = Vec::new();
    match scan_type {
        ScanType::FullScan => {}
        ScanType::RowidLookup => {
            if let Some(c) = constraints.iter().find(|c| c.column == rowid_col && c.op == Op::Eq) {
                args.push(ArgBinding { constraint_index: c.constraint_index, op: Op::Eq, omit: true });
            }
        }
        ScanType::IndexEquality { column } | ScanType::IndexSingleLookup { column } => {
            if let Some(c) = constraints.iter().find(|c| c.column == column && c.op == Op::Eq) {
                args.push(ArgBinding { constraint_index: c.constraint_index, op: Op::Eq, omit: true });
            }
        }
        ScanType::IndexRange { column } => {
            for c in constraints.iter().filter(|c| c.column == column && is_range_op(c.op)) {
                // SQLite-style "do-not-omit": the engine re-checks the bound.
                args.push(ArgBinding { constraint_index: c.constraint_index, op: c.op, omit: false });
            }
        }
    }

    if let Some(c) = source_eq {
        args.push(ArgBinding { constraint_index: c.constraint_index, op: Op::Eq, omit: false });
    }

    Plan { scan_type, estimated_cost: cost, estimated_rows: rows, args }
}

fn maybe_upgrade(best: &mut Option<(ScanType, f64, i64)>, candidate: ScanType, cost: f64, rows: i64) {
    let candidate_priority = priority(&candidate);
    let should_replace = match best {
        None => true,
        Some((current, _, _)) => candidate_priority > priority(current),
    };
    if should_replace {
        *best = Some((candidate, cost, rows));
    }
}

/// Whether a column type can ever be meaningfully range-queried; not used by
/// the planner directly (SQLite only ever proposes ops it parsed), kept here
/// because it documents why e.g. a `Bytes` column's `<`/`>` still plans as a
/// range (byte-lexicographic order) rather than being special-cased away.
pub fn supports_range(_ty: ValueType) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use framedb_primitives::{ColumnDef, TableDef, ValueType};

    fn users() -> RelationView {
        let def = TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ValueType::I64).primary_key(),
                ColumnDef::new("email", ValueType::String).indexed(),
                ColumnDef::new("age", ValueType::I64),
            ],
        )
        .unwrap();
        RelationView::new("users", None, def)
    }

    #[test]
    fn rowid_equality_wins_over_everything() {
        let relation = users();
        let constraints = vec![
            Constraint { constraint_index: 0, column: relation.rowid_column_index(), op: Op::Eq },
            Constraint { constraint_index: 1, column: 0, op: Op::Eq },
        ];
        let p = plan(&relation, 100, &constraints);
        assert_eq!(p.scan_type, ScanType::RowidLookup);
        assert_eq!(p.estimated_cost, 1.0);
    }

    #[test]
    fn primary_key_equality_is_single_lookup() {
        let relation = users();
        let constraints = vec![Constraint { constraint_index: 0, column: 0, op: Op::Eq }];
        let p = plan(&relation, 100, &constraints);
        assert_eq!(p.scan_type, ScanType::IndexSingleLookup { column: 0 });
    }

    #[test]
    fn non_unique_indexed_equality_is_index_equality() {
        let relation = users();
        let constraints = vec![Constraint { constraint_index: 0, column: 1, op: Op::Eq }];
        let p = plan(&relation, 100, &constraints);
        assert_eq!(p.scan_type, ScanType::IndexEquality { column: 1 });
        assert_eq!(p.estimated_cost, 10.0);
    }

    #[test]
    fn range_on_unindexed_column_is_ignored_falls_back_to_full_scan() {
        let relation = users();
        // column 2 ("age") is not indexed in this schema.
        let constraints = vec![Constraint { constraint_index: 0, column: 2, op: Op::Ge }];
        let p = plan(&relation, 50, &constraints);
        assert_eq!(p.scan_type, ScanType::FullScan);
        assert_eq!(p.estimated_rows, 50);
    }

    #[test]
    fn range_on_indexed_column_beats_full_scan_but_loses_to_equality() {
        let relation = users();
        let constraints = vec![
            Constraint { constraint_index: 0, column: 0, op: Op::Ge },
            Constraint { constraint_index: 1, column: 0, op: Op::Le },
        ];
        let p = plan(&relation, 100, &constraints);
        assert_eq!(p.scan_type, ScanType::IndexRange { column: 0 });
        assert_eq!(p.args.len(), 2);
        assert!(p.args.iter().all(|a| !a.omit));
    }

    #[test]
    fn source_equality_is_recorded_but_does_not_change_scan_type() {
        let relation = RelationView::new("users@siteA", Some("siteA".into()), users().def);
        let constraints =
            vec![Constraint { constraint_index: 0, column: relation.source_column_index(), op: Op::Eq }];
        let p = plan(&relation, 10, &constraints);
        assert_eq!(p.scan_type, ScanType::FullScan);
        assert_eq!(p.args.len(), 1);
    }

    #[test]
    fn no_usable_constraints_is_full_scan_costed_by_record_count() {
        let relation = users();
        let p = plan(&relation, 250, &[]);
        assert_eq!(p.scan_type, ScanType::FullScan);
        assert_eq!(p.estimated_cost, 250.0);
        assert_eq!(p.estimated_rows, 250);
    }
}
