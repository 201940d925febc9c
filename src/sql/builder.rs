//! Builds parameterized SELECT, upsert and bulk INSERT statements from schema descriptors.

use crate::filter::{FieldFilter, Predicate};
use crate::request::{Direction, OrderDirective};
use crate::schema::{ColumnInfo, EntitySchema, JoinKind, TableSchema, UniqueConstraint, CREATED_AT, ID, UPDATED_AT};
use crate::sql::PgBindValue;
use chrono::NaiveDateTime;

/// PostgreSQL caps bind parameters per statement at 65535.
const MAX_PARAMS: usize = 65_535;
const MAX_ROWS_PER_INSERT: usize = 1_000;

/// Quote identifier for PostgreSQL (safe: only from descriptors).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

fn column_ref(alias: &str, column: &str) -> String {
    format!("{}.{}", quoted(alias), quoted(column))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        self.params.push(v);
        self.params.len() as u32
    }
}

fn push_predicate(q: &mut QueryBuf, p: &Predicate) -> String {
    let col = column_ref(p.alias, p.column);
    match &p.filter {
        FieldFilter::Exact(values) if values.is_empty() => "FALSE".to_string(),
        FieldFilter::Exact(values) if values.len() == 1 => {
            let n = q.push_param(PgBindValue::String(values[0].clone()));
            format!("{} = ${}", col, n)
        }
        FieldFilter::Exact(values) => {
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| format!("${}", q.push_param(PgBindValue::String(v.clone()))))
                .collect();
            format!("{} IN ({})", col, placeholders.join(", "))
        }
        FieldFilter::Like(pattern) => {
            let n = q.push_param(PgBindValue::String(pattern.clone()));
            format!("{} LIKE ${}", col, n)
        }
        FieldFilter::Range { from, to } => {
            let mut parts = Vec::new();
            if let Some(f) = from {
                let n = q.push_param(PgBindValue::Timestamp(*f));
                parts.push(format!("{} >= ${}", col, n));
            }
            if let Some(t) = to {
                let n = q.push_param(PgBindValue::Timestamp(*t));
                parts.push(format!("{} <= ${}", col, n));
            }
            parts.join(" AND ")
        }
        FieldFilter::Eq(v) => {
            let n = q.push_param(v.to_bind());
            format!("{} = ${}", col, n)
        }
    }
}

/// SELECT the entity's projection with its joins, AND-combined predicates, ordering and optional limit.
/// Ordering directives name output columns; the main table's id is appended as a final tie-break.
pub fn select(
    schema: &str,
    entity: &EntitySchema,
    predicates: &[Predicate],
    ordering: &[OrderDirective],
    limit: Option<u64>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let select_parts: Vec<String> = entity
        .output_columns()
        .iter()
        .map(|p| format!("{} AS {}", column_ref(p.alias, p.column), quoted(p.output)))
        .collect();

    let mut from = format!(
        "{} {}",
        qualified_table(schema, entity.table.name),
        quoted(entity.alias)
    );
    for j in entity.joins {
        let kind = match j.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        from.push_str(&format!(
            " {} {} {} ON {} = {}",
            kind,
            qualified_table(schema, j.table),
            quoted(j.alias),
            column_ref(j.alias, ID),
            column_ref(j.from_alias, j.from_column)
        ));
    }

    let where_parts: Vec<String> = predicates.iter().map(|p| push_predicate(&mut q, p)).collect();
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };

    let mut order_parts: Vec<String> = ordering
        .iter()
        .map(|o| {
            let dir = match o.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            format!("{} {}", quoted(&o.name), dir)
        })
        .collect();
    order_parts.push(format!("{} ASC", column_ref(entity.alias, ID)));
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}{}",
        select_parts.join(", "),
        from,
        where_clause,
        order_parts.join(", "),
        limit_clause
    );
    q
}

fn returning_list(table: &TableSchema) -> String {
    table
        .columns
        .iter()
        .map(|c| quoted(c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// INSERT one row with ON CONFLICT ON CONSTRAINT ... DO UPDATE over the mutable columns.
/// The row is inserted with `updated_at` NULL; a conflict sets it to `now`.
pub fn upsert(
    schema: &str,
    table: &TableSchema,
    unique: &UniqueConstraint,
    values: &[(&ColumnInfo, PgBindValue)],
    now: NaiveDateTime,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::with_capacity(values.len() + 2);
    let mut placeholders = Vec::with_capacity(values.len() + 2);
    for (c, v) in values {
        let n = q.push_param(v.clone());
        cols.push(quoted(c.name));
        placeholders.push(format!("${}::{}", n, c.ty.pg_type()));
    }
    let now_param = q.push_param(PgBindValue::Timestamp(now));
    cols.push(quoted(CREATED_AT));
    placeholders.push(format!("${}::timestamp", now_param));
    cols.push(quoted(UPDATED_AT));
    placeholders.push("NULL".to_string());

    let mut sets: Vec<String> = values
        .iter()
        .filter(|(c, _)| !unique.columns.contains(&c.name))
        .map(|(c, _)| format!("{} = EXCLUDED.{}", quoted(c.name), quoted(c.name)))
        .collect();
    sets.push(format!("{} = ${}::timestamp", quoted(UPDATED_AT), now_param));

    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ON CONSTRAINT {} DO UPDATE SET {} RETURNING {}",
        qualified_table(schema, table.name),
        cols.join(", "),
        placeholders.join(", "),
        quoted(unique.name),
        sets.join(", "),
        returning_list(table)
    );
    q
}

/// Multi-row INSERT for append-only rows, split so no statement exceeds the parameter cap.
/// Every statement returns the new ids.
pub fn insert_many(
    schema: &str,
    table: &TableSchema,
    columns: &[&ColumnInfo],
    rows: &[Vec<PgBindValue>],
    now: NaiveDateTime,
) -> Vec<QueryBuf> {
    let per_row = columns.len() + 1;
    let chunk_rows = (MAX_PARAMS / per_row).clamp(1, MAX_ROWS_PER_INSERT);
    let mut col_list: Vec<String> = columns.iter().map(|c| quoted(c.name)).collect();
    col_list.push(quoted(CREATED_AT));
    let col_list = col_list.join(", ");

    rows.chunks(chunk_rows)
        .map(|chunk| {
            let mut q = QueryBuf::new();
            let tuples: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let mut phs: Vec<String> = columns
                        .iter()
                        .zip(row.iter())
                        .map(|(c, v)| format!("${}::{}", q.push_param(v.clone()), c.ty.pg_type()))
                        .collect();
                    phs.push(format!("${}::timestamp", q.push_param(PgBindValue::Timestamp(now))));
                    format!("({})", phs.join(", "))
                })
                .collect();
            q.sql = format!(
                "INSERT INTO {} ({}) VALUES {} RETURNING {}",
                qualified_table(schema, table.name),
                col_list,
                tuples.join(", "),
                quoted(ID)
            );
            q
        })
        .collect()
}
