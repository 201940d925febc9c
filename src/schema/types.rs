//! Static schema descriptors. One `EntitySchema` drives GET, PUT, resolution and dedup for an entity.

/// Column storage type. Drives DDL, placeholder casts, body coercion and cell decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Serial,
    Text,
    Int,
    BigInt,
    Float,
    Bool,
    Timestamp,
    Json,
    FloatArray,
    TextArray,
}

impl ColumnType {
    /// PostgreSQL type name used for `$n::type` casts.
    pub fn pg_type(&self) -> &'static str {
        match self {
            ColumnType::Serial | ColumnType::Int => "int4",
            ColumnType::Text => "text",
            ColumnType::BigInt => "int8",
            ColumnType::Float => "float8",
            ColumnType::Bool => "bool",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "jsonb",
            ColumnType::FloatArray => "float8[]",
            ColumnType::TextArray => "text[]",
        }
    }

    /// Type as written in CREATE TABLE.
    pub fn ddl(&self) -> &'static str {
        match self {
            ColumnType::Serial => "SERIAL",
            ColumnType::Text => "TEXT",
            ColumnType::Int => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Bool => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Json => "JSONB",
            ColumnType::FloatArray => "DOUBLE PRECISION[]",
            ColumnType::TextArray => "TEXT[]",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ColumnInfo {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

pub const fn required(name: &'static str, ty: ColumnType) -> ColumnInfo {
    ColumnInfo { name, ty, nullable: false }
}

pub const fn nullable(name: &'static str, ty: ColumnType) -> ColumnInfo {
    ColumnInfo { name, ty, nullable: true }
}

/// Surrogate key, creation and update timestamps are managed by the store, never taken from a body.
pub const ID: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

#[derive(Clone, Copy, Debug)]
pub struct UniqueConstraint {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Clone, Copy, Debug)]
pub struct ForeignKey {
    pub column: &'static str,
    pub table: &'static str,
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnInfo],
    pub unique: Option<UniqueConstraint>,
    pub foreign_keys: &'static [ForeignKey],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns a request may supply: everything except id and the two timestamps.
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns
            .iter()
            .filter(|c| !matches!(c.name, ID | CREATED_AT | UPDATED_AT))
    }

    pub fn has_updated_at(&self) -> bool {
        self.column(UPDATED_AT).is_some()
    }

    /// Writable columns outside the uniqueness constraint; overwritten on conflict.
    pub fn mutable_columns(&self) -> Vec<&ColumnInfo> {
        let key = self.unique.map(|u| u.columns).unwrap_or(&[]);
        self.writable_columns()
            .filter(|c| !key.contains(&c.name))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// `<kind> JOIN table alias ON alias.id = from_alias.from_column`
#[derive(Clone, Copy, Debug)]
pub struct Join {
    pub kind: JoinKind,
    pub table: &'static str,
    pub alias: &'static str,
    pub from_alias: &'static str,
    pub from_column: &'static str,
}

/// One projected output column: `alias.column AS output`.
#[derive(Clone, Copy, Debug)]
pub struct Projection {
    pub alias: &'static str,
    pub column: &'static str,
    pub output: &'static str,
    pub ty: ColumnType,
}

pub const fn proj(alias: &'static str, column: &'static str, output: &'static str, ty: ColumnType) -> Projection {
    Projection { alias, column, output, ty }
}

/// How a filter value for a field is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Text,
    Time,
    Number,
    Bool,
}

/// A filterable field. The first of `keys` present in the filter block is used.
#[derive(Clone, Copy, Debug)]
pub struct FilterField {
    pub keys: &'static [&'static str],
    pub alias: &'static str,
    pub column: &'static str,
    pub kind: FilterKind,
}

pub const fn field(keys: &'static [&'static str], alias: &'static str, column: &'static str, kind: FilterKind) -> FilterField {
    FilterField { keys, alias, column, kind }
}

/// Filter fields read from `filters[key]`, or from `filters` itself when `key` is `None`.
#[derive(Clone, Copy, Debug)]
pub struct FilterBlock {
    pub key: Option<&'static str>,
    pub fields: &'static [FilterField],
}

/// Per-column PUT rule.
#[derive(Clone, Copy, Debug)]
pub struct ValidationRule {
    pub column: &'static str,
    pub required: bool,
    pub allowed: Option<&'static [&'static str]>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Numeric zero is rejected.
    pub nonzero: bool,
}

impl ValidationRule {
    pub const fn required(column: &'static str) -> Self {
        ValidationRule {
            column,
            required: true,
            allowed: None,
            minimum: None,
            maximum: None,
            nonzero: false,
        }
    }

    pub const fn nonzero(self) -> Self {
        ValidationRule { nonzero: true, ..self }
    }

    pub const fn allowed(self, values: &'static [&'static str]) -> Self {
        ValidationRule { allowed: Some(values), ..self }
    }

    pub const fn range(self, minimum: f64, maximum: f64) -> Self {
        ValidationRule {
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..self
        }
    }
}

/// Maps a body field to a filter key of the referenced entity.
#[derive(Clone, Copy, Debug)]
pub struct KeyBinding {
    pub input: &'static str,
    pub filter: &'static str,
    pub kind: FilterKind,
}

/// Where a reference's natural key is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefScope {
    /// Once per request, from the body.
    Body,
    /// Per fact row.
    Row,
}

/// Natural-key reference to another entity, resolved to `column` before writing.
#[derive(Clone, Copy, Debug)]
pub struct Reference {
    pub column: &'static str,
    pub target: &'static str,
    pub keys: &'static [KeyBinding],
    pub scope: RefScope,
    /// When every key is absent the column is written as NULL instead of failing.
    pub optional: bool,
    /// Ordering applied to the lookup; the first row wins.
    pub tie_break: &'static [(&'static str, bool)],
}

#[derive(Clone, Copy, Debug)]
pub enum EntityKind {
    /// Upserted one row per PUT against the table's unique constraint.
    Taxonomy,
    /// Appended. `rows_key` names the body list (a single row when `None`).
    Fact {
        rows_key: Option<&'static str>,
        dedup_key: Option<&'static [&'static str]>,
    },
}

#[derive(Debug)]
pub struct EntitySchema {
    pub request_name: &'static str,
    pub aliases: &'static [&'static str],
    /// Human label used in response messages.
    pub label: &'static str,
    pub table: &'static TableSchema,
    pub alias: &'static str,
    pub joins: &'static [Join],
    /// Empty means every table column under its own name.
    pub projection: &'static [Projection],
    pub filters: &'static [FilterBlock],
    pub rules: &'static [ValidationRule],
    /// `(low, high)` pairs where body[low] must not exceed body[high].
    pub ordered_pairs: &'static [(&'static str, &'static str)],
    pub references: &'static [Reference],
    pub kind: EntityKind,
}

impl EntitySchema {
    /// Output columns as `(alias, column, output, type)`.
    pub fn output_columns(&self) -> Vec<Projection> {
        if self.projection.is_empty() {
            self.table
                .columns
                .iter()
                .map(|c| proj(self.alias, c.name, c.name, c.ty))
                .collect()
        } else {
            self.projection.to_vec()
        }
    }

    pub fn has_output(&self, name: &str) -> bool {
        if self.projection.is_empty() {
            self.table.column(name).is_some()
        } else {
            self.projection.iter().any(|p| p.output == name)
        }
    }

    pub fn is_fact(&self) -> bool {
        matches!(self.kind, EntityKind::Fact { .. })
    }

    pub fn dedup_key(&self) -> Option<&'static [&'static str]> {
        match self.kind {
            EntityKind::Fact { dedup_key, .. } => dedup_key,
            EntityKind::Taxonomy => None,
        }
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.request_name == name || self.aliases.contains(&name)
    }
}
