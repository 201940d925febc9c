//! Descriptor validation: referential integrity between tables, joins, projections and filters.

use super::entities::{entity_by_name, ALL_ENTITIES};
use super::tables::ALL_TABLES;
use super::types::{EntityKind, EntitySchema, TableSchema};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

fn table_by_name(name: &str) -> Option<&'static TableSchema> {
    ALL_TABLES.iter().copied().find(|t| t.name == name)
}

/// Checks every descriptor; returns the first inconsistency found.
pub fn validate_descriptors() -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();
    for entity in ALL_ENTITIES {
        for name in std::iter::once(&entity.request_name).chain(entity.aliases.iter()) {
            if !seen_names.insert(*name) {
                return Err(ConfigError::Validation(format!("duplicate request name: {}", name)));
            }
        }
        validate_entity(entity)?;
    }
    for table in ALL_TABLES {
        validate_table(table)?;
    }
    Ok(())
}

fn validate_table(table: &TableSchema) -> Result<(), ConfigError> {
    if let Some(unique) = &table.unique {
        for col in unique.columns {
            if table.column(col).is_none() {
                return Err(ConfigError::MissingReference {
                    kind: "unique column",
                    id: format!("{}.{}", table.name, col),
                });
            }
        }
    }
    for fk in table.foreign_keys {
        if table.column(fk.column).is_none() || table_by_name(fk.table).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "foreign key",
                id: format!("{}.{} -> {}", table.name, fk.column, fk.table),
            });
        }
    }
    Ok(())
}

fn validate_entity(entity: &EntitySchema) -> Result<(), ConfigError> {
    let mut tables_by_alias: HashMap<&str, &TableSchema> = HashMap::new();
    tables_by_alias.insert(entity.alias, entity.table);
    for join in entity.joins {
        let table = table_by_name(join.table).ok_or_else(|| ConfigError::MissingReference {
            kind: "join table",
            id: join.table.to_string(),
        })?;
        let from = tables_by_alias.get(join.from_alias).ok_or_else(|| ConfigError::MissingReference {
            kind: "join alias",
            id: join.from_alias.to_string(),
        })?;
        if from.column(join.from_column).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "join column",
                id: format!("{}.{}", join.from_alias, join.from_column),
            });
        }
        tables_by_alias.insert(join.alias, table);
    }

    let has_column = |alias: &str, column: &str| {
        tables_by_alias
            .get(alias)
            .map(|t| t.column(column).is_some())
            .unwrap_or(false)
    };

    let mut outputs = HashSet::new();
    for p in entity.output_columns() {
        if !has_column(p.alias, p.column) {
            return Err(ConfigError::MissingReference {
                kind: "projected column",
                id: format!("{}: {}.{}", entity.request_name, p.alias, p.column),
            });
        }
        if !outputs.insert(p.output) {
            return Err(ConfigError::Validation(format!(
                "{}: duplicate output column {}",
                entity.request_name, p.output
            )));
        }
    }
    if !outputs.contains("id") {
        return Err(ConfigError::Validation(format!("{}: projection lacks id", entity.request_name)));
    }

    for block in entity.filters {
        for f in block.fields {
            if !has_column(f.alias, f.column) {
                return Err(ConfigError::MissingReference {
                    kind: "filter column",
                    id: format!("{}: {}.{}", entity.request_name, f.alias, f.column),
                });
            }
        }
    }

    if let EntityKind::Fact { dedup_key: Some(key), .. } = entity.kind {
        if let Some(missing) = key.iter().find(|k| !outputs.contains(*k)) {
            return Err(ConfigError::MissingReference {
                kind: "dedup column",
                id: format!("{}: {}", entity.request_name, missing),
            });
        }
        if !outputs.contains("created_at") {
            return Err(ConfigError::Validation(format!(
                "{}: dedup needs created_at in projection",
                entity.request_name
            )));
        }
    }

    for reference in entity.references {
        if entity.table.column(reference.column).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "reference column",
                id: format!("{}.{}", entity.table.name, reference.column),
            });
        }
        let target = entity_by_name(reference.target).ok_or_else(|| ConfigError::MissingReference {
            kind: "reference target",
            id: reference.target.to_string(),
        })?;
        for (col, _) in reference.tie_break {
            if !target.has_output(col) {
                return Err(ConfigError::MissingReference {
                    kind: "tie-break column",
                    id: format!("{}.{}", target.request_name, col),
                });
            }
        }
        for key in reference.keys {
            let known = target
                .filters
                .iter()
                .filter(|b| b.key.is_none())
                .flat_map(|b| b.fields.iter())
                .any(|f| f.keys.contains(&key.filter) && f.kind == key.kind);
            if !known {
                return Err(ConfigError::MissingReference {
                    kind: "reference filter",
                    id: format!("{}.{}", target.request_name, key.filter),
                });
            }
        }
    }

    for rule in entity.rules {
        let is_fact = entity.is_fact();
        if !is_fact && entity.table.column(rule.column).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "rule column",
                id: format!("{}.{}", entity.table.name, rule.column),
            });
        }
    }
    Ok(())
}
