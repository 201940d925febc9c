//! DDL for the metrics schema: tables, named uniqueness constraints and foreign keys.
//! Tables are created in dependency order; every statement is idempotent.

use crate::error::AppError;
use crate::schema::{TableSchema, ALL_TABLES, ID};
use sqlx::PgPool;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// CREATE TABLE IF NOT EXISTS for one table, including its unique constraint and foreign keys.
pub fn create_table_sql(schema: &str, table: &TableSchema) -> String {
    let full_name = format!("{}.{}", quote(schema), quote(table.name));
    let mut col_defs: Vec<String> = Vec::new();
    for c in table.columns {
        let mut def = format!("{} {}", quote(c.name), c.ty.ddl());
        if !c.nullable {
            def.push_str(" NOT NULL");
        }
        col_defs.push(def);
    }
    col_defs.push(format!("PRIMARY KEY ({})", quote(ID)));

    if let Some(u) = &table.unique {
        let cols: Vec<String> = u.columns.iter().map(|s| quote(s)).collect();
        // NULLS NOT DISTINCT so nullable key columns still collide on upsert.
        col_defs.push(format!(
            "CONSTRAINT {} UNIQUE NULLS NOT DISTINCT ({})",
            quote(u.name),
            cols.join(", ")
        ));
    }
    for fk in table.foreign_keys {
        col_defs.push(format!(
            "FOREIGN KEY ({}) REFERENCES {}.{} ({})",
            quote(fk.column),
            quote(schema),
            quote(fk.table),
            quote(ID)
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        full_name,
        col_defs.join(",\n  ")
    )
}

/// Create the schema and every table if missing.
pub async fn apply_migrations(pool: &PgPool, schema: &str) -> Result<(), AppError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote(schema)))
        .execute(pool)
        .await?;
    for table in ALL_TABLES {
        let sql = create_table_sql(schema, table);
        tracing::debug!(table = table.name, "ensure table");
        sqlx::query(&sql).execute(pool).await?;
    }
    tracing::info!(schema = %schema, tables = ALL_TABLES.len(), "migrations applied");
    Ok(())
}
