use std::collections::HashSet;

use libsql::{Connection, params};
use thiserror::Error;

use crate::db::{Database, DbError};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: "001_initial",
    sql: include_str!("../../../migrations/001_initial.sql"),
}];

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("migration {version} failed: {source}")]
    Apply {
        version: &'static str,
        source: libsql::Error,
    },
    #[error("sql error: {0}")]
    LibSql(#[from] libsql::Error),
}

async fn applied_versions(conn: &Connection) -> Result<HashSet<String>, MigrationError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
        (),
    )
    .await?;

    let mut applied = HashSet::new();
    let mut rows = conn
        .query("SELECT version FROM schema_migrations", ())
        .await?;
    while let Some(row) = rows.next().await? {
        applied.insert(row.get::<String>(0)?);
    }
    Ok(applied)
}

async fn apply_migrations(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<(), MigrationError> {
    let applied = applied_versions(conn).await?;

    for migration in migrations
        .iter()
        .filter(|migration| !applied.contains(migration.version))
    {
        let tx = conn.transaction().await?;
        let result = async {
            tx.execute_batch(migration.sql).await?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))",
                params![migration.version],
            )
            .await
        }
        .await;

        match result {
            Ok(_) => tx.commit().await?,
            Err(source) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(version = migration.version, error = %rollback_err, "rollback of failed migration failed");
                }
                return Err(MigrationError::Apply {
                    version: migration.version,
                    source,
                });
            }
        }
        tracing::info!(version = migration.version, "applied migration");
    }

    Ok(())
}

pub async fn run_migrations(db: &Database) -> Result<(), MigrationError> {
    let conn = db.connection().await?;
    apply_migrations(&conn, MIGRATIONS).await
}
