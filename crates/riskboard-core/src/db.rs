use std::{env, path::Path, sync::Arc, time::Duration};

use libsql::{Builder, Connection, Database as LibSqlDatabase};
use thiserror::Error;

const AUTH_TOKEN_VAR: &str = "LIBSQL_AUTH_TOKEN";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the decision database. Cloning is cheap.
#[derive(Clone)]
pub struct Database {
    inner: Arc<LibSqlDatabase>,
    remote: bool,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to build database: {0}")]
    Build(libsql::Error),
    #[error("failed to open connection: {0}")]
    Connect(libsql::Error),
    #[error("failed to execute statement: {0}")]
    Statement(libsql::Error),
    #[error("missing required {AUTH_TOKEN_VAR} for remote database")]
    MissingAuthToken,
}

impl Database {
    pub async fn new(database_path: &Path) -> Result<Self, DbError> {
        let location = database_path.to_string_lossy().to_string();
        let remote = is_remote(&location);
        let builder_result = if remote {
            let auth_token = env::var(AUTH_TOKEN_VAR)
                .ok()
                .filter(|token| !token.is_empty())
                .ok_or(DbError::MissingAuthToken)?;
            Builder::new_remote(location, auth_token).build().await
        } else {
            Builder::new_local(location).build().await
        };
        let inner = builder_result.map_err(DbError::Build)?;

        Ok(Self {
            inner: Arc::new(inner),
            remote,
        })
    }

    /// Open a connection with foreign key enforcement. Local databases also get
    /// a busy timeout so concurrent writers queue instead of failing.
    pub async fn connection(&self) -> Result<Connection, DbError> {
        let conn = self.inner.connect().map_err(DbError::Connect)?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(DbError::Statement)?;
        if !self.remote {
            conn.busy_timeout(BUSY_TIMEOUT)
                .map_err(DbError::Statement)?;
        }
        Ok(conn)
    }

    pub async fn health_check(&self) -> Result<(), DbError> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query("SELECT 1", ())
            .await
            .map_err(DbError::Statement)?;
        rows.next().await.map_err(DbError::Statement)?;
        Ok(())
    }
}

fn is_remote(location: &str) -> bool {
    ["libsql://", "http://", "https://"]
        .iter()
        .any(|scheme| location.starts_with(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    #[tokio::test]
    async fn connection_enables_foreign_keys() {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(&dir.path().join("db.sqlite"))
            .await
            .expect("create db");
        let conn = db.connection().await.expect("open connection");
        let mut rows = conn
            .query("PRAGMA foreign_keys", ())
            .await
            .expect("query pragma");
        let value: i64 = rows
            .next()
            .await
            .expect("row present")
            .expect("row")
            .get(0)
            .expect("get value");
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn health_check_runs_simple_query() {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(&dir.path().join("db.sqlite"))
            .await
            .expect("create db");
        db.health_check().await.expect("health check passes");
    }

    #[test]
    fn remote_schemes_are_detected() {
        assert!(is_remote("libsql://riskboard.turso.io"));
        assert!(is_remote("https://example.com/db"));
        assert!(!is_remote("/var/lib/riskboard/db.sqlite"));
    }

    #[tokio::test]
    async fn remote_missing_auth_token_errors() {
        let _guard = ENV_LOCK.lock().expect("lock env");
        unsafe { env::remove_var(AUTH_TOKEN_VAR) };
        match Database::new(Path::new("libsql://example.com/db")).await {
            Ok(_) => panic!("remote db should require auth token"),
            Err(DbError::MissingAuthToken) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
