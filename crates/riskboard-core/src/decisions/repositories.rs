use chrono::{DateTime, Utc};
use libsql::{Row, TransactionBehavior, params};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::constants::{AUTO_ASSIGNED, AUTOMATION_ROLE, OVERALL_COMMENT_TYPE};
use crate::db::{Database, DbError};
use crate::packages::repository::now_rfc3339;

use super::types::{AuditLogEntry, AutoDecision, AutoDecisionOutcome, Comment, NewComment};

const COMMENT_COLUMNS: &str =
    "id, package_name, user_name, user_role, comment, comment_type, added_on";
const AUDIT_LOG_COLUMNS: &str = "id, package_name, event, message, created_at";

/// `audit_log.event` for engine decisions.
pub const AUTO_DECISION_EVENT: &str = "auto_decision";

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("comment not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("audit log entry not found: {0}")]
    NotFound(String),
}

#[derive(Clone)]
pub struct CommentRepository {
    db: Database,
}

impl CommentRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, new_comment: NewComment) -> Result<Comment, CommentError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO comments (id, package_name, user_name, user_role, comment, comment_type, added_on)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     RETURNING {COMMENT_COLUMNS}"
                ),
                params![
                    id,
                    new_comment.package_name,
                    new_comment.user_name,
                    new_comment.user_role,
                    new_comment.comment,
                    new_comment.comment_type,
                    now_rfc3339()
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_comment(row),
            None => Err(CommentError::NotFound("insert failed".into())),
        }
    }

    /// Comments on `package`, oldest first.
    pub async fn list_for_package(&self, package: &str) -> Result<Vec<Comment>, CommentError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COMMENT_COLUMNS} FROM comments
                     WHERE package_name = ?1
                     ORDER BY added_on, rowid"
                ),
                params![package],
            )
            .await?;

        let mut comments = Vec::new();
        while let Some(row) = rows.next().await? {
            comments.push(row_to_comment(row)?);
        }
        Ok(comments)
    }
}

#[derive(Clone)]
pub struct AuditLogRepository {
    db: Database,
}

impl AuditLogRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn append(
        &self,
        package: Option<&str>,
        event: &str,
        message: &str,
    ) -> Result<AuditLogEntry, AuditError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO audit_log (id, package_name, event, message, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     RETURNING {AUDIT_LOG_COLUMNS}"
                ),
                params![id, package, event, message, now_rfc3339()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_audit_entry(row),
            None => Err(AuditError::NotFound("insert failed".into())),
        }
    }

    pub async fn list_for_package(&self, package: &str) -> Result<Vec<AuditLogEntry>, AuditError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {AUDIT_LOG_COLUMNS} FROM audit_log
                     WHERE package_name = ?1
                     ORDER BY created_at, rowid"
                ),
                params![package],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_audit_entry(row)?);
        }
        Ok(entries)
    }

    pub async fn list_by_event(&self, event: &str) -> Result<Vec<AuditLogEntry>, AuditError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {AUDIT_LOG_COLUMNS} FROM audit_log
                     WHERE event = ?1
                     ORDER BY created_at, rowid"
                ),
                params![event],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_audit_entry(row)?);
        }
        Ok(entries)
    }

    /// Write an engine decision together with its comment and audit row.
    ///
    /// The decision only lands on a package that is still undecided; when the
    /// conditional update misses, the transaction is rolled back and
    /// [`AutoDecisionOutcome::AlreadyDecided`] is returned.
    pub async fn record_auto_decision(
        &self,
        decision: &AutoDecision,
    ) -> Result<AutoDecisionOutcome, AuditError> {
        let now = now_rfc3339();
        let conn = self.db.connection().await?;
        // Take the write lock up front so concurrent recorders queue on the
        // busy timeout instead of failing on lock upgrade.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;

        let result = async {
            let updated = tx
                .execute(
                    "UPDATE packages
                     SET decision_id = ?1, decision_by = ?2, decision_date = ?3, updated_at = ?3
                     WHERE name = ?4 AND decision_id IS NULL",
                    params![
                        decision.decision_id,
                        AUTO_ASSIGNED,
                        now.clone(),
                        decision.package_name.clone()
                    ],
                )
                .await?;
            if updated == 0 {
                return Ok(AutoDecisionOutcome::AlreadyDecided);
            }

            tx.execute(
                "INSERT INTO comments (id, package_name, user_name, user_role, comment, comment_type, added_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    decision.package_name.clone(),
                    AUTO_ASSIGNED,
                    AUTOMATION_ROLE,
                    decision.comment.clone(),
                    OVERALL_COMMENT_TYPE,
                    now.clone()
                ],
            )
            .await?;

            tx.execute(
                "INSERT INTO audit_log (id, package_name, event, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    decision.package_name.clone(),
                    AUTO_DECISION_EVENT,
                    decision.audit_message.clone(),
                    now.clone()
                ],
            )
            .await?;

            Ok::<_, libsql::Error>(AutoDecisionOutcome::Recorded)
        }
        .await;

        match result {
            Ok(AutoDecisionOutcome::Recorded) => {
                tx.commit().await?;
                Ok(AutoDecisionOutcome::Recorded)
            }
            Ok(AutoDecisionOutcome::AlreadyDecided) => {
                tx.rollback().await?;
                Ok(AutoDecisionOutcome::AlreadyDecided)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, package = %decision.package_name, "rollback after failed auto decision failed");
                }
                Err(err.into())
            }
        }
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn row_to_comment(row: Row) -> Result<Comment, CommentError> {
    let added_on: String = row.get(6)?;
    Ok(Comment {
        id: row.get(0)?,
        package_name: row.get(1)?,
        user_name: row.get(2)?,
        user_role: row.get(3)?,
        comment: row.get(4)?,
        comment_type: row.get(5)?,
        added_on: parse_timestamp(&added_on)?,
    })
}

fn row_to_audit_entry(row: Row) -> Result<AuditLogEntry, AuditError> {
    let created_at: String = row.get(4)?;
    Ok(AuditLogEntry {
        id: row.get(0)?,
        package_name: row.get(1)?,
        event: row.get(2)?,
        message: row.get(3)?,
        created_at: parse_timestamp(&created_at)?,
    })
}
