use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Row, params};
use serde_json::Value;
use thiserror::Error;

use crate::db::{Database, DbError};

use super::types::{AssessmentBundle, MetricValue, NewPackage, PackageDecisionState};

const STATE_COLUMNS: &str = "p.name, p.score, p.decision_id, c.decision, p.decision_by, p.decision_date";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("package not found: {0}")]
    NotFound(String),
}

/// Read side of the metric collection pipeline.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Aggregate risk score; `None` when the package has not been scored.
    async fn package_score(&self, package: &str) -> Result<Option<f64>, PackageError>;

    async fn assessment_bundle(&self, package: &str) -> Result<AssessmentBundle, PackageError>;
}

#[derive(Clone)]
pub struct PackageRepository {
    db: Database,
}

impl PackageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a package or refresh its version and score. Decision columns are
    /// never touched here.
    pub async fn upsert(&self, package: NewPackage) -> Result<PackageDecisionState, PackageError> {
        let now = now_rfc3339();
        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO packages (name, version, score, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(name) DO UPDATE SET
                version = excluded.version,
                score = excluded.score,
                updated_at = excluded.updated_at",
            params![package.name.clone(), package.version, package.score, now],
        )
        .await?;

        self.get_state(&package.name).await
    }

    pub async fn set_metric(
        &self,
        package: &str,
        metric: &str,
        value: &Value,
    ) -> Result<(), PackageError> {
        let value_json = serde_json::to_string(value)?;
        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO package_metrics (package_name, metric_name, value_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(package_name, metric_name) DO UPDATE SET value_json = excluded.value_json",
            params![package, metric, value_json],
        )
        .await?;
        Ok(())
    }

    pub async fn get_state(&self, package: &str) -> Result<PackageDecisionState, PackageError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {STATE_COLUMNS}
                     FROM packages p
                     LEFT JOIN decision_categories c ON c.id = p.decision_id
                     WHERE p.name = ?1"
                ),
                params![package],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_state(row),
            None => Err(PackageError::NotFound(package.to_string())),
        }
    }

    /// Names of packages without a decision, in name order.
    pub async fn list_undecided(&self) -> Result<Vec<String>, PackageError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT name FROM packages WHERE decision_id IS NULL ORDER BY name",
                (),
            )
            .await?;

        let mut names = Vec::new();
        while let Some(row) = rows.next().await? {
            names.push(row.get::<String>(0)?);
        }
        Ok(names)
    }

    /// Reviewer decision. Unlike automated assignment this may overwrite or clear
    /// an existing decision.
    pub async fn set_manual_decision(
        &self,
        package: &str,
        decision_id: Option<i64>,
        reviewer: &str,
    ) -> Result<PackageDecisionState, PackageError> {
        let now = now_rfc3339();
        let conn = self.db.connection().await?;
        let updated = conn
            .execute(
                "UPDATE packages
                 SET decision_id = ?1, decision_by = ?2, decision_date = ?3, updated_at = ?3
                 WHERE name = ?4",
                params![decision_id, reviewer, now, package],
            )
            .await?;
        if updated == 0 {
            return Err(PackageError::NotFound(package.to_string()));
        }
        self.get_state(package).await
    }
}

#[async_trait]
impl MetricSource for PackageRepository {
    async fn package_score(&self, package: &str) -> Result<Option<f64>, PackageError> {
        Ok(self.get_state(package).await?.score)
    }

    async fn assessment_bundle(&self, package: &str) -> Result<AssessmentBundle, PackageError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT metric_name, value_json FROM package_metrics WHERE package_name = ?1",
                params![package],
            )
            .await?;

        let mut bundle = AssessmentBundle::new();
        while let Some(row) = rows.next().await? {
            let metric: String = row.get(0)?;
            let value_json: String = row.get(1)?;
            let value: Value = serde_json::from_str(&value_json)?;
            bundle.insert(metric, MetricValue::from_json(&value));
        }
        Ok(bundle)
    }
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_state(row: Row) -> Result<PackageDecisionState, PackageError> {
    let decision_date: Option<String> = row.get(5)?;
    let decision_date = decision_date
        .map(|value| DateTime::parse_from_rfc3339(&value).map(|dt| dt.with_timezone(&Utc)))
        .transpose()?;

    Ok(PackageDecisionState {
        package_name: row.get(0)?,
        score: row.get(1)?,
        decision_id: row.get(2)?,
        decision: row.get(3)?,
        decision_by: row.get(4)?,
        decision_date,
    })
}
