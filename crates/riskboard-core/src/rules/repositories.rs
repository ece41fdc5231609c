use libsql::{Row, params};
use thiserror::Error;
use tracing::warn;

use crate::db::{Database, DbError};
use crate::packages::repository::now_rfc3339;

use super::types::{NewDecisionRule, RuleKind, StoredRule};

const RULE_COLUMNS: &str = "id, position, rule_type, metric, condition, decision";

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("decision rule not found: {0}")]
    NotFound(String),
}

#[derive(Clone)]
pub struct DecisionRuleRepository {
    db: Database,
}

impl DecisionRuleRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Rules in evaluation order.
    pub async fn list_all(&self) -> Result<Vec<StoredRule>, RuleError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM decision_rules ORDER BY position, id"),
                (),
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            rules.push(row_to_rule(row)?);
        }
        Ok(rules)
    }

    /// Append a rule after the current last position.
    pub async fn create(&self, rule: NewDecisionRule) -> Result<StoredRule, RuleError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO decision_rules (position, rule_type, metric, condition, decision, created_at)
                     VALUES ((SELECT COALESCE(MAX(position), 0) + 1 FROM decision_rules), ?1, ?2, ?3, ?4, ?5)
                     RETURNING {RULE_COLUMNS}"
                ),
                params![
                    rule.kind.as_str(),
                    rule.metric,
                    rule.condition,
                    rule.decision,
                    now_rfc3339()
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_rule(row),
            None => Err(RuleError::NotFound("insert failed".into())),
        }
    }

    /// Swap the whole table for `rules`, numbered from 1 in list order.
    /// Either every row is replaced or none is.
    pub async fn replace_all(&self, rules: &[NewDecisionRule]) -> Result<Vec<StoredRule>, RuleError> {
        let conn = self.db.connection().await?;
        let tx = conn.transaction().await?;
        let now = now_rfc3339();

        let result = async {
            tx.execute("DELETE FROM decision_rules", ()).await?;
            for (index, rule) in rules.iter().enumerate() {
                tx.execute(
                    "INSERT INTO decision_rules (position, rule_type, metric, condition, decision, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        index as i64 + 1,
                        rule.kind.as_str(),
                        rule.metric.clone(),
                        rule.condition.clone(),
                        rule.decision.clone(),
                        now.clone()
                    ],
                )
                .await?;
            }
            Ok::<_, libsql::Error>(())
        }
        .await;

        match result {
            Ok(()) => tx.commit().await?,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed rule table replacement failed");
                }
                return Err(err.into());
            }
        }

        self.list_all().await
    }
}

fn row_to_rule(row: Row) -> Result<StoredRule, RuleError> {
    let rule_type: String = row.get(2)?;
    Ok(StoredRule {
        id: row.get(0)?,
        position: row.get(1)?,
        kind: RuleKind::from_str(&rule_type),
        metric: row.get(3)?,
        condition: row.get(4)?,
        decision: row.get(5)?,
    })
}
