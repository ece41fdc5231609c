use libsql::{Row, params};
use thiserror::Error;

use crate::db::{Database, DbError};

use super::colors::{ColorError, Rgb};
use super::types::{CategoryRegistry, DecisionCategory, NewDecisionCategory};

const CATEGORY_COLUMNS: &str = "id, decision, color, lower_limit, upper_limit";

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("invalid color for category {name}: {source}")]
    InvalidColor { name: String, source: ColorError },
    #[error("decision category not found: {0}")]
    NotFound(String),
}

#[derive(Clone)]
pub struct DecisionCategoryRepository {
    db: Database,
}

impl DecisionCategoryRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        new_category: NewDecisionCategory,
    ) -> Result<DecisionCategory, CategoryError> {
        Rgb::parse(&new_category.color).map_err(|source| CategoryError::InvalidColor {
            name: new_category.name.clone(),
            source,
        })?;

        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO decision_categories (decision, color, lower_limit, upper_limit)
                     VALUES (?1, ?2, ?3, ?4)
                     RETURNING {CATEGORY_COLUMNS}"
                ),
                params![
                    new_category.name,
                    new_category.color,
                    new_category.lower_limit,
                    new_category.upper_limit
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_category(row),
            None => Err(CategoryError::NotFound("insert failed".into())),
        }
    }

    /// All categories in table order.
    pub async fn list_all(&self) -> Result<Vec<DecisionCategory>, CategoryError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {CATEGORY_COLUMNS} FROM decision_categories ORDER BY id"),
                (),
            )
            .await?;

        let mut categories = Vec::new();
        while let Some(row) = rows.next().await? {
            categories.push(row_to_category(row)?);
        }
        Ok(categories)
    }

    pub async fn load_registry(&self) -> Result<CategoryRegistry, CategoryError> {
        Ok(CategoryRegistry::new(self.list_all().await?))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<DecisionCategory, CategoryError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {CATEGORY_COLUMNS} FROM decision_categories WHERE decision = ?1"),
                params![name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_category(row),
            None => Err(CategoryError::NotFound(name.to_string())),
        }
    }
}

fn row_to_category(row: Row) -> Result<DecisionCategory, CategoryError> {
    Ok(DecisionCategory {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        lower_limit: row.get(3)?,
        upper_limit: row.get(4)?,
    })
}
