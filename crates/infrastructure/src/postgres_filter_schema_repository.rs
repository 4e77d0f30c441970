use std::collections::BTreeMap;

use async_trait::async_trait;
use searchlight_application::FilterSchemaRepository;
use searchlight_core::{AppError, AppResult, FieldKind};
use sqlx::PgPool;
use tracing::warn;

/// Answers schema questions from the live index table.
#[derive(Clone)]
pub struct PostgresFilterSchemaRepository {
    pool: PgPool,
}

impl PostgresFilterSchemaRepository {
    /// Creates a schema repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilterSchemaRepository for PostgresFilterSchemaRepository {
    async fn field_kind(&self, path: &str) -> AppResult<Option<FieldKind>> {
        let stored: Option<String> = sqlx::query_scalar(
            r#"
            SELECT value_type
            FROM search_index
            WHERE path = ($1)::ltree
            LIMIT 1
            "#,
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to look up field kind of '{path}': {error}"))
        })?;

        stored
            .map(|value| {
                FieldKind::parse(&value).map_err(|error| {
                    AppError::Internal(format!("index row for '{path}' has {error}"))
                })
            })
            .transpose()
    }

    async fn filterable_paths(&self) -> AppResult<BTreeMap<String, FieldKind>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT path::text AS path, value_type
            FROM search_index
            ORDER BY path
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list filterable paths: {error}"))
        })?;

        let mut paths = BTreeMap::new();
        for (path, value_type) in rows {
            match FieldKind::parse(&value_type) {
                Ok(kind) => {
                    paths.insert(path, kind);
                }
                Err(error) => warn!(%path, %error, "skipping path with unknown value type"),
            }
        }
        Ok(paths)
    }

    async fn lquery_is_valid(&self, pattern: &str) -> AppResult<bool> {
        // Dry-cast inside a rolled-back transaction: an invalid pattern
        // aborts only this probe, never a caller's work.
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start lquery probe: {error}"))
        })?;

        let probe = sqlx::query("SELECT ($1)::lquery")
            .bind(pattern)
            .execute(&mut *transaction)
            .await;

        if let Err(error) = transaction.rollback().await {
            warn!(%error, "failed to roll back lquery probe");
        }
        Ok(probe.is_ok())
    }
}
