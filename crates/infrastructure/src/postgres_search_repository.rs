mod aggregation;
mod candidate;
mod filters;
mod retrievers;
pub(crate) mod sql;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use searchlight_application::{SearchConfig, SearchHit, SearchPlan, SearchRepository};
use searchlight_core::{AppError, AppResult};
use searchlight_domain::{AggregateQuery, AggregationResult, CountQuery};
use sqlx::{FromRow, PgPool};

use self::sql::apply_binds_as;

/// PostgreSQL-backed search execution over the flat index table.
///
/// Holds no per-request state; every call compiles a parameterized
/// statement and executes it on the shared pool.
#[derive(Clone)]
pub struct PostgresSearchRepository {
    pool: PgPool,
    config: SearchConfig,
}

impl PostgresSearchRepository {
    /// Creates a search repository with the provided pool and config.
    #[must_use]
    pub fn new(pool: PgPool, config: SearchConfig) -> Self {
        Self { pool, config }
    }
}

#[derive(Debug, FromRow)]
struct SearchHitRow {
    entity_id: String,
    entity_title: Option<String>,
    score: Decimal,
    highlight_text: Option<String>,
    highlight_path: Option<String>,
    perfect_match: i32,
}

#[async_trait]
impl SearchRepository for PostgresSearchRepository {
    async fn search(&self, plan: &SearchPlan) -> AppResult<Vec<SearchHit>> {
        let statement = retrievers::build_search_statement(plan, &self.config)?;

        let rows = apply_binds_as(
            sqlx::query_as::<_, SearchHitRow>(&statement.sql),
            &statement.binds,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to execute {} search for entity type '{}': {error}",
                statement.label,
                plan.entity_type
            ))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                entity_id: row.entity_id,
                entity_title: row.entity_title,
                score: row.score.to_f64().unwrap_or_default(),
                highlight_text: row.highlight_text,
                highlight_path: row.highlight_path,
                perfect_match: row.perfect_match,
            })
            .collect())
    }

    async fn count(&self, query: &CountQuery) -> AppResult<Vec<AggregationResult>> {
        aggregation::execute_count(&self.pool, query).await
    }

    async fn aggregate(&self, query: &AggregateQuery) -> AppResult<Vec<AggregationResult>> {
        aggregation::execute_aggregate(&self.pool, query).await
    }
}
