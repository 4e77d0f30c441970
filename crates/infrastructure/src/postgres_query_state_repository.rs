use async_trait::async_trait;
use searchlight_application::QueryStateRepository;
use searchlight_core::{AppError, AppResult};
use searchlight_domain::{Query, QueryState};
use uuid::Uuid;

use sqlx::PgPool;

/// Persists query state in `search_queries`, optionally attached to an
/// agent run.
#[derive(Clone)]
pub struct PostgresQueryStateRepository {
    pool: PgPool,
}

impl PostgresQueryStateRepository {
    /// Creates a query state repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates an agent run record and returns its id.
    pub async fn create_run(&self, agent_type: &str) -> AppResult<Uuid> {
        sqlx::query_scalar(
            r#"
            INSERT INTO agent_runs (run_id, agent_type, created_at)
            VALUES (gen_random_uuid(), $1, now())
            RETURNING run_id
            "#,
        )
        .bind(agent_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to create agent run '{agent_type}': {error}"))
        })
    }

    /// Saves query state under an agent run with an explicit sequence
    /// number.
    pub async fn save_for_run(
        &self,
        run_id: Uuid,
        query_number: i32,
        state: &QueryState,
    ) -> AppResult<Uuid> {
        self.insert(Some(run_id), query_number, state).await
    }

    async fn insert(
        &self,
        run_id: Option<Uuid>,
        query_number: i32,
        state: &QueryState,
    ) -> AppResult<Uuid> {
        let parameters = serde_json::to_value(&state.parameters).map_err(|error| {
            AppError::Internal(format!("failed to serialize query parameters: {error}"))
        })?;

        sqlx::query_scalar(
            r#"
            INSERT INTO search_queries
                (query_id, run_id, query_number, parameters, query_embedding, executed_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, now())
            RETURNING query_id
            "#,
        )
        .bind(run_id)
        .bind(query_number)
        .bind(parameters)
        .bind(state.query_embedding.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save query state: {error}")))
    }
}

#[async_trait]
impl QueryStateRepository for PostgresQueryStateRepository {
    async fn save(&self, state: &QueryState) -> AppResult<Uuid> {
        self.insert(None, 1, state).await
    }

    async fn load(&self, query_id: Uuid) -> AppResult<QueryState> {
        let row: Option<(serde_json::Value, Option<Vec<f32>>)> = sqlx::query_as(
            r#"
            SELECT parameters, query_embedding
            FROM search_queries
            WHERE query_id = $1
            "#,
        )
        .bind(query_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load query state '{query_id}': {error}"))
        })?;

        let Some((parameters, query_embedding)) = row else {
            return Err(AppError::QueryStateNotFound(query_id));
        };

        let parameters: Query = serde_json::from_value(parameters).map_err(|error| {
            AppError::InvalidCursor(format!(
                "persisted query state '{query_id}' no longer deserializes ({error}); restart from the first page"
            ))
        })?;

        Ok(QueryState {
            parameters,
            query_embedding,
        })
    }
}
