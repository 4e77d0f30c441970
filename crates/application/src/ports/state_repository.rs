use async_trait::async_trait;
use searchlight_core::AppResult;
use searchlight_domain::QueryState;
use uuid::Uuid;

/// Port persisting query state for consistent pagination.
#[async_trait]
pub trait QueryStateRepository: Send + Sync {
    /// Saves the state of a first-page query and returns its id.
    async fn save(&self, state: &QueryState) -> AppResult<Uuid>;

    /// Loads previously saved state.
    ///
    /// Returns [`searchlight_core::AppError::QueryStateNotFound`] when the
    /// state has been garbage-collected.
    async fn load(&self, query_id: Uuid) -> AppResult<QueryState>;
}
