mod embedder;
mod export_repository;
mod index_repository;
mod model_registry;
mod schema_repository;
mod search_repository;
mod state_repository;
mod tokenizer;

pub use embedder::Embedder;
pub use export_repository::ExportRepository;
pub use index_repository::IndexRepository;
pub use model_registry::SubscriptionModelRegistry;
pub use schema_repository::FilterSchemaRepository;
pub use search_repository::{RetrieverPlan, ScoreCursor, SearchHit, SearchPlan, SearchRepository};
pub use state_repository::QueryStateRepository;
pub use tokenizer::Tokenizer;
