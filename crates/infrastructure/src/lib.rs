//! Infrastructure adapters for the Searchlight hybrid search core.
//!
//! PostgreSQL repositories over the flat `search_index` table (candidate,
//! pivot and ranking CTEs compiled as parameterized SQL), the
//! OpenAI-compatible embedder, the tiktoken tokenizer, and an in-memory
//! subscription model registry for tests and demos.
//!
//! The database is expected to have the `ltree`, `pg_trgm`, `vector`,
//! `unaccent` and `pgcrypto` extensions installed and the index table
//! bootstrapped with its GIST (path), GIN (value trigram), HNSW
//! (embedding) and btree (content hash) indexes; schema setup lives with
//! the deployment, not in this crate.

#![forbid(unsafe_code)]

/// In-memory subscription model registry.
pub mod in_memory_model_registry;
/// OpenAI-compatible embeddings client.
pub mod openai_embedder;
/// Schema questions answered from the index table.
pub mod postgres_filter_schema_repository;
/// Differential writes to the index table.
pub mod postgres_index_repository;
/// Persisted query state for pagination.
pub mod postgres_query_state_repository;
/// Compiled searches and aggregations.
pub mod postgres_search_repository;
/// cl100k token counting.
pub mod tiktoken_tokenizer;

pub use in_memory_model_registry::InMemoryModelRegistry;
pub use openai_embedder::{OpenAiEmbedder, OpenAiEmbedderConfig};
pub use postgres_filter_schema_repository::PostgresFilterSchemaRepository;
pub use postgres_index_repository::PostgresIndexRepository;
pub use postgres_query_state_repository::PostgresQueryStateRepository;
pub use postgres_search_repository::PostgresSearchRepository;
pub use tiktoken_tokenizer::TiktokenTokenizer;
