//! Application services and ports for the Searchlight hybrid search core.
//!
//! The indexing pipeline and the query engine live here, expressed against
//! ports implemented by the infrastructure crate: repositories, the
//! embedder, the tokenizer, and the subscription model registry.

#![forbid(unsafe_code)]

/// Explicit configuration passed at construction.
pub mod config;
/// Chunked differential indexing pipeline.
pub mod index_service;
/// Ports implemented by infrastructure.
pub mod ports;
/// Query validation, retriever routing and result formatting.
pub mod query_service;
/// Entity traversal into extracted fields.
pub mod traverse;

pub use config::SearchConfig;
pub use index_service::{IndexOptions, IndexService};
pub use ports::{
    Embedder, ExportRepository, FilterSchemaRepository, IndexRepository, QueryStateRepository,
    RetrieverPlan, ScoreCursor, SearchHit, SearchPlan, SearchRepository,
    SubscriptionModelRegistry, Tokenizer,
};
pub use query_service::QueryService;
pub use traverse::{
    EntityConfig, ProcessTraverser, ProductTraverser, SubscriptionTraverser, Traverser,
    TraverserRegistry, WorkflowTraverser,
};
