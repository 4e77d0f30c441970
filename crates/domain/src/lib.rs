//! Domain models for the Searchlight hybrid search core.
//!
//! Pure data and validation: the filter AST, the query union, page cursors,
//! response models, and the entity records consumed by the traversers.
//! Nothing in this crate talks to a database or network.

#![forbid(unsafe_code)]

/// Page cursor encoding for keyset pagination.
pub mod cursor;
/// Entity records handed to the indexing traversers.
pub mod entity;
/// Recursive boolean filter tree with typed leaf conditions.
pub mod filter;
/// Storage record for the flat search index.
pub mod index;
/// Discriminated query union and grouping/aggregation descriptors.
pub mod query;
/// Search and aggregation response models with highlight computation.
pub mod results;

pub use cursor::PageCursor;
pub use entity::{
    DomainEntity, ProcessRecord, ProductBlockDefinition, ProductRecord, ProductSummary,
    SubscriptionRecord, SubscriptionSummary, WorkflowRecord,
};
pub use filter::{
    CompareOp, DateRange, EqualityOp, FilterCondition, FilterOp, FilterTree, GroupOp, LtreeOp,
    NumericRange, NumericValue, PathFilter, StringOp, operators_for,
};
pub use index::IndexRow;
pub use query::{
    AggregateQuery, Aggregation, CountQuery, ExportQuery, OrderBy, OrderDirection, Query,
    QueryState, RetrieverType, SelectQuery, TemporalGrouping, TemporalPeriod, field_to_alias,
};
pub use results::{
    AggregationResponse, AggregationResult, MAX_HIGHLIGHT_DISPLAY_LENGTH, MatchingField,
    SearchMetadata, SearchResponse, SearchResult, generate_highlight_indices,
    matching_field_from_filters, truncate_around_highlight,
};
