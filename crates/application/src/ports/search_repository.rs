use async_trait::async_trait;
use searchlight_core::{AppResult, EntityType};
use searchlight_domain::{AggregateQuery, AggregationResult, CountQuery, FilterTree};

/// Keyset position within a score-ordered result stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCursor {
    /// Score of the last returned row; quantized before comparison.
    pub score: f64,
    /// Entity id of the last returned row.
    pub entity_id: String,
}

/// The ranking strategy a search executes with, carrying exactly the
/// inputs that strategy needs.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrieverPlan {
    /// Constant scores, ordered by entity id.
    Structured {
        /// Resume after this entity id.
        after_id: Option<String>,
    },
    /// Trigram word-similarity ranking.
    Fuzzy {
        /// The fuzzy search term.
        term: String,
        /// Resume after this score/id pair.
        cursor: Option<ScoreCursor>,
    },
    /// Vector-distance ranking.
    Semantic {
        /// The query embedding.
        vector: Vec<f32>,
        /// Resume after this score/id pair.
        cursor: Option<ScoreCursor>,
    },
    /// Reciprocal rank fusion of semantic and fuzzy ranking.
    Hybrid {
        /// The query embedding.
        vector: Vec<f32>,
        /// The fuzzy search term.
        term: String,
        /// Resume after this score/id pair.
        cursor: Option<ScoreCursor>,
    },
}

/// A compiled-and-routed search ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    /// Entity type to search.
    pub entity_type: EntityType,
    /// Normalized structured filters.
    pub filters: Option<FilterTree>,
    /// Selected ranking strategy.
    pub retriever: RetrieverPlan,
    /// Rows to fetch; the engine asks for one more than the page limit.
    pub fetch_limit: u32,
}

/// One raw row returned by a retriever, ordered by
/// `(score DESC NULLS LAST, entity_id ASC)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Entity id as a string.
    pub entity_id: String,
    /// Display title of the entity, when indexed.
    pub entity_title: Option<String>,
    /// Quantized ranking score.
    pub score: f64,
    /// Value of the best-matching row, for highlighting.
    pub highlight_text: Option<String>,
    /// Path of the best-matching row.
    pub highlight_path: Option<String>,
    /// 1 when the fuzzy score cleared the perfect-match threshold.
    pub perfect_match: i32,
}

/// Port executing compiled searches and aggregations against the index.
#[async_trait]
pub trait SearchRepository: Send + Sync {
    /// Executes a search plan, returning at most `fetch_limit` hits in the
    /// retriever's total order.
    async fn search(&self, plan: &SearchPlan) -> AppResult<Vec<SearchHit>>;

    /// Executes a COUNT query; ungrouped counts return a single row with a
    /// `total_count` aggregation.
    async fn count(&self, query: &CountQuery) -> AppResult<Vec<AggregationResult>>;

    /// Executes an AGGREGATE query over the pivoted candidate set.
    async fn aggregate(&self, query: &AggregateQuery) -> AppResult<Vec<AggregationResult>>;
}
