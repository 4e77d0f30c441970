use std::collections::BTreeMap;
use std::sync::Arc;

use searchlight_core::{AppResult, EntityType, FieldKind, QueryValidationError};
use searchlight_domain::{
    AggregateQuery, AggregationResponse, CountQuery, ExportQuery, FilterCondition, FilterTree,
    LtreeOp, MAX_HIGHLIGHT_DISPLAY_LENGTH, MatchingField, PageCursor, PathFilter, Query,
    QueryState, RetrieverType, SearchMetadata, SearchResponse, SearchResult, SelectQuery,
    generate_highlight_indices, matching_field_from_filters, operators_for,
    truncate_around_highlight,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::ports::{
    Embedder, ExportRepository, FilterSchemaRepository, QueryStateRepository, RetrieverPlan,
    ScoreCursor, SearchHit, SearchPlan, SearchRepository,
};

/// Executes validated queries against the search index.
///
/// The engine is strict: a bad query fails fast before compilation. It
/// validates filters against the index schema, routes to a retriever,
/// fetches one row past the page limit to detect further pages, and
/// formats raw hits into responses with highlights.
pub struct QueryService {
    search_repository: Arc<dyn SearchRepository>,
    schema_repository: Arc<dyn FilterSchemaRepository>,
    state_repository: Arc<dyn QueryStateRepository>,
    export_repository: Arc<dyn ExportRepository>,
    embedder: Arc<dyn Embedder>,
}

struct SelectRun<'a> {
    entity_type: EntityType,
    filters: Option<FilterTree>,
    query_text: Option<&'a str>,
    vector_query: Option<&'a str>,
    fuzzy_term: Option<&'a str>,
    retriever_override: Option<RetrieverType>,
    cursor: Option<&'a PageCursor>,
    query_embedding: Option<Vec<f32>>,
    fetch_limit: u32,
}

impl QueryService {
    /// Creates a query engine over the given ports.
    #[must_use]
    pub fn new(
        search_repository: Arc<dyn SearchRepository>,
        schema_repository: Arc<dyn FilterSchemaRepository>,
        state_repository: Arc<dyn QueryStateRepository>,
        export_repository: Arc<dyn ExportRepository>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            search_repository,
            schema_repository,
            state_repository,
            export_repository,
            embedder,
        }
    }

    /// Executes a SELECT query.
    ///
    /// Fetches `limit + 1` rows, sets `has_more` when the extra row came
    /// back, and trims the results to `limit`.
    pub async fn execute_search(
        &self,
        query: &SelectQuery,
        cursor: Option<&PageCursor>,
        query_embedding: Option<Vec<f32>>,
    ) -> AppResult<SearchResponse> {
        query.validate()?;
        let filters = self.prepare_filters(query.entity_type, query.filters.clone()).await?;

        let mut response = self
            .run_select(SelectRun {
                entity_type: query.entity_type,
                filters,
                query_text: query.query_text.as_deref(),
                vector_query: query.vector_query(),
                fuzzy_term: query.fuzzy_term(),
                retriever_override: query.retriever,
                cursor,
                query_embedding,
                fetch_limit: query.limit + 1,
            })
            .await?;

        let has_more = response.results.len() > query.limit as usize;
        response.results.truncate(query.limit as usize);
        response.has_more = has_more;
        Ok(response)
    }

    /// Executes an EXPORT query and returns one flat record per entity.
    pub async fn execute_export(
        &self,
        query: &ExportQuery,
        query_embedding: Option<Vec<f32>>,
    ) -> AppResult<Vec<Map<String, Value>>> {
        query.validate()?;
        let filters = self.prepare_filters(query.entity_type, query.filters.clone()).await?;

        let response = self
            .run_select(SelectRun {
                entity_type: query.entity_type,
                filters,
                query_text: query.query_text.as_deref(),
                vector_query: query.vector_query(),
                fuzzy_term: query.fuzzy_term(),
                retriever_override: query.retriever,
                cursor: None,
                query_embedding,
                fetch_limit: query.limit,
            })
            .await?;

        let entity_ids: Vec<String> = response
            .results
            .iter()
            .map(|result| result.entity_id.clone())
            .collect();
        self.export_repository
            .export_rows(query.entity_type, &entity_ids)
            .await
    }

    /// Executes a COUNT query, grouped or not.
    pub async fn execute_count(&self, query: &CountQuery) -> AppResult<AggregationResponse> {
        query.validate()?;
        let mut query = query.clone();
        query.filters = self.prepare_filters(query.entity_type, query.filters.take()).await?;

        let results = self.search_repository.count(&query).await?;
        Ok(Self::aggregation_response(results, grouping_dimensions(&query)))
    }

    /// Executes an AGGREGATE query.
    pub async fn execute_aggregation(
        &self,
        query: &AggregateQuery,
    ) -> AppResult<AggregationResponse> {
        query.validate()?;
        let mut query = query.clone();
        query.grouping.filters = self
            .prepare_filters(query.grouping.entity_type, query.grouping.filters.take())
            .await?;

        let results = self.search_repository.aggregate(&query).await?;
        Ok(Self::aggregation_response(
            results,
            grouping_dimensions(&query.grouping),
        ))
    }

    /// All filterable paths with their stored kinds, for query builders.
    pub async fn filter_schema(&self) -> AppResult<BTreeMap<String, FieldKind>> {
        self.schema_repository.filterable_paths().await
    }

    /// Decodes a cursor and loads its persisted query state.
    pub async fn resolve_cursor(&self, encoded: &str) -> AppResult<(PageCursor, QueryState)> {
        let cursor = PageCursor::decode(encoded)?;
        let mut state = self.state_repository.load(cursor.query_id).await?;
        state.clamp_limits();
        Ok((cursor, state))
    }

    /// Encodes the cursor of the next page, persisting query state on the
    /// first page so follow-ups rank with identical parameters.
    pub async fn encode_next_page_cursor(
        &self,
        response: &SearchResponse,
        current: Option<&PageCursor>,
        query: &SelectQuery,
    ) -> AppResult<Option<String>> {
        if !response.has_more {
            return Ok(None);
        }
        let Some(last) = response.results.last() else {
            return Ok(None);
        };

        let query_id = match current {
            Some(cursor) => cursor.query_id,
            None => {
                self.state_repository
                    .save(&QueryState {
                        parameters: Query::Select(query.clone()),
                        query_embedding: response.query_embedding.clone(),
                    })
                    .await?
            }
        };

        PageCursor {
            score: last.score,
            id: last.entity_id.clone(),
            query_id,
        }
        .encode()
        .map(Some)
    }

    async fn run_select(&self, run: SelectRun<'_>) -> AppResult<SearchResponse> {
        let has_signals =
            run.vector_query.is_some() || run.fuzzy_term.is_some() || run.filters.is_some();
        if !has_signals {
            warn!("no search criteria provided (vector query, fuzzy term, or filters)");
            return Ok(SearchResponse::empty());
        }

        let mut query_embedding = run.query_embedding;
        if let Some(vector_query) = run.vector_query
            && query_embedding.is_none()
        {
            let embedded = self.embedder.embed_text(vector_query).await?;
            query_embedding = (!embedded.is_empty()).then_some(embedded);
        }

        // A failed vectorization falls back to fuzzy over the full text.
        let fuzzy_term = if query_embedding.is_none() && run.vector_query.is_some() {
            run.query_text
        } else {
            run.fuzzy_term
        };

        let (retriever, metadata) = route_retriever(
            run.retriever_override,
            run.query_text.is_some(),
            query_embedding.clone(),
            fuzzy_term,
            run.cursor,
        );
        debug!(search_type = %metadata.search_type, "routed search");

        let plan = SearchPlan {
            entity_type: run.entity_type,
            filters: run.filters.clone(),
            retriever,
            fetch_limit: run.fetch_limit,
        };
        let hits = self.search_repository.search(&plan).await?;

        let results = hits
            .into_iter()
            .map(|hit| {
                format_hit(
                    hit,
                    run.entity_type,
                    run.query_text,
                    run.filters.as_ref(),
                    &metadata,
                )
            })
            .collect();

        Ok(SearchResponse {
            results,
            metadata,
            query_embedding,
            has_more: false,
        })
    }

    async fn prepare_filters(
        &self,
        entity_type: EntityType,
        filters: Option<FilterTree>,
    ) -> AppResult<Option<FilterTree>> {
        let Some(mut filters) = filters else {
            return Ok(None);
        };
        filters.normalize();
        filters.validate()?;
        for leaf in filters.leaves() {
            self.validate_leaf(entity_type, leaf).await?;
        }
        Ok(Some(filters))
    }

    async fn validate_leaf(&self, entity_type: EntityType, leaf: &PathFilter) -> AppResult<()> {
        if let FilterCondition::Ltree { op, value } = &leaf.condition {
            if *op == LtreeOp::MatchesLquery
                && !self.schema_repository.lquery_is_valid(value).await?
            {
                return Err(QueryValidationError::InvalidLtreePattern {
                    pattern: value.clone(),
                }
                .into());
            }
            return Ok(());
        }

        if leaf.path.trim().is_empty() {
            return Err(QueryValidationError::EmptyFilterPath.into());
        }

        let Some(kind) = self.schema_repository.field_kind(&leaf.path).await? else {
            return Err(QueryValidationError::PathNotFound {
                path: leaf.path.clone(),
            }
            .into());
        };

        if !leaf.condition.is_compatible_with(kind) {
            let valid_operators = operators_for(kind)
                .iter()
                .map(|op| op.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(QueryValidationError::IncompatibleFilterType {
                operator: leaf.condition.op().as_str().to_owned(),
                field_kind: kind.as_str().to_owned(),
                path: leaf.path.clone(),
                valid_operators,
            }
            .into());
        }

        let expected_prefix = format!("{}.", entity_type.root_label());
        if !leaf.path.starts_with(&expected_prefix) && !leaf.path.starts_with('*') {
            return Err(QueryValidationError::InvalidEntityPrefix {
                path: leaf.path.clone(),
                expected_prefix,
                entity_type: entity_type.as_str().to_owned(),
            }
            .into());
        }

        Ok(())
    }

    fn aggregation_response(
        results: Vec<searchlight_domain::AggregationResult>,
        grouping_dimensions: usize,
    ) -> AggregationResponse {
        let total_groups = results.len();
        AggregationResponse {
            results,
            total_groups,
            metadata: SearchMetadata::aggregation(grouping_dimensions),
        }
    }
}

fn grouping_dimensions(query: &CountQuery) -> usize {
    query.group_by.as_ref().map_or(0, Vec::len)
        + query.temporal_group_by.as_ref().map_or(0, Vec::len)
}

/// Chooses the ranking strategy for the available signals.
///
/// Default routing: no text query ranks structurally; a single word with a
/// usable vector fuses both rankings; a usable vector alone ranks
/// semantically; otherwise trigram similarity ranks. An explicit override
/// wins when its inputs are available and falls back with a warning when
/// they are not.
fn route_retriever(
    retriever_override: Option<RetrieverType>,
    has_query_text: bool,
    query_embedding: Option<Vec<f32>>,
    fuzzy_term: Option<&str>,
    cursor: Option<&PageCursor>,
) -> (RetrieverPlan, SearchMetadata) {
    let score_cursor = cursor.map(|cursor| ScoreCursor {
        score: cursor.score,
        entity_id: cursor.id.clone(),
    });
    let after_id = cursor.map(|cursor| cursor.id.clone());

    let structured = |after_id: Option<String>| {
        (
            RetrieverPlan::Structured { after_id },
            SearchMetadata::structured(),
        )
    };

    if let Some(requested) = retriever_override {
        match requested {
            RetrieverType::Structured => return structured(after_id),
            RetrieverType::Fuzzy => {
                if let Some(term) = fuzzy_term {
                    return (
                        RetrieverPlan::Fuzzy {
                            term: term.to_owned(),
                            cursor: score_cursor,
                        },
                        SearchMetadata::fuzzy(),
                    );
                }
                warn!("fuzzy retriever requested without a usable term; falling back");
            }
            RetrieverType::Semantic => {
                if let Some(vector) = query_embedding.clone() {
                    return (
                        RetrieverPlan::Semantic {
                            vector,
                            cursor: score_cursor,
                        },
                        SearchMetadata::semantic(),
                    );
                }
                warn!("semantic retriever requested without an embedding; falling back");
            }
            RetrieverType::Hybrid => {
                if let (Some(vector), Some(term)) = (query_embedding.clone(), fuzzy_term) {
                    return (
                        RetrieverPlan::Hybrid {
                            vector,
                            term: term.to_owned(),
                            cursor: score_cursor,
                        },
                        SearchMetadata::hybrid(),
                    );
                }
                warn!("hybrid retriever requested without its inputs; falling back");
            }
        }
    }

    if !has_query_text {
        return structured(after_id);
    }

    match (query_embedding, fuzzy_term) {
        (Some(vector), Some(term)) => (
            RetrieverPlan::Hybrid {
                vector,
                term: term.to_owned(),
                cursor: score_cursor,
            },
            SearchMetadata::hybrid(),
        ),
        (Some(vector), None) => (
            RetrieverPlan::Semantic {
                vector,
                cursor: score_cursor,
            },
            SearchMetadata::semantic(),
        ),
        (None, Some(term)) => (
            RetrieverPlan::Fuzzy {
                term: term.to_owned(),
                cursor: score_cursor,
            },
            SearchMetadata::fuzzy(),
        ),
        (None, None) => structured(after_id),
    }
}

fn format_hit(
    hit: SearchHit,
    entity_type: EntityType,
    query_text: Option<&str>,
    filters: Option<&FilterTree>,
    metadata: &SearchMetadata,
) -> SearchResult {
    let matching_field = match (query_text, &hit.highlight_text, &hit.highlight_path) {
        (Some(query_text), Some(text), Some(path)) => {
            let indices = generate_highlight_indices(text, query_text);
            let (text, indices) =
                truncate_around_highlight(text, &indices, MAX_HIGHLIGHT_DISPLAY_LENGTH);
            Some(MatchingField {
                text,
                path: path.clone(),
                highlight_indices: (!indices.is_empty()).then_some(indices),
            })
        }
        _ => {
            if query_text.is_none() && metadata.search_type == "structured" {
                filters.and_then(matching_field_from_filters)
            } else {
                None
            }
        }
    };

    SearchResult {
        entity_id: hit.entity_id,
        entity_type,
        entity_title: hit.entity_title.unwrap_or_default(),
        score: hit.score,
        perfect_match: hit.perfect_match,
        matching_field,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use async_trait::async_trait;
    use searchlight_core::{AppError, AppResult, EntityType, FieldKind, QueryValidationError};
    use searchlight_domain::{
        AggregateQuery, Aggregation, AggregationResult, CountQuery, EqualityOp, ExportQuery,
        FilterCondition, FilterTree, PathFilter, Query, QueryState, RetrieverType, SelectQuery,
    };
    use serde_json::{Map, Value};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use crate::ports::{
        Embedder, ExportRepository, FilterSchemaRepository, QueryStateRepository, RetrieverPlan,
        SearchHit, SearchPlan, SearchRepository,
    };

    use super::QueryService;

    #[derive(Default)]
    struct FakeSearchRepository {
        hits: Vec<SearchHit>,
        aggregation_rows: Vec<AggregationResult>,
        plans: Mutex<Vec<SearchPlan>>,
    }

    #[async_trait]
    impl SearchRepository for FakeSearchRepository {
        async fn search(&self, plan: &SearchPlan) -> AppResult<Vec<SearchHit>> {
            self.plans.lock().await.push(plan.clone());
            let limit = plan.fetch_limit as usize;
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        async fn count(&self, _query: &CountQuery) -> AppResult<Vec<AggregationResult>> {
            Ok(self.aggregation_rows.clone())
        }

        async fn aggregate(&self, _query: &AggregateQuery) -> AppResult<Vec<AggregationResult>> {
            Ok(self.aggregation_rows.clone())
        }
    }

    struct FakeSchemaRepository {
        kinds: BTreeMap<String, FieldKind>,
    }

    #[async_trait]
    impl FilterSchemaRepository for FakeSchemaRepository {
        async fn field_kind(&self, path: &str) -> AppResult<Option<FieldKind>> {
            Ok(self.kinds.get(path).copied())
        }

        async fn filterable_paths(&self) -> AppResult<BTreeMap<String, FieldKind>> {
            Ok(self.kinds.clone())
        }

        async fn lquery_is_valid(&self, pattern: &str) -> AppResult<bool> {
            Ok(!pattern.contains("[["))
        }
    }

    #[derive(Default)]
    struct FakeStateRepository {
        states: Mutex<HashMap<Uuid, QueryState>>,
    }

    #[async_trait]
    impl QueryStateRepository for FakeStateRepository {
        async fn save(&self, state: &QueryState) -> AppResult<Uuid> {
            let query_id = Uuid::from_u128(99);
            self.states.lock().await.insert(query_id, state.clone());
            Ok(query_id)
        }

        async fn load(&self, query_id: Uuid) -> AppResult<QueryState> {
            self.states
                .lock()
                .await
                .get(&query_id)
                .cloned()
                .ok_or(AppError::QueryStateNotFound(query_id))
        }
    }

    #[derive(Default)]
    struct FakeExportRepository;

    #[async_trait]
    impl ExportRepository for FakeExportRepository {
        async fn export_rows(
            &self,
            _entity_type: EntityType,
            entity_ids: &[String],
        ) -> AppResult<Vec<Map<String, Value>>> {
            Ok(entity_ids
                .iter()
                .map(|id| {
                    let mut row = Map::new();
                    row.insert("subscription_id".to_owned(), Value::String(id.clone()));
                    row
                })
                .collect())
        }
    }

    struct FakeEmbedder {
        vector: Option<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_batch(&self, texts: &[String], _dry_run: bool) -> AppResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|_| self.vector.clone().unwrap_or_default())
                .collect())
        }

        async fn embed_text(&self, _text: &str) -> AppResult<Vec<f32>> {
            Ok(self.vector.clone().unwrap_or_default())
        }
    }

    fn hit(id: u128, score: f64) -> SearchHit {
        SearchHit {
            entity_id: Uuid::from_u128(id).to_string(),
            entity_title: Some(format!("Entity {id}")),
            score,
            highlight_text: Some("fast pancakes".to_owned()),
            highlight_path: Some("subscription.note".to_owned()),
            perfect_match: 0,
        }
    }

    fn schema() -> FakeSchemaRepository {
        FakeSchemaRepository {
            kinds: BTreeMap::from([
                ("subscription.status".to_owned(), FieldKind::String),
                ("subscription.port.speed".to_owned(), FieldKind::Integer),
            ]),
        }
    }

    fn engine(
        repository: Arc<FakeSearchRepository>,
        state: Arc<FakeStateRepository>,
        vector: Option<Vec<f32>>,
    ) -> QueryService {
        QueryService::new(
            repository,
            Arc::new(schema()),
            state,
            Arc::new(FakeExportRepository),
            Arc::new(FakeEmbedder { vector }),
        )
    }

    fn status_filter() -> FilterTree {
        FilterTree::path(PathFilter::new(
            "subscription.status",
            FilterCondition::Equality {
                op: EqualityOp::Eq,
                value: "active".to_owned(),
            },
        ))
    }

    #[tokio::test]
    async fn no_signals_short_circuits_to_an_empty_response() {
        let repository = Arc::new(FakeSearchRepository::default());
        let service = engine(Arc::clone(&repository), Arc::default(), None);

        let query = SelectQuery::new(EntityType::Subscription);
        let response = service.execute_search(&query, None, None).await;

        assert!(response.is_ok_and(|response| {
            response.results.is_empty() && response.metadata.search_type == "empty"
        }));
        assert!(repository.plans.lock().await.is_empty());
    }

    #[tokio::test]
    async fn single_word_without_embedding_routes_to_fuzzy() {
        let repository = Arc::new(FakeSearchRepository {
            hits: vec![hit(1, 0.8)],
            ..FakeSearchRepository::default()
        });
        let service = engine(Arc::clone(&repository), Arc::default(), None);

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.query_text = Some("pancakes".to_owned());
        let response = service.execute_search(&query, None, None).await;

        assert!(response.is_ok_and(|response| response.metadata.search_type == "fuzzy"));
        let plans = repository.plans.lock().await;
        assert!(matches!(
            plans.first(),
            Some(SearchPlan {
                retriever: RetrieverPlan::Fuzzy { term, .. },
                ..
            }) if term == "pancakes"
        ));
    }

    #[tokio::test]
    async fn multi_word_with_embedding_routes_to_semantic() {
        let repository = Arc::new(FakeSearchRepository {
            hits: vec![hit(1, 0.9)],
            ..FakeSearchRepository::default()
        });
        let service = engine(
            Arc::clone(&repository),
            Arc::default(),
            Some(vec![0.1, 0.2]),
        );

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.query_text = Some("vegetarian meals".to_owned());
        let response = service.execute_search(&query, None, None).await;

        assert!(response.is_ok_and(|response| response.metadata.search_type == "semantic"));
    }

    #[tokio::test]
    async fn single_word_with_embedding_routes_to_hybrid() {
        let repository = Arc::new(FakeSearchRepository {
            hits: vec![hit(1, 0.9)],
            ..FakeSearchRepository::default()
        });
        let service = engine(
            Arc::clone(&repository),
            Arc::default(),
            Some(vec![0.1, 0.2]),
        );

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.query_text = Some("pancakes".to_owned());
        let response = service.execute_search(&query, None, None).await;

        assert!(response.is_ok_and(|response| response.metadata.search_type == "hybrid"));
    }

    #[tokio::test]
    async fn uuid_query_text_skips_vectorization() {
        let repository = Arc::new(FakeSearchRepository {
            hits: vec![hit(1, 0.7)],
            ..FakeSearchRepository::default()
        });
        let service = engine(
            Arc::clone(&repository),
            Arc::default(),
            Some(vec![0.1, 0.2]),
        );

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.query_text = Some(Uuid::from_u128(5).to_string());
        let response = service.execute_search(&query, None, None).await;

        assert!(response.is_ok_and(|response| response.metadata.search_type == "fuzzy"));
    }

    #[tokio::test]
    async fn filter_only_search_is_structured_with_has_more() {
        let repository = Arc::new(FakeSearchRepository {
            hits: (1..=11).map(|id| hit(id, 1.0)).collect(),
            ..FakeSearchRepository::default()
        });
        let service = engine(Arc::clone(&repository), Arc::default(), None);

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.filters = Some(status_filter());
        let response = service.execute_search(&query, None, None).await;

        assert!(response.is_ok_and(|response| {
            response.metadata.search_type == "structured"
                && response.results.len() == 10
                && response.has_more
                && response.results[0]
                    .matching_field
                    .as_ref()
                    .is_some_and(|field| field.text == "active")
        }));
    }

    #[tokio::test]
    async fn retriever_override_beats_default_routing() {
        let repository = Arc::new(FakeSearchRepository {
            hits: vec![hit(1, 1.0)],
            ..FakeSearchRepository::default()
        });
        let service = engine(
            Arc::clone(&repository),
            Arc::default(),
            Some(vec![0.1, 0.2]),
        );

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.query_text = Some("pancakes".to_owned());
        query.retriever = Some(RetrieverType::Structured);
        let response = service.execute_search(&query, None, None).await;

        assert!(response.is_ok_and(|response| response.metadata.search_type == "structured"));
    }

    #[tokio::test]
    async fn unknown_path_fails_validation() {
        let service = engine(Arc::default(), Arc::default(), None);

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.filters = Some(FilterTree::path(PathFilter::new(
            "subscription.bogus",
            FilterCondition::Equality {
                op: EqualityOp::Eq,
                value: "x".to_owned(),
            },
        )));

        let result = service.execute_search(&query, None, None).await;
        assert!(matches!(
            result,
            Err(AppError::Query(QueryValidationError::PathNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn wrong_entity_prefix_fails_validation() {
        let service = engine(Arc::default(), Arc::default(), None);

        let mut query = SelectQuery::new(EntityType::Workflow);
        query.filters = Some(status_filter());

        let result = service.execute_search(&query, None, None).await;
        assert!(matches!(
            result,
            Err(AppError::Query(
                QueryValidationError::InvalidEntityPrefix { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn incompatible_operator_fails_validation() {
        let service = engine(Arc::default(), Arc::default(), None);

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.filters = Some(FilterTree::path(PathFilter::new(
            "subscription.status",
            FilterCondition::Numeric {
                op: searchlight_domain::CompareOp::Gt,
                value: searchlight_domain::NumericValue::Int(5),
            },
        )));

        let result = service.execute_search(&query, None, None).await;
        assert!(matches!(
            result,
            Err(AppError::Query(
                QueryValidationError::IncompatibleFilterType { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn first_page_cursor_persists_query_state() {
        let repository = Arc::new(FakeSearchRepository {
            hits: (1..=11).map(|id| hit(id, 1.0)).collect(),
            ..FakeSearchRepository::default()
        });
        let state = Arc::new(FakeStateRepository::default());
        let service = engine(Arc::clone(&repository), Arc::clone(&state), None);

        let mut query = SelectQuery::new(EntityType::Subscription);
        query.filters = Some(status_filter());
        let Ok(response) = service.execute_search(&query, None, None).await else {
            panic!("search failed");
        };

        let encoded = service
            .encode_next_page_cursor(&response, None, &query)
            .await;
        let Ok(Some(encoded)) = encoded else {
            panic!("expected a next-page cursor");
        };

        let resolved = service.resolve_cursor(&encoded).await;
        assert!(resolved.is_ok_and(|(cursor, loaded)| {
            cursor.id == response.results[9].entity_id
                && loaded.parameters == Query::Select(query.clone())
        }));
    }

    #[tokio::test]
    async fn missing_query_state_surfaces_not_found() {
        let service = engine(Arc::default(), Arc::default(), None);
        let cursor = searchlight_domain::PageCursor {
            score: 1.0,
            id: "x".to_owned(),
            query_id: Uuid::from_u128(123),
        };
        let Ok(encoded) = cursor.encode() else {
            panic!("cursor encode failed");
        };

        let result = service.resolve_cursor(&encoded).await;
        assert!(matches!(result, Err(AppError::QueryStateNotFound(_))));
    }

    #[tokio::test]
    async fn count_response_wraps_repository_rows() {
        let repository = Arc::new(FakeSearchRepository {
            aggregation_rows: vec![
                AggregationResult {
                    group_values: BTreeMap::from([(
                        "subscription_status".to_owned(),
                        "active".to_owned(),
                    )]),
                    aggregations: BTreeMap::from([("count".to_owned(), 21.0)]),
                },
                AggregationResult {
                    group_values: BTreeMap::from([(
                        "subscription_status".to_owned(),
                        "provisioning".to_owned(),
                    )]),
                    aggregations: BTreeMap::from([("count".to_owned(), 1.0)]),
                },
            ],
            ..FakeSearchRepository::default()
        });
        let service = engine(Arc::clone(&repository), Arc::default(), None);

        let mut query = CountQuery::new(EntityType::Subscription);
        query.group_by = Some(vec!["subscription.status".to_owned()]);
        let response = service.execute_count(&query).await;

        assert!(response.is_ok_and(|response| {
            response.total_groups == 2 && response.metadata.search_type == "aggregation"
        }));
    }

    #[tokio::test]
    async fn aggregate_validates_before_reaching_the_repository() {
        let service = engine(Arc::default(), Arc::default(), None);
        let query = AggregateQuery {
            grouping: CountQuery::new(EntityType::Subscription),
            aggregations: Vec::new(),
        };

        assert!(service.execute_aggregation(&query).await.is_err());
    }

    #[tokio::test]
    async fn aggregate_with_aggregations_returns_rows() {
        let repository = Arc::new(FakeSearchRepository {
            aggregation_rows: vec![AggregationResult {
                group_values: BTreeMap::new(),
                aggregations: BTreeMap::from([("total".to_owned(), 1234.0)]),
            }],
            ..FakeSearchRepository::default()
        });
        let service = engine(Arc::clone(&repository), Arc::default(), None);

        let query = AggregateQuery {
            grouping: CountQuery::new(EntityType::Subscription),
            aggregations: vec![Aggregation::Sum {
                field: "subscription.price".to_owned(),
                alias: "total".to_owned(),
            }],
        };
        let response = service.execute_aggregation(&query).await;

        assert!(response.is_ok_and(|response| response.results.len() == 1));
    }

    #[tokio::test]
    async fn export_returns_one_flat_row_per_hit() {
        let repository = Arc::new(FakeSearchRepository {
            hits: (1..=3).map(|id| hit(id, 1.0)).collect(),
            ..FakeSearchRepository::default()
        });
        let service = engine(Arc::clone(&repository), Arc::default(), None);

        let mut query = ExportQuery::new(EntityType::Subscription);
        query.filters = Some(status_filter());
        let rows = service.execute_export(&query, None).await;

        assert!(rows.is_ok_and(|rows| rows.len() == 3));
    }
}
