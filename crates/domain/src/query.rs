use searchlight_core::{AppError, AppResult, EntityType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::FilterTree;

/// Smallest accepted result limit.
pub const MIN_LIMIT: u32 = 1;
/// Default SELECT result limit.
pub const DEFAULT_LIMIT: u32 = 10;
/// Largest accepted SELECT result limit.
pub const MAX_LIMIT: u32 = 30;
/// Default EXPORT result limit.
pub const DEFAULT_EXPORT_LIMIT: u32 = 1000;
/// Largest accepted EXPORT result limit.
pub const MAX_EXPORT_LIMIT: u32 = 10_000;

/// Ranking strategy selected for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverType {
    /// Filter-only search with constant scores.
    Structured,
    /// Trigram word-similarity ranking.
    Fuzzy,
    /// Vector-distance ranking.
    Semantic,
    /// Reciprocal rank fusion of semantic and fuzzy ranking.
    Hybrid,
}

impl RetrieverType {
    /// Returns the stable wire value of the strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Fuzzy => "fuzzy",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_export_limit() -> u32 {
    DEFAULT_EXPORT_LIMIT
}

/// Derives the semantic query text; UUID-shaped text is never vectorized.
fn vector_query_of(query_text: Option<&str>) -> Option<&str> {
    let text = query_text?.trim();
    if text.is_empty() || Uuid::parse_str(text).is_ok() {
        return None;
    }
    Some(text)
}

/// Derives the fuzzy term; only single words survive, the trigram operator
/// filters out too much on longer phrases.
fn fuzzy_term_of(query_text: Option<&str>) -> Option<&str> {
    let text = query_text?.trim();
    if text.is_empty() || text.split_whitespace().count() != 1 {
        return None;
    }
    Some(text)
}

/// Query for SELECT operations with strict result limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Entity type to search.
    pub entity_type: EntityType,
    /// Optional structured filters.
    #[serde(default)]
    pub filters: Option<FilterTree>,
    /// Optional text query for semantic/fuzzy search.
    #[serde(default)]
    pub query_text: Option<String>,
    /// Optional retriever override; `None` uses default routing.
    #[serde(default)]
    pub retriever: Option<RetrieverType>,
    /// Maximum number of results to return.
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl SelectQuery {
    /// Creates a filter-less query with the default limit.
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            filters: None,
            query_text: None,
            retriever: None,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Semantic query text, unless the text is a UUID.
    #[must_use]
    pub fn vector_query(&self) -> Option<&str> {
        vector_query_of(self.query_text.as_deref())
    }

    /// Single-word fuzzy term.
    #[must_use]
    pub fn fuzzy_term(&self) -> Option<&str> {
        fuzzy_term_of(self.query_text.as_deref())
    }

    /// Validates limits and the filter tree.
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&self.limit) {
            return Err(AppError::Validation(format!(
                "select limit must be between {MIN_LIMIT} and {MAX_LIMIT}, got {}",
                self.limit
            )));
        }
        if let Some(filters) = &self.filters {
            filters.validate()?;
        }
        Ok(())
    }
}

/// Query for EXPORT operations; same shape as SELECT with bulk limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportQuery {
    /// Entity type to export.
    pub entity_type: EntityType,
    /// Optional structured filters.
    #[serde(default)]
    pub filters: Option<FilterTree>,
    /// Optional text query for semantic/fuzzy search.
    #[serde(default)]
    pub query_text: Option<String>,
    /// Optional retriever override; `None` uses default routing.
    #[serde(default)]
    pub retriever: Option<RetrieverType>,
    /// Maximum number of results to export.
    #[serde(default = "default_export_limit")]
    pub limit: u32,
}

impl ExportQuery {
    /// Creates a filter-less export query with the default limit.
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            filters: None,
            query_text: None,
            retriever: None,
            limit: DEFAULT_EXPORT_LIMIT,
        }
    }

    /// Semantic query text, unless the text is a UUID.
    #[must_use]
    pub fn vector_query(&self) -> Option<&str> {
        vector_query_of(self.query_text.as_deref())
    }

    /// Single-word fuzzy term.
    #[must_use]
    pub fn fuzzy_term(&self) -> Option<&str> {
        fuzzy_term_of(self.query_text.as_deref())
    }

    /// Validates limits and the filter tree.
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_LIMIT..=MAX_EXPORT_LIMIT).contains(&self.limit) {
            return Err(AppError::Validation(format!(
                "export limit must be between {MIN_LIMIT} and {MAX_EXPORT_LIMIT}, got {}",
                self.limit
            )));
        }
        if let Some(filters) = &self.filters {
            filters.validate()?;
        }
        Ok(())
    }
}

/// Sorting direction for grouped aggregation output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl OrderDirection {
    /// SQL keyword of the direction.
    #[must_use]
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordering descriptor for grouped aggregation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Grouping column alias or aggregation alias to order by.
    pub field: String,
    /// Sorting direction.
    #[serde(default)]
    pub direction: OrderDirection,
}

/// Time bucket for temporal grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalPeriod {
    /// Calendar year.
    Year,
    /// Calendar quarter.
    Quarter,
    /// Calendar month.
    Month,
    /// ISO week.
    Week,
    /// Calendar day.
    Day,
    /// Clock hour.
    Hour,
}

impl TemporalPeriod {
    /// `date_trunc` unit name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Hour => "hour",
        }
    }
}

/// Groups a datetime field into time buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalGrouping {
    /// Datetime field path to group by.
    pub field: String,
    /// Bucket size.
    pub period: TemporalPeriod,
}

impl TemporalGrouping {
    /// Output column alias, `<field_alias>_<period>`.
    #[must_use]
    pub fn column_alias(&self) -> String {
        format!("{}_{}", field_to_alias(&self.field), self.period.as_str())
    }
}

/// One statistic computed by an AGGREGATE query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Aggregation {
    /// Entity count.
    Count {
        /// Result column name.
        alias: String,
    },
    /// Sum of a numeric field.
    Sum {
        /// Field path to aggregate.
        field: String,
        /// Result column name.
        alias: String,
    },
    /// Average of a numeric field.
    Avg {
        /// Field path to aggregate.
        field: String,
        /// Result column name.
        alias: String,
    },
    /// Minimum of a numeric field.
    Min {
        /// Field path to aggregate.
        field: String,
        /// Result column name.
        alias: String,
    },
    /// Maximum of a numeric field.
    Max {
        /// Field path to aggregate.
        field: String,
        /// Result column name.
        alias: String,
    },
}

impl Aggregation {
    /// Result column name.
    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            Self::Count { alias }
            | Self::Sum { alias, .. }
            | Self::Avg { alias, .. }
            | Self::Min { alias, .. }
            | Self::Max { alias, .. } => alias,
        }
    }

    /// Aggregated field path, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Count { .. } => None,
            Self::Sum { field, .. }
            | Self::Avg { field, .. }
            | Self::Min { field, .. }
            | Self::Max { field, .. } => Some(field),
        }
    }

    /// SQL aggregate function name.
    #[must_use]
    pub fn sql_fn(&self) -> &'static str {
        match self {
            Self::Count { .. } => "count",
            Self::Sum { .. } => "sum",
            Self::Avg { .. } => "avg",
            Self::Min { .. } => "min",
            Self::Max { .. } => "max",
        }
    }

    /// Whether the aggregation supports a cumulative window.
    #[must_use]
    pub fn supports_cumulative(&self) -> bool {
        matches!(self, Self::Count { .. } | Self::Sum { .. })
    }
}

/// Query for COUNT operations with optional grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountQuery {
    /// Entity type to count.
    pub entity_type: EntityType,
    /// Optional structured filters.
    #[serde(default)]
    pub filters: Option<FilterTree>,
    /// Field paths to group by.
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    /// Temporal groupings over datetime fields.
    #[serde(default)]
    pub temporal_group_by: Option<Vec<TemporalGrouping>>,
    /// Compute running totals over the temporal grouping.
    #[serde(default)]
    pub cumulative: bool,
    /// Ordering of grouped output.
    #[serde(default)]
    pub order_by: Option<Vec<OrderBy>>,
}

impl CountQuery {
    /// Creates an ungrouped count query.
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            filters: None,
            group_by: None,
            temporal_group_by: None,
            cumulative: false,
            order_by: None,
        }
    }

    /// Whether any grouping dimension is present.
    #[must_use]
    pub fn has_grouping(&self) -> bool {
        self.group_by.as_ref().is_some_and(|g| !g.is_empty())
            || self
                .temporal_group_by
                .as_ref()
                .is_some_and(|g| !g.is_empty())
    }

    /// Fields that must be pivoted from EAV rows into columns,
    /// deduplicated preserving insertion order.
    #[must_use]
    pub fn pivot_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        if let Some(group_by) = &self.group_by {
            for field in group_by {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        if let Some(temporal) = &self.temporal_group_by {
            for grouping in temporal {
                if !fields.contains(&grouping.field) {
                    fields.push(grouping.field.clone());
                }
            }
        }
        fields
    }

    /// Validates grouping constraints and the filter tree.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(group_by) = &self.group_by {
            for path in group_by {
                if path.trim().is_empty() {
                    return Err(AppError::Validation(
                        "group_by contains an empty or whitespace-only path".to_owned(),
                    ));
                }
            }
        }

        if self.order_by.as_ref().is_some_and(|o| !o.is_empty()) && !self.has_grouping() {
            return Err(AppError::Validation(
                "order_by requires at least one grouping field".to_owned(),
            ));
        }

        if self.cumulative {
            let temporal_count = self.temporal_group_by.as_ref().map_or(0, Vec::len);
            if temporal_count != 1 {
                return Err(AppError::Validation(
                    "cumulative requires exactly one temporal grouping".to_owned(),
                ));
            }
        }

        if let Some(filters) = &self.filters {
            filters.validate()?;
        }
        Ok(())
    }
}

/// Query for AGGREGATE operations: a count query plus computed statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuery {
    /// Grouping and filter configuration.
    #[serde(flatten)]
    pub grouping: CountQuery,
    /// Statistics to compute; must not be empty.
    pub aggregations: Vec<Aggregation>,
}

impl AggregateQuery {
    /// Fields to pivot: grouping fields plus aggregation fields.
    #[must_use]
    pub fn pivot_fields(&self) -> Vec<String> {
        let mut fields = self.grouping.pivot_fields();
        for aggregation in &self.aggregations {
            if let Some(field) = aggregation.field()
                && !fields.iter().any(|f| f == field)
            {
                fields.push(field.to_owned());
            }
        }
        fields
    }

    /// Validates grouping constraints and the aggregation list.
    pub fn validate(&self) -> AppResult<()> {
        self.grouping.validate()?;

        if self.aggregations.is_empty() {
            return Err(AppError::Validation(
                "an aggregate query must supply at least one aggregation".to_owned(),
            ));
        }

        for aggregation in &self.aggregations {
            if aggregation.alias().trim().is_empty() {
                return Err(AppError::Validation(
                    "aggregation alias must not be empty".to_owned(),
                ));
            }
            if self.grouping.cumulative && !aggregation.supports_cumulative() {
                return Err(AppError::Validation(format!(
                    "cumulative aggregations are not supported for {}; only count and sum",
                    aggregation.sql_fn()
                )));
            }
        }
        Ok(())
    }
}

/// The discriminated union of all query types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query_type", rename_all = "snake_case")]
pub enum Query {
    /// Retrieve a ranked page of matching entities.
    Select(SelectQuery),
    /// Retrieve a bulk set of matching entities for export.
    Export(ExportQuery),
    /// Count matching entities, optionally grouped.
    Count(CountQuery),
    /// Compute statistics over matching entities.
    Aggregate(AggregateQuery),
}

impl Query {
    /// Entity type the query targets.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Select(query) => query.entity_type,
            Self::Export(query) => query.entity_type,
            Self::Count(query) => query.entity_type,
            Self::Aggregate(query) => query.grouping.entity_type,
        }
    }

    /// Structured filters of the query, if any.
    #[must_use]
    pub fn filters(&self) -> Option<&FilterTree> {
        match self {
            Self::Select(query) => query.filters.as_ref(),
            Self::Export(query) => query.filters.as_ref(),
            Self::Count(query) => query.filters.as_ref(),
            Self::Aggregate(query) => query.grouping.filters.as_ref(),
        }
    }

    /// Validates the variant-specific constraints.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Select(query) => query.validate(),
            Self::Export(query) => query.validate(),
            Self::Count(query) => query.validate(),
            Self::Aggregate(query) => query.validate(),
        }
    }
}

/// Persisted snapshot of a query and its embedding for stable pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryState {
    /// The query as originally validated.
    pub parameters: Query,
    /// Embedding generated for the query text, reused verbatim on follow-up
    /// pages. Changing the semantic score transform invalidates saved state.
    #[serde(default)]
    pub query_embedding: Option<Vec<f32>>,
}

impl QueryState {
    /// Clamps persisted limits to the current maxima, shielding against
    /// state saved under older, larger limits.
    pub fn clamp_limits(&mut self) {
        match &mut self.parameters {
            Query::Select(query) => query.limit = query.limit.min(MAX_LIMIT),
            Query::Export(query) => query.limit = query.limit.min(MAX_EXPORT_LIMIT),
            Query::Count(_) | Query::Aggregate(_) => {}
        }
    }
}

/// Converts a field path to a SQL column alias.
///
/// `subscription.start_date` becomes `subscription_start_date`,
/// `product.serial-number` becomes `product_serial_number`.
#[must_use]
pub fn field_to_alias(field_path: &str) -> String {
    field_path.replace(['.', '-'], "_")
}

#[cfg(test)]
mod tests {
    use searchlight_core::EntityType;

    use super::{
        AggregateQuery, Aggregation, CountQuery, MAX_LIMIT, Query, QueryState, SelectQuery,
        TemporalGrouping, TemporalPeriod, field_to_alias,
    };

    #[test]
    fn uuid_query_text_is_not_vectorized() {
        let mut query = SelectQuery::new(EntityType::Subscription);
        query.query_text = Some("c0ffee00-0000-4000-8000-000000000001".to_owned());

        assert!(query.vector_query().is_none());
        assert!(query.fuzzy_term().is_some());
    }

    #[test]
    fn multi_word_text_has_no_fuzzy_term() {
        let mut query = SelectQuery::new(EntityType::Subscription);
        query.query_text = Some("vegetarian meals".to_owned());

        assert_eq!(query.vector_query(), Some("vegetarian meals"));
        assert!(query.fuzzy_term().is_none());
    }

    #[test]
    fn select_limit_bounds_are_enforced() {
        let mut query = SelectQuery::new(EntityType::Product);
        query.limit = MAX_LIMIT + 1;

        assert!(query.validate().is_err());
    }

    #[test]
    fn cumulative_requires_one_temporal_grouping() {
        let mut query = CountQuery::new(EntityType::Subscription);
        query.cumulative = true;

        assert!(query.validate().is_err());

        query.temporal_group_by = Some(vec![TemporalGrouping {
            field: "subscription.start_date".to_owned(),
            period: TemporalPeriod::Month,
        }]);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn aggregate_rejects_cumulative_avg() {
        let mut grouping = CountQuery::new(EntityType::Subscription);
        grouping.cumulative = true;
        grouping.temporal_group_by = Some(vec![TemporalGrouping {
            field: "subscription.start_date".to_owned(),
            period: TemporalPeriod::Month,
        }]);

        let query = AggregateQuery {
            grouping,
            aggregations: vec![Aggregation::Avg {
                field: "subscription.price".to_owned(),
                alias: "avg_price".to_owned(),
            }],
        };

        assert!(query.validate().is_err());
    }

    #[test]
    fn aggregate_requires_at_least_one_aggregation() {
        let query = AggregateQuery {
            grouping: CountQuery::new(EntityType::Subscription),
            aggregations: Vec::new(),
        };

        assert!(query.validate().is_err());
    }

    #[test]
    fn pivot_fields_deduplicate_preserving_order() {
        let mut grouping = CountQuery::new(EntityType::Subscription);
        grouping.group_by = Some(vec!["subscription.status".to_owned()]);
        grouping.temporal_group_by = Some(vec![TemporalGrouping {
            field: "subscription.start_date".to_owned(),
            period: TemporalPeriod::Month,
        }]);

        let query = AggregateQuery {
            grouping,
            aggregations: vec![
                Aggregation::Sum {
                    field: "subscription.price".to_owned(),
                    alias: "total".to_owned(),
                },
                Aggregation::Max {
                    field: "subscription.price".to_owned(),
                    alias: "peak".to_owned(),
                },
            ],
        };

        assert_eq!(
            query.pivot_fields(),
            vec![
                "subscription.status".to_owned(),
                "subscription.start_date".to_owned(),
                "subscription.price".to_owned(),
            ]
        );
    }

    #[test]
    fn field_alias_replaces_separators() {
        assert_eq!(
            field_to_alias("product.serial-number"),
            "product_serial_number"
        );
    }

    #[test]
    fn query_union_round_trips_through_json() {
        let query = Query::Select(SelectQuery::new(EntityType::Workflow));
        let encoded = serde_json::to_value(&query);
        assert!(encoded.is_ok_and(|value| {
            value.get("query_type").and_then(|v| v.as_str()) == Some("select")
                && serde_json::from_value::<Query>(value).is_ok_and(|decoded| decoded == query)
        }));
    }

    #[test]
    fn loaded_state_clamps_oversized_limits() {
        let mut query = SelectQuery::new(EntityType::Subscription);
        query.limit = 500;
        let mut state = QueryState {
            parameters: Query::Select(query),
            query_embedding: None,
        };

        state.clamp_limits();
        let Query::Select(clamped) = state.parameters else {
            panic!("expected a select query");
        };
        assert_eq!(clamped.limit, MAX_LIMIT);
    }
}
