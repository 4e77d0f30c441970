use std::collections::BTreeMap;

use regex::RegexBuilder;
use searchlight_core::EntityType;
use serde::{Deserialize, Serialize};

use crate::filter::{FilterCondition, FilterTree, LtreeOp, NumericValue};

/// Maximum length of highlight text before truncation kicks in.
pub const MAX_HIGHLIGHT_DISPLAY_LENGTH: usize = 160;

const ELLIPSIS: &str = "...";

/// Describes the strategy that produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Strategy identifier: structured, fuzzy, semantic, hybrid,
    /// aggregation, or empty.
    pub search_type: String,
    /// Human-readable description of the execution.
    pub description: String,
}

impl SearchMetadata {
    /// Metadata for a filter-only search.
    #[must_use]
    pub fn structured() -> Self {
        Self {
            search_type: "structured".to_owned(),
            description: "Filter-based search without text ranking".to_owned(),
        }
    }

    /// Metadata for a trigram fuzzy search.
    #[must_use]
    pub fn fuzzy() -> Self {
        Self {
            search_type: "fuzzy".to_owned(),
            description: "Trigram word-similarity ranking".to_owned(),
        }
    }

    /// Metadata for a vector similarity search.
    #[must_use]
    pub fn semantic() -> Self {
        Self {
            search_type: "semantic".to_owned(),
            description: "Semantic vector-distance ranking".to_owned(),
        }
    }

    /// Metadata for a fused semantic + fuzzy search.
    #[must_use]
    pub fn hybrid() -> Self {
        Self {
            search_type: "hybrid".to_owned(),
            description: "Reciprocal rank fusion of semantic and fuzzy ranking".to_owned(),
        }
    }

    /// Metadata for an aggregation response.
    #[must_use]
    pub fn aggregation(grouping_dimensions: usize) -> Self {
        Self {
            search_type: "aggregation".to_owned(),
            description: format!(
                "Aggregation query with {grouping_dimensions} grouping dimension(s)"
            ),
        }
    }

    /// Metadata for a short-circuited search with no signals.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            search_type: "empty".to_owned(),
            description: "No search criteria provided".to_owned(),
        }
    }
}

/// The field that contributed most to a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingField {
    /// Display text of the field, possibly truncated.
    pub text: String,
    /// Path of the field.
    pub path: String,
    /// Byte ranges of `text` matching the query, sorted ascending.
    #[serde(default)]
    pub highlight_indices: Option<Vec<(usize, usize)>>,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Entity id as a string.
    pub entity_id: String,
    /// Kind of the entity.
    pub entity_type: EntityType,
    /// Display title of the entity.
    pub entity_title: String,
    /// Quantized ranking score.
    pub score: f64,
    /// 1 when the fuzzy score cleared the perfect-match threshold.
    #[serde(default)]
    pub perfect_match: i32,
    /// Best-matching field, when a text query was present.
    #[serde(default)]
    pub matching_field: Option<MatchingField>,
}

/// Response of a SELECT or EXPORT search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Ranked results, at most the requested limit.
    pub results: Vec<SearchResult>,
    /// Strategy metadata.
    pub metadata: SearchMetadata,
    /// Embedding generated for the query text, echoed so pagination state
    /// can persist it.
    #[serde(default)]
    pub query_embedding: Option<Vec<f32>>,
    /// Whether more results exist past the returned page.
    #[serde(default)]
    pub has_more: bool,
}

impl SearchResponse {
    /// An empty response for searches with no signals.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            metadata: SearchMetadata::empty(),
            query_embedding: None,
            has_more: false,
        }
    }
}

/// One grouped aggregation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Grouping column alias to stringified group value.
    #[serde(default)]
    pub group_values: BTreeMap<String, String>,
    /// Aggregation alias to computed value.
    #[serde(default)]
    pub aggregations: BTreeMap<String, f64>,
}

/// Response of a COUNT or AGGREGATE query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResponse {
    /// Grouped rows, or a single row for ungrouped counts.
    pub results: Vec<AggregationResult>,
    /// Number of groups returned.
    pub total_groups: usize,
    /// Strategy metadata.
    pub metadata: SearchMetadata,
}

/// Finds byte ranges of `text` matching words of `term`.
///
/// Both word-boundary and plain substring occurrences are collected, then
/// deduplicated and sorted ascending.
#[must_use]
pub fn generate_highlight_indices(text: &str, term: &str) -> Vec<(usize, usize)> {
    if text.is_empty() || term.is_empty() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for word in term.split_whitespace() {
        let escaped = regex::escape(word);
        for pattern in [format!(r"\b{escaped}\b"), escaped] {
            let Ok(regex) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
                continue;
            };
            for found in regex.find_iter(text) {
                matches.push((found.start(), found.end()));
            }
        }
    }

    matches.sort_unstable();
    matches.dedup();
    matches
}

/// Truncates highlight text around its first highlight when it exceeds
/// `max_length`, shifting the highlight ranges into the truncated text.
///
/// Ranges falling outside the kept window are dropped.
#[must_use]
pub fn truncate_around_highlight(
    text: &str,
    indices: &[(usize, usize)],
    max_length: usize,
) -> (String, Vec<(usize, usize)>) {
    if text.len() <= max_length {
        return (text.to_owned(), indices.to_vec());
    }

    let (first_start, first_end) = indices.first().copied().unwrap_or((0, 0));
    let highlight_len = first_end.saturating_sub(first_start).min(max_length);
    let margin = (max_length - highlight_len) / 2;

    let mut window_start = first_start.saturating_sub(margin);
    let mut window_end = (window_start + max_length).min(text.len());
    window_start = window_end.saturating_sub(max_length);
    while window_start > 0 && !text.is_char_boundary(window_start) {
        window_start -= 1;
    }
    while window_end < text.len() && !text.is_char_boundary(window_end) {
        window_end += 1;
    }

    let prefix = if window_start > 0 { ELLIPSIS } else { "" };
    let suffix = if window_end < text.len() { ELLIPSIS } else { "" };
    let truncated = format!("{prefix}{}{suffix}", &text[window_start..window_end]);

    let shifted = indices
        .iter()
        .filter(|(start, end)| *start >= window_start && *end <= window_end)
        .map(|(start, end)| {
            (
                start - window_start + prefix.len(),
                end - window_start + prefix.len(),
            )
        })
        .collect();

    (truncated, shifted)
}

/// Builds the matching field shown for a filter-only structured search.
///
/// Only a tree with exactly one leaf yields a matching field; component
/// absence has nothing to show.
#[must_use]
pub fn matching_field_from_filters(filters: &FilterTree) -> Option<MatchingField> {
    let leaves = filters.leaves();
    let [leaf] = leaves.as_slice() else {
        return None;
    };

    if let FilterCondition::Ltree { op, value } = &leaf.condition {
        if *op == LtreeOp::NotHasComponent {
            return None;
        }
        let display = if value.is_empty() {
            leaf.path.clone()
        } else {
            value.clone()
        };
        let length = display.len();
        return Some(MatchingField {
            text: display.clone(),
            path: display,
            highlight_indices: Some(vec![(0, length)]),
        });
    }

    let text = display_value(&leaf.condition);
    let length = text.len();
    Some(MatchingField {
        text,
        path: leaf.path.clone(),
        highlight_indices: Some(vec![(0, length)]),
    })
}

fn display_value(condition: &FilterCondition) -> String {
    fn numeric(value: &NumericValue) -> String {
        match value {
            NumericValue::Int(value) => value.to_string(),
            NumericValue::Float(value) => value.to_string(),
        }
    }

    match condition {
        FilterCondition::Equality { value, .. }
        | FilterCondition::String { value, .. }
        | FilterCondition::Date { value, .. }
        | FilterCondition::Ltree { value, .. } => value.clone(),
        FilterCondition::Numeric { value, .. } => numeric(value),
        FilterCondition::NumericBetween { value } => {
            format!("{}..{}", numeric(&value.start), numeric(&value.end))
        }
        FilterCondition::DateBetween { value } => format!("{}..{}", value.start, value.end),
    }
}
