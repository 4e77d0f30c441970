use pgvector::Vector;
use rust_decimal::Decimal;
use searchlight_application::{RetrieverPlan, ScoreCursor, SearchConfig, SearchPlan};
use searchlight_core::{AppError, AppResult};

use super::candidate;
use super::sql::{BindValue, SqlBuilder, Statement};

/// Scale of the NUMERIC score column; cursor floats quantize to it so
/// keyset comparisons are exact.
const SCORE_PRECISION: u32 = 12;

/// Value types the text retrievers scan.
const SEARCHABLE_TYPES: &str = "('string', 'uuid', 'block', 'resource_type')";

/// Compiles a search plan into one executable statement.
pub(super) fn build_search_statement(
    plan: &SearchPlan,
    config: &SearchConfig,
) -> AppResult<Statement> {
    let mut builder = SqlBuilder::new();
    let candidate_sql = candidate::candidate_cte(plan.entity_type, plan.filters.as_ref(), &mut builder);

    let (label, sql) = match &plan.retriever {
        RetrieverPlan::Structured { after_id } => (
            "structured",
            structured_sql(&candidate_sql, after_id.as_deref(), plan.fetch_limit, &mut builder)?,
        ),
        RetrieverPlan::Fuzzy { term, cursor } => (
            "fuzzy",
            fuzzy_sql(
                &candidate_sql,
                term,
                cursor.as_ref(),
                plan.fetch_limit,
                config,
                &mut builder,
            )?,
        ),
        RetrieverPlan::Semantic { vector, cursor } => (
            "semantic",
            semantic_sql(
                &candidate_sql,
                vector,
                cursor.as_ref(),
                plan.fetch_limit,
                &mut builder,
            )?,
        ),
        RetrieverPlan::Hybrid {
            vector,
            term,
            cursor,
        } => (
            "hybrid",
            hybrid_sql(
                &candidate_sql,
                vector,
                term,
                cursor.as_ref(),
                plan.fetch_limit,
                config,
                &mut builder,
            )?,
        ),
    };

    Ok(Statement {
        label,
        sql,
        binds: builder.into_binds(),
    })
}

/// Quantizes a cursor score to the stored NUMERIC scale.
fn quantize_cursor_score(score: f64) -> AppResult<Decimal> {
    Decimal::from_f64_retain(score)
        .map(|decimal| decimal.round_dp(SCORE_PRECISION))
        .ok_or_else(|| AppError::InvalidCursor("cursor score is not a finite number".to_owned()))
}

/// Keyset predicate over `(score, entity_id)` in the `(DESC, ASC)` order.
fn score_pagination(cursor: &ScoreCursor, builder: &mut SqlBuilder) -> AppResult<String> {
    let score = builder.bind(BindValue::Decimal(quantize_cursor_score(cursor.score)?));
    let entity_id = builder.bind(BindValue::Text(cursor.entity_id.clone()));
    Ok(format!(
        "WHERE score < {score} OR (score = {score} AND entity_id > ({entity_id})::uuid)"
    ))
}

fn structured_sql(
    candidate_sql: &str,
    after_id: Option<&str>,
    fetch_limit: u32,
    builder: &mut SqlBuilder,
) -> AppResult<String> {
    let pagination = match after_id {
        Some(after_id) => {
            let placeholder = builder.bind(BindValue::Text(after_id.to_owned()));
            format!("WHERE c.entity_id > ({placeholder})::uuid ")
        }
        None => String::new(),
    };
    let limit = builder.bind(BindValue::Int(i64::from(fetch_limit)));

    Ok(format!(
        "WITH candidates AS ({candidate_sql}) \
         SELECT c.entity_id::text AS entity_id, c.entity_title, \
                (1.0)::numeric(38,12) AS score, \
                NULL::text AS highlight_text, NULL::text AS highlight_path, \
                0 AS perfect_match \
         FROM candidates c \
         {pagination}\
         ORDER BY c.entity_id ASC \
         LIMIT {limit}"
    ))
}

fn fuzzy_sql(
    candidate_sql: &str,
    term: &str,
    cursor: Option<&ScoreCursor>,
    fetch_limit: u32,
    config: &SearchConfig,
    builder: &mut SqlBuilder,
) -> AppResult<String> {
    let term_placeholder = builder.bind(BindValue::Text(term.to_owned()));
    let threshold = builder.bind(BindValue::Float(config.fuzzy_similarity_threshold));

    let pagination = match cursor {
        Some(cursor) => {
            let mut predicate = score_pagination(cursor, builder)?;
            predicate.push(' ');
            predicate
        }
        None => String::new(),
    };
    let limit = builder.bind(BindValue::Int(i64::from(fetch_limit)));

    Ok(format!(
        "WITH candidates AS ({candidate_sql}), \
         ranked_fuzzy AS ( \
             SELECT DISTINCT ON (idx.entity_id) \
                 idx.entity_id, \
                 cand.entity_title, \
                 round((max(word_similarity({term_placeholder}, idx.value)) \
                        OVER (PARTITION BY idx.entity_id))::numeric(38,12), {SCORE_PRECISION})::numeric(38,12) AS score, \
                 first_value(idx.value) OVER best_match AS highlight_text, \
                 first_value(idx.path::text) OVER best_match AS highlight_path \
             FROM search_index idx \
             INNER JOIN candidates cand ON cand.entity_id = idx.entity_id \
             WHERE idx.value_type IN {SEARCHABLE_TYPES} \
               AND {term_placeholder} <% idx.value \
               AND word_similarity({term_placeholder}, idx.value) > {threshold} \
             WINDOW best_match AS (PARTITION BY idx.entity_id \
                                   ORDER BY word_similarity({term_placeholder}, idx.value) DESC, idx.path ASC) \
             ORDER BY idx.entity_id \
         ) \
         SELECT entity_id::text AS entity_id, entity_title, score, \
                highlight_text, highlight_path, 0 AS perfect_match \
         FROM ranked_fuzzy \
         {pagination}\
         ORDER BY score DESC NULLS LAST, entity_id ASC \
         LIMIT {limit}"
    ))
}

fn semantic_sql(
    candidate_sql: &str,
    vector: &[f32],
    cursor: Option<&ScoreCursor>,
    fetch_limit: u32,
    builder: &mut SqlBuilder,
) -> AppResult<String> {
    let vector_placeholder = builder.bind(BindValue::Vector(Vector::from(vector.to_vec())));

    let pagination = match cursor {
        Some(cursor) => {
            let mut predicate = score_pagination(cursor, builder)?;
            predicate.push(' ');
            predicate
        }
        None => String::new(),
    };
    let limit = builder.bind(BindValue::Int(i64::from(fetch_limit)));

    // Score 1/(1+d) keeps ascending distance as descending score and stays
    // within (0, 1].
    Ok(format!(
        "WITH candidates AS ({candidate_sql}), \
         ranked_semantic AS ( \
             SELECT DISTINCT ON (idx.entity_id) \
                 idx.entity_id, \
                 cand.entity_title, \
                 round(((1.0)::numeric(38,12) / ((1.0)::numeric(38,12) \
                        + (min(idx.embedding <-> {vector_placeholder}) \
                           OVER (PARTITION BY idx.entity_id))::numeric(38,12)))::numeric(38,12), {SCORE_PRECISION})::numeric(38,12) AS score, \
                 first_value(idx.value) OVER nearest AS highlight_text, \
                 first_value(idx.path::text) OVER nearest AS highlight_path \
             FROM search_index idx \
             INNER JOIN candidates cand ON cand.entity_id = idx.entity_id \
             WHERE idx.embedding IS NOT NULL \
             WINDOW nearest AS (PARTITION BY idx.entity_id \
                                ORDER BY (idx.embedding <-> {vector_placeholder}) ASC, idx.path ASC) \
             ORDER BY idx.entity_id \
         ) \
         SELECT entity_id::text AS entity_id, entity_title, score, \
                highlight_text, highlight_path, 0 AS perfect_match \
         FROM ranked_semantic \
         {pagination}\
         ORDER BY score DESC NULLS LAST, entity_id ASC \
         LIMIT {limit}"
    ))
}

#[allow(clippy::too_many_arguments)]
fn hybrid_sql(
    candidate_sql: &str,
    vector: &[f32],
    term: &str,
    cursor: Option<&ScoreCursor>,
    fetch_limit: u32,
    config: &SearchConfig,
    builder: &mut SqlBuilder,
) -> AppResult<String> {
    let vector_placeholder = builder.bind(BindValue::Vector(Vector::from(vector.to_vec())));
    let term_placeholder = builder.bind(BindValue::Text(term.to_owned()));
    let candidates_limit = builder.bind(BindValue::Int(i64::from(config.field_candidates_limit)));
    let k = builder.bind(BindValue::Float(f64::from(config.rrf_k)));
    let perfect_threshold = builder.bind(BindValue::Float(config.perfect_match_threshold));

    // beta exceeds the maximum reachable RRF score, so any perfect match
    // outranks any non-perfect match; the sum normalizes scores into [0, 1].
    let k_decimal = Decimal::from(config.rrf_k);
    let rrf_max = Decimal::from(2) / (k_decimal + Decimal::ONE);
    let beta_value = rrf_max + rrf_max * Decimal::new(5, 2);
    let beta = builder.bind(BindValue::Decimal(beta_value));
    let normalizer = builder.bind(BindValue::Decimal(beta_value + rrf_max));

    let pagination = match cursor {
        Some(cursor) => {
            let mut predicate = score_pagination(cursor, builder)?;
            predicate.push(' ');
            predicate
        }
        None => String::new(),
    };
    let limit = builder.bind(BindValue::Int(i64::from(fetch_limit)));

    let semantic_distance = format!(
        "CASE WHEN idx.embedding IS NULL THEN NULL ELSE idx.embedding <-> {vector_placeholder} END"
    );
    let perfect = format!(
        "CASE WHEN avg_fuzzy_score >= {perfect_threshold} THEN 1 ELSE 0 END"
    );

    Ok(format!(
        "WITH candidates AS ({candidate_sql}), \
         field_candidates AS ( \
             SELECT idx.entity_id, cand.entity_title, idx.path, idx.value, \
                    coalesce({semantic_distance}, 1.0) AS semantic_distance, \
                    word_similarity({term_placeholder}, idx.value) AS fuzzy_score \
             FROM search_index idx \
             INNER JOIN candidates cand ON cand.entity_id = idx.entity_id \
             WHERE idx.value_type IN {SEARCHABLE_TYPES} \
               AND {term_placeholder} <% idx.value \
             ORDER BY word_similarity({term_placeholder}, idx.value) DESC NULLS LAST, \
                      ({semantic_distance}) ASC NULLS LAST, \
                      idx.entity_id ASC \
             LIMIT {candidates_limit} \
         ), \
         entity_scores AS ( \
             SELECT entity_id, entity_title, \
                    avg(semantic_distance) AS avg_semantic_distance, \
                    avg(fuzzy_score) AS avg_fuzzy_score \
             FROM field_candidates \
             GROUP BY entity_id, entity_title \
         ), \
         entity_highlights AS ( \
             SELECT DISTINCT ON (entity_id) \
                 entity_id, \
                 first_value(value) OVER best_match AS highlight_text, \
                 first_value(path::text) OVER best_match AS highlight_path \
             FROM field_candidates \
             WINDOW best_match AS (PARTITION BY entity_id ORDER BY fuzzy_score DESC, path ASC) \
             ORDER BY entity_id \
         ), \
         ranked_results AS ( \
             SELECT scores.entity_id, scores.entity_title, scores.avg_fuzzy_score, \
                    highlights.highlight_text, highlights.highlight_path, \
                    dense_rank() OVER (ORDER BY scores.avg_semantic_distance ASC NULLS LAST, \
                                                scores.entity_id ASC) AS sem_rank, \
                    dense_rank() OVER (ORDER BY scores.avg_fuzzy_score DESC NULLS LAST, \
                                                scores.entity_id ASC) AS fuzzy_rank \
             FROM entity_scores scores \
             INNER JOIN entity_highlights highlights ON highlights.entity_id = scores.entity_id \
         ), \
         fused AS ( \
             SELECT entity_id, entity_title, highlight_text, highlight_path, \
                    {perfect} AS perfect_match, \
                    (((1.0 / ({k} + sem_rank) + 1.0 / ({k} + fuzzy_rank)))::numeric(38,12) \
                     + ({beta})::numeric(38,12) * ({perfect})::numeric(38,12)) \
                        / ({normalizer})::numeric(38,12) AS score \
             FROM ranked_results \
         ) \
         SELECT entity_id::text AS entity_id, entity_title, \
                round((score)::numeric(38,12), {SCORE_PRECISION})::numeric(38,12) AS score, \
                highlight_text, highlight_path, perfect_match \
         FROM fused \
         {pagination}\
         ORDER BY score DESC, entity_id ASC \
         LIMIT {limit}"
    ))
}
