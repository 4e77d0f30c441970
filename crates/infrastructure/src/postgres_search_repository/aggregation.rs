use std::collections::BTreeMap;

use searchlight_core::{AppError, AppResult, EntityType};
use searchlight_domain::{
    AggregateQuery, Aggregation, AggregationResult, CountQuery, FilterTree, OrderBy,
    TemporalGrouping, field_to_alias,
};
use sqlx::{PgPool, Row};

use super::candidate;
use super::sql::{BindValue, SqlBuilder, Statement, apply_binds};

/// A grouped aggregation lowered to one shape for COUNT and AGGREGATE.
struct GroupedSpec<'a> {
    entity_type: EntityType,
    filters: Option<&'a FilterTree>,
    group_by: &'a [String],
    temporal_group_by: &'a [TemporalGrouping],
    cumulative: bool,
    order_by: &'a [OrderBy],
    aggregations: Vec<Aggregation>,
    pivot_fields: Vec<String>,
}

/// Column layout of a compiled aggregation statement.
struct AggregationColumns {
    group_aliases: Vec<String>,
    aggregation_aliases: Vec<String>,
}

/// Executes a COUNT query: the ungrouped form short-circuits to a distinct
/// count without pivoting.
pub(super) async fn execute_count(
    pool: &PgPool,
    query: &CountQuery,
) -> AppResult<Vec<AggregationResult>> {
    if !query.has_grouping() {
        let statement = build_simple_count(query);
        return fetch_rows(
            pool,
            &statement,
            &AggregationColumns {
                group_aliases: Vec::new(),
                aggregation_aliases: vec!["total_count".to_owned()],
            },
        )
        .await;
    }

    let spec = GroupedSpec {
        entity_type: query.entity_type,
        filters: query.filters.as_ref(),
        group_by: query.group_by.as_deref().unwrap_or_default(),
        temporal_group_by: query.temporal_group_by.as_deref().unwrap_or_default(),
        cumulative: query.cumulative,
        order_by: query.order_by.as_deref().unwrap_or_default(),
        aggregations: vec![Aggregation::Count {
            alias: "count".to_owned(),
        }],
        pivot_fields: query.pivot_fields(),
    };
    let (statement, columns) = build_grouped(&spec)?;
    fetch_rows(pool, &statement, &columns).await
}

/// Executes an AGGREGATE query over the pivoted candidate set.
pub(super) async fn execute_aggregate(
    pool: &PgPool,
    query: &AggregateQuery,
) -> AppResult<Vec<AggregationResult>> {
    let spec = GroupedSpec {
        entity_type: query.grouping.entity_type,
        filters: query.grouping.filters.as_ref(),
        group_by: query.grouping.group_by.as_deref().unwrap_or_default(),
        temporal_group_by: query
            .grouping
            .temporal_group_by
            .as_deref()
            .unwrap_or_default(),
        cumulative: query.grouping.cumulative,
        order_by: query.grouping.order_by.as_deref().unwrap_or_default(),
        aggregations: query.aggregations.clone(),
        pivot_fields: query.pivot_fields(),
    };
    let (statement, columns) = build_grouped(&spec)?;
    fetch_rows(pool, &statement, &columns).await
}

fn build_simple_count(query: &CountQuery) -> Statement {
    let mut builder = SqlBuilder::new();
    let candidate_sql = candidate::candidate_cte(query.entity_type, query.filters.as_ref(), &mut builder);

    Statement {
        label: "count",
        sql: format!(
            "WITH candidates AS ({candidate_sql}) \
             SELECT count(DISTINCT entity_id)::float8 AS total_count FROM candidates"
        ),
        binds: builder.into_binds(),
    }
}

fn build_grouped(spec: &GroupedSpec<'_>) -> AppResult<(Statement, AggregationColumns)> {
    let mut builder = SqlBuilder::new();
    let candidate_sql = candidate::candidate_cte(spec.entity_type, spec.filters, &mut builder);

    // Pivot CTE: one row per entity, one column per referenced field. An
    // aggregation without field references counts candidates directly.
    let pivot_cte = if spec.pivot_fields.is_empty() {
        "SELECT entity_id FROM candidates".to_owned()
    } else {
        let mut pivot_columns = vec!["idx.entity_id".to_owned()];
        for field in &spec.pivot_fields {
            let alias = safe_identifier(&field_to_alias(field))?;
            let path = builder.bind(BindValue::Text(field.clone()));
            pivot_columns.push(format!(
                "max(CASE WHEN idx.path = ({path})::ltree THEN idx.value END) AS {alias}"
            ));
        }
        let paths = builder.bind(BindValue::TextArray(spec.pivot_fields.clone()));
        format!(
            "SELECT {} FROM search_index idx \
             WHERE idx.entity_id IN (SELECT entity_id FROM candidates) \
               AND idx.path::text = ANY({paths}) \
             GROUP BY idx.entity_id",
            pivot_columns.join(", ")
        )
    };

    // Grouping and aggregation columns over the pivot.
    let mut group_aliases = Vec::new();
    let mut group_select = Vec::new();
    let mut group_exprs = Vec::new();
    for field in spec.group_by {
        let alias = safe_identifier(&field_to_alias(field))?;
        group_select.push(alias.clone());
        group_exprs.push(alias.clone());
        group_aliases.push(alias);
    }
    let mut temporal_aliases = Vec::new();
    for grouping in spec.temporal_group_by {
        let field_alias = safe_identifier(&field_to_alias(&grouping.field))?;
        let alias = safe_identifier(&grouping.column_alias())?;
        let expression = format!(
            "date_trunc('{}', ({field_alias})::timestamptz)",
            grouping.period.as_str()
        );
        group_select.push(format!("{expression} AS {alias}"));
        group_exprs.push(expression);
        group_aliases.push(alias.clone());
        temporal_aliases.push(alias);
    }

    let mut aggregation_aliases = Vec::new();
    let mut aggregation_select = Vec::new();
    for aggregation in &spec.aggregations {
        let alias = safe_identifier(aggregation.alias())?;
        let expression = match aggregation.field() {
            None => format!("count(entity_id) AS {alias}"),
            Some(field) => {
                let field_alias = safe_identifier(&field_to_alias(field))?;
                format!("{}(({field_alias})::integer) AS {alias}", aggregation.sql_fn())
            }
        };
        aggregation_select.push(expression);
        aggregation_aliases.push(alias);
    }

    // Outer projection normalizes output: groups as text, numbers as float8.
    let mut outer_columns = Vec::new();
    for alias in &group_aliases {
        outer_columns.push(format!("({alias})::text AS {alias}"));
    }
    for alias in &aggregation_aliases {
        outer_columns.push(format!("({alias})::float8 AS {alias}"));
    }

    let mut cumulative_aliases = Vec::new();
    if spec.cumulative {
        let [temporal_alias] = temporal_aliases.as_slice() else {
            return Err(AppError::Validation(
                "cumulative aggregation requires exactly one temporal grouping".to_owned(),
            ));
        };
        for alias in &aggregation_aliases {
            let cumulative_alias = format!("{alias}_cumulative");
            outer_columns.push(format!(
                "(sum({alias}) OVER (ORDER BY {temporal_alias}))::float8 AS {cumulative_alias}"
            ));
            cumulative_aliases.push(cumulative_alias);
        }
    }

    let order_clause = build_order_clause(
        spec,
        &group_aliases,
        &aggregation_aliases,
        &cumulative_aliases,
        &temporal_aliases,
    )?;

    let group_by_clause = if group_exprs.is_empty() {
        String::new()
    } else {
        format!(" GROUP BY {}", group_exprs.join(", "))
    };
    let sql = format!(
        "WITH candidates AS ({candidate_sql}), \
         pivoted_entities AS ({pivot_cte}), \
         grouped AS ( \
             SELECT {group_and_aggregations} \
             FROM pivoted_entities{group_by_clause} \
         ) \
         SELECT {outer} FROM grouped{order_clause}",
        group_and_aggregations = group_select
            .iter()
            .chain(aggregation_select.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        outer = outer_columns.join(", "),
    );

    let mut aggregation_aliases = aggregation_aliases;
    aggregation_aliases.extend(cumulative_aliases);

    Ok((
        Statement {
            label: "aggregation",
            sql,
            binds: builder.into_binds(),
        },
        AggregationColumns {
            group_aliases,
            aggregation_aliases,
        },
    ))
}

fn build_order_clause(
    spec: &GroupedSpec<'_>,
    group_aliases: &[String],
    aggregation_aliases: &[String],
    cumulative_aliases: &[String],
    temporal_aliases: &[String],
) -> AppResult<String> {
    if !spec.order_by.is_empty() {
        let mut parts = Vec::new();
        for order in spec.order_by {
            let alias = safe_identifier(&field_to_alias(&order.field))?;
            let known = group_aliases.contains(&alias)
                || aggregation_aliases.contains(&alias)
                || cumulative_aliases.contains(&alias);
            if !known {
                return Err(AppError::Validation(format!(
                    "order_by field '{}' is not a grouping or aggregation column",
                    order.field
                )));
            }
            parts.push(format!("{alias} {}", order.direction.sql()));
        }
        return Ok(format!(" ORDER BY {}", parts.join(", ")));
    }

    // Cumulative output must stay in temporal order; plain groupings get a
    // deterministic default order over their aliases.
    if spec.cumulative {
        if let [temporal_alias] = temporal_aliases {
            return Ok(format!(" ORDER BY {temporal_alias} ASC"));
        }
    }
    if group_aliases.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(" ORDER BY {} ASC", group_aliases.join(" ASC, ")))
}

async fn fetch_rows(
    pool: &PgPool,
    statement: &Statement,
    columns: &AggregationColumns,
) -> AppResult<Vec<AggregationResult>> {
    let rows = apply_binds(sqlx::query(&statement.sql), &statement.binds)
        .fetch_all(pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to execute aggregation query: {error}"))
        })?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let mut group_values = BTreeMap::new();
        for alias in &columns.group_aliases {
            let value: Option<String> = row.try_get(alias.as_str()).map_err(|error| {
                AppError::Internal(format!("missing grouping column '{alias}': {error}"))
            })?;
            group_values.insert(alias.clone(), value.unwrap_or_default());
        }

        let mut aggregations = BTreeMap::new();
        for alias in &columns.aggregation_aliases {
            let value: Option<f64> = row.try_get(alias.as_str()).map_err(|error| {
                AppError::Internal(format!("missing aggregation column '{alias}': {error}"))
            })?;
            aggregations.insert(alias.clone(), value.unwrap_or_default());
        }

        results.push(AggregationResult {
            group_values,
            aggregations,
        });
    }
    Ok(results)
}

/// Rejects aliases that cannot be spliced as SQL identifiers.
fn safe_identifier(alias: &str) -> AppResult<String> {
    let valid = !alias.is_empty()
        && alias
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(AppError::Validation(format!(
            "'{alias}' is not a valid aggregation column name"
        )));
    }
    Ok(alias.to_owned())
}
