use searchlight_core::EntityType;
use searchlight_domain::{
    EqualityOp, FilterCondition, FilterTree, LtreeOp, NumericValue, StringOp,
};

use super::sql::{BindValue, SqlBuilder};

/// Compiles a filter tree into a SQL predicate over the candidate scan.
///
/// Each leaf scopes its condition to the rows carrying the filtered path,
/// so conjunctions across different paths behave as expected in the
/// entity-attribute-value layout.
pub(super) fn compile_tree(
    tree: &FilterTree,
    entity_type: EntityType,
    builder: &mut SqlBuilder,
) -> String {
    match tree {
        FilterTree::Group { op, children } => {
            let parts: Vec<String> = children
                .iter()
                .map(|child| compile_tree(child, entity_type, builder))
                .collect();
            format!("({})", parts.join(&format!(" {} ", op.sql())))
        }
        FilterTree::Path(filter) => compile_leaf(filter, entity_type, builder),
    }
}

fn compile_leaf(
    filter: &searchlight_domain::PathFilter,
    entity_type: EntityType,
    builder: &mut SqlBuilder,
) -> String {
    let entity_placeholder = builder.bind(BindValue::Text(entity_type.as_str().to_owned()));

    if let FilterCondition::Ltree { op, value } = &filter.condition {
        let (negated, path_predicate) = compile_path_predicate(*op, value, builder);
        let membership = if negated { "NOT IN" } else { "IN" };
        return format!(
            "idx.entity_id {membership} (SELECT f.entity_id FROM search_index f \
             WHERE f.entity_type = {entity_placeholder} AND {path_predicate})"
        );
    }

    let path_placeholder = builder.bind(BindValue::Text(filter.path.clone()));
    let value_predicate = compile_value_condition(&filter.condition, builder);
    format!(
        "idx.entity_id IN (SELECT f.entity_id FROM search_index f \
         WHERE f.entity_type = {entity_placeholder} AND f.path = ({path_placeholder})::ltree \
         AND {value_predicate})"
    )
}

fn compile_path_predicate(op: LtreeOp, value: &str, builder: &mut SqlBuilder) -> (bool, String) {
    match op {
        LtreeOp::IsDescendant => {
            let placeholder = builder.bind(BindValue::Text(value.to_owned()));
            (false, format!("f.path <@ ({placeholder})::ltree"))
        }
        LtreeOp::IsAncestor => {
            let placeholder = builder.bind(BindValue::Text(value.to_owned()));
            (false, format!("f.path @> ({placeholder})::ltree"))
        }
        LtreeOp::MatchesLquery => {
            let placeholder = builder.bind(BindValue::Text(value.to_owned()));
            (false, format!("f.path ~ ({placeholder})::lquery"))
        }
        LtreeOp::PathMatch => {
            let placeholder = builder.bind(BindValue::Text(value.to_owned()));
            (false, format!("f.path = ({placeholder})::ltree"))
        }
        LtreeOp::HasComponent => {
            let placeholder = builder.bind(BindValue::Text(format!("*.{value}.*")));
            (false, format!("f.path ~ ({placeholder})::lquery"))
        }
        LtreeOp::NotHasComponent => {
            let placeholder = builder.bind(BindValue::Text(format!("*.{value}.*")));
            (true, format!("f.path ~ ({placeholder})::lquery"))
        }
    }
}

fn compile_value_condition(condition: &FilterCondition, builder: &mut SqlBuilder) -> String {
    match condition {
        FilterCondition::Equality { op, value } => {
            let placeholder = builder.bind(BindValue::Text(value.clone()));
            let operator = match op {
                EqualityOp::Eq => "=",
                EqualityOp::Neq => "!=",
            };
            format!("f.value {operator} {placeholder}")
        }
        FilterCondition::String { op, value } => {
            let placeholder = builder.bind(BindValue::Text(value.clone()));
            match op {
                StringOp::Eq => format!("f.value = {placeholder}"),
                StringOp::Neq => format!("f.value != {placeholder}"),
                StringOp::Like => format!("f.value LIKE {placeholder}"),
            }
        }
        FilterCondition::Numeric { op, value } => {
            let cast = numeric_cast(value);
            let placeholder = builder.bind(numeric_bind(value));
            format!("(f.value)::{cast} {} {placeholder}", op.sql())
        }
        FilterCondition::NumericBetween { value } => {
            let cast = numeric_cast(&value.start);
            let start = builder.bind(numeric_bind(&value.start));
            let end = builder.bind(numeric_bind(&value.end));
            format!("((f.value)::{cast} >= {start} AND (f.value)::{cast} <= {end})")
        }
        FilterCondition::Date { op, value } => {
            let placeholder = builder.bind(BindValue::Text(value.clone()));
            format!(
                "(f.value)::TIMESTAMPTZ {} ({placeholder})::TIMESTAMPTZ",
                op.sql()
            )
        }
        FilterCondition::DateBetween { value } => {
            let start = builder.bind(BindValue::Text(value.start.clone()));
            let end = builder.bind(BindValue::Text(value.end.clone()));
            format!(
                "((f.value)::TIMESTAMPTZ >= ({start})::TIMESTAMPTZ \
                 AND (f.value)::TIMESTAMPTZ < ({end})::TIMESTAMPTZ)"
            )
        }
        FilterCondition::Ltree { .. } => {
            // Handled by compile_leaf; unreachable by construction.
            "TRUE".to_owned()
        }
    }
}

fn numeric_cast(value: &NumericValue) -> &'static str {
    if value.is_int() {
        "INTEGER"
    } else {
        "DOUBLE PRECISION"
    }
}

fn numeric_bind(value: &NumericValue) -> BindValue {
    match value {
        NumericValue::Int(value) => BindValue::Int(*value),
        NumericValue::Float(value) => BindValue::Float(*value),
    }
}

#[cfg(test)]
mod tests {
    use searchlight_core::EntityType;
    use searchlight_domain::{
        CompareOp, DateRange, EqualityOp, FilterCondition, FilterTree, LtreeOp, NumericValue,
        PathFilter,
    };

    use super::super::sql::SqlBuilder;
    use super::compile_tree;

    fn compile(tree: &FilterTree) -> (String, usize) {
        let mut builder = SqlBuilder::new();
        let sql = compile_tree(tree, EntityType::Subscription, &mut builder);
        (sql, builder.into_binds().len())
    }

    #[test]
    fn equality_leaf_scopes_to_the_filtered_path() {
        let tree = FilterTree::path(PathFilter::new(
            "subscription.status",
            FilterCondition::Equality {
                op: EqualityOp::Eq,
                value: "active".to_owned(),
            },
        ));

        let (sql, binds) = compile(&tree);
        assert!(sql.contains("f.path = ($2)::ltree"));
        assert!(sql.contains("f.value = $3"));
        assert_eq!(binds, 3);
    }

    #[test]
    fn groups_join_children_with_their_operator() {
        let leaf = |value: &str| {
            FilterTree::path(PathFilter::new(
                "subscription.status",
                FilterCondition::Equality {
                    op: EqualityOp::Eq,
                    value: value.to_owned(),
                },
            ))
        };
        let tree = FilterTree::or(vec![leaf("active"), leaf("provisioning")]);

        let (sql, _) = compile(&tree);
        assert!(sql.starts_with('('));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn numeric_between_casts_once_per_bound() {
        let range = searchlight_domain::NumericRange::new(
            NumericValue::Int(100),
            NumericValue::Int(1000),
        );
        let Ok(range) = range else {
            panic!("range construction failed");
        };
        let tree = FilterTree::path(PathFilter::new(
            "subscription.port.speed",
            FilterCondition::NumericBetween { value: range },
        ));

        let (sql, _) = compile(&tree);
        assert!(sql.contains("(f.value)::INTEGER >= $3"));
        assert!(sql.contains("(f.value)::INTEGER <= $4"));
    }

    #[test]
    fn date_between_uses_a_half_open_upper_bound() {
        let range = DateRange::new("2025-06-01", "2025-07-01");
        let Ok(range) = range else {
            panic!("range construction failed");
        };
        let tree = FilterTree::path(PathFilter::new(
            "subscription.start_date",
            FilterCondition::DateBetween { value: range },
        ));

        let (sql, _) = compile(&tree);
        assert!(sql.contains(">= ($3)::TIMESTAMPTZ"));
        assert!(sql.contains("< ($4)::TIMESTAMPTZ"));
    }

    #[test]
    fn date_comparison_casts_the_stored_text() {
        let tree = FilterTree::path(PathFilter::new(
            "subscription.start_date",
            FilterCondition::Date {
                op: CompareOp::Gte,
                value: "2025-01-01".to_owned(),
            },
        ));

        let (sql, _) = compile(&tree);
        assert!(sql.contains("(f.value)::TIMESTAMPTZ >= ($3)::TIMESTAMPTZ"));
    }

    #[test]
    fn has_component_wraps_the_component_in_an_lquery() {
        let tree = FilterTree::path(PathFilter::new(
            "port",
            FilterCondition::Ltree {
                op: LtreeOp::HasComponent,
                value: String::new(),
            },
        ));

        let (sql, _) = compile(&tree);
        assert!(sql.contains("f.path ~ ($2)::lquery"));
        assert!(sql.contains("entity_id IN"));
    }

    #[test]
    fn not_has_component_negates_the_membership() {
        let tree = FilterTree::path(PathFilter::new(
            "port",
            FilterCondition::Ltree {
                op: LtreeOp::NotHasComponent,
                value: String::new(),
            },
        ));

        let (sql, _) = compile(&tree);
        assert!(sql.contains("entity_id NOT IN"));
    }

    #[test]
    fn descendant_operator_compiles_to_ltree_containment() {
        let tree = FilterTree::path(PathFilter::new(
            "*",
            FilterCondition::Ltree {
                op: LtreeOp::IsDescendant,
                value: "subscription.port".to_owned(),
            },
        ));

        let (sql, _) = compile(&tree);
        assert!(sql.contains("f.path <@ ($2)::ltree"));
    }
}
