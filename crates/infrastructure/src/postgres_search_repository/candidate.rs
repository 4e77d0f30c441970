use searchlight_core::EntityType;
use searchlight_domain::FilterTree;

use super::filters;
use super::sql::{BindValue, SqlBuilder};

/// Compiles the candidate CTE body: the distinct filtered entity set every
/// retriever and aggregation operates on.
pub(super) fn candidate_cte(
    entity_type: EntityType,
    filter_tree: Option<&FilterTree>,
    builder: &mut SqlBuilder,
) -> String {
    let entity_placeholder = builder.bind(BindValue::Text(entity_type.as_str().to_owned()));
    let mut sql = format!(
        "SELECT DISTINCT idx.entity_id, idx.entity_title FROM search_index idx \
         WHERE idx.entity_type = {entity_placeholder}"
    );

    if let Some(tree) = filter_tree {
        let predicate = filters::compile_tree(tree, entity_type, builder);
        sql.push_str(" AND ");
        sql.push_str(&predicate);
    }
    sql
}

#[cfg(test)]
mod tests {
    use searchlight_core::EntityType;
    use searchlight_domain::{EqualityOp, FilterCondition, FilterTree, PathFilter};

    use super::super::sql::SqlBuilder;
    use super::candidate_cte;

    #[test]
    fn unfiltered_candidates_select_by_entity_type_only() {
        let mut builder = SqlBuilder::new();
        let sql = candidate_cte(EntityType::Workflow, None, &mut builder);

        assert!(sql.contains("SELECT DISTINCT idx.entity_id, idx.entity_title"));
        assert!(sql.contains("idx.entity_type = $1"));
        assert_eq!(builder.into_binds().len(), 1);
    }

    #[test]
    fn filters_append_to_the_candidate_predicate() {
        let tree = FilterTree::path(PathFilter::new(
            "workflow.target",
            FilterCondition::Equality {
                op: EqualityOp::Eq,
                value: "MODIFY".to_owned(),
            },
        ));

        let mut builder = SqlBuilder::new();
        let sql = candidate_cte(EntityType::Workflow, Some(&tree), &mut builder);
        assert!(sql.contains(" AND idx.entity_id IN"));
    }
}
