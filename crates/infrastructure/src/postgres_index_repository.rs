use std::collections::HashMap;

use async_trait::async_trait;
use pgvector::Vector;
use searchlight_application::IndexRepository;
use searchlight_core::{AppError, AppResult};
use searchlight_domain::IndexRow;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::postgres_search_repository::sql::{BindValue, SqlBuilder, apply_binds};

/// Rows deleted per statement, guarding PostgreSQL's stack depth limit.
const DELETE_BATCH_SIZE: usize = 1000;

/// PostgreSQL-backed writer for the flat index table.
#[derive(Clone)]
pub struct PostgresIndexRepository {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct ExistingHashRow {
    entity_id: Uuid,
    path: String,
    content_hash: String,
}

impl PostgresIndexRepository {
    /// Creates an index repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndexRepository for PostgresIndexRepository {
    async fn existing_hashes(
        &self,
        entity_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, HashMap<String, String>>> {
        if entity_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, ExistingHashRow>(
            r#"
            SELECT entity_id, path::text AS path, content_hash
            FROM search_index
            WHERE entity_id = ANY($1)
            "#,
        )
        .bind(entity_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load existing hashes for {} entities: {error}",
                entity_ids.len()
            ))
        })?;

        let mut hashes: HashMap<Uuid, HashMap<String, String>> = HashMap::new();
        for row in rows {
            hashes
                .entry(row.entity_id)
                .or_default()
                .insert(row.path, row.content_hash);
        }
        Ok(hashes)
    }

    async fn apply_chunk(
        &self,
        stale_paths: &[(Uuid, String)],
        upsert_batches: &[Vec<IndexRow>],
    ) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start index chunk transaction: {error}"))
        })?;

        for batch in stale_paths.chunks(DELETE_BATCH_SIZE) {
            let entity_ids: Vec<Uuid> = batch.iter().map(|(entity_id, _)| *entity_id).collect();
            let paths: Vec<String> = batch.iter().map(|(_, path)| path.clone()).collect();

            sqlx::query(
                r#"
                DELETE FROM search_index
                USING unnest($1::uuid[], $2::text[]) AS stale(entity_id, path)
                WHERE search_index.entity_id = stale.entity_id
                  AND search_index.path::text = stale.path
                "#,
            )
            .bind(&entity_ids)
            .bind(&paths)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to delete batch of {} stale index rows: {error}",
                    batch.len()
                ))
            })?;
            debug!(deleted = batch.len(), "deleted stale index rows");
        }

        for batch in upsert_batches {
            if batch.is_empty() {
                continue;
            }
            let (sql, binds) = build_upsert_statement(batch);
            apply_binds(sqlx::query(&sql), &binds)
                .execute(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Internal(format!(
                        "failed to upsert batch of {} index rows: {error}",
                        batch.len()
                    ))
                })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit index chunk transaction: {error}"))
        })
    }
}

fn build_upsert_statement(batch: &[IndexRow]) -> (String, Vec<BindValue>) {
    let mut builder = SqlBuilder::new();
    let mut value_rows = Vec::with_capacity(batch.len());

    for row in batch {
        let entity_id = builder.bind(BindValue::Uuid(row.entity_id));
        let entity_type = builder.bind(BindValue::Text(row.entity_type.as_str().to_owned()));
        let entity_title = builder.bind(BindValue::OptionalText(row.entity_title.clone()));
        let path = builder.bind(BindValue::Text(row.path.clone()));
        let value = builder.bind(BindValue::Text(row.value.clone()));
        let value_type = builder.bind(BindValue::Text(row.value_type.as_str().to_owned()));
        let content_hash = builder.bind(BindValue::Text(row.content_hash.clone()));
        let embedding = builder.bind(BindValue::OptionalVector(
            row.embedding.clone().map(Vector::from),
        ));

        value_rows.push(format!(
            "({entity_id}, {entity_type}, {entity_title}, ({path})::ltree, {value}, {value_type}, {content_hash}, {embedding})"
        ));
    }

    let sql = format!(
        "INSERT INTO search_index \
         (entity_id, entity_type, entity_title, path, value, value_type, content_hash, embedding) \
         VALUES {} \
         ON CONFLICT (entity_id, path) DO UPDATE SET \
             entity_title = EXCLUDED.entity_title, \
             value = EXCLUDED.value, \
             value_type = EXCLUDED.value_type, \
             content_hash = EXCLUDED.content_hash, \
             embedding = EXCLUDED.embedding",
        value_rows.join(", ")
    );

    (sql, builder.into_binds())
}

#[cfg(test)]
mod tests {
    use searchlight_core::{EntityType, ExtractedField, FieldKind};
    use searchlight_domain::IndexRow;
    use uuid::Uuid;

    use super::build_upsert_statement;

    fn row(path: &str) -> IndexRow {
        IndexRow::from_field(
            Uuid::nil(),
            EntityType::Subscription,
            Some("Core link"),
            &ExtractedField::marker(path, "active", FieldKind::String),
            None,
        )
    }

    #[test]
    fn upsert_updates_all_mutable_columns_on_conflict() {
        let (sql, binds) = build_upsert_statement(&[row("subscription.status")]);

        assert!(sql.contains("ON CONFLICT (entity_id, path) DO UPDATE SET"));
        assert!(sql.contains("content_hash = EXCLUDED.content_hash"));
        assert!(sql.contains("embedding = EXCLUDED.embedding"));
        assert_eq!(binds.len(), 8);
    }

    #[test]
    fn multi_row_upsert_numbers_binds_per_row() {
        let (sql, binds) =
            build_upsert_statement(&[row("subscription.status"), row("subscription.note")]);

        assert!(sql.contains("($1, $2, $3, ($4)::ltree, $5, $6, $7, $8)"));
        assert!(sql.contains("($9, $10, $11, ($12)::ltree, $13, $14, $15, $16)"));
        assert_eq!(binds.len(), 16);
    }
}
