use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use searchlight_core::{AppError, AppResult, ExtractedField, content_hash};
use searchlight_domain::{DomainEntity, IndexRow};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::ports::{Embedder, IndexRepository, Tokenizer};
use crate::traverse::EntityConfig;

/// Options of one indexing run.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Log what would change without writing or calling the embedder.
    pub dry_run: bool,
    /// Ignore stored hashes and reindex every field.
    pub force_index: bool,
    /// Entities processed per transaction.
    pub chunk_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force_index: false,
            chunk_size: 1000,
        }
    }
}

/// Indexes entities of one type with streaming chunked writes.
///
/// Entities accumulate into chunks of `chunk_size`. Each chunk is diffed
/// against stored content hashes, stale paths are deleted, and changed
/// fields are upserted in token-budgeted embedding batches. A chunk's
/// deletes and upserts apply atomically; embedding calls happen before the
/// transaction so no API round-trip runs inside it.
pub struct IndexService {
    entity_config: EntityConfig,
    repository: Arc<dyn IndexRepository>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn Tokenizer>,
    config: SearchConfig,
    options: IndexOptions,
}

struct PendingField {
    entity_id: Uuid,
    title: Option<String>,
    field: ExtractedField,
}

impl IndexService {
    /// Creates an indexing service for one entity type.
    #[must_use]
    pub fn new(
        entity_config: EntityConfig,
        repository: Arc<dyn IndexRepository>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn Tokenizer>,
        config: SearchConfig,
        options: IndexOptions,
    ) -> Self {
        Self {
            entity_config,
            repository,
            embedder,
            tokenizer,
            config,
            options,
        }
    }

    /// Runs the pipeline over the given entities and returns the number of
    /// upserted records.
    pub async fn run(
        &self,
        entities: impl IntoIterator<Item = DomainEntity>,
    ) -> AppResult<usize> {
        let mut chunk: Vec<DomainEntity> = Vec::new();
        let mut total_processed = 0_usize;
        let mut total_identical = 0_usize;

        for entity in entities {
            chunk.push(entity);
            if chunk.len() >= self.options.chunk_size {
                let (processed, identical) = self.process_chunk(&chunk).await?;
                total_processed += processed;
                total_identical += identical;
                chunk.clear();
            }
        }

        if !chunk.is_empty() {
            let (processed, identical) = self.process_chunk(&chunk).await?;
            total_processed += processed;
            total_identical += identical;
        }

        if self.options.dry_run {
            info!(
                entity_type = %self.entity_config.entity_type,
                processed = total_processed,
                identical = total_identical,
                "dry run, would have indexed"
            );
        } else {
            info!(
                entity_type = %self.entity_config.entity_type,
                processed = total_processed,
                identical = total_identical,
                "indexing done"
            );
        }
        Ok(total_processed)
    }

    async fn process_chunk(&self, chunk: &[DomainEntity]) -> AppResult<(usize, usize)> {
        if chunk.is_empty() {
            return Ok((0, 0));
        }

        let entity_ids: Vec<Uuid> = chunk.iter().map(DomainEntity::id).collect();
        let existing = if self.options.force_index {
            HashMap::new()
        } else {
            self.repository.existing_hashes(&entity_ids).await?
        };

        let mut upserts: Vec<PendingField> = Vec::new();
        let mut stale: Vec<(Uuid, String)> = Vec::new();
        let mut identical = 0_usize;

        for entity in chunk {
            let entity_id = entity.id();
            let fields = self.entity_config.traverser.get_fields(
                entity,
                self.entity_config.pk_name,
                self.entity_config.root_label,
            );
            if fields.is_empty() {
                warn!(pk = %entity_id, "traverser returned 0 fields; leaving entity untouched");
                continue;
            }

            let title = entity.title().map(str::to_owned);
            let entity_hashes = existing.get(&entity_id);
            let mut current_paths: HashSet<&str> = HashSet::new();

            for field in &fields {
                let hash = content_hash(
                    &field.path,
                    &field.value,
                    field.value_type,
                    title.as_deref(),
                );
                let unchanged = entity_hashes
                    .and_then(|hashes| hashes.get(&field.path))
                    .is_some_and(|stored| *stored == hash);

                if unchanged {
                    identical += 1;
                } else {
                    upserts.push(PendingField {
                        entity_id,
                        title: title.clone(),
                        field: field.clone(),
                    });
                }
            }

            for field in &fields {
                current_paths.insert(field.path.as_str());
            }
            if let Some(hashes) = entity_hashes {
                for path in hashes.keys() {
                    if !current_paths.contains(path.as_str()) {
                        stale.push((entity_id, path.clone()));
                    }
                }
            }
        }

        let processed = upserts.len();
        let batches = self.build_upsert_batches(upserts).await?;

        if self.options.dry_run {
            debug!(
                upserts = processed,
                deletes = stale.len(),
                identical,
                "dry run: skipping index writes"
            );
            return Ok((processed, identical));
        }

        if !stale.is_empty() || batches.iter().any(|batch| !batch.is_empty()) {
            self.repository.apply_chunk(&stale, &batches).await?;
        }
        debug!(
            upserts = processed,
            deletes = stale.len(),
            identical,
            "indexed chunk"
        );
        Ok((processed, identical))
    }

    /// Streams changed fields into upsert batches using a two-list buffer:
    /// embeddable fields accumulate against the token budget and flush into
    /// a batch together with whatever non-embeddable fields piled up.
    async fn build_upsert_batches(
        &self,
        fields: Vec<PendingField>,
    ) -> AppResult<Vec<Vec<IndexRow>>> {
        let token_budget = self.config.token_budget()?;
        let max_context = self.config.max_context_tokens()?;
        let max_batch_size = self.config.embedding_max_batch_size;

        let mut batches: Vec<Vec<IndexRow>> = Vec::new();
        let mut embeddable: Vec<PendingField> = Vec::new();
        let mut non_embeddable: Vec<IndexRow> = Vec::new();
        let mut current_tokens = 0_usize;

        for pending in fields {
            if !pending
                .field
                .value_type
                .is_embeddable(&pending.field.value)
            {
                non_embeddable.push(self.make_row(&pending, None));
                continue;
            }

            let text = IndexRow::embedding_text(&pending.field);
            let item_tokens = match self.tokenizer.count_tokens(&text) {
                Ok(count) => count,
                Err(error) => {
                    warn!(path = %pending.field.path, %error, "tokenization failed; skipping field");
                    continue;
                }
            };
            if item_tokens > max_context {
                warn!(
                    path = %pending.field.path,
                    tokens = item_tokens,
                    max_context,
                    "field exceeds embedding context; skipping field"
                );
                continue;
            }

            let over_budget = current_tokens + item_tokens > token_budget;
            let over_batch = max_batch_size.is_some_and(|max| embeddable.len() >= max);
            if !embeddable.is_empty() && (over_budget || over_batch) {
                batches.push(self.flush(&mut embeddable, &mut non_embeddable).await?);
                current_tokens = 0;
            }

            current_tokens += item_tokens;
            embeddable.push(pending);
        }

        if !embeddable.is_empty() || !non_embeddable.is_empty() {
            batches.push(self.flush(&mut embeddable, &mut non_embeddable).await?);
        }
        Ok(batches)
    }

    async fn flush(
        &self,
        embeddable: &mut Vec<PendingField>,
        non_embeddable: &mut Vec<IndexRow>,
    ) -> AppResult<Vec<IndexRow>> {
        let mut batch: Vec<IndexRow> = non_embeddable.drain(..).collect();
        if embeddable.is_empty() {
            return Ok(batch);
        }

        let texts: Vec<String> = embeddable
            .iter()
            .map(|pending| IndexRow::embedding_text(&pending.field))
            .collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts, self.options.dry_run)
            .await?;
        if embeddings.len() != texts.len() {
            return Err(AppError::EmbeddingCountMismatch {
                requested: texts.len(),
                received: embeddings.len(),
            });
        }

        for (pending, embedding) in embeddable.drain(..).zip(embeddings) {
            let embedding = (!embedding.is_empty()).then_some(embedding);
            batch.push(self.make_row(&pending, embedding));
        }
        Ok(batch)
    }

    fn make_row(&self, pending: &PendingField, embedding: Option<Vec<f32>>) -> IndexRow {
        IndexRow::from_field(
            pending.entity_id,
            self.entity_config.entity_type,
            pending.title.as_deref(),
            &pending.field,
            embedding,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use searchlight_core::{AppError, AppResult, EntityType};
    use searchlight_domain::{DomainEntity, IndexRow, ProcessRecord};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use crate::config::SearchConfig;
    use crate::ports::{Embedder, IndexRepository, Tokenizer};
    use crate::traverse::{EntityConfig, ProcessTraverser};

    use super::{IndexOptions, IndexService};

    #[derive(Default)]
    struct FakeIndexRepository {
        hashes: Mutex<HashMap<Uuid, HashMap<String, String>>>,
        applied: Mutex<Vec<(Vec<(Uuid, String)>, Vec<Vec<IndexRow>>)>>,
    }

    #[async_trait]
    impl IndexRepository for FakeIndexRepository {
        async fn existing_hashes(
            &self,
            entity_ids: &[Uuid],
        ) -> AppResult<HashMap<Uuid, HashMap<String, String>>> {
            let hashes = self.hashes.lock().await;
            Ok(entity_ids
                .iter()
                .filter_map(|id| hashes.get(id).map(|paths| (*id, paths.clone())))
                .collect())
        }

        async fn apply_chunk(
            &self,
            stale_paths: &[(Uuid, String)],
            upsert_batches: &[Vec<IndexRow>],
        ) -> AppResult<()> {
            let mut hashes = self.hashes.lock().await;
            for (entity_id, path) in stale_paths {
                if let Some(paths) = hashes.get_mut(entity_id) {
                    paths.remove(path);
                }
            }
            for row in upsert_batches.iter().flatten() {
                hashes
                    .entry(row.entity_id)
                    .or_default()
                    .insert(row.path.clone(), row.content_hash.clone());
            }
            drop(hashes);

            self.applied
                .lock()
                .await
                .push((stale_paths.to_vec(), upsert_batches.to_vec()));
            Ok(())
        }
    }

    struct FakeEmbedder {
        missing_one: bool,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_batch(&self, texts: &[String], dry_run: bool) -> AppResult<Vec<Vec<f32>>> {
            if dry_run {
                return Ok(texts.iter().map(|_| Vec::new()).collect());
            }
            let mut vectors: Vec<Vec<f32>> = texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect();
            if self.missing_one {
                vectors.pop();
            }
            Ok(vectors)
        }

        async fn embed_text(&self, _text: &str) -> AppResult<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct WordCountTokenizer;

    impl Tokenizer for WordCountTokenizer {
        fn count_tokens(&self, text: &str) -> AppResult<usize> {
            if text.contains("untokenizable") {
                return Err(AppError::Internal("tokenizer exploded".to_owned()));
            }
            Ok(text.split_whitespace().count())
        }
    }

    fn process_entity(id: u128, status: &str) -> DomainEntity {
        DomainEntity::Process(ProcessRecord {
            process_id: Uuid::from_u128(id),
            workflow_id: Uuid::from_u128(7),
            workflow_name: "modify_port".to_owned(),
            last_status: status.to_owned(),
            is_task: false,
            created_by: Some("system".to_owned()),
            started_at: None,
            last_modified_at: None,
            last_step: None,
            subscriptions: Vec::new(),
        })
    }

    fn service(
        repository: Arc<FakeIndexRepository>,
        embedder: Arc<FakeEmbedder>,
        options: IndexOptions,
    ) -> IndexService {
        IndexService::new(
            EntityConfig {
                entity_type: EntityType::Process,
                traverser: Arc::new(ProcessTraverser),
                pk_name: "process_id",
                root_label: "process",
                title_path: "process.workflow_name",
            },
            repository,
            embedder,
            Arc::new(WordCountTokenizer),
            SearchConfig::default(),
            options,
        )
    }

    #[tokio::test]
    async fn second_run_without_changes_is_a_no_op() {
        let repository = Arc::new(FakeIndexRepository::default());
        let embedder = Arc::new(FakeEmbedder { missing_one: false });
        let indexer = service(
            Arc::clone(&repository),
            Arc::clone(&embedder),
            IndexOptions::default(),
        );

        let first = indexer.run(vec![process_entity(1, "completed")]).await;
        assert!(first.is_ok_and(|processed| processed > 0));

        let second = indexer.run(vec![process_entity(1, "completed")]).await;
        assert!(second.is_ok_and(|processed| processed == 0));

        let applied = repository.applied.lock().await;
        assert_eq!(applied.len(), 1);
    }

    #[tokio::test]
    async fn changed_value_is_reindexed() {
        let repository = Arc::new(FakeIndexRepository::default());
        let embedder = Arc::new(FakeEmbedder { missing_one: false });
        let indexer = service(
            Arc::clone(&repository),
            Arc::clone(&embedder),
            IndexOptions::default(),
        );

        let first = indexer.run(vec![process_entity(1, "running")]).await;
        assert!(first.is_ok());

        let second = indexer.run(vec![process_entity(1, "completed")]).await;
        assert!(second.is_ok_and(|processed| processed == 1));
    }

    #[tokio::test]
    async fn renamed_path_produces_one_delete_and_one_insert() {
        let repository = Arc::new(FakeIndexRepository::default());
        repository.hashes.lock().await.insert(
            Uuid::from_u128(1),
            HashMap::from([("process.old_name".to_owned(), "stale-hash".to_owned())]),
        );
        let embedder = Arc::new(FakeEmbedder { missing_one: false });
        let indexer = service(
            Arc::clone(&repository),
            Arc::clone(&embedder),
            IndexOptions::default(),
        );

        let run = indexer.run(vec![process_entity(1, "completed")]).await;
        assert!(run.is_ok());

        let applied = repository.applied.lock().await;
        let Some((stale, _batches)) = applied.first() else {
            panic!("expected one apply_chunk call");
        };
        assert_eq!(
            stale.as_slice(),
            [(Uuid::from_u128(1), "process.old_name".to_owned())]
        );
    }

    #[tokio::test]
    async fn embedding_count_mismatch_is_a_hard_error() {
        let repository = Arc::new(FakeIndexRepository::default());
        let embedder = Arc::new(FakeEmbedder { missing_one: true });
        let indexer = service(
            Arc::clone(&repository),
            Arc::clone(&embedder),
            IndexOptions::default(),
        );

        let run = indexer.run(vec![process_entity(1, "completed")]).await;
        assert!(matches!(
            run,
            Err(AppError::EmbeddingCountMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let repository = Arc::new(FakeIndexRepository::default());
        let embedder = Arc::new(FakeEmbedder { missing_one: false });
        let indexer = service(
            Arc::clone(&repository),
            Arc::clone(&embedder),
            IndexOptions {
                dry_run: true,
                ..IndexOptions::default()
            },
        );

        let run = indexer.run(vec![process_entity(1, "completed")]).await;
        assert!(run.is_ok_and(|processed| processed > 0));
        assert!(repository.applied.lock().await.is_empty());
    }

    #[tokio::test]
    async fn force_index_reindexes_unchanged_entities() {
        let repository = Arc::new(FakeIndexRepository::default());
        let embedder = Arc::new(FakeEmbedder { missing_one: false });
        let indexer = service(
            Arc::clone(&repository),
            Arc::clone(&embedder),
            IndexOptions::default(),
        );
        let seeded = indexer.run(vec![process_entity(1, "completed")]).await;
        assert!(seeded.is_ok());

        let forced = service(
            Arc::clone(&repository),
            Arc::clone(&embedder),
            IndexOptions {
                force_index: true,
                ..IndexOptions::default()
            },
        );
        let rerun = forced.run(vec![process_entity(1, "completed")]).await;
        assert!(rerun.is_ok_and(|processed| processed > 0));
    }
}
