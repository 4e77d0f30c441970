use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use searchlight_core::{EntityType, ExtractedField, FieldKind};
use searchlight_domain::DomainEntity;
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::ports::SubscriptionModelRegistry;

/// Recursion cap of the document walk.
pub const MAX_TRAVERSAL_DEPTH: usize = 40;

/// Walks a JSON document into a deterministically sorted field list.
///
/// Objects recurse with dotted paths, single-element lists are flattened,
/// longer lists emit index-suffixed paths, and nulls are elided. Fields are
/// sorted by segment count, then lexicographically by path.
#[must_use]
pub fn traverse_document(document: &Value, root_label: &str) -> Vec<ExtractedField> {
    let mut fields = Vec::new();
    walk(document, root_label, 0, &mut fields);
    sort_fields(fields)
}

fn walk(data: &Value, path: &str, depth: usize, out: &mut Vec<ExtractedField>) {
    if depth >= MAX_TRAVERSAL_DEPTH {
        error!(path, "max recursion depth reached while traversing; truncating");
        return;
    }

    match data {
        Value::Object(map) => {
            for (key, value) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(value, &child_path, depth + 1, out);
            }
        }
        Value::Array(items) if items.len() == 1 => walk(&items[0], path, depth + 1, out),
        Value::Array(items) => {
            for (position, item) in items.iter().enumerate() {
                walk(item, &format!("{path}.{position}"), depth + 1, out);
            }
        }
        Value::Null => {}
        scalar => out.push(ExtractedField::from_value(path, scalar)),
    }
}

fn sort_fields(mut fields: Vec<ExtractedField>) -> Vec<ExtractedField> {
    fields.sort_by(|a, b| {
        a.segment_count()
            .cmp(&b.segment_count())
            .then_with(|| a.path.cmp(&b.path))
    });
    fields
}

/// Walks a domain entity into the fields the indexer stores.
pub trait Traverser: Send + Sync {
    /// Emits the sorted extracted fields of the entity. An entity that
    /// cannot be serialized yields an empty list; the failure is logged,
    /// never propagated, so one bad entity cannot halt a bulk run.
    fn get_fields(
        &self,
        entity: &DomainEntity,
        pk_name: &str,
        root_label: &str,
    ) -> Vec<ExtractedField>;
}

/// Traverser for subscriptions: loads the domain-model document from the
/// registry and walks it.
pub struct SubscriptionTraverser {
    registry: Arc<dyn SubscriptionModelRegistry>,
}

impl SubscriptionTraverser {
    /// Creates a subscription traverser backed by the given registry.
    #[must_use]
    pub fn new(registry: Arc<dyn SubscriptionModelRegistry>) -> Self {
        Self { registry }
    }
}

impl Traverser for SubscriptionTraverser {
    fn get_fields(
        &self,
        entity: &DomainEntity,
        pk_name: &str,
        root_label: &str,
    ) -> Vec<ExtractedField> {
        let DomainEntity::Subscription(record) = entity else {
            warn!(%pk_name, "subscription traverser received a non-subscription entity");
            return Vec::new();
        };

        match self.registry.model_document(record) {
            Ok(document) => traverse_document(&document, root_label),
            Err(error) => {
                error!(
                    subscription_id = %record.subscription_id,
                    %error,
                    "failed to load subscription domain model; skipping"
                );
                Vec::new()
            }
        }
    }
}

/// Traverser for products: core columns plus block-schema markers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProductTraverser;

impl Traverser for ProductTraverser {
    fn get_fields(
        &self,
        entity: &DomainEntity,
        pk_name: &str,
        root_label: &str,
    ) -> Vec<ExtractedField> {
        let DomainEntity::Product(record) = entity else {
            warn!(%pk_name, "product traverser received a non-product entity");
            return Vec::new();
        };

        let document = json!({
            "product_id": record.product_id,
            "name": record.name,
            "description": record.description,
            "product_type": record.product_type,
            "tag": record.tag,
            "status": record.status,
            "created_at": record.created_at.map(|at| at.to_rfc3339()),
        });

        let mut fields = Vec::new();
        walk(&document, root_label, 0, &mut fields);

        let mut seen_blocks: HashSet<&str> = HashSet::new();
        for block in &record.blocks {
            if !seen_blocks.insert(block.name.as_str()) {
                continue;
            }
            fields.push(ExtractedField::marker(
                format!("{root_label}.product_blocks.{}", block.name),
                block.name.clone(),
                FieldKind::Block,
            ));
            for resource_type in &block.resource_types {
                fields.push(ExtractedField::marker(
                    format!("{root_label}.product_blocks.{}.{resource_type}", block.name),
                    resource_type.clone(),
                    FieldKind::ResourceType,
                ));
            }
        }

        sort_fields(fields)
    }
}

/// Traverser for processes: column attributes, the workflow name, and
/// related subscription summaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTraverser;

impl Traverser for ProcessTraverser {
    fn get_fields(
        &self,
        entity: &DomainEntity,
        pk_name: &str,
        root_label: &str,
    ) -> Vec<ExtractedField> {
        let DomainEntity::Process(record) = entity else {
            warn!(%pk_name, "process traverser received a non-process entity");
            return Vec::new();
        };

        // Tracebacks and step payloads stay out of the index.
        let mut subscriptions = record.subscriptions.clone();
        subscriptions.sort_by_key(|summary| summary.subscription_id);

        let document = json!({
            "process_id": record.process_id,
            "workflow_id": record.workflow_id,
            "workflow_name": record.workflow_name,
            "last_status": record.last_status,
            "is_task": record.is_task,
            "created_by": record.created_by,
            "started_at": record.started_at.map(|at| at.to_rfc3339()),
            "last_modified_at": record.last_modified_at.map(|at| at.to_rfc3339()),
            "last_step": record.last_step,
            "subscriptions": subscriptions
                .iter()
                .map(|summary| {
                    json!({
                        "subscription_id": summary.subscription_id,
                        "description": summary.description,
                        "status": summary.status,
                    })
                })
                .collect::<Vec<_>>(),
        });

        traverse_document(&document, root_label)
    }
}

/// Traverser for workflows: column attributes plus a flat, tag-keyed
/// reference per associated product.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowTraverser;

impl Traverser for WorkflowTraverser {
    fn get_fields(
        &self,
        entity: &DomainEntity,
        pk_name: &str,
        root_label: &str,
    ) -> Vec<ExtractedField> {
        let DomainEntity::Workflow(record) = entity else {
            warn!(%pk_name, "workflow traverser received a non-workflow entity");
            return Vec::new();
        };

        let mut document = json!({
            "workflow_id": record.workflow_id,
            "name": record.name,
            "description": record.description,
            "target": record.target,
            "created_at": record.created_at.map(|at| at.to_rfc3339()),
        });

        let mut products = record.products.clone();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        if let Value::Object(map) = &mut document {
            for product in &products {
                let Some(tag) = &product.tag else {
                    warn!(
                        product_name = %product.name,
                        "workflow has an associated product without a tag"
                    );
                    continue;
                };
                map.insert(
                    tag.to_lowercase(),
                    json!({
                        "product_id": product.product_id,
                        "name": product.name,
                        "tag": product.tag,
                        "product_type": product.product_type,
                        "description": product.description,
                        "status": product.status,
                        "created_at": product.created_at.map(|at| at.to_rfc3339()),
                    }),
                );
            }
        }

        traverse_document(&document, root_label)
    }
}

/// Everything the indexer needs to process one entity type.
#[derive(Clone)]
pub struct EntityConfig {
    /// Entity type this configuration serves.
    pub entity_type: EntityType,
    /// Traverser producing the entity's fields.
    pub traverser: Arc<dyn Traverser>,
    /// Primary-key field name, for logging.
    pub pk_name: &'static str,
    /// Root label every path of the entity starts with.
    pub root_label: &'static str,
    /// Path whose value serves as the entity's display title.
    pub title_path: &'static str,
}

/// Lookup of entity configurations, assembled once at startup.
pub struct TraverserRegistry {
    configs: HashMap<EntityType, EntityConfig>,
}

impl TraverserRegistry {
    /// Builds the default registry over all four entity types.
    #[must_use]
    pub fn with_defaults(model_registry: Arc<dyn SubscriptionModelRegistry>) -> Self {
        let mut configs = HashMap::new();
        configs.insert(
            EntityType::Subscription,
            EntityConfig {
                entity_type: EntityType::Subscription,
                traverser: Arc::new(SubscriptionTraverser::new(model_registry)),
                pk_name: "subscription_id",
                root_label: "subscription",
                title_path: "subscription.description",
            },
        );
        configs.insert(
            EntityType::Product,
            EntityConfig {
                entity_type: EntityType::Product,
                traverser: Arc::new(ProductTraverser),
                pk_name: "product_id",
                root_label: "product",
                title_path: "product.description",
            },
        );
        configs.insert(
            EntityType::Process,
            EntityConfig {
                entity_type: EntityType::Process,
                traverser: Arc::new(ProcessTraverser),
                pk_name: "process_id",
                root_label: "process",
                title_path: "process.workflow_name",
            },
        );
        configs.insert(
            EntityType::Workflow,
            EntityConfig {
                entity_type: EntityType::Workflow,
                traverser: Arc::new(WorkflowTraverser),
                pk_name: "workflow_id",
                root_label: "workflow",
                title_path: "workflow.description",
            },
        );

        Self { configs }
    }

    /// Configuration of one entity type.
    #[must_use]
    pub fn get(&self, entity_type: EntityType) -> Option<&EntityConfig> {
        self.configs.get(&entity_type)
    }
}
