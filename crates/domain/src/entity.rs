use chrono::{DateTime, Utc};
use searchlight_core::EntityType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat product reference carried by subscriptions and workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    /// Product id.
    pub product_id: Uuid,
    /// Product name.
    pub name: String,
    /// Short product tag, used as a nesting key in workflow traversal.
    pub tag: Option<String>,
    /// Product type label.
    pub product_type: String,
    /// Product description.
    pub description: String,
    /// Lifecycle status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

/// A customer subscription handed to the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Subscription id.
    pub subscription_id: Uuid,
    /// Display description, used as the entity title.
    pub description: String,
    /// Lifecycle status.
    pub status: String,
    /// Whether the subscription is in sync with the network.
    pub insync: bool,
    /// Activation date.
    pub start_date: Option<DateTime<Utc>>,
    /// Termination date.
    pub end_date: Option<DateTime<Utc>>,
    /// Free-form note.
    pub note: Option<String>,
    /// Owning customer id.
    pub customer_id: String,
    /// Product the subscription instantiates.
    pub product: ProductSummary,
}

/// Flat subscription reference carried by processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    /// Subscription id.
    pub subscription_id: Uuid,
    /// Display description.
    pub description: String,
    /// Lifecycle status.
    pub status: String,
}

/// One product block of a product's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductBlockDefinition {
    /// Block name.
    pub name: String,
    /// Leaf resource types of the block.
    pub resource_types: Vec<String>,
}

/// A product definition handed to the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Product id.
    pub product_id: Uuid,
    /// Product name.
    pub name: String,
    /// Display description, used as the entity title.
    pub description: String,
    /// Product type label.
    pub product_type: String,
    /// Short product tag.
    pub tag: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Block schema of the product.
    pub blocks: Vec<ProductBlockDefinition>,
}

/// A workflow execution record handed to the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process id.
    pub process_id: Uuid,
    /// Executed workflow id.
    pub workflow_id: Uuid,
    /// Executed workflow name, used as the entity title.
    pub workflow_name: String,
    /// Last reported status.
    pub last_status: String,
    /// Whether the process is a system task.
    pub is_task: bool,
    /// User that started the process.
    pub created_by: Option<String>,
    /// Start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Last modification timestamp.
    pub last_modified_at: Option<DateTime<Utc>>,
    /// Name of the last executed step.
    pub last_step: Option<String>,
    /// Subscriptions the process operates on.
    pub subscriptions: Vec<SubscriptionSummary>,
}

/// A workflow definition handed to the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Workflow id.
    pub workflow_id: Uuid,
    /// Workflow name.
    pub name: String,
    /// Display description, used as the entity title.
    pub description: Option<String>,
    /// Lifecycle target of the workflow.
    pub target: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Products the workflow applies to.
    pub products: Vec<ProductSummary>,
}

/// Any entity the indexing pipeline accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum DomainEntity {
    /// A subscription.
    Subscription(SubscriptionRecord),
    /// A product.
    Product(ProductRecord),
    /// A process.
    Process(ProcessRecord),
    /// A workflow.
    Workflow(WorkflowRecord),
}

impl DomainEntity {
    /// Primary key of the entity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Subscription(record) => record.subscription_id,
            Self::Product(record) => record.product_id,
            Self::Process(record) => record.process_id,
            Self::Workflow(record) => record.workflow_id,
        }
    }

    /// Kind of the entity.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Subscription(_) => EntityType::Subscription,
            Self::Product(_) => EntityType::Product,
            Self::Process(_) => EntityType::Process,
            Self::Workflow(_) => EntityType::Workflow,
        }
    }

    /// Display title stored alongside every index row of the entity.
    ///
    /// Mirrors the per-entity title paths used when formatting results:
    /// the description for subscriptions, products and workflows, and the
    /// workflow name for processes.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Subscription(record) => Some(record.description.as_str()),
            Self::Product(record) => Some(record.description.as_str()),
            Self::Process(record) => Some(record.workflow_name.as_str()),
            Self::Workflow(record) => record.description.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use searchlight_core::EntityType;
    use uuid::Uuid;

    use super::{DomainEntity, ProcessRecord};

    #[test]
    fn process_title_is_the_workflow_name() {
        let entity = DomainEntity::Process(ProcessRecord {
            process_id: Uuid::nil(),
            workflow_id: Uuid::nil(),
            workflow_name: "modify_port".to_owned(),
            last_status: "completed".to_owned(),
            is_task: false,
            created_by: None,
            started_at: None,
            last_modified_at: None,
            last_step: None,
            subscriptions: Vec::new(),
        });

        assert_eq!(entity.title(), Some("modify_port"));
        assert_eq!(entity.entity_type(), EntityType::Process);
    }
}
