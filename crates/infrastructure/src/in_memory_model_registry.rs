use std::collections::HashMap;

use searchlight_application::SubscriptionModelRegistry;
use searchlight_core::{AppError, AppResult};
use searchlight_domain::SubscriptionRecord;
use serde_json::Value;

/// Model registry holding pre-serialized documents keyed by product name.
///
/// Stands in for the orchestrator's startup-time model registry in tests
/// and demos.
#[derive(Debug, Default, Clone)]
pub struct InMemoryModelRegistry {
    documents: HashMap<String, Value>,
}

impl InMemoryModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the model document of one product.
    #[must_use]
    pub fn with_model(mut self, product_name: impl Into<String>, document: Value) -> Self {
        self.documents.insert(product_name.into(), document);
        self
    }
}

impl SubscriptionModelRegistry for InMemoryModelRegistry {
    fn model_document(&self, subscription: &SubscriptionRecord) -> AppResult<Value> {
        self.documents
            .get(&subscription.product.name)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "product '{}' not in model registry",
                    subscription.product.name
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use searchlight_application::SubscriptionModelRegistry;
    use searchlight_domain::{ProductSummary, SubscriptionRecord};
    use serde_json::json;
    use uuid::Uuid;

    use super::InMemoryModelRegistry;

    fn subscription(product_name: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            subscription_id: Uuid::nil(),
            description: "Core link".to_owned(),
            status: "active".to_owned(),
            insync: true,
            start_date: None,
            end_date: None,
            note: None,
            customer_id: "acme".to_owned(),
            product: ProductSummary {
                product_id: Uuid::nil(),
                name: product_name.to_owned(),
                tag: None,
                product_type: "Network".to_owned(),
                description: "Fiber product".to_owned(),
                status: "active".to_owned(),
                created_at: None,
            },
        }
    }

    #[test]
    fn registered_product_resolves_its_document() {
        let registry =
            InMemoryModelRegistry::new().with_model("Fiber", json!({"status": "active"}));

        let document = registry.model_document(&subscription("Fiber"));
        assert!(document.is_ok_and(|document| document["status"] == "active"));
    }

    #[test]
    fn unknown_product_is_reported_missing() {
        let registry = InMemoryModelRegistry::new();
        assert!(registry.model_document(&subscription("Fiber")).is_err());
    }
}
