use searchlight_core::AppResult;
use searchlight_domain::SubscriptionRecord;
use serde_json::Value;

/// Port resolving the domain-model document of a subscription.
///
/// The orchestrator registers one domain model per product at startup;
/// traversal dumps the model matching the subscription's product and
/// lifecycle. A product missing from the registry or a model that fails to
/// load is reported as an error and the subscription is skipped.
pub trait SubscriptionModelRegistry: Send + Sync {
    /// The serialized domain-model document of the subscription.
    fn model_document(&self, subscription: &SubscriptionRecord) -> AppResult<Value>;
}
