//! Publishing an adapter's rules as fixed-shape rows.
//!
//! # Purpose
//! Reads every rule through a freshly built engine and returns them as
//! `CasbinRule` rows: permission rules first, then grouping rules when the
//! model declares roles. Both groups keep engine order, so two syncs without
//! an intervening mutation return identical output.
use crate::model::{CasbinAdapter, CasbinRule, GROUPING_TYPE, PERMISSION_TYPE, rules_from_matrix};
use crate::policy::engine::PolicyEngine;
use crate::policy::error::{PolicyError, PolicyResult};
use crate::policy::factory::EnforcerFactory;
use crate::store::ModelStore;
use tracing::{debug, instrument};

/// Every rule in `adapter`'s table, padded to six value fields.
///
/// # Errors
/// - `ModelNotFound` when the adapter's model is not stored. The message
///   names the `owner/model` lookup id.
/// - Any `EnforcerFactory::build_enforcer` failure, unchanged.
#[instrument(skip_all, fields(adapter = %adapter.id()))]
pub async fn sync_policies(
    models: &(impl ModelStore + ?Sized),
    factory: &EnforcerFactory,
    adapter: &CasbinAdapter,
) -> PolicyResult<Vec<CasbinRule>> {
    let model = models
        .get_model(&adapter.owner, &adapter.model)
        .await?
        .ok_or_else(|| PolicyError::ModelNotFound(adapter.model_id().to_string()))?;

    let engine = factory.build_enforcer(&model.model_text, adapter).await?;
    let mut rules = rules_from_matrix(PERMISSION_TYPE, &engine.policy_rows());
    if model.has_role_definition() {
        rules.extend(rules_from_matrix(GROUPING_TYPE, &engine.grouping_rows()));
    }

    metrics::counter!("policy_adapter_sync_rules_total").increment(rules.len() as u64);
    debug!(rules = rules.len(), "synced policies");
    Ok(rules)
}
