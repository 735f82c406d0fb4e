//! Single-rule mutations against an adapter's rule table.
//!
//! # Purpose
//! Each operation builds a fresh engine, so it observes the table's current
//! contents, then applies exactly one change and reports whether anything
//! changed. There is no transaction spanning separate calls.
use crate::model::CasbinAdapter;
use crate::policy::engine::{CasbinEngine, PolicyEngine};
use crate::policy::error::PolicyResult;
use crate::policy::factory::EnforcerFactory;
use crate::store::{ModelStore, StoreError};
use tracing::{info, instrument};

/// A missing model surfaces as the store's `NotFound` lookup error.
async fn engine_for(
    models: &(impl ModelStore + ?Sized),
    factory: &EnforcerFactory,
    adapter: &CasbinAdapter,
) -> PolicyResult<CasbinEngine> {
    let model = models
        .get_model(&adapter.owner, &adapter.model)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("model {}", adapter.model_id())))?;
    factory.build_enforcer(&model.model_text, adapter).await
}

fn record(op: &'static str, changed: bool) {
    let changed_label = if changed { "true" } else { "false" };
    metrics::counter!(
        "policy_adapter_policy_mutations_total",
        "op" => op,
        "changed" => changed_label
    )
    .increment(1);
    info!(op, changed, "policy mutation applied");
}

/// Add one permission rule. `Ok(false)` when the rule is already present.
///
/// # Errors
/// - `Store(StoreError::NotFound)` when the adapter's model is not stored.
/// - `Validation` when the rule has no non-empty field.
/// - Enforcer build and rule-storage failures.
#[instrument(skip_all, fields(adapter = %adapter.id()))]
pub async fn add_policy(
    models: &(impl ModelStore + ?Sized),
    factory: &EnforcerFactory,
    adapter: &CasbinAdapter,
    rule: Vec<String>,
) -> PolicyResult<bool> {
    let mut engine = engine_for(models, factory, adapter).await?;
    let changed = engine.add_policy(rule).await?;
    record("add", changed);
    Ok(changed)
}

/// Remove one permission rule. `Ok(false)` when the rule is absent.
///
/// # Errors
/// Same as [`add_policy`].
#[instrument(skip_all, fields(adapter = %adapter.id()))]
pub async fn remove_policy(
    models: &(impl ModelStore + ?Sized),
    factory: &EnforcerFactory,
    adapter: &CasbinAdapter,
    rule: Vec<String>,
) -> PolicyResult<bool> {
    let mut engine = engine_for(models, factory, adapter).await?;
    let changed = engine.remove_policy(rule).await?;
    record("remove", changed);
    Ok(changed)
}

/// Replace `old` with `new`. `Ok(false)` when `old` is absent.
///
/// # Errors
/// Same as [`add_policy`]; both rules are validated.
#[instrument(skip_all, fields(adapter = %adapter.id()))]
pub async fn update_policy(
    models: &(impl ModelStore + ?Sized),
    factory: &EnforcerFactory,
    adapter: &CasbinAdapter,
    old: Vec<String>,
    new: Vec<String>,
) -> PolicyResult<bool> {
    let mut engine = engine_for(models, factory, adapter).await?;
    let changed = engine.update_policy(old, new).await?;
    record("update", changed);
    Ok(changed)
}
