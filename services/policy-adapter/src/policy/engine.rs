//! Casbin enforcer bound to a tenant rule table.
//!
//! # Purpose and responsibility
//! Wraps an in-memory Casbin enforcer that is populated from a `RuleStorage`
//! handle and writes every successful mutation back through it.
//!
//! # Key invariants and assumptions
//! - Mutations reach the rule table before the in-memory enforcer; a storage
//!   failure leaves the enforcer unchanged.
//! - Mutations operate on permission (`p`) rules.
//! - Caller rules with trailing empty fields are treated as their trimmed form,
//!   so padded rows read back from storage round-trip.
//! - A rule that is empty after trimming is rejected before storage is touched.
//!
//! # Security considerations
//! - The model text is tenant-provided and validated before it reaches Casbin.
use crate::model::{CasbinRule, PERMISSION_TYPE, trim_trailing_empty};
use crate::policy::error::{PolicyError, PolicyResult};
use crate::policy::storage::RuleStorage;
use async_trait::async_trait;
use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use std::sync::Arc;
use tracing::debug;

/// Sections every model text must declare.
pub const REQUIRED_SECTIONS: [&str; 4] = [
    "[request_definition]",
    "[policy_definition]",
    "[policy_effect]",
    "[matchers]",
];

/// Policy engine capability consumed by the synchronizer and mutators.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Permission rules in engine order.
    fn policy_rows(&self) -> Vec<Vec<String>>;
    /// Grouping rules in engine order.
    fn grouping_rows(&self) -> Vec<Vec<String>>;
    async fn add_policy(&mut self, rule: Vec<String>) -> PolicyResult<bool>;
    async fn remove_policy(&mut self, rule: Vec<String>) -> PolicyResult<bool>;
    async fn update_policy(&mut self, old: Vec<String>, new: Vec<String>) -> PolicyResult<bool>;
}

/// Parse model text into a Casbin model.
///
/// # Errors
/// - `InvalidModel` when a required section is missing or Casbin rejects the
///   grammar.
pub async fn parse_model(text: &str) -> PolicyResult<DefaultModel> {
    let missing: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|section| !text.contains(section))
        .collect();
    if !missing.is_empty() {
        return Err(PolicyError::InvalidModel(format!(
            "missing required sections: {}",
            missing.join(", ")
        )));
    }
    DefaultModel::from_str(text)
        .await
        .map_err(|err| PolicyError::InvalidModel(err.to_string()))
}

pub struct CasbinEngine {
    enforcer: Enforcer,
    storage: Arc<dyn RuleStorage>,
}

impl CasbinEngine {
    /// Build an enforcer for `model` and load every stored rule into it.
    ///
    /// Rows whose type the model does not declare are skipped. Role links are
    /// compiled once after loading.
    pub async fn load(model: DefaultModel, storage: Arc<dyn RuleStorage>) -> PolicyResult<Self> {
        let mut enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;
        let rules = storage.load_rules().await?;
        let mut skipped = 0usize;
        for rule in rules {
            let fields = rule.fields();
            let section = section_of(&rule.ptype);
            if fields.is_empty() || !declares(&enforcer, section, &rule.ptype) {
                skipped += 1;
                continue;
            }
            match section {
                "g" => enforcer.add_named_grouping_policy(&rule.ptype, fields).await?,
                _ => enforcer.add_named_policy(&rule.ptype, fields).await?,
            };
        }
        enforcer.build_role_links()?;
        if skipped > 0 {
            debug!(skipped, "skipped rule rows the model does not declare");
        }
        Ok(Self { enforcer, storage })
    }

    fn has_policy(&self, fields: &[String]) -> bool {
        self.enforcer
            .has_named_policy(PERMISSION_TYPE, fields.to_vec())
    }
}

fn section_of(ptype: &str) -> &'static str {
    if ptype.starts_with('g') { "g" } else { "p" }
}

fn declares(enforcer: &Enforcer, section: &str, ptype: &str) -> bool {
    enforcer
        .get_model()
        .get_model()
        .get(section)
        .is_some_and(|assertions| assertions.contains_key(ptype))
}

fn normalize(mut rule: Vec<String>) -> PolicyResult<Vec<String>> {
    trim_trailing_empty(&mut rule);
    if rule.is_empty() {
        return Err(PolicyError::Validation(
            "policy rule has no non-empty fields".to_string(),
        ));
    }
    Ok(rule)
}

#[async_trait]
impl PolicyEngine for CasbinEngine {
    fn policy_rows(&self) -> Vec<Vec<String>> {
        self.enforcer.get_policy()
    }

    fn grouping_rows(&self) -> Vec<Vec<String>> {
        self.enforcer.get_grouping_policy()
    }

    async fn add_policy(&mut self, rule: Vec<String>) -> PolicyResult<bool> {
        let rule = normalize(rule)?;
        if self.has_policy(&rule) {
            return Ok(false);
        }
        self.storage
            .insert_rule(&CasbinRule::from_fields(PERMISSION_TYPE, &rule))
            .await?;
        Ok(self.enforcer.add_named_policy(PERMISSION_TYPE, rule).await?)
    }

    async fn remove_policy(&mut self, rule: Vec<String>) -> PolicyResult<bool> {
        let rule = normalize(rule)?;
        if !self.has_policy(&rule) {
            return Ok(false);
        }
        self.storage
            .delete_rule(&CasbinRule::from_fields(PERMISSION_TYPE, &rule))
            .await?;
        Ok(self
            .enforcer
            .remove_named_policy(PERMISSION_TYPE, rule)
            .await?)
    }

    async fn update_policy(&mut self, old: Vec<String>, new: Vec<String>) -> PolicyResult<bool> {
        let old = normalize(old)?;
        let new = normalize(new)?;
        if !self.has_policy(&old) {
            return Ok(false);
        }
        self.storage
            .replace_rule(
                &CasbinRule::from_fields(PERMISSION_TYPE, &old),
                &CasbinRule::from_fields(PERMISSION_TYPE, &new),
            )
            .await?;
        self.enforcer
            .remove_named_policy(PERMISSION_TYPE, old)
            .await?;
        self.enforcer.add_named_policy(PERMISSION_TYPE, new).await?;
        Ok(true)
    }
}
