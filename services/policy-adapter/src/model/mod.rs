//! Policy-adapter data model module.
//!
//! # Purpose
//! Re-exports adapter configurations, model definitions, rule rows and the
//! pagination types shared by the store and policy layers.
mod adapter;
mod definition;
mod page;
mod rule;

pub use adapter::{AdapterId, CasbinAdapter, DatabaseKind, MASKED_PASSWORD};
pub use definition::{ModelDefinition, ROLE_DEFINITION_MARKER};
pub use page::{AdapterField, FieldFilter, Page, PageRequest, SortOrder};
pub use rule::{CasbinRule, GROUPING_TYPE, PERMISSION_TYPE, RULE_FIELDS, rules_from_matrix};
pub(crate) use rule::trim_trailing_empty;
