//! Fixed-shape policy rule rows.
//!
//! # Purpose
//! Rules are ordered field lists of arbitrary length inside the engine, but are
//! stored and published as a `ptype` tag plus six positional columns.
use serde::{Deserialize, Serialize};

/// Rule-type tag for permission rules.
pub const PERMISSION_TYPE: &str = "p";
/// Rule-type tag for role/grouping rules.
pub const GROUPING_TYPE: &str = "g";

/// Number of positional value columns in a stored rule row.
pub const RULE_FIELDS: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CasbinRule {
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
    pub v3: String,
    pub v4: String,
    pub v5: String,
}

impl CasbinRule {
    /// Build a row from an engine rule, padding with `""` and dropping any
    /// fields past the sixth.
    pub fn from_fields(ptype: &str, fields: &[String]) -> Self {
        let at = |i: usize| fields.get(i).cloned().unwrap_or_default();
        Self {
            ptype: ptype.to_string(),
            v0: at(0),
            v1: at(1),
            v2: at(2),
            v3: at(3),
            v4: at(4),
            v5: at(5),
        }
    }

    pub fn values(&self) -> [&str; RULE_FIELDS] {
        [
            &self.v0, &self.v1, &self.v2, &self.v3, &self.v4, &self.v5,
        ]
    }

    /// Engine-facing field list: the positional values without trailing
    /// empty columns.
    pub fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.values().iter().map(|v| v.to_string()).collect();
        trim_trailing_empty(&mut fields);
        fields
    }
}

/// Convert an engine rule matrix into tagged rows.
pub fn rules_from_matrix(ptype: &str, matrix: &[Vec<String>]) -> Vec<CasbinRule> {
    matrix
        .iter()
        .map(|fields| CasbinRule::from_fields(ptype, fields))
        .collect()
}

pub(crate) fn trim_trailing_empty(fields: &mut Vec<String>) {
    while fields.last().is_some_and(|field| field.is_empty()) {
        fields.pop();
    }
}
