//! Authorization model definitions.
//!
//! # Purpose
//! A model is an owner-scoped, named grammar text (request, policy, role,
//! effect and matcher sections) that casbin parses into an engine model.
use serde::{Deserialize, Serialize};

/// Section marker whose presence means the model declares grouping rules.
pub const ROLE_DEFINITION_MARKER: &str = "[role_definition]";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub display_name: String,
    pub model_text: String,
}

impl ModelDefinition {
    /// Textual check only; the grammar itself is not parsed here.
    pub fn has_role_definition(&self) -> bool {
        self.model_text.contains(ROLE_DEFINITION_MARKER)
    }
}
