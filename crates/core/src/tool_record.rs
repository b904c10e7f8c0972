//! Catalog entries describing tools: built-ins and user-created customs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Builtin,
    Custom,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "builtin" => Some(Self::Builtin),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// A named, versioned capability with a declared parameter contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    /// JSON-schema-like contract: `required` + `properties` with type tags.
    pub schema: serde_json::Value,
    pub kind: ToolKind,
    /// Bumped whenever description, schema or kind change.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ToolRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        kind: ToolKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            schema,
            kind,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
