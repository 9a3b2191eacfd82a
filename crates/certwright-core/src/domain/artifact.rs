//! Artifact - 生成済み証明書ファイル

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ids::Identifier;

/// File extension of every artifact.
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// The generated document for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Identifier,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// `<id>.pdf`
    pub fn file_name(id: &Identifier) -> String {
        format!("{}.{}", id.as_str(), ARTIFACT_EXTENSION)
    }
}

/// What the pipeline needs to render one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub id: Identifier,
    pub display_name: String,
}

impl GenerationRequest {
    pub fn new(id: Identifier, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}
