//! Document export boundary types.
//!
//! The engine's `document` action hands interpolated content to a document
//! exporter and records the resulting artifact path in the run context.
//! Rendering backends are external; only the export boundary lives here.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output format of an exported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Markdown,
    Html,
    Text,
}

impl DocumentFormat {
    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "md",
            DocumentFormat::Html => "html",
            DocumentFormat::Text => "txt",
        }
    }
}

impl Default for DocumentFormat {
    fn default() -> Self {
        DocumentFormat::Markdown
    }
}

/// Request to export a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    /// Artifact name (filename stem).
    pub name: String,
    #[serde(default)]
    pub format: DocumentFormat,
    /// Fully interpolated document body.
    pub content: String,
}

/// Bookkeeping record for an exported artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub name: String,
    pub format: DocumentFormat,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful export: the artifact path plus its record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentExport {
    pub path: PathBuf,
    pub record: DocumentRecord,
}

/// Errors from document export operations.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid document name: {0}")]
    InvalidName(String),

    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}
