//! Filesystem document exporter.
//!
//! Writes interpolated document content under `<base_dir>/documents/` with
//! an extension derived from the requested format. Rendering beyond plain
//! text (PDF pipelines etc.) is out of scope; this adapter covers the export
//! boundary the engine's `document` action needs.

use std::path::PathBuf;

use chrono::Utc;
use uuid::Uuid;
use weft_core::connector::document::DocumentExporter;
use weft_types::document::{DocumentError, DocumentExport, DocumentRecord, DocumentRequest};

/// Exporter that writes artifacts to a local directory.
pub struct FsDocumentExporter {
    base_dir: PathBuf,
}

impl FsDocumentExporter {
    /// Create an exporter rooted at `base_dir`. Artifacts land in
    /// `<base_dir>/documents/`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn documents_dir(&self) -> PathBuf {
        self.base_dir.join("documents")
    }
}

/// Artifact names become filenames, so they are restricted to a safe set.
fn validate_name(name: &str) -> Result<(), DocumentError> {
    if name.is_empty() {
        return Err(DocumentError::InvalidName(
            "name must not be empty".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DocumentError::InvalidName(format!(
            "'{name}' (only alphanumeric, '-' and '_' allowed)"
        )));
    }
    Ok(())
}

impl DocumentExporter for FsDocumentExporter {
    async fn export(&self, request: &DocumentRequest) -> Result<DocumentExport, DocumentError> {
        validate_name(&request.name)?;

        let dir = self.documents_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DocumentError::Io(e.to_string()))?;

        let path = dir.join(format!("{}.{}", request.name, request.format.extension()));
        tokio::fs::write(&path, &request.content)
            .await
            .map_err(|e| DocumentError::Io(e.to_string()))?;

        tracing::debug!(path = %path.display(), "document exported");

        Ok(DocumentExport {
            path,
            record: DocumentRecord {
                id: Uuid::now_v7(),
                name: request.name.clone(),
                format: request.format,
                created_at: Utc::now(),
            },
        })
    }
}
