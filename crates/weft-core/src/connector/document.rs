//! DocumentExporter trait and its object-safe wrapper.
//!
//! Mirrors the `LlmConnector` pattern: an RPITIT trait for implementations
//! plus a `BoxDocumentExporter` wrapper so the action executor can hold the
//! capability behind dynamic dispatch.

use std::future::Future;
use std::pin::Pin;

use weft_types::document::{DocumentError, DocumentExport, DocumentRequest};

/// Trait for document export backends.
pub trait DocumentExporter: Send + Sync {
    /// Render and persist a document, returning the artifact path and record.
    fn export(
        &self,
        request: &DocumentRequest,
    ) -> impl Future<Output = Result<DocumentExport, DocumentError>> + Send;
}

/// Object-safe version of [`DocumentExporter`] with boxed futures.
pub trait DocumentExporterDyn: Send + Sync {
    fn export_boxed<'a>(
        &'a self,
        request: &'a DocumentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentExport, DocumentError>> + Send + 'a>>;
}

impl<T: DocumentExporter> DocumentExporterDyn for T {
    fn export_boxed<'a>(
        &'a self,
        request: &'a DocumentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentExport, DocumentError>> + Send + 'a>> {
        Box::pin(self.export(request))
    }
}

/// Type-erased document exporter.
pub struct BoxDocumentExporter {
    inner: Box<dyn DocumentExporterDyn + Send + Sync>,
}

impl BoxDocumentExporter {
    /// Wrap a concrete `DocumentExporter` in a type-erased box.
    pub fn new<T: DocumentExporter + 'static>(exporter: T) -> Self {
        Self {
            inner: Box::new(exporter),
        }
    }

    /// Render and persist a document.
    pub async fn export(&self, request: &DocumentRequest) -> Result<DocumentExport, DocumentError> {
        self.inner.export_boxed(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;
    use uuid::Uuid;
    use weft_types::document::{DocumentFormat, DocumentRecord};

    struct NullExporter;

    impl DocumentExporter for NullExporter {
        async fn export(
            &self,
            request: &DocumentRequest,
        ) -> Result<DocumentExport, DocumentError> {
            Ok(DocumentExport {
                path: PathBuf::from(format!(
                    "/dev/null/{}.{}",
                    request.name,
                    request.format.extension()
                )),
                record: DocumentRecord {
                    id: Uuid::now_v7(),
                    name: request.name.clone(),
                    format: request.format,
                    created_at: Utc::now(),
                },
            })
        }
    }

    #[tokio::test]
    async fn test_boxed_exporter_delegates() {
        let exporter = BoxDocumentExporter::new(NullExporter);
        let export = exporter
            .export(&DocumentRequest {
                name: "digest".to_string(),
                format: DocumentFormat::Markdown,
                content: "# Digest".to_string(),
            })
            .await
            .unwrap();
        assert!(export.path.ends_with("digest.md"));
        assert_eq!(export.record.name, "digest");
    }
}
