use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{ApplicationId, ExtractionJobHandle, SectionRecord, UploadedFile};

/// Full backend record returned when hydrating an existing application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub sections: BTreeMap<usize, SectionRecord>,
    pub submitted: bool,
}

/// Error enumeration for application-record backend failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordServiceError {
    #[error("application record not found")]
    NotFound,
    #[error("application service rejected the request: {0}")]
    Rejected(String),
    #[error("application service unavailable: {0}")]
    Unavailable(String),
}

/// Backend application-record API. A remote service with success/failure
/// outcomes; retry and wire format are its own concern.
#[async_trait]
pub trait ApplicationRecordService: Send + Sync {
    /// Create a record from the first saved section, returning the new id.
    async fn create(&self, initial: &SectionRecord) -> Result<ApplicationId, RecordServiceError>;

    async fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, RecordServiceError>;

    async fn save_step(
        &self,
        id: &ApplicationId,
        section: usize,
        data: &SectionRecord,
    ) -> Result<(), RecordServiceError>;

    async fn submit(&self, id: &ApplicationId) -> Result<(), RecordServiceError>;
}

/// Extraction state for one section key as reported by the document service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionExtraction {
    pub extracted_data: BTreeMap<String, Value>,
    /// Count of recognition passes still running for this section.
    pub pending: u32,
}

impl SectionExtraction {
    pub fn is_resolved(&self) -> bool {
        self.pending == 0
    }
}

/// Result payload of one extraction-status poll, keyed by section key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResultSet {
    pub sections: BTreeMap<String, SectionExtraction>,
}

/// Error enumeration for document-service failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentServiceError {
    #[error("document upload rejected: {0}")]
    Rejected(String),
    #[error("document service unavailable: {0}")]
    Transport(String),
}

/// File-upload and recognition-job service. Uploading triggers a server-side
/// recognition job addressed by the returned handle.
#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn upload(
        &self,
        application: &ApplicationId,
        document_type_id: u32,
        file: &UploadedFile,
    ) -> Result<ExtractionJobHandle, DocumentServiceError>;

    async fn extraction_result(
        &self,
        application: &ApplicationId,
    ) -> Result<ExtractionResultSet, DocumentServiceError>;
}

/// Outbound hook raised after a merge so the form layer can refresh inputs.
pub trait ExtractionNotifier: Send + Sync {
    fn fields_populated(&self, section: usize, count: usize);
}

/// Notifier that drops every event; useful for headless callers and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl ExtractionNotifier for NullNotifier {
    fn fields_populated(&self, _section: usize, _count: usize) {}
}
