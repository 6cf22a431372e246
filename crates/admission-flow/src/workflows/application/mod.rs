//! Application step workflow engine: ordered-section navigation, the
//! per-section draft store, and the document-extraction polling/merge
//! subsystem that auto-fills still-empty fields.

pub mod clients;
pub mod domain;
pub mod draft;
pub(crate) mod extraction;
pub(crate) mod merge;
pub(crate) mod navigation;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use clients::{
    ApplicationRecord, ApplicationRecordService, DocumentService, DocumentServiceError,
    ExtractionNotifier, ExtractionResultSet, NullNotifier, RecordServiceError, SectionExtraction,
};
pub use domain::{
    is_empty_value, record_has_content, section_by_key, section_descriptor, ApplicationId,
    DocumentKind, ExtractionJob, ExtractionJobHandle, ExtractionJobStatus, Mode,
    SectionDescriptor, SectionRecord, UploadedFile, SECTIONS, SECTION_COUNT,
};
pub use draft::{
    DraftPersistence, DraftSnapshot, DraftStore, JsonFileDraftPersistence, NullDraftPersistence,
    PersistenceError,
};
pub use extraction::{
    ExtractionConfig, ExtractionOutcome, FileRejection, PollTimer, TokioPollTimer,
};
pub use merge::{apply_extraction, should_apply, EnglishTestKind, MergeReport};
pub use navigation::{StepLocked, StepNavigator};
pub use router::{application_router, StepStatusView};
pub use service::{ApplicationStepService, WorkflowError};
