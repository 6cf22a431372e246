use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::info;

use admission_flow::workflows::application::{
    ApplicationId, ApplicationRecord, ApplicationRecordService, DocumentKind, DocumentService,
    DocumentServiceError, ExtractionJobHandle, ExtractionNotifier, ExtractionResultSet,
    RecordServiceError, SectionExtraction, SectionRecord, UploadedFile,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Record backend keeping applications in process memory; stands in for the
/// remote admissions API during demos and local runs.
#[derive(Default)]
pub(crate) struct InMemoryRecordService {
    records: Mutex<HashMap<ApplicationId, ApplicationRecord>>,
    sequence: AtomicUsize,
}

impl InMemoryRecordService {
    pub(crate) fn stored(&self, id: &ApplicationId) -> Option<ApplicationRecord> {
        self.records
            .lock()
            .expect("record mutex poisoned")
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl ApplicationRecordService for InMemoryRecordService {
    async fn create(&self, initial: &SectionRecord) -> Result<ApplicationId, RecordServiceError> {
        let id = ApplicationId(format!(
            "APL-{:06}",
            self.sequence.fetch_add(1, Ordering::SeqCst) + 1
        ));
        let mut sections = BTreeMap::new();
        sections.insert(0, initial.clone());
        self.records
            .lock()
            .expect("record mutex poisoned")
            .insert(
                id.clone(),
                ApplicationRecord {
                    id: id.clone(),
                    sections,
                    submitted: false,
                },
            );
        Ok(id)
    }

    async fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, RecordServiceError> {
        self.stored(id).ok_or(RecordServiceError::NotFound)
    }

    async fn save_step(
        &self,
        id: &ApplicationId,
        section: usize,
        data: &SectionRecord,
    ) -> Result<(), RecordServiceError> {
        let mut records = self.records.lock().expect("record mutex poisoned");
        let record = records.get_mut(id).ok_or(RecordServiceError::NotFound)?;
        record.sections.insert(section, data.clone());
        Ok(())
    }

    async fn submit(&self, id: &ApplicationId) -> Result<(), RecordServiceError> {
        let mut records = self.records.lock().expect("record mutex poisoned");
        let record = records.get_mut(id).ok_or(RecordServiceError::NotFound)?;
        record.submitted = true;
        Ok(())
    }
}

struct PendingExtraction {
    section_key: &'static str,
    remaining_polls: u32,
    extracted: BTreeMap<String, serde_json::Value>,
}

/// Recognition-service stand-in: each upload schedules a canned extraction
/// that stays "pending" for a configurable number of polls before resolving.
pub(crate) struct StubDocumentService {
    pending_polls: u32,
    jobs: Mutex<HashMap<ApplicationId, PendingExtraction>>,
    sequence: AtomicUsize,
}

impl StubDocumentService {
    pub(crate) fn new(pending_polls: u32) -> Self {
        Self {
            pending_polls,
            jobs: Mutex::new(HashMap::new()),
            sequence: AtomicUsize::new(0),
        }
    }

    fn sample_extraction(
        document_type_id: u32,
    ) -> (&'static str, BTreeMap<String, serde_json::Value>) {
        let passport = DocumentKind::Passport.document_type_id();
        let english = DocumentKind::EnglishTestCertificate.document_type_id();

        let (section_key, fields): (&str, Vec<(&str, serde_json::Value)>) =
            if document_type_id == passport {
                (
                    "personal_details",
                    vec![
                        ("given_name", json!("Jane Quinn")),
                        ("family_name", json!("Doe")),
                        ("gender", json!("F")),
                        ("date_of_birth", json!("01/02/1999")),
                        ("nationality", json!("Australian")),
                        ("passport_number", json!("PA0312402")),
                        ("expiry_date", json!("2031-06-30")),
                    ],
                )
            } else if document_type_id == english {
                (
                    "english_proficiency",
                    vec![
                        ("test_name", json!("IELTS Academic")),
                        ("test_date", json!("12 Mar 2025")),
                        ("overall", json!(7.5)),
                        ("listening", json!(8.0)),
                        ("reading", json!(7.5)),
                        ("writing", json!(7.0)),
                        ("speaking", json!(7.5)),
                        ("trf_number", json!("25AU001234DOEJ001A")),
                    ],
                )
            } else {
                ("personal_details", Vec::new())
            };

        (
            section_key,
            fields
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }
}

#[async_trait]
impl DocumentService for StubDocumentService {
    async fn upload(
        &self,
        application: &ApplicationId,
        document_type_id: u32,
        file: &UploadedFile,
    ) -> Result<ExtractionJobHandle, DocumentServiceError> {
        let (section_key, extracted) = Self::sample_extraction(document_type_id);
        let handle = ExtractionJobHandle(format!(
            "recognition-{:04}",
            self.sequence.fetch_add(1, Ordering::SeqCst) + 1
        ));
        info!(
            application = %application.0,
            file = %file.file_name,
            handle = %handle.0,
            "stub recognition job scheduled"
        );
        self.jobs.lock().expect("job mutex poisoned").insert(
            application.clone(),
            PendingExtraction {
                section_key,
                remaining_polls: self.pending_polls,
                extracted,
            },
        );
        Ok(handle)
    }

    async fn extraction_result(
        &self,
        application: &ApplicationId,
    ) -> Result<ExtractionResultSet, DocumentServiceError> {
        let mut jobs = self.jobs.lock().expect("job mutex poisoned");
        let Some(job) = jobs.get_mut(application) else {
            return Ok(ExtractionResultSet::default());
        };

        let mut sections = BTreeMap::new();
        if job.remaining_polls > 0 {
            job.remaining_polls -= 1;
            sections.insert(
                job.section_key.to_string(),
                SectionExtraction {
                    extracted_data: BTreeMap::new(),
                    pending: job.remaining_polls + 1,
                },
            );
        } else {
            sections.insert(
                job.section_key.to_string(),
                SectionExtraction {
                    extracted_data: job.extracted.clone(),
                    pending: 0,
                },
            );
        }
        Ok(ExtractionResultSet { sections })
    }
}

/// Notifier surfacing auto-fill events in the service logs.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TracingNotifier;

impl ExtractionNotifier for TracingNotifier {
    fn fields_populated(&self, section: usize, count: usize) {
        info!(section, count, "document extraction populated fields");
    }
}
