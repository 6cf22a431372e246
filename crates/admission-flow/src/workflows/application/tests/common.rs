use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::workflows::application::clients::{
    ApplicationRecord, ApplicationRecordService, DocumentService, DocumentServiceError,
    ExtractionNotifier, ExtractionResultSet, RecordServiceError, SectionExtraction,
};
use crate::workflows::application::domain::{
    ApplicationId, ExtractionJobHandle, SectionRecord, UploadedFile,
};
use crate::workflows::application::draft::{DraftPersistence, DraftSnapshot, PersistenceError};
use crate::workflows::application::extraction::{ExtractionConfig, PollTimer};
use crate::workflows::application::service::ApplicationStepService;

pub(super) fn record_with(entries: &[(&str, Value)]) -> SectionRecord {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub(super) fn personal_details() -> SectionRecord {
    record_with(&[
        ("given_name", json!("Jane")),
        ("family_name", json!("Doe")),
        ("date_of_birth", json!("1999-02-01")),
    ])
}

pub(super) fn pdf_file() -> UploadedFile {
    UploadedFile::new("passport.pdf", "application/pdf", vec![0x25, 0x50, 0x44, 0x46])
}

pub(super) fn exe_file() -> UploadedFile {
    UploadedFile::new("setup.exe", "application/x-msdownload", vec![0x4d, 0x5a])
}

pub(super) fn extraction_set(
    section_key: &str,
    pending: u32,
    fields: &[(&str, Value)],
) -> ExtractionResultSet {
    let mut sections = BTreeMap::new();
    sections.insert(
        section_key.to_string(),
        SectionExtraction {
            extracted_data: fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
            pending,
        },
    );
    ExtractionResultSet { sections }
}

pub(super) fn resolved_passport_extraction() -> ExtractionResultSet {
    extraction_set(
        "personal_details",
        0,
        &[
            ("given_name", json!("Jane Q")),
            ("family_name", json!("Doe")),
            ("gender", json!("F")),
            ("date_of_birth", json!("01/02/1999")),
            ("passport_number", json!("P7654321")),
        ],
    )
}

/// In-memory application-record backend with call counters.
#[derive(Default)]
pub(super) struct MemoryRecordService {
    records: Mutex<HashMap<ApplicationId, ApplicationRecord>>,
    sequence: AtomicUsize,
    pub(super) create_calls: AtomicUsize,
    pub(super) get_calls: AtomicUsize,
    pub(super) save_calls: AtomicUsize,
    pub(super) submit_calls: AtomicUsize,
}

impl MemoryRecordService {
    pub(super) fn with_record(record: ApplicationRecord) -> Self {
        let service = Self::default();
        service
            .records
            .lock()
            .expect("record mutex poisoned")
            .insert(record.id.clone(), record);
        service
    }

    pub(super) fn stored(&self, id: &ApplicationId) -> Option<ApplicationRecord> {
        self.records
            .lock()
            .expect("record mutex poisoned")
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl ApplicationRecordService for MemoryRecordService {
    async fn create(&self, initial: &SectionRecord) -> Result<ApplicationId, RecordServiceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = ApplicationId(format!(
            "app-{:04}",
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
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.stored(id).ok_or(RecordServiceError::NotFound)
    }

    async fn save_step(
        &self,
        id: &ApplicationId,
        section: usize,
        data: &SectionRecord,
    ) -> Result<(), RecordServiceError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().expect("record mutex poisoned");
        let record = records.get_mut(id).ok_or(RecordServiceError::NotFound)?;
        record.sections.insert(section, data.clone());
        Ok(())
    }

    async fn submit(&self, id: &ApplicationId) -> Result<(), RecordServiceError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().expect("record mutex poisoned");
        let record = records.get_mut(id).ok_or(RecordServiceError::NotFound)?;
        record.submitted = true;
        Ok(())
    }
}

type PollHook = Box<dyn Fn(usize) + Send + Sync>;

/// Document service double driven by a queue of scripted poll responses.
/// An exhausted queue keeps answering "still pending".
#[derive(Default)]
pub(super) struct ScriptedDocumentService {
    uploads: Mutex<VecDeque<Result<ExtractionJobHandle, DocumentServiceError>>>,
    polls: Mutex<VecDeque<Result<ExtractionResultSet, DocumentServiceError>>>,
    pub(super) upload_calls: AtomicUsize,
    pub(super) poll_calls: AtomicUsize,
    on_poll: Mutex<Option<PollHook>>,
}

impl ScriptedDocumentService {
    pub(super) fn resolving_with(result: ExtractionResultSet) -> Self {
        let service = Self::default();
        service.push_poll(Ok(result));
        service
    }

    pub(super) fn never_resolving() -> Self {
        Self::default()
    }

    pub(super) fn rejecting_upload(message: &str) -> Self {
        let service = Self::default();
        service
            .uploads
            .lock()
            .expect("upload mutex poisoned")
            .push_back(Err(DocumentServiceError::Rejected(message.to_string())));
        service
    }

    pub(super) fn push_poll(&self, response: Result<ExtractionResultSet, DocumentServiceError>) {
        self.polls
            .lock()
            .expect("poll mutex poisoned")
            .push_back(response);
    }

    pub(super) fn push_pending_polls(&self, count: usize) {
        for _ in 0..count {
            self.push_poll(Ok(ExtractionResultSet::default()));
        }
    }

    pub(super) fn set_on_poll(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_poll.lock().expect("hook mutex poisoned") = Some(Box::new(hook));
    }

    pub(super) fn upload_count(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub(super) fn poll_count(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentService for ScriptedDocumentService {
    async fn upload(
        &self,
        _application: &ApplicationId,
        _document_type_id: u32,
        _file: &UploadedFile,
    ) -> Result<ExtractionJobHandle, DocumentServiceError> {
        let call = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.uploads
            .lock()
            .expect("upload mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(ExtractionJobHandle(format!("job-{call}"))))
    }

    async fn extraction_result(
        &self,
        _application: &ApplicationId,
    ) -> Result<ExtractionResultSet, DocumentServiceError> {
        let call = self.poll_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.on_poll.lock().expect("hook mutex poisoned").as_ref() {
            hook(call);
        }
        self.polls
            .lock()
            .expect("poll mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(ExtractionResultSet::default()))
    }
}

/// Timer double that returns immediately and counts waits.
#[derive(Default)]
pub(super) struct InstantTimer {
    pub(super) waits: AtomicUsize,
}

impl InstantTimer {
    pub(super) fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollTimer for InstantTimer {
    async fn wait(&self, _delay: Duration) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Notifier double recording every (section, count) event.
#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<(usize, usize)>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<(usize, usize)> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl ExtractionNotifier for RecordingNotifier {
    fn fields_populated(&self, section: usize, count: usize) {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push((section, count));
    }
}

/// Persistence double keeping the latest snapshot in memory.
#[derive(Default)]
pub(super) struct MemoryPersistence {
    snapshot: Mutex<Option<DraftSnapshot>>,
    pub(super) saves: AtomicUsize,
}

impl MemoryPersistence {
    pub(super) fn latest(&self) -> Option<DraftSnapshot> {
        self.snapshot.lock().expect("snapshot mutex poisoned").clone()
    }

    pub(super) fn preload(&self, snapshot: DraftSnapshot) {
        *self.snapshot.lock().expect("snapshot mutex poisoned") = Some(snapshot);
    }
}

impl DraftPersistence for MemoryPersistence {
    fn save(&self, snapshot: &DraftSnapshot) -> Result<(), PersistenceError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.snapshot.lock().expect("snapshot mutex poisoned") = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<DraftSnapshot>, PersistenceError> {
        Ok(self.latest())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        *self.snapshot.lock().expect("snapshot mutex poisoned") = None;
        Ok(())
    }
}

/// Persistence double whose writes always fail.
#[derive(Default)]
pub(super) struct FailingPersistence;

impl DraftPersistence for FailingPersistence {
    fn save(&self, _snapshot: &DraftSnapshot) -> Result<(), PersistenceError> {
        Err(PersistenceError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "disk sealed",
        )))
    }

    fn load(&self) -> Result<Option<DraftSnapshot>, PersistenceError> {
        Err(PersistenceError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "disk sealed",
        )))
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

pub(super) fn fast_config() -> ExtractionConfig {
    ExtractionConfig {
        poll_delay: Duration::from_millis(0),
        ..ExtractionConfig::default()
    }
}

pub(super) fn fast_config_with_attempts(max_attempts: u32) -> ExtractionConfig {
    ExtractionConfig {
        max_attempts,
        ..fast_config()
    }
}

pub(super) type TestService = ApplicationStepService<
    MemoryRecordService,
    ScriptedDocumentService,
    InstantTimer,
    RecordingNotifier,
>;

pub(super) struct TestHarness {
    pub(super) service: Arc<TestService>,
    pub(super) records: Arc<MemoryRecordService>,
    pub(super) documents: Arc<ScriptedDocumentService>,
    pub(super) timer: Arc<InstantTimer>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) persistence: Arc<MemoryPersistence>,
}

pub(super) fn harness_with(
    documents: ScriptedDocumentService,
    config: ExtractionConfig,
) -> TestHarness {
    let records = Arc::new(MemoryRecordService::default());
    let documents = Arc::new(documents);
    let timer = Arc::new(InstantTimer::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let persistence = Arc::new(MemoryPersistence::default());
    let service = Arc::new(ApplicationStepService::with_parts(
        records.clone(),
        documents.clone(),
        timer.clone(),
        notifier.clone(),
        persistence.clone(),
        config,
    ));
    TestHarness {
        service,
        records,
        documents,
        timer,
        notifier,
        persistence,
    }
}

pub(super) fn harness() -> TestHarness {
    harness_with(ScriptedDocumentService::never_resolving(), fast_config())
}

/// Create-mode harness whose draft is already bound to a backend record by
/// completing the first section.
pub(super) async fn bound_harness(documents: ScriptedDocumentService) -> TestHarness {
    let harness = harness_with(documents, fast_config());
    harness.service.begin_create();
    harness
        .service
        .set_section(0, personal_details())
        .expect("section 0 accepts data");
    harness
        .service
        .complete_step(0)
        .await
        .expect("section 0 completes");
    harness
}
