use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::clients::{
    ApplicationRecordService, DocumentService, ExtractionNotifier, NullNotifier,
    RecordServiceError,
};
use super::domain::{
    record_has_content, section_descriptor, ApplicationId, ExtractionJob, Mode, SectionRecord,
    UploadedFile, SECTION_COUNT,
};
use super::draft::{DraftPersistence, DraftStore};
use super::extraction::{
    ExtractionConfig, ExtractionEngine, ExtractionOutcome, FileRejection, PollTimer,
    TokioPollTimer,
};
use super::navigation::{StepLocked, StepNavigator};

/// Error raised by the step workflow facade. Every variant is a discrete,
/// recoverable outcome; the caller chooses the user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    StepLocked(#[from] StepLocked),
    #[error(transparent)]
    ValidationRejected(#[from] FileRejection),
    #[error("section {0} does not accept document extraction")]
    ExtractionUnsupported(usize),
    #[error("section index {0} is out of range")]
    UnknownSection(usize),
    #[error("section {0} has no data to save")]
    EmptySection(usize),
    #[error("draft is read-only in view mode")]
    ReadOnly,
    #[error("draft is not bound to an application record")]
    Unbound,
    #[error(transparent)]
    Record(#[from] RecordServiceError),
}

/// Facade composing the draft store, step navigator, and extraction engine
/// for one applicant session.
///
/// Constructed per session rather than shared process-wide, so tests and
/// concurrent sessions each get a fresh context.
pub struct ApplicationStepService<B, D, T = TokioPollTimer, N = NullNotifier> {
    records: Arc<B>,
    store: Arc<DraftStore>,
    navigator: Mutex<StepNavigator>,
    engine: ExtractionEngine<D, T, N>,
}

impl<B, D> ApplicationStepService<B, D, TokioPollTimer, NullNotifier>
where
    B: ApplicationRecordService,
    D: DocumentService,
{
    pub fn new(
        records: Arc<B>,
        documents: Arc<D>,
        persistence: Arc<dyn DraftPersistence>,
        config: ExtractionConfig,
    ) -> Self {
        Self::with_parts(
            records,
            documents,
            Arc::new(TokioPollTimer),
            Arc::new(NullNotifier),
            persistence,
            config,
        )
    }
}

impl<B, D, T, N> ApplicationStepService<B, D, T, N>
where
    B: ApplicationRecordService,
    D: DocumentService,
    T: PollTimer,
    N: ExtractionNotifier,
{
    pub fn with_parts(
        records: Arc<B>,
        documents: Arc<D>,
        timer: Arc<T>,
        notifier: Arc<N>,
        persistence: Arc<dyn DraftPersistence>,
        config: ExtractionConfig,
    ) -> Self {
        let store = Arc::new(DraftStore::new(persistence));
        let engine = ExtractionEngine::new(documents, timer, notifier, store.clone(), config);
        Self {
            records,
            store,
            navigator: Mutex::new(StepNavigator::new()),
            engine,
        }
    }

    /// Begin a brand-new application: clears the draft, resets navigation,
    /// and drops any in-flight extraction jobs from a previous flow.
    pub fn begin_create(&self) {
        self.engine.cancel_all();
        self.store.clear();
        self.store.set_mode(Mode::Create);
        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .reset_navigation();
        info!("started create flow");
    }

    /// Resume a previously saved application for editing. The backend fetch
    /// runs once; re-entry with the same id re-derives navigation from the
    /// already-hydrated draft.
    pub async fn begin_edit(&self, id: ApplicationId) -> Result<(), WorkflowError> {
        self.enter_hydrated(id, Mode::Edit).await
    }

    /// Browse an already-submitted application without accepting writes.
    pub async fn begin_view(&self, id: ApplicationId) -> Result<(), WorkflowError> {
        self.enter_hydrated(id, Mode::View).await
    }

    async fn enter_hydrated(&self, id: ApplicationId, mode: Mode) -> Result<(), WorkflowError> {
        if self.store.is_hydrated() && self.store.application_id().as_ref() == Some(&id) {
            self.store.set_mode(mode);
            let sections = self.store.sections();
            self.navigator
                .lock()
                .expect("navigator mutex poisoned")
                .initialize_step(&sections);
            debug!(application = %id.0, "draft already hydrated; navigation re-derived");
            return Ok(());
        }

        let record = self.records.get(&id).await?;
        self.store.hydrate(record.id.clone(), mode, record.sections.clone());
        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .initialize_step(&record.sections);
        info!(application = %record.id.0, mode = mode.label(), "draft hydrated");
        Ok(())
    }

    /// Best-effort resume of an interrupted session from the durable store.
    pub fn restore_draft(&self) -> bool {
        let Some(snapshot) = self.store.restore() else {
            return false;
        };
        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .initialize_step(&snapshot.sections);
        true
    }

    pub fn mode(&self) -> Mode {
        self.store.mode()
    }

    pub fn application_id(&self) -> Option<ApplicationId> {
        self.store.application_id()
    }

    pub fn is_hydrated(&self) -> bool {
        self.store.is_hydrated()
    }

    pub fn section(&self, index: usize) -> Result<Option<SectionRecord>, WorkflowError> {
        self.ensure_known_section(index)?;
        Ok(self.store.section(index))
    }

    pub fn set_section(&self, index: usize, record: SectionRecord) -> Result<(), WorkflowError> {
        self.ensure_known_section(index)?;
        self.ensure_writable()?;
        self.store.set_section(index, record);
        Ok(())
    }

    pub fn current_step(&self) -> usize {
        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .current_step()
    }

    pub fn completed_steps(&self) -> Vec<usize> {
        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .completed_steps()
            .collect()
    }

    pub fn is_step_completed(&self, index: usize) -> bool {
        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .is_step_completed(index)
    }

    pub fn can_navigate_to_step(&self, index: usize) -> bool {
        let mode = self.store.mode();
        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .can_navigate_to(index, mode)
    }

    pub fn go_to_step(&self, index: usize) -> Result<usize, WorkflowError> {
        let mode = self.store.mode();
        let step = self
            .navigator
            .lock()
            .expect("navigator mutex poisoned")
            .go_to_step(index, mode)?;
        Ok(step)
    }

    pub fn go_to_next(&self) -> Result<usize, WorkflowError> {
        let mode = self.store.mode();
        let step = self
            .navigator
            .lock()
            .expect("navigator mutex poisoned")
            .go_to_next(mode)?;
        Ok(step)
    }

    pub fn go_to_previous(&self) -> Result<usize, WorkflowError> {
        let mode = self.store.mode();
        let step = self
            .navigator
            .lock()
            .expect("navigator mutex poisoned")
            .go_to_previous(mode)?;
        Ok(step)
    }

    pub fn mark_step_completed(&self, index: usize) -> Result<(), WorkflowError> {
        self.ensure_known_section(index)?;
        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .mark_step_completed(index);
        Ok(())
    }

    /// Persist a section to the backend and mark the step completed. The
    /// first save creates the backend record and binds its id to the draft.
    pub async fn complete_step(&self, index: usize) -> Result<(), WorkflowError> {
        self.ensure_known_section(index)?;
        self.ensure_writable()?;

        let data = self
            .store
            .section(index)
            .filter(|record| record_has_content(record))
            .ok_or(WorkflowError::EmptySection(index))?;

        match self.store.application_id() {
            Some(id) => {
                self.records.save_step(&id, index, &data).await?;
            }
            None => {
                let id = self.records.create(&data).await?;
                info!(application = %id.0, "application record created");
                self.store.set_application_id(id);
            }
        }

        self.navigator
            .lock()
            .expect("navigator mutex poisoned")
            .mark_step_completed(index);
        Ok(())
    }

    /// Submit the bound application record. Completion of individual
    /// sections is the backend's concern past this point.
    pub async fn submit(&self) -> Result<(), WorkflowError> {
        self.ensure_writable()?;
        let id = self.store.application_id().ok_or(WorkflowError::Unbound)?;
        self.records.submit(&id).await?;
        info!(application = %id.0, "application submitted");
        Ok(())
    }

    /// Pre-flight checks for an upload: known extractable section, writable
    /// mode, bound application, and the local file validation. No network.
    pub fn validate_upload(&self, index: usize, file: &UploadedFile) -> Result<(), WorkflowError> {
        let descriptor =
            section_descriptor(index).ok_or(WorkflowError::UnknownSection(index))?;
        descriptor
            .document
            .ok_or(WorkflowError::ExtractionUnsupported(index))?;
        self.ensure_writable()?;
        self.engine.validate(file)?;
        self.store.application_id().ok_or(WorkflowError::Unbound)?;
        Ok(())
    }

    /// Upload a document for a section and drive its extraction job to a
    /// terminal outcome. File checks run locally first: a rejected file
    /// never reaches the network.
    pub async fn trigger_extraction(
        &self,
        index: usize,
        file: UploadedFile,
    ) -> Result<ExtractionOutcome, WorkflowError> {
        let descriptor =
            section_descriptor(index).ok_or(WorkflowError::UnknownSection(index))?;
        let document = descriptor
            .document
            .ok_or(WorkflowError::ExtractionUnsupported(index))?;
        self.ensure_writable()?;
        self.engine.validate(&file)?;
        let application = self.store.application_id().ok_or(WorkflowError::Unbound)?;

        Ok(self.engine.run(application, descriptor, document, file).await)
    }

    /// Stop scheduling polls for a section's job, e.g. when the applicant
    /// removes the file or leaves the section.
    pub fn cancel_extraction(&self, index: usize) {
        self.engine.cancel(index);
    }

    pub fn extraction_status(&self, index: usize) -> Option<ExtractionJob> {
        self.engine.status(index)
    }

    pub fn extraction_config(&self) -> &ExtractionConfig {
        self.engine.config()
    }

    fn ensure_known_section(&self, index: usize) -> Result<(), WorkflowError> {
        if index >= SECTION_COUNT {
            return Err(WorkflowError::UnknownSection(index));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), WorkflowError> {
        if self.store.mode().is_read_only() {
            return Err(WorkflowError::ReadOnly);
        }
        Ok(())
    }
}
