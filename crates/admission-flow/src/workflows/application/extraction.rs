use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::clients::{DocumentService, DocumentServiceError, ExtractionNotifier};
use super::domain::{
    ApplicationId, DocumentKind, ExtractionJob, ExtractionJobStatus, SectionDescriptor,
    UploadedFile,
};
use super::draft::DraftStore;
use super::merge;

const DEFAULT_MAX_ATTEMPTS: u32 = 15;
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(4);
const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Tuning knobs for the upload/poll/merge cycle.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Ceiling on status polls per job; the job times out afterwards.
    pub max_attempts: u32,
    /// Fixed delay between consecutive polls.
    pub poll_delay: Duration,
    pub max_file_bytes: usize,
    /// Accepted MIME essences for uploads, checked before any network call.
    pub allowed_mime_types: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_delay: DEFAULT_POLL_DELAY,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            allowed_mime_types: vec![
                mime::APPLICATION_PDF.essence_str().to_string(),
                mime::IMAGE_JPEG.essence_str().to_string(),
                mime::IMAGE_PNG.essence_str().to_string(),
            ],
        }
    }
}

/// Local file checks failed; the upload was rejected without a network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileRejection {
    #[error("unsupported file type '{mime_type}'")]
    UnsupportedType { mime_type: String },
    #[error("file of {actual} bytes exceeds the {limit} byte limit")]
    TooLarge { limit: usize, actual: usize },
    #[error("file is empty")]
    Empty,
}

/// Terminal result of one extraction job.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    /// The job resolved and the merge pass ran; `fields_populated` counts
    /// values actually written into the section.
    Succeeded { fields_populated: usize },
    /// Polling exhausted the attempt ceiling; the applicant proceeds manually.
    TimedOut { attempts: u32 },
    /// The remote trigger rejected the upload; the job was abandoned.
    Failed { reason: DocumentServiceError },
    /// A newer upload for the same section (or a cancel) replaced this job
    /// before it resolved; nothing was written.
    Superseded,
}

/// Injectable delay source so retry, cancellation, and supersession are
/// testable without wall-clock time.
#[async_trait]
pub trait PollTimer: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Production timer backed by the tokio clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPollTimer;

#[async_trait]
impl PollTimer for TokioPollTimer {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Default)]
struct JobSlot {
    /// Monotonic per-section counter; a running job whose generation no
    /// longer matches has been superseded and must stop scheduling.
    generation: u64,
    job: Option<ExtractionJob>,
}

/// Orchestrates upload -> poll -> merge for one session.
///
/// At most one job is active per section: starting a new upload bumps the
/// section's generation, which any in-flight job observes before its next
/// poll or merge, so two merges never race on the same section record.
pub struct ExtractionEngine<D, T, N> {
    documents: Arc<D>,
    timer: Arc<T>,
    notifier: Arc<N>,
    store: Arc<DraftStore>,
    config: ExtractionConfig,
    slots: Mutex<HashMap<usize, JobSlot>>,
}

impl<D, T, N> ExtractionEngine<D, T, N>
where
    D: DocumentService,
    T: PollTimer,
    N: ExtractionNotifier,
{
    pub fn new(
        documents: Arc<D>,
        timer: Arc<T>,
        notifier: Arc<N>,
        store: Arc<DraftStore>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            documents,
            timer,
            notifier,
            store,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// MIME allow-list and size ceiling, enforced before any network call.
    pub fn validate(&self, file: &UploadedFile) -> Result<(), FileRejection> {
        let parsed = file
            .mime_type
            .trim()
            .parse::<mime::Mime>()
            .map_err(|_| FileRejection::UnsupportedType {
                mime_type: file.mime_type.clone(),
            })?;

        let accepted = self
            .config
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed == parsed.essence_str());
        if !accepted {
            return Err(FileRejection::UnsupportedType {
                mime_type: file.mime_type.clone(),
            });
        }

        if file.bytes.is_empty() {
            return Err(FileRejection::Empty);
        }
        if file.size_bytes() > self.config.max_file_bytes {
            return Err(FileRejection::TooLarge {
                limit: self.config.max_file_bytes,
                actual: file.size_bytes(),
            });
        }

        Ok(())
    }

    pub fn status(&self, section: usize) -> Option<ExtractionJob> {
        let slots = self.slots.lock().expect("extraction mutex poisoned");
        slots.get(&section).and_then(|slot| slot.job.clone())
    }

    /// Stop scheduling further polls for a section. The remote job, if any,
    /// keeps running server-side; only local rescheduling is cancelled.
    pub fn cancel(&self, section: usize) {
        let mut slots = self.slots.lock().expect("extraction mutex poisoned");
        let slot = slots.entry(section).or_default();
        slot.generation += 1;
        slot.job = None;
    }

    pub fn cancel_all(&self) {
        let mut slots = self.slots.lock().expect("extraction mutex poisoned");
        for slot in slots.values_mut() {
            slot.generation += 1;
            slot.job = None;
        }
    }

    /// Run one job to a terminal outcome. Returns as soon as the job is
    /// superseded, resolved, failed, or out of attempts.
    pub async fn run(
        &self,
        application: ApplicationId,
        descriptor: &SectionDescriptor,
        document: DocumentKind,
        file: UploadedFile,
    ) -> ExtractionOutcome {
        let section = descriptor.index;
        let generation = self.begin(application.clone(), section, document);

        let handle = match self
            .documents
            .upload(&application, document.document_type_id(), &file)
            .await
        {
            Ok(handle) => handle,
            Err(reason) => {
                warn!(section, document = document.label(), error = %reason, "document upload failed");
                self.finish(section, generation, ExtractionJobStatus::Failed);
                return ExtractionOutcome::Failed { reason };
            }
        };
        self.update_job(section, generation, |job| job.handle = Some(handle.clone()));
        info!(section, document = document.label(), "document accepted; polling extraction");

        let mut attempt: u32 = 1;
        loop {
            if !self.is_current(section, generation) {
                return ExtractionOutcome::Superseded;
            }
            self.update_job(section, generation, |job| job.attempts = attempt);

            match self.documents.extraction_result(&application).await {
                Ok(results) => {
                    if let Some(extraction) = results.sections.get(descriptor.key) {
                        if extraction.is_resolved() {
                            if !self.is_current(section, generation) {
                                return ExtractionOutcome::Superseded;
                            }
                            let report = self.store.update_section(section, |record| {
                                merge::apply_extraction(
                                    descriptor.key,
                                    record,
                                    &extraction.extracted_data,
                                )
                            });
                            self.notifier
                                .fields_populated(section, report.fields_populated);
                            self.finish(section, generation, ExtractionJobStatus::Succeeded);
                            info!(
                                section,
                                attempt,
                                populated = report.fields_populated,
                                occupied = report.skipped_occupied,
                                "extraction merged"
                            );
                            return ExtractionOutcome::Succeeded {
                                fields_populated: report.fields_populated,
                            };
                        }
                    }
                }
                Err(err) => {
                    // A failing status call counts against the same attempt
                    // ceiling as a slow job.
                    debug!(section, attempt, error = %err, "extraction status unavailable; treating as pending");
                }
            }

            if attempt >= self.config.max_attempts {
                self.finish(section, generation, ExtractionJobStatus::TimedOut);
                info!(section, attempts = attempt, "extraction polling timed out");
                return ExtractionOutcome::TimedOut { attempts: attempt };
            }
            attempt += 1;
            self.timer.wait(self.config.poll_delay).await;
        }
    }

    fn begin(&self, application: ApplicationId, section: usize, document: DocumentKind) -> u64 {
        let mut slots = self.slots.lock().expect("extraction mutex poisoned");
        let slot = slots.entry(section).or_default();
        if slot
            .job
            .as_ref()
            .map(|job| !job.status.is_terminal())
            .unwrap_or(false)
        {
            debug!(section, "superseding in-flight extraction job");
        }
        slot.generation += 1;
        slot.job = Some(ExtractionJob {
            application_id: application,
            section,
            document,
            handle: None,
            status: ExtractionJobStatus::Pending,
            attempts: 0,
        });
        slot.generation
    }

    fn is_current(&self, section: usize, generation: u64) -> bool {
        let slots = self.slots.lock().expect("extraction mutex poisoned");
        slots
            .get(&section)
            .map(|slot| slot.generation == generation)
            .unwrap_or(false)
    }

    fn update_job(&self, section: usize, generation: u64, apply: impl FnOnce(&mut ExtractionJob)) {
        let mut slots = self.slots.lock().expect("extraction mutex poisoned");
        if let Some(slot) = slots.get_mut(&section) {
            if slot.generation == generation {
                if let Some(job) = slot.job.as_mut() {
                    apply(job);
                }
            }
        }
    }

    fn finish(&self, section: usize, generation: u64, status: ExtractionJobStatus) {
        self.update_job(section, generation, |job| job.status = status);
    }
}
