use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{ApplicationId, Mode, SectionRecord};

/// Serializable image of the draft written after every mutation so an
/// interrupted session can resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub application_id: Option<ApplicationId>,
    pub mode: Mode,
    pub sections: BTreeMap<usize, SectionRecord>,
    pub hydrated: bool,
}

/// Error enumeration for durable draft storage failures.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("draft storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("draft snapshot encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Durable client-side storage abstraction for draft snapshots.
pub trait DraftPersistence: Send + Sync {
    fn save(&self, snapshot: &DraftSnapshot) -> Result<(), PersistenceError>;
    fn load(&self) -> Result<Option<DraftSnapshot>, PersistenceError>;
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// Persistence backed by a single JSON file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileDraftPersistence {
    path: PathBuf,
}

impl JsonFileDraftPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DraftPersistence for JsonFileDraftPersistence {
    fn save(&self, snapshot: &DraftSnapshot) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_vec(snapshot)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, encoded)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<DraftSnapshot>, PersistenceError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Persistence that keeps nothing; sessions are purely in-memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDraftPersistence;

impl DraftPersistence for NullDraftPersistence {
    fn save(&self, _snapshot: &DraftSnapshot) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn load(&self) -> Result<Option<DraftSnapshot>, PersistenceError> {
        Ok(None)
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[derive(Debug)]
struct DraftState {
    application_id: Option<ApplicationId>,
    mode: Mode,
    sections: BTreeMap<usize, SectionRecord>,
    hydrated: bool,
}

impl DraftState {
    fn empty() -> Self {
        Self {
            application_id: None,
            mode: Mode::Create,
            sections: BTreeMap::new(),
            hydrated: false,
        }
    }

    fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            application_id: self.application_id.clone(),
            mode: self.mode,
            sections: self.sections.clone(),
            hydrated: self.hydrated,
        }
    }
}

/// Single source of truth for all section data before submission.
///
/// One store exists per session and is shared by the navigator, the merge
/// path, and the polling engine. Every mutation is mirrored to the durable
/// store best-effort: a failed write is logged and swallowed, and the
/// in-memory state stays authoritative for the rest of the session.
pub struct DraftStore {
    state: Mutex<DraftState>,
    persistence: Arc<dyn DraftPersistence>,
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore").finish_non_exhaustive()
    }
}

impl DraftStore {
    pub fn new(persistence: Arc<dyn DraftPersistence>) -> Self {
        Self {
            state: Mutex::new(DraftState::empty()),
            persistence,
        }
    }

    pub fn section(&self, index: usize) -> Option<SectionRecord> {
        let state = self.state.lock().expect("draft mutex poisoned");
        state.sections.get(&index).cloned()
    }

    pub fn sections(&self) -> BTreeMap<usize, SectionRecord> {
        let state = self.state.lock().expect("draft mutex poisoned");
        state.sections.clone()
    }

    /// Full replace of one section record. Idempotent; no shape validation.
    pub fn set_section(&self, index: usize, record: SectionRecord) {
        let snapshot = {
            let mut state = self.state.lock().expect("draft mutex poisoned");
            state.sections.insert(index, record);
            state.snapshot()
        };
        self.persist(&snapshot);
    }

    /// Read-modify-write of one section under the store lock, so a merge
    /// decision always sees the value it is about to overwrite.
    pub fn update_section<R>(
        &self,
        index: usize,
        apply: impl FnOnce(&mut SectionRecord) -> R,
    ) -> R {
        let (result, snapshot) = {
            let mut state = self.state.lock().expect("draft mutex poisoned");
            let record = state.sections.entry(index).or_default();
            let result = apply(record);
            (result, state.snapshot())
        };
        self.persist(&snapshot);
        result
    }

    pub fn application_id(&self) -> Option<ApplicationId> {
        let state = self.state.lock().expect("draft mutex poisoned");
        state.application_id.clone()
    }

    /// Bind the draft to a backend record; later writes scope to this id.
    pub fn set_application_id(&self, id: ApplicationId) {
        let snapshot = {
            let mut state = self.state.lock().expect("draft mutex poisoned");
            state.application_id = Some(id);
            state.snapshot()
        };
        self.persist(&snapshot);
    }

    pub fn mode(&self) -> Mode {
        let state = self.state.lock().expect("draft mutex poisoned");
        state.mode
    }

    pub fn set_mode(&self, mode: Mode) {
        let snapshot = {
            let mut state = self.state.lock().expect("draft mutex poisoned");
            state.mode = mode;
            state.snapshot()
        };
        self.persist(&snapshot);
    }

    /// True once an edit-mode load completed; gates duplicate fetches.
    pub fn is_hydrated(&self) -> bool {
        let state = self.state.lock().expect("draft mutex poisoned");
        state.hydrated
    }

    /// One-time bulk load of a previously saved application.
    pub fn hydrate(
        &self,
        id: ApplicationId,
        mode: Mode,
        sections: BTreeMap<usize, SectionRecord>,
    ) {
        let snapshot = {
            let mut state = self.state.lock().expect("draft mutex poisoned");
            state.application_id = Some(id);
            state.mode = mode;
            state.sections = sections;
            state.hydrated = true;
            state.snapshot()
        };
        self.persist(&snapshot);
    }

    /// Reset all sections and the bound id. Called only when a new create
    /// flow begins, preventing cross-application leakage.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock().expect("draft mutex poisoned");
            *state = DraftState::empty();
        }
        if let Err(err) = self.persistence.clear() {
            warn!(error = %err, "failed to clear persisted draft");
        }
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        let state = self.state.lock().expect("draft mutex poisoned");
        state.snapshot()
    }

    /// Best-effort resume from the durable store. Returns the restored
    /// snapshot when one was present and readable.
    pub fn restore(&self) -> Option<DraftSnapshot> {
        let snapshot = match self.persistence.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "failed to restore persisted draft");
                return None;
            }
        };

        {
            let mut state = self.state.lock().expect("draft mutex poisoned");
            state.application_id = snapshot.application_id.clone();
            state.mode = snapshot.mode;
            state.sections = snapshot.sections.clone();
            state.hydrated = snapshot.hydrated;
        }
        debug!(sections = snapshot.sections.len(), "restored draft snapshot");
        Some(snapshot)
    }

    fn persist(&self, snapshot: &DraftSnapshot) {
        if let Err(err) = self.persistence.save(snapshot) {
            warn!(error = %err, "draft persistence write failed; in-memory state remains authoritative");
        }
    }
}
