use std::collections::{BTreeMap, BTreeSet};

use super::domain::{record_has_content, Mode, SectionRecord, SECTION_COUNT};

/// Navigation rejected because the target step's predecessor is incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("step {requested} is locked while step {current} is active")]
pub struct StepLocked {
    pub requested: usize,
    pub current: usize,
}

/// Finite-state machine over the ordered sections, state = current index
/// plus the monotonically growing completed set.
///
/// The controller is fully synchronous: given the same call sequence the
/// resulting state is identical regardless of timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNavigator {
    current: usize,
    completed: BTreeSet<usize>,
    section_count: usize,
}

impl Default for StepNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl StepNavigator {
    pub fn new() -> Self {
        Self::with_section_count(SECTION_COUNT)
    }

    pub fn with_section_count(section_count: usize) -> Self {
        Self {
            current: 0,
            completed: BTreeSet::new(),
            section_count,
        }
    }

    pub fn current_step(&self) -> usize {
        self.current
    }

    pub fn completed_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.completed.iter().copied()
    }

    pub fn is_step_completed(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    /// Step predicate: section 0 is always navigable; section k (k > 0) is
    /// navigable iff its predecessor is completed, it is itself completed,
    /// or the mode relaxes ordering.
    pub fn can_navigate_to(&self, target: usize, mode: Mode) -> bool {
        if target >= self.section_count {
            return false;
        }
        if target == 0 || mode.relaxes_step_order() {
            return true;
        }
        self.completed.contains(&(target - 1)) || self.completed.contains(&target)
    }

    pub fn go_to_step(&mut self, target: usize, mode: Mode) -> Result<usize, StepLocked> {
        if !self.can_navigate_to(target, mode) {
            return Err(StepLocked {
                requested: target,
                current: self.current,
            });
        }
        self.current = target;
        Ok(self.current)
    }

    pub fn go_to_next(&mut self, mode: Mode) -> Result<usize, StepLocked> {
        self.go_to_step(self.current + 1, mode)
    }

    /// Stepping back from section 0 stays at section 0.
    pub fn go_to_previous(&mut self, mode: Mode) -> Result<usize, StepLocked> {
        if self.current == 0 {
            return Ok(0);
        }
        self.go_to_step(self.current - 1, mode)
    }

    /// Idempotently add a step to the completed set. Monotonic: a later edit
    /// never removes an already-saved section from the set.
    pub fn mark_step_completed(&mut self, index: usize) {
        if index >= self.section_count {
            return;
        }
        self.completed.insert(index);
    }

    /// One-time setup for edit/view mode: completion is derived from which
    /// sections arrived with non-empty backend data, and the controller is
    /// placed at the first incomplete section, or the last section when
    /// every one is complete. Calling again with the same data yields the
    /// same state.
    pub fn initialize_step(&mut self, hydrated: &BTreeMap<usize, SectionRecord>) {
        self.completed = hydrated
            .iter()
            .filter(|(index, record)| **index < self.section_count && record_has_content(record))
            .map(|(index, _)| *index)
            .collect();

        self.current = (0..self.section_count)
            .find(|index| !self.completed.contains(index))
            .unwrap_or(self.section_count.saturating_sub(1));
    }

    /// Clear the completed set and return to section 0; used only when
    /// switching from edit/view into a brand-new create flow.
    pub fn reset_navigation(&mut self) {
        self.completed.clear();
        self.current = 0;
    }
}
