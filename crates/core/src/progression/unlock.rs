use crate::model::{ExerciseId, Kit, MetaMap, ProgressKey, ProgressMap, clamp_done};

/// Per-exercise outcome of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExerciseState {
    pub exercise_id: ExerciseId,
    pub done: u32,
    pub total: Option<u32>,
    pub locked: bool,
    pub hidden: bool,
    pub completed: bool,
}

/// A stored count that exceeded the exercise's now-known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCorrection {
    pub key: ProgressKey,
    pub stored: u32,
    pub clamped: u32,
}

/// Aggregate counts over the visible exercises of a kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KitSummary {
    pub visible: usize,
    pub completed: usize,
}

impl KitSummary {
    /// Whole-number completion percentage; 0 for a kit with nothing visible.
    #[must_use]
    pub fn percent(&self) -> usize {
        if self.visible == 0 {
            return 0;
        }
        self.completed * 100 / self.visible
    }
}

/// Lock flags and derived progress for every exercise of a kit, in kit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockReport {
    states: Vec<ExerciseState>,
    corrections: Vec<ProgressCorrection>,
}

impl UnlockReport {
    #[must_use]
    pub fn states(&self) -> &[ExerciseState] {
        &self.states
    }

    #[must_use]
    pub fn state(&self, id: ExerciseId) -> Option<&ExerciseState> {
        self.states.iter().find(|s| s.exercise_id == id)
    }

    /// Lock flag for the exercise, `None` if it is not part of the kit.
    #[must_use]
    pub fn is_locked(&self, id: ExerciseId) -> Option<bool> {
        self.state(id).map(|s| s.locked)
    }

    /// Stored counts that must be rewritten to their clamped value.
    #[must_use]
    pub fn corrections(&self) -> &[ProgressCorrection] {
        &self.corrections
    }

    /// First exercise a learner can play right now: visible, unlocked and
    /// not yet completed.
    #[must_use]
    pub fn next_playable(&self) -> Option<ExerciseId> {
        self.states
            .iter()
            .find(|s| !s.hidden && !s.locked && !s.completed)
            .map(|s| s.exercise_id)
    }

    #[must_use]
    pub fn summary(&self) -> KitSummary {
        self.states
            .iter()
            .filter(|s| !s.hidden)
            .fold(KitSummary::default(), |mut acc, s| {
                acc.visible += 1;
                if s.completed {
                    acc.completed += 1;
                }
                acc
            })
    }
}

/// Compute lock flags with sequential-dependency propagation.
///
/// A single pass in kit order: once any visible exercise is found
/// incomplete, every later visible exercise is locked. Exercises with a
/// known total of zero are hidden and never gate anything. An unknown total
/// never counts as completed.
#[must_use]
pub fn evaluate_locks(kit: &Kit, meta: &MetaMap, progress: &ProgressMap) -> UnlockReport {
    let mut states = Vec::with_capacity(kit.exercises().len());
    let mut corrections = Vec::new();
    let mut previous_incomplete = false;

    for exercise in kit.exercises() {
        let id = exercise.id();
        let total = meta.get(&id).and_then(|m| m.total_reactivos);

        if total == Some(0) {
            states.push(ExerciseState {
                exercise_id: id,
                done: 0,
                total,
                locked: false,
                hidden: true,
                completed: false,
            });
            continue;
        }

        let stored = progress.get(kit.id(), id);
        let done = clamp_done(stored, total);
        if done != stored {
            corrections.push(ProgressCorrection {
                key: ProgressKey::new(kit.id(), id),
                stored,
                clamped: done,
            });
        }

        let completed = matches!(total, Some(t) if t > 0 && done >= t);
        states.push(ExerciseState {
            exercise_id: id,
            done,
            total,
            locked: previous_incomplete,
            hidden: false,
            completed,
        });

        if !completed {
            previous_incomplete = true;
        }
    }

    UnlockReport {
        states,
        corrections,
    }
}
