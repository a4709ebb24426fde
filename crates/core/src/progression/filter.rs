use std::fmt;
use std::str::FromStr;

use crate::model::{Exercise, ExerciseId, Kit, MetaMap, Modality, UnknownModality};
use crate::progression::unlock::UnlockReport;

/// Learner-selected modality filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModalityFilter {
    #[default]
    All,
    Only(Modality),
}

impl ModalityFilter {
    #[must_use]
    pub fn matches(self, modality: Option<Modality>) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => modality == Some(wanted),
        }
    }
}

impl fmt::Display for ModalityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(modality) => f.write_str(modality.slug()),
        }
    }
}

impl FromStr for ModalityFilter {
    type Err = UnknownModality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("all") || raw.eq_ignore_ascii_case("todos") {
            return Ok(Self::All);
        }
        raw.parse::<Modality>().map(Self::Only)
    }
}

/// Resolved modality, or the exercise's declared hint while unresolved.
#[must_use]
pub fn effective_modality(exercise: &Exercise, meta: &MetaMap) -> Option<Modality> {
    meta.get(&exercise.id())
        .and_then(|m| m.modality)
        .or_else(|| exercise.declared_modality())
}

fn is_hidden(exercise: &Exercise, meta: &MetaMap) -> bool {
    meta.get(&exercise.id()).is_some_and(|m| m.is_hidden())
}

/// Exercise counts per modality, for filter chips. Hidden exercises are
/// excluded everywhere, including `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModalityCounts {
    pub reading: usize,
    pub writing: usize,
    pub visual: usize,
    pub total: usize,
}

impl ModalityCounts {
    #[must_use]
    pub fn count_for(&self, filter: ModalityFilter) -> usize {
        match filter {
            ModalityFilter::All => self.total,
            ModalityFilter::Only(Modality::Reading) => self.reading,
            ModalityFilter::Only(Modality::Writing) => self.writing,
            ModalityFilter::Only(Modality::Visual) => self.visual,
        }
    }
}

#[must_use]
pub fn count_by_modality(kit: &Kit, meta: &MetaMap) -> ModalityCounts {
    let mut counts = ModalityCounts::default();
    for exercise in kit.exercises().iter().filter(|e| !is_hidden(e, meta)) {
        counts.total += 1;
        match effective_modality(exercise, meta) {
            Some(Modality::Reading) => counts.reading += 1,
            Some(Modality::Writing) => counts.writing += 1,
            Some(Modality::Visual) => counts.visual += 1,
            None => {}
        }
    }
    counts
}

/// One entry of the visible exercise list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseCard<'a> {
    pub exercise: &'a Exercise,
    pub modality: Option<Modality>,
    pub done: u32,
    pub total: Option<u32>,
    pub locked: bool,
    pub completed: bool,
}

impl ExerciseCard<'_> {
    #[must_use]
    pub fn id(&self) -> ExerciseId {
        self.exercise.id()
    }
}

/// Visible subset for the selected filter, in kit order.
///
/// Lock flags are looked up from `report`, which must have been computed over
/// the full kit; filtering never re-runs lock propagation.
#[must_use]
pub fn visible_cards<'a>(
    kit: &'a Kit,
    meta: &MetaMap,
    report: &UnlockReport,
    filter: ModalityFilter,
) -> Vec<ExerciseCard<'a>> {
    kit.exercises()
        .iter()
        .filter(|e| !is_hidden(e, meta))
        .filter_map(|exercise| {
            let modality = effective_modality(exercise, meta);
            if !filter.matches(modality) {
                return None;
            }
            let state = report.state(exercise.id());
            Some(ExerciseCard {
                exercise,
                modality,
                done: state.map_or(0, |s| s.done),
                total: meta.get(&exercise.id()).and_then(|m| m.total_reactivos),
                // Missing from the report means the report is stale; stay closed.
                locked: state.is_none_or(|s| s.locked),
                completed: state.is_some_and(|s| s.completed),
            })
        })
        .collect()
}
