//! Exercise progression: metadata resolution, sequential unlocking,
//! modality filtering and runner manifests.
//!
//! Everything here is a pure function of its inputs so callers can re-run
//! it whenever the kit, the resolved metadata or the progress map changes.

pub mod filter;
pub mod manifest;
pub mod resolver;
pub mod unlock;

pub use filter::{
    ExerciseCard, ModalityCounts, ModalityFilter, count_by_modality, effective_modality,
    visible_cards,
};
pub use manifest::{RunnerKind, RunnerManifest, build_manifest};
pub use resolver::resolve_meta;
pub use unlock::{ExerciseState, KitSummary, ProgressCorrection, UnlockReport, evaluate_locks};
