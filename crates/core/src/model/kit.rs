use std::collections::HashSet;

use thiserror::Error;

use crate::model::ids::{ExerciseId, KitId};
use crate::model::modality::Modality;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KitError {
    #[error("kit name cannot be empty")]
    EmptyName,

    #[error("exercise {0} appears more than once in the kit")]
    DuplicateExercise(ExerciseId),
}

//
// ─── EXERCISE ──────────────────────────────────────────────────────────────────
//

/// A unit of progression within a kit.
///
/// The declared modality is whatever the kit service reported and may be
/// absent or wrong; the resolved modality comes from the exercise's reactivos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exercise {
    id: ExerciseId,
    title: String,
    description: Option<String>,
    modality_hint: Option<i64>,
    order: i64,
}

impl Exercise {
    #[must_use]
    pub fn new(id: ExerciseId, title: impl Into<String>, order: i64) -> Self {
        Self {
            id,
            title: title.into().trim().to_owned(),
            description: None,
            modality_hint: None,
            order,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());
        self
    }

    #[must_use]
    pub fn with_modality_hint(mut self, hint: Option<i64>) -> Self {
        self.modality_hint = hint;
        self
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> ExerciseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Raw hint exactly as supplied by the kit service.
    #[must_use]
    pub fn modality_hint(&self) -> Option<i64> {
        self.modality_hint
    }

    /// The hint, if it names one of the known modalities.
    #[must_use]
    pub fn declared_modality(&self) -> Option<Modality> {
        self.modality_hint.and_then(Modality::from_id)
    }

    #[must_use]
    pub fn order(&self) -> i64 {
        self.order
    }
}

//
// ─── KIT ───────────────────────────────────────────────────────────────────────
//

/// A named, ordered collection of exercises.
///
/// Exercises are kept in kit order: ascending `order`, ties broken by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kit {
    id: KitId,
    name: String,
    exercises: Vec<Exercise>,
}

impl Kit {
    /// Creates a new Kit and sorts its exercises into kit order.
    ///
    /// # Errors
    ///
    /// Returns `KitError::EmptyName` if name is empty or whitespace-only.
    /// Returns `KitError::DuplicateExercise` if an exercise id repeats.
    pub fn new(
        id: KitId,
        name: impl Into<String>,
        exercises: impl IntoIterator<Item = Exercise>,
    ) -> Result<Self, KitError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KitError::EmptyName);
        }

        let mut exercises: Vec<Exercise> = exercises.into_iter().collect();
        let mut seen = HashSet::with_capacity(exercises.len());
        for exercise in &exercises {
            if !seen.insert(exercise.id()) {
                return Err(KitError::DuplicateExercise(exercise.id()));
            }
        }
        exercises.sort_by_key(|e| (e.order(), e.id()));

        Ok(Self {
            id,
            name: name.trim().to_owned(),
            exercises,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> KitId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exercises in kit order.
    #[must_use]
    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    #[must_use]
    pub fn exercise(&self, id: ExerciseId) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id() == id)
    }
}
