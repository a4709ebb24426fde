use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::model::{ExerciseId, Kit, KitId, MetaMap, Modality, ReactivoDetail, ReactivoId, SubtypeId};
use crate::progression::unlock::UnlockReport;

/// Which modality-specific runner should present an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Reading,
    Writing,
    Visual,
}

impl From<Modality> for RunnerKind {
    fn from(value: Modality) -> Self {
        match value {
            Modality::Reading => Self::Reading,
            Modality::Writing => Self::Writing,
            Modality::Visual => Self::Visual,
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reading => "reading",
            Self::Writing => "writing",
            Self::Visual => "visual",
        };
        f.write_str(name)
    }
}

/// Parameter bundle handed to an exercise runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerManifest {
    pub kit_id: KitId,
    pub kit_name: String,
    pub exercise_id: ExerciseId,
    pub exercise_title: String,
    pub modality_id: Option<i64>,
    pub modality_name: Option<String>,
    pub subtype_id: Option<SubtypeId>,
    pub subtype_name: Option<String>,
    /// Total reactivo count, empty when unknown.
    pub total_reactivos: String,
    /// Ordered reactivo ids joined with `,`.
    pub reactivo_ids: String,
    /// Ordered reactivo ids as a JSON array.
    pub reactivo_ids_json: String,
    pub details: Vec<ReactivoDetail>,
}

impl RunnerManifest {
    #[must_use]
    pub fn runner(&self) -> Option<RunnerKind> {
        self.modality_id
            .and_then(Modality::from_id)
            .map(RunnerKind::from)
    }

    /// Flatten into string route parameters. Optional values that are absent
    /// become empty strings; `details` is JSON-encoded.
    #[must_use]
    pub fn to_params(&self) -> BTreeMap<&'static str, String> {
        fn opt<T: ToString>(value: Option<&T>) -> String {
            value.map(ToString::to_string).unwrap_or_default()
        }

        let details = serde_json::to_string(&self.details).unwrap_or_else(|_| "[]".to_owned());
        BTreeMap::from([
            ("kitId", self.kit_id.to_string()),
            ("kitName", self.kit_name.clone()),
            ("exerciseId", self.exercise_id.to_string()),
            ("exerciseTitle", self.exercise_title.clone()),
            ("modalityId", opt(self.modality_id.as_ref())),
            ("modalityName", opt(self.modality_name.as_ref())),
            ("subtypeId", opt(self.subtype_id.as_ref())),
            ("subtypeName", opt(self.subtype_name.as_ref())),
            ("totalReactivos", self.total_reactivos.clone()),
            ("reactivoIds", self.reactivo_ids.clone()),
            ("reactivoIdsJson", self.reactivo_ids_json.clone()),
            ("reactivoDetails", details),
        ])
    }
}

fn join_ids(ids: &[ReactivoId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn ids_json(ids: &[ReactivoId]) -> String {
    let raw: Vec<u64> = ids.iter().map(ReactivoId::value).collect();
    serde_json::Value::from(raw).to_string()
}

/// Build the runner manifest for an activated exercise.
///
/// Returns `None` when the exercise is not in the kit, is hidden, or is
/// locked: activation is then silently ignored.
#[must_use]
pub fn build_manifest(
    kit: &Kit,
    exercise_id: ExerciseId,
    meta: &MetaMap,
    report: &UnlockReport,
) -> Option<RunnerManifest> {
    let exercise = kit.exercise(exercise_id)?;
    let state = report.state(exercise_id)?;
    if state.locked || state.hidden {
        return None;
    }

    let resolved = meta.get(&exercise_id).cloned().unwrap_or_default();
    let modality = resolved.modality.or_else(|| exercise.declared_modality());

    Some(RunnerManifest {
        kit_id: kit.id(),
        kit_name: kit.name().to_owned(),
        exercise_id,
        exercise_title: exercise.title().to_owned(),
        modality_id: modality.map(Modality::id),
        modality_name: modality.map(|m| m.label().to_owned()),
        subtype_id: resolved.subtype_id,
        subtype_name: resolved.subtype_name,
        total_reactivos: resolved
            .total_reactivos
            .map(|t| t.to_string())
            .unwrap_or_default(),
        reactivo_ids: join_ids(&resolved.ordered_reactivo_ids),
        reactivo_ids_json: ids_json(&resolved.ordered_reactivo_ids),
        details: resolved.details,
    })
}
