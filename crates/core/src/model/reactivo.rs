use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::ids::{ExerciseId, ReactivoId, SubtypeId};
use crate::model::modality::Modality;

/// The smallest orderable task inside an exercise.
///
/// Snapshot data as returned by the reactivo service; tags may be missing or
/// carry values outside the known enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reactivo {
    pub id: ReactivoId,
    pub order: i64,
    #[serde(default)]
    pub modality_tag: Option<i64>,
    #[serde(default)]
    pub subtype_id: Option<SubtypeId>,
    #[serde(default)]
    pub subtype_name: Option<String>,
}

impl Reactivo {
    #[must_use]
    pub fn new(id: ReactivoId, order: i64) -> Self {
        Self {
            id,
            order,
            modality_tag: None,
            subtype_id: None,
            subtype_name: None,
        }
    }

    #[must_use]
    pub fn with_modality_tag(mut self, tag: i64) -> Self {
        self.modality_tag = Some(tag);
        self
    }

    #[must_use]
    pub fn with_subtype(mut self, id: i64, name: Option<&str>) -> Self {
        self.subtype_id = Some(SubtypeId::new(id));
        self.subtype_name = name.map(str::to_owned);
        self
    }
}

/// Everything the reactivo service returns for one exercise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivoListing {
    #[serde(default)]
    pub reactivos: Vec<Reactivo>,
    /// Explicit total reported by the data source, if any. Untrusted: may be
    /// negative or non-finite.
    #[serde(default)]
    pub reported_total: Option<f64>,
}

impl ReactivoListing {
    #[must_use]
    pub fn new(reactivos: Vec<Reactivo>) -> Self {
        Self {
            reactivos,
            reported_total: None,
        }
    }

    #[must_use]
    pub fn with_reported_total(mut self, total: f64) -> Self {
        self.reported_total = Some(total);
        self
    }
}

/// Per-reactivo entry handed to exercise runners, in sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivoDetail {
    pub id: ReactivoId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subtype_id: Option<SubtypeId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subtype_name: Option<String>,
}

/// Descriptor derived from an exercise's reactivo list.
///
/// Every field may be unknown while the listing is still in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMeta {
    pub modality: Option<Modality>,
    pub subtype_id: Option<SubtypeId>,
    pub subtype_name: Option<String>,
    pub total_reactivos: Option<u32>,
    pub ordered_reactivo_ids: Vec<ReactivoId>,
    pub details: Vec<ReactivoDetail>,
}

impl ResolvedMeta {
    #[must_use]
    pub fn modality_name(&self) -> Option<&'static str> {
        self.modality.map(Modality::label)
    }

    /// Exercises whose total is known to be zero are hidden from learners.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.total_reactivos == Some(0)
    }
}

/// Resolved metadata per exercise.
pub type MetaMap = HashMap<ExerciseId, ResolvedMeta>;
