//! Kit and reactivo repositories backed by a static JSON document.
//!
//! Stands in for the remote kit/reactivo services when running offline or
//! from fixtures. Shape:
//!
//! ```json
//! { "kits": [ { "id": 1, "name": "Kit", "exercises": [
//!     { "id": 10, "title": "Vocales", "modality": 1, "order": 1,
//!       "reportedTotal": 3,
//!       "reactivos": [ { "id": 100, "order": 1, "modalityTag": 1,
//!                        "subtypeId": 4, "subtypeName": "Fonema" } ] } ] } ] }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use kit_core::model::{Exercise, ExerciseId, Kit, KitId, Reactivo, ReactivoListing};
use serde::Deserialize;

use crate::repository::{KitRepository, ReactivoRepository, StorageError};

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    kits: Vec<KitRecord>,
}

#[derive(Debug, Deserialize)]
struct KitRecord {
    id: KitId,
    name: String,
    #[serde(default)]
    exercises: Vec<ExerciseRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExerciseRecord {
    id: ExerciseId,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    modality: Option<i64>,
    #[serde(default)]
    order: i64,
    /// `None` means the listing was never fetched (unknown), as opposed to an
    /// empty array.
    #[serde(default)]
    reactivos: Option<Vec<Reactivo>>,
    #[serde(default)]
    reported_total: Option<f64>,
}

/// Read-only catalogue of kits and reactivos.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    kits: HashMap<KitId, Kit>,
    reactivos: HashMap<ExerciseId, ReactivoListing>,
}

impl JsonCatalog {
    /// Parse a catalogue document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the JSON is malformed or a
    /// kit fails validation.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        let doc: CatalogDocument =
            serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut catalog = Self::default();
        for record in doc.kits {
            let mut exercises = Vec::with_capacity(record.exercises.len());
            for ex in record.exercises {
                if let Some(reactivos) = ex.reactivos {
                    catalog.reactivos.insert(
                        ex.id,
                        ReactivoListing {
                            reactivos,
                            reported_total: ex.reported_total,
                        },
                    );
                } else if let Some(total) = ex.reported_total {
                    catalog
                        .reactivos
                        .insert(ex.id, ReactivoListing::default().with_reported_total(total));
                }
                exercises.push(
                    Exercise::new(ex.id, ex.title, ex.order)
                        .with_description(ex.description)
                        .with_modality_hint(ex.modality),
                );
            }
            let kit = Kit::new(record.id, record.name, exercises)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            catalog.kits.insert(kit.id(), kit);
        }
        Ok(catalog)
    }

    /// Load a catalogue from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the file cannot be read, or
    /// `StorageError::Serialization` if its contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Io(format!("{}: {e}", path.display())))?;
        let catalog = Self::from_json(&raw)?;
        tracing::debug!(
            path = %path.display(),
            kits = catalog.kits.len(),
            "loaded kit catalog"
        );
        Ok(catalog)
    }

    /// Kit ids in ascending order.
    #[must_use]
    pub fn kit_ids(&self) -> Vec<KitId> {
        let mut ids: Vec<KitId> = self.kits.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl KitRepository for JsonCatalog {
    async fn get_kit(&self, id: KitId) -> Result<Option<Kit>, StorageError> {
        Ok(self.kits.get(&id).cloned())
    }
}

#[async_trait]
impl ReactivoRepository for JsonCatalog {
    async fn list_reactivos(&self, exercise: ExerciseId) -> Result<ReactivoListing, StorageError> {
        Ok(self.reactivos.get(&exercise).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "kits": [{
            "id": 1,
            "name": " Kit inicial ",
            "exercises": [
                { "id": 11, "title": "Sílabas", "modality": 2, "order": 2 },
                { "id": 10, "title": "Vocales", "order": 1, "reportedTotal": 2,
                  "reactivos": [
                    { "id": 101, "order": 2, "modalityTag": 1 },
                    { "id": 100, "order": 1, "modalityTag": 1, "subtypeId": 4, "subtypeName": "Fonema" }
                  ] },
                { "id": 12, "title": "Vacío", "order": 3, "reportedTotal": 0 }
            ]
        }]
    }"#;

    #[tokio::test]
    async fn parses_kits_in_kit_order() {
        let catalog = JsonCatalog::from_json(DOC).unwrap();
        let kit = catalog.get_kit(KitId::new(1)).await.unwrap().unwrap();
        assert_eq!(kit.name(), "Kit inicial");
        let ids: Vec<u64> = kit.exercises().iter().map(|e| e.id().value()).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert_eq!(kit.exercises()[1].modality_hint(), Some(2));
        assert_eq!(catalog.kit_ids(), vec![KitId::new(1)]);
    }

    #[tokio::test]
    async fn exposes_reactivo_listings() {
        let catalog = JsonCatalog::from_json(DOC).unwrap();
        let listing = catalog.list_reactivos(ExerciseId::new(10)).await.unwrap();
        assert_eq!(listing.reactivos.len(), 2);
        assert_eq!(listing.reported_total, Some(2.0));

        let empty = catalog.list_reactivos(ExerciseId::new(12)).await.unwrap();
        assert!(empty.reactivos.is_empty());
        assert_eq!(empty.reported_total, Some(0.0));

        let unknown = catalog.list_reactivos(ExerciseId::new(11)).await.unwrap();
        assert_eq!(unknown, ReactivoListing::default());
    }

    #[test]
    fn rejects_invalid_kits() {
        let err = JsonCatalog::from_json(r#"{"kits":[{"id":1,"name":"  "}]}"#).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert!(JsonCatalog::from_json("nope").is_err());
    }
}
