use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::ids::{ExerciseId, KitId, ParseIdError};

/// Identifies one progress entry: a (kit, exercise) pair.
///
/// Rendered as `"{kitId}-{exerciseId}"`, which is also the key used in the
/// persisted blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressKey {
    pub kit: KitId,
    pub exercise: ExerciseId,
}

impl ProgressKey {
    #[must_use]
    pub fn new(kit: KitId, exercise: ExerciseId) -> Self {
        Self { kit, exercise }
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kit, self.exercise)
    }
}

impl FromStr for ProgressKey {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Ids are unsigned, so the first '-' is always the separator.
        let (kit, exercise) = s.split_once('-').unwrap_or((s, ""));
        Ok(Self {
            kit: kit.parse()?,
            exercise: exercise.parse()?,
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressDecodeError {
    #[error("progress blob is not valid JSON: {0}")]
    Json(String),

    #[error("progress blob is not a JSON object")]
    NotAnObject,
}

/// Clamp a completed count to the exercise length once that length is known.
///
/// Counts are unsigned, so the lower bound of zero holds by construction.
#[must_use]
pub fn clamp_done(done: u32, total: Option<u32>) -> u32 {
    match total {
        Some(total) => done.min(total),
        None => done,
    }
}

/// Completed-reactivo counts per (kit, exercise).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressMap {
    entries: BTreeMap<ProgressKey, u32>,
}

impl ProgressMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed count for the pair, 0 when no entry exists yet.
    #[must_use]
    pub fn get(&self, kit: KitId, exercise: ExerciseId) -> u32 {
        self.entries
            .get(&ProgressKey::new(kit, exercise))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn contains(&self, kit: KitId, exercise: ExerciseId) -> bool {
        self.entries.contains_key(&ProgressKey::new(kit, exercise))
    }

    /// Insert or overwrite an entry. Returns the previous value, if any.
    pub fn set(&mut self, kit: KitId, exercise: ExerciseId, done: u32) -> Option<u32> {
        self.entries.insert(ProgressKey::new(kit, exercise), done)
    }

    /// Fold freshly loaded entries into this map. Incoming values win; entries
    /// only present locally are kept.
    pub fn merge(&mut self, incoming: &ProgressMap) {
        for (key, value) in &incoming.entries {
            self.entries.insert(*key, *value);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProgressKey, u32)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    /// Parse a persisted blob.
    ///
    /// Never fails: a payload that is not a JSON object yields an empty map,
    /// and individual entries with a malformed key or value are dropped.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        Self::try_decode(raw).unwrap_or_default()
    }

    /// Like [`ProgressMap::decode`], but reports a payload that is unusable as
    /// a whole so callers can log it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressDecodeError` if `raw` is not a JSON object.
    pub fn try_decode(raw: &str) -> Result<Self, ProgressDecodeError> {
        let value = serde_json::from_str::<Value>(raw)
            .map_err(|e| ProgressDecodeError::Json(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(ProgressDecodeError::NotAnObject);
        };

        let entries = object
            .into_iter()
            .filter_map(|(key, value)| {
                let key = key.parse::<ProgressKey>().ok()?;
                let done = count_from_value(&value)?;
                Some((key, done))
            })
            .collect();
        Ok(Self { entries })
    }

    /// Serialize as a flat JSON object of `"kit-exercise": count`.
    #[must_use]
    pub fn encode(&self) -> String {
        let object: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, value)| (key.to_string(), Value::from(*value)))
            .collect();
        Value::Object(object).to_string()
    }
}

impl FromIterator<(ProgressKey, u32)> for ProgressMap {
    fn from_iter<T: IntoIterator<Item = (ProgressKey, u32)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_from_value(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return Some(u32::try_from(n).unwrap_or(u32::MAX));
    }
    if value.as_i64().is_some() {
        // Negative counts.
        return Some(0);
    }
    let n = value.as_f64()?;
    if !n.is_finite() {
        return None;
    }
    // `as` saturates, which also maps negatives to 0.
    Some(n.trunc() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kit: u64, exercise: u64) -> ProgressKey {
        ProgressKey::new(KitId::new(kit), ExerciseId::new(exercise))
    }

    #[test]
    fn key_round_trips_through_display() {
        let k = key(12, 340);
        assert_eq!(k.to_string(), "12-340");
        assert_eq!("12-340".parse::<ProgressKey>().unwrap(), k);
    }

    #[test]
    fn key_rejects_malformed_input() {
        assert!("12".parse::<ProgressKey>().is_err());
        assert!("a-b".parse::<ProgressKey>().is_err());
        assert!("1-2-3".parse::<ProgressKey>().is_err());
    }

    #[test]
    fn clamp_respects_known_total() {
        assert_eq!(clamp_done(5, Some(3)), 3);
        assert_eq!(clamp_done(2, Some(3)), 2);
        assert_eq!(clamp_done(7, None), 7);
    }

    #[test]
    fn clamp_is_idempotent() {
        for done in 0..10 {
            for total in [None, Some(0), Some(3), Some(9)] {
                let once = clamp_done(done, total);
                assert_eq!(clamp_done(once, total), once);
            }
        }
    }

    #[test]
    fn get_defaults_to_zero() {
        let map = ProgressMap::new();
        assert_eq!(map.get(KitId::new(1), ExerciseId::new(1)), 0);
    }

    #[test]
    fn decode_corrupt_payload_yields_empty_map() {
        assert!(ProgressMap::decode("{not json").is_empty());
        assert!(ProgressMap::decode("[1,2,3]").is_empty());
        assert!(ProgressMap::decode("").is_empty());
        assert_eq!(
            ProgressMap::try_decode("[1]"),
            Err(ProgressDecodeError::NotAnObject)
        );
        assert!(matches!(
            ProgressMap::try_decode("{oops"),
            Err(ProgressDecodeError::Json(_))
        ));
    }

    #[test]
    fn decode_skips_bad_entries_and_clamps_negatives() {
        let map = ProgressMap::decode(
            r#"{"1-2": 3, "1-3": -4, "1-4": 2.9, "bogus": 1, "1-5": "x"}"#,
        );
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(KitId::new(1), ExerciseId::new(2)), 3);
        assert_eq!(map.get(KitId::new(1), ExerciseId::new(3)), 0);
        assert_eq!(map.get(KitId::new(1), ExerciseId::new(4)), 2);
    }

    #[test]
    fn encode_then_decode_preserves_entries() {
        let mut map = ProgressMap::new();
        map.set(KitId::new(4), ExerciseId::new(10), 2);
        map.set(KitId::new(4), ExerciseId::new(11), 0);
        assert_eq!(ProgressMap::decode(&map.encode()), map);
    }

    #[test]
    fn merge_overwrites_and_keeps_local_only_entries() {
        let mut local = ProgressMap::new();
        local.set(KitId::new(1), ExerciseId::new(1), 1);
        local.set(KitId::new(1), ExerciseId::new(2), 4);

        let mut incoming = ProgressMap::new();
        incoming.set(KitId::new(1), ExerciseId::new(1), 3);

        local.merge(&incoming);
        assert_eq!(local.get(KitId::new(1), ExerciseId::new(1)), 3);
        assert_eq!(local.get(KitId::new(1), ExerciseId::new(2)), 4);
    }
}
