use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The three exercise categories a kit can contain.
///
/// Wire representation is the integer id (`1`, `2`, `3`); anything else is
/// treated as an unknown tag and never produces a `Modality`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Modality {
    Reading,
    Writing,
    Visual,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Reading, Modality::Writing, Modality::Visual];

    /// Map a raw integer tag to a known modality.
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Reading),
            2 => Some(Self::Writing),
            3 => Some(Self::Visual),
            _ => None,
        }
    }

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::Reading => 1,
            Self::Writing => 2,
            Self::Visual => 3,
        }
    }

    /// Human-facing name, used in badges and runner manifests.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Reading => "Lectura",
            Self::Writing => "Escritura",
            Self::Visual => "Visual",
        }
    }

    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Writing => "writing",
            Self::Visual => "visual",
        }
    }
}

impl From<Modality> for i64 {
    fn from(value: Modality) -> Self {
        value.id()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown modality: {0}")]
pub struct UnknownModality(pub String);

impl TryFrom<i64> for Modality {
    type Error = UnknownModality;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_id(value).ok_or_else(|| UnknownModality(value.to_string()))
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Modality {
    type Err = UnknownModality;

    /// Accepts either the numeric id or the slug, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Self::try_from(id);
        }
        Self::ALL
            .into_iter()
            .find(|m| m.slug().eq_ignore_ascii_case(raw) || m.label().eq_ignore_ascii_case(raw))
            .ok_or_else(|| UnknownModality(raw.to_owned()))
    }
}
