//! Typed identifiers for entities and rows.
//!
//! Entities live in arenas keyed by [`ModelId`]; relations between them are
//! plain id lists. A [`RowId`] names a row in the flattened table and renders
//! the way the grid addresses rows: `17`, `placeholder-3`, `group-4`,
//! `markup-2`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Server-assigned identity of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub u64);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally-assigned identity of a row awaiting server confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderId(pub u64);

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "placeholder-{}", self.0)
    }
}

/// Identity of a row in the table.
///
/// The derived ordering (models, then placeholders, then groups, then
/// markups, each by number) is the deterministic tie-break for rows that
/// share an order key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowId {
    Model(ModelId),
    Placeholder(PlaceholderId),
    Group(ModelId),
    Markup(ModelId),
}

impl RowId {
    /// Row id of a line item (account or sub-account).
    #[must_use]
    pub const fn model(id: u64) -> Self {
        Self::Model(ModelId(id))
    }

    /// True for rows that carry line-item data (models and placeholders).
    #[must_use]
    pub const fn is_line(self) -> bool {
        matches!(self, Self::Model(_) | Self::Placeholder(_))
    }

    /// The server id, if the row has one.
    #[must_use]
    pub const fn model_id(self) -> Option<ModelId> {
        match self {
            Self::Model(id) | Self::Group(id) | Self::Markup(id) => Some(id),
            Self::Placeholder(_) => None,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(id) => write!(f, "{id}"),
            Self::Placeholder(id) => write!(f, "{id}"),
            Self::Group(id) => write!(f, "group-{id}"),
            Self::Markup(id) => write!(f, "markup-{id}"),
        }
    }
}

/// Error returned when parsing a malformed row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRowIdError {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for ParseRowIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid row id '{}': expected <n>, placeholder-<n>, group-<n> or markup-<n>",
            self.raw
        )
    }
}

impl std::error::Error for ParseRowIdError {}

impl FromStr for RowId {
    type Err = ParseRowIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRowIdError { raw: s.to_string() };
        let number = |raw: &str| raw.parse::<u64>().map_err(|_| err());

        if let Some(rest) = s.strip_prefix("placeholder-") {
            return Ok(Self::Placeholder(PlaceholderId(number(rest)?)));
        }
        if let Some(rest) = s.strip_prefix("group-") {
            return Ok(Self::Group(ModelId(number(rest)?)));
        }
        if let Some(rest) = s.strip_prefix("markup-") {
            return Ok(Self::Markup(ModelId(number(rest)?)));
        }
        Ok(Self::Model(ModelId(number(s)?)))
    }
}

// Serialized as the grid-facing string form.
impl Serialize for RowId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
