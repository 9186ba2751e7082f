use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{FieldError, FieldName};
use crate::model::{ModelId, Tag};

/// A column value in row representation.
///
/// `Null` is an explicit clear. Absence of a value is expressed one level up
/// as `Option::None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Number(f64),
    Text(String),
    Ids(Vec<ModelId>),
    Tag(Tag),
    /// A single related id. Produced by conversions and write-only fields.
    Id(ModelId),
}

impl FieldValue {
    #[must_use]
    pub fn from_text(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |s| Self::Text(s.to_owned()))
    }

    #[must_use]
    pub fn from_number(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Number)
    }

    const fn describe(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Ids(_) => "id list",
            Self::Tag(_) => "tag",
            Self::Id(_) => "id",
        }
    }

    fn mismatch(&self, field: FieldName, expected: &'static str) -> FieldError {
        FieldError::TypeMismatch {
            field,
            expected,
            found: self.describe().to_owned(),
        }
    }

    /// # Errors
    ///
    /// Returns [`FieldError::TypeMismatch`] unless the value is text or null.
    pub fn as_text(&self, field: FieldName) -> Result<Option<String>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Text(s) => Ok(Some(s.clone())),
            other => Err(other.mismatch(field, "text")),
        }
    }

    /// # Errors
    ///
    /// Returns [`FieldError::TypeMismatch`] unless the value is a finite
    /// number or null.
    pub fn as_number(&self, field: FieldName) -> Result<Option<f64>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Number(n) if n.is_finite() => Ok(Some(*n)),
            Self::Number(_) => Err(FieldError::TypeMismatch {
                field,
                expected: "finite number",
                found: "non-finite number".to_owned(),
            }),
            other => Err(other.mismatch(field, "number")),
        }
    }

    /// # Errors
    ///
    /// Returns [`FieldError::TypeMismatch`] unless the value is a tag or null.
    pub fn as_tag(&self, field: FieldName) -> Result<Option<Tag>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Tag(tag) => Ok(Some(tag.clone())),
            other => Err(other.mismatch(field, "tag")),
        }
    }

    /// # Errors
    ///
    /// Returns [`FieldError::TypeMismatch`] unless the value is an id list or
    /// null.
    pub fn as_ids(&self, field: FieldName) -> Result<Vec<ModelId>, FieldError> {
        match self {
            Self::Null => Ok(Vec::new()),
            Self::Ids(ids) => Ok(ids.clone()),
            other => Err(other.mismatch(field, "id list")),
        }
    }

    /// JSON as submitted to the API.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Number(n) => json!(n),
            Self::Text(s) => Value::String(s.clone()),
            Self::Ids(ids) => Value::Array(ids.iter().map(|id| json!(id.0)).collect()),
            Self::Tag(tag) => json!({ "id": tag.id.0, "title": tag.title, "color": tag.color }),
            Self::Id(id) => json!(id.0),
        }
    }

    /// Decode a payload value for `field`, using the column's type to pick
    /// between a number and an id.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::TypeMismatch`] when the JSON does not fit the
    /// column.
    pub fn from_json(field: FieldName, value: &Value) -> Result<Self, FieldError> {
        let mismatch = |expected: &'static str| FieldError::TypeMismatch {
            field,
            expected,
            found: value.to_string(),
        };
        if value.is_null() {
            return Ok(Self::Null);
        }
        match field {
            FieldName::Identifier
            | FieldName::Description
            | FieldName::Order
            | FieldName::Name
            | FieldName::Color => value
                .as_str()
                .map(|s| Self::Text(s.to_owned()))
                .ok_or_else(|| mismatch("text")),
            FieldName::Quantity
            | FieldName::Rate
            | FieldName::Multiplier
            | FieldName::NominalValue
            | FieldName::Actual
            | FieldName::AccumulatedFringeContribution
            | FieldName::AccumulatedMarkupContribution
            | FieldName::MarkupContribution => value
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| mismatch("number")),
            FieldName::Group => value
                .as_u64()
                .map(|id| Self::Id(ModelId(id)))
                .ok_or_else(|| mismatch("id")),
            FieldName::Unit => {
                if let Some(id) = value.as_u64() {
                    return Ok(Self::Id(ModelId(id)));
                }
                serde_json::from_value::<Tag>(value.clone())
                    .map(Self::Tag)
                    .map_err(|_| mismatch("unit id or tag"))
            }
            FieldName::Fringes | FieldName::Children => value
                .as_array()
                .and_then(|items| {
                    items
                        .iter()
                        .map(|v| v.as_u64().map(ModelId))
                        .collect::<Option<Vec<_>>>()
                })
                .map(Self::Ids)
                .ok_or_else(|| mismatch("id list")),
        }
    }
}
