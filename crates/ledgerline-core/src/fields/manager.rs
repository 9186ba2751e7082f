//! Per-kind field tables and payload construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{
    Conversion, Field, FieldError, FieldInput, FieldName, FieldValue, RowChangeData, write_line,
};
use crate::model::{LineData, LineItem, LineItemKind, ModelId, Tag};
use crate::order::OrderKey;
use crate::rows::Row;

const ACCOUNT_FIELDS: &[Field] = &[
    Field::ReadWrite {
        name: FieldName::Identifier,
        convert: None,
    },
    Field::ReadWrite {
        name: FieldName::Description,
        convert: None,
    },
    Field::WriteOnly(FieldName::Group),
    Field::ReadOnly(FieldName::Order),
    Field::ReadOnly(FieldName::NominalValue),
    Field::ReadOnly(FieldName::Actual),
    Field::ReadOnly(FieldName::AccumulatedFringeContribution),
    Field::ReadOnly(FieldName::AccumulatedMarkupContribution),
    Field::ReadOnly(FieldName::MarkupContribution),
    Field::ReadOnly(FieldName::Children),
];

const SUB_ACCOUNT_FIELDS: &[Field] = &[
    Field::ReadWrite {
        name: FieldName::Identifier,
        convert: None,
    },
    Field::ReadWrite {
        name: FieldName::Description,
        convert: None,
    },
    Field::ReadWrite {
        name: FieldName::Quantity,
        convert: None,
    },
    Field::ReadWrite {
        name: FieldName::Rate,
        convert: None,
    },
    Field::ReadWrite {
        name: FieldName::Multiplier,
        convert: None,
    },
    Field::ReadWrite {
        name: FieldName::Unit,
        convert: Some(Conversion::TagToId),
    },
    Field::ReadWrite {
        name: FieldName::Fringes,
        convert: None,
    },
    Field::WriteOnly(FieldName::Group),
    Field::ReadOnly(FieldName::Order),
    Field::ReadOnly(FieldName::NominalValue),
    Field::ReadOnly(FieldName::Actual),
    Field::ReadOnly(FieldName::AccumulatedFringeContribution),
    Field::ReadOnly(FieldName::AccumulatedMarkupContribution),
    Field::ReadOnly(FieldName::MarkupContribution),
    Field::ReadOnly(FieldName::Children),
];

/// Request body fields, keyed by column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<FieldName, Value>);

impl Payload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: FieldName, value: &FieldValue) {
        self.0.insert(name, value.to_json());
    }

    #[must_use]
    pub fn with(mut self, name: FieldName, value: &FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn get(&self, name: FieldName) -> Option<&Value> {
        self.0.get(&name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &Value)> {
        self.0.iter().map(|(name, value)| (*name, value))
    }
}

/// Body of a bulk create request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkCreatePayload {
    pub data: Vec<Payload>,
}

/// One entry of a bulk update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub id: ModelId,
    #[serde(flatten)]
    pub fields: Payload,
}

/// Body of a bulk update request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdatePayload {
    pub data: Vec<UpdateEntry>,
}

/// Body of a bulk delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeletePayload {
    pub ids: Vec<ModelId>,
}

/// Field table for one line-item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowManager {
    kind: LineItemKind,
    fields: &'static [Field],
}

impl RowManager {
    #[must_use]
    pub const fn for_kind(kind: LineItemKind) -> Self {
        let fields = match kind {
            LineItemKind::Account => ACCOUNT_FIELDS,
            LineItemKind::SubAccount => SUB_ACCOUNT_FIELDS,
        };
        Self { kind, fields }
    }

    #[must_use]
    pub const fn kind(&self) -> LineItemKind {
        self.kind
    }

    #[must_use]
    pub const fn fields(&self) -> &'static [Field] {
        self.fields
    }

    #[must_use]
    pub fn field(&self, name: FieldName) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Columns shown on the row for `model`, in row representation.
    ///
    /// # Errors
    ///
    /// Fails when the model is not of this manager's kind.
    pub fn row_data(&self, model: &LineItem) -> Result<BTreeMap<FieldName, FieldValue>, FieldError> {
        if model.data.kind != self.kind {
            return Err(FieldError::IncompatibleInput {
                field: FieldName::Identifier,
                shape: super::InputShape::Model,
                reason: "model kind does not match the row manager",
            });
        }
        let mut columns = BTreeMap::new();
        for field in self.fields.iter().filter(|f| !matches!(f, Field::WriteOnly(_))) {
            if let Some(value) = field.resolve(FieldInput::Model(model))? {
                columns.insert(field.name(), value);
            }
        }
        Ok(columns)
    }

    /// Payload creating the entity a row represents.
    ///
    /// # Errors
    ///
    /// Fails when the row is not a line row of this manager's kind.
    pub fn create_payload(&self, row: &Row) -> Result<Payload, FieldError> {
        self.collect(FieldInput::Row(row))
    }

    /// Payload carrying only the edited, submittable columns of a batch.
    ///
    /// # Errors
    ///
    /// Fails when the batch edits a column this kind does not accept.
    pub fn update_payload(&self, changes: &RowChangeData) -> Result<Payload, FieldError> {
        for name in changes.keys() {
            self.writable(*name)?;
        }
        self.collect(FieldInput::ChangeData(changes))
    }

    fn collect(&self, input: FieldInput<'_>) -> Result<Payload, FieldError> {
        let mut payload = Payload::new();
        for field in self.fields.iter().filter(|f| f.is_submitted()) {
            if let Some(value) = field.submitted(input)? {
                payload.insert(field.name(), &value);
            }
        }
        Ok(payload)
    }

    fn writable(&self, name: FieldName) -> Result<&'static Field, FieldError> {
        match self.field(name) {
            Some(field @ Field::ReadWrite { .. }) => Ok(field),
            Some(_) => Err(FieldError::ReadOnly(name)),
            None => Err(FieldError::NotDefined {
                field: name,
                kind: self.kind,
            }),
        }
    }

    /// Apply a user edit to row data.
    ///
    /// # Errors
    ///
    /// Fails when the column is not read-write for this kind, or the value
    /// does not fit the column.
    pub fn apply_change(
        &self,
        data: &mut LineData,
        name: FieldName,
        value: &FieldValue,
    ) -> Result<(), FieldError> {
        self.writable(name)?;
        write_line(name, data, value)
    }

    /// Apply every edit of a batch, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Same as [`RowManager::apply_change`]. `data` may be partially updated.
    pub fn apply_changes(&self, data: &mut LineData, changes: &RowChangeData) -> Result<(), FieldError> {
        for (name, change) in changes {
            self.apply_change(data, *name, &change.new)?;
        }
        Ok(())
    }

    /// Build row data for a fresh row from resolved column values.
    ///
    /// # Errors
    ///
    /// Same as [`RowManager::apply_change`].
    pub fn new_row_data(&self, values: &BTreeMap<FieldName, FieldValue>) -> Result<LineData, FieldError> {
        let mut data = LineData::empty(self.kind);
        for (name, value) in values {
            if *name == FieldName::Group {
                continue;
            }
            self.apply_change(&mut data, *name, value)?;
        }
        Ok(data)
    }
}

impl LineItem {
    /// Apply a submitted payload the way the server stores it.
    ///
    /// Write-only columns are skipped. A unit submitted by id is looked up
    /// with `units`; unknown ids clear the unit.
    ///
    /// # Errors
    ///
    /// Fails when a payload value does not fit its column.
    pub fn patched(
        &self,
        payload: &Payload,
        units: impl Fn(ModelId) -> Option<Tag>,
    ) -> Result<Self, FieldError> {
        let mut next = self.clone();
        for (name, json) in payload.iter() {
            match name {
                FieldName::Group => {}
                FieldName::Order => {
                    let raw = FieldValue::from_json(name, json)?
                        .as_text(name)?
                        .unwrap_or_default();
                    next.order = OrderKey::parse(&raw).map_err(|e| FieldError::TypeMismatch {
                        field: name,
                        expected: "order key",
                        found: e.to_string(),
                    })?;
                }
                FieldName::Unit => {
                    next.data.unit = match FieldValue::from_json(name, json)? {
                        FieldValue::Id(id) => units(id),
                        other => other.as_tag(name)?,
                    };
                }
                _ => write_line(name, &mut next.data, &FieldValue::from_json(name, json)?)?,
            }
        }
        Ok(next)
    }
}
