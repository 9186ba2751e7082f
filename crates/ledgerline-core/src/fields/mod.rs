//! Field mapper.
//!
//! Each line-item column is declared as a [`Field`]:
//!
//! - **ReadOnly**: flows model → row only and is never submitted (derived
//!   totals, children, order).
//! - **WriteOnly**: computed from row state at submission time and not stored
//!   on the entity (group membership).
//! - **ReadWrite**: flows both ways, optionally converted on the way out
//!   (a linked unit tag is submitted as its id).
//!
//! A field resolves from any of four input shapes ([`FieldInput`]). The
//! result distinguishes "not applicable" (`Ok(None)`, dropped from payloads)
//! from an explicit clear (`Ok(Some(FieldValue::Null))`, sent as `null`).
//! Resolving against a shape the field can never apply to (a sub-account
//! column against an account, a line column against a group row) is a
//! configuration bug and fails with [`FieldError::IncompatibleInput`].

pub mod manager;
pub mod value;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ErrorCode;
use crate::model::{LineData, LineItem, LineItemKind};
use crate::order::OrderKey;
use crate::rows::Row;

pub use manager::{Payload, RowManager};
pub use value::FieldValue;

/// Column names addressable by edits and payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Identifier,
    Description,
    Quantity,
    Rate,
    Multiplier,
    Unit,
    Fringes,
    Group,
    Order,
    NominalValue,
    Actual,
    AccumulatedFringeContribution,
    AccumulatedMarkupContribution,
    MarkupContribution,
    Children,
    Name,
    Color,
}

impl FieldName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Description => "description",
            Self::Quantity => "quantity",
            Self::Rate => "rate",
            Self::Multiplier => "multiplier",
            Self::Unit => "unit",
            Self::Fringes => "fringes",
            Self::Group => "group",
            Self::Order => "order",
            Self::NominalValue => "nominal_value",
            Self::Actual => "actual",
            Self::AccumulatedFringeContribution => "accumulated_fringe_contribution",
            Self::AccumulatedMarkupContribution => "accumulated_markup_contribution",
            Self::MarkupContribution => "markup_contribution",
            Self::Children => "children",
            Self::Name => "name",
            Self::Color => "color",
        }
    }

    /// Columns that only exist on sub-accounts.
    #[must_use]
    pub const fn sub_account_only(self) -> bool {
        matches!(
            self,
            Self::Quantity | Self::Rate | Self::Multiplier | Self::Unit | Self::Fringes
        )
    }

    /// Columns whose value feeds derived totals.
    #[must_use]
    pub const fn participates_in_totals(self) -> bool {
        matches!(
            self,
            Self::Quantity
                | Self::Rate
                | Self::Multiplier
                | Self::Fringes
                | Self::Children
                | Self::NominalValue
                | Self::Actual
        )
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-cell edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellChange {
    #[serde(default = "null_value")]
    pub old: FieldValue,
    pub new: FieldValue,
}

const fn null_value() -> FieldValue {
    FieldValue::Null
}

impl CellChange {
    #[must_use]
    pub const fn to(new: FieldValue) -> Self {
        Self {
            old: FieldValue::Null,
            new,
        }
    }
}

/// A batch of cell edits to one row, keyed by column.
pub type RowChangeData = BTreeMap<FieldName, CellChange>;

/// The shape a field is being resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputShape {
    Model,
    Row,
    Change,
    ChangeData,
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Model => "model",
            Self::Row => "row",
            Self::Change => "change",
            Self::ChangeData => "change-data",
        })
    }
}

/// Input a field can resolve its value from.
#[derive(Debug, Clone, Copy)]
pub enum FieldInput<'a> {
    Model(&'a LineItem),
    Row(&'a Row),
    Change {
        field: FieldName,
        change: &'a CellChange,
    },
    ChangeData(&'a RowChangeData),
}

impl FieldInput<'_> {
    #[must_use]
    pub const fn shape(&self) -> InputShape {
        match self {
            Self::Model(_) => InputShape::Model,
            Self::Row(_) => InputShape::Row,
            Self::Change { .. } => InputShape::Change,
            Self::ChangeData(_) => InputShape::ChangeData,
        }
    }
}

/// Field mapping errors. All of these indicate a caller or configuration
/// bug rather than bad server data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("field '{field}' cannot be resolved from {shape} input: {reason}")]
    IncompatibleInput {
        field: FieldName,
        shape: InputShape,
        reason: &'static str,
    },

    #[error("field '{0}' is read-only")]
    ReadOnly(FieldName),

    #[error("field '{field}' is not defined for {kind} rows")]
    NotDefined { field: FieldName, kind: LineItemKind },

    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: FieldName,
        expected: &'static str,
        found: String,
    },
}

impl FieldError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::IncompatibleInput { .. } | Self::NotDefined { .. } => {
                ErrorCode::IncompatibleFieldInput
            }
            Self::ReadOnly(_) => ErrorCode::ReadOnlyField,
            Self::TypeMismatch { .. } => ErrorCode::FieldTypeMismatch,
        }
    }
}

/// Conversion applied to a read-write value before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Submit a linked tag as its id.
    TagToId,
}

impl Conversion {
    fn apply(self, value: FieldValue) -> FieldValue {
        match (self, value) {
            (Self::TagToId, FieldValue::Tag(tag)) => FieldValue::Id(tag.id),
            (_, other) => other,
        }
    }
}

/// A column declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ReadOnly(FieldName),
    WriteOnly(FieldName),
    ReadWrite {
        name: FieldName,
        convert: Option<Conversion>,
    },
}

impl Field {
    #[must_use]
    pub const fn name(&self) -> FieldName {
        match self {
            Self::ReadOnly(name) | Self::WriteOnly(name) | Self::ReadWrite { name, .. } => *name,
        }
    }

    /// True for fields that appear in outgoing payloads.
    #[must_use]
    pub const fn is_submitted(&self) -> bool {
        matches!(self, Self::WriteOnly(_) | Self::ReadWrite { .. })
    }

    /// Resolve the field's value in its row representation.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::IncompatibleInput`] when the input can never
    /// carry this field.
    pub fn resolve(&self, input: FieldInput<'_>) -> Result<Option<FieldValue>, FieldError> {
        let name = self.name();
        match input {
            FieldInput::Model(model) => {
                check_kind(name, model.data.kind, InputShape::Model)?;
                Ok(match self {
                    Self::WriteOnly(_) => None,
                    Self::ReadOnly(_) | Self::ReadWrite { .. } => {
                        read_line(name, &model.data, Some(&model.order))
                    }
                })
            }
            FieldInput::Row(row) => {
                let data = row.line().ok_or(FieldError::IncompatibleInput {
                    field: name,
                    shape: InputShape::Row,
                    reason: "group and markup rows carry no line-item columns",
                })?;
                check_kind(name, data.kind, InputShape::Row)?;
                Ok(match self {
                    Self::WriteOnly(FieldName::Group) => Some(
                        row.meta()
                            .and_then(|m| m.group)
                            .map_or(FieldValue::Null, FieldValue::Id),
                    ),
                    Self::WriteOnly(_) => None,
                    Self::ReadOnly(_) | Self::ReadWrite { .. } => read_line(name, data, row.order()),
                })
            }
            FieldInput::Change { field, change } => Ok(match self {
                Self::ReadWrite { .. } if field == name => Some(change.new.clone()),
                _ => None,
            }),
            FieldInput::ChangeData(changes) => Ok(match self {
                Self::ReadWrite { .. } => changes.get(&name).map(|c| c.new.clone()),
                Self::ReadOnly(_) | Self::WriteOnly(_) => None,
            }),
        }
    }

    /// Resolve the field's value as it should be submitted.
    ///
    /// Read-only fields are never submitted and resolve to `None`.
    ///
    /// # Errors
    ///
    /// Same as [`Field::resolve`].
    pub fn submitted(&self, input: FieldInput<'_>) -> Result<Option<FieldValue>, FieldError> {
        match self {
            Self::ReadOnly(_) => Ok(None),
            Self::WriteOnly(_) => self.resolve(input),
            Self::ReadWrite { convert, .. } => {
                let value = self.resolve(input)?;
                Ok(match convert {
                    Some(conversion) => value.map(|v| conversion.apply(v)),
                    None => value,
                })
            }
        }
    }
}

const fn check_kind(
    name: FieldName,
    kind: LineItemKind,
    shape: InputShape,
) -> Result<(), FieldError> {
    if name.sub_account_only() && matches!(kind, LineItemKind::Account) {
        return Err(FieldError::IncompatibleInput {
            field: name,
            shape,
            reason: "column applies to sub-accounts only",
        });
    }
    Ok(())
}

/// Read a column from line data in its row representation.
fn read_line(name: FieldName, data: &LineData, order: Option<&OrderKey>) -> Option<FieldValue> {
    Some(match name {
        FieldName::Identifier => FieldValue::from_text(data.identifier.as_deref()),
        FieldName::Description => FieldValue::from_text(data.description.as_deref()),
        FieldName::Quantity => FieldValue::from_number(data.quantity),
        FieldName::Rate => FieldValue::from_number(data.rate),
        FieldName::Multiplier => FieldValue::from_number(data.multiplier),
        FieldName::Unit => data.unit.clone().map_or(FieldValue::Null, FieldValue::Tag),
        FieldName::Fringes => FieldValue::Ids(data.fringes.clone()),
        FieldName::Children => FieldValue::Ids(data.children.clone()),
        FieldName::NominalValue => FieldValue::Number(data.nominal_value),
        FieldName::Actual => FieldValue::Number(data.actual),
        FieldName::AccumulatedFringeContribution => {
            FieldValue::Number(data.accumulated_fringe_contribution)
        }
        FieldName::AccumulatedMarkupContribution => {
            FieldValue::Number(data.accumulated_markup_contribution)
        }
        FieldName::MarkupContribution => FieldValue::Number(data.markup_contribution),
        FieldName::Order => FieldValue::Text(order?.to_string()),
        FieldName::Group | FieldName::Name | FieldName::Color => return None,
    })
}

/// Write a column into line data without checking its access mode.
pub(crate) fn write_line(
    name: FieldName,
    data: &mut LineData,
    value: &FieldValue,
) -> Result<(), FieldError> {
    match name {
        FieldName::Identifier => data.identifier = value.as_text(name)?,
        FieldName::Description => data.description = value.as_text(name)?,
        FieldName::Quantity => data.quantity = value.as_number(name)?,
        FieldName::Rate => data.rate = value.as_number(name)?,
        FieldName::Multiplier => data.multiplier = value.as_number(name)?,
        FieldName::Unit => data.unit = value.as_tag(name)?,
        FieldName::Fringes => data.fringes = value.as_ids(name)?,
        FieldName::Children => data.children = value.as_ids(name)?,
        FieldName::NominalValue => data.nominal_value = value.as_number(name)?.unwrap_or(0.0),
        FieldName::Actual => data.actual = value.as_number(name)?.unwrap_or(0.0),
        FieldName::AccumulatedFringeContribution => {
            data.accumulated_fringe_contribution = value.as_number(name)?.unwrap_or(0.0);
        }
        FieldName::AccumulatedMarkupContribution => {
            data.accumulated_markup_contribution = value.as_number(name)?.unwrap_or(0.0);
        }
        FieldName::MarkupContribution => {
            data.markup_contribution = value.as_number(name)?.unwrap_or(0.0);
        }
        FieldName::Group | FieldName::Order | FieldName::Name | FieldName::Color => {
            return Err(FieldError::NotDefined {
                field: name,
                kind: data.kind,
            });
        }
    }
    Ok(())
}
