//! Display rows: the flattened projection of a scope's entities.
//!
//! A table is an ordered `Vec<Row>`. Line rows (models and placeholders) are
//! sorted by order key, each group's members are contiguous and followed by
//! the group's subtotal row, and markup rows come last. [`build::layout`]
//! restores that shape from any row vector.

pub mod build;

use serde::{Deserialize, Serialize};

use crate::model::{LineData, LineItem, Markup, ModelId, PlaceholderId, RateUnit, RowId, Totals};
use crate::order::OrderKey;

pub use build::{RowOptions, build_rows, layout};

/// Row-level bookkeeping that is not part of the entity itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMeta {
    /// Group the row is currently a member of.
    #[serde(default)]
    pub group: Option<ModelId>,
    /// True while a request touching this row is in flight.
    #[serde(default)]
    pub loading: bool,
}

/// A server-confirmed line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRow {
    pub id: ModelId,
    pub order: OrderKey,
    pub data: LineData,
    #[serde(default)]
    pub meta: RowMeta,
}

impl ModelRow {
    #[must_use]
    pub fn from_model(model: &LineItem) -> Self {
        Self {
            id: model.id,
            order: model.order.clone(),
            data: model.data.clone(),
            meta: RowMeta::default(),
        }
    }

    /// The entity this row projects.
    #[must_use]
    pub fn to_model(&self) -> LineItem {
        LineItem {
            id: self.id,
            order: self.order.clone(),
            data: self.data.clone(),
        }
    }
}

/// A locally created line item awaiting a server id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderRow {
    pub id: PlaceholderId,
    pub order: OrderKey,
    pub data: LineData,
    #[serde(default)]
    pub meta: RowMeta,
}

/// Subtotal row for a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: ModelId,
    pub name: String,
    pub color: Option<String>,
    /// Member rows, in display order.
    pub children: Vec<RowId>,
    pub totals: Totals,
}

/// Row for a markup, shown after all line rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupRow {
    pub id: ModelId,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub unit: RateUnit,
    pub rate: Option<f64>,
    /// Target rows; ids without a matching row are tolerated and skipped.
    pub children: Vec<RowId>,
    pub actual: f64,
    /// Total amount this markup adds to the scope.
    pub contribution: f64,
}

impl MarkupRow {
    #[must_use]
    pub fn from_markup(markup: &Markup) -> Self {
        Self {
            id: markup.id,
            identifier: markup.identifier.clone(),
            description: markup.description.clone(),
            unit: markup.unit,
            rate: markup.rate,
            children: markup.children.iter().copied().map(RowId::Model).collect(),
            actual: markup.actual,
            contribution: 0.0,
        }
    }

    /// Contribution of this markup to a target whose base value is `base`.
    #[must_use]
    pub fn contribution_for(&self, base: f64) -> f64 {
        let rate = self.rate.unwrap_or(0.0);
        match self.unit {
            RateUnit::Percent => rate * base,
            RateUnit::Flat => rate,
        }
    }
}

/// A row in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "row_type", rename_all = "snake_case")]
pub enum Row {
    Model(ModelRow),
    Placeholder(PlaceholderRow),
    Group(GroupRow),
    Markup(MarkupRow),
}

impl Row {
    #[must_use]
    pub const fn id(&self) -> RowId {
        match self {
            Self::Model(r) => RowId::Model(r.id),
            Self::Placeholder(r) => RowId::Placeholder(r.id),
            Self::Group(r) => RowId::Group(r.id),
            Self::Markup(r) => RowId::Markup(r.id),
        }
    }

    /// Line-item data for model and placeholder rows.
    #[must_use]
    pub const fn line(&self) -> Option<&LineData> {
        match self {
            Self::Model(r) => Some(&r.data),
            Self::Placeholder(r) => Some(&r.data),
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    pub const fn line_mut(&mut self) -> Option<&mut LineData> {
        match self {
            Self::Model(r) => Some(&mut r.data),
            Self::Placeholder(r) => Some(&mut r.data),
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    #[must_use]
    pub const fn order(&self) -> Option<&OrderKey> {
        match self {
            Self::Model(r) => Some(&r.order),
            Self::Placeholder(r) => Some(&r.order),
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    #[must_use]
    pub const fn meta(&self) -> Option<&RowMeta> {
        match self {
            Self::Model(r) => Some(&r.meta),
            Self::Placeholder(r) => Some(&r.meta),
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    pub const fn meta_mut(&mut self) -> Option<&mut RowMeta> {
        match self {
            Self::Model(r) => Some(&mut r.meta),
            Self::Placeholder(r) => Some(&mut r.meta),
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    #[must_use]
    pub const fn is_line(&self) -> bool {
        matches!(self, Self::Model(_) | Self::Placeholder(_))
    }
}
