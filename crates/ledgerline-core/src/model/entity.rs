//! Entities received from the budget API.
//!
//! These are read-only structures except where a client patches them before
//! submission. Relations (children, group members, markup targets, fringes)
//! are id lists into the scope's arena.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::id::ModelId;
use crate::order::OrderKey;

/// The two kinds of line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Account,
    SubAccount,
}

impl LineItemKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::SubAccount => "sub_account",
        }
    }
}

impl fmt::Display for LineItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a markup or fringe rate is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    /// `rate` is a fraction of the value it applies to.
    Percent,
    /// `rate` is an absolute amount.
    Flat,
}

/// A linked unit tag (e.g. "Days", "Flat"), sent to the API by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: ModelId,
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// The data payload of a line item, shared by entities and rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineData {
    pub kind: LineItemKind,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nominal_value: f64,
    #[serde(default)]
    pub actual: f64,
    #[serde(default)]
    pub accumulated_fringe_contribution: f64,
    #[serde(default)]
    pub accumulated_markup_contribution: f64,
    #[serde(default)]
    pub markup_contribution: f64,
    #[serde(default)]
    pub children: Vec<ModelId>,
    #[serde(default)]
    pub fringes: Vec<ModelId>,
    #[serde(default)]
    pub unit: Option<Tag>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub multiplier: Option<f64>,
}

impl LineData {
    /// Blank data for a freshly added row.
    #[must_use]
    pub const fn empty(kind: LineItemKind) -> Self {
        Self {
            kind,
            identifier: None,
            description: None,
            nominal_value: 0.0,
            actual: 0.0,
            accumulated_fringe_contribution: 0.0,
            accumulated_markup_contribution: 0.0,
            markup_contribution: 0.0,
            children: Vec::new(),
            fringes: Vec::new(),
            unit: None,
            quantity: None,
            rate: None,
            multiplier: None,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Nominal value derived from raw inputs, for leaf sub-accounts only.
    ///
    /// Null quantity and rate count as 0; a null multiplier counts as 1.
    #[must_use]
    pub fn derived_nominal(&self) -> Option<f64> {
        if self.kind != LineItemKind::SubAccount || !self.is_leaf() {
            return None;
        }
        Some(
            self.quantity.unwrap_or(0.0)
                * self.rate.unwrap_or(0.0)
                * self.multiplier.unwrap_or(1.0),
        )
    }

    /// The value a Percent markup applies its rate to.
    #[must_use]
    pub fn markup_base(&self) -> f64 {
        self.nominal_value + self.accumulated_fringe_contribution + self.accumulated_markup_contribution
    }

    #[must_use]
    pub fn estimated(&self) -> f64 {
        self.markup_base() + self.markup_contribution
    }

    #[must_use]
    pub fn variance(&self) -> f64 {
        self.estimated() - self.actual
    }
}

/// An account or sub-account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: ModelId,
    pub order: OrderKey,
    #[serde(flatten)]
    pub data: LineData,
}

/// A named, colored subtotal grouping of sibling line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: ModelId,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub children: Vec<ModelId>,
}

/// A Percent or Flat surcharge applied across line items of one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Markup {
    pub id: ModelId,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub unit: RateUnit,
    #[serde(default)]
    pub rate: Option<f64>,
    /// Targets of a Percent markup; always empty for Flat markups.
    #[serde(default)]
    pub children: Vec<ModelId>,
    #[serde(default)]
    pub actual: f64,
}

/// A rate/cutoff modifier applied to a sub-account's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fringe {
    pub id: ModelId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rate: Option<f64>,
    /// Percent fringes apply only up to this value when set.
    #[serde(default)]
    pub cutoff: Option<f64>,
    pub unit: RateUnit,
}

impl Fringe {
    /// Contribution of this fringe to a sub-account with the given nominal value.
    #[must_use]
    pub fn contribution(&self, nominal: f64) -> f64 {
        let rate = self.rate.unwrap_or(0.0);
        match self.unit {
            RateUnit::Flat => rate,
            RateUnit::Percent => match self.cutoff {
                Some(cutoff) if cutoff < nominal => rate * cutoff,
                _ => rate * nominal,
            },
        }
    }
}

/// The kind of parent entity a table is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Budget,
    Account,
    SubAccount,
}

/// The parent whose children a table displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: ModelId,
}

impl Scope {
    #[must_use]
    pub const fn new(kind: ScopeKind, id: u64) -> Self {
        Self {
            kind,
            id: ModelId(id),
        }
    }

    /// Kind of the line items listed directly under this scope.
    #[must_use]
    pub const fn child_kind(self) -> LineItemKind {
        match self.kind {
            ScopeKind::Budget => LineItemKind::Account,
            ScopeKind::Account | ScopeKind::SubAccount => LineItemKind::SubAccount,
        }
    }

    /// API path segment, e.g. `budgets/3`.
    #[must_use]
    pub fn path(self) -> String {
        let collection = match self.kind {
            ScopeKind::Budget => "budgets",
            ScopeKind::Account => "accounts",
            ScopeKind::SubAccount => "subaccounts",
        };
        format!("{collection}/{}", self.id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub_account(quantity: Option<f64>, rate: Option<f64>, multiplier: Option<f64>) -> LineData {
        LineData {
            quantity,
            rate,
            multiplier,
            ..LineData::empty(LineItemKind::SubAccount)
        }
    }

    #[test]
    fn derived_nominal_treats_nulls() {
        assert_eq!(sub_account(Some(2.0), Some(50.0), None).derived_nominal(), Some(100.0));
        assert_eq!(sub_account(None, Some(50.0), Some(3.0)).derived_nominal(), Some(0.0));
        assert_eq!(sub_account(Some(2.0), None, None).derived_nominal(), Some(0.0));
    }

    #[test]
    fn derived_nominal_skips_parents_and_accounts() {
        let mut parent = sub_account(Some(1.0), Some(1.0), None);
        parent.children.push(ModelId(9));
        assert_eq!(parent.derived_nominal(), None);
        assert_eq!(LineData::empty(LineItemKind::Account).derived_nominal(), None);
    }

    #[test]
    fn fringe_cutoff_caps_percent_contribution() {
        let fringe = Fringe {
            id: ModelId(1),
            name: None,
            rate: Some(0.1),
            cutoff: Some(500.0),
            unit: RateUnit::Percent,
        };
        assert!((fringe.contribution(200.0) - 20.0).abs() < 1e-9);
        assert!((fringe.contribution(1_000.0) - 50.0).abs() < 1e-9);

        let flat = Fringe {
            unit: RateUnit::Flat,
            ..fringe
        };
        assert!((flat.contribution(1_000.0) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn line_item_flattens_data_in_json() {
        let json = r#"{"id":4,"order":"n","kind":"sub_account","quantity":2,"rate":10}"#;
        let item: LineItem = serde_json::from_str(json).expect("deserialize");
        assert_eq!(item.id, ModelId(4));
        assert_eq!(item.data.quantity, Some(2.0));
        assert_eq!(item.data.multiplier, None);
        assert!(item.data.children.is_empty());
    }

    #[test]
    fn scope_paths() {
        assert_eq!(Scope::new(ScopeKind::Budget, 3).path(), "budgets/3");
        assert_eq!(Scope::new(ScopeKind::Account, 8).child_kind(), LineItemKind::SubAccount);
    }
}
