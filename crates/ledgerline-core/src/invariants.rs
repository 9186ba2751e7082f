//! Structural and arithmetic checks over a table state.
//!
//! Used by `ldg check` and by the property tests. A clean state produces no
//! violations.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::model::{LineData, ModelId, RateUnit, RowId, Totals};
use crate::rows::Row;
use crate::state::TableState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    DuplicateRow { row: RowId },
    /// A parent's nominal value is not the sum of its loaded children.
    ParentSum { row: RowId, expected: f64, found: f64 },
    OrphanGroup { group: ModelId },
    /// A group's members are split or its row is not right after them.
    GroupLayout { group: ModelId },
    GroupTotals { group: ModelId, expected: f64, found: f64 },
    MarkupNotLast { row: RowId },
    MarkupContribution { markup: ModelId, expected: f64, found: f64 },
    ScopeTotals { expected: f64, found: f64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateRow { row } => write!(f, "row {row} appears more than once"),
            Self::ParentSum { row, expected, found } => {
                write!(f, "row {row}: nominal {found} != children sum {expected}")
            }
            Self::OrphanGroup { group } => write!(f, "group {group} has no member rows"),
            Self::GroupLayout { group } => {
                write!(f, "group {group}: members are not contiguous before the group row")
            }
            Self::GroupTotals { group, expected, found } => {
                write!(f, "group {group}: estimated {found} != members sum {expected}")
            }
            Self::MarkupNotLast { row } => write!(f, "row {row} follows a markup row"),
            Self::MarkupContribution { markup, expected, found } => {
                write!(f, "markup {markup}: contribution {found} != {expected}")
            }
            Self::ScopeTotals { expected, found } => {
                write!(f, "scope estimated {found} != rows sum {expected}")
            }
        }
    }
}

fn differs(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() > epsilon * a.abs().max(b.abs()).max(1.0)
}

/// Run every check, returning violations in row order.
#[must_use]
pub fn check(state: &TableState, epsilon: f64) -> Vec<Violation> {
    let mut out = Vec::new();

    let mut seen = BTreeSet::new();
    for row in &state.rows {
        if !seen.insert(row.id()) {
            out.push(Violation::DuplicateRow { row: row.id() });
        }
    }

    check_parent_sums(state, epsilon, &mut out);
    check_groups(state, epsilon, &mut out);
    check_markups(state, epsilon, &mut out);

    let expected: f64 = state
        .line_rows()
        .filter_map(Row::line)
        .map(LineData::estimated)
        .sum::<f64>()
        + state
            .markups()
            .filter(|m| m.unit == RateUnit::Flat)
            .map(|m| m.contribution)
            .sum::<f64>();
    if differs(expected, state.totals.estimated(), epsilon) {
        out.push(Violation::ScopeTotals {
            expected,
            found: state.totals.estimated(),
        });
    }
    out
}

fn check_parent_sums(state: &TableState, epsilon: f64, out: &mut Vec<Violation>) {
    let rows = state.line_rows().filter_map(|r| r.line().map(|d| (r.id(), d)));
    let descendants = state
        .descendants
        .values()
        .map(|d| (RowId::Model(d.id), &d.data));
    for (id, data) in rows.chain(descendants) {
        if data.is_leaf() {
            continue;
        }
        let children: Option<Vec<f64>> = data
            .children
            .iter()
            .map(|c| state.line(RowId::Model(*c)).map(|d| d.nominal_value))
            .collect();
        let Some(children) = children else {
            continue;
        };
        let expected: f64 = children.iter().sum();
        if differs(expected, data.nominal_value, epsilon) {
            out.push(Violation::ParentSum {
                row: id,
                expected,
                found: data.nominal_value,
            });
        }
    }
}

fn check_groups(state: &TableState, epsilon: f64, out: &mut Vec<Violation>) {
    for (pos, row) in state.rows.iter().enumerate() {
        let Row::Group(group) = row else {
            continue;
        };
        let members: Vec<&LineData> = group
            .children
            .iter()
            .filter_map(|c| state.row(*c).and_then(Row::line))
            .collect();
        if members.is_empty() {
            out.push(Violation::OrphanGroup { group: group.id });
            continue;
        }

        let start = pos.saturating_sub(group.children.len());
        let contiguous = state.rows[start..pos]
            .iter()
            .map(Row::id)
            .collect::<BTreeSet<_>>()
            == group.children.iter().copied().collect::<BTreeSet<_>>();
        if !contiguous {
            out.push(Violation::GroupLayout { group: group.id });
        }

        let expected = members.iter().map(|d| Totals::of_line(d)).sum::<Totals>().estimated();
        if differs(expected, group.totals.estimated(), epsilon) {
            out.push(Violation::GroupTotals {
                group: group.id,
                expected,
                found: group.totals.estimated(),
            });
        }
    }
}

fn check_markups(state: &TableState, epsilon: f64, out: &mut Vec<Violation>) {
    let mut after_markup = false;
    for row in &state.rows {
        match row {
            Row::Markup(markup) => {
                after_markup = true;
                let expected = match markup.unit {
                    RateUnit::Flat => markup.rate.unwrap_or(0.0),
                    RateUnit::Percent => markup
                        .children
                        .iter()
                        .filter_map(|c| state.row(*c).and_then(Row::line))
                        .map(|d| markup.rate.unwrap_or(0.0) * d.markup_base())
                        .sum(),
                };
                if differs(expected, markup.contribution, epsilon) {
                    out.push(Violation::MarkupContribution {
                        markup: markup.id,
                        expected,
                        found: markup.contribution,
                    });
                }
            }
            other if after_markup => out.push(Violation::MarkupNotLast { row: other.id() }),
            _ => {}
        }
    }
}
