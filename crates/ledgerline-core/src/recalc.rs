//! Recalculation engine.
//!
//! Re-derives financial values after an edit, without a server round-trip:
//!
//! 1. Affected leaves recompute their nominal value from quantity, rate and
//!    multiplier, and their fringe contribution from their fringes.
//! 2. Every ancestor of an affected node re-sums nominal value, accumulated
//!    fringe and accumulated markup from its children, deepest first. A node
//!    whose children are not all loaded keeps its server values.
//! 3. Affected rows recompute their share of the scope's Percent markups.
//! 4. Markup contributions, group subtotals and scope totals are recomputed
//!    from the current rows every time.
//!
//! Markup and fringe ids with no matching entity are skipped.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::model::{LineData, LineItemKind, ModelId, RateUnit, RowId, Totals};
use crate::rows::{MarkupRow, Row};
use crate::state::TableState;

/// Recompute derived values for `affected` rows or descendants.
#[must_use]
pub fn recompute(affected: &BTreeSet<RowId>, state: &TableState) -> TableState {
    let mut next = state.clone();
    recompute_in_place(affected, &mut next);
    next
}

/// In-place form of [`recompute`], used inside reducer steps.
pub fn recompute_in_place(affected: &BTreeSet<RowId>, state: &mut TableState) {
    let index: BTreeMap<RowId, usize> = state
        .rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_line())
        .map(|(i, r)| (r.id(), i))
        .collect();
    let parents = parent_index(state);

    let mut dirty: BTreeSet<RowId> = BTreeSet::new();
    for id in affected {
        if !index.contains_key(id) && !is_descendant(state, *id) {
            continue;
        }
        dirty.insert(*id);
        let mut cursor = id.model_id();
        let mut seen = BTreeSet::new();
        while let Some(child) = cursor {
            if !seen.insert(child) {
                debug!(node = %child, "cycle in line-item hierarchy, stopping walk");
                break;
            }
            cursor = parents.get(&child).copied();
            if let Some(parent) = cursor {
                dirty.insert(RowId::Model(parent));
            }
        }
    }

    let mut ordered: Vec<(usize, RowId)> = dirty
        .iter()
        .map(|id| (depth(&parents, *id), *id))
        .collect();
    ordered.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (_, id) in &ordered {
        let Some(updated) = derive_node(state, &index, *id) else {
            continue;
        };
        if let Some(slot) = line_mut(state, &index, *id) {
            *slot = updated;
        }
    }

    let markups: Vec<MarkupRow> = state.markups().cloned().collect();
    for (_, id) in &ordered {
        let Some(&pos) = index.get(id) else {
            continue;
        };
        let Some(data) = state.rows[pos].line() else {
            continue;
        };
        let base = data.markup_base();
        let contribution: f64 = markups
            .iter()
            .filter(|m| m.unit == RateUnit::Percent && m.children.contains(id))
            .map(|m| m.contribution_for(base))
            .sum();
        if let Some(data) = state.rows[pos].line_mut() {
            data.markup_contribution = contribution;
        }
    }

    refresh_aggregates(state, &index);
}

fn is_descendant(state: &TableState, id: RowId) -> bool {
    matches!(id, RowId::Model(m) if state.descendants.contains_key(&m))
}

/// Child → parent over every loaded line item.
fn parent_index(state: &TableState) -> BTreeMap<ModelId, ModelId> {
    let mut parents = BTreeMap::new();
    let rows = state
        .rows
        .iter()
        .filter_map(|r| match (r.id(), r.line()) {
            (RowId::Model(id), Some(data)) => Some((id, data)),
            _ => None,
        });
    let descendants = state.descendants.values().map(|d| (d.id, &d.data));
    for (parent, data) in rows.chain(descendants) {
        for child in &data.children {
            parents.entry(*child).or_insert(parent);
        }
    }
    parents
}

fn depth(parents: &BTreeMap<ModelId, ModelId>, id: RowId) -> usize {
    let mut depth = 0;
    let mut seen = BTreeSet::new();
    let mut cursor = id.model_id();
    while let Some(node) = cursor.and_then(|c| parents.get(&c).copied()) {
        if !seen.insert(node) {
            break;
        }
        depth += 1;
        cursor = Some(node);
    }
    depth
}

fn line<'a>(state: &'a TableState, index: &BTreeMap<RowId, usize>, id: RowId) -> Option<&'a LineData> {
    if let Some(&pos) = index.get(&id) {
        return state.rows[pos].line();
    }
    match id {
        RowId::Model(m) => state.descendants.get(&m).map(|d| &d.data),
        _ => None,
    }
}

fn line_mut<'a>(
    state: &'a mut TableState,
    index: &BTreeMap<RowId, usize>,
    id: RowId,
) -> Option<&'a mut LineData> {
    if let Some(&pos) = index.get(&id) {
        return state.rows[pos].line_mut();
    }
    match id {
        RowId::Model(m) => state.descendants.get_mut(&m).map(|d| &mut d.data),
        _ => None,
    }
}

/// New values for one node, computed from its own inputs and its children.
fn derive_node(state: &TableState, index: &BTreeMap<RowId, usize>, id: RowId) -> Option<LineData> {
    let current = line(state, index, id)?;
    let mut next = current.clone();

    if current.is_leaf() {
        if let Some(nominal) = current.derived_nominal() {
            next.nominal_value = nominal;
        }
        if current.kind == LineItemKind::SubAccount {
            next.accumulated_fringe_contribution = current
                .fringes
                .iter()
                .filter_map(|f| state.fringes.get(f))
                .map(|f| f.contribution(next.nominal_value))
                .sum();
        }
        return Some(next);
    }

    let children: Option<Vec<&LineData>> = current
        .children
        .iter()
        .map(|c| line(state, index, RowId::Model(*c)))
        .collect();
    let Some(children) = children else {
        debug!(node = %id, "children not loaded, keeping server totals");
        return Some(next);
    };

    next.nominal_value = children.iter().map(|c| c.nominal_value).sum();
    next.accumulated_fringe_contribution = children
        .iter()
        .map(|c| c.accumulated_fringe_contribution)
        .sum();
    next.accumulated_markup_contribution = children
        .iter()
        .map(|c| c.accumulated_markup_contribution + c.markup_contribution)
        .sum();
    next.actual = children.iter().map(|c| c.actual).sum();
    Some(next)
}

fn row_line<'a>(rows: &'a [Row], index: &BTreeMap<RowId, usize>, id: &RowId) -> Option<&'a LineData> {
    index.get(id).and_then(|&pos| rows[pos].line())
}

/// Markup contributions, group subtotals and scope totals.
fn refresh_aggregates(state: &mut TableState, index: &BTreeMap<RowId, usize>) {
    let mut markup_contributions = Vec::new();
    let mut group_totals = Vec::new();
    for row in &state.rows {
        match row {
            Row::Markup(m) => {
                let contribution = match m.unit {
                    RateUnit::Flat => m.contribution_for(0.0),
                    RateUnit::Percent => m
                        .children
                        .iter()
                        .filter_map(|c| row_line(&state.rows, index, c))
                        .map(|data| m.contribution_for(data.markup_base()))
                        .sum(),
                };
                markup_contributions.push(contribution);
            }
            Row::Group(g) => {
                group_totals.push(
                    g.children
                        .iter()
                        .filter_map(|c| row_line(&state.rows, index, c))
                        .map(Totals::of_line)
                        .sum::<Totals>(),
                );
            }
            Row::Model(_) | Row::Placeholder(_) => {}
        }
    }

    let mut markups = markup_contributions.into_iter();
    let mut groups = group_totals.into_iter();
    let mut scope = Totals::default();
    for row in &mut state.rows {
        match row {
            Row::Markup(m) => {
                m.contribution = markups.next().unwrap_or_default();
                if m.unit == RateUnit::Flat {
                    scope.markup_contribution += m.contribution;
                }
                scope.actual += m.actual;
            }
            Row::Group(g) => g.totals = groups.next().unwrap_or_default(),
            Row::Model(r) => scope += Totals::of_line(&r.data),
            Row::Placeholder(r) => scope += Totals::of_line(&r.data),
        }
    }
    state.totals = scope;
}
