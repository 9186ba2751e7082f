//! Row model builder.
//!
//! Converts a scope's line items, groups and markups into the ordered row
//! sequence the grid displays:
//!
//! 1. Every line item appears once as a model row, sorted by order key with
//!    ties broken by id ascending.
//! 2. A group's members are emitted together, starting at the position of the
//!    first member, and the group's subtotal row follows its last member.
//! 3. Markup rows come last, by id.
//!
//! Groups whose members were all omitted (or never present) are dropped, so
//! the sequence never holds an orphaned group row.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::{GroupRow, MarkupRow, ModelRow, Row};
use crate::model::{Group, LineData, LineItem, Markup, ModelId, RowId, Totals};

/// Options controlling which entities become rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOptions {
    /// Omit childless line items whose estimated value and actual are both zero.
    #[serde(default)]
    pub exclude_zero_totals: bool,
}

/// Build the row sequence for one scope.
#[must_use]
pub fn build_rows(
    models: &[LineItem],
    groups: &[Group],
    markups: &[Markup],
    options: RowOptions,
) -> Vec<Row> {
    let mut rows = Vec::with_capacity(models.len() + groups.len() + markups.len());
    let mut omitted = 0_usize;

    for model in models {
        if options.exclude_zero_totals && is_zero_total(&model.data) {
            omitted += 1;
            continue;
        }
        rows.push(Row::Model(ModelRow::from_model(model)));
    }

    rows.extend(groups.iter().map(|group| {
        Row::Group(GroupRow {
            id: group.id,
            name: group.name.clone(),
            color: group.color.clone(),
            children: group.children.iter().copied().map(RowId::Model).collect(),
            totals: Totals::default(),
        })
    }));
    rows.extend(markups.iter().map(|m| Row::Markup(MarkupRow::from_markup(m))));

    if omitted > 0 {
        debug!(omitted, "excluded zero-total line items");
    }

    layout(rows)
}

fn is_zero_total(data: &LineData) -> bool {
    data.is_leaf() && data.estimated().abs() < f64::EPSILON && data.actual.abs() < f64::EPSILON
}

fn cmp_lines(a: &Row, b: &Row) -> Ordering {
    a.order()
        .cmp(&b.order())
        .then_with(|| a.id().cmp(&b.id()))
}

/// Restore the canonical row shape from an arbitrary row vector.
///
/// Group membership is taken from each group row's `children`; a line claimed
/// by more than one group stays with the lowest group id. Each line row's
/// `meta.group` is rewritten to match. Member lists are pruned to rows that
/// exist and re-sorted into display order.
#[must_use]
pub fn layout(rows: Vec<Row>) -> Vec<Row> {
    let mut lines: Vec<Row> = Vec::with_capacity(rows.len());
    let mut groups: Vec<GroupRow> = Vec::new();
    let mut markups: Vec<MarkupRow> = Vec::new();
    let mut seen = BTreeSet::new();

    for row in rows {
        if !seen.insert(row.id()) {
            warn!(row = %row.id(), "dropping duplicate row");
            continue;
        }
        match row {
            Row::Group(group) => groups.push(group),
            Row::Markup(markup) => markups.push(markup),
            line => lines.push(line),
        }
    }

    lines.sort_by(cmp_lines);
    groups.sort_by_key(|g| g.id);
    markups.sort_by_key(|m| m.id);

    let position: BTreeMap<RowId, usize> = lines
        .iter()
        .enumerate()
        .map(|(i, row)| (row.id(), i))
        .collect();

    let mut claimed: BTreeMap<RowId, ModelId> = BTreeMap::new();
    for group in &mut groups {
        let group_id = group.id;
        group.children.retain(|child| {
            if !position.contains_key(child) {
                return false;
            }
            if let Some(owner) = claimed.get(child) {
                warn!(row = %child, group = %group_id, owner = %owner, "row already belongs to another group");
                return false;
            }
            claimed.insert(*child, group_id);
            true
        });
        group
            .children
            .sort_by_key(|child| position.get(child).copied().unwrap_or(usize::MAX));
    }

    for line in &mut lines {
        let group = claimed.get(&line.id()).copied();
        if let Some(meta) = line.meta_mut() {
            meta.group = group;
        }
    }

    let mut pending: BTreeMap<ModelId, GroupRow> = BTreeMap::new();
    for group in groups {
        if group.children.is_empty() {
            debug!(group = %group.id, "dropping group without rendered members");
        } else {
            pending.insert(group.id, group);
        }
    }

    let mut out = Vec::with_capacity(lines.len() + pending.len() + markups.len());
    let mut slots: Vec<Option<Row>> = lines.into_iter().map(Some).collect();

    for i in 0..slots.len() {
        let Some(row) = slots[i].take() else {
            continue;
        };
        let Some(group) = claimed.get(&row.id()).and_then(|gid| pending.remove(gid)) else {
            out.push(row);
            continue;
        };

        let mut current = Some(row);
        for child in &group.children {
            if current.as_ref().is_some_and(|r| r.id() == *child) {
                out.extend(current.take());
            } else if let Some(member) = position.get(child).and_then(|&p| slots[p].take()) {
                out.push(member);
            }
        }
        out.extend(current);
        out.push(Row::Group(group));
    }

    out.extend(markups.into_iter().map(Row::Markup));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LineItemKind, RateUnit};
    use crate::order::OrderKey;

    fn item(id: u64, order: &str, nominal: f64) -> LineItem {
        LineItem {
            id: ModelId(id),
            order: OrderKey::parse(order).expect("valid key"),
            data: LineData {
                nominal_value: nominal,
                ..LineData::empty(LineItemKind::SubAccount)
            },
        }
    }

    fn group(id: u64, children: &[u64]) -> Group {
        Group {
            id: ModelId(id),
            name: format!("Group {id}"),
            color: None,
            children: children.iter().copied().map(ModelId).collect(),
        }
    }

    fn ids(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r.id().to_string()).collect()
    }

    #[test]
    fn sorts_by_order_key_then_id() {
        let models = [item(3, "b", 1.0), item(2, "b", 1.0), item(1, "c", 1.0), item(9, "a", 1.0)];
        let rows = build_rows(&models, &[], &[], RowOptions::default());
        assert_eq!(ids(&rows), ["9", "2", "3", "1"]);
    }

    #[test]
    fn group_row_follows_last_member() {
        let models = [item(1, "a", 1.0), item(2, "b", 1.0), item(3, "c", 1.0)];
        let rows = build_rows(&models, &[group(7, &[2, 1])], &[], RowOptions::default());
        assert_eq!(ids(&rows), ["1", "2", "group-7", "3"]);

        let Row::Group(g) = &rows[2] else {
            panic!("expected group row");
        };
        assert_eq!(g.children, vec![RowId::model(1), RowId::model(2)]);
        assert_eq!(rows[0].meta().and_then(|m| m.group), Some(ModelId(7)));
        assert_eq!(rows[3].meta().and_then(|m| m.group), None);
    }

    #[test]
    fn non_contiguous_members_are_pulled_together() {
        let models = [item(1, "a", 1.0), item(2, "b", 1.0), item(3, "c", 1.0)];
        let rows = build_rows(&models, &[group(7, &[1, 3])], &[], RowOptions::default());
        assert_eq!(ids(&rows), ["1", "3", "group-7", "2"]);
    }

    #[test]
    fn markups_come_last() {
        let markup = Markup {
            id: ModelId(4),
            identifier: Some("Contingency".into()),
            description: None,
            unit: RateUnit::Flat,
            rate: Some(100.0),
            children: vec![],
            actual: 0.0,
        };
        let models = [item(1, "a", 1.0), item(2, "b", 1.0)];
        let rows = build_rows(&models, &[group(5, &[2])], &[markup], RowOptions::default());
        assert_eq!(ids(&rows), ["1", "2", "group-5", "markup-4"]);
    }

    #[test]
    fn excluded_items_take_their_group_with_them() {
        let models = [item(1, "a", 0.0), item(2, "b", 0.0), item(3, "c", 25.0)];
        let groups = [group(7, &[1, 2]), group(8, &[3])];
        let rows = build_rows(
            &models,
            &groups,
            &[],
            RowOptions {
                exclude_zero_totals: true,
            },
        );
        assert_eq!(ids(&rows), ["3", "group-8"]);
    }

    #[test]
    fn zero_total_parent_is_kept() {
        let mut parent = item(1, "a", 0.0);
        parent.data.children.push(ModelId(50));
        let rows = build_rows(
            &[parent],
            &[],
            &[],
            RowOptions {
                exclude_zero_totals: true,
            },
        );
        assert_eq!(ids(&rows), ["1"]);
    }

    #[test]
    fn doubly_claimed_row_stays_with_lowest_group() {
        let models = [item(1, "a", 1.0), item(2, "b", 1.0)];
        let rows = build_rows(
            &models,
            &[group(9, &[1, 2]), group(3, &[1])],
            &[],
            RowOptions::default(),
        );
        assert_eq!(ids(&rows), ["1", "group-3", "2", "group-9"]);
    }

    #[test]
    fn layout_is_idempotent() {
        let models = [item(1, "a", 1.0), item(2, "b", 1.0), item(3, "c", 1.0)];
        let rows = build_rows(&models, &[group(7, &[3, 1])], &[], RowOptions::default());
        assert_eq!(layout(rows.clone()), rows);
    }

    #[test]
    fn duplicate_models_appear_once() {
        let models = [item(1, "a", 1.0), item(1, "a", 1.0)];
        let rows = build_rows(&models, &[], &[], RowOptions::default());
        assert_eq!(ids(&rows), ["1"]);
    }
}
