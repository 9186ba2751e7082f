//! Change event reducer.
//!
//! [`reduce`] is a pure transition: it never mutates its input and either
//! returns the complete next state or an error, leaving the caller's state
//! untouched. Each step applies the event, restores the canonical row layout
//! and runs the recalculation engine synchronously, so totals are always
//! consistent with the latest applied edit.
//!
//! Rows move Placeholder → Model → removed. Removed ids are tombstoned so a
//! late server echo cannot bring them back.

use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

use crate::error::ErrorCode;
use crate::event::{AddedModel, ChangeEvent, NewRow, RowChange};
use crate::fields::{FieldError, FieldName};
use crate::model::{Group, LineItem, Markup, ModelId, PlaceholderId, RateUnit, RowId, Totals};
use crate::order::{OrderKey, OrderKeyError};
use crate::recalc;
use crate::rows::{GroupRow, MarkupRow, ModelRow, PlaceholderRow, Row, RowMeta, layout};
use crate::state::TableState;

/// Errors returned for events that violate the table's contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReduceError {
    #[error("row {0} not found")]
    UnknownRow(RowId),

    #[error("row {0} is not a line row")]
    NotALine(RowId),

    #[error("group {0} not found")]
    UnknownGroup(ModelId),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    OrderKey(#[from] OrderKeyError),
}

impl ReduceError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownRow(_) | Self::NotALine(_) => ErrorCode::UnknownRow,
            Self::UnknownGroup(_) => ErrorCode::UnknownGroup,
            Self::Field(e) => e.code(),
            Self::OrderKey(e) => e.code(),
        }
    }
}

type Affected = BTreeSet<RowId>;

/// Apply one event to `state`.
///
/// # Errors
///
/// Returns [`ReduceError`] when the event edits a read-only or foreign
/// column, references an unknown row or group, or carries an invalid value.
#[instrument(level = "debug", skip_all, fields(event = event.kind()))]
pub fn reduce(state: &TableState, event: &ChangeEvent) -> Result<TableState, ReduceError> {
    let mut next = state.clone();
    next.rekeyed.clear();
    let affected = apply(&mut next, event)?;
    next.rows = layout(std::mem::take(&mut next.rows));
    recalc::recompute_in_place(&affected, &mut next);
    Ok(next)
}

fn apply(state: &mut TableState, event: &ChangeEvent) -> Result<Affected, ReduceError> {
    match event {
        ChangeEvent::DataChange { changes } => data_change(state, changes),
        ChangeEvent::RowAdd { rows } => row_add(state, rows),
        ChangeEvent::RowInsert { previous, row } => row_insert(state, *previous, row),
        ChangeEvent::RowDelete { ids } => Ok(row_delete(state, ids)),
        ChangeEvent::RowPositionChanged {
            id,
            previous,
            group,
        } => row_position_changed(state, *id, *previous, *group),
        ChangeEvent::RowRemoveFromGroup { group, ids } => {
            let members = state
                .group_mut(*group)
                .ok_or(ReduceError::UnknownGroup(*group))?;
            members.children.retain(|child| !ids.contains(child));
            Ok(Affected::new())
        }
        ChangeEvent::RowAddToGroup { group, ids } => {
            if state.group(*group).is_none() {
                return Err(ReduceError::UnknownGroup(*group));
            }
            for id in ids {
                require_line(state, *id)?;
                join_group(state, *id, Some(*group))?;
            }
            Ok(Affected::new())
        }
        ChangeEvent::GroupAdd { group } => {
            put_group(state, group, true);
            Ok(Affected::new())
        }
        ChangeEvent::GroupUpdate { group } => {
            put_group(state, group, false);
            Ok(Affected::new())
        }
        ChangeEvent::MarkupAdd { markup } => Ok(put_markup(state, markup, true)),
        ChangeEvent::MarkupUpdate { markup } => Ok(put_markup(state, markup, false)),
        ChangeEvent::ModelsAdded { models } => Ok(models_added(state, models)),
        ChangeEvent::ModelsUpdated { models } => Ok(models_updated(state, models)),
        ChangeEvent::RowsLoading { ids, loading } => {
            for id in ids {
                if let Some(meta) = state.row_mut(*id).and_then(Row::meta_mut) {
                    meta.loading = *loading;
                }
            }
            Ok(Affected::new())
        }
    }
}

// ---------------------------------------------------------------------------
// User edits
// ---------------------------------------------------------------------------

fn data_change(state: &mut TableState, changes: &[RowChange]) -> Result<Affected, ReduceError> {
    let manager = state.manager();
    let mut affected = Affected::new();
    for change in changes {
        let row = state
            .row_mut(change.id)
            .ok_or(ReduceError::UnknownRow(change.id))?;
        let data = row.line_mut().ok_or(ReduceError::NotALine(change.id))?;
        manager.apply_changes(data, &change.data)?;
        if needs_recalc(change.data.keys().copied()) {
            affected.insert(change.id);
        }
    }
    Ok(affected)
}

fn row_add(state: &mut TableState, rows: &[NewRow]) -> Result<Affected, ReduceError> {
    let mut last = sorted_lines(state, None).pop().map(|(_, key)| key);
    let mut affected = Affected::new();
    for new in rows {
        let order = last.as_ref().map_or_else(OrderKey::first, OrderKey::after);
        last = Some(order.clone());
        affected.insert(push_placeholder(state, new, new.group, order)?);
    }
    Ok(affected)
}

fn row_insert(state: &mut TableState, previous: RowId, row: &NewRow) -> Result<Affected, ReduceError> {
    let inherited = state
        .row(previous)
        .and_then(Row::meta)
        .and_then(|m| m.group);
    let order = key_after(state, Some(previous), None)?;
    let id = push_placeholder(state, row, row.group.or(inherited), order)?;
    Ok(Affected::from([id]))
}

fn push_placeholder(
    state: &mut TableState,
    new: &NewRow,
    group: Option<ModelId>,
    order: OrderKey,
) -> Result<RowId, ReduceError> {
    if let Some(group) = group {
        if state.group(group).is_none() {
            return Err(ReduceError::UnknownGroup(group));
        }
    }
    let data = state.manager().new_row_data(&new.data)?;
    let id = state.next_placeholder_id();
    state.rows.push(Row::Placeholder(PlaceholderRow {
        id,
        order,
        data,
        meta: RowMeta {
            group,
            loading: false,
        },
    }));
    let row_id = RowId::Placeholder(id);
    join_group(state, row_id, group)?;
    debug!(row = %row_id, "added placeholder row");
    Ok(row_id)
}

fn row_delete(state: &mut TableState, ids: &[RowId]) -> Affected {
    let mut affected = Affected::new();
    for id in ids {
        let Some(pos) = state.position(*id) else {
            debug!(row = %id, "delete of absent row ignored");
            continue;
        };
        let row = state.rows.remove(pos);
        state.removed.insert(*id);

        match row {
            Row::Model(ModelRow { data, .. }) | Row::Placeholder(PlaceholderRow { data, .. }) => {
                remove_subtree(state, &data.children);
                for group in state.rows.iter_mut().filter_map(group_row_mut) {
                    group.children.retain(|child| child != id);
                }
                drop_target_from_markups(state, *id);
            }
            Row::Markup(markup) => affected.extend(markup.children),
            Row::Group(_) => {}
        }
    }
    affected
}

/// Drop a deleted row from markup targets; a Percent markup left with no
/// targets is removed with it.
fn drop_target_from_markups(state: &mut TableState, id: RowId) {
    let mut emptied = Vec::new();
    for row in &mut state.rows {
        let Row::Markup(markup) = row else {
            continue;
        };
        let before = markup.children.len();
        markup.children.retain(|child| *child != id);
        if before > 0 && markup.children.is_empty() && markup.unit == RateUnit::Percent {
            emptied.push(RowId::Markup(markup.id));
        }
    }
    for markup in emptied {
        debug!(markup = %markup, "removing markup without remaining targets");
        state.rows.retain(|r| r.id() != markup);
        state.removed.insert(markup);
    }
}

fn remove_subtree(state: &mut TableState, children: &[ModelId]) {
    let mut stack: Vec<ModelId> = children.to_vec();
    while let Some(id) = stack.pop() {
        if let Some(child) = state.descendants.remove(&id) {
            stack.extend(child.data.children);
        }
    }
}

fn row_position_changed(
    state: &mut TableState,
    id: RowId,
    previous: Option<RowId>,
    group: Option<ModelId>,
) -> Result<Affected, ReduceError> {
    require_line(state, id)?;
    if let Some(group) = group {
        if state.group(group).is_none() {
            return Err(ReduceError::UnknownGroup(group));
        }
    }
    let order = key_after(state, previous, Some(id))?;
    match state.row_mut(id) {
        Some(Row::Model(row)) => row.order = order,
        Some(Row::Placeholder(row)) => row.order = order,
        _ => return Err(ReduceError::UnknownRow(id)),
    }
    join_group(state, id, group)?;
    Ok(Affected::new())
}

// ---------------------------------------------------------------------------
// Groups and markups
// ---------------------------------------------------------------------------

fn group_row_mut(row: &mut Row) -> Option<&mut GroupRow> {
    match row {
        Row::Group(g) => Some(g),
        _ => None,
    }
}

/// Move `id` out of every group and into `group`.
fn join_group(state: &mut TableState, id: RowId, group: Option<ModelId>) -> Result<(), ReduceError> {
    if let Some(group) = group {
        if state.group(group).is_none() {
            return Err(ReduceError::UnknownGroup(group));
        }
    }
    for row in state.rows.iter_mut().filter_map(group_row_mut) {
        if Some(row.id) == group {
            if !row.children.contains(&id) {
                row.children.push(id);
            }
        } else {
            row.children.retain(|child| *child != id);
        }
    }
    Ok(())
}

fn put_group(state: &mut TableState, group: &Group, create: bool) {
    let row_id = RowId::Group(group.id);
    if state.removed.contains(&row_id) {
        debug!(group = %group.id, "ignoring removed group");
        return;
    }
    if !create && state.group(group.id).is_none() {
        debug!(group = %group.id, "update for absent group ignored");
        return;
    }

    let members: Vec<RowId> = group.children.iter().copied().map(RowId::Model).collect();
    for row in state.rows.iter_mut().filter_map(group_row_mut) {
        if row.id != group.id {
            row.children.retain(|child| !members.contains(child));
        }
    }

    if let Some(existing) = state.group_mut(group.id) {
        existing.name.clone_from(&group.name);
        existing.color.clone_from(&group.color);
        existing.children = members;
    } else {
        state.rows.push(Row::Group(GroupRow {
            id: group.id,
            name: group.name.clone(),
            color: group.color.clone(),
            children: members,
            totals: Totals::default(),
        }));
    }
}

fn put_markup(state: &mut TableState, markup: &Markup, create: bool) -> Affected {
    let row_id = RowId::Markup(markup.id);
    if state.removed.contains(&row_id) {
        debug!(markup = %markup.id, "ignoring removed markup");
        return Affected::new();
    }
    let fresh = MarkupRow::from_markup(markup);
    let mut affected: Affected = fresh.children.iter().copied().collect();

    if let Some(existing) = state.markup_mut(markup.id) {
        affected.extend(existing.children.iter().copied());
        *existing = fresh;
    } else if create {
        state.rows.push(Row::Markup(fresh));
    } else {
        debug!(markup = %markup.id, "update for absent markup ignored");
        return Affected::new();
    }
    affected
}

// ---------------------------------------------------------------------------
// Server reconciliation
// ---------------------------------------------------------------------------

fn models_added(state: &mut TableState, models: &[AddedModel]) -> Affected {
    for added in models {
        let model = &added.model;
        let row_id = RowId::Model(model.id);
        if state.removed.contains(&row_id) {
            debug!(row = %row_id, "ignoring echo for removed row");
            continue;
        }
        if let Some(placeholder) = added.placeholder {
            if confirm_placeholder(state, placeholder, model) {
                continue;
            }
            if state.removed.contains(&RowId::Placeholder(placeholder)) {
                debug!(
                    placeholder = %placeholder,
                    row = %row_id,
                    "placeholder was deleted before the server confirmed it"
                );
                continue;
            }
        }
        if !replace_model(state, model) {
            state.rows.push(Row::Model(ModelRow::from_model(model)));
        }
    }
    Affected::new()
}

/// Swap a placeholder for its server-confirmed model, keeping its position
/// and group.
fn confirm_placeholder(state: &mut TableState, placeholder: PlaceholderId, model: &LineItem) -> bool {
    let from = RowId::Placeholder(placeholder);
    let to = RowId::Model(model.id);
    let Some(pos) = state.position(from) else {
        return false;
    };
    if state.contains(to) {
        state.rows.remove(pos);
        replace_model(state, model);
    } else {
        let meta = state.rows[pos].meta().cloned().unwrap_or_default();
        state.rows[pos] = Row::Model(ModelRow {
            meta: RowMeta {
                loading: false,
                ..meta
            },
            ..ModelRow::from_model(model)
        });
    }
    for row in &mut state.rows {
        let children = match row {
            Row::Group(g) => &mut g.children,
            Row::Markup(m) => &mut m.children,
            Row::Model(_) | Row::Placeholder(_) => continue,
        };
        for child in children.iter_mut().filter(|c| **c == from) {
            *child = to;
        }
    }
    debug!(placeholder = %placeholder, row = %to, "placeholder confirmed");
    true
}

fn replace_model(state: &mut TableState, model: &LineItem) -> bool {
    match state.row_mut(RowId::Model(model.id)) {
        Some(Row::Model(row)) => {
            row.order = model.order.clone();
            row.data = model.data.clone();
            true
        }
        _ => false,
    }
}

fn models_updated(state: &mut TableState, models: &[LineItem]) -> Affected {
    let mut affected = Affected::new();
    for model in models {
        let row_id = RowId::Model(model.id);
        if state.removed.contains(&row_id) {
            debug!(row = %row_id, "ignoring update for removed row");
        } else if replace_model(state, model) {
            debug!(row = %row_id, "row reconciled");
        } else if let Some(descendant) = state.descendants.get_mut(&model.id) {
            *descendant = model.clone();
            affected.insert(row_id);
        } else {
            debug!(row = %row_id, "update for absent row ignored");
        }
    }
    affected
}

// ---------------------------------------------------------------------------
// Order keys
// ---------------------------------------------------------------------------

fn require_line(state: &TableState, id: RowId) -> Result<(), ReduceError> {
    match state.row(id) {
        Some(row) if row.is_line() => Ok(()),
        Some(_) => Err(ReduceError::NotALine(id)),
        None => Err(ReduceError::UnknownRow(id)),
    }
}

/// Line rows in key order, optionally leaving one out.
fn sorted_lines(state: &TableState, exclude: Option<RowId>) -> Vec<(RowId, OrderKey)> {
    let mut lines: Vec<(RowId, OrderKey)> = state
        .rows
        .iter()
        .filter(|r| Some(r.id()) != exclude)
        .filter_map(|r| r.order().map(|key| (r.id(), key.clone())))
        .collect();
    lines.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
    lines
}

/// A key directly after `previous` (or before every row), skipping
/// `exclude`.
fn key_after(
    state: &mut TableState,
    previous: Option<RowId>,
    exclude: Option<RowId>,
) -> Result<OrderKey, ReduceError> {
    let lines = sorted_lines(state, exclude);
    let (lo, hi) = bounds(&lines, previous)?;
    if lo.is_some() && lo == hi {
        warn!("adjacent rows share an order key, rekeying line rows");
        rekey(state, &lines);
        let lines = sorted_lines(state, exclude);
        let (lo, hi) = bounds(&lines, previous)?;
        return Ok(OrderKey::between(lo.as_ref(), hi.as_ref())?);
    }
    Ok(OrderKey::between(lo.as_ref(), hi.as_ref())?)
}

fn bounds(
    lines: &[(RowId, OrderKey)],
    previous: Option<RowId>,
) -> Result<(Option<OrderKey>, Option<OrderKey>), ReduceError> {
    let Some(previous) = previous else {
        return Ok((None, lines.first().map(|(_, k)| k.clone())));
    };
    let idx = lines
        .iter()
        .position(|(id, _)| *id == previous)
        .ok_or(ReduceError::UnknownRow(previous))?;
    Ok((
        Some(lines[idx].1.clone()),
        lines.get(idx + 1).map(|(_, k)| k.clone()),
    ))
}

/// Give every line row a distinct ascending key, preserving current order.
/// Rows whose key changed are recorded in `state.rekeyed`.
fn rekey(state: &mut TableState, lines: &[(RowId, OrderKey)]) {
    for ((id, old), key) in lines.iter().zip(OrderKey::spread(lines.len())) {
        if *old == key {
            continue;
        }
        match state.row_mut(*id) {
            Some(Row::Model(row)) => row.order = key,
            Some(Row::Placeholder(row)) => row.order = key,
            _ => continue,
        }
        state.rekeyed.insert(*id);
    }
}

/// Columns whose edit needs a recalculation.
#[must_use]
pub fn needs_recalc(names: impl IntoIterator<Item = FieldName>) -> bool {
    names.into_iter().any(FieldName::participates_in_totals)
}
