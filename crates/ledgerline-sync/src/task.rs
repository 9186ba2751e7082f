//! Synchronization tasks for one table.
//!
//! The surface applies a user event to its [`crate::store::Store`] first
//! (optimistic update) and then hands the same event and the resulting state
//! to [`TableSync::submit`], which sends the matching bulk request and queues
//! the server's answer as control events. Failure handling differs by
//! request:
//!
//! - update: notify, keep the local edit
//! - create: notify, remove the placeholders
//! - delete: notify, refetch the scope
//!
//! A cancelled or superseded request is dropped without a notification.
//!
//! Edits and deletes aimed at a row whose create is still in flight are held
//! and sent against the server id once the create returns.

use ledgerline_core::config::EngineConfig;
use ledgerline_core::error::ErrorCode;
use ledgerline_core::event::{AddedModel, ChangeEvent, RowChange};
use ledgerline_core::fields::manager::{
    BulkCreatePayload, BulkDeletePayload, BulkUpdatePayload, Payload, RowManager, UpdateEntry,
};
use ledgerline_core::fields::{FieldError, FieldInput, FieldName, FieldValue, RowChangeData};
use ledgerline_core::model::{LineItem, ModelId, PlaceholderId, RowId, Scope};
use ledgerline_core::rows::{Row, RowOptions};
use ledgerline_core::snapshot::Snapshot;
use ledgerline_core::state::TableState;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiError, BudgetApi, BulkResponse, Resource};
use crate::error::SyncError;
use crate::notify::{Notification, Notifier};
use crate::store::Dispatcher;
use crate::tracker::{RequestTracker, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Refresh,
    Create,
    Update,
    Delete,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Refresh => "refresh",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// What became of one submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The event needs no request.
    Skipped,
    /// Held until the create request of the rows it touches returns.
    Deferred,
    /// The server answered; its response has been queued.
    Confirmed { kind: RequestKind, rows: usize },
    /// Cancelled or superseded before a response could be used.
    Cancelled,
    /// The request failed and the user was notified.
    Failed { kind: RequestKind, code: ErrorCode },
}

const READS: [Resource; 4] = [
    Resource::Children,
    Resource::Groups,
    Resource::Markups,
    Resource::Fringes,
];

/// Placeholders between their `bulk_create` and its answer.
#[derive(Debug, Default)]
struct Creates {
    in_flight: BTreeSet<PlaceholderId>,
    /// Edits to in-flight rows, merged per row.
    edits: BTreeMap<PlaceholderId, RowChangeData>,
    /// In-flight rows the user deleted.
    deleted: BTreeSet<PlaceholderId>,
    /// Server ids of created rows, until the next refresh.
    confirmed: BTreeMap<PlaceholderId, ModelId>,
}

/// What the user did to rows while their create was in flight.
#[derive(Debug, Default)]
struct Followups {
    edits: Vec<(ModelId, RowChangeData)>,
    deletes: Vec<ModelId>,
}

impl Creates {
    fn is_pending(&self, placeholder: PlaceholderId) -> bool {
        self.in_flight.contains(&placeholder) || self.confirmed.contains_key(&placeholder)
    }

    fn hold_edit(&mut self, placeholder: PlaceholderId, data: &RowChangeData) {
        let held = self.edits.entry(placeholder).or_default();
        for (name, change) in data {
            held.entry(*name)
                .and_modify(|c| c.new = change.new.clone())
                .or_insert_with(|| change.clone());
        }
    }

    /// Close out a create request. `created` lists the server's models in
    /// request order and is `None` when the request failed.
    fn settle(&mut self, placeholders: &[PlaceholderId], created: Option<&[LineItem]>) -> Followups {
        let mut followups = Followups::default();
        for (i, placeholder) in placeholders.iter().enumerate() {
            self.in_flight.remove(placeholder);
            let edits = self.edits.remove(placeholder);
            let deleted = self.deleted.remove(placeholder);
            let Some(model) = created.and_then(|models| models.get(i)) else {
                continue;
            };
            self.confirmed.insert(*placeholder, model.id);
            if deleted {
                followups.deletes.push(model.id);
            } else if let Some(data) = edits {
                followups.edits.push((model.id, data));
            }
        }
        followups
    }
}

/// Where an edit to a placeholder goes.
enum Route {
    Row(ModelId),
    Held,
    /// Not submitted yet; the create carries the row's current data.
    Unsaved,
}

pub struct TableSync {
    api: Arc<dyn BudgetApi>,
    scope: Scope,
    dispatcher: Dispatcher,
    notifier: Notifier,
    tracker: RequestTracker,
    creates: Mutex<Creates>,
    timeout: Option<Duration>,
    options: RowOptions,
}

impl fmt::Debug for TableSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSync")
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .field("in_flight", &self.tracker.in_flight())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Submitted values of `columns` for one row. The order key is sent as
/// text so the server can place the row.
fn row_columns(
    manager: RowManager,
    row: &Row,
    columns: &[FieldName],
) -> Result<Payload, FieldError> {
    let mut payload = Payload::new();
    for column in columns {
        if *column == FieldName::Order {
            if let Some(order) = row.order() {
                payload.insert(FieldName::Order, &FieldValue::Text(order.to_string()));
            }
            continue;
        }
        let Some(field) = manager.field(*column) else {
            continue;
        };
        if let Some(value) = field.submitted(FieldInput::Row(row))? {
            payload.insert(*column, &value);
        }
    }
    Ok(payload)
}

/// Update entries carrying `columns` for the saved rows among `ids`.
fn row_entries(
    state: &TableState,
    ids: &[RowId],
    columns: &[FieldName],
) -> Result<Vec<UpdateEntry>, FieldError> {
    let manager = state.manager();
    let mut entries = Vec::with_capacity(ids.len());
    for id in model_ids(ids) {
        let Some(row) = state.row(RowId::Model(id)) else {
            debug!(row = %id, "row left the table before its update was sent");
            continue;
        };
        let fields = row_columns(manager, row, columns)?;
        if !fields.is_empty() {
            entries.push(UpdateEntry { id, fields });
        }
    }
    Ok(entries)
}

/// Rows other than `except` whose order key the last step rewrote.
fn rekeyed(state: &TableState, except: Option<RowId>) -> Vec<RowId> {
    let rows: Vec<RowId> = state
        .rekeyed
        .iter()
        .copied()
        .filter(|id| Some(*id) != except)
        .collect();
    if rows.iter().any(|id| matches!(id, RowId::Placeholder(_))) {
        debug!("unsaved rows were rekeyed; their creates carry the new keys");
    }
    rows
}

fn model_ids(ids: &[RowId]) -> Vec<ModelId> {
    ids.iter()
        .filter_map(|id| match id {
            RowId::Model(model) => Some(*model),
            RowId::Placeholder(_) | RowId::Group(_) | RowId::Markup(_) => None,
        })
        .collect()
}

impl TableSync {
    #[must_use]
    pub fn new(
        api: Arc<dyn BudgetApi>,
        scope: Scope,
        dispatcher: Dispatcher,
        notifier: Notifier,
    ) -> Self {
        Self {
            api,
            scope,
            dispatcher,
            notifier,
            tracker: RequestTracker::new(),
            creates: Mutex::default(),
            timeout: None,
            options: RowOptions::default(),
        }
    }

    /// Take the request timeout and row options from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.timeout = Some(Duration::from_millis(config.sync.request_timeout_ms));
        self.options = config.rows.options();
        self
    }

    #[must_use]
    pub const fn scope(&self) -> Scope {
        self.scope
    }

    #[must_use]
    pub const fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Abort every in-flight request, as when the table goes away.
    pub fn unmount(&self) {
        info!(scope = %self.scope, "cancelling table requests");
        self.tracker.cancel_all();
    }

    /// Refetch the scope and queue a reset to the fetched state.
    ///
    /// A newer refresh supersedes this one; the superseded result is
    /// discarded. The reset is queued while the reads are still current, so
    /// an older refresh can never land after a newer one.
    ///
    /// # Errors
    ///
    /// Fails when the fetched data is not a valid scope or the store is gone.
    #[instrument(level = "debug", skip_all, fields(scope = %self.scope))]
    pub fn refresh(&self) -> Result<Outcome, SyncError> {
        let tickets = READS.map(|resource| self.tracker.begin_read(self.scope, resource));
        let state = match self.fetch(&tickets).map(|s| s.into_state(self.options)) {
            Ok(Ok(state)) => state,
            Ok(Err(err)) => {
                self.finish_reads(&tickets);
                return Err(err.into());
            }
            Err(err) => {
                self.finish_reads(&tickets);
                return Ok(self.failed(RequestKind::Refresh, &err));
            }
        };

        let rows = state.rows.len();
        let Some(reset) = self.tracker.settle(&tickets, || self.dispatcher.reset(state)) else {
            debug!("discarding superseded refresh");
            return Ok(Outcome::Cancelled);
        };
        reset?;
        lock(&self.creates).confirmed.clear();
        info!(rows, "scope refreshed");
        Ok(Outcome::Confirmed {
            kind: RequestKind::Refresh,
            rows,
        })
    }

    fn finish_reads(&self, tickets: &[Ticket]) {
        for ticket in tickets {
            self.tracker.finish_read(ticket);
        }
    }

    fn fetch(&self, tickets: &[Ticket; 4]) -> Result<Snapshot, ApiError> {
        let [children, groups, markups, fringes] = tickets;
        Ok(Snapshot {
            scope: self.scope,
            models: self
                .api
                .list_children(self.scope, &children.options(self.timeout))?
                .data,
            descendants: Vec::new(),
            groups: self
                .api
                .list_groups(self.scope, &groups.options(self.timeout))?
                .data,
            markups: self
                .api
                .list_markups(self.scope, &markups.options(self.timeout))?
                .data,
            fringes: self
                .api
                .list_fringes(self.scope, &fringes.options(self.timeout))?
                .data,
        })
    }

    /// Send the request that persists `event`, given the state after the
    /// event was applied locally.
    ///
    /// # Errors
    ///
    /// Fails when a payload cannot be built from the state or the store is
    /// gone. Request failures are reported through notifications instead.
    #[instrument(level = "debug", skip_all, fields(scope = %self.scope, event = event.kind()))]
    pub fn submit(&self, event: &ChangeEvent, state: &TableState) -> Result<Outcome, SyncError> {
        match event {
            ChangeEvent::DataChange { changes } => self.update_cells(changes, state),
            ChangeEvent::RowAdd { .. } => self.create_rows(state),
            ChangeEvent::RowInsert { .. } => {
                let moved = row_entries(state, &rekeyed(state, None), &[FieldName::Order])?;
                let reorder = self.send_update(moved)?;
                debug!(?reorder, "sent rekeyed order keys");
                self.create_rows(state)
            }
            ChangeEvent::RowDelete { ids } => self.delete_rows(ids, state),
            ChangeEvent::RowAddToGroup { ids, .. } | ChangeEvent::RowRemoveFromGroup { ids, .. } => {
                self.send_update(row_entries(state, ids, &[FieldName::Group])?)
            }
            ChangeEvent::RowPositionChanged { id, .. } => {
                let mut entries = row_entries(state, &[*id], &[FieldName::Order, FieldName::Group])?;
                entries.extend(row_entries(
                    state,
                    &rekeyed(state, Some(*id)),
                    &[FieldName::Order],
                )?);
                self.send_update(entries)
            }
            ChangeEvent::GroupAdd { .. }
            | ChangeEvent::GroupUpdate { .. }
            | ChangeEvent::MarkupAdd { .. }
            | ChangeEvent::MarkupUpdate { .. }
            | ChangeEvent::ModelsAdded { .. }
            | ChangeEvent::ModelsUpdated { .. }
            | ChangeEvent::RowsLoading { .. } => Ok(Outcome::Skipped),
        }
    }

    fn update_cells(&self, changes: &[RowChange], state: &TableState) -> Result<Outcome, SyncError> {
        let manager = state.manager();
        let mut entries = Vec::with_capacity(changes.len());
        let mut held = false;
        for change in changes {
            let id = match change.id {
                RowId::Model(id) => id,
                RowId::Placeholder(placeholder) => {
                    match self.route_edit(manager, placeholder, &change.data)? {
                        Route::Row(id) => id,
                        Route::Held => {
                            held = true;
                            continue;
                        }
                        Route::Unsaved => continue,
                    }
                }
                RowId::Group(_) | RowId::Markup(_) => continue,
            };
            let fields = manager.update_payload(&change.data)?;
            if !fields.is_empty() {
                entries.push(UpdateEntry { id, fields });
            }
        }
        if entries.is_empty() && held {
            return Ok(Outcome::Deferred);
        }
        self.send_update(entries)
    }

    fn route_edit(
        &self,
        manager: RowManager,
        placeholder: PlaceholderId,
        data: &RowChangeData,
    ) -> Result<Route, FieldError> {
        let mut creates = lock(&self.creates);
        if let Some(&id) = creates.confirmed.get(&placeholder) {
            debug!(%placeholder, row = %id, "sending edit to the created row");
            return Ok(Route::Row(id));
        }
        if creates.in_flight.contains(&placeholder) {
            manager.update_payload(data)?;
            creates.hold_edit(placeholder, data);
            debug!(%placeholder, "holding edit until the row is created");
            return Ok(Route::Held);
        }
        debug!(%placeholder, "edit to an unsaved row is sent with its create");
        Ok(Route::Unsaved)
    }

    fn send_update(&self, entries: Vec<UpdateEntry>) -> Result<Outcome, SyncError> {
        if entries.is_empty() {
            return Ok(Outcome::Skipped);
        }
        let ids: Vec<RowId> = entries.iter().map(|e| RowId::Model(e.id)).collect();
        self.dispatcher.emit(ChangeEvent::RowsLoading {
            ids: ids.clone(),
            loading: true,
        })?;

        let result = {
            let guard = self.tracker.begin_mutation();
            self.api.bulk_update(
                self.scope,
                &BulkUpdatePayload { data: entries },
                &guard.options(self.timeout),
            )
        };

        let outcome = match result {
            Ok(response) => {
                self.log_parent(&response);
                let rows = response.children.len();
                self.dispatcher.emit(ChangeEvent::ModelsUpdated {
                    models: response.children,
                })?;
                Outcome::Confirmed {
                    kind: RequestKind::Update,
                    rows,
                }
            }
            // Local edits stay in place until the next refresh.
            Err(err) => self.failed(RequestKind::Update, &err),
        };
        self.dispatcher.emit(ChangeEvent::RowsLoading { ids, loading: false })?;
        Ok(outcome)
    }

    fn create_rows(&self, state: &TableState) -> Result<Outcome, SyncError> {
        let manager = state.manager();
        let mut batch: Vec<(PlaceholderId, Payload)> = Vec::new();
        {
            let mut creates = lock(&self.creates);
            for row in &state.rows {
                let Row::Placeholder(placeholder) = row else {
                    continue;
                };
                if creates.is_pending(placeholder.id) {
                    continue;
                }
                let mut payload = manager.create_payload(row)?;
                payload.insert(
                    FieldName::Order,
                    &FieldValue::Text(placeholder.order.to_string()),
                );
                batch.push((placeholder.id, payload));
            }
            creates.in_flight.extend(batch.iter().map(|(id, _)| *id));
        }
        if batch.is_empty() {
            return Ok(Outcome::Skipped);
        }

        let (placeholders, data): (Vec<PlaceholderId>, Vec<Payload>) = batch.into_iter().unzip();
        let rows: Vec<RowId> = placeholders.iter().copied().map(RowId::Placeholder).collect();
        self.dispatcher.emit(ChangeEvent::RowsLoading {
            ids: rows.clone(),
            loading: true,
        })?;

        let result = {
            let guard = self.tracker.begin_mutation();
            self.api.bulk_create(
                self.scope,
                &BulkCreatePayload { data },
                &guard.options(self.timeout),
            )
        };
        let followups = lock(&self.creates).settle(
            &placeholders,
            result.as_ref().ok().map(|response| response.children.as_slice()),
        );

        match result {
            Ok(response) => {
                self.log_parent(&response);
                if response.children.len() != placeholders.len() {
                    warn!(
                        sent = placeholders.len(),
                        received = response.children.len(),
                        "create response does not match request"
                    );
                }
                let confirmed = response.children.len().min(placeholders.len());
                let models: Vec<AddedModel> = placeholders
                    .iter()
                    .zip(response.children)
                    .map(|(placeholder, model)| AddedModel {
                        placeholder: Some(*placeholder),
                        model,
                    })
                    .collect();
                self.dispatcher.emit(ChangeEvent::ModelsAdded { models })?;
                if confirmed < rows.len() {
                    self.dispatcher.emit(ChangeEvent::RowDelete {
                        ids: rows[confirmed..].to_vec(),
                    })?;
                }
                self.follow_up(manager, followups)?;
                Ok(Outcome::Confirmed {
                    kind: RequestKind::Create,
                    rows: confirmed,
                })
            }
            Err(err) => {
                let outcome = self.failed(RequestKind::Create, &err);
                self.dispatcher.emit(ChangeEvent::RowDelete { ids: rows })?;
                Ok(outcome)
            }
        }
    }

    /// Send the edits and deletes held while a create was in flight.
    fn follow_up(&self, manager: RowManager, followups: Followups) -> Result<(), SyncError> {
        let mut entries = Vec::with_capacity(followups.edits.len());
        for (id, data) in &followups.edits {
            let fields = manager.update_payload(data)?;
            if !fields.is_empty() {
                entries.push(UpdateEntry { id: *id, fields });
            }
        }
        if !entries.is_empty() {
            let outcome = self.send_update(entries)?;
            debug!(?outcome, "sent edits made during create");
        }
        if !followups.deletes.is_empty() {
            let outcome = self.delete_models(followups.deletes)?;
            debug!(?outcome, "deleted rows removed during create");
        }
        Ok(())
    }

    fn delete_rows(&self, ids: &[RowId], state: &TableState) -> Result<Outcome, SyncError> {
        let mut models = Vec::new();
        let mut held = false;
        {
            let mut creates = lock(&self.creates);
            for id in ids {
                match *id {
                    RowId::Model(model) => models.push(model),
                    RowId::Placeholder(placeholder) => {
                        if let Some(&model) = creates.confirmed.get(&placeholder) {
                            // The delete only reached the created row if it
                            // removed the placeholder locally.
                            if state.removed.contains(id) {
                                models.push(model);
                            }
                        } else if creates.in_flight.contains(&placeholder) {
                            debug!(%placeholder, "holding delete until the row is created");
                            creates.deleted.insert(placeholder);
                            held = true;
                        }
                    }
                    RowId::Group(_) | RowId::Markup(_) => {}
                }
            }
        }
        if models.is_empty() {
            return Ok(if held { Outcome::Deferred } else { Outcome::Skipped });
        }
        self.delete_models(models)
    }

    fn delete_models(&self, models: Vec<ModelId>) -> Result<Outcome, SyncError> {
        let rows = models.len();
        let result = {
            let guard = self.tracker.begin_mutation();
            self.api.bulk_delete(
                self.scope,
                &BulkDeletePayload { ids: models },
                &guard.options(self.timeout),
            )
        };

        match result {
            Ok(response) => {
                self.log_parent(&response);
                Ok(Outcome::Confirmed {
                    kind: RequestKind::Delete,
                    rows,
                })
            }
            Err(err) => {
                let outcome = self.failed(RequestKind::Delete, &err);
                if matches!(outcome, Outcome::Failed { .. }) {
                    let refetch = self.refresh()?;
                    debug!(?refetch, "refetched after failed delete");
                }
                Ok(outcome)
            }
        }
    }

    fn failed(&self, kind: RequestKind, err: &ApiError) -> Outcome {
        if err.is_cancelled() {
            debug!(%kind, "request cancelled");
            return Outcome::Cancelled;
        }
        self.notifier.notify(Notification::error(
            err.code(),
            format!("{kind} for {} failed: {err}", self.scope),
        ));
        Outcome::Failed {
            kind,
            code: err.code(),
        }
    }

    fn log_parent(&self, response: &BulkResponse) {
        debug!(
            scope = %self.scope,
            parent = %response.parent.id,
            estimated = response.parent.totals.estimated(),
            "server totals"
        );
    }
}
