//! In-process budget API.
//!
//! Stores scopes in memory and applies bulk payloads the way the server
//! does: submitted columns are patched onto the entity, leaf nominal values
//! and fringe contributions are re-derived, and the write-only `group` column
//! moves the entity between groups. Used by tests and by `ldg` for offline
//! runs. Failures can be injected with [`MemoryApi::fail_next`].

use ledgerline_core::fields::FieldName;
use ledgerline_core::fields::manager::{
    BulkCreatePayload, BulkDeletePayload, BulkUpdatePayload, Payload,
};
use ledgerline_core::model::{
    Fringe, Group, LineData, LineItem, Markup, ModelId, Scope, Tag, Totals,
};
use ledgerline_core::order::OrderKey;
use ledgerline_core::snapshot::Snapshot;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::api::{
    ApiError, BudgetApi, BulkParent, BulkResponse, ListResponse, RequestOptions, Resource,
};

#[derive(Debug, Clone, Default)]
struct ScopeData {
    items: Vec<LineItem>,
    groups: Vec<Group>,
    markups: Vec<Markup>,
    fringes: Vec<Fringe>,
}

#[derive(Debug, Default)]
struct Server {
    scopes: HashMap<Scope, ScopeData>,
    units: BTreeMap<ModelId, Tag>,
    next_id: u64,
    failures: VecDeque<ApiError>,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryApi {
    server: Mutex<Server>,
}

fn bad_request(detail: impl ToString) -> ApiError {
    ApiError::Status {
        status: 400,
        body: detail.to_string(),
    }
}

fn not_found(id: ModelId) -> ApiError {
    ApiError::Status {
        status: 404,
        body: format!("no line item {id}"),
    }
}

impl MemoryApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the scope described by `snapshot`.
    #[must_use]
    pub fn with_snapshot(self, snapshot: &Snapshot) -> Self {
        {
            let mut server = self.lock();
            let highest = snapshot
                .models
                .iter()
                .chain(&snapshot.descendants)
                .map(|m| m.id.0)
                .chain(snapshot.groups.iter().map(|g| g.id.0))
                .chain(snapshot.markups.iter().map(|m| m.id.0))
                .chain(snapshot.fringes.iter().map(|f| f.id.0))
                .chain([snapshot.scope.id.0])
                .max()
                .unwrap_or(0);
            server.next_id = server.next_id.max(highest + 1);
            server.scopes.insert(
                snapshot.scope,
                ScopeData {
                    items: snapshot.models.clone(),
                    groups: snapshot.groups.clone(),
                    markups: snapshot.markups.clone(),
                    fringes: snapshot.fringes.clone(),
                },
            );
        }
        self
    }

    #[must_use]
    pub fn with_units(self, units: impl IntoIterator<Item = Tag>) -> Self {
        self.lock().units.extend(units.into_iter().map(|t| (t.id, t)));
        self
    }

    /// Make the next request fail with `error`. Queued failures are used in
    /// order.
    pub fn fail_next(&self, error: ApiError) {
        self.lock().failures.push_back(error);
    }

    /// Requests served so far, as `VERB scope/resource`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn children(&self, scope: Scope) -> Vec<LineItem> {
        self.lock()
            .scopes
            .get(&scope)
            .map(|d| sorted(&d.items))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn groups(&self, scope: Scope) -> Vec<Group> {
        self.lock()
            .scopes
            .get(&scope)
            .map(|d| d.groups.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Server> {
        self.server.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, honour cancellation and injected failures, then run
    /// `op` against the scope's data.
    fn serve<T>(
        &self,
        verb: &str,
        scope: Scope,
        resource: &str,
        options: &RequestOptions,
        op: impl FnOnce(&mut Server) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        options.check()?;
        let mut server = self.lock();
        server.calls.push(format!("{verb} {scope}/{resource}"));
        if let Some(error) = server.failures.pop_front() {
            debug!(%scope, resource, "injected failure: {error}");
            return Err(error);
        }
        let out = op(&mut server)?;
        drop(server);
        options.check()?;
        Ok(out)
    }

    fn list<T: Clone>(
        &self,
        scope: Scope,
        resource: Resource,
        options: &RequestOptions,
        pick: impl FnOnce(&ScopeData) -> Vec<T>,
    ) -> Result<ListResponse<T>, ApiError> {
        self.serve("GET", scope, resource.path(), options, |server| {
            Ok(ListResponse::new(
                server.scopes.get(&scope).map(pick).unwrap_or_default(),
            ))
        })
    }
}

fn sorted(items: &[LineItem]) -> Vec<LineItem> {
    let mut out = items.to_vec();
    out.sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
    out
}

fn parent(scope: Scope, data: &ScopeData) -> BulkParent {
    BulkParent {
        id: scope.id,
        totals: data.items.iter().map(|i| Totals::of_line(&i.data)).sum(),
    }
}

/// Server-side derivation for a saved leaf.
fn settle(item: &mut LineItem, fringes: &[Fringe]) {
    let Some(nominal) = item.data.derived_nominal() else {
        return;
    };
    item.data.nominal_value = nominal;
    item.data.accumulated_fringe_contribution = item
        .data
        .fringes
        .iter()
        .filter_map(|id| fringes.iter().find(|f| f.id == *id))
        .map(|f| f.contribution(nominal))
        .sum();
}

fn assign_group(data: &mut ScopeData, id: ModelId, value: Option<&Value>) -> Result<(), ApiError> {
    let target = match value {
        None => return Ok(()),
        Some(Value::Null) => None,
        Some(raw) => Some(
            raw.as_u64()
                .map(ModelId)
                .ok_or_else(|| bad_request(format!("invalid group {raw}")))?,
        ),
    };
    if let Some(group) = target.filter(|t| !data.groups.iter().any(|g| g.id == *t)) {
        return Err(bad_request(format!("no group {group}")));
    }
    for group in &mut data.groups {
        group.children.retain(|c| *c != id);
        if Some(group.id) == target {
            group.children.push(id);
        }
    }
    data.groups.retain(|g| !g.children.is_empty());
    Ok(())
}

fn apply_payload(
    data: &mut ScopeData,
    units: &BTreeMap<ModelId, Tag>,
    base: &LineItem,
    payload: &Payload,
) -> Result<LineItem, ApiError> {
    let mut item = base
        .patched(payload, |id| units.get(&id).cloned())
        .map_err(bad_request)?;
    settle(&mut item, &data.fringes);
    assign_group(data, item.id, payload.get(FieldName::Group))?;
    Ok(item)
}

impl BudgetApi for MemoryApi {
    fn list_children(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<LineItem>, ApiError> {
        self.list(scope, Resource::Children, options, |d| sorted(&d.items))
    }

    fn list_groups(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Group>, ApiError> {
        self.list(scope, Resource::Groups, options, |d| d.groups.clone())
    }

    fn list_markups(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Markup>, ApiError> {
        self.list(scope, Resource::Markups, options, |d| d.markups.clone())
    }

    fn list_fringes(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Fringe>, ApiError> {
        self.list(scope, Resource::Fringes, options, |d| d.fringes.clone())
    }

    fn bulk_create(
        &self,
        scope: Scope,
        payload: &BulkCreatePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError> {
        self.serve("PATCH", scope, "bulk-create-children", options, |server| {
            let Server {
                scopes,
                units,
                next_id,
                ..
            } = server;
            let current = scopes.entry(scope).or_default();
            let mut next = current.clone();
            let mut created = Vec::with_capacity(payload.data.len());

            for body in &payload.data {
                let id = ModelId(*next_id);
                *next_id += 1;
                let order = next
                    .items
                    .iter()
                    .map(|i| &i.order)
                    .max()
                    .map_or_else(OrderKey::first, OrderKey::after);
                let blank = LineItem {
                    id,
                    order,
                    data: LineData::empty(scope.child_kind()),
                };
                let item = apply_payload(&mut next, units, &blank, body)?;
                next.items.push(item.clone());
                created.push(item);
            }

            *current = next;
            Ok(BulkResponse {
                parent: parent(scope, current),
                children: created,
            })
        })
    }

    fn bulk_update(
        &self,
        scope: Scope,
        payload: &BulkUpdatePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError> {
        self.serve("PATCH", scope, "bulk-update-children", options, |server| {
            let Server { scopes, units, .. } = server;
            let current = scopes.entry(scope).or_default();
            let mut next = current.clone();
            let mut updated = Vec::with_capacity(payload.data.len());

            for entry in &payload.data {
                let pos = next
                    .items
                    .iter()
                    .position(|i| i.id == entry.id)
                    .ok_or_else(|| not_found(entry.id))?;
                let base = next.items[pos].clone();
                let item = apply_payload(&mut next, units, &base, &entry.fields)?;
                next.items[pos] = item.clone();
                updated.push(item);
            }

            *current = next;
            Ok(BulkResponse {
                parent: parent(scope, current),
                children: updated,
            })
        })
    }

    fn bulk_delete(
        &self,
        scope: Scope,
        payload: &BulkDeletePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError> {
        self.serve("PATCH", scope, "bulk-delete-children", options, |server| {
            let data = server.scopes.entry(scope).or_default();
            if let Some(missing) = payload
                .ids
                .iter()
                .find(|id| !data.items.iter().any(|i| i.id == **id))
            {
                return Err(not_found(*missing));
            }
            data.items.retain(|i| !payload.ids.contains(&i.id));
            for group in &mut data.groups {
                group.children.retain(|c| !payload.ids.contains(c));
            }
            data.groups.retain(|g| !g.children.is_empty());
            for markup in &mut data.markups {
                markup.children.retain(|c| !payload.ids.contains(c));
            }
            Ok(BulkResponse {
                parent: parent(scope, data),
                children: Vec::new(),
            })
        })
    }
}
