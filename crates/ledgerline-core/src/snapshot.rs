//! Serialized scope state.
//!
//! A snapshot is the JSON document a scope fetch produces: the scope's direct
//! line items, any loaded descendants, and the groups, markups and fringes of
//! the scope. [`Snapshot::into_state`] validates it and builds the initial
//! [`TableState`].

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ErrorCode;
use crate::model::{Fringe, Group, LineItem, LineItemKind, Markup, ModelId, Scope};
use crate::rows::{RowOptions, build_rows};
use crate::state::TableState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scope: Scope,
    #[serde(default)]
    pub models: Vec<LineItem>,
    #[serde(default)]
    pub descendants: Vec<LineItem>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub markups: Vec<Markup>,
    #[serde(default)]
    pub fringes: Vec<Fringe>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line item {0} appears more than once")]
    DuplicateId(ModelId),

    #[error("line item {id} is a {found}, expected {expected}")]
    KindMismatch {
        id: ModelId,
        expected: LineItemKind,
        found: LineItemKind,
    },

    #[error("line items form a cycle: {}", format_cycle(.0))]
    Cycle(Vec<ModelId>),
}

fn format_cycle(ids: &[ModelId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl SnapshotError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Json(_) | Self::DuplicateId(_) | Self::KindMismatch { .. } => {
                ErrorCode::SnapshotInvalid
            }
            Self::Cycle(_) => ErrorCode::HierarchyCycle,
        }
    }
}

impl Snapshot {
    /// Parse a snapshot document.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] when the document is malformed.
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Check ids, kinds and the parent/child hierarchy.
    ///
    /// Children that are not part of the snapshot are allowed; they are simply
    /// not loaded.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let expected = self.scope.child_kind();
        for model in &self.models {
            if model.data.kind != expected {
                return Err(SnapshotError::KindMismatch {
                    id: model.id,
                    expected,
                    found: model.data.kind,
                });
            }
        }
        for descendant in &self.descendants {
            if descendant.data.kind != LineItemKind::SubAccount {
                return Err(SnapshotError::KindMismatch {
                    id: descendant.id,
                    expected: LineItemKind::SubAccount,
                    found: descendant.data.kind,
                });
            }
        }

        let mut graph = DiGraph::<ModelId, ()>::new();
        let mut nodes: BTreeMap<ModelId, NodeIndex> = BTreeMap::new();
        for item in self.models.iter().chain(&self.descendants) {
            if nodes.insert(item.id, graph.add_node(item.id)).is_some() {
                return Err(SnapshotError::DuplicateId(item.id));
            }
        }
        for item in self.models.iter().chain(&self.descendants) {
            let from = nodes[&item.id];
            for child in &item.data.children {
                if let Some(&to) = nodes.get(child) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let cycle = tarjan_scc(&graph).into_iter().find(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|n| graph.find_edge(*n, *n).is_some())
        });
        if let Some(component) = cycle {
            let mut ids: Vec<ModelId> = component.into_iter().map(|n| graph[n]).collect();
            ids.sort_unstable();
            return Err(SnapshotError::Cycle(ids));
        }
        Ok(())
    }

    /// Validate and build the table state.
    ///
    /// # Errors
    ///
    /// Same as [`Snapshot::validate`].
    pub fn into_state(self, options: RowOptions) -> Result<TableState, SnapshotError> {
        self.validate()?;
        let rows = build_rows(&self.models, &self.groups, &self.markups, options);
        tracing::info!(
            scope = %self.scope,
            rows = rows.len(),
            descendants = self.descendants.len(),
            "snapshot loaded"
        );
        Ok(TableState::new(
            self.scope,
            rows,
            self.descendants,
            self.fringes,
            options,
        ))
    }
}
