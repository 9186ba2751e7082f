//! Change events.
//!
//! Every mutation of a table is one of these. User actions are produced by
//! the editing surface; control events are produced by synchronization when
//! server responses arrive. Events serialize as JSON objects tagged by
//! `type`, so an event log is a plain JSON array.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::fields::{FieldName, FieldValue, RowChangeData};
use crate::model::{Group, LineItem, Markup, ModelId, PlaceholderId, RowId};

/// Edits to one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub id: RowId,
    pub data: RowChangeData,
}

/// A row to be created locally as a placeholder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRow {
    /// Initial column values.
    #[serde(default)]
    pub data: BTreeMap<FieldName, FieldValue>,
    /// Group to join.
    #[serde(default)]
    pub group: Option<ModelId>,
}

/// A server-created entity, optionally replacing the placeholder it was
/// created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedModel {
    #[serde(default)]
    pub placeholder: Option<PlaceholderId>,
    pub model: LineItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// Cell edits to one or more line rows.
    DataChange { changes: Vec<RowChange> },
    /// Append placeholder rows after the last line row.
    RowAdd { rows: Vec<NewRow> },
    /// Insert one placeholder row directly after `previous`.
    RowInsert { previous: RowId, row: NewRow },
    RowDelete { ids: Vec<RowId> },
    /// Move a row after `previous` (or to the front) and into `group`.
    RowPositionChanged {
        id: RowId,
        #[serde(default)]
        previous: Option<RowId>,
        #[serde(default)]
        group: Option<ModelId>,
    },
    RowRemoveFromGroup { group: ModelId, ids: Vec<RowId> },
    RowAddToGroup { group: ModelId, ids: Vec<RowId> },
    GroupAdd { group: Group },
    GroupUpdate { group: Group },
    MarkupAdd { markup: Markup },
    MarkupUpdate { markup: Markup },
    /// Server-created entities.
    ModelsAdded { models: Vec<AddedModel> },
    /// Server-confirmed state of existing entities.
    ModelsUpdated { models: Vec<LineItem> },
    /// Toggle the in-flight marker on rows.
    RowsLoading { ids: Vec<RowId>, loading: bool },
}

impl ChangeEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DataChange { .. } => "data_change",
            Self::RowAdd { .. } => "row_add",
            Self::RowInsert { .. } => "row_insert",
            Self::RowDelete { .. } => "row_delete",
            Self::RowPositionChanged { .. } => "row_position_changed",
            Self::RowRemoveFromGroup { .. } => "row_remove_from_group",
            Self::RowAddToGroup { .. } => "row_add_to_group",
            Self::GroupAdd { .. } => "group_add",
            Self::GroupUpdate { .. } => "group_update",
            Self::MarkupAdd { .. } => "markup_add",
            Self::MarkupUpdate { .. } => "markup_update",
            Self::ModelsAdded { .. } => "models_added",
            Self::ModelsUpdated { .. } => "models_updated",
            Self::RowsLoading { .. } => "rows_loading",
        }
    }

    /// True for events that reconcile server state rather than record a user
    /// action.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Self::ModelsAdded { .. } | Self::ModelsUpdated { .. } | Self::RowsLoading { .. }
        )
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}
