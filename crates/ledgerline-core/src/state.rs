//! Table state: the row sequence of one scope plus the entity arena it draws
//! on.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::fields::RowManager;
use crate::model::{Fringe, LineData, LineItem, ModelId, PlaceholderId, RowId, Scope, Totals};
use crate::recalc;
use crate::rows::{GroupRow, MarkupRow, Row, RowOptions, layout};

/// Everything the reducer transforms.
///
/// `rows` is the display sequence. `descendants` holds loaded entities below
/// the scope's direct children, so parents can be re-summed. `removed` lists
/// ids that were deleted locally; server echoes for them are ignored.
/// `rekeyed` lists the rows whose order key the latest step rewrote to make
/// room for an insert or move; the server only learns of those keys if they
/// are sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    pub scope: Scope,
    pub rows: Vec<Row>,
    #[serde(default)]
    pub descendants: BTreeMap<ModelId, LineItem>,
    #[serde(default)]
    pub fringes: BTreeMap<ModelId, Fringe>,
    #[serde(default)]
    pub totals: Totals,
    #[serde(default)]
    pub removed: BTreeSet<RowId>,
    #[serde(default)]
    pub next_placeholder: u64,
    #[serde(default)]
    pub options: RowOptions,
    #[serde(skip)]
    pub rekeyed: BTreeSet<RowId>,
}

impl TableState {
    /// An empty table for `scope`.
    #[must_use]
    pub fn empty(scope: Scope, options: RowOptions) -> Self {
        Self {
            scope,
            rows: Vec::new(),
            descendants: BTreeMap::new(),
            fringes: BTreeMap::new(),
            totals: Totals::default(),
            removed: BTreeSet::new(),
            next_placeholder: 1,
            options,
            rekeyed: BTreeSet::new(),
        }
    }

    /// Lay out `rows` and compute group, markup and scope totals.
    ///
    /// Line values are taken as given; nothing is re-derived.
    #[must_use]
    pub fn new(
        scope: Scope,
        rows: Vec<Row>,
        descendants: impl IntoIterator<Item = LineItem>,
        fringes: impl IntoIterator<Item = Fringe>,
        options: RowOptions,
    ) -> Self {
        let mut state = Self {
            rows: layout(rows),
            descendants: descendants.into_iter().map(|d| (d.id, d)).collect(),
            fringes: fringes.into_iter().map(|f| (f.id, f)).collect(),
            ..Self::empty(scope, options)
        };
        recalc::recompute_in_place(&BTreeSet::new(), &mut state);
        state
    }

    /// Field table for the line items of this scope.
    #[must_use]
    pub const fn manager(&self) -> RowManager {
        RowManager::for_kind(self.scope.child_kind())
    }

    #[must_use]
    pub fn position(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id() == id)
    }

    #[must_use]
    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id() == id)
    }

    pub fn row_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| r.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: RowId) -> bool {
        self.row(id).is_some()
    }

    /// Line data of a row or loaded descendant.
    #[must_use]
    pub fn line(&self, id: RowId) -> Option<&LineData> {
        if let Some(data) = self.row(id).and_then(Row::line) {
            return Some(data);
        }
        match id {
            RowId::Model(model) => self.descendants.get(&model).map(|d| &d.data),
            _ => None,
        }
    }

    pub fn line_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.is_line())
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupRow> {
        self.rows.iter().filter_map(|r| match r {
            Row::Group(g) => Some(g),
            _ => None,
        })
    }

    pub fn markups(&self) -> impl Iterator<Item = &MarkupRow> {
        self.rows.iter().filter_map(|r| match r {
            Row::Markup(m) => Some(m),
            _ => None,
        })
    }

    #[must_use]
    pub fn group(&self, id: ModelId) -> Option<&GroupRow> {
        self.groups().find(|g| g.id == id)
    }

    pub fn group_mut(&mut self, id: ModelId) -> Option<&mut GroupRow> {
        self.rows.iter_mut().find_map(|r| match r {
            Row::Group(g) if g.id == id => Some(g),
            _ => None,
        })
    }

    pub fn markup_mut(&mut self, id: ModelId) -> Option<&mut MarkupRow> {
        self.rows.iter_mut().find_map(|r| match r {
            Row::Markup(m) if m.id == id => Some(m),
            _ => None,
        })
    }

    /// Allocate the next placeholder id.
    pub const fn next_placeholder_id(&mut self) -> PlaceholderId {
        let id = PlaceholderId(self.next_placeholder);
        self.next_placeholder += 1;
        id
    }

    #[must_use]
    pub fn placeholders(&self) -> Vec<PlaceholderId> {
        self.rows
            .iter()
            .filter_map(|r| match r {
                Row::Placeholder(p) => Some(p.id),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LineItemKind, ScopeKind};
    use crate::order::OrderKey;
    use crate::rows::ModelRow;

    fn row(id: u64, nominal: f64) -> Row {
        Row::Model(ModelRow::from_model(&LineItem {
            id: ModelId(id),
            order: OrderKey::first(),
            data: LineData {
                nominal_value: nominal,
                ..LineData::empty(LineItemKind::Account)
            },
        }))
    }

    #[test]
    fn new_computes_scope_totals() {
        let state = TableState::new(
            Scope::new(ScopeKind::Budget, 1),
            vec![row(1, 10.0), row(2, 5.0)],
            [],
            [],
            RowOptions::default(),
        );
        assert!((state.totals.nominal_value - 15.0).abs() < 1e-9);
        assert_eq!(state.manager().kind(), LineItemKind::Account);
    }

    #[test]
    fn placeholder_ids_increase() {
        let mut state = TableState::empty(Scope::new(ScopeKind::Account, 4), RowOptions::default());
        assert_eq!(state.next_placeholder_id(), PlaceholderId(1));
        assert_eq!(state.next_placeholder_id(), PlaceholderId(2));
    }

    #[test]
    fn line_falls_back_to_descendants() {
        let child = LineItem {
            id: ModelId(30),
            order: OrderKey::first(),
            data: LineData::empty(LineItemKind::SubAccount),
        };
        let state = TableState::new(
            Scope::new(ScopeKind::Budget, 1),
            vec![row(1, 0.0)],
            [child],
            [],
            RowOptions::default(),
        );
        assert!(state.line(RowId::model(30)).is_some());
        assert!(state.line(RowId::model(31)).is_none());
    }
}
