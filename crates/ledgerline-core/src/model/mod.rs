pub mod entity;
pub mod id;
pub mod totals;

pub use entity::{
    Fringe, Group, LineData, LineItem, LineItemKind, Markup, RateUnit, Scope, ScopeKind, Tag,
};
pub use id::{ModelId, ParseRowIdError, PlaceholderId, RowId};
pub use totals::Totals;
