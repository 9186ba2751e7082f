#![allow(dead_code)]

use ledgerline_core::event::{AddedModel, ChangeEvent, NewRow, RowChange};
use ledgerline_core::fields::{CellChange, FieldName, FieldValue, RowChangeData};
use ledgerline_core::model::{
    Group, LineData, LineItem, LineItemKind, Markup, ModelId, PlaceholderId, RateUnit, RowId,
    Scope, ScopeKind, Tag,
};
use ledgerline_core::order::OrderKey;
use ledgerline_core::rows::{RowOptions, build_rows};
use ledgerline_core::state::TableState;
use proptest::prelude::*;

pub const KEYS: &[&str] = &["1", "2", "3", "V", "a", "aV", "b", "z"];
pub const GROUP_IDS: &[u64] = &[100, 101, 102];
/// Groups built by [`arb_table`] plus one that only events create.
pub const EVENT_GROUP_IDS: &[u64] = &[100, 101, 102, 103];
/// Markups built by [`arb_table`] plus one that only events create.
pub const MARKUP_IDS: &[u64] = &[500, 501, 502];

pub fn arb_order_key() -> impl Strategy<Value = OrderKey> + Clone {
    prop::sample::select(KEYS).prop_map(|k| OrderKey::parse(k).expect("fixture keys are valid"))
}

/// Any valid key: base-62 digits, not ending in '0'.
pub fn arb_any_order_key() -> impl Strategy<Value = OrderKey> + Clone {
    "[0-9A-Za-z]{0,5}[1-9A-Za-z]".prop_map(|k| OrderKey::parse(&k).expect("generated key is valid"))
}

pub fn arb_amount() -> impl Strategy<Value = Option<f64>> + Clone {
    prop_oneof![
        1 => Just(None),
        4 => (0u32..500).prop_map(|n| Some(f64::from(n))),
        2 => (0u32..10_000).prop_map(|n| Some(f64::from(n) / 100.0)),
    ]
}

pub fn arb_unit() -> impl Strategy<Value = Option<Tag>> + Clone {
    prop::option::of((1u64..4).prop_map(unit_tag))
}

pub fn unit_tag(id: u64) -> Tag {
    Tag {
        id: ModelId(id),
        title: format!("unit-{id}"),
        color: None,
    }
}

pub fn arb_sub_account(id: u64) -> impl Strategy<Value = LineItem> {
    (
        arb_order_key(),
        arb_amount(),
        arb_amount(),
        arb_amount(),
        arb_unit(),
        prop::option::of("[A-Z0-9]{2,6}"),
        prop::option::of("[a-z ]{0,12}"),
        prop::collection::vec(1u64..5, 0..3),
    )
        .prop_map(
            move |(order, quantity, rate, multiplier, unit, identifier, description, fringes)| {
                let mut data = LineData {
                    identifier,
                    description,
                    quantity,
                    rate,
                    multiplier,
                    unit,
                    fringes: fringes.into_iter().map(ModelId).collect(),
                    ..LineData::empty(LineItemKind::SubAccount)
                };
                data.nominal_value = data.derived_nominal().unwrap_or(0.0);
                LineItem {
                    id: ModelId(id),
                    order,
                    data,
                }
            },
        )
}

pub fn arb_items() -> impl Strategy<Value = Vec<LineItem>> {
    (1usize..10).prop_flat_map(|n| {
        (1..=n as u64)
            .map(arb_sub_account)
            .collect::<Vec<_>>()
    })
}

/// Line items, groups over them, and one Percent plus one Flat markup.
pub fn arb_table() -> impl Strategy<Value = TableState> {
    arb_items().prop_flat_map(|items| {
        let n = items.len();
        (
            Just(items),
            prop::collection::vec(prop::option::of(prop::sample::select(GROUP_IDS)), n),
            prop::collection::vec(any::<bool>(), n),
            (0u32..100).prop_map(|r| f64::from(r) / 100.0),
            0u32..1_000,
        )
            .prop_map(|(items, membership, targets, percent_rate, flat_rate)| {
                let groups: Vec<Group> = GROUP_IDS
                    .iter()
                    .map(|gid| Group {
                        id: ModelId(*gid),
                        name: format!("group-{gid}"),
                        color: None,
                        children: items
                            .iter()
                            .zip(&membership)
                            .filter(|(_, g)| **g == Some(*gid))
                            .map(|(item, _)| item.id)
                            .collect(),
                    })
                    .collect();
                let markups = [
                    Markup {
                        id: ModelId(500),
                        identifier: Some("Overhead".into()),
                        description: None,
                        unit: RateUnit::Percent,
                        rate: Some(percent_rate),
                        children: items
                            .iter()
                            .zip(&targets)
                            .filter(|(_, t)| **t)
                            .map(|(item, _)| item.id)
                            .collect(),
                        actual: 0.0,
                    },
                    Markup {
                        id: ModelId(501),
                        identifier: Some("Contingency".into()),
                        description: None,
                        unit: RateUnit::Flat,
                        rate: Some(f64::from(flat_rate)),
                        children: vec![],
                        actual: 0.0,
                    },
                ];
                TableState::new(
                    Scope::new(ScopeKind::Account, 1),
                    build_rows(&items, &groups, &markups, RowOptions::default()),
                    [],
                    [],
                    RowOptions::default(),
                )
            })
    })
}

pub fn arb_row_id() -> impl Strategy<Value = RowId> + Clone {
    prop_oneof![
        6 => (1u64..12).prop_map(RowId::model),
        2 => (1u64..4).prop_map(|p| RowId::Placeholder(PlaceholderId(p))),
        1 => prop::sample::select(GROUP_IDS).prop_map(|g| RowId::Group(ModelId(g))),
        1 => Just(RowId::Markup(ModelId(500))),
    ]
}

pub fn arb_edit() -> impl Strategy<Value = RowChangeData> {
    prop_oneof![
        arb_amount().prop_map(|v| (FieldName::Quantity, FieldValue::from_number(v))),
        arb_amount().prop_map(|v| (FieldName::Rate, FieldValue::from_number(v))),
        arb_amount().prop_map(|v| (FieldName::Multiplier, FieldValue::from_number(v))),
        prop::option::of("[a-z]{1,8}")
            .prop_map(|v| (FieldName::Description, FieldValue::from_text(v.as_deref()))),
        Just((FieldName::NominalValue, FieldValue::Number(1.0))),
    ]
    .prop_map(|(name, value)| {
        let mut data = RowChangeData::new();
        data.insert(name, CellChange::to(value));
        data
    })
}

pub fn arb_group() -> impl Strategy<Value = Group> {
    (
        prop::sample::select(EVENT_GROUP_IDS),
        "[A-Z][a-z]{0,8}",
        prop::collection::vec(1u64..12, 0..4),
    )
        .prop_map(|(id, name, children)| Group {
            id: ModelId(id),
            name,
            color: None,
            children: children.into_iter().map(ModelId).collect(),
        })
}

pub fn arb_markup() -> impl Strategy<Value = Markup> {
    (
        prop::sample::select(MARKUP_IDS),
        prop_oneof![Just(RateUnit::Percent), Just(RateUnit::Flat)],
        prop::option::of((0u32..100).prop_map(|r| f64::from(r) / 100.0)),
        prop::collection::vec(1u64..12, 0..4),
    )
        .prop_map(|(id, unit, rate, children)| Markup {
            id: ModelId(id),
            identifier: None,
            description: None,
            unit,
            rate,
            children: children.into_iter().map(ModelId).collect(),
            actual: 0.0,
        })
}

/// Server confirmations, either for a placeholder or for a model created
/// elsewhere.
pub fn arb_added() -> impl Strategy<Value = AddedModel> {
    (
        prop::option::of((1u64..4).prop_map(PlaceholderId)),
        8u64..16,
        arb_sub_account(0),
    )
        .prop_map(|(placeholder, id, mut model)| {
            model.id = ModelId(id);
            AddedModel { placeholder, model }
        })
}

pub fn arb_event() -> impl Strategy<Value = ChangeEvent> {
    prop_oneof![
        4 => (arb_row_id(), arb_edit()).prop_map(|(id, data)| ChangeEvent::DataChange {
            changes: vec![RowChange { id, data }],
        }),
        2 => (1usize..3).prop_map(|n| ChangeEvent::RowAdd {
            rows: vec![NewRow::default(); n],
        }),
        2 => arb_row_id().prop_map(|previous| ChangeEvent::RowInsert {
            previous,
            row: NewRow::default(),
        }),
        2 => prop::collection::vec(arb_row_id(), 1..3).prop_map(|ids| ChangeEvent::RowDelete { ids }),
        2 => (arb_row_id(), prop::option::of(arb_row_id()), prop::option::of(prop::sample::select(GROUP_IDS)))
            .prop_map(|(id, previous, group)| ChangeEvent::RowPositionChanged {
                id,
                previous,
                group: group.map(ModelId),
            }),
        1 => (prop::sample::select(GROUP_IDS), prop::collection::vec(arb_row_id(), 1..3))
            .prop_map(|(group, ids)| ChangeEvent::RowAddToGroup { group: ModelId(group), ids }),
        1 => (prop::sample::select(GROUP_IDS), prop::collection::vec(arb_row_id(), 1..3))
            .prop_map(|(group, ids)| ChangeEvent::RowRemoveFromGroup { group: ModelId(group), ids }),
        1 => (1u64..12, arb_sub_account(0)).prop_map(|(id, mut model)| {
            model.id = ModelId(id);
            ChangeEvent::ModelsUpdated { models: vec![model] }
        }),
        1 => prop::collection::vec(arb_added(), 1..3).prop_map(|models| ChangeEvent::ModelsAdded { models }),
        1 => arb_group().prop_map(|group| ChangeEvent::GroupAdd { group }),
        1 => arb_group().prop_map(|group| ChangeEvent::GroupUpdate { group }),
        1 => arb_markup().prop_map(|markup| ChangeEvent::MarkupAdd { markup }),
        1 => arb_markup().prop_map(|markup| ChangeEvent::MarkupUpdate { markup }),
        1 => (prop::collection::vec(arb_row_id(), 0..3), any::<bool>())
            .prop_map(|(ids, loading)| ChangeEvent::RowsLoading { ids, loading }),
    ]
}

pub fn arb_events() -> impl Strategy<Value = Vec<ChangeEvent>> {
    prop::collection::vec(arb_event(), 0..25)
}
