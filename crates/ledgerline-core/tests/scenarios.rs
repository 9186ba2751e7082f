//! End-to-end table scenarios, driven through JSON snapshots and event logs
//! the same way `ldg replay` consumes them.

use ledgerline_core::ChangeEvent;
use ledgerline_core::invariants;
use ledgerline_core::model::{ModelId, PlaceholderId, RowId};
use ledgerline_core::replay::{digest, replay};
use ledgerline_core::rows::{Row, RowOptions};
use ledgerline_core::snapshot::Snapshot;
use ledgerline_core::state::TableState;

const GROUPED: &str = r##"{
    "scope": {"kind": "account", "id": 1},
    "models": [
        {"id": 10, "order": "a", "kind": "sub_account", "quantity": 1, "rate": 100, "nominal_value": 100},
        {"id": 11, "order": "b", "kind": "sub_account", "quantity": 1, "rate": 50, "nominal_value": 50},
        {"id": 12, "order": "c", "kind": "sub_account", "quantity": 2, "rate": 5, "nominal_value": 10}
    ],
    "groups": [{"id": 7, "name": "Crew", "color": "#d5d5e5", "children": [10, 11]}],
    "markups": [
        {"id": 3, "unit": "flat", "rate": 25},
        {"id": 4, "unit": "percent", "rate": 0.1, "children": [12, 99]}
    ]
}"##;

fn load(raw: &str) -> TableState {
    Snapshot::from_json(raw)
        .expect("snapshot parses")
        .into_state(RowOptions::default())
        .expect("snapshot is valid")
}

fn events(raw: &str) -> Vec<ChangeEvent> {
    serde_json::from_str(raw).expect("event log parses")
}

fn ids(state: &TableState) -> Vec<String> {
    state.rows.iter().map(|r| r.id().to_string()).collect()
}

#[test]
fn group_subtotal_follows_rate_edit() {
    let state = load(GROUPED);
    assert_eq!(ids(&state), ["10", "11", "group-7", "12", "markup-3", "markup-4"]);
    let before = state.totals.nominal_value;

    let next = replay(
        &state,
        &events(
            r#"[{"type": "data_change", "changes": [
                {"id": "10", "data": {"rate": {"old": 100, "new": 150}}}
            ]}]"#,
        ),
    )
    .expect("replay");

    let group = next.group(ModelId(7)).expect("group row");
    assert!((group.totals.nominal_value - 200.0).abs() < 1e-9);
    assert!((next.totals.nominal_value - before - 50.0).abs() < 1e-9);
    assert_eq!(invariants::check(&next, 1e-9), vec![]);
}

#[test]
fn insert_lands_between_predecessor_and_successor() {
    let state = load(GROUPED);
    let next = replay(
        &state,
        &events(r#"[{"type": "row_insert", "previous": "11", "row": {"data": {"identifier": "2050"}}}]"#),
    )
    .expect("replay");

    let key = |id: RowId| next.row(id).and_then(Row::order).cloned().expect("line row");
    let inserted = key(RowId::Placeholder(PlaceholderId(1)));
    assert!(key(RowId::model(11)) < inserted);
    assert!(inserted < key(RowId::model(12)));
    assert_eq!(
        ids(&next),
        ["10", "11", "placeholder-1", "group-7", "12", "markup-3", "markup-4"]
    );
}

#[test]
fn models_updated_for_unknown_entity_is_noop() {
    let state = load(GROUPED);
    let next = replay(
        &state,
        &events(
            r#"[{"type": "models_updated", "models": [
                {"id": 404, "order": "m", "kind": "sub_account", "nominal_value": 9000}
            ]}]"#,
        ),
    )
    .expect("replay");
    assert_eq!(next, state);
}

#[test]
fn deleting_group_members_removes_group() {
    let state = load(GROUPED);
    let next = replay(
        &state,
        &events(r#"[{"type": "row_delete", "ids": ["10"]}, {"type": "row_delete", "ids": ["11"]}]"#),
    )
    .expect("replay");
    assert_eq!(ids(&next), ["12", "markup-3", "markup-4"]);
    assert!(next.group(ModelId(7)).is_none());
}

#[test]
fn stale_markup_targets_are_skipped() {
    let state = load(GROUPED);
    let percent = state.markups().find(|m| m.id == ModelId(4)).expect("markup");
    assert!((percent.contribution - 1.0).abs() < 1e-9);
    let flat = state.markups().find(|m| m.id == ModelId(3)).expect("markup");
    assert!((flat.contribution - 25.0).abs() < 1e-9);
}

#[test]
fn placeholder_lifecycle_reaches_model() {
    let state = load(GROUPED);
    let log = events(
        r#"[
            {"type": "row_add", "rows": [{"data": {"quantity": 3, "rate": 20}, "group": 7}]},
            {"type": "rows_loading", "ids": ["placeholder-1"], "loading": true},
            {"type": "models_added", "models": [{
                "placeholder": 1,
                "model": {"id": 30, "order": "d", "kind": "sub_account", "quantity": 3, "rate": 20, "nominal_value": 60}
            }]}
        ]"#,
    );
    let next = replay(&state, &log).expect("replay");

    assert!(next.row(RowId::Placeholder(PlaceholderId(1))).is_none());
    let confirmed = next.row(RowId::model(30)).expect("confirmed row");
    assert_eq!(confirmed.meta().map(|m| (m.group, m.loading)), Some((Some(ModelId(7)), false)));
    let group = next.group(ModelId(7)).expect("group");
    assert!((group.totals.nominal_value - 210.0).abs() < 1e-9);

    let again = replay(&state, &log).expect("replay");
    assert_eq!(digest(&next).expect("digest"), digest(&again).expect("digest"));
}

#[test]
fn exclude_zero_totals_drops_empty_group() {
    let raw = r#"{
        "scope": {"kind": "budget", "id": 2},
        "models": [
            {"id": 1, "order": "a", "kind": "account"},
            {"id": 2, "order": "b", "kind": "account", "nominal_value": 40}
        ],
        "groups": [{"id": 5, "name": "Empty", "children": [1]}]
    }"#;
    let state = Snapshot::from_json(raw)
        .expect("parse")
        .into_state(RowOptions {
            exclude_zero_totals: true,
        })
        .expect("state");
    assert_eq!(ids(&state), ["2"]);
}
