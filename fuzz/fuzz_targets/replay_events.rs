#![no_main]

use ledgerline_core::ChangeEvent;
use ledgerline_core::invariants;
use ledgerline_core::replay::replay_lenient;
use ledgerline_core::rows::RowOptions;
use ledgerline_core::snapshot::Snapshot;
use libfuzzer_sys::fuzz_target;

const SNAPSHOT: &str = r#"{
    "scope": {"kind": "account", "id": 1},
    "models": [
        {"id": 10, "order": "a", "kind": "sub_account", "quantity": 1, "rate": 100, "nominal_value": 100},
        {"id": 11, "order": "b", "kind": "sub_account", "quantity": 1, "rate": 50, "nominal_value": 50},
        {"id": 12, "order": "c", "kind": "sub_account", "quantity": 2, "rate": 5, "nominal_value": 10}
    ],
    "groups": [{"id": 7, "name": "Crew", "children": [10, 11]}],
    "markups": [{"id": 4, "unit": "percent", "rate": 0.1, "children": [12]}]
}"#;

fuzz_target!(|data: &[u8]| {
    let Ok(events) = serde_json::from_slice::<Vec<ChangeEvent>>(data) else {
        return;
    };
    let Ok(state) = Snapshot::from_json(SNAPSHOT).and_then(|s| s.into_state(RowOptions::default()))
    else {
        return;
    };
    let run = replay_lenient(&state, &events);
    let structural: Vec<_> = invariants::check(&run.state, 1e-6)
        .into_iter()
        .filter(|v| {
            matches!(
                v,
                invariants::Violation::DuplicateRow { .. }
                    | invariants::Violation::OrphanGroup { .. }
                    | invariants::Violation::MarkupNotLast { .. }
            )
        })
        .collect();
    assert!(structural.is_empty(), "{structural:?}");
});
