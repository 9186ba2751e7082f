use proptest::prelude::*;
use std::collections::BTreeSet;

use ledgerline_core::event::{ChangeEvent, RowChange};
use ledgerline_core::fields::{
    CellChange, Field, FieldInput, FieldName, FieldValue, RowChangeData, RowManager,
};
use ledgerline_core::invariants::{self, Violation};
use ledgerline_core::model::{LineData, LineItem, LineItemKind, ModelId, RateUnit, RowId, Scope, ScopeKind};
use ledgerline_core::order::OrderKey;
use ledgerline_core::recalc::recompute;
use ledgerline_core::replay::{digest, replay_lenient};
use ledgerline_core::rows::{ModelRow, Row};
use ledgerline_core::state::TableState;
use ledgerline_core::reduce;

#[path = "generators.rs"]
mod generators;
use generators::*;

const EPSILON: f64 = 1e-9;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn replay_is_deterministic(state in arb_table(), events in arb_events()) {
        let a = replay_lenient(&state, &events);
        let b = replay_lenient(&state, &events);
        prop_assert_eq!(digest(&a.state).expect("digest"), digest(&b.state).expect("digest"));
        prop_assert_eq!(a.state, b.state);
        prop_assert_eq!(a.applied, b.applied);
    }

    #[test]
    fn replayed_states_pass_invariant_checks(state in arb_table(), events in arb_events()) {
        prop_assert_eq!(invariants::check(&state, EPSILON), vec![]);
        let outcome = replay_lenient(&state, &events);
        prop_assert_eq!(invariants::check(&outcome.state, 1e-6), vec![]);
    }

    #[test]
    fn groups_never_orphaned(state in arb_table(), ids in prop::collection::vec(arb_row_id(), 1..8)) {
        let mut current = state;
        for id in ids {
            current = reduce(&current, &ChangeEvent::RowDelete { ids: vec![id] }).expect("delete never fails");
            let violations = invariants::check(&current, 1e-6);
            prop_assert!(
                !violations.iter().any(|v| matches!(v, Violation::OrphanGroup { .. } | Violation::GroupLayout { .. })),
                "{:?}",
                violations
            );
            for group in current.groups() {
                prop_assert!(group.children.iter().any(|c| current.contains(*c)));
            }
        }
    }

    #[test]
    fn parent_equals_sum_of_children(
        children in prop::collection::vec(arb_sub_account(0), 1..6),
        edited in 0usize..6,
        rate in 0u32..1_000,
    ) {
        let children: Vec<LineItem> = children
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.id = ModelId(100 + i as u64);
                c
            })
            .collect();
        let parent = LineItem {
            id: ModelId(1),
            order: OrderKey::first(),
            data: LineData {
                children: children.iter().map(|c| c.id).collect(),
                nominal_value: children.iter().map(|c| c.data.nominal_value).sum(),
                ..LineData::empty(LineItemKind::SubAccount)
            },
        };
        let mut state = TableState::new(
            Scope::new(ScopeKind::Account, 9),
            vec![Row::Model(ModelRow::from_model(&parent))],
            children.clone(),
            [],
            Default::default(),
        );

        let target = children[edited % children.len()].id;
        if let Some(child) = state.descendants.get_mut(&target) {
            child.data.rate = Some(f64::from(rate));
        }
        let next = recompute(&BTreeSet::from([RowId::Model(target)]), &state);

        let sum: f64 = next.descendants.values().map(|c| c.data.nominal_value).sum();
        let parent_nominal = next.line(RowId::model(1)).expect("parent").nominal_value;
        prop_assert!(close(sum, parent_nominal), "sum {} != parent {}", sum, parent_nominal);
        prop_assert!(!invariants::check(&next, 1e-6).iter().any(|v| matches!(v, Violation::ParentSum { .. })), "unexpected ParentSum violation");
    }

    #[test]
    fn markup_contributions_follow_rate(state in arb_table()) {
        let all: BTreeSet<RowId> = state.line_rows().map(Row::id).collect();
        let next = recompute(&all, &state);
        for markup in next.markups() {
            let rate = markup.rate.unwrap_or(0.0);
            match markup.unit {
                RateUnit::Flat => prop_assert!(close(markup.contribution, rate)),
                RateUnit::Percent => {
                    let v: f64 = markup
                        .children
                        .iter()
                        .filter_map(|c| next.line(*c))
                        .map(LineData::markup_base)
                        .sum();
                    prop_assert!(close(markup.contribution, rate * v));
                }
            }
        }
    }

    #[test]
    fn field_round_trip_preserves_read_write_columns(item in arb_sub_account(7)) {
        let manager = RowManager::for_kind(LineItemKind::SubAccount);
        let row = Row::Model(ModelRow::from_model(&item));
        let payload = manager.create_payload(&row).expect("payload");

        prop_assert_eq!(item.patched(&payload, |id| Some(unit_tag(id.0))).expect("patch"), item.clone());

        let blank = LineItem {
            data: LineData::empty(LineItemKind::SubAccount),
            ..item.clone()
        };
        let echo = blank.patched(&payload, |id| Some(unit_tag(id.0))).expect("patch");
        let echo_row = Row::Model(ModelRow::from_model(&echo));
        for field in manager.fields() {
            if let Field::ReadWrite { .. } = field {
                prop_assert_eq!(
                    field.resolve(FieldInput::Row(&echo_row)),
                    field.resolve(FieldInput::Row(&row)),
                    "{}",
                    field.name()
                );
            }
        }
    }

    #[test]
    fn update_payload_drops_untouched_columns(value in arb_amount()) {
        let manager = RowManager::for_kind(LineItemKind::SubAccount);
        let mut changes = RowChangeData::new();
        changes.insert(FieldName::Rate, CellChange::to(FieldValue::from_number(value)));
        let payload = manager.update_payload(&changes).expect("payload");
        prop_assert_eq!(payload.len(), 1);
        prop_assert_eq!(payload.get(FieldName::Rate).map(serde_json::Value::is_null), Some(value.is_none()));
    }

    #[test]
    fn order_key_between_is_strict(a in arb_any_order_key(), b in arb_any_order_key()) {
        prop_assume!(a != b);
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let mid = OrderKey::between(Some(&lo), Some(&hi)).expect("ascending bounds");
        prop_assert!(lo < mid && mid < hi, "{} < {} < {}", lo, mid, hi);

        let before = OrderKey::between(None, Some(&lo)).expect("open low");
        prop_assert!(before < lo);
        prop_assert!(OrderKey::parse(before.as_str()).is_ok());

        let after = OrderKey::between(Some(&hi), None).expect("open high");
        prop_assert!(after > hi);
    }

    #[test]
    fn data_change_without_total_columns_keeps_totals(state in arb_table(), text in "[a-z]{1,6}") {
        let Some(target) = state.line_rows().next().map(Row::id) else {
            return Ok(());
        };
        let mut data = RowChangeData::new();
        data.insert(FieldName::Description, CellChange::to(FieldValue::Text(text)));
        let next = reduce(&state, &ChangeEvent::DataChange { changes: vec![RowChange { id: target, data }] })
            .expect("description edit");
        prop_assert_eq!(next.totals, state.totals);
    }
}
