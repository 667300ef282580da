//! Property-based tests for the footprint invariants
//!
//! Dedup, combine offsets, combine dedup, skip-set enforcement and
//! determinism of a replayed trace.

mod common;

use std::collections::HashSet;

use common::{footprint_of, tracer, ScriptedLine};
use huella::addresser::{CanonicalAddresser, ContentAddresser};
use huella::context::TracingContext;
use huella::footprint::Footprint;
use huella::hook::TracerBuilder;
use huella::host::TraceEvent;
use huella::sim::SimFrame;
use huella::value::Value;
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        (-50i64..50).prop_map(Value::Int),
        "[a-z]{0,4}".prop_map(Value::Str),
    ]
}

fn data_value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(2, 12, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Tuple),
            prop::collection::vec(inner, 0..4).prop_map(Value::Set),
        ]
    })
}

/// Values paired with how many idle steps pass before each is returned
fn script() -> impl Strategy<Value = Vec<(Value, u8)>> {
    prop::collection::vec((data_value(), 0u8..3), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_content_hashes_are_unique(script in script()) {
        let footprint = footprint_of(&script);
        let mut hashes = HashSet::new();
        for observed in &footprint {
            prop_assert!(hashes.insert(observed.content_hash()));
        }
        prop_assert!(footprint.len() <= script.len());
    }

    #[test]
    fn prop_first_observation_wins(script in script()) {
        let footprint = footprint_of(&script);
        for observed in &footprint {
            let copies = footprint
                .iter()
                .filter(|o| o.snapshot() == observed.snapshot())
                .count();
            prop_assert_eq!(copies, 1);
        }
        // Without explicit steps, insertion order is step order
        let steps: Vec<u64> = footprint.iter().map(|o| o.step()).collect();
        prop_assert!(steps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn prop_combine_offsets_steps(a in script(), b in script()) {
        let first = footprint_of(&a);
        let second = footprint_of(&b);
        let combined = Footprint::combine([&first, &second]);

        prop_assert_eq!(combined.step_counter(), first.step_counter() + second.step_counter());
        for observed in &second {
            if first.contains_hash(&observed.content_hash()) {
                continue;
            }
            let merged = combined
                .iter()
                .find(|o| o.content_hash() == observed.content_hash())
                .map(|o| o.step());
            prop_assert_eq!(merged, Some(observed.step() + first.step_counter()));
        }
    }

    #[test]
    fn prop_combine_keeps_earlier_footprint(a in script(), shared in data_value(), b in script()) {
        let mut a = a;
        a.push((shared.clone(), 0));
        let mut b = b;
        b.push((shared.clone(), 0));
        let first = footprint_of(&a);
        let second = footprint_of(&b);

        let hash = CanonicalAddresser.address(&shared).unwrap();
        let combined = Footprint::combine([&first, &second]);
        let from_first = first
            .iter()
            .find(|o| o.content_hash() == hash)
            .map(|o| o.step());
        let kept: Vec<u64> = combined
            .iter()
            .filter(|o| o.content_hash() == hash)
            .map(|o| o.step())
            .collect();
        prop_assert_eq!(kept.len(), 1);
        prop_assert_eq!(Some(kept[0]), from_first);
    }

    #[test]
    fn prop_skipped_categories_never_recorded(name in "[a-z]{1,8}", module in "pkg_[a-z]{1,5}") {
        let (footprint, hook, _context) = tracer(ScriptedLine::new(""), &[]);
        let frame = SimFrame::new("<ipython-input-1>", "f", 1);
        let skipped = [
            Value::Type { name: name.clone(), module: module.clone() },
            Value::Callable { name: name.clone(), module: module.clone() },
            Value::Builtin { name: name.clone() },
            Value::module(&module, [(name.as_str(), Value::Int(1))]),
        ];
        for value in &skipped {
            hook.dispatch(&frame, TraceEvent::Return(value));
        }
        prop_assert!(footprint.is_empty());
        prop_assert_eq!(footprint.step_counter(), 4);
        prop_assert!(footprint.with(|fp| fp.imports().contains(&module)));
    }

    #[test]
    fn prop_replayed_trace_is_deterministic(
        lines in prop::collection::vec(
            prop::sample::select(vec!["a", "b", "a + b", "c = a", "a, b = b, a"]),
            1..12,
        ),
        a in data_value(),
        b in data_value(),
    ) {
        let replay = || {
            let line = ScriptedLine::new("");
            let context = TracingContext::new();
            let (footprint, hook) = TracerBuilder::default()
                .with_line_source(line.clone())
                .build(&context);
            let frame = SimFrame::new("<ipython-input-1>", "f", 1)
                .with_local("a", a.clone())
                .with_local("b", b.clone());
            for text in &lines {
                line.set(text);
                hook.dispatch(&frame, TraceEvent::Line);
            }
            frame.set_local("c", Value::Int(1000));
            hook.dispatch(&frame, TraceEvent::Return(&Value::None));
            let fp = footprint.take();
            let by_step: Vec<(Value, u64)> = fp
                .sorted_by_step()
                .into_iter()
                .map(|o| (o.snapshot().clone(), o.step()))
                .collect();
            by_step
        };
        prop_assert_eq!(replay(), replay());
    }
}
