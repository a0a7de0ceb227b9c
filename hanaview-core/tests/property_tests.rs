//! Property tests for the pure building blocks.
//!
//! Uses proptest to verify:
//! 1. Sanitizing nulls every non-finite float and leaves everything else as is
//! 2. Nearest lookup returns the exact sample at its own age
//! 3. Nearest lookup between two samples picks the closer one
//! 4. A trailing return exists exactly when enough bars exist

use chrono::{DateTime, Duration, TimeZone, Utc};
use hanaview_core::nearest::{nearest_value, TimedSample};
use hanaview_core::performance::trailing_return;
use hanaview_core::sanitize::sanitize;
use hanaview_core::snapshot::Horizon;
use proptest::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ── Strategies (proptest) ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Tree {
    Num(f64),
    Text(String),
    Flag(bool),
    List(Vec<Tree>),
    Map(BTreeMap<String, Tree>),
}

fn arb_float() -> impl Strategy<Value = f64> {
    prop_oneof![
        6 => -1e9..1e9_f64,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
    ]
}

fn arb_tree() -> impl Strategy<Value = Tree> {
    let leaf = prop_oneof![
        arb_float().prop_map(Tree::Num),
        "[a-z]{0,6}".prop_map(Tree::Text),
        any::<bool>().prop_map(Tree::Flag),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Tree::List),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..6).prop_map(Tree::Map),
        ]
    })
}

fn expected(tree: &Tree) -> Value {
    match tree {
        Tree::Num(f) if f.is_finite() => json!(f),
        Tree::Num(_) => Value::Null,
        Tree::Text(s) => json!(s),
        Tree::Flag(b) => json!(b),
        Tree::List(items) => Value::Array(items.iter().map(expected).collect()),
        Tree::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), expected(v))).collect()),
    }
}

fn contains_non_finite(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().is_some_and(|f| !f.is_finite()),
        Value::Array(items) => items.iter().any(contains_non_finite),
        Value::Object(map) => map.values().any(contains_non_finite),
        _ => false,
    }
}

struct Sample {
    millis: f64,
    value: f64,
}

impl TimedSample for Sample {
    fn epoch_millis(&self) -> f64 {
        self.millis
    }

    fn value(&self) -> f64 {
        self.value
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

/// Samples at strictly decreasing ages (oldest first), valued by position.
fn series_from_gaps(gaps: &[i64]) -> (Vec<i64>, Vec<Sample>) {
    let mut ages = Vec::with_capacity(gaps.len() + 1);
    let mut age: i64 = gaps.iter().sum();
    ages.push(age);
    for gap in gaps {
        age -= gap;
        ages.push(age);
    }
    let samples = ages
        .iter()
        .enumerate()
        .map(|(i, days)| Sample {
            millis: (now() - Duration::days(*days)).timestamp_millis() as f64,
            value: i as f64,
        })
        .collect();
    (ages, samples)
}

// ── 1. Sanitizer ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sanitize_nulls_only_non_finite_floats(tree in arb_tree()) {
        let out = sanitize(&tree).unwrap();
        prop_assert!(!contains_non_finite(&out));
        prop_assert_eq!(out, expected(&tree));
    }
}

// ── 2-3. Nearest lookup ──────────────────────────────────────────────

proptest! {
    #[test]
    fn exact_age_returns_that_sample(
        gaps in prop::collection::vec(1i64..15, 1..30),
        pick in any::<prop::sample::Index>(),
    ) {
        let (ages, samples) = series_from_gaps(&gaps);
        let i = pick.index(ages.len());
        prop_assert_eq!(nearest_value(&samples, now(), ages[i]), Some(i as f64));
    }

    #[test]
    fn between_two_samples_picks_the_closer(
        gaps in prop::collection::vec(3i64..15, 1..30),
        pick in any::<prop::sample::Index>(),
        offset in any::<prop::sample::Index>(),
    ) {
        let (ages, samples) = series_from_gaps(&gaps);
        let i = pick.index(gaps.len());
        let (older, newer) = (ages[i], ages[i + 1]);
        let target = newer + 1 + offset.index((older - newer - 1) as usize) as i64;
        let to_older = older - target;
        let to_newer = target - newer;
        prop_assume!(to_older != to_newer);
        let want = if to_older < to_newer { i } else { i + 1 };
        prop_assert_eq!(nearest_value(&samples, now(), target), Some(want as f64));
    }
}

// ── 4. Trailing returns ──────────────────────────────────────────────

proptest! {
    #[test]
    fn trailing_return_needs_lookback_plus_one_bars(
        closes in prop::collection::vec(1.0..1000.0_f64, 0..30),
    ) {
        for horizon in Horizon::ALL {
            let got = trailing_return(&closes, horizon);
            prop_assert_eq!(got.is_some(), closes.len() >= horizon.lookback() + 1);
        }
    }
}
