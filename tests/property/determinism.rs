//! Property-based tests for determinism guarantees

use proptest::prelude::*;
use qengine::content::compute_content_version;
use qengine::grading::{finalize_score, LEGACY_ROUNDING_THRESHOLD};
use qengine::json_round_trip;
use qengine::module::calculation::CalculationModule;
use qengine::module::QuestionModule;
use qengine::sandbox::{ExecutionContext, PathAliases};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const MODULE: &str = r#"
[params.a]
type = "int"
min = -1000
max = 1000

[params.b]
type = "float"
min = 0.5
max = 9.5
digits = 2

[params.pick]
type = "choice"
values = ["red", "green", "blue"]

[answers.total]
op = "sum"
of = ["a", "b"]

[answers.pick]
op = "param"
of = ["pick"]
"#;

fn context() -> ExecutionContext {
    ExecutionContext::new(PathAliases::for_question(
        Path::new("/course"),
        Path::new("/course/questions/q"),
    ))
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<f64>()
            .prop_filter("JSON numbers are finite", |f| f.is_finite())
            .prop_map(Value::from),
        (0.5f64..9.5).prop_map(Value::from),
        ".{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Same seed, same variant
#[test]
fn test_calculation_variant_determinism_property() {
    let module = CalculationModule::from_toml(MODULE).unwrap();
    let ctx = context();
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&"[0-9]{1,10}", |seed| {
            let first = module.get_data(&seed, &Value::Null, &ctx).unwrap();
            let second = module.get_data(&seed, &Value::Null, &ctx).unwrap();
            prop_assert_eq!(&first, &second);

            let params = first.params.unwrap();
            let a = params["a"].as_i64().unwrap();
            prop_assert!((-1000..=1000).contains(&a));
            let b = params["b"].as_f64().unwrap();
            prop_assert!((0.5..=9.5).contains(&b));
            Ok(())
        })
        .unwrap();
}

/// Normalizing a value never changes it
#[test]
fn test_json_round_trip_identity_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&json_value(), |value| {
            let normalized = json_round_trip(Some(&value)).unwrap();
            prop_assert_eq!(&normalized, &value);
            // idempotent
            prop_assert_eq!(json_round_trip(Some(&normalized)).unwrap(), normalized);
            Ok(())
        })
        .unwrap();
}

/// Without partial credit every stored score is 0 or 1
#[test]
fn test_rounding_is_binary_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(0u32..=10_000u32), |n| {
            let raw = n as f64 / 10_000.0;
            let rounded = finalize_score(raw, false);
            prop_assert!(rounded == 0.0 || rounded == 1.0);
            prop_assert_eq!(rounded == 1.0, raw >= LEGACY_ROUNDING_THRESHOLD);
            prop_assert_eq!(finalize_score(raw, true), raw);
            Ok(())
        })
        .unwrap();
}

/// Content version depends only on file paths and bytes
#[test]
fn test_content_version_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::new(proptest::test_runner::Config {
        cases: 32,
        ..Default::default()
    });

    runner
        .run(
            &prop::collection::btree_map("[a-z]{1,8}", any::<Vec<u8>>(), 1..5),
            |files| {
                let first = TempDir::new().unwrap();
                let second = TempDir::new().unwrap();
                for (name, bytes) in &files {
                    std::fs::write(first.path().join(name), bytes).unwrap();
                }
                for (name, bytes) in files.iter().rev() {
                    std::fs::write(second.path().join(name), bytes).unwrap();
                }
                prop_assert_eq!(
                    compute_content_version(first.path()).unwrap(),
                    compute_content_version(second.path()).unwrap()
                );
                Ok(())
            },
        )
        .unwrap();
}
