//! Property-based tests for scoring invariants

use proptest::prelude::*;
use qengine::scoring::{fold_instance_question, ScoringService};
use qengine::store::{MemoryScoreStore, ScoreStore};
use qengine::{AssessmentInstance, GradedSubmission, InstanceQuestion, ScoringMode};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn graded(score: f64) -> GradedSubmission {
    GradedSubmission {
        submitted_answer: json!({}),
        raw_submitted_answer: json!({}),
        score,
        v2_score: score,
        feedback: Value::Null,
        partial_scores: Map::new(),
        format_errors: Map::new(),
        gradable: true,
        params: json!({}),
        true_answer: json!({}),
    }
}

fn scores() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((0u32..=4u32).prop_map(|n| n as f64 / 4.0), 1..20)
}

fn mode() -> impl Strategy<Value = ScoringMode> {
    prop_oneof![Just(ScoringMode::Homework), Just(ScoringMode::BestScore)]
}

/// Points never decrease and never exceed max points
#[test]
fn test_points_monotonic_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(scores(), mode(), 1u32..=5u32, 1u32..=20u32), |(scores, mode, init, max)| {
            let iq = InstanceQuestion::new(1, 1, 1, init as f64, max as f64);
            let history: Vec<_> = scores.iter().map(|s| graded(*s)).collect();

            let mut previous = 0.0;
            for n in 1..=history.len() {
                let next = fold_instance_question(&iq, &history[..n], mode);
                prop_assert!(next.points + 1e-9 >= previous);
                prop_assert!(next.points <= next.max_points + 1e-9);
                prop_assert_eq!(next.number_attempts as usize, n);
                previous = next.points;
            }
            Ok(())
        })
        .unwrap();
}

/// Assessment points always equal the sum of instance question points
#[test]
fn test_assessment_sum_invariant_property() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut runner = proptest::test_runner::TestRunner::new(proptest::test_runner::Config {
        cases: 64,
        ..Default::default()
    });

    let submissions = prop::collection::vec((0usize..3, (0u32..=4u32).prop_map(|n| n as f64 / 4.0)), 1..25);
    runner
        .run(&(submissions, mode()), |(submissions, mode)| {
            let store = Arc::new(MemoryScoreStore::new());
            let slots = [(10u64, 1.0, 5.0), (20, 2.0, 10.0), (30, 3.0, 3.0)];
            let mut ai = AssessmentInstance::new(1, mode, slots.iter().map(|s| s.2).sum());
            for (id, init, max) in slots {
                store
                    .write_instance_question(&InstanceQuestion::new(id, 1, id, init, max))
                    .unwrap();
                ai.instance_question_ids.push(id);
            }
            store.write_assessment_instance(&ai).unwrap();
            let service = ScoringService::new(store.clone());

            for (slot, score) in submissions {
                let iq_id = slots[slot].0;
                let outcome = runtime
                    .block_on(service.record_submission(iq_id, 1, None, graded(score)))
                    .unwrap();
                let total: f64 = slots
                    .iter()
                    .map(|(id, _, _)| store.read_instance_question(*id).unwrap().unwrap().points)
                    .sum();
                prop_assert!((outcome.assessment_instance.points - total).abs() < 1e-9);
                let stored = store.read_assessment_instance(1).unwrap().unwrap();
                prop_assert!((stored.points - total).abs() < 1e-9);
                prop_assert!(stored.points <= stored.max_points + 1e-9);
            }
            Ok(())
        })
        .unwrap();
}
