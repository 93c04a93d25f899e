//! Concurrent submissions against one assessment instance.

use qengine::scoring::{fold_instance_question, ScoringOutcome, ScoringService};
use qengine::store::{MemoryScoreStore, ScoreStore};
use qengine::{AssessmentInstance, GradedSubmission, InstanceQuestion, ScoringMode};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const SLOTS: [(u64, f64, f64); 3] = [(10, 1.0, 5.0), (20, 2.0, 10.0), (30, 3.0, 3.0)];

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

fn seeded_store() -> Arc<MemoryScoreStore> {
    let store = Arc::new(MemoryScoreStore::new());
    let mut ai = AssessmentInstance::new(1, ScoringMode::Homework, SLOTS.iter().map(|s| s.2).sum());
    for (id, init, max) in SLOTS {
        store
            .write_instance_question(&InstanceQuestion::new(id, 1, id, init, max))
            .unwrap();
        ai.instance_question_ids.push(id);
    }
    store.write_assessment_instance(&ai).unwrap();
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_serialize_per_instance_question() {
    let store = seeded_store();
    let service = Arc::new(ScoringService::new(store.clone()));

    // half the traffic on one instance question, the rest on its siblings
    let targets: Vec<(u64, f64)> = (0..16)
        .map(|i| {
            let iq = match i % 4 {
                0 | 1 => 10,
                2 => 20,
                _ => 30,
            };
            let score = if i % 5 == 4 { 0.0 } else { 1.0 };
            (iq, score)
        })
        .collect();

    let mut handles = Vec::new();
    for (iq, score) in targets.clone() {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.record_submission(iq, 1, None, graded(score)).await
        }));
    }
    let mut outcomes: Vec<ScoringOutcome> = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    let mut expected_attempts: HashMap<u64, u32> = HashMap::new();
    for (iq, _) in &targets {
        *expected_attempts.entry(*iq).or_default() += 1;
    }

    let mut total = 0.0;
    for (id, init, max) in SLOTS {
        assert!(!store.is_halted(id).unwrap());
        let iq = store.read_instance_question(id).unwrap().unwrap();
        let history = store.list_submissions(id).unwrap();
        assert_eq!(history.len() as u32, expected_attempts[&id]);
        assert_eq!(iq.number_attempts, expected_attempts[&id]);

        // stored points are exactly what the stored history folds to
        let refolded = fold_instance_question(
            &InstanceQuestion::new(id, 1, id, init, max),
            history.iter().map(|r| &r.graded),
            ScoringMode::Homework,
        );
        assert_eq!(refolded, iq);

        // each commit saw every earlier one: points never went down
        let mut mine: Vec<_> = outcomes
            .iter()
            .filter(|o| o.instance_question.id == id)
            .collect();
        mine.sort_by_key(|o| o.submission.submission_id);
        for pair in mine.windows(2) {
            assert!(pair[1].instance_question.points >= pair[0].instance_question.points);
            assert_eq!(
                pair[1].instance_question.number_attempts,
                pair[0].instance_question.number_attempts + 1
            );
        }
        total += iq.points;
    }

    let ai = store.read_assessment_instance(1).unwrap().unwrap();
    assert!((ai.points - total).abs() < 1e-9);
    assert!(outcomes.iter().all(|o| o.assessment_instance.points <= ai.points + 1e-9));
}
