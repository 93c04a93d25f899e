//! Score persistence across store reopen.

use super::test_utils::*;
use qengine::module::NativeDialect;
use qengine::store::{ScoreStore, SledScoreStore};
use qengine::{ModuleLoader, PhaseExecutor, QuestionEngine, QuestionSlot, ScoringMode, Submission};
use std::sync::Arc;
use tempfile::TempDir;

fn sled_engine(path: &std::path::Path) -> (QuestionEngine, Arc<SledScoreStore>) {
    let store = Arc::new(SledScoreStore::new(path).unwrap());
    let engine = QuestionEngine::new(
        Arc::new(ModuleLoader::local(dialects(NativeDialect::new()))),
        PhaseExecutor::new(None),
        store.clone(),
    );
    (engine, store)
}

#[tokio::test]
async fn test_scores_survive_reopen() {
    let fixture = CourseFixture::new();
    let question = fixture.add_question(
        "addVectors",
        1,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let store_dir = TempDir::new().unwrap();
    let store_path = store_dir.path().join("scores");

    let (ai_id, iq_id, variant_id) = {
        let (engine, store) = sled_engine(&store_path);
        let (ai, iqs) = engine
            .start_assessment(
                ScoringMode::Homework,
                &[QuestionSlot {
                    question_id: 1,
                    init_points: 1.0,
                    max_points: 5.0,
                }],
            )
            .unwrap();
        let record = engine
            .create_variant(iqs[0].id, &question, &fixture.course, Some("11".to_string()))
            .await
            .unwrap();
        let answer = Submission::new(record.variant.true_answer.clone());
        for _ in 0..2 {
            engine
                .submit_answer(iqs[0].id, record.variant_id, &answer, &question, &fixture.course)
                .await
                .unwrap();
        }
        store.flush().unwrap();
        (ai.id, iqs[0].id, record.variant_id)
    };

    let store = SledScoreStore::new(&store_path).unwrap();
    let iq = store.read_instance_question(iq_id).unwrap().unwrap();
    assert_eq!(iq.points, 3.0);
    assert_eq!(iq.number_attempts, 2);
    let ai = store.read_assessment_instance(ai_id).unwrap().unwrap();
    assert_eq!(ai.points, 3.0);

    let submissions = store.list_submissions(iq_id).unwrap();
    assert_eq!(submissions.len(), 2);
    assert!(submissions.iter().all(|s| s.variant_id == variant_id));
    assert!(submissions[0].submission_id < submissions[1].submission_id);

    let variant = store.read_variant(variant_id).unwrap().unwrap();
    assert_eq!(variant.variant.variant_seed, "11");
}

#[tokio::test]
async fn test_rescore_matches_recorded_points() {
    let fixture = CourseFixture::new();
    let question = fixture.add_question(
        "addVectors",
        1,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let store_dir = TempDir::new().unwrap();
    let (engine, _store) = sled_engine(&store_dir.path().join("scores"));
    let (_, iqs) = engine
        .start_assessment(
            ScoringMode::BestScore,
            &[QuestionSlot {
                question_id: 1,
                init_points: 1.0,
                max_points: 4.0,
            }],
        )
        .unwrap();
    let record = engine
        .create_variant(iqs[0].id, &question, &fixture.course, None)
        .await
        .unwrap();
    let outcome = engine
        .submit_answer(
            iqs[0].id,
            record.variant_id,
            &Submission::new(record.variant.true_answer.clone()),
            &question,
            &fixture.course,
        )
        .await
        .unwrap();
    assert_eq!(outcome.instance_question.points, 4.0);

    let (iq, ai) = engine.rescore_instance_question(iqs[0].id).await.unwrap();
    assert_eq!(iq, outcome.instance_question);
    assert_eq!(ai.points, 4.0);
}
