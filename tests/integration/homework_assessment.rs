//! End-to-end homework assessment: generate variants, submit answers and
//! watch instance question and assessment totals move.

use super::test_utils::*;
use qengine::{QuestionSlot, ScoringMode, Submission};
use serde_json::json;

const Q1_ID: u64 = 101;
const Q2_ID: u64 = 102;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[tokio::test]
async fn test_two_question_homework_sequence() {
    let fixture = CourseFixture::new();
    let q1 = fixture.add_question(
        "addVectors",
        Q1_ID,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let q2 = fixture.add_question(
        "fossilFuelsRadio",
        Q2_ID,
        FOSSIL_FUELS_INFO,
        Some(("server.toml", FOSSIL_FUELS_RADIO)),
    );
    let engine = engine();

    let (ai, iqs) = engine
        .start_assessment(
            ScoringMode::Homework,
            &[
                QuestionSlot {
                    question_id: Q1_ID,
                    init_points: 1.0,
                    max_points: 5.0,
                },
                QuestionSlot {
                    question_id: Q2_ID,
                    init_points: 2.0,
                    max_points: 10.0,
                },
            ],
        )
        .unwrap();
    assert_close(ai.max_points, 15.0);
    assert_eq!(iqs.len(), 2);
    let (iq1, iq2) = (iqs[0].id, iqs[1].id);

    let v1 = engine
        .create_variant(iq1, &q1, &fixture.course, Some("1".to_string()))
        .await
        .unwrap();
    let v2 = engine
        .create_variant(iq2, &q2, &fixture.course, Some("2".to_string()))
        .await
        .unwrap();

    let right1 = Submission::new(v1.variant.true_answer.clone());
    let wrong1 = Submission::new(json!({"wx": 1000, "wy": 1000}));
    let right2 = Submission::new(v2.variant.true_answer.clone());

    // correct answer to question 1
    let outcome = engine
        .submit_answer(iq1, v1.variant_id, &right1, &q1, &fixture.course)
        .await
        .unwrap();
    assert_close(outcome.submission.graded.score, 1.0);
    assert_close(outcome.instance_question.points, 1.0);
    assert_close(outcome.instance_question.score_perc, 20.0);
    assert_close(outcome.assessment_instance.points, 1.0);
    assert_close(outcome.assessment_instance.score_perc, 100.0 / 15.0);

    // a wrong answer never takes points away
    let outcome = engine
        .submit_answer(iq1, v1.variant_id, &wrong1, &q1, &fixture.course)
        .await
        .unwrap();
    assert_close(outcome.submission.graded.score, 0.0);
    assert_close(outcome.instance_question.points, 1.0);
    assert_close(outcome.assessment_instance.points, 1.0);

    // correct answer to question 2
    let outcome = engine
        .submit_answer(iq2, v2.variant_id, &right2, &q2, &fixture.course)
        .await
        .unwrap();
    assert_close(outcome.instance_question.points, 2.0);
    assert_close(outcome.instance_question.score_perc, 20.0);
    assert_close(outcome.assessment_instance.points, 3.0);
    assert_close(outcome.assessment_instance.score_perc, 20.0);

    // run of correct answers: q1 earns 1, 2, then caps at 5; q2 earns 4 then caps at 10
    let expected = [
        (iq1, 2.0, 4.0),
        (iq1, 4.0, 6.0),
        (iq1, 5.0, 7.0),
        (iq2, 6.0, 11.0),
        (iq2, 10.0, 15.0),
    ];
    for (iq, iq_points, ai_points) in expected {
        let outcome = if iq == iq1 {
            engine
                .submit_answer(iq1, v1.variant_id, &right1, &q1, &fixture.course)
                .await
                .unwrap()
        } else {
            engine
                .submit_answer(iq2, v2.variant_id, &right2, &q2, &fixture.course)
                .await
                .unwrap()
        };
        assert_close(outcome.instance_question.points, iq_points);
        assert_close(outcome.assessment_instance.points, ai_points);
    }

    // more correct answers beyond the max do not overflow
    for _ in 0..2 {
        let outcome = engine
            .submit_answer(iq1, v1.variant_id, &right1, &q1, &fixture.course)
            .await
            .unwrap();
        assert_close(outcome.instance_question.points, 5.0);
        let outcome = engine
            .submit_answer(iq2, v2.variant_id, &right2, &q2, &fixture.course)
            .await
            .unwrap();
        assert_close(outcome.instance_question.points, 10.0);
        assert_close(outcome.assessment_instance.points, 15.0);
        assert_close(outcome.assessment_instance.score_perc, 100.0);
    }

    let store = engine.store();
    assert_eq!(store.list_submissions(iq1).unwrap().len(), 7);
    assert_eq!(store.list_submissions(iq2).unwrap().len(), 5);
    let stored = store.read_assessment_instance(ai.id).unwrap().unwrap();
    assert_close(stored.points, 15.0);
}

#[tokio::test]
async fn test_same_seed_yields_same_variant() {
    let fixture = CourseFixture::new();
    let q1 = fixture.add_question(
        "addVectors",
        Q1_ID,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let engine = engine();

    let a = engine.generate_variant(&q1, &fixture.course, "42").await.unwrap();
    let b = engine.generate_variant(&q1, &fixture.course, "42").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.variant_seed, "42");
    assert_eq!(
        a.true_answer["wx"].as_i64().unwrap(),
        a.params["ux"].as_i64().unwrap() + a.params["vx"].as_i64().unwrap()
    );
}

#[tokio::test]
async fn test_render_includes_graded_submissions() {
    let fixture = CourseFixture::new();
    let q1 = fixture.add_question(
        "addVectors",
        Q1_ID,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let engine = engine();
    let variant = engine.generate_variant(&q1, &fixture.course, "7").await.unwrap();

    let graded = engine
        .grade_submission(
            &Submission::new(variant.true_answer.clone()),
            &variant,
            &q1,
            &fixture.course,
        )
        .await
        .unwrap();
    assert_eq!(graded.score, 1.0);

    let rendered = engine
        .render_variant(
            &variant,
            &q1,
            &[graded],
            &fixture.course,
            qengine::RenderSelection::default(),
        )
        .await
        .unwrap();
    assert_eq!(rendered.submission_htmls.len(), 1);
    assert!(rendered.submission_htmls[0].contains("100%"));
    assert!(rendered
        .answer_html
        .contains(&variant.true_answer["wx"].to_string()));
}

#[tokio::test]
async fn test_submit_against_foreign_variant_is_rejected() {
    let fixture = CourseFixture::new();
    let q1 = fixture.add_question(
        "addVectors",
        Q1_ID,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let engine = engine();
    let (_, iqs) = engine
        .start_assessment(
            ScoringMode::Homework,
            &[
                QuestionSlot {
                    question_id: Q1_ID,
                    init_points: 1.0,
                    max_points: 5.0,
                },
                QuestionSlot {
                    question_id: Q1_ID,
                    init_points: 1.0,
                    max_points: 5.0,
                },
            ],
        )
        .unwrap();
    let variant = engine
        .create_variant(iqs[0].id, &q1, &fixture.course, None)
        .await
        .unwrap();

    let result = engine
        .submit_answer(
            iqs[1].id,
            variant.variant_id,
            &Submission::new(variant.variant.true_answer.clone()),
            &q1,
            &fixture.course,
        )
        .await;
    assert!(matches!(result, Err(qengine::EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_submit_with_mismatched_question_is_rejected() {
    let fixture = CourseFixture::new();
    let q1 = fixture.add_question(
        "addVectors",
        Q1_ID,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let q2 = fixture.add_question(
        "fossilFuelsRadio",
        Q2_ID,
        FOSSIL_FUELS_INFO,
        Some(("server.toml", FOSSIL_FUELS_RADIO)),
    );
    let engine = engine();
    let (ai, iqs) = engine
        .start_assessment(
            ScoringMode::Homework,
            &[QuestionSlot {
                question_id: Q1_ID,
                init_points: 1.0,
                max_points: 5.0,
            }],
        )
        .unwrap();
    let variant = engine
        .create_variant(iqs[0].id, &q1, &fixture.course, None)
        .await
        .unwrap();

    // right instance question and variant, wrong question module
    let result = engine
        .submit_answer(
            iqs[0].id,
            variant.variant_id,
            &Submission::new(variant.variant.true_answer.clone()),
            &q2,
            &fixture.course,
        )
        .await;
    assert!(matches!(result, Err(qengine::EngineError::NotFound(_))));

    let store = engine.store();
    assert!(store.list_submissions(iqs[0].id).unwrap().is_empty());
    assert_eq!(store.read_assessment_instance(ai.id).unwrap().unwrap().points, 0.0);
}
