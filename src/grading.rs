//! Grading pipeline: parse, grade, then finalize the stored score.

use crate::error::{EngineError, ErrorContext};
use crate::executor::PhaseExecutor;
use crate::loader::LoadedModule;
use crate::model::{Course, GradedSubmission, Question, Submission, Variant};
use crate::types::VariantId;
use serde_json::Map;
use tracing::debug;

/// Raw scores at or above this count as fully correct when partial credit is
/// off.
pub const LEGACY_ROUNDING_THRESHOLD: f64 = 0.5;

/// Stored score for a raw module score.
pub fn finalize_score(raw: f64, partial_credit: bool) -> f64 {
    if partial_credit {
        raw
    } else if raw >= LEGACY_ROUNDING_THRESHOLD {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradingPipeline {
    executor: PhaseExecutor,
}

impl GradingPipeline {
    pub fn new(executor: PhaseExecutor) -> Self {
        Self { executor }
    }

    /// Parse and grade one submission. Nothing is persisted here.
    pub async fn grade(
        &self,
        loaded: &LoadedModule,
        question: &Question,
        course: &Course,
        variant: &Variant,
        variant_id: Option<VariantId>,
        submission: &Submission,
    ) -> Result<GradedSubmission, EngineError> {
        let context = ErrorContext {
            course_id: Some(course.id),
            question_id: Some(question.id),
            qid: Some(question.qid.clone()),
            variant_id,
            variant_seed: Some(variant.variant_seed.clone()),
            submission_id: submission.id,
        };
        let wrap = |e: crate::error::PhaseExecutionError| EngineError::Grading {
            context: context.clone(),
            source: Box::new(e.into()),
        };

        let parsed = self
            .executor
            .parse(loaded, variant.clone(), submission.clone(), context.clone())
            .await
            .map_err(wrap)?;

        if !parsed.gradable {
            return Ok(GradedSubmission {
                submitted_answer: parsed.submitted_answer,
                raw_submitted_answer: parsed.raw_submitted_answer,
                score: 0.0,
                v2_score: 0.0,
                feedback: serde_json::Value::Null,
                partial_scores: Map::new(),
                format_errors: parsed.format_errors,
                gradable: false,
                params: variant.params.clone(),
                true_answer: variant.true_answer.clone(),
            });
        }

        let result = self
            .executor
            .grade(
                loaded,
                variant.clone(),
                parsed.submitted_answer.clone(),
                context.clone(),
            )
            .await
            .map_err(wrap)?;

        let score = finalize_score(result.score, question.partial_credit);
        debug!(
            qid = %question.qid,
            raw_score = result.score,
            score,
            partial_credit = question.partial_credit,
            "Graded submission"
        );

        Ok(GradedSubmission {
            submitted_answer: parsed.submitted_answer,
            raw_submitted_answer: parsed.raw_submitted_answer,
            score,
            v2_score: result.score,
            feedback: result.feedback,
            partial_scores: Map::new(),
            format_errors: parsed.format_errors,
            gradable: true,
            params: variant.params.clone(),
            true_answer: variant.true_answer.clone(),
        })
    }
}
