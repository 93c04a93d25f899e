//! Scoring aggregator
//!
//! Instance question points are a pure fold over the ordered submission
//! history, recomputed on every grading event rather than updated in place.
//! The assessment instance total is the sum of its children. Any divergence
//! between the recomputed and the stored state halts further scoring writes
//! for the instance question until an operator clears it.

use crate::concurrency::InstanceLockManager;
use crate::error::{EngineError, StorageError};
use crate::model::{
    AssessmentInstance, GradedSubmission, InstanceQuestion, ScoringMode, SubmissionRecord,
};
use crate::store::{GradingCommit, ScoreStore};
use crate::types::{InstanceQuestionId, SubmissionId, VariantId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Slack for floating point comparisons between stored and recomputed points.
const POINTS_EPSILON: f64 = 1e-9;

fn percent(points: f64, max_points: f64) -> f64 {
    if max_points > 0.0 {
        points / max_points * 100.0
    } else {
        0.0
    }
}

/// Recompute an instance question's scores from its full history.
///
/// Identity and point limits come from `iq`; everything derived is rebuilt
/// from scratch. Non-gradable submissions are skipped.
pub fn fold_instance_question<'a, I>(iq: &InstanceQuestion, history: I, mode: ScoringMode) -> InstanceQuestion
where
    I: IntoIterator<Item = &'a GradedSubmission>,
{
    let mut next = InstanceQuestion::new(
        iq.id,
        iq.assessment_instance_id,
        iq.question_id,
        iq.init_points,
        iq.max_points,
    );

    for graded in history.into_iter().filter(|g| g.gradable) {
        let score = graded.score;
        next.number_attempts += 1;
        next.highest_submission_score = Some(match next.highest_submission_score {
            Some(best) => best.max(score),
            None => score,
        });

        match mode {
            ScoringMode::Homework => {
                next.points = (next.points + score * next.current_value).min(next.max_points);
                next.current_value = if score >= 1.0 {
                    (next.current_value + next.init_points).min(next.max_points)
                } else {
                    next.init_points
                };
            }
            ScoringMode::BestScore => {
                next.points = next.points.max(score * next.max_points);
            }
        }
    }

    next.score_perc = percent(next.points, next.max_points);
    next
}

/// Check a recomputed instance question against what was stored before.
pub fn check_instance_question(previous: &InstanceQuestion, next: &InstanceQuestion) -> Result<(), String> {
    if !next.points.is_finite() || !next.current_value.is_finite() {
        return Err(format!("non-finite points {} or value {}", next.points, next.current_value));
    }
    if next.points < 0.0 {
        return Err(format!("negative points {}", next.points));
    }
    if next.points > next.max_points + POINTS_EPSILON {
        return Err(format!(
            "points {} exceed max points {}",
            next.points, next.max_points
        ));
    }
    if next.points + POINTS_EPSILON < previous.points {
        return Err(format!(
            "points would drop from {} to {}",
            previous.points, next.points
        ));
    }
    Ok(())
}

/// Recompute an assessment instance total from its children.
pub fn recompute_assessment(
    ai: &AssessmentInstance,
    children: &[InstanceQuestion],
) -> Result<AssessmentInstance, String> {
    let mut points = 0.0;
    for child in children {
        if child.assessment_instance_id != ai.id || !ai.instance_question_ids.contains(&child.id) {
            return Err(format!(
                "instance question {} does not belong to assessment instance {}",
                child.id, ai.id
            ));
        }
        points += child.points;
    }
    if !points.is_finite() || points > ai.max_points + POINTS_EPSILON {
        return Err(format!(
            "total points {} exceed assessment max points {}",
            points, ai.max_points
        ));
    }
    Ok(AssessmentInstance {
        points,
        score_perc: percent(points, ai.max_points),
        ..ai.clone()
    })
}

/// Result of recording one graded submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringOutcome {
    pub submission: SubmissionRecord,
    pub instance_question: InstanceQuestion,
    pub assessment_instance: AssessmentInstance,
}

/// Serializes scoring writes and commits them through the store.
pub struct ScoringService {
    store: Arc<dyn ScoreStore>,
    locks: InstanceLockManager,
}

impl ScoringService {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self {
            store,
            locks: InstanceLockManager::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ScoreStore> {
        &self.store
    }

    /// Append a graded submission and rescore its instance question and
    /// assessment instance in one commit.
    ///
    /// The new record always gets a fresh store-issued id. `regrade_of` names
    /// an existing record of this instance question that the new grading
    /// result regrades; the earlier record is left untouched.
    pub async fn record_submission(
        &self,
        instance_question_id: InstanceQuestionId,
        variant_id: VariantId,
        regrade_of: Option<SubmissionId>,
        graded: GradedSubmission,
    ) -> Result<ScoringOutcome, EngineError> {
        let outcome = self
            .record_submission_locked(instance_question_id, variant_id, regrade_of, graded)
            .await;
        self.locks.prune();
        outcome
    }

    async fn record_submission_locked(
        &self,
        instance_question_id: InstanceQuestionId,
        variant_id: VariantId,
        regrade_of: Option<SubmissionId>,
        graded: GradedSubmission,
    ) -> Result<ScoringOutcome, EngineError> {
        let _iq_guard = self.locks.lock_instance_question(instance_question_id).await;

        if let Some(reason) = self.store.halt_reason(instance_question_id)? {
            return Err(EngineError::AggregationConsistency {
                instance_question_id,
                detail: format!("scoring halted: {}", reason),
            });
        }

        let iq = self
            .store
            .read_instance_question(instance_question_id)?
            .ok_or(StorageError::InstanceQuestionNotFound(instance_question_id))?;
        let mode = self
            .store
            .read_assessment_instance(iq.assessment_instance_id)?
            .ok_or(StorageError::AssessmentInstanceNotFound(iq.assessment_instance_id))?
            .scoring_mode;

        let history = self.store.list_submissions(instance_question_id)?;
        if let Some(submission_id) = regrade_of {
            if !history.iter().any(|r| r.submission_id == submission_id) {
                return Err(StorageError::SubmissionNotFound {
                    instance_question_id,
                    submission_id,
                }
                .into());
            }
        }

        let submission = SubmissionRecord {
            submission_id: self.store.next_id()?,
            regrade_of,
            variant_id,
            instance_question_id,
            graded,
            created_at: Utc::now(),
        };
        let next = fold_instance_question(
            &iq,
            history
                .iter()
                .map(|r| &r.graded)
                .chain(std::iter::once(&submission.graded)),
            mode,
        );
        if let Err(detail) = check_instance_question(&iq, &next) {
            return Err(self.halt(instance_question_id, detail)?);
        }

        let _ai_guard = self.locks.lock_assessment_instance(iq.assessment_instance_id).await;
        let ai = self
            .store
            .read_assessment_instance(iq.assessment_instance_id)?
            .ok_or(StorageError::AssessmentInstanceNotFound(iq.assessment_instance_id))?;
        let children = self
            .store
            .list_instance_questions(ai.id)?
            .into_iter()
            .map(|child| if child.id == next.id { next.clone() } else { child })
            .collect::<Vec<_>>();
        let ai = match recompute_assessment(&ai, &children) {
            Ok(ai) => ai,
            Err(detail) => return Err(self.halt(instance_question_id, detail)?),
        };

        let commit = GradingCommit {
            submission,
            instance_question: next,
            assessment_instance: ai,
        };
        self.store.commit_grading(&commit)?;

        info!(
            instance_question_id,
            submission_id = commit.submission.submission_id,
            regrade_of = ?commit.submission.regrade_of,
            score = commit.submission.graded.score,
            points = commit.instance_question.points,
            assessment_points = commit.assessment_instance.points,
            "Recorded submission"
        );

        Ok(ScoringOutcome {
            submission: commit.submission,
            instance_question: commit.instance_question,
            assessment_instance: commit.assessment_instance,
        })
    }

    /// Recompute an instance question from stored history and write it back
    /// together with its assessment instance total. Used after an operator
    /// repairs history and clears a halt.
    pub async fn rescore_instance_question(
        &self,
        instance_question_id: InstanceQuestionId,
    ) -> Result<(InstanceQuestion, AssessmentInstance), EngineError> {
        let rescored = self.rescore_locked(instance_question_id).await;
        self.locks.prune();
        rescored
    }

    async fn rescore_locked(
        &self,
        instance_question_id: InstanceQuestionId,
    ) -> Result<(InstanceQuestion, AssessmentInstance), EngineError> {
        let _iq_guard = self.locks.lock_instance_question(instance_question_id).await;
        let iq = self
            .store
            .read_instance_question(instance_question_id)?
            .ok_or(StorageError::InstanceQuestionNotFound(instance_question_id))?;

        let _ai_guard = self.locks.lock_assessment_instance(iq.assessment_instance_id).await;
        let ai = self
            .store
            .read_assessment_instance(iq.assessment_instance_id)?
            .ok_or(StorageError::AssessmentInstanceNotFound(iq.assessment_instance_id))?;
        let history = self.store.list_submissions(instance_question_id)?;
        let next = fold_instance_question(&iq, history.iter().map(|r| &r.graded), ai.scoring_mode);

        let children = self
            .store
            .list_instance_questions(ai.id)?
            .into_iter()
            .map(|child| if child.id == next.id { next.clone() } else { child })
            .collect::<Vec<_>>();
        let ai = match recompute_assessment(&ai, &children) {
            Ok(ai) => ai,
            Err(detail) => return Err(self.halt(instance_question_id, detail)?),
        };

        self.store.commit_scores(&next, &ai)?;
        info!(
            instance_question_id,
            points = next.points,
            assessment_points = ai.points,
            "Rescored instance question"
        );
        Ok((next, ai))
    }

    pub fn clear_halt(&self, instance_question_id: InstanceQuestionId) -> Result<(), EngineError> {
        self.store.clear_halt(instance_question_id)?;
        info!(instance_question_id, "Cleared scoring halt");
        Ok(())
    }

    /// Mark the instance question halted and build the error to return.
    fn halt(&self, instance_question_id: InstanceQuestionId, detail: String) -> Result<EngineError, EngineError> {
        error!(instance_question_id, detail = %detail, "Aggregation consistency violated, halting scoring");
        self.store.halt_instance_question(instance_question_id, &detail)?;
        Ok(EngineError::AggregationConsistency {
            instance_question_id,
            detail,
        })
    }
}
