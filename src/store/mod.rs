//! Score store
//!
//! Durable home of variants, the append-only submission history and the
//! instance question / assessment instance score holders. One grading event
//! (submission + instance question + assessment instance) commits as a single
//! atomic write through [`ScoreStore::commit_grading`].

pub mod memory;
pub mod persistence;

pub use memory::MemoryScoreStore;
pub use persistence::SledScoreStore;

use crate::error::StorageError;
use crate::model::{AssessmentInstance, InstanceQuestion, SubmissionRecord, VariantRecord};
use crate::types::{AssessmentInstanceId, InstanceQuestionId, VariantId};
use serde::{Deserialize, Serialize};

/// Everything one grading event writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradingCommit {
    pub submission: SubmissionRecord,
    pub instance_question: InstanceQuestion,
    pub assessment_instance: AssessmentInstance,
}

/// Score store interface
pub trait ScoreStore: Send + Sync {
    fn read_instance_question(
        &self,
        id: InstanceQuestionId,
    ) -> Result<Option<InstanceQuestion>, StorageError>;
    fn write_instance_question(&self, iq: &InstanceQuestion) -> Result<(), StorageError>;

    fn read_assessment_instance(
        &self,
        id: AssessmentInstanceId,
    ) -> Result<Option<AssessmentInstance>, StorageError>;
    fn write_assessment_instance(&self, ai: &AssessmentInstance) -> Result<(), StorageError>;

    fn insert_variant(&self, record: &VariantRecord) -> Result<(), StorageError>;
    fn read_variant(&self, id: VariantId) -> Result<Option<VariantRecord>, StorageError>;

    /// Append a history record keyed by its `submission_id`, which must come
    /// from [`ScoreStore::next_id`] so key order is creation order.
    fn append_submission(&self, record: &SubmissionRecord) -> Result<(), StorageError>;

    /// Submission history of one instance question, oldest first.
    fn list_submissions(
        &self,
        instance_question_id: InstanceQuestionId,
    ) -> Result<Vec<SubmissionRecord>, StorageError>;

    /// Append the submission and write both score holders atomically.
    fn commit_grading(&self, commit: &GradingCommit) -> Result<(), StorageError>;

    /// Write both score holders atomically, with no history change.
    fn commit_scores(
        &self,
        iq: &InstanceQuestion,
        ai: &AssessmentInstance,
    ) -> Result<(), StorageError>;

    fn halt_instance_question(
        &self,
        id: InstanceQuestionId,
        reason: &str,
    ) -> Result<(), StorageError>;
    fn halt_reason(&self, id: InstanceQuestionId) -> Result<Option<String>, StorageError>;
    fn clear_halt(&self, id: InstanceQuestionId) -> Result<(), StorageError>;

    /// Fresh id for variants and submissions. Never zero, and strictly
    /// increasing for the lifetime of the store.
    fn next_id(&self) -> Result<u64, StorageError>;

    fn is_halted(&self, id: InstanceQuestionId) -> Result<bool, StorageError> {
        Ok(self.halt_reason(id)?.is_some())
    }

    /// Children of an assessment instance, in the instance's order.
    fn list_instance_questions(
        &self,
        assessment_instance_id: AssessmentInstanceId,
    ) -> Result<Vec<InstanceQuestion>, StorageError> {
        let ai = self
            .read_assessment_instance(assessment_instance_id)?
            .ok_or(StorageError::AssessmentInstanceNotFound(assessment_instance_id))?;
        ai.instance_question_ids
            .iter()
            .map(|id| {
                self.read_instance_question(*id)?
                    .ok_or(StorageError::InstanceQuestionNotFound(*id))
            })
            .collect()
    }
}
