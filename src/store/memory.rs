//! In-memory score store for tests and embedding hosts.

use crate::error::StorageError;
use crate::model::{AssessmentInstance, InstanceQuestion, SubmissionRecord, VariantRecord};
use crate::store::{GradingCommit, ScoreStore};
use crate::types::{AssessmentInstanceId, InstanceQuestionId, SubmissionId, VariantId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct State {
    instance_questions: HashMap<InstanceQuestionId, InstanceQuestion>,
    assessment_instances: HashMap<AssessmentInstanceId, AssessmentInstance>,
    variants: HashMap<VariantId, VariantRecord>,
    submissions: BTreeMap<(InstanceQuestionId, SubmissionId), SubmissionRecord>,
    halted: HashMap<InstanceQuestionId, String>,
}

pub struct MemoryScoreStore {
    state: RwLock<State>,
    next_id: AtomicU64,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryScoreStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn read_instance_question(
        &self,
        id: InstanceQuestionId,
    ) -> Result<Option<InstanceQuestion>, StorageError> {
        Ok(self.state.read().instance_questions.get(&id).cloned())
    }

    fn write_instance_question(&self, iq: &InstanceQuestion) -> Result<(), StorageError> {
        self.state
            .write()
            .instance_questions
            .insert(iq.id, iq.clone());
        Ok(())
    }

    fn read_assessment_instance(
        &self,
        id: AssessmentInstanceId,
    ) -> Result<Option<AssessmentInstance>, StorageError> {
        Ok(self.state.read().assessment_instances.get(&id).cloned())
    }

    fn write_assessment_instance(&self, ai: &AssessmentInstance) -> Result<(), StorageError> {
        self.state
            .write()
            .assessment_instances
            .insert(ai.id, ai.clone());
        Ok(())
    }

    fn insert_variant(&self, record: &VariantRecord) -> Result<(), StorageError> {
        self.state
            .write()
            .variants
            .insert(record.variant_id, record.clone());
        Ok(())
    }

    fn read_variant(&self, id: VariantId) -> Result<Option<VariantRecord>, StorageError> {
        Ok(self.state.read().variants.get(&id).cloned())
    }

    fn append_submission(&self, record: &SubmissionRecord) -> Result<(), StorageError> {
        self.state.write().submissions.insert(
            (record.instance_question_id, record.submission_id),
            record.clone(),
        );
        Ok(())
    }

    fn list_submissions(
        &self,
        instance_question_id: InstanceQuestionId,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        let state = self.state.read();
        Ok(state
            .submissions
            .range((instance_question_id, 0)..=(instance_question_id, SubmissionId::MAX))
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn commit_grading(&self, commit: &GradingCommit) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.submissions.insert(
            (
                commit.submission.instance_question_id,
                commit.submission.submission_id,
            ),
            commit.submission.clone(),
        );
        state
            .instance_questions
            .insert(commit.instance_question.id, commit.instance_question.clone());
        state
            .assessment_instances
            .insert(commit.assessment_instance.id, commit.assessment_instance.clone());
        Ok(())
    }

    fn commit_scores(
        &self,
        iq: &InstanceQuestion,
        ai: &AssessmentInstance,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.instance_questions.insert(iq.id, iq.clone());
        state.assessment_instances.insert(ai.id, ai.clone());
        Ok(())
    }

    fn halt_instance_question(
        &self,
        id: InstanceQuestionId,
        reason: &str,
    ) -> Result<(), StorageError> {
        self.state.write().halted.insert(id, reason.to_string());
        Ok(())
    }

    fn halt_reason(&self, id: InstanceQuestionId) -> Result<Option<String>, StorageError> {
        Ok(self.state.read().halted.get(&id).cloned())
    }

    fn clear_halt(&self, id: InstanceQuestionId) -> Result<(), StorageError> {
        self.state.write().halted.remove(&id);
        Ok(())
    }

    fn next_id(&self) -> Result<u64, StorageError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}
