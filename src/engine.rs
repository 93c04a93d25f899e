//! Question engine
//!
//! The presentation-facing surface: generate, render, grade and serve files
//! for a question, plus the persisted flows that create variants and score
//! submissions into an assessment instance.

use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorContext};
use crate::executor::PhaseExecutor;
use crate::grading::GradingPipeline;
use crate::loader::{LoadedModule, ModuleLoader};
use crate::model::{
    AssessmentInstance, Course, GradedSubmission, InstanceQuestion, Question, RenderSelection,
    RenderedQuestion, ScoringMode, Submission, Variant, VariantRecord,
};
use crate::module::{CalculationDialect, ModuleDialect, NativeDialect};
use crate::scoring::{ScoringOutcome, ScoringService};
use crate::store::{MemoryScoreStore, ScoreStore, SledScoreStore};
use crate::types::{InstanceQuestionId, QuestionId, VariantId};
use crate::variant::VariantManager;
use std::sync::Arc;
use tracing::{info, instrument};

/// Points configuration for one question slot in a new assessment instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionSlot {
    pub question_id: QuestionId,
    pub init_points: f64,
    pub max_points: f64,
}

pub struct QuestionEngine {
    loader: Arc<ModuleLoader>,
    executor: PhaseExecutor,
    variants: VariantManager,
    grading: GradingPipeline,
    scoring: ScoringService,
}

impl QuestionEngine {
    pub fn new(loader: Arc<ModuleLoader>, executor: PhaseExecutor, store: Arc<dyn ScoreStore>) -> Self {
        Self {
            loader,
            variants: VariantManager::new(executor.clone()),
            grading: GradingPipeline::new(executor.clone()),
            executor,
            scoring: ScoringService::new(store),
        }
    }

    /// Build an engine over local course content from configuration.
    ///
    /// `native` supplies the host's compiled modules; it is only consulted
    /// when the `native` dialect is enabled.
    pub fn from_config(config: &EngineConfig, native: NativeDialect) -> Result<Self, EngineError> {
        let native = Arc::new(native);
        let mut dialects: Vec<Arc<dyn ModuleDialect>> = Vec::new();
        for name in &config.loader.dialects {
            match name.as_str() {
                "calculation" => dialects.push(Arc::new(CalculationDialect)),
                "native" => dialects.push(native.clone()),
                other => {
                    return Err(EngineError::ConfigError(format!(
                        "unknown module dialect: {}",
                        other
                    )))
                }
            }
        }

        let store: Arc<dyn ScoreStore> = match &config.storage.store_path {
            Some(path) => Arc::new(SledScoreStore::new(path)?),
            None => Arc::new(MemoryScoreStore::new()),
        };

        info!(
            dialects = ?config.loader.dialects,
            phase_timeout_ms = ?config.executor.phase_timeout_ms,
            "Question engine configured"
        );
        Ok(Self::new(
            Arc::new(ModuleLoader::local(dialects)),
            PhaseExecutor::new(config.executor.phase_timeout()),
            store,
        ))
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    pub fn store(&self) -> &Arc<dyn ScoreStore> {
        self.scoring.store()
    }

    async fn load_for(
        &self,
        question: &Question,
        course: &Course,
    ) -> Result<LoadedModule, EngineError> {
        Ok(self.loader.load(question, course).await?)
    }

    /// Generate and prepare the variant for `seed`.
    #[instrument(skip_all, fields(qid = %question.qid, course_id = course.id))]
    pub async fn generate_variant(
        &self,
        question: &Question,
        course: &Course,
        seed: &str,
    ) -> Result<Variant, EngineError> {
        let loaded = self
            .load_for(question, course)
            .await
            .map_err(|e| EngineError::Generation {
                qid: question.qid.clone(),
                source: Box::new(e),
            })?;
        let variant = self.variants.generate(&loaded, question, course, seed).await?;
        self.variants.prepare(&loaded, question, course, variant).await
    }

    #[instrument(skip_all, fields(qid = %question.qid, course_id = course.id))]
    pub async fn render_variant(
        &self,
        variant: &Variant,
        question: &Question,
        submissions: &[GradedSubmission],
        course: &Course,
        selection: RenderSelection,
    ) -> Result<RenderedQuestion, EngineError> {
        let wrap = |e: EngineError| EngineError::Render {
            qid: question.qid.clone(),
            source: Box::new(e),
        };
        let loaded = self.load_for(question, course).await.map_err(wrap)?;
        let context = ErrorContext {
            course_id: Some(course.id),
            question_id: Some(question.id),
            qid: Some(question.qid.clone()),
            variant_seed: Some(variant.variant_seed.clone()),
            ..Default::default()
        };
        self.executor
            .render(&loaded, variant.clone(), submissions.to_vec(), selection, context)
            .await
            .map_err(|e| wrap(e.into()))
    }

    #[instrument(skip_all, fields(qid = %question.qid, course_id = course.id))]
    pub async fn grade_submission(
        &self,
        submission: &Submission,
        variant: &Variant,
        question: &Question,
        course: &Course,
    ) -> Result<GradedSubmission, EngineError> {
        self.grade_inner(submission, variant, None, question, course).await
    }

    async fn grade_inner(
        &self,
        submission: &Submission,
        variant: &Variant,
        variant_id: Option<VariantId>,
        question: &Question,
        course: &Course,
    ) -> Result<GradedSubmission, EngineError> {
        let loaded = self
            .load_for(question, course)
            .await
            .map_err(|e| EngineError::Grading {
                context: ErrorContext {
                    course_id: Some(course.id),
                    question_id: Some(question.id),
                    qid: Some(question.qid.clone()),
                    variant_id,
                    variant_seed: Some(variant.variant_seed.clone()),
                    submission_id: submission.id,
                },
                source: Box::new(e),
            })?;
        self.grading
            .grade(&loaded, question, course, variant, variant_id, submission)
            .await
    }

    #[instrument(skip_all, fields(qid = %question.qid, filename = %filename))]
    pub async fn get_auxiliary_file(
        &self,
        filename: &str,
        variant: &Variant,
        question: &Question,
        course: &Course,
    ) -> Result<Vec<u8>, EngineError> {
        let wrap = |e: EngineError| EngineError::File {
            filename: filename.to_string(),
            qid: question.qid.clone(),
            source: Box::new(e),
        };
        let loaded = self.load_for(question, course).await.map_err(wrap)?;
        let context = ErrorContext {
            course_id: Some(course.id),
            question_id: Some(question.id),
            qid: Some(question.qid.clone()),
            variant_seed: Some(variant.variant_seed.clone()),
            ..Default::default()
        };
        self.executor
            .file(&loaded, filename, variant.clone(), context)
            .await
            .map_err(|e| wrap(e.into()))
    }

    /// Persist a new assessment instance with one instance question per slot.
    /// Assessment max points are the sum of the slots' max points.
    pub fn start_assessment(
        &self,
        scoring_mode: ScoringMode,
        slots: &[QuestionSlot],
    ) -> Result<(AssessmentInstance, Vec<InstanceQuestion>), EngineError> {
        let store = self.store();
        let max_points = slots.iter().map(|s| s.max_points).sum();
        let mut ai = AssessmentInstance::new(store.next_id()?, scoring_mode, max_points);
        let mut iqs = Vec::with_capacity(slots.len());
        for slot in slots {
            let iq = InstanceQuestion::new(
                store.next_id()?,
                ai.id,
                slot.question_id,
                slot.init_points,
                slot.max_points,
            );
            store.write_instance_question(&iq)?;
            ai.instance_question_ids.push(iq.id);
            iqs.push(iq);
        }
        store.write_assessment_instance(&ai)?;
        Ok((ai, iqs))
    }

    /// Generate a variant for an instance question and persist it.
    pub async fn create_variant(
        &self,
        instance_question_id: InstanceQuestionId,
        question: &Question,
        course: &Course,
        seed: Option<String>,
    ) -> Result<VariantRecord, EngineError> {
        let iq = self
            .store()
            .read_instance_question(instance_question_id)?
            .ok_or_else(|| {
                EngineError::NotFound(format!("instance question {}", instance_question_id))
            })?;
        if iq.question_id != question.id {
            return Err(EngineError::NotFound(format!(
                "question {} in instance question {}",
                question.id, instance_question_id
            )));
        }

        let seed = seed.unwrap_or_else(VariantManager::fresh_seed);
        let variant = self.generate_variant(question, course, &seed).await?;
        let record = VariantRecord {
            variant_id: self.store().next_id()?,
            instance_question_id,
            variant,
        };
        self.store().insert_variant(&record)?;
        info!(
            instance_question_id,
            variant_id = record.variant_id,
            variant_seed = %seed,
            "Created variant"
        );
        Ok(record)
    }

    /// Grade a submission against a stored variant and score it.
    ///
    /// Grading runs before any scoring lock is taken; a grading failure
    /// persists nothing.
    pub async fn submit_answer(
        &self,
        instance_question_id: InstanceQuestionId,
        variant_id: VariantId,
        submission: &Submission,
        question: &Question,
        course: &Course,
    ) -> Result<ScoringOutcome, EngineError> {
        let iq = self
            .store()
            .read_instance_question(instance_question_id)?
            .ok_or_else(|| {
                EngineError::NotFound(format!("instance question {}", instance_question_id))
            })?;
        if iq.question_id != question.id {
            return Err(EngineError::NotFound(format!(
                "question {} in instance question {}",
                question.id, instance_question_id
            )));
        }
        let record = self
            .store()
            .read_variant(variant_id)?
            .filter(|r| {
                r.instance_question_id == instance_question_id
                    && r.variant.question_id == question.id
            })
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "variant {} for instance question {}",
                    variant_id, instance_question_id
                ))
            })?;

        let graded = self
            .grade_inner(submission, &record.variant, Some(variant_id), question, course)
            .await?;
        self.scoring
            .record_submission(instance_question_id, variant_id, submission.id, graded)
            .await
    }

    pub async fn rescore_instance_question(
        &self,
        instance_question_id: InstanceQuestionId,
    ) -> Result<(InstanceQuestion, AssessmentInstance), EngineError> {
        self.scoring.rescore_instance_question(instance_question_id).await
    }

    pub fn clear_halt(&self, instance_question_id: InstanceQuestionId) -> Result<(), EngineError> {
        self.scoring.clear_halt(instance_question_id)
    }
}
