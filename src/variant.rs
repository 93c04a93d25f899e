//! Variant manager: seed selection, generation and preparation.

use crate::error::{EngineError, ErrorContext};
use crate::executor::PhaseExecutor;
use crate::loader::LoadedModule;
use crate::model::{Course, Question, Variant};
use rand::Rng;
use serde_json::Value;
use tracing::debug;

/// Upper bound (inclusive) for generated seeds.
const MAX_SEED: u64 = 1_000_000_000;

#[derive(Debug, Clone, Default)]
pub struct VariantManager {
    executor: PhaseExecutor,
}

impl VariantManager {
    pub fn new(executor: PhaseExecutor) -> Self {
        Self { executor }
    }

    /// A new random seed. The only host randomness that reaches a variant.
    pub fn fresh_seed() -> String {
        rand::thread_rng().gen_range(1..=MAX_SEED).to_string()
    }

    fn context(question: &Question, course: &Course, seed: &str) -> ErrorContext {
        ErrorContext {
            course_id: Some(course.id),
            question_id: Some(question.id),
            qid: Some(question.qid.clone()),
            variant_seed: Some(seed.to_string()),
            ..Default::default()
        }
    }

    /// Run generate for `seed`. Options fall back to the question's options.
    pub async fn generate(
        &self,
        loaded: &LoadedModule,
        question: &Question,
        course: &Course,
        seed: &str,
    ) -> Result<Variant, EngineError> {
        let question_options = Value::Object(question.options.clone());
        let output = self
            .executor
            .generate(
                loaded,
                seed,
                question_options.clone(),
                Self::context(question, course, seed),
            )
            .await
            .map_err(|e| EngineError::Generation {
                qid: question.qid.clone(),
                source: Box::new(e.into()),
            })?;

        debug!(qid = %question.qid, variant_seed = seed, "Generated variant");
        Ok(Variant {
            question_id: question.id,
            variant_seed: seed.to_string(),
            params: output.params,
            true_answer: output.true_answer,
            options: output.options.unwrap_or(question_options),
        })
    }

    pub async fn prepare(
        &self,
        loaded: &LoadedModule,
        question: &Question,
        course: &Course,
        variant: Variant,
    ) -> Result<Variant, EngineError> {
        let context = Self::context(question, course, &variant.variant_seed);
        self.executor
            .prepare(loaded, variant, context)
            .await
            .map_err(|e| EngineError::Generation {
                qid: question.qid.clone(),
                source: Box::new(e.into()),
            })
    }
}
