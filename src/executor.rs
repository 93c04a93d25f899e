//! Phase executor
//!
//! Invokes one lifecycle phase of a loaded question module. Module calls run
//! on tokio's blocking pool under `catch_unwind`, optionally bounded by a
//! timeout. Every JSON value crossing the boundary is normalized through a
//! serialize/parse round trip so callers never share structure with module
//! state. Failures come back as [`PhaseExecutionError`] carrying the phase and
//! the course/question/variant/submission context.

use crate::error::{ErrorContext, ModuleFault, PhaseExecutionError, PhaseFailure};
use crate::loader::LoadedModule;
use crate::model::{GradedSubmission, ParsedSubmission, RenderSelection, RenderedQuestion, Submission, Variant};
use crate::module::QuestionModule;
use crate::sandbox::ExecutionContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lifecycle phases of a question module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Generate,
    Prepare,
    Render,
    Parse,
    Grade,
    File,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Generate => "generate",
            Phase::Prepare => "prepare",
            Phase::Render => "render",
            Phase::Parse => "parse",
            Phase::Grade => "grade",
            Phase::File => "file",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments for one phase invocation.
#[derive(Debug, Clone)]
pub enum PhaseCall {
    Generate {
        variant_seed: String,
        options: Value,
    },
    Prepare {
        variant: Variant,
    },
    Render {
        variant: Variant,
        submissions: Vec<GradedSubmission>,
        selection: RenderSelection,
    },
    Parse {
        variant: Variant,
        submission: Submission,
    },
    Grade {
        variant: Variant,
        submitted_answer: Value,
    },
    File {
        filename: String,
        variant: Variant,
    },
}

impl PhaseCall {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseCall::Generate { .. } => Phase::Generate,
            PhaseCall::Prepare { .. } => Phase::Prepare,
            PhaseCall::Render { .. } => Phase::Render,
            PhaseCall::Parse { .. } => Phase::Parse,
            PhaseCall::Grade { .. } => Phase::Grade,
            PhaseCall::File { .. } => Phase::File,
        }
    }
}

/// Normalized generate output. `options` stays optional so the caller can
/// apply its fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedOutput {
    pub params: Value,
    pub true_answer: Value,
    pub options: Option<Value>,
}

/// Normalized grade output.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeResult {
    pub score: f64,
    pub feedback: Value,
}

/// Result of one phase invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutput {
    Generated(GeneratedOutput),
    Prepared(Variant),
    Rendered(RenderedQuestion),
    Parsed(ParsedSubmission),
    Graded(GradeResult),
    File(Vec<u8>),
}

/// Serialize then parse a value; absent becomes `null`.
pub fn json_round_trip(value: Option<&Value>) -> Result<Value, PhaseFailure> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };
    let encoded =
        serde_json::to_string(value).map_err(|e| PhaseFailure::Normalization(e.to_string()))?;
    serde_json::from_str(&encoded).map_err(|e| PhaseFailure::Normalization(e.to_string()))
}

fn round_trip_variant(variant: &Variant) -> Result<Variant, PhaseFailure> {
    Ok(Variant {
        question_id: variant.question_id,
        variant_seed: variant.variant_seed.clone(),
        params: json_round_trip(Some(&variant.params))?,
        true_answer: json_round_trip(Some(&variant.true_answer))?,
        options: json_round_trip(Some(&variant.options))?,
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs module phases with panic isolation and an optional time bound.
#[derive(Debug, Clone, Default)]
pub struct PhaseExecutor {
    timeout: Option<Duration>,
}

impl PhaseExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Invoke one phase on a loaded module.
    pub async fn invoke(
        &self,
        loaded: &LoadedModule,
        call: PhaseCall,
        context: ErrorContext,
    ) -> Result<PhaseOutput, PhaseExecutionError> {
        let phase = call.phase();
        let started = Instant::now();
        debug!(phase = %phase, context = %context, "Invoking module phase");

        let result = self.dispatch(loaded, call).await;
        match result {
            Ok(output) => {
                debug!(
                    phase = %phase,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Module phase completed"
                );
                Ok(output)
            }
            Err(cause) => {
                warn!(phase = %phase, context = %context, error = %cause, "Module phase failed");
                Err(PhaseExecutionError {
                    phase,
                    context,
                    cause,
                })
            }
        }
    }

    async fn dispatch(&self, loaded: &LoadedModule, call: PhaseCall) -> Result<PhaseOutput, PhaseFailure> {
        match call {
            PhaseCall::Generate {
                variant_seed,
                options,
            } => {
                let options = json_round_trip(Some(&options))?;
                let data = self
                    .run(loaded, move |module, ctx| module.get_data(&variant_seed, &options, ctx))
                    .await?;
                Ok(PhaseOutput::Generated(GeneratedOutput {
                    params: json_round_trip(data.params.as_ref())?,
                    true_answer: json_round_trip(data.true_answer.as_ref())?,
                    options: match data.options {
                        Some(options) => Some(json_round_trip(Some(&options))?),
                        None => None,
                    },
                }))
            }
            PhaseCall::Prepare { variant } => Ok(PhaseOutput::Prepared(round_trip_variant(&variant)?)),
            PhaseCall::Render {
                variant,
                submissions,
                selection,
            } => {
                let variant = round_trip_variant(&variant)?;
                let expected = submissions.len();
                let rendered = self
                    .run(loaded, move |module, ctx| {
                        module
                            .render(&variant, &submissions, selection, ctx)
                            .transpose()
                    })
                    .await?;
                let rendered = rendered.unwrap_or_else(|| RenderedQuestion {
                    submission_htmls: vec![String::new(); expected],
                    ..Default::default()
                });
                if rendered.submission_htmls.len() != expected {
                    return Err(PhaseFailure::InvalidOutput(format!(
                        "render produced {} submission fragments for {} submissions",
                        rendered.submission_htmls.len(),
                        expected
                    )));
                }
                Ok(PhaseOutput::Rendered(rendered))
            }
            PhaseCall::Parse { submission, .. } => Ok(PhaseOutput::Parsed(ParsedSubmission {
                submitted_answer: json_round_trip(Some(&submission.submitted_answer))?,
                raw_submitted_answer: json_round_trip(Some(&submission.raw_submitted_answer))?,
                format_errors: Map::new(),
                gradable: true,
            })),
            PhaseCall::Grade {
                variant,
                submitted_answer,
            } => {
                let variant = round_trip_variant(&variant)?;
                let submitted_answer = json_round_trip(Some(&submitted_answer))?;
                let outcome = self
                    .run(loaded, move |module, ctx| {
                        module.grade_answer(&variant, &submitted_answer, ctx)
                    })
                    .await?;
                if !outcome.score.is_finite() || !(0.0..=1.0).contains(&outcome.score) {
                    return Err(PhaseFailure::InvalidOutput(format!(
                        "score {} is not in [0, 1]",
                        outcome.score
                    )));
                }
                Ok(PhaseOutput::Graded(GradeResult {
                    score: outcome.score,
                    feedback: json_round_trip(outcome.feedback.as_ref())?,
                }))
            }
            PhaseCall::File { filename, variant } => {
                let variant = round_trip_variant(&variant)?;
                let bytes = self
                    .run(loaded, move |module, ctx| module.get_file(&filename, &variant, ctx))
                    .await?;
                Ok(PhaseOutput::File(bytes))
            }
        }
    }

    /// Run module code on the blocking pool, catching panics.
    async fn run<T, F>(&self, loaded: &LoadedModule, f: F) -> Result<T, PhaseFailure>
    where
        T: Send + 'static,
        F: FnOnce(&dyn QuestionModule, &ExecutionContext) -> Result<T, ModuleFault> + Send + 'static,
    {
        let module: Arc<dyn QuestionModule> = Arc::clone(&loaded.module);
        let ctx = loaded.context.clone();
        let task = tokio::task::spawn_blocking(move || {
            catch_unwind(AssertUnwindSafe(|| f(module.as_ref(), &ctx)))
        });

        let joined = match self.timeout {
            // the blocking thread keeps running; its result is dropped
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| PhaseFailure::Timeout(limit))?,
            None => task.await,
        };

        match joined {
            Ok(Ok(result)) => result.map_err(PhaseFailure::Module),
            Ok(Err(payload)) => Err(PhaseFailure::Panic(panic_message(payload))),
            Err(join_error) => Err(PhaseFailure::Panic(join_error.to_string())),
        }
    }

    pub async fn generate(
        &self,
        loaded: &LoadedModule,
        variant_seed: &str,
        options: Value,
        context: ErrorContext,
    ) -> Result<GeneratedOutput, PhaseExecutionError> {
        let call = PhaseCall::Generate {
            variant_seed: variant_seed.to_string(),
            options,
        };
        match self.invoke(loaded, call, context.clone()).await? {
            PhaseOutput::Generated(output) => Ok(output),
            other => Err(unexpected(Phase::Generate, context, &other)),
        }
    }

    pub async fn prepare(
        &self,
        loaded: &LoadedModule,
        variant: Variant,
        context: ErrorContext,
    ) -> Result<Variant, PhaseExecutionError> {
        match self.invoke(loaded, PhaseCall::Prepare { variant }, context.clone()).await? {
            PhaseOutput::Prepared(variant) => Ok(variant),
            other => Err(unexpected(Phase::Prepare, context, &other)),
        }
    }

    pub async fn render(
        &self,
        loaded: &LoadedModule,
        variant: Variant,
        submissions: Vec<GradedSubmission>,
        selection: RenderSelection,
        context: ErrorContext,
    ) -> Result<RenderedQuestion, PhaseExecutionError> {
        let call = PhaseCall::Render {
            variant,
            submissions,
            selection,
        };
        match self.invoke(loaded, call, context.clone()).await? {
            PhaseOutput::Rendered(rendered) => Ok(rendered),
            other => Err(unexpected(Phase::Render, context, &other)),
        }
    }

    pub async fn parse(
        &self,
        loaded: &LoadedModule,
        variant: Variant,
        submission: Submission,
        context: ErrorContext,
    ) -> Result<ParsedSubmission, PhaseExecutionError> {
        let call = PhaseCall::Parse {
            variant,
            submission,
        };
        match self.invoke(loaded, call, context.clone()).await? {
            PhaseOutput::Parsed(parsed) => Ok(parsed),
            other => Err(unexpected(Phase::Parse, context, &other)),
        }
    }

    pub async fn grade(
        &self,
        loaded: &LoadedModule,
        variant: Variant,
        submitted_answer: Value,
        context: ErrorContext,
    ) -> Result<GradeResult, PhaseExecutionError> {
        let call = PhaseCall::Grade {
            variant,
            submitted_answer,
        };
        match self.invoke(loaded, call, context.clone()).await? {
            PhaseOutput::Graded(result) => Ok(result),
            other => Err(unexpected(Phase::Grade, context, &other)),
        }
    }

    pub async fn file(
        &self,
        loaded: &LoadedModule,
        filename: &str,
        variant: Variant,
        context: ErrorContext,
    ) -> Result<Vec<u8>, PhaseExecutionError> {
        let call = PhaseCall::File {
            filename: filename.to_string(),
            variant,
        };
        match self.invoke(loaded, call, context.clone()).await? {
            PhaseOutput::File(bytes) => Ok(bytes),
            other => Err(unexpected(Phase::File, context, &other)),
        }
    }
}

fn unexpected(phase: Phase, context: ErrorContext, output: &PhaseOutput) -> PhaseExecutionError {
    PhaseExecutionError {
        phase,
        context,
        cause: PhaseFailure::InvalidOutput(format!("unexpected output {:?}", output)),
    }
}
