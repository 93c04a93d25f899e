//! CLI route: run context and the single route table.

use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, EngineConfig};
use crate::content::load_question;
use crate::engine::QuestionEngine;
use crate::error::{EngineError, StorageError};
use crate::model::{Course, Question, RenderSelection, Submission, Variant};
use crate::module::NativeDialect;
use crate::types::QuestionId;
use crate::variant::VariantManager;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::debug;

/// Runtime context for CLI execution: the course, the engine and a runtime
/// to drive it.
pub struct RunContext {
    engine: QuestionEngine,
    course: Course,
    runtime: Runtime,
}

/// Stable numeric id for a question directory.
fn question_id_for(qid: &str) -> QuestionId {
    let digest = blake3::hash(qid.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(bytes)
}

fn parse_json(raw: &str, what: &str) -> Result<Value, EngineError> {
    serde_json::from_str(raw)
        .map_err(|e| EngineError::ConfigError(format!("{} is not valid JSON: {}", what, e)))
}

fn to_output<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::ConfigError(format!("Failed to format output: {}", e)))
}

impl RunContext {
    /// Create the run context. Uses `config_path` if given, otherwise layered
    /// config rooted at the current directory.
    pub fn new(
        course_root: PathBuf,
        course_id: u64,
        config_path: Option<PathBuf>,
    ) -> Result<Self, EngineError> {
        let config = Self::load_config(config_path)?;
        config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EngineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;

        let engine = QuestionEngine::from_config(&config, NativeDialect::new())?;
        let runtime = Runtime::new()
            .map_err(|e| EngineError::ConfigError(format!("Failed to start runtime: {}", e)))?;
        let short_name = course_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "course".to_string());
        let root = dunce::canonicalize(&course_root).map_err(|e| EngineError::ContentUnavailable {
            course_id,
            reason: format!("course root {}: {}", course_root.display(), e),
        })?;
        let course = Course::new(course_id, short_name, root);

        Ok(Self {
            engine,
            course,
            runtime,
        })
    }

    pub fn load_config(config_path: Option<PathBuf>) -> Result<EngineConfig, EngineError> {
        Ok(match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => {
                let cwd = std::env::current_dir().map_err(|e| {
                    EngineError::ConfigError(format!("Failed to read current directory: {}", e))
                })?;
                ConfigLoader::load(&cwd)?
            }
        })
    }

    fn question(&self, qid: &str) -> Result<Question, EngineError> {
        Ok(load_question(&self.course, qid, question_id_for(qid))?)
    }

    fn variant(&self, question: &Question, seed: &str) -> Result<Variant, EngineError> {
        self.runtime
            .block_on(self.engine.generate_variant(question, &self.course, seed))
    }

    /// Execute a command and return its JSON output.
    pub fn execute(&self, command: &Commands) -> Result<String, EngineError> {
        debug!(command = ?command, "Executing command");
        match command {
            Commands::Version => to_output(&json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            })),
            Commands::Generate { qid, seed } => {
                let question = self.question(qid)?;
                let seed = seed.clone().unwrap_or_else(VariantManager::fresh_seed);
                to_output(&self.variant(&question, &seed)?)
            }
            Commands::Render {
                qid,
                seed,
                submissions,
                no_answer,
            } => {
                let question = self.question(qid)?;
                let variant = self.variant(&question, seed)?;
                let mut graded = Vec::with_capacity(submissions.len());
                for raw in submissions {
                    let submission = Submission::new(parse_json(raw, "submission")?);
                    graded.push(self.runtime.block_on(self.engine.grade_submission(
                        &submission,
                        &variant,
                        &question,
                        &self.course,
                    ))?);
                }
                let selection = RenderSelection {
                    answer: !no_answer,
                    ..Default::default()
                };
                let rendered = self.runtime.block_on(self.engine.render_variant(
                    &variant,
                    &question,
                    &graded,
                    &self.course,
                    selection,
                ))?;
                to_output(&rendered)
            }
            Commands::Grade { qid, seed, answer } => {
                let question = self.question(qid)?;
                let variant = self.variant(&question, seed)?;
                let submission = Submission::new(parse_json(answer, "answer")?);
                let graded = self.runtime.block_on(self.engine.grade_submission(
                    &submission,
                    &variant,
                    &question,
                    &self.course,
                ))?;
                to_output(&graded)
            }
            Commands::File {
                qid,
                filename,
                seed,
                out,
            } => {
                let question = self.question(qid)?;
                let variant = self.variant(&question, seed)?;
                let bytes = self.runtime.block_on(self.engine.get_auxiliary_file(
                    filename,
                    &variant,
                    &question,
                    &self.course,
                ))?;
                match out {
                    Some(path) => {
                        std::fs::write(path, &bytes).map_err(StorageError::IoError)?;
                        to_output(&json!({
                            "filename": filename,
                            "size": bytes.len(),
                            "written_to": path.display().to_string(),
                        }))
                    }
                    None => to_output(&json!({
                        "filename": filename,
                        "size": bytes.len(),
                        "content": String::from_utf8_lossy(&bytes),
                    })),
                }
            }
        }
    }
}
