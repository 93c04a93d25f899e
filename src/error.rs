//! Error types for the question execution engine.

use crate::executor::Phase;
use crate::types::{
    AssessmentInstanceId, CourseId, InstanceQuestionId, QuestionId, SubmissionId, VariantId,
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Instance question not found: {0}")]
    InstanceQuestionNotFound(InstanceQuestionId),

    #[error("Assessment instance not found: {0}")]
    AssessmentInstanceNotFound(AssessmentInstanceId),

    #[error("Variant not found: {0}")]
    VariantNotFound(VariantId),

    #[error("Submission {submission_id} not found for instance question {instance_question_id}")]
    SubmissionNotFound {
        instance_question_id: InstanceQuestionId,
        submission_id: SubmissionId,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised when module code reaches for a path outside its aliases.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Unknown path alias: {0}")]
    UnknownAlias(String),

    #[error("Path escapes its alias root: {0}")]
    PathEscape(String),

    #[error("Sandbox I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

/// A failure raised by author-supplied module code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ModuleFault {
    pub message: String,
}

impl ModuleFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<SandboxError> for ModuleFault {
    fn from(err: SandboxError) -> Self {
        ModuleFault::new(err.to_string())
    }
}

impl From<serde_json::Error> for ModuleFault {
    fn from(err: serde_json::Error) -> Self {
        ModuleFault::new(format!("invalid JSON: {}", err))
    }
}

/// Module loader errors. Cloneable so a single in-flight load can hand the
/// same outcome to every waiter.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("Content unavailable for course {course_id}: {reason}")]
    ContentUnavailable { course_id: CourseId, reason: String },

    #[error("No module entry point found for QID {qid} (searched: {searched})")]
    ModuleNotFound { qid: String, searched: String },

    #[error("Error loading {entry} for QID {qid}: {source}")]
    ModuleLoad {
        qid: String,
        entry: String,
        #[source]
        source: ModuleFault,
    },
}

/// Diagnostic context attached to phase and pipeline failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub course_id: Option<CourseId>,
    pub question_id: Option<QuestionId>,
    pub qid: Option<String>,
    pub variant_id: Option<VariantId>,
    pub variant_seed: Option<String>,
    pub submission_id: Option<SubmissionId>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(qid) = &self.qid {
            parts.push(format!("qid={}", qid));
        }
        if let Some(id) = self.question_id {
            parts.push(format!("question_id={}", id));
        }
        if let Some(id) = self.course_id {
            parts.push(format!("course_id={}", id));
        }
        if let Some(id) = self.variant_id {
            parts.push(format!("variant_id={}", id));
        }
        if let Some(seed) = &self.variant_seed {
            parts.push(format!("variant_seed={}", seed));
        }
        if let Some(id) = self.submission_id {
            parts.push(format!("submission_id={}", id));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Why a phase invocation failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PhaseFailure {
    #[error("{0}")]
    Module(#[from] ModuleFault),

    #[error("module panicked: {0}")]
    Panic(String),

    #[error("invalid module output: {0}")]
    InvalidOutput(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("normalization failed: {0}")]
    Normalization(String),
}

/// A phase invocation that did not produce a usable result.
#[derive(Debug, Clone, Error)]
#[error("{phase} phase failed [{context}]: {cause}")]
pub struct PhaseExecutionError {
    pub phase: Phase,
    pub context: ErrorContext,
    #[source]
    pub cause: PhaseFailure,
}

/// Engine-level errors surfaced to the presentation layer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Content unavailable for course {course_id}: {reason}")]
    ContentUnavailable { course_id: CourseId, reason: String },

    #[error("No module entry point found for QID {qid} (searched: {searched})")]
    ModuleNotFound { qid: String, searched: String },

    #[error("Error loading {entry} for QID {qid}: {source}")]
    ModuleLoadError {
        qid: String,
        entry: String,
        #[source]
        source: ModuleFault,
    },

    #[error(transparent)]
    PhaseExecution(#[from] PhaseExecutionError),

    #[error("Variant generation failed for QID {qid}: {source}")]
    Generation {
        qid: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Render failed for QID {qid}: {source}")]
    Render {
        qid: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Grading failed [{context}]: {source}")]
    Grading {
        context: ErrorContext,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Unable to produce file {filename} for QID {qid}: {source}")]
    File {
        filename: String,
        qid: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Aggregation consistency violated for instance question {instance_question_id}: {detail}")]
    AggregationConsistency {
        instance_question_id: InstanceQuestionId,
        detail: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl EngineError {
    /// Whether a caller may retry after fixing the underlying state.
    ///
    /// Only content unavailability qualifies; author-code failures are
    /// deterministic and repeat on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::ContentUnavailable { .. } => true,
            EngineError::Generation { source, .. }
            | EngineError::Render { source, .. }
            | EngineError::Grading { source, .. }
            | EngineError::File { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The phase failure underneath any pipeline wrapping, if there is one.
    pub fn phase_error(&self) -> Option<&PhaseExecutionError> {
        match self {
            EngineError::PhaseExecution(err) => Some(err),
            EngineError::Generation { source, .. }
            | EngineError::Render { source, .. }
            | EngineError::Grading { source, .. }
            | EngineError::File { source, .. } => source.phase_error(),
            _ => None,
        }
    }
}

impl From<LoadError> for EngineError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::ContentUnavailable { course_id, reason } => {
                EngineError::ContentUnavailable { course_id, reason }
            }
            LoadError::ModuleNotFound { qid, searched } => {
                EngineError::ModuleNotFound { qid, searched }
            }
            LoadError::ModuleLoad { qid, entry, source } => {
                EngineError::ModuleLoadError { qid, entry, source }
            }
        }
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
