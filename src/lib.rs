//! qengine: Question Execution Engine and Scoring Aggregator
//!
//! Loads author-supplied question modules from course content, runs their
//! lifecycle phases (generate, prepare, render, parse, grade, file) in
//! isolation, and folds graded submissions into instance question and
//! assessment instance scores.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod executor;
pub mod grading;
pub mod loader;
pub mod logging;
pub mod model;
pub mod module;
pub mod sandbox;
pub mod scoring;
pub mod store;
pub mod types;
pub mod variant;

pub use engine::{QuestionEngine, QuestionSlot};
pub use error::{EngineError, LoadError, PhaseExecutionError, PhaseFailure, StorageError};
pub use executor::{json_round_trip, Phase, PhaseCall, PhaseExecutor, PhaseOutput};
pub use loader::{LoadedModule, ModuleLoader};
pub use model::{
    AssessmentInstance, Course, GradedSubmission, InstanceQuestion, Question, RenderSelection,
    RenderedQuestion, ScoringMode, Submission, Variant, VariantRecord,
};
pub use scoring::ScoringOutcome;
