//! Question module contract
//!
//! A question module is the executable logic behind a question: it produces
//! variants from a seed, grades submitted answers and optionally renders HTML or
//! serves auxiliary files. Modules come in dialects, each with its own entry file
//! and adapter. The loader asks every enabled [`ModuleDialect`] in order for its
//! entry file and hands the first one found to that dialect.

pub mod calculation;
pub mod comparator;
pub mod native;

pub use calculation::CalculationDialect;
pub use native::{NativeDialect, NATIVE_ENTRY_FILE};

use crate::error::ModuleFault;
use crate::model::{GradedSubmission, RenderSelection, RenderedQuestion, Variant};
use crate::sandbox::ExecutionContext;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// What generate returns. Absent fields normalize to `null` at the boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedData {
    pub params: Option<Value>,
    pub true_answer: Option<Value>,
    /// Variant options overriding the question's options
    pub options: Option<Value>,
}

/// What grade returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeOutcome {
    /// Raw score, expected in [0, 1]
    pub score: f64,
    pub feedback: Option<Value>,
}

/// The lifecycle contract every question module implements.
///
/// Calls are synchronous and must be deterministic for identical inputs.
/// Module code may only touch files through `ctx`.
pub trait QuestionModule: Send + Sync {
    fn get_data(
        &self,
        variant_seed: &str,
        options: &Value,
        ctx: &ExecutionContext,
    ) -> Result<GeneratedData, ModuleFault>;

    fn grade_answer(
        &self,
        variant: &Variant,
        submitted_answer: &Value,
        ctx: &ExecutionContext,
    ) -> Result<GradeOutcome, ModuleFault>;

    /// `None` means the module has no render logic; callers supply empty fragments.
    fn render(
        &self,
        _variant: &Variant,
        _submissions: &[GradedSubmission],
        _selection: RenderSelection,
        _ctx: &ExecutionContext,
    ) -> Option<Result<RenderedQuestion, ModuleFault>> {
        None
    }

    fn get_file(
        &self,
        filename: &str,
        _variant: &Variant,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<u8>, ModuleFault> {
        Err(ModuleFault::new(format!("module provides no file named {}", filename)))
    }
}

/// A supported module format.
pub trait ModuleDialect: Send + Sync {
    fn name(&self) -> &str;

    /// File name looked up in the question directory (then templates).
    fn entry_file(&self) -> &str;

    fn load(
        &self,
        entry: &Path,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn QuestionModule>, ModuleFault>;
}
