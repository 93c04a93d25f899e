//! Course content collaborators
//!
//! The loader reaches course files only through these traits: materializing
//! content chunks onto disk, resolving a question's template chain, and finding
//! a dialect's entry file. Local-filesystem implementations live alongside.

pub mod info;
pub mod local;
pub mod version;

pub use info::{load_question, CoursePathResolver, InfoTemplateResolver, QuestionInfo};
pub use local::LocalContent;
pub use version::compute_content_version;

use crate::error::LoadError;
use crate::model::{Course, Question};
use crate::types::ContentVersion;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A unit of course content that must be on disk before a module loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkRequest {
    Question { qid: String },
    ClientFilesCourse,
    ServerFilesCourse,
}

impl fmt::Display for ChunkRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkRequest::Question { qid } => write!(f, "question:{}", qid),
            ChunkRequest::ClientFilesCourse => write!(f, "clientFilesCourse"),
            ChunkRequest::ServerFilesCourse => write!(f, "serverFilesCourse"),
        }
    }
}

/// Chunks needed to load `question`: the question itself, the shared course
/// file directories, then every template question in chain order.
pub fn chunks_for_question(question: &Question, template_qids: &[String]) -> Vec<ChunkRequest> {
    let mut chunks = vec![
        ChunkRequest::Question {
            qid: question.directory.clone(),
        },
        ChunkRequest::ClientFilesCourse,
        ChunkRequest::ServerFilesCourse,
    ];
    chunks.extend(
        template_qids
            .iter()
            .map(|qid| ChunkRequest::Question { qid: qid.clone() }),
    );
    chunks
}

/// Puts course content on local disk and reports which snapshot is there.
#[async_trait]
pub trait ContentMaterializer: Send + Sync {
    async fn ensure_content_available(
        &self,
        course: &Course,
        chunks: &[ChunkRequest],
    ) -> Result<(), LoadError>;

    async fn content_version(&self, course: &Course) -> Result<ContentVersion, LoadError>;
}

/// Resolves the ordered chain of questions a question inherits from.
pub trait TemplateResolver: Send + Sync {
    fn template_question_ids(
        &self,
        course: &Course,
        question: &Question,
    ) -> Result<Vec<String>, LoadError>;
}

#[derive(Debug, Clone, Error)]
#[error("Entry point {entry_file} not found")]
pub struct EntryPointNotFound {
    pub entry_file: String,
    pub searched: Vec<PathBuf>,
}

/// Finds a module entry file for a question.
pub trait PathResolver: Send + Sync {
    fn resolve_entry_point(
        &self,
        entry_file: &str,
        question_dir: &str,
        course_root: &Path,
        question: &Question,
        template_qids: &[String],
    ) -> Result<PathBuf, EntryPointNotFound>;
}
