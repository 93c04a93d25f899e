//! Local-disk content materializer
//!
//! For courses whose content is already on local disk (development checkouts,
//! tests, the CLI). Materialization only verifies that each requested chunk is
//! present; versions are hashed from the directory contents.

use crate::content::version::compute_content_version;
use crate::content::{ChunkRequest, ContentMaterializer};
use crate::error::LoadError;
use crate::model::Course;
use crate::sandbox::{CLIENT_FILES_COURSE, SERVER_FILES_COURSE};
use crate::types::{short_hex, ContentVersion};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct LocalContent;

impl LocalContent {
    pub fn new() -> Self {
        Self
    }

    fn chunk_path(course: &Course, chunk: &ChunkRequest) -> PathBuf {
        match chunk {
            ChunkRequest::Question { qid } => course.questions_dir().join(qid),
            ChunkRequest::ClientFilesCourse => course.path.join(CLIENT_FILES_COURSE),
            ChunkRequest::ServerFilesCourse => course.path.join(SERVER_FILES_COURSE),
        }
    }
}

#[async_trait]
impl ContentMaterializer for LocalContent {
    async fn ensure_content_available(
        &self,
        course: &Course,
        chunks: &[ChunkRequest],
    ) -> Result<(), LoadError> {
        if !course.path.is_dir() {
            return Err(LoadError::ContentUnavailable {
                course_id: course.id,
                reason: format!("course root {} does not exist", course.path.display()),
            });
        }
        for chunk in chunks {
            let path = Self::chunk_path(course, chunk);
            match chunk {
                // Shared file directories are optional in a course.
                ChunkRequest::ClientFilesCourse | ChunkRequest::ServerFilesCourse => {}
                ChunkRequest::Question { .. } => {
                    if !path.is_dir() {
                        return Err(LoadError::ContentUnavailable {
                            course_id: course.id,
                            reason: format!("chunk {} missing at {}", chunk, path.display()),
                        });
                    }
                }
            }
        }
        debug!(course_id = course.id, chunks = chunks.len(), "Content chunks available");
        Ok(())
    }

    async fn content_version(&self, course: &Course) -> Result<ContentVersion, LoadError> {
        let root = course.path.clone();
        let version = tokio::task::spawn_blocking(move || compute_content_version(&root))
            .await
            .map_err(|e| LoadError::ContentUnavailable {
                course_id: course.id,
                reason: format!("content version task failed: {}", e),
            })?
            .map_err(|e| LoadError::ContentUnavailable {
                course_id: course.id,
                reason: e.to_string(),
            })?;
        debug!(course_id = course.id, version = %short_hex(&version), "Computed content version");
        Ok(version)
    }
}
