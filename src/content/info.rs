//! Question `info.json` metadata, template chains and entry-point lookup.

use crate::content::{EntryPointNotFound, PathResolver, TemplateResolver};
use crate::error::LoadError;
use crate::model::{Course, Question};
use crate::types::QuestionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

pub const INFO_FILE: &str = "info.json";

/// A question directory must name a path strictly inside `questions/`.
fn is_contained(directory: &str) -> bool {
    let path = Path::new(directory);
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Authored question metadata as stored in `questions/<dir>/info.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInfo {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub partial_credit: bool,
    #[serde(default)]
    pub template_directory: Option<String>,
}

impl QuestionInfo {
    pub fn read(course: &Course, directory: &str) -> Result<Self, LoadError> {
        if !is_contained(directory) {
            return Err(LoadError::ContentUnavailable {
                course_id: course.id,
                reason: format!("question directory {:?} leaves questions/", directory),
            });
        }
        let path = course.questions_dir().join(directory).join(INFO_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| LoadError::ContentUnavailable {
            course_id: course.id,
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&raw).map_err(|e| LoadError::ContentUnavailable {
            course_id: course.id,
            reason: format!("invalid {}: {}", path.display(), e),
        })
    }
}

/// Build a [`Question`] snapshot from its `info.json`.
pub fn load_question(course: &Course, qid: &str, id: QuestionId) -> Result<Question, LoadError> {
    let info = QuestionInfo::read(course, qid)?;
    Ok(Question {
        id,
        qid: qid.to_string(),
        course_id: course.id,
        directory: qid.to_string(),
        title: info.title,
        options: info.options,
        partial_credit: info.partial_credit,
        template_directory: info.template_directory,
    })
}

/// Follows `templateDirectory` links through `info.json` files.
#[derive(Debug, Clone)]
pub struct InfoTemplateResolver {
    max_depth: usize,
}

impl InfoTemplateResolver {
    const DEFAULT_MAX_DEPTH: usize = 10;

    pub fn new() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for InfoTemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver for InfoTemplateResolver {
    fn template_question_ids(
        &self,
        course: &Course,
        question: &Question,
    ) -> Result<Vec<String>, LoadError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(question.directory.clone());

        let mut next = question.template_directory.clone();
        while let Some(directory) = next {
            if !seen.insert(directory.clone()) {
                return Err(LoadError::ContentUnavailable {
                    course_id: course.id,
                    reason: format!(
                        "template cycle at {} while resolving {}",
                        directory, question.qid
                    ),
                });
            }
            if chain.len() >= self.max_depth {
                return Err(LoadError::ContentUnavailable {
                    course_id: course.id,
                    reason: format!("template chain for {} is too deep", question.qid),
                });
            }
            let info = QuestionInfo::read(course, &directory)?;
            chain.push(directory);
            next = info.template_directory;
        }
        Ok(chain)
    }
}

/// Looks for the entry file in the question directory, then each template
/// directory in chain order.
#[derive(Debug, Clone, Default)]
pub struct CoursePathResolver;

impl PathResolver for CoursePathResolver {
    fn resolve_entry_point(
        &self,
        entry_file: &str,
        question_dir: &str,
        course_root: &Path,
        _question: &Question,
        template_qids: &[String],
    ) -> Result<PathBuf, EntryPointNotFound> {
        let questions = course_root.join("questions");
        let mut searched = Vec::new();
        for directory in std::iter::once(question_dir).chain(template_qids.iter().map(String::as_str))
        {
            if !is_contained(directory) {
                continue;
            }
            let candidate = questions.join(directory).join(entry_file);
            if candidate.is_file() {
                return Ok(candidate);
            }
            searched.push(candidate);
        }
        Err(EntryPointNotFound {
            entry_file: entry_file.to_string(),
            searched,
        })
    }
}
