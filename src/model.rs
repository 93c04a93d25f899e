//! Domain records: courses, questions, variants, submissions and score holders.

use crate::types::{
    AssessmentInstanceId, CourseId, InstanceQuestionId, QuestionId, SubmissionId, VariantId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A course and the runtime directory holding its materialized content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: CourseId,
    pub short_name: String,
    /// Runtime content root (contains `questions/`, `clientFilesCourse/`, ...)
    pub path: PathBuf,
}

impl Course {
    pub fn new(id: CourseId, short_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            short_name: short_name.into(),
            path: path.into(),
        }
    }

    pub fn questions_dir(&self) -> PathBuf {
        self.path.join("questions")
    }
}

/// Snapshot of an authored question for one content version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub qid: String,
    pub course_id: CourseId,
    /// Directory under `questions/`
    pub directory: String,
    #[serde(default)]
    pub title: String,
    /// Authoring options passed to generate
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub partial_credit: bool,
    /// Directory of the question this one inherits from, if any
    #[serde(default)]
    pub template_directory: Option<String>,
}

/// One deterministic instantiation of a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub question_id: QuestionId,
    pub variant_seed: String,
    pub params: Value,
    pub true_answer: Value,
    pub options: Value,
}

/// A persisted variant attached to an instance question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantRecord {
    pub variant_id: VariantId,
    pub instance_question_id: InstanceQuestionId,
    pub variant: Variant,
}

/// Answer payload as received from the presentation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    /// Id of an already-persisted submission this one regrades, if any. The
    /// regrade is appended to history under a new id.
    #[serde(default)]
    pub id: Option<SubmissionId>,
    pub submitted_answer: Value,
    #[serde(default)]
    pub raw_submitted_answer: Value,
}

impl Submission {
    pub fn new(submitted_answer: Value) -> Self {
        Self {
            id: None,
            raw_submitted_answer: submitted_answer.clone(),
            submitted_answer,
        }
    }
}

/// Output of the parse phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedSubmission {
    pub submitted_answer: Value,
    pub raw_submitted_answer: Value,
    pub format_errors: Map<String, Value>,
    pub gradable: bool,
}

/// A submission after parse and grade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradedSubmission {
    pub submitted_answer: Value,
    pub raw_submitted_answer: Value,
    /// Stored score, after legacy rounding when partial credit is off
    pub score: f64,
    /// Unrounded score as returned by the module
    pub v2_score: f64,
    pub feedback: Value,
    pub partial_scores: Map<String, Value>,
    pub format_errors: Map<String, Value>,
    pub gradable: bool,
    pub params: Value,
    pub true_answer: Value,
}

impl GradedSubmission {
    pub fn correct(&self) -> bool {
        self.gradable && self.score >= 1.0
    }
}

/// Append-only submission history entry.
///
/// `submission_id` is issued by the store at append time and increases with
/// creation order, so history listed by key is history in grading order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionRecord {
    pub submission_id: SubmissionId,
    /// Earlier record this one regrades
    #[serde(default)]
    pub regrade_of: Option<SubmissionId>,
    pub variant_id: VariantId,
    pub instance_question_id: InstanceQuestionId,
    pub graded: GradedSubmission,
    pub created_at: DateTime<Utc>,
}

/// HTML fragments produced by the render phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RenderedQuestion {
    pub extra_headers_html: String,
    pub question_html: String,
    pub submission_htmls: Vec<String>,
    pub answer_html: String,
}

/// Which fragments the caller wants rendered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderSelection {
    pub question: bool,
    pub submissions: bool,
    pub answer: bool,
}

impl Default for RenderSelection {
    fn default() -> Self {
        Self {
            question: true,
            submissions: true,
            answer: true,
        }
    }
}

/// How an assessment turns graded submissions into points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Each fully correct submission adds the current value, which then grows
    /// by the initial points; an incorrect one resets the value.
    #[default]
    Homework,
    /// Points track the best score seen, scaled to max points.
    BestScore,
}

/// One student's record for one question in an assessment instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceQuestion {
    pub id: InstanceQuestionId,
    pub assessment_instance_id: AssessmentInstanceId,
    pub question_id: QuestionId,
    pub max_points: f64,
    pub init_points: f64,
    pub points: f64,
    pub score_perc: f64,
    pub current_value: f64,
    pub highest_submission_score: Option<f64>,
    pub number_attempts: u32,
}

impl InstanceQuestion {
    pub fn new(
        id: InstanceQuestionId,
        assessment_instance_id: AssessmentInstanceId,
        question_id: QuestionId,
        init_points: f64,
        max_points: f64,
    ) -> Self {
        Self {
            id,
            assessment_instance_id,
            question_id,
            max_points,
            init_points,
            points: 0.0,
            score_perc: 0.0,
            current_value: init_points,
            highest_submission_score: None,
            number_attempts: 0,
        }
    }
}

/// One student's instantiation of an assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessmentInstance {
    pub id: AssessmentInstanceId,
    pub scoring_mode: ScoringMode,
    pub max_points: f64,
    pub points: f64,
    pub score_perc: f64,
    pub instance_question_ids: Vec<InstanceQuestionId>,
}

impl AssessmentInstance {
    pub fn new(id: AssessmentInstanceId, scoring_mode: ScoringMode, max_points: f64) -> Self {
        Self {
            id,
            scoring_mode,
            max_points,
            points: 0.0,
            score_perc: 0.0,
            instance_question_ids: Vec::new(),
        }
    }
}
