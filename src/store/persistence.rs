//! Persistence layer for the score store
//!
//! A single sled tree with key prefixes, so one grading event is one atomic
//! `sled::Batch`. Score holders are fixed-shape and use bincode; variants and
//! submissions carry module JSON and use serde_json.

use crate::error::StorageError;
use crate::model::{AssessmentInstance, InstanceQuestion, SubmissionRecord, VariantRecord};
use crate::store::{GradingCommit, ScoreStore};
use crate::types::{AssessmentInstanceId, InstanceQuestionId, VariantId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const IQ_PREFIX: &[u8] = b"iq:";
const AI_PREFIX: &[u8] = b"ai:";
const VARIANT_PREFIX: &[u8] = b"var:";
const SUBMISSION_PREFIX: &[u8] = b"sub:";
const HALT_PREFIX: &[u8] = b"halt:";

fn key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// `sub:` + instance question id + submission id, big-endian. Submission ids
/// come from `generate_id`, so a prefix scan yields history in creation order.
fn submission_key(instance_question_id: InstanceQuestionId, submission_id: u64) -> Vec<u8> {
    let mut key = key(SUBMISSION_PREFIX, instance_question_id);
    key.extend_from_slice(&submission_id.to_be_bytes());
    key
}

fn sled_error(action: &str, e: sled::Error) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Failed to {}: {}", action, e),
    ))
}

fn encode_bincode<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value)
        .map_err(|e| StorageError::Serialization(format!("Failed to serialize {}: {}", what, e)))
}

fn decode_bincode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, StorageError> {
    bincode::deserialize(bytes)
        .map_err(|e| StorageError::Serialization(format!("Failed to deserialize {}: {}", what, e)))
}

fn encode_json<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::Serialization(format!("Failed to serialize {}: {}", what, e)))
}

fn decode_json<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, StorageError> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::Serialization(format!("Failed to deserialize {}: {}", what, e)))
}

/// Sled-based implementation of ScoreStore
pub struct SledScoreStore {
    db: sled::Db,
}

impl SledScoreStore {
    /// Open (or create) a store at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| sled_error("open sled database", e))?;
        Ok(Self { db })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| sled_error("flush database", e))?;
        Ok(())
    }

    fn get_raw(&self, key: &[u8], what: &str) -> Result<Option<sled::IVec>, StorageError> {
        self.db
            .get(key)
            .map_err(|e| sled_error(&format!("get {}", what), e))
    }

    fn insert_raw(&self, key: Vec<u8>, value: Vec<u8>, what: &str) -> Result<(), StorageError> {
        self.db
            .insert(key, value)
            .map_err(|e| sled_error(&format!("put {}", what), e))?;
        Ok(())
    }
}

impl ScoreStore for SledScoreStore {
    fn read_instance_question(
        &self,
        id: InstanceQuestionId,
    ) -> Result<Option<InstanceQuestion>, StorageError> {
        self.get_raw(&key(IQ_PREFIX, id), "instance question")?
            .map(|bytes| decode_bincode(&bytes, "instance question"))
            .transpose()
    }

    fn write_instance_question(&self, iq: &InstanceQuestion) -> Result<(), StorageError> {
        let value = encode_bincode(iq, "instance question")?;
        self.insert_raw(key(IQ_PREFIX, iq.id), value, "instance question")
    }

    fn read_assessment_instance(
        &self,
        id: AssessmentInstanceId,
    ) -> Result<Option<AssessmentInstance>, StorageError> {
        self.get_raw(&key(AI_PREFIX, id), "assessment instance")?
            .map(|bytes| decode_bincode(&bytes, "assessment instance"))
            .transpose()
    }

    fn write_assessment_instance(&self, ai: &AssessmentInstance) -> Result<(), StorageError> {
        let value = encode_bincode(ai, "assessment instance")?;
        self.insert_raw(key(AI_PREFIX, ai.id), value, "assessment instance")
    }

    fn insert_variant(&self, record: &VariantRecord) -> Result<(), StorageError> {
        let value = encode_json(record, "variant")?;
        self.insert_raw(key(VARIANT_PREFIX, record.variant_id), value, "variant")
    }

    fn read_variant(&self, id: VariantId) -> Result<Option<VariantRecord>, StorageError> {
        self.get_raw(&key(VARIANT_PREFIX, id), "variant")?
            .map(|bytes| decode_json(&bytes, "variant"))
            .transpose()
    }

    fn append_submission(&self, record: &SubmissionRecord) -> Result<(), StorageError> {
        let value = encode_json(record, "submission")?;
        self.insert_raw(
            submission_key(record.instance_question_id, record.submission_id),
            value,
            "submission",
        )
    }

    fn list_submissions(
        &self,
        instance_question_id: InstanceQuestionId,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix(key(SUBMISSION_PREFIX, instance_question_id)) {
            let (_, value) = item.map_err(|e| sled_error("iterate submissions", e))?;
            records.push(decode_json(&value, "submission")?);
        }
        Ok(records)
    }

    fn commit_grading(&self, commit: &GradingCommit) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        batch.insert(
            submission_key(
                commit.submission.instance_question_id,
                commit.submission.submission_id,
            ),
            encode_json(&commit.submission, "submission")?,
        );
        batch.insert(
            key(IQ_PREFIX, commit.instance_question.id),
            encode_bincode(&commit.instance_question, "instance question")?,
        );
        batch.insert(
            key(AI_PREFIX, commit.assessment_instance.id),
            encode_bincode(&commit.assessment_instance, "assessment instance")?,
        );
        self.db
            .apply_batch(batch)
            .map_err(|e| sled_error("apply grading batch", e))?;
        Ok(())
    }

    fn commit_scores(
        &self,
        iq: &InstanceQuestion,
        ai: &AssessmentInstance,
    ) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        batch.insert(
            key(IQ_PREFIX, iq.id),
            encode_bincode(iq, "instance question")?,
        );
        batch.insert(
            key(AI_PREFIX, ai.id),
            encode_bincode(ai, "assessment instance")?,
        );
        self.db
            .apply_batch(batch)
            .map_err(|e| sled_error("apply score batch", e))?;
        Ok(())
    }

    fn halt_instance_question(
        &self,
        id: InstanceQuestionId,
        reason: &str,
    ) -> Result<(), StorageError> {
        self.insert_raw(key(HALT_PREFIX, id), reason.as_bytes().to_vec(), "halt marker")
    }

    fn halt_reason(&self, id: InstanceQuestionId) -> Result<Option<String>, StorageError> {
        Ok(self
            .get_raw(&key(HALT_PREFIX, id), "halt marker")?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn clear_halt(&self, id: InstanceQuestionId) -> Result<(), StorageError> {
        self.db
            .remove(key(HALT_PREFIX, id))
            .map_err(|e| sled_error("remove halt marker", e))?;
        Ok(())
    }

    fn next_id(&self) -> Result<u64, StorageError> {
        let id = self
            .db
            .generate_id()
            .map_err(|e| sled_error("generate id", e))?;
        Ok(id + 1)
    }
}
