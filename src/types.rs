//! Shared identifier types.

/// 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Identifier of the materialized snapshot of a course's authored files.
pub type ContentVersion = Hash;

pub type CourseId = u64;
pub type QuestionId = u64;
pub type VariantId = u64;
pub type SubmissionId = u64;
pub type InstanceQuestionId = u64;
pub type AssessmentInstanceId = u64;

/// Short hex form of a hash for log fields.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}
