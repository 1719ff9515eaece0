use proctor_core::model::{QuestionId, SubmitReason, TestId};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn test_id_from_i64(v: i64) -> Result<TestId, StorageError> {
    Ok(TestId::new(i64_to_u64("test_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn reason_to_str(reason: SubmitReason) -> &'static str {
    reason.as_str()
}

/// Must stay consistent with `reason_to_str`.
pub(crate) fn parse_reason(s: &str) -> Result<SubmitReason, StorageError> {
    match s {
        "confirmed" => Ok(SubmitReason::Confirmed),
        "time_expired" => Ok(SubmitReason::TimeExpired),
        other => Err(StorageError::Serialization(format!(
            "invalid submit reason: {other}"
        ))),
    }
}
