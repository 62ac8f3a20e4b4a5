use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const INSIGHTS_UNAVAILABLE: &str = "Insights not available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Ok,
    Partial,
    Failed,
}

/// Result of one source adapter run.
///
/// When `status` is `Failed` the payload is the type's placeholder value
/// (zeros / empty lists) and `error` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord<T> {
    pub source_name: String,
    pub fetched_at: DateTime<Utc>,
    pub status: RecordStatus,
    pub payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> NormalizedRecord<T> {
    pub fn ok(source_name: impl Into<String>, payload: T) -> Self {
        Self {
            source_name: source_name.into(),
            fetched_at: Utc::now(),
            status: RecordStatus::Ok,
            payload,
            error: None,
        }
    }

    pub fn partial(source_name: impl Into<String>, payload: T, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            fetched_at: Utc::now(),
            status: RecordStatus::Partial,
            payload,
            error: Some(reason.into()),
        }
    }

    pub fn failed_with(source_name: impl Into<String>, placeholder: T, error: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            fetched_at: Utc::now(),
            status: RecordStatus::Failed,
            payload: placeholder,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == RecordStatus::Failed
    }
}

impl<T: Default> NormalizedRecord<T> {
    pub fn failed(source_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::failed_with(source_name, T::default(), error)
    }
}

/// Bullet list attached to a section. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Insight(Vec<String>);

impl Insight {
    pub fn new(lines: Vec<String>) -> Self {
        Self(lines)
    }

    pub fn unavailable() -> Self {
        Self(vec![INSIGHTS_UNAVAILABLE.to_string()])
    }

    pub fn is_unavailable(&self) -> bool {
        self.0.is_empty() || (self.0.len() == 1 && self.0[0] == INSIGHTS_UNAVAILABLE)
    }

    pub fn lines(&self) -> &[String] {
        &self.0
    }

    pub fn to_text(&self) -> String {
        self.0.join("\n")
    }
}
