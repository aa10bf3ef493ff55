use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SubmissionId;

/// Balance service response: `GET <credits-endpoint>?clerkId=<id>` returns
/// `{"data": {"currentLimit": N}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEnvelope {
    pub data: BalanceData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceData {
    #[serde(rename = "currentLimit")]
    pub current_limit: i64,
}

/// One form field of a multipart submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

impl FormField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One binary attachment of a multipart submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub field_name: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Opaque input for one gated operation. The controller forwards it verbatim
/// and never inspects its contents; only the request's validators do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmissionPayload {
    Multipart {
        fields: Vec<FormField>,
        attachments: Vec<Attachment>,
    },
    Json(serde_json::Value),
}

impl SubmissionPayload {
    pub fn empty_multipart() -> Self {
        Self::Multipart {
            fields: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

/// Operation service response body, classified by content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationOutput {
    Binary {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
    Text(String),
    Json(serde_json::Value),
}

impl OperationOutput {
    /// True for bodies that carry no usable result (the condition the
    /// opt-in empty-result retry trigger fires on).
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Binary { bytes, .. } => bytes.is_empty(),
            Self::Text(text) => text.trim().is_empty(),
            Self::Json(value) => match value {
                serde_json::Value::Null => true,
                serde_json::Value::Array(items) => items.is_empty(),
                serde_json::Value::String(s) => s.is_empty(),
                serde_json::Value::Object(map) => map.is_empty(),
                _ => false,
            },
        }
    }
}

/// Stored outcome of a successful submission, kept until the payload changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub submission_id: SubmissionId,
    pub output: OperationOutput,
    pub completed_at: DateTime<Utc>,
}
