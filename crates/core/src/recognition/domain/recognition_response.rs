use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::recognition_state_machine::RecognitionOutcome;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response identity is not a non-empty string")]
    InvalidName,
}

/// An inbound message that carries a recognition result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecognitionResponse {
    pub outcome: RecognitionOutcome,
    /// Echoed request id, when the service provides one.
    pub request_id: Option<Uuid>,
    pub kind: Option<String>,
    /// Service-side error text from `return_result.error`.
    pub error: Option<String>,
}

/// Maps service identities to outcomes. Configured sentinel names mean
/// "processed, no match"; every other non-empty name is a match.
#[derive(Clone, Debug)]
pub struct ResponseClassifier {
    sentinels: Vec<String>,
}

impl ResponseClassifier {
    pub fn new(sentinels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            sentinels: sentinels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, name: &str) -> RecognitionOutcome {
        if self.sentinels.iter().any(|s| s == name) {
            RecognitionOutcome::NotRecognized
        } else {
            RecognitionOutcome::Recognized {
                person_name: name.to_string(),
            }
        }
    }

    /// Parses one inbound text message.
    ///
    /// `Ok(None)` means the message is valid JSON but not a recognition
    /// result (no `name` field), e.g. a status or keep-alive message.
    pub fn parse(&self, text: &str) -> Result<Option<RecognitionResponse>, ResponseError> {
        let object: Map<String, Value> = serde_json::from_str(text)?;
        let Some(name) = object.get("name") else {
            return Ok(None);
        };
        let name = match name {
            Value::String(s) if !s.trim().is_empty() => s.as_str(),
            _ => return Err(ResponseError::InvalidName),
        };

        // Unparseable echoes are treated as absent rather than stale.
        let request_id = object
            .get("request_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let error = object
            .get("return_result")
            .and_then(|r| r.get("error"))
            .and_then(|e| match e {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            });

        Ok(Some(RecognitionResponse {
            outcome: self.classify(name),
            request_id,
            kind,
            error,
        }))
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(crate::shared::constants::NOT_RECOGNIZED_SENTINELS.iter().copied())
    }
}
