//! Classification of raw responses into success or failure
//!
//! Every response maps to exactly one [`ResponseOutcome`]. A body that is not
//! JSON is always a failure carrying only the transport status, even when that
//! status is 2xx.

use serde_json::Value;

use super::HttpResponse;
use crate::error::ClientError;

/// Result of classifying a raw response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Success(Value),
    Failure { code: u16, reason: Option<String> },
}

impl ResponseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts a failure into `ClientError::Api`
    pub fn into_result(self) -> Result<Value, ClientError> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Failure { code, reason } => Err(ClientError::Api { code, reason }),
        }
    }
}

/// Classifies a raw response
pub fn classify(response: &HttpResponse) -> ResponseOutcome {
    let Ok(parsed) = response.json::<Value>() else {
        return ResponseOutcome::Failure {
            code: response.status,
            reason: None,
        };
    };

    if !response.is_success() {
        return ResponseOutcome::Failure {
            code: status_field(&parsed).unwrap_or(response.status),
            reason: reason_field(&parsed),
        };
    }

    ResponseOutcome::Success(parsed)
}

/// Reads the body's `status` field, accepting numbers and numeric strings
fn status_field(parsed: &Value) -> Option<u16> {
    match parsed.get("status")? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads the body's `errors` field, falling back to `message`
fn reason_field(parsed: &Value) -> Option<String> {
    ["errors", "message"]
        .iter()
        .filter_map(|key| parsed.get(key))
        .map(stringify)
        .find(|reason| !reason.is_empty())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
