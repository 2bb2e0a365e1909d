//! Journey outcome delivered to the caller.

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exactly one of these is produced per `start_journey` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum JourneyResult {
    /// The journey reached a terminal step; `payload` is the step's result.
    Completed { payload: Value },
    /// The journey reached a terminal step whose result marks the outcome
    /// as pending server-side processing.
    Pending { payload: Value },
    /// The session was cancelled before a terminal step was reached.
    Cancelled,
    /// The journey ended with an error.
    Failed {
        code: ErrorCode,
        message: String,
        recoverable: bool,
    },
}

impl JourneyResult {
    /// Build the failure outcome for an error code, deriving recoverability.
    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        JourneyResult::Failed {
            recoverable: code.recoverable(),
            code,
            message: message.into(),
        }
    }

    /// Map a terminal step's result payload onto an outcome. A payload whose
    /// `status` field is the string `"pending"` is reported as pending;
    /// everything else completes.
    pub fn from_terminal_payload(payload: Option<Value>) -> Self {
        let payload = payload.unwrap_or(Value::Null);
        let pending = payload
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|status| status == "pending");
        if pending {
            JourneyResult::Pending { payload }
        } else {
            JourneyResult::Completed { payload }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_derives_recoverability_from_the_code() {
        let result = JourneyResult::failed(ErrorCode::NetTimeout, "timed out");
        assert_eq!(
            result,
            JourneyResult::Failed {
                code: ErrorCode::NetTimeout,
                message: "timed out".to_string(),
                recoverable: true,
            }
        );

        let result = JourneyResult::failed(ErrorCode::OriginBlocked, "bad origin");
        assert!(matches!(
            result,
            JourneyResult::Failed { recoverable: false, .. }
        ));
    }

    #[test]
    fn terminal_payload_maps_to_completed_or_pending() {
        let done = JourneyResult::from_terminal_payload(Some(json!({ "status": "ok" })));
        assert!(matches!(done, JourneyResult::Completed { .. }));

        let pending =
            JourneyResult::from_terminal_payload(Some(json!({ "status": "pending", "ref": 7 })));
        assert!(matches!(pending, JourneyResult::Pending { .. }));

        let empty = JourneyResult::from_terminal_payload(None);
        assert_eq!(empty, JourneyResult::Completed { payload: Value::Null });
    }

    #[test]
    fn result_serializes_with_status_tag() {
        let json = serde_json::to_value(JourneyResult::Cancelled).unwrap();
        assert_eq!(json, json!({ "status": "cancelled" }));

        let json = serde_json::to_value(JourneyResult::failed(
            ErrorCode::RateLimited,
            "slow down",
        ))
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["recoverable"], true);
    }
}
