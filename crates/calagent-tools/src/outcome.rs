//! The uniform result record every tool returns.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt::Display;

use calagent_auth::AuthError;
use calagent_calendar::CalendarError;

use crate::time::TimeError;

/// Category of a failed tool call, so agents can decide whether to retry,
/// re-authenticate, or fix their arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Authentication,
    NotFound,
    InvalidInput,
    RateLimited,
    Conflict,
    Remote,
    Network,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: FailureKind, detail: impl Display) -> Self {
        Self {
            kind,
            message: format!("An error occurred: {}", detail),
        }
    }

    pub fn invalid_input(detail: impl Display) -> Self {
        Self::new(FailureKind::InvalidInput, detail)
    }
}

impl From<CalendarError> for ToolFailure {
    fn from(err: CalendarError) -> Self {
        let kind = match &err {
            CalendarError::AccessDenied(_) | CalendarError::TokenExpired => {
                FailureKind::Authentication
            }
            CalendarError::RateLimited(_) => FailureKind::RateLimited,
            CalendarError::EventNotFound(_) => FailureKind::NotFound,
            CalendarError::InvalidEventData(_) => FailureKind::InvalidInput,
            CalendarError::Conflict(_) => FailureKind::Conflict,
            CalendarError::ApiError { .. } | CalendarError::Decode(_) => FailureKind::Remote,
            CalendarError::NetworkError(_) => FailureKind::Network,
        };
        Self::new(kind, err)
    }
}

impl From<AuthError> for ToolFailure {
    fn from(err: AuthError) -> Self {
        Self::new(FailureKind::Authentication, err)
    }
}

impl From<TimeError> for ToolFailure {
    fn from(err: TimeError) -> Self {
        Self::invalid_input(err)
    }
}

/// `Success(payload)` or `Failure(..)`.
///
/// Serializes flat: `{"success": true, ..payload}` or
/// `{"success": false, "error": "..", "error_kind": ".."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome<T> {
    Success(T),
    Failure(ToolFailure),
}

impl<T> ToolOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<T, ToolFailure> {
        match self {
            Self::Success(payload) => Ok(payload),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl<T: Serialize> ToolOutcome<T> {
    /// The JSON record handed back to the agent.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            failure_json(&ToolFailure::new(
                FailureKind::Remote,
                format!("could not encode result: {}", e),
            ))
        })
    }
}

impl<T> From<Result<T, ToolFailure>> for ToolOutcome<T> {
    fn from(result: Result<T, ToolFailure>) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(failure) => Self::Failure(failure),
        }
    }
}

#[derive(Serialize)]
struct SuccessRecord<'a, T> {
    success: bool,
    #[serde(flatten)]
    payload: &'a T,
}

#[derive(Serialize)]
struct FailureRecord<'a> {
    success: bool,
    error: &'a str,
    error_kind: FailureKind,
}

impl<T: Serialize> Serialize for ToolOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success(payload) => SuccessRecord {
                success: true,
                payload,
            }
            .serialize(serializer),
            Self::Failure(failure) => FailureRecord {
                success: false,
                error: &failure.message,
                error_kind: failure.kind,
            }
            .serialize(serializer),
        }
    }
}

pub(crate) fn failure_json(failure: &ToolFailure) -> Value {
    serde_json::json!({
        "success": false,
        "error": failure.message,
        "error_kind": failure.kind,
    })
}
