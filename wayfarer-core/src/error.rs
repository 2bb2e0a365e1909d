//! Error types for Wayfarer operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// CALLER-FACING ERROR CODES
// ============================================================================

/// The fixed error-code taxonomy exposed to callers and to hosted pages.
///
/// Codes are stable wire identifiers; partner applications switch on them,
/// so variants are never renamed or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthExpired,
    PinningFail,
    OriginBlocked,
    NetTimeout,
    RateLimited,
    ValidationFail,
    IdempotentReplay,
    ScaRequired,
    ComplianceHold,
    MoreInfo,
    Unknown,
}

impl ErrorCode {
    /// Wire form of the code (`SCREAMING_SNAKE_CASE`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthExpired => "AUTH_EXPIRED",
            ErrorCode::PinningFail => "PINNING_FAIL",
            ErrorCode::OriginBlocked => "ORIGIN_BLOCKED",
            ErrorCode::NetTimeout => "NET_TIMEOUT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ValidationFail => "VALIDATION_FAIL",
            ErrorCode::IdempotentReplay => "IDEMPOTENT_REPLAY",
            ErrorCode::ScaRequired => "SCA_REQUIRED",
            ErrorCode::ComplianceHold => "COMPLIANCE_HOLD",
            ErrorCode::MoreInfo => "MORE_INFO",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// Whether a journey hitting this code may be retried by the caller.
    pub fn recoverable(&self) -> bool {
        matches!(self, ErrorCode::NetTimeout | ErrorCode::RateLimited)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SUBSYSTEM ERRORS
// ============================================================================

/// Manifest loading and validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Network error fetching manifest: {reason}")]
    NetworkError { reason: String },

    #[error("Invalid manifest response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Failed to decode manifest: {reason}")]
    DecodingError { reason: String },

    #[error("No signing key for kid '{kid}'")]
    KeyNotFound { kid: String },

    #[error("Manifest signature verification failed: {reason}")]
    SignatureVerificationFailed { reason: String },

    #[error("Manifest validation failed: {reason}")]
    ValidationFailed { reason: String },
}

/// JWS signing and verification errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SigningError {
    #[error("Malformed JWS: {reason}")]
    MalformedJws { reason: String },

    #[error("Unsupported JWS algorithm: {alg}")]
    UnsupportedAlgorithm { alg: String },

    #[error("No signing key for kid '{kid}'")]
    KeyNotFound { kid: String },

    #[error("Signature invalid: {reason}")]
    InvalidSignature { reason: String },

    #[error("Key material error: {reason}")]
    KeyMaterial { reason: String },

    #[error("Trust material refresh is not supported by this build")]
    RefreshUnsupported,
}

/// OpenAPI bundle and request building errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("Invalid OpenAPI document: {reason}")]
    InvalidDocument { reason: String },

    #[error("Invalid request body: {reason}")]
    InvalidBody { reason: String },

    #[error("Failed to build request: {reason}")]
    RequestBuildFailed { reason: String },
}

/// API client errors, already mapped onto the caller-facing taxonomy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiClientError {
    #[error("Failed to build request: {0}")]
    RequestBuildFailed(#[from] ResolverError),

    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("HTTP {status} mapped to {code}")]
    HttpError { status: i32, code: ErrorCode },

    #[error("Retry limit exceeded after {attempts} attempts (last status {status}, {code})")]
    RetryLimitExceeded {
        attempts: u32,
        status: i32,
        code: ErrorCode,
    },
}

impl ApiClientError {
    /// The caller-facing code this error maps to.
    pub fn mapped_code(&self) -> ErrorCode {
        match self {
            ApiClientError::HttpError { code, .. } => *code,
            ApiClientError::RetryLimitExceeded { code, .. } => *code,
            ApiClientError::Transport { .. } => ErrorCode::Unknown,
            ApiClientError::RequestBuildFailed(_) => ErrorCode::Unknown,
        }
    }

    /// Whether the mapped code is recoverable for the caller.
    pub fn recoverable(&self) -> bool {
        self.mapped_code().recoverable()
    }
}

/// State machine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown step: {step_id}")]
    UnknownStep { step_id: String },

    #[error("Journey already reached a terminal step")]
    Halted,
}

/// Web bridge errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Origin not allowed: {origin}")]
    OriginBlocked { origin: String },

    #[error("Method not allowed while the current step is active: {method}")]
    Forbidden { method: String },

    #[error("Bridge has not completed its handshake")]
    NotReady,

    #[error("Plugin failure: {reason}")]
    Plugin { reason: String },
}

/// Session and snapshot store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Secure store rejected the snapshot write")]
    StoreWriteFailed,

    #[error("No snapshot available for this process identity")]
    SnapshotNotFound,

    #[error("Snapshot decode failed: {reason}")]
    SnapshotDecode { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

// ============================================================================
// MASTER ERROR TYPE
// ============================================================================

/// Master error type for all Wayfarer runtime errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WayfarerError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("OpenAPI error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("API client error: {0}")]
    Api(#[from] ApiClientError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Wayfarer operations.
pub type WayfarerResult<T> = Result<T, WayfarerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_wire_form_is_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::IdempotentReplay).unwrap();
        assert_eq!(json, "\"IDEMPOTENT_REPLAY\"");
        assert_eq!(ErrorCode::ScaRequired.to_string(), "SCA_REQUIRED");
    }

    #[test]
    fn error_code_roundtrips_through_serde() {
        for code in [
            ErrorCode::AuthExpired,
            ErrorCode::PinningFail,
            ErrorCode::OriginBlocked,
            ErrorCode::NetTimeout,
            ErrorCode::RateLimited,
            ErrorCode::ValidationFail,
            ErrorCode::IdempotentReplay,
            ErrorCode::ScaRequired,
            ErrorCode::ComplianceHold,
            ErrorCode::MoreInfo,
            ErrorCode::Unknown,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }

    #[test]
    fn only_timeout_and_rate_limit_are_recoverable() {
        assert!(ErrorCode::NetTimeout.recoverable());
        assert!(ErrorCode::RateLimited.recoverable());
        assert!(!ErrorCode::AuthExpired.recoverable());
        assert!(!ErrorCode::Unknown.recoverable());
        assert!(!ErrorCode::ValidationFail.recoverable());
    }

    #[test]
    fn api_client_error_derives_code_and_recoverability() {
        let err = ApiClientError::HttpError {
            status: 429,
            code: ErrorCode::RateLimited,
        };
        assert_eq!(err.mapped_code(), ErrorCode::RateLimited);
        assert!(err.recoverable());

        let err = ApiClientError::Transport {
            reason: "connection reset".to_string(),
        };
        assert_eq!(err.mapped_code(), ErrorCode::Unknown);
        assert!(!err.recoverable());
    }
}
