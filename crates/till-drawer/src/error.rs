//! # Drawer Error Types
//!
//! Errors raised by the drawer layer, and the serializable [`ApiError`] the
//! UI receives.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ValidationError ─► CoreError ─► DrawerError ─► ApiError ─► UI          │
//! │                                      ▲                                  │
//! │            toml / io / unknown draft ┘                                  │
//! │                                                                         │
//! │  UI receives:                                                          │
//! │    { "code": "INSUFFICIENT_CASH",                                       │
//! │      "message": "Withdrawal of 150,000 exceeds drawer balance 100,000" }│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;
use till_core::CoreError;

/// Result type alias for drawer operations.
pub type DrawerResult<T> = Result<T, DrawerError>;

/// Drawer error type.
#[derive(Debug, Error)]
pub enum DrawerError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A ledger, session or settlement rule was violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No session is open on this drawer.
    #[error("No cash session is open on this drawer")]
    NoOpenSession,

    /// The settlement draft id is unknown (never begun, confirmed or discarded).
    #[error("Settlement draft not found: {0}")]
    DraftNotFound(String),

    /// The order already has a draft in progress.
    #[error("Order {0} already has a settlement in progress")]
    DraftInProgress(String),

    /// Requested split exceeds the configured limit.
    #[error("Cannot split into {parts} parts, this drawer allows at most {max}")]
    SplitLimit { parts: u32, max: u32 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid drawer configuration.
    #[error("Invalid drawer configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),
}

impl From<std::io::Error> for DrawerError {
    fn from(err: std::io::Error) -> Self {
        DrawerError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DrawerError {
    fn from(err: toml::de::Error) -> Self {
        DrawerError::ConfigLoadFailed(err.to_string())
    }
}

impl DrawerError {
    /// Checks if the error is a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DrawerError::InvalidConfig(_) | DrawerError::ConfigLoadFailed(_)
        )
    }
}

// =============================================================================
// API Error
// =============================================================================

/// Error payload returned to the UI.
///
/// ```json
/// {
///   "code": "SESSION_STATE",
///   "message": "Cash session is not open: 5b1c…"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Session, draft or allocation not found
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Operation not allowed in the session's current state
    SessionState,

    /// Not enough cash in the drawer
    InsufficientCash,

    /// Payments do not settle the order
    PaymentError,

    /// Drawer configuration problem
    ConfigError,

    /// Internal error
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::SessionNotFound(_) | CoreError::AllocationNotFound(_) => ErrorCode::NotFound,
            CoreError::SessionAlreadyOpen { .. }
            | CoreError::SessionNotOpen(_)
            | CoreError::ReservedMovementType(_) => ErrorCode::SessionState,
            CoreError::WithdrawalExceedsBalance { .. } => ErrorCode::InsufficientCash,
            CoreError::AllocationMismatch { .. }
            | CoreError::AlreadySettled(_)
            | CoreError::OrderTotalMismatch { .. } => ErrorCode::PaymentError,
            CoreError::NonPositiveAmount { .. }
            | CoreError::InvalidCount { .. }
            | CoreError::UnknownDenomination(_)
            | CoreError::InvalidSplit { .. }
            | CoreError::Validation(_) => ErrorCode::ValidationError,
            CoreError::InvalidSnapshot(_) | CoreError::Export(_) => {
                tracing::error!(error = %err, "Drawer storage failure");
                ErrorCode::Internal
            }
        };
        ApiError::new(code, err.to_string())
    }
}

/// Converts drawer errors to API errors.
impl From<DrawerError> for ApiError {
    fn from(err: DrawerError) -> Self {
        match err {
            DrawerError::Core(e) => ApiError::from(e),
            DrawerError::NoOpenSession => ApiError::new(ErrorCode::SessionState, err.to_string()),
            DrawerError::DraftNotFound(_) => ApiError::new(ErrorCode::NotFound, err.to_string()),
            DrawerError::DraftInProgress(_) => ApiError::new(ErrorCode::PaymentError, err.to_string()),
            DrawerError::SplitLimit { .. } => ApiError::validation(err.to_string()),
            DrawerError::InvalidConfig(_) | DrawerError::ConfigLoadFailed(_) => {
                ApiError::new(ErrorCode::ConfigError, err.to_string())
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use till_core::Money;

    #[test]
    fn test_insufficient_cash_code() {
        let err = CoreError::WithdrawalExceedsBalance {
            requested: Money::from_units(150_000),
            available: Money::from_units(100_000),
        };
        let api = ApiError::from(DrawerError::from(err));
        assert_eq!(api.code, ErrorCode::InsufficientCash);
        assert_eq!(api.message, "Withdrawal of 150,000 exceeds drawer balance 100,000");
    }

    #[test]
    fn test_api_error_serializes_screaming_code() {
        let api = ApiError::from(DrawerError::NoOpenSession);
        let json = serde_json::to_string(&api).unwrap();
        assert!(json.contains("\"code\":\"SESSION_STATE\""));
    }

    #[test]
    fn test_config_errors() {
        assert!(DrawerError::InvalidConfig("x".into()).is_config_error());
        assert!(!DrawerError::NoOpenSession.is_config_error());
    }
}
