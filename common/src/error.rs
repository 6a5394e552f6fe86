use thiserror::Error;

/// Request-shaped input was malformed. Always surfaced as a 4xx with the
/// machine-readable code in the body; device state is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing_field")]
    MissingField,
    #[error("out_of_range")]
    OutOfRange,
    #[error("invalid_input")]
    InvalidInput,
}

impl ValidationError {
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::OutOfRange => "out_of_range",
            Self::InvalidInput => "invalid_input",
        }
    }
}

/// Outcome of a failed station connection attempt. Reported through status
/// fields and response bodies, never raised as a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("SSID_NOT_FOUND")]
    SsidNotFound,
    #[error("AUTH_FAILED")]
    AuthFailed,
    #[error("TIMEOUT")]
    Timeout,
    #[error("UNKNOWN")]
    Unknown,
}

impl ConnectError {
    pub fn code(self) -> &'static str {
        match self {
            Self::SsidNotFound => "SSID_NOT_FOUND",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("scan already in progress")]
    AlreadyInProgress,
    #[error("no scan results yet")]
    NoResultsYet,
}

/// The shared-state lock was not acquired within its bound. The caller
/// skips the update for this tick instead of blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("state lock not acquired within bound")]
pub struct ConcurrencyTimeout;
