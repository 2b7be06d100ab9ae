//! Diameter error types

use std::time::Duration;

use thiserror::Error;

/// Diameter error type
#[derive(Error, Debug)]
pub enum DiameterError {
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Invalid AVP: {0}")]
    InvalidAvp(String),

    #[error("Missing mandatory AVP: {0}")]
    MissingAvp(String),

    #[error("Buffer too small: need {needed}, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Unexpected command code {actual}, expected {expected}")]
    UnexpectedCommand { expected: u32, actual: u32 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection to {0} is closed")]
    ConnectionClosed(String),

    #[error("Connections to {server} are disabled for another {remaining:?}")]
    ConnectionDisabled { server: String, remaining: Duration },

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),
}

impl DiameterError {
    /// Errors raised while decoding or interpreting a received message
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            DiameterError::InvalidMessage(_)
                | DiameterError::InvalidAvp(_)
                | DiameterError::MissingAvp(_)
                | DiameterError::BufferTooSmall { .. }
                | DiameterError::UnexpectedCommand { .. }
        )
    }
}

/// Diameter result type
pub type DiameterResult<T> = Result<T, DiameterError>;

/// Base protocol Result-Code values (RFC 6733) used by this library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResultCode {
    Success = 2001,
    LimitedSuccess = 2002,
    UnableToDeliver = 3002,
    TooBusy = 3004,
    AuthenticationRejected = 4001,
    AuthorizationRejected = 5003,
    MissingAvp = 5005,
    UnableToComply = 5012,
}

impl ResultCode {
    /// 2xxx result class
    pub fn is_success_code(code: u32) -> bool {
        (2000..3000).contains(&code)
    }

    /// 4xxx result class
    pub fn is_transient_code(code: u32) -> bool {
        (4000..5000).contains(&code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_classes() {
        assert!(ResultCode::is_success_code(ResultCode::Success as u32));
        assert!(ResultCode::is_success_code(ResultCode::LimitedSuccess as u32));
        assert!(!ResultCode::is_success_code(ResultCode::UnableToComply as u32));
        assert!(ResultCode::is_transient_code(ResultCode::AuthenticationRejected as u32));
    }

    #[test]
    fn test_parse_error_classification() {
        assert!(DiameterError::MissingAvp("Session-Id".into()).is_parse_error());
        assert!(DiameterError::UnexpectedCommand { expected: 303, actual: 301 }.is_parse_error());
        assert!(!DiameterError::ConnectionClosed("hss".into()).is_parse_error());
    }
}
