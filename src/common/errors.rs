use thiserror::Error;

/// Structured error taxonomy for the data-access core.
///
/// Callers branch on the variant, never on message text. The type is
/// `Clone` because a single flight's outcome is broadcast to every
/// caller that joined it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No response received: connect failure, timeout, or a broken body.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// The response arrived but could not be parsed.
    #[error("malformed response: {0}")]
    Decode(String),

    /// No identity could be established within the resolution timeout.
    #[error("identity resolution failed: {0}")]
    AuthResolution(String),

    /// Identity established but the required capability is missing.
    #[error("access denied: {0}")]
    Forbidden(String),
}

impl ApiError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Network failures are always transient. Backend failures count only
    /// for server-side statuses (5xx) plus request timeout and rate
    /// limiting; a 4xx would fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Backend { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_transient() {
        assert!(ApiError::Network("connection refused".into()).is_transient());
    }

    #[test]
    fn server_statuses_are_transient() {
        for status in [500, 502, 503, 408, 429] {
            let err = ApiError::Backend {
                status,
                message: "x".into(),
            };
            assert!(err.is_transient(), "status {} should be transient", status);
        }
    }

    #[test]
    fn client_statuses_are_not_transient() {
        for status in [400, 401, 403, 404, 409] {
            let err = ApiError::Backend {
                status,
                message: "x".into(),
            };
            assert!(!err.is_transient(), "status {} should not retry", status);
        }
    }

    #[test]
    fn decode_and_auth_errors_are_not_transient() {
        assert!(!ApiError::Decode("bad json".into()).is_transient());
        assert!(!ApiError::AuthResolution("timed out".into()).is_transient());
        assert!(!ApiError::Forbidden("not an admin".into()).is_transient());
    }
}
