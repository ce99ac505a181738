use thiserror::Error;

/// Errors returned when talking to a speaker
#[derive(Debug, Error)]
pub enum ApiError {
    /// The speaker could not be reached, or the HTTP exchange failed
    #[error("Network error: {0}")]
    Network(String),

    /// The speaker answered with something we could not read
    #[error("Parse error: {0}")]
    Parse(String),

    /// The speaker understood the request and refused it
    #[error("Device error: return code {0}")]
    Device(u16),

    /// The audio transport rejected a control request
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::Parse(error.to_string())
        } else if error.is_timeout() {
            ApiError::Network(format!("request timed out: {}", error))
        } else {
            ApiError::Network(error.to_string())
        }
    }
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;
