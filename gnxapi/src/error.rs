//! Error types for the GNX client

/// Result type alias for GNX API operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when using the GNX client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// API returned an error status or envelope code
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// Envelope was successful but carried no payload
    #[error("Empty response for {0}")]
    EmptyResponse(String),

    /// Configuration error (from gnxconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl Error {
    /// Create an API error
    pub fn api_error(code: u16, msg: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = Error::api_error(404, "Not Found");
        assert_eq!(err.to_string(), "API error 404: Not Found");
    }
}
