//! Remote provider error types

use thiserror::Error;

/// Errors that can occur while talking to the remote host
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Access denied ({status}): check the access token")]
    Unauthorized { status: u16 },

    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Build the error for a non-success HTTP status
    pub fn from_status(status: u16, url: &str, body: String) -> Self {
        match status {
            401 | 403 => RemoteError::Unauthorized { status },
            404 => RemoteError::NotFound(url.to_string()),
            _ => RemoteError::Api { status, message: body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            RemoteError::from_status(401, "u", String::new()),
            RemoteError::Unauthorized { status: 401 }
        ));
        assert!(matches!(
            RemoteError::from_status(403, "u", String::new()),
            RemoteError::Unauthorized { status: 403 }
        ));
        assert!(matches!(RemoteError::from_status(404, "u", String::new()), RemoteError::NotFound(_)));
        match RemoteError::from_status(500, "u", "boom".to_string()) {
            RemoteError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("Expected Api, got {:?}", other),
        }
    }
}
