//! Error types for tasksync.
//!
//! Library modules return `Result<T>`; the binary wraps these in `color_eyre`.

use thiserror::Error;

/// Result type alias for tasksync operations
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the synchronisation core can surface
#[derive(Error, Debug)]
pub enum Error {
  /// Malformed identifier, or a local id used where a server id is required.
  /// Raised before any network call is made.
  #[error("{0}")]
  Validation(String),

  /// No response was obtained at all
  #[error("network error: {0}")]
  Network(String),

  /// A response was obtained but it is not 2xx
  #[error("server returned {status}: {message}")]
  Server { status: u16, message: String },

  #[error("cache storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("lock poisoned: {0}")]
  Poisoned(String),

  #[error("malformed response: {0}")]
  Decode(String),

  #[error("invalid url: {0}")]
  Url(#[from] url::ParseError),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl Error {
  /// Human-readable message recorded in the sync status after a failure.
  pub fn message(&self) -> String {
    match self {
      Error::Validation(msg) | Error::Network(msg) | Error::Decode(msg) => msg.clone(),
      Error::Server { message, .. } => message.clone(),
      other => other.to_string(),
    }
  }

  /// True when no response was obtained, i.e. a cached fallback may apply.
  pub fn is_network(&self) -> bool {
    matches!(self, Error::Network(_))
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Error::Decode(e.to_string())
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    Error::Network(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_server_message_is_body_text() {
    let err = Error::Server {
      status: 404,
      message: "Failed to archive task or task not found".to_string(),
    };
    assert_eq!(err.message(), "Failed to archive task or task not found");
    assert_eq!(
      err.to_string(),
      "server returned 404: Failed to archive task or task not found"
    );
  }

  #[test]
  fn test_only_network_errors_allow_fallback() {
    assert!(Error::Network("connection refused".into()).is_network());
    assert!(!Error::Server {
      status: 500,
      message: "boom".into()
    }
    .is_network());
    assert!(!Error::Validation("bad id".into()).is_network());
  }

  #[test]
  fn test_poisoned_message_names_no_component() {
    let err = Error::Poisoned("PoisonError { .. }".into());
    assert_eq!(err.message(), "lock poisoned: PoisonError { .. }");
  }
}
