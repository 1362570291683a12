use serde_json::Value;

/// Failure of a single HTTP exchange.
///
/// Errors are cloned into every subscriber of a failed cache entry, so they
/// carry owned, cheaply cloneable data only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HttpError {
  /// The request never produced a response (connection refused, DNS, timeout)
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a non-2xx status
  #[error("HTTP {status}")]
  Status {
    status: u16,
    /// Decoded error body; raw text is kept as a JSON string
    payload: Option<Value>,
  },

  /// A 2xx body that was not valid JSON or did not match the expected shape
  #[error("failed to decode response: {0}")]
  Decode(String),
}

impl HttpError {
  /// Build a status error from the raw response body.
  pub fn from_status(status: u16, body: &str) -> Self {
    let payload = if body.trim().is_empty() {
      None
    } else {
      Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
    };
    HttpError::Status { status, payload }
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      HttpError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Server-provided `message` text, if the error body was a JSON object
  /// carrying one. Raw text bodies (proxy error pages and the like) don't count.
  pub fn server_message(&self) -> Option<&str> {
    match self {
      HttpError::Status {
        payload: Some(Value::Object(obj)),
        ..
      } => obj.get("message").and_then(|m| m.as_str()),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for HttpError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      HttpError::Decode(err.to_string())
    } else {
      HttpError::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for HttpError {
  fn from(err: serde_json::Error) -> Self {
    HttpError::Decode(err.to_string())
  }
}
