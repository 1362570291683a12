use std::time::Duration;

use chrono::{DateTime, Local, Utc};

use crate::api::HttpError;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// `createdAt` in local time, or a dash when the backend left it out
pub fn format_created_at(created_at: Option<DateTime<Utc>>) -> String {
  match created_at {
    Some(t) => t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    None => "-".to_string(),
  }
}

pub fn format_age(age: Option<u32>) -> String {
  age.map(|age| age.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Avatars are URLs; the table only shows whether one is set.
pub fn avatar_marker(avatar: Option<&str>) -> &'static str {
  match avatar {
    Some(url) if !url.trim().is_empty() => "●",
    _ => "○",
  }
}

/// Toast text for a failed request: the server's message when it sent one
pub fn error_message(error: &HttpError, fallback: &str) -> String {
  match error.server_message() {
    Some(message) if !message.trim().is_empty() => message.to_string(),
    _ => fallback.to_string(),
  }
}

/// "0.4s", "12.0s", "3m 05s"
pub fn format_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  if secs < 60 {
    format!("{:.1}s", elapsed.as_secs_f64())
  } else {
    format!("{}m {:02}s", secs / 60, secs % 60)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Żaneta Ünal", 6), "Żan...");
  }

  #[test]
  fn test_created_at_missing() {
    assert_eq!(format_created_at(None), "-");
  }

  #[test]
  fn test_format_age() {
    assert_eq!(format_age(Some(21)), "21");
    assert_eq!(format_age(None), "-");
  }

  #[test]
  fn test_avatar_marker() {
    assert_eq!(avatar_marker(Some("https://cdn/x.png")), "●");
    assert_eq!(avatar_marker(Some("")), "○");
    assert_eq!(avatar_marker(None), "○");
  }

  #[test]
  fn test_error_message_prefers_server_text() {
    let fallback = "Failed to save student. Please try again.";
    let err = HttpError::Status {
      status: 400,
      payload: Some(json!({ "message": "Phone already taken" })),
    };
    assert_eq!(error_message(&err, fallback), "Phone already taken");

    let err = HttpError::Status {
      status: 500,
      payload: Some(json!({ "error": true })),
    };
    assert_eq!(error_message(&err, fallback), fallback);

    let proxy_page = HttpError::from_status(502, "<html><body>Bad Gateway</body></html>");
    assert_eq!(error_message(&proxy_page, fallback), fallback);
    assert_eq!(
      error_message(&HttpError::Network("refused".to_string()), fallback),
      fallback
    );
  }

  #[test]
  fn test_format_elapsed() {
    assert_eq!(format_elapsed(Duration::from_millis(400)), "0.4s");
    assert_eq!(format_elapsed(Duration::from_secs(185)), "3m 05s");
  }
}
