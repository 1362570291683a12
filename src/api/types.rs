use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A student record as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub surname: String,
  /// `None` when the backend holds something that is not a whole number
  #[serde(default, deserialize_with = "deserialize_age")]
  pub age: Option<u32>,
  #[serde(default)]
  pub phone: String,
  /// Display-only; nothing in the panel edits it
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub avatar: Option<String>,
  #[serde(
    rename = "createdAt",
    default,
    deserialize_with = "deserialize_created_at",
    skip_serializing_if = "Option::is_none"
  )]
  pub created_at: Option<DateTime<Utc>>,
}

impl Student {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.name, self.surname).trim().to_string()
  }
}

/// Write payload for create and update. Never carries `id` or `createdAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentDraft {
  pub name: String,
  pub surname: String,
  pub age: u32,
  pub phone: String,
}

/// The backend stores whatever the form sent, so age shows up as a number,
/// a numeric string, or junk. Anything that is not a non-negative whole
/// number decodes to `None` so one bad record never poisons a whole list.
fn deserialize_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(match value {
    Value::Number(n) => match (n.as_u64(), n.as_f64()) {
      (Some(i), _) => u32::try_from(i).ok(),
      (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Some(f as u32),
      _ => None,
    },
    Value::String(s) => s.trim().parse::<u32>().ok(),
    _ => None,
  })
}

/// RFC 3339 text or a Unix timestamp (seconds, or milliseconds when large).
/// Anything else decodes to `None`.
fn deserialize_created_at<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(match value {
    Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
      .ok()
      .map(|t| t.with_timezone(&Utc)),
    Value::Number(n) => n.as_i64().and_then(|ts| {
      if ts.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(ts)
      } else {
        DateTime::from_timestamp(ts, 0)
      }
    }),
    _ => None,
  })
}
