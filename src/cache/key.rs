//! Cache keys: an operation signature reduced to a stable digest.

use sha2::{Digest, Sha256};

use crate::api::Params;

/// The signature of a read: endpoint plus its query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryKey {
  pub endpoint: String,
  pub params: Params,
}

impl QueryKey {
  pub fn new(endpoint: impl Into<String>, params: Params) -> Self {
    Self {
      endpoint: normalize_endpoint(&endpoint.into()),
      params,
    }
  }

  /// SHA256 of the serialized signature, hex encoded.
  ///
  /// Parameters are kept in a sorted map, so insertion order never changes
  /// the hash. Keys and values are form-encoded so `&` or `=` inside a value
  /// can't pass for a separator.
  pub fn cache_hash(&self) -> String {
    let params = url::form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.params.iter())
      .finish();
    let input = format!("{}?{}", self.endpoint, params);

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form for logs
  pub fn description(&self) -> String {
    if self.params.is_empty() {
      self.endpoint.clone()
    } else {
      let params = self
        .params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
      format!("{}?{}", self.endpoint, params)
    }
  }
}

/// `/student/` and `student` address the same collection.
fn normalize_endpoint(endpoint: &str) -> String {
  let trimmed = endpoint.trim().trim_matches('/');
  format!("/{}", trimmed)
}
