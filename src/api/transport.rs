//! HTTP transport: one request in, parsed JSON or a structured error out.

use std::collections::BTreeMap;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::error::HttpError;
use crate::config::Config;

/// Query parameters. Ordered so that equal parameter sets serialize equally.
pub type Params = BTreeMap<String, String>;

/// A request relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  pub path: String,
  pub params: Params,
  pub body: Option<Value>,
}

impl Request {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      params: Params::new(),
      body: None,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::GET, path)
  }

  pub fn with_params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  pub fn with_body(mut self, body: Option<Value>) -> Self {
    self.body = body;
    self
  }
}

/// Something that can execute a [`Request`].
///
/// The cache layer only talks to this trait, which keeps it independent of
/// reqwest and lets tests plug in an in-memory backend.
pub trait Transport: Send + Sync {
  fn send(&self, request: Request) -> BoxFuture<'_, Result<Value, HttpError>>;
}

/// reqwest-backed transport with a static bearer credential.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
  token: String,
}

impl HttpTransport {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;
    Self::with_token(&config.api.base_url, config.api.timeout_secs, token)
  }

  pub fn with_token(base_url: &str, timeout_secs: Option<u64>, token: String) -> Result<Self> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid base URL '{}': {}", base_url, e))?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  async fn execute(&self, request: Request) -> Result<Value, HttpError> {
    let url = build_url(&self.base_url, &request.path, &request.params);
    debug!(method = %request.method, %url, "sending request");

    let mut builder = self
      .client
      .request(request.method.clone(), url.clone())
      .bearer_auth(&self.token);
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|e| {
      warn!(method = %request.method, %url, error = %e, "request failed");
      HttpError::from(e)
    })?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
      warn!(method = %request.method, %url, status = status.as_u16(), "non-success response");
      return Err(HttpError::from_status(status.as_u16(), &text));
    }

    debug!(method = %request.method, %url, status = status.as_u16(), "request finished");

    if text.trim().is_empty() {
      return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: Request) -> BoxFuture<'_, Result<Value, HttpError>> {
    self.execute(request).boxed()
  }
}

/// Join `path` onto the base URL (keeping any base path prefix) and append
/// the query parameters.
pub fn build_url(base: &Url, path: &str, params: &Params) -> Url {
  let mut url = base.clone();
  let joined = format!(
    "{}/{}",
    base.path().trim_end_matches('/'),
    path.trim_start_matches('/')
  );
  url.set_path(&joined);
  url.set_query(None);
  if !params.is_empty() {
    url.query_pairs_mut().extend_pairs(params.iter());
  }
  url
}
