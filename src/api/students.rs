//! The students resource: reads provide `STUDENTS`, writes invalidate it.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::HttpError;
use super::transport::Params;
use super::types::{Student, StudentDraft};
use crate::cache::{QueryCache, Tag};
use crate::query::Subscription;

pub const STUDENTS_ENDPOINT: &str = "/student";

/// Query parameter the backend uses for full-text filtering
pub const SEARCH_PARAM: &str = "search";

#[derive(Clone)]
pub struct StudentsApi {
  cache: QueryCache,
}

impl StudentsApi {
  pub fn new(cache: QueryCache) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// `GET /student`, parameters passed through untouched.
  pub fn list(&self, params: Params) -> Subscription<Vec<Student>> {
    self.cache.query(STUDENTS_ENDPOINT, params, &[Tag::STUDENTS])
  }

  /// `GET /student/{id}`
  pub fn get(&self, id: &str) -> Subscription<Student> {
    self
      .cache
      .query(&student_path(id), Params::new(), &[Tag::STUDENTS])
  }

  /// `POST /student`
  pub async fn create(&self, draft: &StudentDraft) -> Result<Student, HttpError> {
    let body = serde_json::to_value(draft)?;
    let value = self
      .cache
      .mutate(Method::POST, STUDENTS_ENDPOINT, Some(body), &[Tag::STUDENTS])
      .await?;
    decode(value)
  }

  /// `PUT /student/{id}`
  pub async fn update(&self, id: &str, draft: &StudentDraft) -> Result<Student, HttpError> {
    let body = serde_json::to_value(draft)?;
    let value = self
      .cache
      .mutate(Method::PUT, &student_path(id), Some(body), &[Tag::STUDENTS])
      .await?;
    decode(value)
  }

  /// `DELETE /student/{id}`. The response body is ignored.
  pub async fn delete(&self, id: &str) -> Result<(), HttpError> {
    self
      .cache
      .mutate(Method::DELETE, &student_path(id), None, &[Tag::STUDENTS])
      .await?;
    Ok(())
  }
}

/// List parameters for a search box value; blank text means no filter.
pub fn search_params(text: &str) -> Params {
  let mut params = Params::new();
  let text = text.trim();
  if !text.is_empty() {
    params.insert(SEARCH_PARAM.to_string(), text.to_string());
  }
  params
}

fn student_path(id: &str) -> String {
  format!("{}/{}", STUDENTS_ENDPOINT, id)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, HttpError> {
  Ok(serde_json::from_value(value)?)
}
