//! In-memory students backend used by the tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::api::{HttpError, Request, StudentsApi, Transport};
use crate::cache::QueryCache;

pub const CREATED_AT: &str = "2025-05-28T10:00:00.000Z";

pub fn student_json(id: &str, name: &str, surname: &str) -> Value {
  json!({
    "id": id,
    "name": name,
    "surname": surname,
    "age": 20,
    "phone": "+998 90 000 00 00",
    "avatar": format!("https://cdn.example.com/{}.png", id),
    "createdAt": CREATED_AT,
  })
}

struct BackendState {
  students: Mutex<Vec<Value>>,
  next_id: AtomicU64,
  calls: Mutex<Vec<Request>>,
  failures: Mutex<VecDeque<u16>>,
  /// When set, every request waits for a permit before it is answered
  gate: Option<Semaphore>,
}

/// Mock of the students REST API implementing [`Transport`].
///
/// Records every request, can fail the next N requests with a status, and
/// in gated mode holds requests in flight until [`FakeBackend::release`].
#[derive(Clone)]
pub struct FakeBackend {
  state: Arc<BackendState>,
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::build(None)
  }

  pub fn gated() -> Self {
    Self::build(Some(Semaphore::new(0)))
  }

  fn build(gate: Option<Semaphore>) -> Self {
    Self {
      state: Arc::new(BackendState {
        students: Mutex::new(Vec::new()),
        next_id: AtomicU64::new(1),
        calls: Mutex::new(Vec::new()),
        failures: Mutex::new(VecDeque::new()),
        gate,
      }),
    }
  }

  pub fn cache(&self) -> QueryCache {
    QueryCache::new(Arc::new(self.clone()))
  }

  pub fn api(&self) -> StudentsApi {
    StudentsApi::new(self.cache())
  }

  /// Replace the stored records
  pub fn seed(&self, students: Vec<Value>) {
    let next = students.len() as u64 + 100;
    *self.state.students.lock().unwrap() = students;
    self.state.next_id.store(next, Ordering::SeqCst);
  }

  pub fn students(&self) -> Vec<Value> {
    self.state.students.lock().unwrap().clone()
  }

  /// Let `n` held requests through
  pub fn release(&self, n: usize) {
    if let Some(gate) = &self.state.gate {
      gate.add_permits(n);
    }
  }

  /// Fail the next request (whatever it is) with `status`
  pub fn fail_next(&self, status: u16) {
    self.state.failures.lock().unwrap().push_back(status);
  }

  pub fn calls(&self) -> Vec<Request> {
    self.state.calls.lock().unwrap().clone()
  }

  pub fn count_calls(&self, method: Method, path: &str) -> usize {
    self
      .state
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.method == method && r.path == path)
      .count()
  }

  fn handle(&self, request: &Request) -> Result<Value, HttpError> {
    let not_found = || HttpError::from_status(404, "\"Not found\"");
    let segments: Vec<&str> = request
      .path
      .trim_matches('/')
      .split('/')
      .filter(|s| !s.is_empty())
      .collect();

    let mut students = self.state.students.lock().unwrap();

    match (request.method.as_str(), segments.as_slice()) {
      ("GET", ["student"]) => {
        let search = request
          .params
          .get("search")
          .map(|s| s.to_lowercase())
          .unwrap_or_default();
        let matches: Vec<Value> = students
          .iter()
          .filter(|s| {
            search.is_empty()
              || ["name", "surname", "phone"].iter().any(|field| {
                s[field]
                  .as_str()
                  .map(|v| v.to_lowercase().contains(&search))
                  .unwrap_or(false)
              })
          })
          .cloned()
          .collect();
        Ok(Value::Array(matches))
      }
      ("GET", ["student", id]) => students
        .iter()
        .find(|s| s["id"] == *id)
        .cloned()
        .ok_or_else(not_found),
      ("POST", ["student"]) => {
        let mut record = request.body.clone().unwrap_or_else(|| json!({}));
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        record["id"] = json!(id.to_string());
        record["createdAt"] = json!(CREATED_AT);
        students.push(record.clone());
        Ok(record)
      }
      ("PUT", ["student", id]) => {
        let record = students
          .iter_mut()
          .find(|s| s["id"] == *id)
          .ok_or_else(not_found)?;
        if let (Some(target), Some(Value::Object(changes))) =
          (record.as_object_mut(), request.body.as_ref())
        {
          for (k, v) in changes {
            if k != "id" {
              target.insert(k.clone(), v.clone());
            }
          }
        }
        Ok(record.clone())
      }
      ("DELETE", ["student", id]) => {
        let pos = students
          .iter()
          .position(|s| s["id"] == *id)
          .ok_or_else(not_found)?;
        Ok(students.remove(pos))
      }
      _ => Err(not_found()),
    }
  }
}

impl Transport for FakeBackend {
  fn send(&self, request: Request) -> BoxFuture<'_, Result<Value, HttpError>> {
    async move {
      self.state.calls.lock().unwrap().push(request.clone());

      if let Some(gate) = &self.state.gate {
        if let Ok(permit) = gate.acquire().await {
          permit.forget();
        }
      }

      let failure = self.state.failures.lock().unwrap().pop_front();
      if let Some(status) = failure {
        return Err(HttpError::from_status(
          status,
          r#"{"message":"Something went wrong"}"#,
        ));
      }

      self.handle(&request)
    }
    .boxed()
  }
}
