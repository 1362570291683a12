//! The query cache: deduplicated reads, tag-based invalidation, subscriber
//! notification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::entry::CacheEntry;
use super::key::QueryKey;
use super::tags::{Tag, TagRegistry};
use crate::api::{HttpError, Params, Request, Transport};
use crate::query::Subscription;

#[derive(Default)]
struct CacheInner {
  entries: HashMap<String, CacheEntry>,
  tags: TagRegistry,
}

/// Client-side cache of server reads.
///
/// Cloning is cheap and every clone shares the same entries. The lock is
/// never held across an await; requests run on spawned tasks and write their
/// result back through [`QueryCache::settle`].
#[derive(Clone)]
pub struct QueryCache {
  transport: Arc<dyn Transport>,
  inner: Arc<Mutex<CacheInner>>,
  /// Successful entries older than this refetch on the next subscription
  stale_time: Option<Duration>,
}

impl QueryCache {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self {
      transport,
      inner: Arc::new(Mutex::new(CacheInner::default())),
      stale_time: None,
    }
  }

  pub fn with_stale_time(mut self, stale_time: Option<Duration>) -> Self {
    self.stale_time = stale_time;
    self
  }

  fn lock(&self) -> MutexGuard<'_, CacheInner> {
    // Entries stay consistent between statements, so a poisoned lock is usable
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Subscribe to the read `GET endpoint?params`, providing `tags`.
  ///
  /// Serves the cached entry when it is fresh, attaches to the in-flight
  /// request when one is loading, and otherwise starts a request. Never
  /// fails: errors show up in the subscription's state.
  pub fn query<T>(&self, endpoint: &str, params: Params, tags: &[Tag]) -> Subscription<T>
  where
    T: DeserializeOwned + Clone,
  {
    let key = QueryKey::new(endpoint, params);
    let hash = key.cache_hash();

    let (receiver, request) = {
      let mut guard = self.lock();
      let inner = &mut *guard;

      let entry = inner
        .entries
        .entry(hash.clone())
        .or_insert_with(|| CacheEntry::new(key));
      entry.add_tags(tags);
      inner.tags.register(&hash, tags);

      let receiver = entry.subscribe();
      let request = if entry.needs_fetch(self.stale_time) {
        entry.begin_loading();
        Some(entry.request())
      } else {
        debug!(key = %entry.key().description(), status = ?entry.status(), "serving from cache");
        None
      };
      (receiver, request)
    };

    if let Some(request) = request {
      self.spawn_fetch(hash.clone(), request);
    }

    Subscription::new(self.clone(), hash, receiver)
  }

  /// Send a write and, when it succeeds, invalidate `invalidates`.
  ///
  /// A failed write performs no invalidation and returns the transport error
  /// unchanged.
  pub async fn mutate(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
    invalidates: &[Tag],
  ) -> Result<Value, HttpError> {
    let request = Request::new(method.clone(), endpoint).with_body(body);

    match self.transport.send(request).await {
      Ok(value) => {
        debug!(%method, endpoint, "mutation succeeded");
        self.invalidate(invalidates);
        Ok(value)
      }
      Err(err) => {
        warn!(%method, endpoint, error = %err, "mutation failed, nothing invalidated");
        Err(err)
      }
    }
  }

  /// Mark every entry carrying one of `tags` stale and refetch the ones that
  /// are being watched. Returns the number of requests started.
  pub fn invalidate(&self, tags: &[Tag]) -> usize {
    let refetches: Vec<(String, Request)> = {
      let mut guard = self.lock();
      let inner = &mut *guard;
      inner
        .tags
        .keys_for(tags)
        .into_iter()
        .filter_map(|hash| {
          let entry = inner.entries.get_mut(&hash)?;
          entry.invalidate().map(|request| (hash, request))
        })
        .collect()
    };

    let count = refetches.len();
    info!(?tags, refetches = count, "invalidated tags");

    for (hash, request) in refetches {
      self.spawn_fetch(hash, request);
    }
    count
  }

  /// Manually refetch one entry. Ignored while it is already loading.
  pub(crate) fn refetch(&self, hash: &str) -> bool {
    let request = {
      let mut inner = self.lock();
      match inner.entries.get_mut(hash) {
        Some(entry) if !entry.is_loading() => {
          entry.begin_loading();
          Some(entry.request())
        }
        _ => None,
      }
    };

    match request {
      Some(request) => {
        self.spawn_fetch(hash.to_string(), request);
        true
      }
      None => false,
    }
  }

  /// Status of the entry for `GET endpoint?params`, without subscribing.
  #[cfg(test)]
  pub fn status(&self, endpoint: &str, params: Params) -> crate::query::QueryStatus {
    let hash = QueryKey::new(endpoint, params).cache_hash();
    self
      .lock()
      .entries
      .get(&hash)
      .map(|entry| entry.status())
      .unwrap_or(crate::query::QueryStatus::Uninitialized)
  }

  /// Drop entries nobody has watched or refreshed for `max_idle`.
  pub fn evict_unused(&self, max_idle: Duration) -> usize {
    let mut guard = self.lock();
    let inner = &mut *guard;

    let evicted: Vec<String> = inner
      .entries
      .iter()
      .filter(|(_, entry)| {
        entry.subscriber_count() == 0 && !entry.is_loading() && entry.idle_for() >= max_idle
      })
      .map(|(hash, _)| hash.clone())
      .collect();

    for hash in &evicted {
      inner.entries.remove(hash);
      inner.tags.forget(hash);
    }

    if !evicted.is_empty() {
      debug!(count = evicted.len(), "evicted unused cache entries");
    }
    evicted.len()
  }

  pub fn entry_count(&self) -> usize {
    self.lock().entries.len()
  }

  fn spawn_fetch(&self, hash: String, request: Request) {
    let cache = self.clone();
    tokio::spawn(async move {
      debug!(path = %request.path, "fetching");
      let result = cache.transport.send(request).await;
      cache.settle(&hash, result);
    });
  }

  fn settle(&self, hash: &str, result: Result<Value, HttpError>) {
    let follow_up = {
      let mut inner = self.lock();
      let Some(entry) = inner.entries.get_mut(hash) else {
        return;
      };
      if let Err(err) = &result {
        warn!(
          key = %entry.key().description(),
          tags = ?entry.tags(),
          error = %err,
          "query failed"
        );
      }
      entry.settle(result);
      entry.take_follow_up()
    };

    if let Some(request) = follow_up {
      debug!(path = %request.path, "refetching after in-flight invalidation");
      self.spawn_fetch(hash.to_string(), request);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Student;
  use crate::query::{QueryState, QueryStatus};
  use crate::testing::{student_json, FakeBackend};
  use serde_json::json;

  const CENTERS: Tag = Tag::new("CENTERS");

  fn search(q: &str) -> Params {
    let mut params = Params::new();
    params.insert("search".to_string(), q.to_string());
    params
  }

  #[tokio::test]
  async fn test_query_transitions_through_loading() {
    let backend = FakeBackend::gated();
    backend.seed(vec![student_json("1", "Ann", "Lee")]);
    let cache = backend.cache();

    assert_eq!(
      cache.status("/student", Params::new()),
      QueryStatus::Uninitialized
    );

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    assert!(sub.is_loading());
    assert_eq!(cache.status("/student", Params::new()), QueryStatus::Loading);

    backend.release(1);
    assert!(sub.changed().await);
    assert!(sub.state().is_success());
    assert_eq!(sub.data().map(|v| v.len()), Some(1));
    assert_eq!(cache.status("/student", Params::new()), QueryStatus::Success);
  }

  #[tokio::test]
  async fn test_query_error_transitions_through_loading() {
    let backend = FakeBackend::gated();
    backend.fail_next(500);
    let cache = backend.cache();

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    assert!(sub.is_loading());

    backend.release(1);
    let state = sub.settled().await;
    assert_eq!(state.error().and_then(|e| e.status()), Some(500));
  }

  #[tokio::test]
  async fn test_concurrent_identical_queries_share_one_request() {
    let backend = FakeBackend::gated();
    let cache = backend.cache();

    let mut a = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    let mut b = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    let mut c = cache.query::<Vec<Student>>("student/", Params::new(), &[Tag::STUDENTS]);

    backend.release(10);
    a.settled().await;
    b.settled().await;
    c.settled().await;

    assert_eq!(backend.count_calls(Method::GET, "/student"), 1);
    assert!(a.state().is_success() && b.state().is_success() && c.state().is_success());
  }

  #[tokio::test]
  async fn test_fresh_entry_served_without_network() {
    let backend = FakeBackend::new();
    let cache = backend.cache();

    let mut first = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    first.settled().await;

    let second = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    assert!(second.state().is_success());
    assert_eq!(backend.count_calls(Method::GET, "/student"), 1);
  }

  #[tokio::test]
  async fn test_different_params_are_different_entries() {
    let backend = FakeBackend::new();
    let cache = backend.cache();

    let mut a = cache.query::<Vec<Student>>("/student", search("ann"), &[Tag::STUDENTS]);
    let mut b = cache.query::<Vec<Student>>("/student", search("bo"), &[Tag::STUDENTS]);
    a.settled().await;
    b.settled().await;

    assert_eq!(backend.count_calls(Method::GET, "/student"), 2);
    assert_eq!(cache.entry_count(), 2);
  }

  #[tokio::test]
  async fn test_mutation_refetches_each_watched_entry_once() {
    let backend = FakeBackend::new();
    let cache = backend.cache();

    let mut watched = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    watched.settled().await;
    let mut unwatched = cache.query::<Vec<Student>>("/student", search("x"), &[Tag::STUDENTS]);
    unwatched.settled().await;
    drop(unwatched);
    let mut other = cache.query::<Value>("/center", Params::new(), &[CENTERS]);
    other.settled().await;

    let before = backend.calls().len();
    cache
      .mutate(
        Method::POST,
        "/student",
        Some(json!({"name": "Ann", "surname": "Lee", "age": 20, "phone": "1"})),
        &[Tag::STUDENTS],
      )
      .await
      .unwrap();

    let state = watched.settled().await;
    assert_eq!(state.data().map(|v| v.len()), Some(1));

    let refetches: Vec<_> = backend.calls()[before + 1..].to_vec();
    assert_eq!(refetches.len(), 1);
    assert_eq!(refetches[0].path, "/student");
    assert!(refetches[0].params.is_empty());

    // The unwatched entry was only marked stale and refetches lazily
    assert_eq!(cache.status("/student", search("x")), QueryStatus::Success);
    let mut again = cache.query::<Vec<Student>>("/student", search("x"), &[Tag::STUDENTS]);
    assert!(again.is_loading());
    again.settled().await;
    assert_eq!(backend.calls().len(), before + 3);
  }

  #[tokio::test]
  async fn test_invalidate_twice_without_subscribers_is_idempotent() {
    let backend = FakeBackend::new();
    let cache = backend.cache();

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    sub.settled().await;
    drop(sub);

    assert_eq!(cache.invalidate(&[Tag::STUDENTS]), 0);
    assert_eq!(cache.invalidate(&[Tag::STUDENTS]), 0);
    assert_eq!(backend.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_failed_mutation_does_not_invalidate() {
    let backend = FakeBackend::new();
    backend.seed(vec![student_json("1", "Ann", "Lee")]);
    let cache = backend.cache();

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    sub.settled().await;

    backend.fail_next(500);
    let err = cache
      .mutate(Method::DELETE, "/student/1", None, &[Tag::STUDENTS])
      .await
      .unwrap_err();
    assert_eq!(err.status(), Some(500));

    assert!(!sub.poll());
    assert_eq!(sub.data().map(|v| v.len()), Some(1));
    assert_eq!(backend.count_calls(Method::GET, "/student"), 1);
  }

  #[tokio::test]
  async fn test_invalidation_during_flight_refetches_after_settle() {
    let backend = FakeBackend::gated();
    let cache = backend.cache();

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    assert_eq!(cache.invalidate(&[Tag::STUDENTS]), 0);
    assert_eq!(cache.invalidate(&[Tag::STUDENTS]), 0);

    backend.release(1);
    // First response lands, then exactly one follow-up request is issued
    for _ in 0..1000 {
      if backend.count_calls(Method::GET, "/student") == 2 {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert_eq!(backend.count_calls(Method::GET, "/student"), 2);
    assert!(sub.poll());
    assert!(sub.is_loading());

    backend.release(1);
    assert!(sub.settled().await.is_success());
    assert_eq!(backend.count_calls(Method::GET, "/student"), 2);
  }

  #[tokio::test]
  async fn test_error_entry_refetches_on_new_subscription() {
    let backend = FakeBackend::new();
    backend.fail_next(503);
    let cache = backend.cache();

    let mut first = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    assert!(first.settled().await.is_error());

    let mut second = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    assert!(second.settled().await.is_success());
    // The first subscriber observes the recovery too
    assert!(first.settled().await.is_success());
    assert_eq!(backend.count_calls(Method::GET, "/student"), 2);
  }

  #[tokio::test]
  async fn test_manual_refetch() {
    let backend = FakeBackend::new();
    let cache = backend.cache();

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    sub.settled().await;

    backend.seed(vec![student_json("9", "Zed", "Ray")]);
    assert!(sub.refetch());
    assert!(!sub.refetch());
    let state = sub.settled().await;
    assert_eq!(state.data().map(|v| v[0].id.clone()), Some("9".to_string()));
  }

  #[tokio::test]
  async fn test_decode_failure_becomes_error_state() {
    let backend = FakeBackend::new();
    let cache = backend.cache();

    // A list is not a single student
    let mut sub = cache.query::<Student>("/student", Params::new(), &[Tag::STUDENTS]);
    let state = sub.settled().await;
    assert!(matches!(state, QueryState::Error(HttpError::Decode(_))));
  }

  #[tokio::test]
  async fn test_odd_record_does_not_hide_the_list() {
    let backend = FakeBackend::new();
    let mut odd = student_json("2", "Bo", "Kim");
    odd["createdAt"] = json!(1748424750);
    odd["age"] = json!("twenty");
    backend.seed(vec![student_json("1", "Ann", "Lee"), odd]);
    let cache = backend.cache();

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    let state = sub.settled().await;
    let students = state.data().unwrap();
    assert_eq!(students.len(), 2);
    assert_eq!(students[0].age, Some(20));
    assert_eq!(students[1].name, "Bo");
    assert_eq!(students[1].age, None);
    assert!(students[1].created_at.is_some());
  }

  #[tokio::test]
  async fn test_request_completes_without_subscribers() {
    let backend = FakeBackend::gated();
    let cache = backend.cache();

    let sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    drop(sub);
    backend.release(1);

    // Let the spawned request finish
    for _ in 0..100 {
      if cache.status("/student", Params::new()) == QueryStatus::Success {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert_eq!(cache.status("/student", Params::new()), QueryStatus::Success);

    let late = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    assert!(late.state().is_success());
    assert_eq!(backend.calls().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_time_triggers_refetch() {
    let backend = FakeBackend::new();
    let cache = backend
      .cache()
      .with_stale_time(Some(Duration::from_secs(60)));

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    sub.settled().await;
    drop(sub);

    tokio::time::advance(Duration::from_secs(61)).await;
    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    assert!(sub.is_loading());
    sub.settled().await;
    assert_eq!(backend.calls().len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_evict_unused() {
    let backend = FakeBackend::new();
    let cache = backend.cache();

    let mut kept = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    kept.settled().await;
    let mut dropped = cache.query::<Vec<Student>>("/student", search("a"), &[Tag::STUDENTS]);
    dropped.settled().await;
    drop(dropped);

    assert_eq!(cache.evict_unused(Duration::from_secs(60)), 0);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(cache.evict_unused(Duration::from_secs(60)), 1);
    assert_eq!(cache.entry_count(), 1);
    assert_eq!(cache.status("/student", search("a")), QueryStatus::Uninitialized);
  }

  #[tokio::test(start_paused = true)]
  async fn test_hung_request_stays_loading() {
    let backend = FakeBackend::gated();
    let cache = backend.cache();

    let mut sub = cache.query::<Vec<Student>>("/student", Params::new(), &[Tag::STUDENTS]);
    tokio::time::advance(Duration::from_secs(300)).await;

    assert!(!sub.poll());
    assert!(sub.is_loading());
    assert!(sub.loading_for().unwrap() >= Duration::from_secs(300));
    assert_eq!(cache.status("/student", Params::new()), QueryStatus::Loading);
  }
}
