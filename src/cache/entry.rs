use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use super::key::QueryKey;
use super::tags::Tag;
use crate::api::{HttpError, Request};
use crate::query::{QueryState, QueryStatus};

/// What subscribers of an entry observe.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
  pub state: QueryState<Arc<Value>>,
  /// Last successful value; survives a refetch so views can keep rendering it
  pub last_data: Option<Arc<Value>>,
  pub loading_since: Option<Instant>,
}

impl Default for EntrySnapshot {
  fn default() -> Self {
    Self {
      state: QueryState::Uninitialized,
      last_data: None,
      loading_since: None,
    }
  }
}

/// One cached read. Live subscribers are the receivers of `sender`.
pub(crate) struct CacheEntry {
  key: QueryKey,
  tags: BTreeSet<Tag>,
  sender: watch::Sender<EntrySnapshot>,
  invalidated: bool,
  /// Invalidated while a request was in flight
  refetch_on_settle: bool,
  fetched_at: Option<Instant>,
  touched_at: Instant,
}

impl CacheEntry {
  pub fn new(key: QueryKey) -> Self {
    let (sender, _) = watch::channel(EntrySnapshot::default());
    Self {
      key,
      tags: BTreeSet::new(),
      sender,
      invalidated: false,
      refetch_on_settle: false,
      fetched_at: None,
      touched_at: Instant::now(),
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn add_tags(&mut self, tags: &[Tag]) {
    self.tags.extend(tags.iter().copied());
  }

  pub fn tags(&self) -> &BTreeSet<Tag> {
    &self.tags
  }

  pub fn subscribe(&mut self) -> watch::Receiver<EntrySnapshot> {
    self.touched_at = Instant::now();
    self.sender.subscribe()
  }

  pub fn subscriber_count(&self) -> usize {
    self.sender.receiver_count()
  }

  pub fn status(&self) -> QueryStatus {
    self.sender.borrow().state.status()
  }

  pub fn is_loading(&self) -> bool {
    self.status() == QueryStatus::Loading
  }

  pub fn idle_for(&self) -> Duration {
    self.touched_at.elapsed()
  }

  /// Whether a new subscriber should trigger a request.
  ///
  /// Failed entries are refetched: opening a view again is how the user retries.
  pub fn needs_fetch(&self, stale_time: Option<Duration>) -> bool {
    match self.status() {
      QueryStatus::Uninitialized | QueryStatus::Error => true,
      QueryStatus::Loading => false,
      QueryStatus::Success => {
        self.invalidated
          || match (stale_time, self.fetched_at) {
            (Some(stale), Some(at)) => at.elapsed() > stale,
            _ => false,
          }
      }
    }
  }

  pub fn begin_loading(&mut self) {
    self.invalidated = false;
    self.touched_at = Instant::now();
    self.sender.send_modify(|snapshot| {
      snapshot.state = QueryState::Loading;
      snapshot.loading_since = Some(Instant::now());
    });
  }

  pub fn settle(&mut self, result: Result<Value, HttpError>) {
    let now = Instant::now();
    self.touched_at = now;
    if result.is_ok() {
      self.fetched_at = Some(now);
    }
    self.sender.send_modify(|snapshot| {
      snapshot.loading_since = None;
      match result {
        Ok(value) => {
          let value = Arc::new(value);
          snapshot.last_data = Some(Arc::clone(&value));
          snapshot.state = QueryState::Success(value);
        }
        Err(err) => snapshot.state = QueryState::Error(err),
      }
    });
  }

  /// Mark stale. Returns the request to issue when the entry has live
  /// subscribers and nothing is in flight.
  pub fn invalidate(&mut self) -> Option<Request> {
    if self.is_loading() {
      self.refetch_on_settle = true;
      return None;
    }
    self.invalidated = true;
    if self.subscriber_count() > 0 {
      self.begin_loading();
      Some(self.request())
    } else {
      None
    }
  }

  /// After a request settles, start the refetch owed to an invalidation that
  /// arrived while it was in flight.
  pub fn take_follow_up(&mut self) -> Option<Request> {
    if !std::mem::take(&mut self.refetch_on_settle) {
      return None;
    }
    self.invalidated = true;
    if self.subscriber_count() > 0 {
      self.begin_loading();
      Some(self.request())
    } else {
      None
    }
  }

  pub fn request(&self) -> Request {
    Request::get(self.key.endpoint.clone()).with_params(self.key.params.clone())
  }
}
