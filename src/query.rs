//! View-facing handles onto the cache.
//!
//! A [`Subscription`] is a live binding to one cache entry, in the spirit of
//! TanStack Query's `useQuery`: it is created by [`QueryCache::query`], sees
//! every status/data change of its entry, and unsubscribes when dropped. A
//! [`Mutation`] tracks one in-flight write so a view can show a spinner and
//! react when it lands.
//!
//! Both are polled from the view's tick:
//!
//! ```ignore
//! let mut students = api.list(Params::new());
//!
//! // In event loop tick
//! if students.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match students.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Uninitialized => {}
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::api::HttpError;
use crate::cache::{EntrySnapshot, QueryCache};

/// The state of a query or mutation
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Nothing has been requested yet
  Uninitialized,
  /// A request is in flight
  Loading,
  /// The last request succeeded
  Success(T),
  /// The last request failed
  Error(HttpError),
}

/// [`QueryState`] without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  Uninitialized,
  Loading,
  Success,
  Error,
}

impl<T> QueryState<T> {
  pub fn status(&self) -> QueryStatus {
    match self {
      QueryState::Uninitialized => QueryStatus::Uninitialized,
      QueryState::Loading => QueryStatus::Loading,
      QueryState::Success(_) => QueryStatus::Success,
      QueryState::Error(_) => QueryStatus::Error,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  /// Loading, or not started yet
  pub fn is_pending(&self) -> bool {
    matches!(self, QueryState::Loading | QueryState::Uninitialized)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&HttpError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// A live subscription to one cache entry, decoded as `T`.
pub struct Subscription<T> {
  cache: QueryCache,
  key: String,
  receiver: watch::Receiver<EntrySnapshot>,
  state: QueryState<T>,
  last_data: Option<T>,
  loading_since: Option<Instant>,
}

impl<T: DeserializeOwned + Clone> Subscription<T> {
  pub(crate) fn new(
    cache: QueryCache,
    key: String,
    receiver: watch::Receiver<EntrySnapshot>,
  ) -> Self {
    let mut subscription = Self {
      cache,
      key,
      receiver,
      state: QueryState::Uninitialized,
      last_data: None,
      loading_since: None,
    };
    subscription.sync();
    subscription
  }

  /// Apply the entry's latest snapshot.
  fn sync(&mut self) {
    let snapshot = self.receiver.borrow_and_update().clone();
    self.loading_since = snapshot.loading_since;

    self.state = match snapshot.state {
      QueryState::Uninitialized => QueryState::Uninitialized,
      QueryState::Loading => QueryState::Loading,
      QueryState::Success(value) => match T::deserialize(value.as_ref()) {
        Ok(data) => QueryState::Success(data),
        Err(e) => QueryState::Error(HttpError::from(e)),
      },
      QueryState::Error(e) => QueryState::Error(e),
    };

    self.last_data = match &self.state {
      QueryState::Success(data) => Some(data.clone()),
      _ => snapshot
        .last_data
        .as_deref()
        .and_then(|value| T::deserialize(value).ok()),
    };
  }

  /// Apply pending updates without blocking.
  ///
  /// Returns `true` if the entry changed since the last poll.
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.receiver.has_changed() {
      Ok(true) => {
        self.sync();
        true
      }
      _ => false,
    }
  }

  /// Wait for the next change. Returns `false` once the entry is gone.
  pub async fn changed(&mut self) -> bool {
    if self.receiver.changed().await.is_err() {
      return false;
    }
    self.sync();
    true
  }

  /// Wait until the entry is neither loading nor uninitialized.
  pub async fn settled(&mut self) -> &QueryState<T> {
    self.sync();
    while self.state.is_pending() {
      if self.receiver.changed().await.is_err() {
        break;
      }
      self.sync();
    }
    &self.state
  }

  /// Force a refetch of this entry. No-op while a request is already in flight.
  pub fn refetch(&self) -> bool {
    self.cache.refetch(&self.key)
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Current data, or the last successful data while a refetch is running.
  pub fn data(&self) -> Option<&T> {
    self.state.data().or(self.last_data.as_ref())
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn error(&self) -> Option<&HttpError> {
    self.state.error()
  }

  /// How long the current request has been in flight.
  ///
  /// Requests have no timeout unless one is configured, so a hung request
  /// shows up here as an ever-growing duration.
  pub fn loading_for(&self) -> Option<Duration> {
    self.loading_since.map(|since| since.elapsed())
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("loading_since", &self.loading_since)
      .finish_non_exhaustive()
  }
}

/// One in-flight write, polled from the view's tick.
pub struct Mutation<T> {
  state: QueryState<T>,
  receiver: Option<oneshot::Receiver<Result<T, HttpError>>>,
}

impl<T: Send + 'static> Mutation<T> {
  /// Run `future` on a spawned task.
  pub fn spawn<Fut>(future: Fut) -> Self
  where
    Fut: Future<Output = Result<T, HttpError>> + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      // Ignore send errors - the view may have been closed
      let _ = tx.send(future.await);
    });

    Self {
      state: QueryState::Loading,
      receiver: Some(rx),
    }
  }

  /// Returns `true` if the write finished since the last poll.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(oneshot::error::TryRecvError::Empty) => false,
      Err(oneshot::error::TryRecvError::Closed) => {
        // Task dropped without sending - treat as error
        self.state = QueryState::Error(HttpError::Network("request was cancelled".to_string()));
        self.receiver = None;
        true
      }
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }
}
