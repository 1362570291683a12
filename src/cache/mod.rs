//! Client-side entity cache for server reads.
//!
//! - Entries are keyed by a digest of endpoint + parameters
//! - Concurrent identical reads share one in-flight request
//! - Queries provide tags, mutations invalidate them
//! - Invalidated entries with live subscribers refetch immediately, the rest
//!   refetch on their next subscription

mod entry;
mod key;
mod layer;
mod tags;

pub use entry::EntrySnapshot;
pub use layer::QueryCache;
pub use tags::Tag;
