//! Tags group cache entries for bulk invalidation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A symbolic label shared by queries that provide it and mutations that
/// invalidate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(&'static str);

impl Tag {
  pub const STUDENTS: Tag = Tag("STUDENTS");

  pub const fn new(name: &'static str) -> Self {
    Tag(name)
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.0)
  }
}

/// Map from tag to the cache keys that provide it.
#[derive(Debug, Default)]
pub struct TagRegistry {
  by_tag: BTreeMap<Tag, BTreeSet<String>>,
}

impl TagRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record that `key` provides every tag in `tags`. Re-registering is a no-op.
  pub fn register(&mut self, key: &str, tags: &[Tag]) {
    for tag in tags {
      self.by_tag.entry(*tag).or_default().insert(key.to_string());
    }
  }

  /// Drop `key` from every tag it was registered under.
  pub fn forget(&mut self, key: &str) {
    self.by_tag.retain(|_, keys| {
      keys.remove(key);
      !keys.is_empty()
    });
  }

  /// Every key carrying at least one of `tags`, deduplicated.
  pub fn keys_for(&self, tags: &[Tag]) -> BTreeSet<String> {
    tags
      .iter()
      .filter_map(|tag| self.by_tag.get(tag))
      .flat_map(|keys| keys.iter().cloned())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CENTERS: Tag = Tag::new("CENTERS");

  #[test]
  fn test_keys_for_single_tag() {
    let mut registry = TagRegistry::new();
    registry.register("a", &[Tag::STUDENTS]);
    registry.register("b", &[Tag::STUDENTS, CENTERS]);
    registry.register("c", &[CENTERS]);

    let keys: Vec<_> = registry.keys_for(&[Tag::STUDENTS]).into_iter().collect();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn test_keys_for_multiple_tags_dedup() {
    let mut registry = TagRegistry::new();
    registry.register("a", &[Tag::STUDENTS]);
    registry.register("b", &[Tag::STUDENTS, CENTERS]);

    assert_eq!(registry.keys_for(&[Tag::STUDENTS, CENTERS]).len(), 2);
  }

  #[test]
  fn test_register_twice_is_noop() {
    let mut registry = TagRegistry::new();
    registry.register("a", &[Tag::STUDENTS]);
    registry.register("a", &[Tag::STUDENTS]);
    assert_eq!(registry.keys_for(&[Tag::STUDENTS]).len(), 1);
  }

  #[test]
  fn test_forget() {
    let mut registry = TagRegistry::new();
    registry.register("a", &[Tag::STUDENTS, CENTERS]);
    registry.register("b", &[Tag::STUDENTS]);
    registry.forget("a");

    assert!(registry.keys_for(&[CENTERS]).is_empty());
    assert_eq!(registry.keys_for(&[Tag::STUDENTS]).len(), 1);
  }

  #[test]
  fn test_unknown_tag() {
    let registry = TagRegistry::new();
    assert!(registry.keys_for(&[Tag::new("COMMENTS")]).is_empty());
    assert_eq!(Tag::STUDENTS.to_string(), "STUDENTS");
  }
}
