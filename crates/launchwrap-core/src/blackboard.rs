//! # Blackboard
//!
//! Shared coordination store for bundles during bootstrap. Keys are strings;
//! values are any `Send + Sync` type and are read back by type. A read with
//! the wrong type behaves like a missing key.

use std::any::Any;
use std::collections::BTreeMap;

/// Typed key/value store with no fixed schema.
#[derive(Default)]
pub struct Blackboard {
    entries: BTreeMap<String, Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Blackboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// The value under `key`, if it has type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref::<T>()
    }

    /// Mutable access to the value under `key`, if it has type `T`.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key)?.downcast_mut::<T>()
    }

    /// Push `item` onto the list under `key`, creating the list if missing.
    ///
    /// A value of another type under `key` is replaced.
    pub fn append<T: Any + Send + Sync>(&mut self, key: &str, item: T) {
        match self.get_mut::<Vec<T>>(key) {
            Some(list) => list.push(item),
            None => self.insert(key, vec![item]),
        }
    }

    /// Remove and return the value under `key`, if it has type `T`.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        let boxed = self.entries.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.entries.insert(key.to_string(), other);
                None
            }
        }
    }

    /// Whether any value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_read_back_by_type() {
        let mut board = Blackboard::new();
        board.insert("ArgumentList", vec!["--a".to_string()]);

        assert_eq!(
            board.get::<Vec<String>>("ArgumentList").map(Vec::len),
            Some(1)
        );
        assert!(board.get::<u32>("ArgumentList").is_none());
        assert!(board.get::<Vec<String>>("Missing").is_none());
    }

    #[test]
    fn append_creates_and_extends() {
        let mut board = Blackboard::new();
        board.insert("Tweaks", 7u8);
        board.append("Tweaks", "a".to_string());
        board.append("Tweaks", "b".to_string());
        assert_eq!(
            board.get::<Vec<String>>("Tweaks").cloned(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn remove_with_wrong_type_keeps_value() {
        let mut board = Blackboard::new();
        board.insert("LaunchTarget", "pkg.Main".to_string());
        assert!(board.remove::<u8>("LaunchTarget").is_none());
        assert!(board.contains("LaunchTarget"));
        assert_eq!(
            board.remove::<String>("LaunchTarget").as_deref(),
            Some("pkg.Main")
        );
        assert!(board.keys().is_empty());
    }
}
