//! Path-keyed subscription registry.

use crate::InstanceId;
use std::collections::{BTreeMap, HashMap};
use weft_state::PathKey;

/// Subscribers are render callbacks, identified by their component instance.
pub type SubscriberId = InstanceId;

/// Map from relative path key to the subscribers that read it.
///
/// A subscriber appears at most once per key; subscribers keep their
/// registration order. Nothing is ever unregistered.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    by_path: HashMap<PathKey, Vec<SubscriberId>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for `key`; returns `false` if already present.
    pub fn register(&mut self, key: PathKey, subscriber: SubscriberId) -> bool {
        let subscribers = self.by_path.entry(key).or_default();
        if subscribers.contains(&subscriber) {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    /// Subscribers of `key`, in registration order.
    pub fn subscribers(&self, key: &str) -> &[SubscriberId] {
        self.by_path.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every key `subscriber` is registered for, sorted.
    pub fn paths_of(&self, subscriber: SubscriberId) -> Vec<PathKey> {
        let mut keys: Vec<PathKey> = self
            .by_path
            .iter()
            .filter(|(_, subscribers)| subscribers.contains(&subscriber))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Sorted copy of the whole registry.
    pub fn snapshot(&self) -> BTreeMap<PathKey, Vec<SubscriberId>> {
        self.by_path
            .iter()
            .map(|(key, subscribers)| (key.clone(), subscribers.clone()))
            .collect()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
