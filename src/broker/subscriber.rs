use serde::{Deserialize, Serialize};

/// A callback target registered for a topic.
///
/// `endpoint` names a unix-domain socket on the local filesystem and `path`
/// is the URL path to POST to on that socket. Equality is component-wise
/// over both fields; the broker relies on it for dedup and removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub endpoint: String,
    pub path: String,
}

impl Subscriber {
    pub fn new(endpoint: &str, path: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            path: path.to_string(),
        }
    }
}

/// Insertion-ordered set of subscribers.
///
/// Keeps the first occurrence of each subscriber and rejects equal
/// duplicates, so a topic's delivery order matches subscription order.
#[derive(Debug, Default, Clone)]
pub struct SubscriberSet {
    subscribers: Vec<Subscriber>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if an equal subscriber is already present.
    pub fn add(&mut self, subscriber: Subscriber) -> bool {
        if self.subscribers.contains(&subscriber) {
            return false;
        }
        self.subscribers.push(subscriber);
        true
    }

    /// Removes the subscriber equal to `subscriber`. Returns false if none
    /// matches.
    pub fn remove(&mut self, subscriber: &Subscriber) -> bool {
        match self.subscribers.iter().position(|s| s == subscriber) {
            Some(index) => {
                self.subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    /// A stable copy, safe to iterate outside any lock guarding the set.
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.clone()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
