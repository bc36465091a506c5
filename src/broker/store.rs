use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::broker::subscriber::{Subscriber, SubscriberSet};
use crate::persistence::LocalStorage;

// name of the table used for the local storage database
const STORAGE_TABLE: &str = "aace.localSkillService";
const STORAGE_KEY: &str = "subscriptions";

/// Topic-keyed subscriber sets with write-through persistence.
///
/// Every mutation that changes a set is persisted as a flat
/// `[{id, endpoint, path}, ...]` array. Load failures leave the store
/// empty rather than refusing to start; persist failures are logged and
/// the in-memory state stays authoritative.
pub struct SubscriptionStore {
    topics: HashMap<String, SubscriberSet>,
    storage: Option<LocalStorage>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
            storage: None,
        }
    }

    /// Attach the storage backend. Until this is called, persistence is a
    /// logged no-op.
    pub fn set_storage(&mut self, storage: LocalStorage) {
        self.storage = Some(storage);
    }

    /// Idempotent topic creation.
    pub fn ensure_topic(&mut self, id: &str) {
        self.topics.entry(id.to_string()).or_default();
    }

    pub fn contains_topic(&self, id: &str) -> bool {
        self.topics.contains_key(id)
    }

    /// Add a subscriber, creating the topic if needed. Persists when the
    /// set changed; returns false for an equal duplicate.
    pub fn add(&mut self, id: &str, subscriber: Subscriber) -> bool {
        let added = self.topics.entry(id.to_string()).or_default().add(subscriber);
        if added {
            self.persist();
        }
        added
    }

    /// Remove a subscriber by equality. Persists when the set changed;
    /// returns false if no equal subscriber (or no topic) exists.
    pub fn remove(&mut self, id: &str, subscriber: &Subscriber) -> bool {
        let removed = match self.topics.get_mut(id) {
            Some(set) => set.remove(subscriber),
            None => false,
        };
        if removed {
            self.persist();
        }
        removed
    }

    pub fn subscribers_of(&self, id: &str) -> Vec<Subscriber> {
        self.topics
            .get(id)
            .map(SubscriberSet::snapshot)
            .unwrap_or_default()
    }

    /// Read the persisted array back into memory.
    ///
    /// Topics are created on first reference, so entries for topics no
    /// service has registered yet survive a restart. Entries missing a
    /// required field are skipped. Idempotent under re-load.
    pub fn load(&mut self) {
        let Some(storage) = &self.storage else {
            debug!("no storage attached, nothing to load");
            return;
        };
        let raw = match storage.get(STORAGE_TABLE, STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "reading subscriptions failed");
                return;
            }
        };
        let entries = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                error!("persisted subscriptions are not an array");
                return;
            }
            Err(e) => {
                error!(error = %e, "persisted subscriptions are not valid json");
                return;
            }
        };
        for entry in entries {
            let id = entry.get("id").and_then(Value::as_str);
            let endpoint = entry.get("endpoint").and_then(Value::as_str);
            let path = entry.get("path").and_then(Value::as_str);
            match (id, endpoint, path) {
                (Some(id), Some(endpoint), Some(path)) => {
                    self.topics
                        .entry(id.to_string())
                        .or_default()
                        .add(Subscriber::new(endpoint, path));
                }
                _ => {
                    warn!(entry = %entry, "skipping malformed subscription entry");
                }
            }
        }
    }

    /// Write the current state out as a flat array.
    pub fn persist(&self) {
        let Some(storage) = &self.storage else {
            debug!("no storage attached, skipping persist");
            return;
        };
        let mut entries = Vec::new();
        for (id, set) in &self.topics {
            for subscriber in set.snapshot() {
                entries.push(json!({
                    "id": id,
                    "endpoint": subscriber.endpoint,
                    "path": subscriber.path,
                }));
            }
        }
        let serialized = Value::Array(entries).to_string();
        if let Err(e) = storage.put(STORAGE_TABLE, STORAGE_KEY, &serialized) {
            error!(error = %e, "writing subscriptions failed");
        }
    }
}

impl Default for SubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}
