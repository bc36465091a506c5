//! The `persistence` module provides the local key/value storage the broker
//! uses to keep its subscription list across restarts.
//!
//! It uses `sled` as an embedded key-value store, exposed as a small
//! string-table interface (`get`/`put` by table and key).

pub mod sled_store;

pub use sled_store::LocalStorage;
