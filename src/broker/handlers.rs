use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

/// Handles one inbound request: the parsed JSON body (if any) and a
/// response document to populate. Returning false maps to a 500.
pub type RequestHandler = Arc<dyn Fn(Option<&Value>, &mut Value) -> bool + Send + Sync>;

/// Synthesizes an outbound publish payload into a fresh document when the
/// publisher supplied none.
pub type PublishRequestHandler = Arc<dyn Fn(&mut Value) -> bool + Send + Sync>;

/// Consumes a subscriber's non-empty JSON response to a delivery.
pub type PublishResponseHandler = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Hook handles for one topic. All optional; cloning copies the handles.
#[derive(Clone, Default)]
pub struct PublishHooks {
    pub subscribe: Option<RequestHandler>,
    pub request: Option<PublishRequestHandler>,
    pub response: Option<PublishResponseHandler>,
}

impl PublishHooks {
    /// Overlay any hooks present in `other`; existing entries survive
    /// unless overwritten.
    pub fn merge(&mut self, other: PublishHooks) {
        if let Some(subscribe) = other.subscribe {
            self.subscribe = Some(subscribe);
        }
        if let Some(request) = other.request {
            self.request = Some(request);
        }
        if let Some(response) = other.response {
            self.response = Some(response);
        }
    }
}

/// Path-keyed request handler table.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, RequestHandler>,
}

impl HandlerRegistry {
    /// Install a handler for `path`, replacing any previous one.
    pub fn insert(&mut self, path: &str, handler: RequestHandler) {
        if self.handlers.contains_key(path) {
            debug!(path, "replacing request handler");
        }
        self.handlers.insert(path.to_string(), handler);
    }

    pub fn get(&self, path: &str) -> Option<RequestHandler> {
        self.handlers.get(path).cloned()
    }
}
