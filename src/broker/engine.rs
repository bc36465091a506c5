use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::broker::handlers::{
    HandlerRegistry, PublishHooks, PublishRequestHandler, PublishResponseHandler, RequestHandler,
};
use crate::broker::store::SubscriptionStore;
use crate::broker::subscriber::Subscriber;
use crate::persistence::LocalStorage;
use crate::transport::client::UnixHttpClient;
use crate::transport::server::UnixHttpServer;
use crate::transport::{InboundRequest, UnixPostTransport};
use crate::utils::error::TransportError;
use crate::utils::executor::SerialExecutor;

// configuration key whose section the broker consumes
const CONFIG_KEY: &str = "aace.localSkillService";

// accept-poll interval for the inbound server
const ACCEPT_TIMEOUT: Duration = Duration::from_millis(100);

/// One pending POST to one subscriber.
///
/// Deliveries are self-contained so a timed-out attempt can be resubmitted
/// to the publish pool as-is; when the payload comes from a request hook,
/// the hook runs again on the retry.
#[derive(Clone)]
struct Delivery {
    id: String,
    subscriber: Subscriber,
    message: Option<Value>,
    request_hook: Option<PublishRequestHandler>,
    response_hook: Option<PublishResponseHandler>,
}

/// Everything guarded by the subscription mutex: the persistent topic
/// map and the per-topic hook handles.
struct SubscriptionState {
    store: SubscriptionStore,
    hooks: HashMap<String, PublishHooks>,
}

struct BrokerCore {
    weak: Weak<BrokerCore>,
    handlers: Mutex<HandlerRegistry>,
    subscriptions: Mutex<SubscriptionState>,
    handler_pool: SerialExecutor,
    publish_pool: SerialExecutor,
    transport: Arc<dyn UnixPostTransport>,
}

impl BrokerCore {
    /// Route one inbound request.
    ///
    /// Malformed POST bodies get a 400 and unknown paths a 404 without
    /// touching the handler pool; everything else runs on it. The handler
    /// table lock is held only to copy out the handler handle.
    fn handle_request(&self, request: InboundRequest) {
        let path = request.path().to_string();
        debug!(%path, method = request.method(), "inbound request");

        let mut json_request = None;
        if request.method() == "POST" && !request.body().is_empty() {
            match serde_json::from_str::<Value>(request.body()) {
                Ok(value) => json_request = Some(value),
                Err(e) => {
                    debug!(%path, error = %e, status = 400, "malformed request body");
                    request.respond(400, "");
                    return;
                }
            }
        }

        let handler = self.handlers.lock().unwrap().get(&path);
        let handler = match handler {
            Some(handler) => handler,
            None => {
                debug!(%path, status = 404, "no handler for path");
                request.respond(404, "");
                return;
            }
        };

        self.handler_pool.submit(async move {
            let mut json_response = Value::Null;
            if handler(json_request.as_ref(), &mut json_response) {
                if json_response.is_object() {
                    debug!(%path, status = 200, "request handled");
                    request.respond(200, &json_response.to_string());
                } else {
                    debug!(%path, status = 204, "request handled");
                    request.respond(204, "");
                }
            } else {
                debug!(%path, status = 500, "request handler failed");
                request.respond(500, "");
            }
        });
    }

    /// Fan a message out to every current subscriber of `id`.
    ///
    /// Subscribers and hooks are snapshotted under the subscription lock;
    /// the deliveries themselves run on the publish pool. Returns false if
    /// no such topic exists.
    fn publish(&self, id: &str, message: Option<Value>) -> bool {
        let (hooks, subscribers) = {
            let state = self.subscriptions.lock().unwrap();
            if !state.store.contains_topic(id) {
                error!(id, "subscription not found");
                return false;
            }
            let hooks = state.hooks.get(id).cloned().unwrap_or_default();
            (hooks, state.store.subscribers_of(id))
        };
        for subscriber in subscribers {
            self.submit_delivery(Delivery {
                id: id.to_string(),
                subscriber,
                message: message.clone(),
                request_hook: hooks.request.clone(),
                response_hook: hooks.response.clone(),
            });
        }
        true
    }

    fn submit_delivery(&self, delivery: Delivery) {
        let core = match self.weak.upgrade() {
            Some(core) => core,
            None => return,
        };
        self.publish_pool.submit(async move {
            core.deliver(delivery).await;
        });
    }

    /// One delivery attempt.
    ///
    /// Payload precedence: the publisher's message verbatim, else the
    /// request hook into a fresh document, else no body. Only object
    /// payloads are posted. Timeouts re-queue the delivery; connect
    /// failures and non-2xx statuses evict the subscriber.
    async fn deliver(&self, delivery: Delivery) {
        let payload = if let Some(message) = &delivery.message {
            Some(message.clone())
        } else if let Some(request_hook) = &delivery.request_hook {
            let mut document = Value::Null;
            if !request_hook(&mut document) {
                error!(id = %delivery.id, "publish request hook failed");
                return;
            }
            Some(document)
        } else {
            None
        };
        let body = payload.filter(Value::is_object).map(|p| p.to_string());

        let result = self
            .transport
            .post(&delivery.subscriber.endpoint, &delivery.subscriber.path, body)
            .await;
        match result {
            Err(TransportError::Connect { .. }) => {
                error!(
                    id = %delivery.id,
                    endpoint = %delivery.subscriber.endpoint,
                    "subscriber unreachable, removing"
                );
                self.remove_subscription(&delivery.id, &delivery.subscriber);
            }
            Err(TransportError::Timeout { .. }) => {
                warn!(
                    id = %delivery.id,
                    endpoint = %delivery.subscriber.endpoint,
                    "delivery timed out, retrying"
                );
                self.submit_delivery(delivery);
            }
            Err(e) => {
                error!(id = %delivery.id, error = %e, "delivery failed");
            }
            Ok(response) => {
                debug!(id = %delivery.id, status = response.status, "delivery response");
                if response.status < 200 || response.status >= 300 {
                    error!(
                        id = %delivery.id,
                        endpoint = %delivery.subscriber.endpoint,
                        status = response.status,
                        "subscriber rejected delivery, removing"
                    );
                    self.remove_subscription(&delivery.id, &delivery.subscriber);
                    return;
                }
                if response.body.is_empty() {
                    return;
                }
                let response_hook = match &delivery.response_hook {
                    Some(hook) => hook,
                    None => return,
                };
                match serde_json::from_str::<Value>(&response.body) {
                    Ok(document) => {
                        if !response_hook(&document) {
                            error!(id = %delivery.id, "publish response hook failed");
                        }
                    }
                    Err(e) => {
                        error!(id = %delivery.id, error = %e, "subscriber response is not json");
                    }
                }
            }
        }
    }

    /// Add a subscriber to an existing topic. Returns false when the topic
    /// was never registered; a duplicate add is reported as success.
    fn add_subscription(&self, id: &str, subscriber: &Subscriber) -> bool {
        let mut state = self.subscriptions.lock().unwrap();
        if !state.store.contains_topic(id) {
            error!(id, "subscription not found");
            return false;
        }
        if state.store.add(id, subscriber.clone()) {
            debug!(
                id,
                endpoint = %subscriber.endpoint,
                path = %subscriber.path,
                "subscriber added"
            );
        } else {
            debug!(
                id,
                endpoint = %subscriber.endpoint,
                path = %subscriber.path,
                "subscriber already present"
            );
        }
        true
    }

    /// Remove a subscriber. Returns whether anything was removed; an
    /// unknown topic or subscriber is not an error.
    fn remove_subscription(&self, id: &str, subscriber: &Subscriber) -> bool {
        let mut state = self.subscriptions.lock().unwrap();
        if state.store.remove(id, subscriber) {
            debug!(
                id,
                endpoint = %subscriber.endpoint,
                path = %subscriber.path,
                "subscriber removed"
            );
            true
        } else {
            debug!(
                id,
                endpoint = %subscriber.endpoint,
                path = %subscriber.path,
                "subscriber not found"
            );
            false
        }
    }

    /// Built-in `/subscribe`.
    ///
    /// Adds the subscriber, lets the topic's subscribe hook populate the
    /// reply, and primes the new subscriber with an immediate delivery
    /// when a request or response hook is registered. Both happen when
    /// both kinds of hook exist.
    fn subscribe_handler(&self, request: Option<&Value>, response: &mut Value) -> bool {
        let (id, subscriber) = match request.and_then(subscriber_from) {
            Some(parsed) => parsed,
            None => {
                error!("subscribe request payload invalid");
                return false;
            }
        };
        if !self.add_subscription(&id, &subscriber) {
            return false;
        }
        let hooks = {
            let state = self.subscriptions.lock().unwrap();
            state.hooks.get(&id).cloned().unwrap_or_default()
        };
        if let Some(subscribe_hook) = &hooks.subscribe {
            if !subscribe_hook(None, response) {
                error!(id = %id, "subscribe hook failed");
                return false;
            }
        }
        if hooks.request.is_some() || hooks.response.is_some() {
            self.submit_delivery(Delivery {
                id,
                subscriber,
                message: None,
                request_hook: hooks.request,
                response_hook: hooks.response,
            });
        }
        true
    }

    /// Built-in `/unsubscribe`. No hooks run; removing a subscriber that
    /// was never there still succeeds.
    fn unsubscribe_handler(&self, request: Option<&Value>, _response: &mut Value) -> bool {
        let (id, subscriber) = match request.and_then(subscriber_from) {
            Some(parsed) => parsed,
            None => {
                error!("unsubscribe request payload invalid");
                return false;
            }
        };
        self.remove_subscription(&id, &subscriber);
        true
    }
}

/// Extract the `{id, endpoint, path}` triple; all three must be strings.
fn subscriber_from(request: &Value) -> Option<(String, Subscriber)> {
    let id = request.get("id")?.as_str()?;
    let endpoint = request.get("endpoint")?.as_str()?;
    let path = request.get("path")?.as_str()?;
    Some((id.to_string(), Subscriber::new(endpoint, path)))
}

/// Local pub/sub and request-dispatch broker.
///
/// Listens for HTTP requests on a unix-domain socket, routes them to
/// registered handlers on a serial worker pool, and fans published JSON
/// messages out to subscribers reachable on their own unix sockets, with
/// per-delivery retry and eviction. The subscription list is the only
/// persistent state.
pub struct Broker {
    core: Arc<BrokerCore>,
    server: Mutex<Option<UnixHttpServer>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(UnixHttpClient))
    }

    /// Build a broker delivering through the given transport. Tests use
    /// this to script delivery outcomes.
    pub fn with_transport(transport: Arc<dyn UnixPostTransport>) -> Self {
        let core = Arc::new_cyclic(|weak| BrokerCore {
            weak: weak.clone(),
            handlers: Mutex::new(HandlerRegistry::default()),
            subscriptions: Mutex::new(SubscriptionState {
                store: SubscriptionStore::new(),
                hooks: HashMap::new(),
            }),
            handler_pool: SerialExecutor::new("handler"),
            publish_pool: SerialExecutor::new("publish"),
            transport,
        });
        Self {
            core,
            server: Mutex::new(None),
        }
    }

    /// Wire the broker up from its configuration document.
    ///
    /// Reads `lssSocketPath` from the `aace.localSkillService` section,
    /// creates the server, installs the dispatch bridge and the built-in
    /// `/subscribe` and `/unsubscribe` handlers, and attaches the storage
    /// backend. Returns false on any failure, leaving the broker unusable.
    pub fn configure(&self, config: &Value, storage: LocalStorage) -> bool {
        let mut server_slot = self.server.lock().unwrap();
        if server_slot.is_some() {
            error!("server already created");
            return false;
        }
        let socket_path = match config
            .get(CONFIG_KEY)
            .and_then(|section| section.get("lssSocketPath"))
            .and_then(Value::as_str)
        {
            Some(path) => path,
            None => {
                error!("lssSocketPath missing from configuration");
                return false;
            }
        };
        let server = match UnixHttpServer::new(socket_path, ACCEPT_TIMEOUT) {
            Ok(server) => server,
            Err(e) => {
                error!(socket = socket_path, error = %e, "cannot create server");
                return false;
            }
        };

        let dispatch = Arc::downgrade(&self.core);
        server.set_request_handler(Arc::new(move |request| {
            match dispatch.upgrade() {
                Some(core) => core.handle_request(request),
                None => request.respond(500, ""),
            }
        }));

        self.core
            .subscriptions
            .lock()
            .unwrap()
            .store
            .set_storage(storage);

        let subscribe = Arc::downgrade(&self.core);
        self.register_handler("/subscribe", move |request, response| {
            match subscribe.upgrade() {
                Some(core) => core.subscribe_handler(request, response),
                None => false,
            }
        });
        let unsubscribe = Arc::downgrade(&self.core);
        self.register_handler("/unsubscribe", move |request, response| {
            match unsubscribe.upgrade() {
                Some(core) => core.unsubscribe_handler(request, response),
                None => false,
            }
        });

        *server_slot = Some(server);
        true
    }

    /// Load persisted subscriptions, then start serving.
    pub fn start(&self) -> bool {
        let server_slot = self.server.lock().unwrap();
        let server = match server_slot.as_ref() {
            Some(server) => server,
            None => {
                error!("broker not configured");
                return false;
            }
        };
        self.core.subscriptions.lock().unwrap().store.load();
        if !server.start() {
            return false;
        }
        info!("broker started");
        true
    }

    /// Stop accepting requests. In-flight publish tasks drain on their own.
    pub fn stop(&self) -> bool {
        match self.server.lock().unwrap().as_ref() {
            Some(server) => {
                server.stop();
                info!("broker stopped");
                true
            }
            None => false,
        }
    }

    /// Install a request handler for `path`, replacing any previous one.
    pub fn register_handler<F>(&self, path: &str, handler: F)
    where
        F: Fn(Option<&Value>, &mut Value) -> bool + Send + Sync + 'static,
    {
        self.core.handlers.lock().unwrap().insert(path, Arc::new(handler));
    }

    /// Install any of the three publish hooks for a topic, creating the
    /// topic if it does not exist yet. Hooks passed as `None` keep their
    /// previous value; the latest non-null registration wins.
    pub fn register_publish_handler(
        &self,
        id: &str,
        subscribe_hook: Option<RequestHandler>,
        request_hook: Option<PublishRequestHandler>,
        response_hook: Option<PublishResponseHandler>,
    ) -> bool {
        let mut state = self.subscriptions_lock();
        state.hooks.entry(id.to_string()).or_default().merge(PublishHooks {
            subscribe: subscribe_hook,
            request: request_hook,
            response: response_hook,
        });
        state.store.ensure_topic(id);
        true
    }

    /// Publish to every current subscriber of `id`. Returns immediately
    /// after the deliveries are queued; false if the topic is unknown.
    pub fn publish_message(&self, id: &str, message: Option<Value>) -> bool {
        self.core.publish(id, message)
    }

    /// Route a request as if it had arrived over the socket. The server
    /// bridge goes through this same path.
    pub fn dispatch(&self, request: InboundRequest) {
        self.core.handle_request(request);
    }

    /// Current subscribers of a topic, in subscription order.
    pub fn subscribers_of(&self, id: &str) -> Vec<Subscriber> {
        self.subscriptions_lock().store.subscribers_of(id)
    }

    fn subscriptions_lock(&self) -> std::sync::MutexGuard<'_, SubscriptionState> {
        self.core.subscriptions.lock().unwrap()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}
