//! End-to-end tests over real unix sockets: a broker instance, a
//! subscriber process stand-in, and a client driving the public surface.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::tempdir;

use crate::broker::Broker;
use crate::config::local_service_config;
use crate::persistence::LocalStorage;
use crate::transport::{UnixHttpClient, UnixHttpServer, UnixPostTransport};

const ACCEPT_TIMEOUT: Duration = Duration::from_millis(100);

struct Fixture {
    broker: Broker,
    storage: LocalStorage,
    lss_socket: String,
    dir: tempfile::TempDir,
}

async fn start_broker() -> Fixture {
    let dir = tempdir().expect("Failed to create temp dir");
    let storage = LocalStorage::open(dir.path().join("db").to_str().unwrap()).unwrap();
    let lss_socket = dir.path().join("lss.sock").to_str().unwrap().to_string();

    let broker = Broker::new();
    let document = local_service_config(&lss_socket, None);
    assert!(broker.configure(&document, storage.clone()));
    assert!(broker.start());

    // Give the server a moment to start up
    tokio::time::sleep(Duration::from_millis(100)).await;
    Fixture {
        broker,
        storage,
        lss_socket,
        dir,
    }
}

/// A peer listening on its own socket, recording delivered bodies.
async fn start_subscriber(
    socket_path: &str,
    status: u16,
) -> (UnixHttpServer, Arc<Mutex<Vec<String>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let server = UnixHttpServer::new(socket_path, ACCEPT_TIMEOUT).unwrap();
    let sink = received.clone();
    server.set_request_handler(Arc::new(move |request| {
        sink.lock().unwrap().push(request.body().to_string());
        request.respond(status, "");
    }));
    assert!(server.start());
    tokio::time::sleep(Duration::from_millis(100)).await;
    (server, received)
}

async fn wait_for(what: &str, predicate: impl Fn() -> bool) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn unknown_path_is_404_over_the_wire() {
    let fixture = start_broker().await;
    let client = UnixHttpClient;
    let response = client
        .post(&fixture.lss_socket, "/ping", None)
        .await
        .unwrap();
    assert_eq!(response.status, 404);
    fixture.broker.stop();
}

#[tokio::test]
async fn registered_handler_echoes_over_the_wire() {
    let fixture = start_broker().await;
    fixture.broker.register_handler("/echo", |request, response| {
        if let Some(request) = request {
            *response = request.clone();
        }
        true
    });
    let client = UnixHttpClient;
    let response = client
        .post(&fixture.lss_socket, "/echo", Some(r#"{"x":1}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(
        serde_json::from_str::<Value>(&response.body).unwrap(),
        json!({"x":1})
    );
    fixture.broker.stop();
}

#[tokio::test]
async fn subscribe_then_publish_reaches_the_subscriber() {
    let fixture = start_broker().await;
    let callback_socket = fixture.dir.path().join("a.sock");
    let callback_socket = callback_socket.to_str().unwrap();
    let (subscriber_server, received) = start_subscriber(callback_socket, 200).await;

    fixture.broker.register_publish_handler("t", None, None, None);
    let client = UnixHttpClient;
    let body = json!({"id": "t", "endpoint": callback_socket, "path": "/cb"}).to_string();
    let response = client
        .post(&fixture.lss_socket, "/subscribe", Some(body))
        .await
        .unwrap();
    assert_eq!(response.status, 204);

    assert!(fixture.broker.publish_message("t", Some(json!({"n": 42}))));
    wait_for("delivery", || !received.lock().unwrap().is_empty()).await;
    assert_eq!(
        serde_json::from_str::<Value>(&received.lock().unwrap()[0]).unwrap(),
        json!({"n": 42})
    );

    subscriber_server.stop();
    fixture.broker.stop();
}

#[tokio::test]
async fn rejecting_subscriber_is_evicted_and_forgotten() {
    let fixture = start_broker().await;
    let callback_socket = fixture.dir.path().join("a.sock");
    let callback_socket = callback_socket.to_str().unwrap();
    let (subscriber_server, received) = start_subscriber(callback_socket, 500).await;

    fixture.broker.register_publish_handler("t", None, None, None);
    let client = UnixHttpClient;
    let body = json!({"id": "t", "endpoint": callback_socket, "path": "/cb"}).to_string();
    client
        .post(&fixture.lss_socket, "/subscribe", Some(body))
        .await
        .unwrap();
    assert_eq!(fixture.broker.subscribers_of("t").len(), 1);

    fixture.broker.publish_message("t", Some(json!({"n": 1})));
    wait_for("eviction", || fixture.broker.subscribers_of("t").is_empty()).await;

    // the persisted array no longer mentions the subscriber
    let persisted = fixture
        .storage
        .get("aace.localSkillService", "subscriptions")
        .unwrap()
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&persisted).unwrap(), json!([]));

    // subsequent publishes perform zero deliveries
    let delivered = received.lock().unwrap().len();
    fixture.broker.publish_message("t", Some(json!({"n": 2})));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(received.lock().unwrap().len(), delivered);

    subscriber_server.stop();
    fixture.broker.stop();
}
