use tokio::sync::oneshot;
use tracing::debug;

/// Minimal request object handed to the broker's dispatcher.
///
/// Carries the method, path and raw body of one accepted HTTP request plus
/// a one-shot responder; `respond` consumes the request, so at most one
/// response can ever be sent.
pub struct InboundRequest {
    method: String,
    path: String,
    body: String,
    responder: oneshot::Sender<(u16, String)>,
}

impl InboundRequest {
    /// Create a request and the receiving end of its responder.
    pub fn new(method: &str, path: &str, body: String) -> (Self, oneshot::Receiver<(u16, String)>) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            method: method.to_string(),
            path: path.to_string(),
            body,
            responder: tx,
        };
        (request, rx)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Send the response. A peer that already went away is ignored.
    pub fn respond(self, status: u16, body: &str) {
        if self.responder.send((status, body.to_string())).is_err() {
            debug!(path = %self.path, "peer gone before response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InboundRequest;

    #[tokio::test]
    async fn respond_delivers_status_and_body() {
        let (request, rx) = InboundRequest::new("POST", "/echo", "{}".to_string());
        assert_eq!(request.method(), "POST");
        assert_eq!(request.path(), "/echo");
        assert_eq!(request.body(), "{}");
        request.respond(200, "{\"ok\":true}");
        let (status, body) = rx.await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn dropped_request_closes_responder() {
        let (request, rx) = InboundRequest::new("GET", "/", String::new());
        drop(request);
        assert!(rx.await.is_err());
    }
}
