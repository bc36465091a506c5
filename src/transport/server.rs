use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::UnixListener;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::transport::request::InboundRequest;

/// Callback invoked with each accepted request. Must not block; the
/// response travels back through the request's one-shot responder.
pub type RequestSink = Arc<dyn Fn(InboundRequest) + Send + Sync>;

// sun_path is 104 bytes on macOS, 108 on Linux; use the conservative limit
const MAX_SOCKET_PATH: usize = 104;

/// HTTP/1.1 server on a unix-domain socket.
///
/// The accept loop polls with a short timeout so `stop` takes effect
/// within one interval; each accepted connection is served on its own
/// task. Construction validates the path, `start` binds it.
pub struct UnixHttpServer {
    socket_path: PathBuf,
    accept_timeout: Duration,
    sink: Mutex<Option<RequestSink>>,
    running: Arc<AtomicBool>,
}

impl UnixHttpServer {
    pub fn new(socket_path: &str, accept_timeout: Duration) -> io::Result<Self> {
        if socket_path.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty socket path"));
        }
        if socket_path.len() >= MAX_SOCKET_PATH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("socket path too long ({} bytes, max {})", socket_path.len(), MAX_SOCKET_PATH - 1),
            ));
        }
        Ok(Self {
            socket_path: PathBuf::from(socket_path),
            accept_timeout,
            sink: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Install the callback that receives accepted requests. Must be set
    /// before `start`.
    pub fn set_request_handler(&self, sink: RequestSink) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    /// Bind the socket and spawn the accept loop. Returns false if the
    /// server is already running, no request handler is installed, or the
    /// socket cannot be bound.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(socket = %self.socket_path.display(), "server already running");
            return false;
        }
        let sink = match self.sink.lock().unwrap().clone() {
            Some(sink) => sink,
            None => {
                error!("no request handler installed");
                self.running.store(false, Ordering::SeqCst);
                return false;
            }
        };
        let listener = match bind_socket(&self.socket_path) {
            Ok(listener) => listener,
            Err(e) => {
                error!(socket = %self.socket_path.display(), error = %e, "binding socket failed");
                self.running.store(false, Ordering::SeqCst);
                return false;
            }
        };
        info!(socket = %self.socket_path.display(), "server listening");
        tokio::spawn(accept_loop(
            listener,
            sink,
            self.running.clone(),
            self.accept_timeout,
            self.socket_path.clone(),
        ));
        true
    }

    /// Signal the accept loop to exit. In-flight connections finish on
    /// their own tasks.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn bind_socket(socket_path: &Path) -> io::Result<std::os::unix::net::UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Remove a stale socket file from a previous run
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener = std::os::unix::net::UnixListener::bind(socket_path)?;
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(socket_path, perms)?;
    }
    listener.set_nonblocking(true)?;
    Ok(listener)
}

async fn accept_loop(
    listener: std::os::unix::net::UnixListener,
    sink: RequestSink,
    running: Arc<AtomicBool>,
    accept_timeout: Duration,
    socket_path: PathBuf,
) {
    let listener = match UnixListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "registering listener failed");
            running.store(false, Ordering::SeqCst);
            return;
        }
    };
    while running.load(Ordering::SeqCst) {
        let stream = match timeout(accept_timeout, listener.accept()).await {
            Ok(Ok((stream, _addr))) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "accept failed");
                continue;
            }
            // poll tick; re-check the running flag
            Err(_) => continue,
        };
        let sink = sink.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request: Request<Incoming>| {
                let sink = sink.clone();
                async move { Ok::<_, std::convert::Infallible>(bridge(request, sink).await) }
            });
            let connection = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service);
            if let Err(e) = connection.await {
                debug!(error = %e, "connection ended with error");
            }
        });
    }
    let _ = std::fs::remove_file(&socket_path);
    info!(socket = %socket_path.display(), "server stopped");
}

/// Turn one hyper request into an `InboundRequest`, hand it to the sink
/// and wait for the one-shot response.
async fn bridge(request: Request<Incoming>, sink: RequestSink) -> Response<Full<Bytes>> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let body = match request.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).to_string(),
        Err(e) => {
            warn!(error = %e, "reading request body failed");
            return plain(StatusCode::BAD_REQUEST);
        }
    };
    let (inbound, responder) = InboundRequest::new(&method, &path, body);
    sink(inbound);
    match responder.await {
        Ok((status, body)) => {
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Response::builder()
                .status(status)
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| plain(StatusCode::INTERNAL_SERVER_ERROR))
        }
        // responder dropped without answering; the handler already logged why
        Err(_) => plain(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn plain(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
