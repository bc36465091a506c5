use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use crate::utils::error::TransportError;

/// Budget for establishing the unix-socket connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);
/// End-to-end budget for one delivery attempt.
pub const TOTAL_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Status and collected body of a completed POST.
#[derive(Debug)]
pub struct PostResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound POST to a peer's unix socket.
///
/// Abstract so the publish pipeline can be exercised against a scripted
/// transport in tests.
#[async_trait]
pub trait UnixPostTransport: Send + Sync {
    async fn post(
        &self,
        endpoint: &str,
        path: &str,
        body: Option<String>,
    ) -> Result<PostResponse, TransportError>;
}

/// HTTP/1.1 client over a unix-domain socket, one connection per call.
pub struct UnixHttpClient;

#[async_trait]
impl UnixPostTransport for UnixHttpClient {
    async fn post(
        &self,
        endpoint: &str,
        path: &str,
        body: Option<String>,
    ) -> Result<PostResponse, TransportError> {
        // the total budget covers the connect phase too; the connect
        // timeout is a sub-constraint within it
        match timeout(TOTAL_TIMEOUT, attempt(endpoint, path, body)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                endpoint: endpoint.to_string(),
            }),
        }
    }
}

async fn attempt(
    endpoint: &str,
    path: &str,
    body: Option<String>,
) -> Result<PostResponse, TransportError> {
    let stream = match timeout(CONNECT_TIMEOUT, UnixStream::connect(endpoint)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(TransportError::Timeout {
                endpoint: endpoint.to_string(),
            })
        }
    };
    exchange(stream, path, body).await
}

async fn exchange(
    stream: UnixStream,
    path: &str,
    body: Option<String>,
) -> Result<PostResponse, TransportError> {
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    // Drive the connection until the exchange completes
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "client connection error");
        }
    });

    let payload = match body {
        Some(body) => Full::new(Bytes::from(body)),
        None => Full::new(Bytes::new()),
    };
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("Host", "localhost")
        .header("Content-Type", "application/json")
        .body(payload)?;

    let response = sender.send_request(request).await?;
    let status = response.status().as_u16();
    let collected = response.into_body().collect().await?.to_bytes();
    Ok(PostResponse {
        status,
        body: String::from_utf8_lossy(&collected).to_string(),
    })
}
