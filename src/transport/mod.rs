//! The `transport` module handles HTTP over unix-domain sockets in both
//! directions.
//!
//! It implements the server the broker listens on, the outbound POST
//! client the publish pipeline delivers with, and the minimal request
//! object the dispatcher consumes.

pub mod client;
pub mod request;
pub mod server;

pub use client::{UnixHttpClient, UnixPostTransport};
pub use request::InboundRequest;
pub use server::UnixHttpServer;
