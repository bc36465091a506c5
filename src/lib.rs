//! # skillbus
//!
//! `skillbus` is a local pub/sub and request-dispatch broker for
//! cooperating processes on a single host. It exposes an HTTP surface
//! over a unix-domain socket, routes inbound requests to registered
//! handlers, and fans published JSON messages out to subscribers
//! reachable on their own unix sockets, with per-delivery retry and
//! eviction. The subscription list survives restarts.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `broker`: the central component managing topics, subscribers, request
//!   dispatch and message delivery.
//! - `transport`: the HTTP-over-unix-socket server and outbound POST client.
//! - `config`: loading and managing service configuration.
//! - `persistence`: the embedded key-value store backing the subscription list.
//! - `utils`: shared utilities such as error types, logging setup and the
//!   serial executor.

pub mod broker;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;
