//! The `utils` module provides a collection of utility components used
//! across the `skillbus` application.
//!
//! This includes the shared error types, logging initialization, and the
//! serial executor the broker's worker pools are built on.

pub mod error;
pub mod executor;
pub mod logging;
