//! Library surface for the notification bridge.
//!
//! `src/main.rs` is a thin binary entry point over these modules; they are
//! exported here (rather than only declared in the binary) so integration
//! tests can drive real SSE framing and inject mock collaborators without
//! going through a spawned subprocess.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod notifier;
pub mod processor;
pub mod registry;
pub mod sse;
pub mod static_info;
pub mod telemetry;
pub mod transport;
