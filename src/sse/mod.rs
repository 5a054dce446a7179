//! SSE Client + Supervisor: per-map streaming connections with framing,
//! validation, reconnect/backoff, and event handoff to the Event Processor.

pub mod backoff;
pub mod client;
pub mod supervisor;

pub use client::{ConnectionState, ConnectionStatus, SseClientHandle};
pub use supervisor::SseSupervisor;
