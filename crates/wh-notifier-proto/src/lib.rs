//! Wire and domain types for the wormhole-notifier bridge.
//!
//! This crate has no network or async dependencies: it exists so the
//! framing, validation, and merge rules that govern SSE events and
//! cached map state can be exercised and tested in isolation from the
//! I/O that produces and consumes them.

pub mod character;
pub mod error;
pub mod event;
pub mod map_config;
pub mod system;

pub use character::{Character, RawCharacter};
pub use error::{ProtoError, ProtoResult};
pub use event::{RawFrame, SseEvent, SseEventKind, CONNECTED_EVENT_TYPE};
pub use map_config::{MapConfig, MapConfigError, RawMapEntry, DEFAULT_EVENT_SET};
pub use system::{StaticDetail, System, SystemPatch, SystemType};
