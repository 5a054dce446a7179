//! Parsing/validation errors shared by the wire and domain types.

use thiserror::Error;

/// Errors raised while turning raw SSE bytes into a validated domain event.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtoError {
    /// The frame's `data:` lines did not decode as a JSON object.
    #[error("malformed event payload: {0}")]
    Decode(String),

    /// The decoded frame was missing one or more fields required for its kind.
    #[error("event missing required fields: {0:?}")]
    MissingFields(Vec<&'static str>),
}

pub type ProtoResult<T> = Result<T, ProtoError>;
