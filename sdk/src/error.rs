//! SDK error types.
//!
//! Provides error types for decoding L2 payloads.

/// SDK errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// Event payload did not match the shape required by its event type.
    #[error("invalid {event_type} payload: {reason}")]
    InvalidPayload {
        /// Event type the payload was decoded as.
        event_type: String,
        /// Decoder message.
        reason: String,
    },

    /// A required field was present but empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
