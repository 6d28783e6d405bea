//! Error types for endpoint construction, payload encoding and the client API.
//!
//! Connection failures have no variant here: a failed handshake or a dropped
//! socket is only ever observed as [`ConnectionState::Closed`](crate::ConnectionState).

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("unsupported scheme `{0}` (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("endpoint has no host")]
    MissingHost,

    #[error("bearer token is empty")]
    MissingCredential,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to read attachment `{name}`")]
    AttachmentRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("attachment `{name}` is not a valid data URL")]
    MalformedDataUrl { name: String },

    #[error("failed to serialize frame")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("turn has no text, file, or audio")]
    EmptyTurn,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("turn carries both a file and an audio clip")]
    ConflictingAttachments,

    #[error("chat session has shut down")]
    SessionClosed,
}

impl ChatError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::EmptyTurn => "empty_turn",
            Self::ConflictingAttachments => "conflicting_attachments",
            Self::Encode(EncodeError::AttachmentRead { .. }) => "attachment_read",
            Self::Encode(EncodeError::MalformedDataUrl { .. }) => "malformed_data_url",
            Self::Encode(EncodeError::Serialize(_)) => "serialize",
            Self::Endpoint(_) => "invalid_endpoint",
            Self::SessionClosed => "session_closed",
        }
    }
}
