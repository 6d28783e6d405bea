//! Client side of the streaming chat transport.
//!
//! One [`ChatClient`] per chat view owns exactly one WebSocket [`Connection`]
//! and one [`Turn`]. A turn is sent as a single JSON frame; the assistant reply
//! arrives as raw text fragments that are appended in arrival order until the
//! consumer settles the turn.
//!
//! ```rust,no_run
//! use chat_stream::{ChatClient, ClientOptions, Endpoint, TurnInput};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::new("ws://localhost:8080/ws/chat", "token")?;
//! let client = ChatClient::connect(endpoint, ClientOptions::default());
//!
//! let mut updates = client.subscribe();
//! updates.wait_for(|s| s.is_connected()).await?;
//!
//! client.submit(TurnInput::new("hello")).await?;
//! updates.wait_for(|s| !s.reply.is_empty()).await?;
//! client.settle().await?;
//! println!("{} ({:.1}s)", client.reply(), client.elapsed_seconds());
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod client;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod payload;
pub mod timer;
pub mod transcript;
pub mod turn;

pub use accumulator::{FragmentDiscipline, ResponseAccumulator};
pub use client::{ChatClient, ChatSnapshot, ClientOptions};
pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use endpoint::Endpoint;
pub use error::{ChatError, EncodeError, EndpointError};
pub use payload::{Attachment, AttachmentSource, Mode, ModeChange, Payload, TurnInput};
pub use timer::TurnTimer;
pub use transcript::{Role, Transcript, TranscriptEntry};
pub use turn::{TransitionError, Turn, TurnEvent, TurnPhase};
