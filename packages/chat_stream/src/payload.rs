//! Payload encoder: builds the wire-bound request for one turn.
//!
//! Wire shapes:
//!
//! ```text
//! { "message": "...", "mode": "generic",
//!   "file":  { "name": "...", "type": "...", "content": "<base64>" } | null,
//!   "audio": { "type": "...", "duration": 3.5, "content": "<base64>" } | null }
//!
//! { "type": "mode_change", "mode": "generic" }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use data_encoding::BASE64;
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

/// Conversation context that tells the server how to interpret a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    #[serde(alias = "generic_policy")]
    Generic,
    #[serde(alias = "Document_Processing")]
    DocumentProcessing,
    #[serde(alias = "project_question")]
    PersonalQuery,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Generic, Mode::DocumentProcessing, Mode::PersonalQuery];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Generic => "generic",
            Mode::DocumentProcessing => "document_processing",
            Mode::PersonalQuery => "personal_query",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "generic" | "generic_policy" => Ok(Mode::Generic),
            "document_processing" => Ok(Mode::DocumentProcessing),
            "personal_query" | "project_question" => Ok(Mode::PersonalQuery),
            other => Err(format!(
                "unknown mode `{other}` (expected one of: generic, document_processing, personal_query)"
            )),
        }
    }
}

/// Where an attachment's bytes come from.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
    /// An already-encoded `data:<type>;base64,<content>` URL.
    DataUrl(String),
}

#[derive(Debug, Clone)]
pub enum Attachment {
    File {
        name: String,
        mime_type: String,
        source: AttachmentSource,
    },
    Audio {
        mime_type: String,
        duration_secs: f64,
        source: AttachmentSource,
    },
}

/// What the user submitted: text, mode, and at most one attachment.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub text: String,
    /// `None` sends the turn in the client's active mode.
    pub mode: Option<Mode>,
    pub attachment: Option<Attachment>,
}

impl TurnInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: None,
            attachment: None,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        source: AttachmentSource,
    ) -> Self {
        self.attachment = Some(Attachment::File {
            name: name.into(),
            mime_type: mime_type.into(),
            source,
        });
        self
    }

    pub fn audio(
        mut self,
        mime_type: impl Into<String>,
        duration_secs: f64,
        source: AttachmentSource,
    ) -> Self {
        self.attachment = Some(Attachment::Audio {
            mime_type: mime_type.into(),
            duration_secs,
            source,
        });
        self
    }

    /// True when there is nothing to send: blank text and no attachment.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPayload {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub duration: f64,
    pub content: String,
}

/// The request frame for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub message: String,
    pub mode: Mode,
    pub file: Option<FilePayload>,
    pub audio: Option<AudioPayload>,
}

impl Payload {
    pub fn text(message: impl Into<String>, mode: Mode) -> Self {
        Self {
            message: message.into(),
            mode,
            file: None,
            audio: None,
        }
    }

    /// Blank message and no attachment.
    pub fn is_empty(&self) -> bool {
        self.message.trim().is_empty() && self.file.is_none() && self.audio.is_none()
    }

    /// Label shown in the transcript next to the user's message.
    pub fn attachment_label(&self) -> Option<String> {
        match (&self.file, &self.audio) {
            (Some(file), _) => Some(file.name.clone()),
            (None, Some(_)) => Some("Recorded Audio".to_string()),
            (None, None) => None,
        }
    }

    pub fn to_frame(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Mode-change notification. Shares the transport but never starts a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "mode_change")]
pub struct ModeChange {
    pub mode: Mode,
}

impl ModeChange {
    pub fn to_frame(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encode a turn, reading and base64-encoding its attachment first.
///
/// Returns an error instead of a partial payload if the attachment can't be read.
pub async fn encode_turn(input: TurnInput) -> Result<Payload, EncodeError> {
    let mut payload = Payload::text(input.text, input.mode.unwrap_or_default());

    match input.attachment {
        None => {}
        Some(Attachment::File {
            name,
            mime_type,
            source,
        }) => {
            let content = read_base64(&name, source).await?;
            payload.file = Some(FilePayload {
                name,
                mime_type,
                content,
            });
        }
        Some(Attachment::Audio {
            mime_type,
            duration_secs,
            source,
        }) => {
            let content = read_base64("audio", source).await?;
            payload.audio = Some(AudioPayload {
                mime_type,
                duration: duration_secs,
                content,
            });
        }
    }

    Ok(payload)
}

async fn read_base64(name: &str, source: AttachmentSource) -> Result<String, EncodeError> {
    match source {
        AttachmentSource::Bytes(bytes) => Ok(BASE64.encode(&bytes)),
        AttachmentSource::Path(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| EncodeError::AttachmentRead {
                    name: name.to_string(),
                    source,
                })?;
            Ok(BASE64.encode(&bytes))
        }
        AttachmentSource::DataUrl(url) => strip_data_url(&url)
            .map(str::to_string)
            .ok_or_else(|| EncodeError::MalformedDataUrl {
                name: name.to_string(),
            }),
    }
}

/// Keep only the content after the first comma of a data URL.
fn strip_data_url(url: &str) -> Option<&str> {
    if !url.starts_with("data:") {
        return None;
    }
    url.split_once(',').map(|(_, content)| content)
}
