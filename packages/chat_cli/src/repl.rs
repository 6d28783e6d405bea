//! Prompt command parsing and turn-input construction.

use std::path::{Path, PathBuf};

use chat_stream::{AttachmentSource, Mode, TurnInput};

/// Recorder output format when the extension says nothing useful.
const DEFAULT_AUDIO_TYPE: &str = "audio/webm";

pub const HELP: &str = "\
commands:
  <text>                   send a message
  /file <path> [text]      send a file with an optional message
  /audio <path> <secs> [text]
                           send a recording with its duration
  /mode <mode>             switch mode (generic, document_processing, personal_query)
  /reset                   abandon the current reply
  /status                  show connection and turn state
  /quit                    exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Say(String),
    File {
        path: PathBuf,
        text: String,
    },
    Audio {
        path: PathBuf,
        duration_secs: f64,
        text: String,
    },
    Mode(Mode),
    Reset,
    Status,
    Help,
    Quit,
}

/// Parse one prompt line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ReplCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(ReplCommand::Say(line.to_string())));
    }

    let (cmd, rest) = split_word(line);
    let cmd = match cmd {
        "/file" => {
            let (path, text) = split_word(rest);
            if path.is_empty() {
                return Err("usage: /file <path> [text]".into());
            }
            ReplCommand::File {
                path: PathBuf::from(path),
                text: text.to_string(),
            }
        }
        "/audio" => {
            let (path, rest) = split_word(rest);
            let (secs, text) = split_word(rest);
            if path.is_empty() || secs.is_empty() {
                return Err("usage: /audio <path> <secs> [text]".into());
            }
            let duration_secs = secs
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite() && *d >= 0.0)
                .ok_or_else(|| format!("invalid duration `{secs}`"))?;
            ReplCommand::Audio {
                path: PathBuf::from(path),
                duration_secs,
                text: text.to_string(),
            }
        }
        "/mode" => {
            if rest.is_empty() {
                return Err("usage: /mode <generic|document_processing|personal_query>".into());
            }
            ReplCommand::Mode(rest.parse()?)
        }
        "/reset" => ReplCommand::Reset,
        "/status" => ReplCommand::Status,
        "/help" | "/?" => ReplCommand::Help,
        "/quit" | "/exit" => ReplCommand::Quit,
        other => return Err(format!("unknown command `{other}` (try /help)")),
    };
    Ok(Some(cmd))
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (s, ""),
    }
}

impl ReplCommand {
    /// The turn this command sends, if it sends one.
    pub fn into_input(self, mode: Mode) -> Option<TurnInput> {
        match self {
            ReplCommand::Say(text) => Some(TurnInput::new(text).mode(mode)),
            ReplCommand::File { path, text } => Some(file_input(text, path, mode)),
            ReplCommand::Audio {
                path,
                duration_secs,
                text,
            } => Some(audio_input(text, path, duration_secs, mode)),
            _ => None,
        }
    }
}

pub fn file_input(text: String, path: PathBuf, mode: Mode) -> TurnInput {
    let name = display_name(&path);
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    TurnInput::new(text)
        .mode(mode)
        .file(name, mime.essence_str(), AttachmentSource::Path(path))
}

pub fn audio_input(text: String, path: PathBuf, duration_secs: f64, mode: Mode) -> TurnInput {
    let mime = mime_guess::from_path(&path)
        .first()
        .map(|m| m.essence_str().to_string())
        .filter(|m| m.starts_with("audio/"))
        .unwrap_or_else(|| DEFAULT_AUDIO_TYPE.to_string());
    TurnInput::new(text)
        .mode(mode)
        .audio(mime, duration_secs, AttachmentSource::Path(path))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
