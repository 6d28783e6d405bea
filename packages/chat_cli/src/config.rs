use anyhow::{Context, Result};
use chat_stream::{ClientOptions, Endpoint, FragmentDiscipline, Mode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [stream]
//                    idle_settle_ms = 2000
//
//   env var:         CHAT_STREAM__IDLE_SETTLE_MS=2000   (double underscore = nesting)
//
// CLI flags are applied last, on top of the extracted FileConfig.

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub endpoint: EndpointFileConfig,
    #[serde(default)]
    pub stream: StreamFileConfig,
}

/// Where to connect (lives under `[endpoint]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointFileConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for EndpointFileConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
        }
    }
}

/// Streaming tunables (lives under `[stream]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamFileConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub discipline: FragmentDiscipline,
    #[serde(default)]
    pub mode: Mode,
    /// Settle a turn after this much inbound silence.
    #[serde(default = "default_idle_settle_ms")]
    pub idle_settle_ms: u64,
}

impl Default for StreamFileConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            discipline: FragmentDiscipline::default(),
            mode: Mode::default(),
            idle_settle_ms: default_idle_settle_ms(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:8080/ws/chat".to_string()
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_idle_settle_ms() -> u64 {
    1500
}

/// Flags that override whatever the file and environment said.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub mode: Option<Mode>,
}

impl FileConfig {
    pub fn apply(&mut self, overrides: CliOverrides) {
        if let Some(url) = overrides.url {
            self.endpoint.url = url;
        }
        if let Some(token) = overrides.token {
            self.endpoint.token = Some(token);
        }
        if let Some(mode) = overrides.mode {
            self.stream.mode = mode;
        }
    }
}

/// `--config` if given, else `<config_dir>/chat-stream/config.toml`.
pub fn config_path(custom: Option<PathBuf>) -> Result<PathBuf> {
    match custom {
        Some(path) => Ok(path),
        None => Ok(dirs::config_dir()
            .context("Could not find config directory")?
            .join("chat-stream")
            .join("config.toml")),
    }
}

/// Build a figment that layers: defaults → config.toml → CHAT_* env vars.
///
/// A missing config file is not an error; it simply contributes nothing.
pub fn load_config(config_toml: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_toml))
        .merge(Env::prefixed("CHAT_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

pub fn endpoint_from_file(fc: &EndpointFileConfig) -> Result<Endpoint> {
    let token = fc.token.as_deref().context(
        "No token configured (set [endpoint] token, CHAT_ENDPOINT__TOKEN or --token)",
    )?;
    Endpoint::new(&fc.url, token).with_context(|| format!("Invalid endpoint {}", fc.url))
}

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub options: ClientOptions,
    pub idle_settle: Duration,
}

impl StreamConfig {
    pub fn from_file(fc: &StreamFileConfig) -> Self {
        Self {
            options: ClientOptions {
                tick_interval: Duration::from_millis(fc.tick_interval_ms.max(1)),
                discipline: fc.discipline,
                initial_mode: fc.mode,
                ..ClientOptions::default()
            },
            idle_settle: Duration::from_millis(fc.idle_settle_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_stream_file_config_defaults() {
        let d = StreamFileConfig::default();
        assert_eq!(d.tick_interval_ms, 100);
        assert_eq!(d.discipline, FragmentDiscipline::Delta);
        assert_eq!(d.mode, Mode::Generic);
        assert_eq!(d.idle_settle_ms, 1500);
    }

    #[test]
    fn test_endpoint_file_config_defaults() {
        let d = EndpointFileConfig::default();
        assert_eq!(d.url, "ws://localhost:8080/ws/chat");
        assert!(d.token.is_none());
    }

    #[test]
    fn test_config_path_custom() {
        let path = config_path(Some(PathBuf::from("/tmp/x.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(&tmp.path().join("config.toml"))
            .extract()
            .unwrap();
        assert_eq!(fc.stream.idle_settle_ms, 1500);
        assert!(fc.endpoint.token.is_none());
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[endpoint]\nurl = \"wss://chat.example.com/ws\"\ntoken = \"abc\"\n\n\
             [stream]\ndiscipline = \"snapshot\"\nmode = \"document_processing\"\nidle_settle_ms = 500\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.endpoint.url, "wss://chat.example.com/ws");
        assert_eq!(fc.endpoint.token.as_deref(), Some("abc"));
        assert_eq!(fc.stream.discipline, FragmentDiscipline::Snapshot);
        assert_eq!(fc.stream.mode, Mode::DocumentProcessing);
        assert_eq!(fc.stream.idle_settle_ms, 500);
        assert_eq!(fc.stream.tick_interval_ms, 100);
    }

    #[test]
    fn test_load_config_rejects_unknown_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[stream]\nmode = \"poetry\"\n").unwrap();
        assert!(load_config(&path).extract::<FileConfig>().is_err());
    }

    // ── overrides / runtime ─────────────────────────────────────────────

    #[test]
    fn test_cli_overrides_win() {
        let mut fc = FileConfig::default();
        fc.endpoint.token = Some("from-file".into());
        fc.apply(CliOverrides {
            url: Some("ws://127.0.0.1:9000/chat".into()),
            token: Some("from-flag".into()),
            mode: Some(Mode::PersonalQuery),
        });
        assert_eq!(fc.endpoint.url, "ws://127.0.0.1:9000/chat");
        assert_eq!(fc.endpoint.token.as_deref(), Some("from-flag"));
        assert_eq!(fc.stream.mode, Mode::PersonalQuery);
    }

    #[test]
    fn test_empty_overrides_keep_file_values() {
        let mut fc = FileConfig::default();
        fc.endpoint.token = Some("t".into());
        fc.apply(CliOverrides::default());
        assert_eq!(fc.endpoint.token.as_deref(), Some("t"));
        assert_eq!(fc.stream.mode, Mode::Generic);
    }

    #[test]
    fn test_endpoint_requires_token() {
        let err = endpoint_from_file(&EndpointFileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("No token configured"));
    }

    #[test]
    fn test_endpoint_from_file() {
        let fc = EndpointFileConfig {
            url: "ws://localhost:8080/ws/chat".into(),
            token: Some("abc".into()),
        };
        let endpoint = endpoint_from_file(&fc).unwrap();
        assert_eq!(
            endpoint.as_str(),
            "ws://localhost:8080/ws/chat?Authorization=Bearer%20abc"
        );
    }

    #[test]
    fn test_endpoint_bad_scheme() {
        let fc = EndpointFileConfig {
            url: "http://localhost/ws".into(),
            token: Some("abc".into()),
        };
        assert!(endpoint_from_file(&fc).is_err());
    }

    #[test]
    fn test_stream_config_from_file() {
        let fc = StreamFileConfig {
            tick_interval_ms: 0,
            discipline: FragmentDiscipline::Snapshot,
            mode: Mode::DocumentProcessing,
            idle_settle_ms: 750,
        };
        let sc = StreamConfig::from_file(&fc);
        assert_eq!(sc.options.tick_interval, Duration::from_millis(1));
        assert_eq!(sc.options.discipline, FragmentDiscipline::Snapshot);
        assert_eq!(sc.options.initial_mode, Mode::DocumentProcessing);
        assert_eq!(sc.idle_settle, Duration::from_millis(750));
    }
}
