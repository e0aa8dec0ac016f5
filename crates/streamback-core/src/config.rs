//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;
use crate::protocol::DEFAULT_ENDPOINT;

/// Top-level streamback configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<StreamingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    8050
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Maximum wall-clock duration of one stream, in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay after every forwarded frame, in milliseconds (default: 50).
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Path of the streaming endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Frames buffered between the producer and the response body (default: 64).
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            pacing_ms: default_pacing_ms(),
            endpoint: default_endpoint(),
            buffer_frames: default_buffer_frames(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pacing_ms() -> u64 {
    50
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

fn default_buffer_frames() -> usize {
    64
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "streamback_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Expand `${NAME}` and `${NAME:-fallback}` from the environment.
///
/// Unset variables without a fallback expand to the empty string.
fn expand_env(raw: &str) -> String {
    let pattern = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("env pattern is valid");
    pattern
        .replace_all(raw, |caps: &regex::Captures| {
            let fallback = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            std::env::var(&caps[1]).unwrap_or_else(|_| fallback.to_string())
        })
        .into_owned()
}

impl Config {
    /// Read a JSON5 config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(StreamError::Io(e)),
        };
        json5::from_str(&expand_env(&raw))
            .map_err(|e| StreamError::Config(format!("{}: {e}", path.display())))
    }

    /// Default config file path.
    pub fn config_dir() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or(8050)
    }

    pub fn bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    fn streaming(&self) -> StreamingConfig {
        self.streaming.clone().unwrap_or_default()
    }

    /// Maximum wall-clock duration of one stream.
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.streaming().timeout_secs)
    }

    /// Pacing delay between forwarded frames.
    pub fn stream_pacing(&self) -> Duration {
        Duration::from_millis(self.streaming().pacing_ms)
    }

    pub fn endpoint(&self) -> String {
        self.streaming().endpoint
    }

    pub fn buffer_frames(&self) -> usize {
        self.streaming().buffer_frames.max(1)
    }

    /// Read a value by dotted path, e.g. `streaming.timeout_secs`.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        serde_json::to_value(self)
            .ok()?
            .pointer(&to_pointer(path))
            .cloned()
    }

    /// Write a value by dotted path, creating missing sections.
    ///
    /// The result must still deserialize as a `Config`; otherwise `self` is
    /// left untouched.
    pub fn set_path(&mut self, path: &str, value: Value) -> anyhow::Result<()> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            anyhow::bail!("Config path is empty");
        }

        let mut tree = serde_json::to_value(&*self)?;
        let mut slot = &mut tree;
        for segment in &segments {
            if !slot.is_object() {
                *slot = Value::Object(Default::default());
            }
            slot = slot
                .as_object_mut()
                .map(|section| section.entry(segment.to_string()).or_insert(Value::Null))
                .ok_or_else(|| anyhow::anyhow!("`{path}` does not name a config section"))?;
        }
        *slot = value;

        *self = serde_json::from_value(tree)
            .map_err(|e| anyhow::anyhow!("Invalid value for `{path}`: {e}"))?;
        Ok(())
    }

    /// Check for settings that would break serving. Returns `(warnings, errors)`.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(server) = &self.server {
            if server.port == 0 {
                errors.push("Server port cannot be 0".to_string());
            }
        }

        if let Some(streaming) = &self.streaming {
            if streaming.timeout_secs == 0 {
                errors.push("streaming.timeout_secs must be greater than 0".to_string());
            }
            if !streaming.endpoint.starts_with('/') {
                errors.push(format!(
                    "streaming.endpoint must start with '/': {}",
                    streaming.endpoint
                ));
            }
            if streaming.pacing_ms >= streaming.timeout_secs.saturating_mul(1000) {
                warnings.push(format!(
                    "streaming.pacing_ms ({}) is not below the stream timeout; every stream with more than one frame will time out",
                    streaming.pacing_ms
                ));
            }
            if streaming.buffer_frames == 0 {
                warnings.push("streaming.buffer_frames is 0; using 1".to_string());
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                warnings.push(format!("Unknown logging.format '{}', using plain", logging.format));
            }
        }

        (warnings, errors)
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn to_pointer(path: &str) -> String {
    path.split('.').filter(|s| !s.is_empty()).fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(segment);
        acc
    })
}

/// Base directory for streamback data: `~/.streamback/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".streamback")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env() {
        // SAFETY: the variable name is unique to this test
        unsafe { std::env::set_var("STREAMBACK_TEST_TIMEOUT", "12") };
        let expanded = expand_env(r#"{ streaming: { timeout_secs: ${STREAMBACK_TEST_TIMEOUT} } }"#);
        assert_eq!(expanded, "{ streaming: { timeout_secs: 12 } }");
        unsafe { std::env::remove_var("STREAMBACK_TEST_TIMEOUT") };
    }

    #[test]
    fn test_expand_env_fallback_and_unset() {
        let expanded = expand_env(r#"["${STREAMBACK_UNSET_A:-127.0.0.1}", "${STREAMBACK_UNSET_B}"]"#);
        assert_eq!(expanded, r#"["127.0.0.1", ""]"#);
        assert_eq!(expand_env("cost: $5 {x}"), "cost: $5 {x}");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port(), 8050);
        assert_eq!(config.bind(), "127.0.0.1");
        assert_eq!(config.stream_timeout(), Duration::from_secs(30));
        assert_eq!(config.stream_pacing(), Duration::from_millis(50));
        assert_eq!(config.endpoint(), "/update_component_sse");
        assert_eq!(config.buffer_frames(), 64);
    }

    #[test]
    fn test_streaming_section_defaults() {
        let config: Config = json5::from_str(r#"{ streaming: { timeout_secs: 5 } }"#).unwrap();
        assert_eq!(config.stream_timeout(), Duration::from_secs(5));
        assert_eq!(config.stream_pacing(), Duration::from_millis(50));
    }

    #[test]
    fn test_logging_section() {
        let config: Config = json5::from_str(r#"{ logging: {} }"#).unwrap();
        let logging = config.logging.unwrap();
        assert_eq!((logging.format.as_str(), logging.output.as_str()), ("plain", "stderr"));
        assert!(logging.level.is_none() && logging.filters.is_empty());

        let config: Config = json5::from_str(
            r#"{ logging: { format: "json", filters: ["streamback_gateway=debug"] } }"#,
        )
        .unwrap();
        let logging = config.logging.unwrap();
        assert_eq!(logging.format, "json");
        assert_eq!(logging.filters, ["streamback_gateway=debug"]);
    }

    #[test]
    fn test_get_and_set_path() {
        let mut config = Config::default();
        assert!(config.get_path("streaming.timeout_secs").is_none());

        config
            .set_path("streaming.timeout_secs", serde_json::json!(12))
            .unwrap();
        assert_eq!(config.stream_timeout(), Duration::from_secs(12));
        assert_eq!(config.get_path("streaming.timeout_secs"), Some(serde_json::json!(12)));

        config.set_path("server.port", serde_json::json!(9000)).unwrap();
        assert_eq!(config.port(), 9000);

        assert!(config.set_path("", serde_json::json!(1)).is_err());
        assert!(config.set_path("server.port", serde_json::json!("nope")).is_err());
        assert_eq!(config.port(), 9000);
    }

    #[test]
    fn test_validate() {
        let config = Config {
            server: Some(ServerConfig { port: 0, bind: None }),
            streaming: Some(StreamingConfig {
                timeout_secs: 1,
                pacing_ms: 1000,
                endpoint: "stream".into(),
                buffer_frames: 8,
            }),
            logging: None,
        };
        let (warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("port")));
        assert!(errors.iter().any(|e| e.contains("endpoint")));
        assert!(warnings.iter().any(|w| w.contains("pacing")));

        let (warnings, errors) = Config::default().validate();
        assert!(warnings.is_empty() && errors.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/streamback/config.json")).unwrap();
        assert_eq!(config.port(), 8050);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ streaming: ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
