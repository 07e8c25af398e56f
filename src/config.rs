//! Run configuration: sources, credentials, cadence.
//!
//! Sources can come from a TOML file, repeated `id:address` arguments, or
//! a JSON array in the `SOURCES` environment variable. Whatever the
//! origin, everything funnels into one validated [`RunConfig`] before the
//! scheduler starts; validation failures are the only fatal errors in the
//! program.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Default cycle interval in seconds.
pub const DEFAULT_INTERVAL_SECS: f64 = 2.0;

/// Default maximum capture attempts per source per cycle.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// One configured video source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceSpec {
    /// Stable identifier, unique within a run.
    pub id: String,
    /// Stream address, e.g. an RTSP URL. Opaque to the agent.
    pub address: String,
    /// Optional human-facing name.
    #[serde(default)]
    pub name: Option<String>,
}

impl SourceSpec {
    /// Label for logs: the display name when set, the id otherwise.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Top-level structure of the TOML source file.
#[derive(Debug, Default, Deserialize)]
struct SourceFile {
    #[serde(default)]
    sources: Vec<SourceSpec>,
}

/// Immutable run configuration, loaded once at startup and shared
/// read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Detection API base URL, without a trailing slash.
    pub api_url: String,
    /// API credential sent with every request.
    pub api_key: String,
    /// Sources in per-cycle processing order.
    pub sources: Vec<SourceSpec>,
    /// Target gap between consecutive cycle starts.
    pub interval: Duration,
    /// Capture attempts per source per cycle, at least 1.
    pub max_attempts: u32,
}

/// Errors that can occur while assembling the run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse SOURCES: {0}")]
    EnvParse(#[from] serde_json::Error),

    #[error("invalid source '{0}'. Expected format: id:address")]
    MalformedSource(String),

    #[error("API URL is required. Use --api-url or set API_URL.")]
    MissingApiUrl,

    #[error("API key is required. Use --api-key or set API_KEY.")]
    MissingApiKey,

    #[error("no sources configured. Use --source, --config, or SOURCES.")]
    NoSources,

    #[error("source id must not be empty")]
    EmptyId,

    #[error("source '{0}' has an empty address")]
    EmptyAddress(String),

    #[error("duplicate source id '{0}'")]
    DuplicateId(String),

    #[error("max retries must be at least 1")]
    ZeroRetries,

    #[error("interval must be a non-negative number of seconds")]
    InvalidInterval,
}

/// Load source definitions from a TOML file with a `[[sources]]` array.
pub fn sources_from_file(path: &Path) -> Result<Vec<SourceSpec>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let file: SourceFile = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(file.sources)
}

/// Parse one `id:address` inline definition.
///
/// Splits on the first colon only; stream addresses contain colons
/// themselves.
pub fn source_from_arg(arg: &str) -> Result<SourceSpec, ConfigError> {
    match arg.split_once(':') {
        Some((id, address)) if !id.is_empty() && !address.is_empty() => Ok(SourceSpec {
            id: id.to_string(),
            address: address.to_string(),
            name: None,
        }),
        _ => Err(ConfigError::MalformedSource(arg.to_string())),
    }
}

/// Parse the `SOURCES` environment payload: a JSON array of source objects.
pub fn sources_from_json(json: &str) -> Result<Vec<SourceSpec>, ConfigError> {
    Ok(serde_json::from_str(json)?)
}

impl RunConfig {
    /// Assemble and validate the run configuration.
    ///
    /// Trims a trailing slash from the API URL. Rejects a missing URL or
    /// key, an empty source list, empty or duplicate ids, empty addresses,
    /// a negative or non-finite interval, and a zero retry budget.
    pub fn new(
        api_url: String,
        api_key: String,
        sources: Vec<SourceSpec>,
        interval_secs: f64,
        max_attempts: u32,
    ) -> Result<Self, ConfigError> {
        if api_url.trim().is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if !interval_secs.is_finite() || interval_secs < 0.0 {
            return Err(ConfigError::InvalidInterval);
        }
        if max_attempts == 0 {
            return Err(ConfigError::ZeroRetries);
        }

        let mut seen = HashSet::new();
        for source in &sources {
            if source.id.is_empty() {
                return Err(ConfigError::EmptyId);
            }
            if source.address.is_empty() {
                return Err(ConfigError::EmptyAddress(source.id.clone()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateId(source.id.clone()));
            }
        }

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            sources,
            interval: Duration::from_secs_f64(interval_secs),
            max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source(id: &str, address: &str) -> SourceSpec {
        SourceSpec {
            id: id.to_string(),
            address: address.to_string(),
            name: None,
        }
    }

    fn valid_config(sources: Vec<SourceSpec>) -> Result<RunConfig, ConfigError> {
        RunConfig::new(
            "https://api.example.com".to_string(),
            "secret".to_string(),
            sources,
            DEFAULT_INTERVAL_SECS,
            DEFAULT_MAX_RETRIES,
        )
    }

    #[test]
    fn display_name_prefers_name_over_id() {
        let mut spec = source("cam1", "rtsp://host/stream");
        assert_eq!(spec.display_name(), "cam1");
        spec.name = Some("Front door".to_string());
        assert_eq!(spec.display_name(), "Front door");
    }

    #[test]
    fn sources_from_file_parses_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[sources]]
id = "cam1"
address = "rtsp://192.168.1.100/stream"
name = "Front door"

[[sources]]
id = "cam2"
address = "rtsp://192.168.1.101/stream"
"#
        )
        .unwrap();

        let sources = sources_from_file(file.path()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].id, "cam1");
        assert_eq!(sources[0].name.as_deref(), Some("Front door"));
        assert_eq!(sources[1].id, "cam2");
        assert!(sources[1].name.is_none());
    }

    #[test]
    fn sources_from_file_missing_file_is_io_error() {
        let result = sources_from_file(Path::new("/nonexistent/sources.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn sources_from_file_bad_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[sources]]\nid = ").unwrap();

        let result = sources_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn source_from_arg_splits_on_first_colon() {
        let spec = source_from_arg("cam1:rtsp://192.168.1.100:554/stream").unwrap();
        assert_eq!(spec.id, "cam1");
        assert_eq!(spec.address, "rtsp://192.168.1.100:554/stream");
    }

    #[test]
    fn source_from_arg_rejects_missing_colon() {
        assert!(matches!(
            source_from_arg("cam1"),
            Err(ConfigError::MalformedSource(_))
        ));
    }

    #[test]
    fn source_from_arg_rejects_empty_parts() {
        assert!(source_from_arg(":rtsp://host/stream").is_err());
        assert!(source_from_arg("cam1:").is_err());
    }

    #[test]
    fn sources_from_json_parses_array() {
        let json = r#"[
            {"id": "cam1", "address": "rtsp://host/a"},
            {"id": "cam2", "address": "rtsp://host/b", "name": "Yard"}
        ]"#;
        let sources = sources_from_json(json).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].name.as_deref(), Some("Yard"));
    }

    #[test]
    fn sources_from_json_rejects_garbage() {
        assert!(matches!(
            sources_from_json("not json"),
            Err(ConfigError::EnvParse(_))
        ));
    }

    #[test]
    fn run_config_trims_trailing_slash() {
        let config = RunConfig::new(
            "https://api.example.com/".to_string(),
            "secret".to_string(),
            vec![source("cam1", "rtsp://host/stream")],
            2.0,
            5,
        )
        .unwrap();
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn run_config_rejects_missing_url_and_key() {
        let result = RunConfig::new(
            String::new(),
            "secret".to_string(),
            vec![source("cam1", "rtsp://host/stream")],
            2.0,
            5,
        );
        assert!(matches!(result, Err(ConfigError::MissingApiUrl)));

        let result = RunConfig::new(
            "https://api.example.com".to_string(),
            String::new(),
            vec![source("cam1", "rtsp://host/stream")],
            2.0,
            5,
        );
        assert!(matches!(result, Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn run_config_rejects_empty_source_list() {
        assert!(matches!(valid_config(vec![]), Err(ConfigError::NoSources)));
    }

    #[test]
    fn run_config_rejects_empty_id_and_address() {
        let result = valid_config(vec![source("", "rtsp://host/stream")]);
        assert!(matches!(result, Err(ConfigError::EmptyId)));

        let result = valid_config(vec![source("cam1", "")]);
        assert!(matches!(result, Err(ConfigError::EmptyAddress(_))));
    }

    #[test]
    fn run_config_rejects_duplicate_ids() {
        let result = valid_config(vec![
            source("cam1", "rtsp://host/a"),
            source("cam1", "rtsp://host/b"),
        ]);
        assert!(matches!(result, Err(ConfigError::DuplicateId(id)) if id == "cam1"));
    }

    #[test]
    fn run_config_rejects_bad_interval() {
        let result = RunConfig::new(
            "https://api.example.com".to_string(),
            "secret".to_string(),
            vec![source("cam1", "rtsp://host/stream")],
            -1.0,
            5,
        );
        assert!(matches!(result, Err(ConfigError::InvalidInterval)));

        let result = RunConfig::new(
            "https://api.example.com".to_string(),
            "secret".to_string(),
            vec![source("cam1", "rtsp://host/stream")],
            f64::NAN,
            5,
        );
        assert!(matches!(result, Err(ConfigError::InvalidInterval)));
    }

    #[test]
    fn run_config_allows_zero_interval() {
        let config = RunConfig::new(
            "https://api.example.com".to_string(),
            "secret".to_string(),
            vec![source("cam1", "rtsp://host/stream")],
            0.0,
            5,
        )
        .unwrap();
        assert_eq!(config.interval, Duration::ZERO);
    }

    #[test]
    fn run_config_rejects_zero_retries() {
        let result = RunConfig::new(
            "https://api.example.com".to_string(),
            "secret".to_string(),
            vec![source("cam1", "rtsp://host/stream")],
            2.0,
            0,
        );
        assert!(matches!(result, Err(ConfigError::ZeroRetries)));
    }
}
