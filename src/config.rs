/// Application configuration.
///
/// Loaded from JSON. Every field is optional in the file; missing fields take
/// the defaults below. The file is looked up at `$PHOTO_STREAM_CONFIG`, then
/// `<config dir>/photo-stream/config.json`, and is skipped when neither exists.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::reconcile::RetryPolicy;
use crate::state::data::ImageId;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "PHOTO_STREAM_CONFIG";

const DEFAULT_URL_TEMPLATE: &str = "https://picsum.photos/id/{id}/640/480.jpg";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that is cleaned, written and watched. `None` = current directory.
    pub working_dir: Option<PathBuf>,
    /// Recognized image extension, without the dot.
    pub extension: String,
    /// Worker count for the bounded pool ("agent") policy.
    pub pool_size: usize,
    /// Batch of identifiers. Empty means ask the source for its listing.
    pub identifiers: Vec<String>,
    pub source: SourceConfig,
    pub retry: RetryPolicy,
}

/// Where image bytes come from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// `{id}` in the template is replaced by the identifier.
    Http { url_template: String },
    /// Copy files out of a local folder, optionally slowed down per item.
    Directory {
        path: PathBuf,
        #[serde(default)]
        latency_ms: u64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Http {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: None,
            extension: "jpg".to_string(),
            pool_size: 4,
            identifiers: (10..22).map(|n| n.to_string()).collect(),
            source: SourceConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load the configuration from the first file found, or defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::locate() {
            Some(path) => Self::from_file(&path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn locate() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(explicit));
        }

        let mut path = dirs::config_dir()?;
        path.push("photo-stream");
        path.push("config.json");
        path.exists().then_some(path)
    }

    /// Parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(path = %path.display(), "📁 Loaded configuration");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        if self.extension.is_empty() {
            return Err(ConfigError::Invalid("extension must not be empty".into()));
        }
        if self.extension.starts_with('.')
            || self.extension.contains(['/', '\\'])
        {
            return Err(ConfigError::Invalid(format!(
                "extension {:?} must be a bare extension like \"jpg\"",
                self.extension
            )));
        }
        if let SourceConfig::Http { url_template } = &self.source {
            if !url_template.contains("{id}") {
                return Err(ConfigError::Invalid(
                    "url_template must contain an {id} placeholder".into(),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the working directory, defaulting to the current directory.
    pub fn working_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(ConfigError::WorkingDir),
        }
    }

    pub fn identifiers(&self) -> Vec<ImageId> {
        self.identifiers.iter().map(|id| ImageId::new(id.as_str())).collect()
    }
}

/// True when `path` carries `extension`, ignoring ASCII case.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
