//! causegraph Configuration Management
//!
//! Handles configuration from environment variables and config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{ClusterParams, NGramRange, TopicCountPolicy};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Background worker configuration
    pub worker: WorkerConfig,

    /// Upload and artifact directories
    pub storage: StorageConfig,

    /// Model serving endpoints
    pub models: ModelConfig,

    /// Default clustering parameters
    pub clustering: ClusteringConfig,

    /// Entity normalization switches
    pub preprocessing: PreprocessingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        self.validate()?;
        Ok(self)
    }

    /// Overwrite every field whose environment variable is set
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("API_PORT")? {
            self.server.port = port;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Workers
        if let Some(size) = parse_env("WORKER_POOL_SIZE")? {
            self.worker.pool_size = size;
        }
        if let Some(secs) = parse_env("JOB_TIMEOUT_SECS")? {
            self.worker.job_timeout_secs = secs;
        }
        if let Some(rows) = parse_env("MAX_ROWS")? {
            self.worker.max_rows = rows;
        }
        if let Some(ttl) = parse_env("JOB_TTL_SECS")? {
            self.worker.job_ttl_secs = ttl;
        }

        // Storage
        if let Ok(dir) = std::env::var("UPLOAD_FOLDER") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DOWNLOAD_FOLDER") {
            self.storage.download_dir = PathBuf::from(dir);
        }

        // Models
        if let Ok(url) = std::env::var("PREDICTOR_URL") {
            self.models.predictor_url = url;
        }
        if let Ok(url) = std::env::var("CLUSTERER_URL") {
            self.models.clusterer_url = url;
        }
        if let Some(secs) = parse_env("MODEL_TIMEOUT_SECS")? {
            self.models.timeout_secs = secs;
        }

        // Preprocessing
        if let Some(lowercase) = parse_env("PREPROCESS_LOWERCASE")? {
            self.preprocessing.lowercase = lowercase;
        }
        if let Some(lemmatize) = parse_env("PREPROCESS_LEMMATIZE")? {
            self.preprocessing.lemmatize = lemmatize;
        }
        if let Some(remove) = parse_env("PREPROCESS_REMOVE_STOP_WORDS")? {
            self.preprocessing.remove_stop_words = remove;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "worker.pool_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.worker.job_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "worker.job_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.models.predictor_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("models.predictor_url".to_string()));
        }
        if self.models.clusterer_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("models.clusterer_url".to_string()));
        }
        self.clustering.params()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec![],
        }
    }
}

/// Background worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent job workers
    pub pool_size: usize,

    /// Wall-clock budget per job in seconds
    pub job_timeout_secs: u64,

    /// Rows read from a dataset; the rest are ignored
    pub max_rows: usize,

    /// How long job records and results are kept
    pub job_ttl_secs: u64,
}

impl WorkerConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            job_timeout_secs: 30 * 60,
            max_rows: 10_000,
            job_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Upload and artifact directories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where uploaded datasets live
    pub upload_dir: PathBuf,

    /// Where finished graph artifacts are written
    pub download_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("data/uploads"),
            download_dir: PathBuf::from("data/downloads"),
        }
    }
}

/// Model serving endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Relation predictor base URL
    pub predictor_url: String,

    /// Topic clusterer base URL
    pub clusterer_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            predictor_url: "http://localhost:9001".to_string(),
            clusterer_url: "http://localhost:9002".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Default clustering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// 0 = automatic, -1 = no reduction, n > 0 = fixed topic count
    pub nr_topics: i64,

    /// Smallest n-gram in topic representations
    pub n_gram_min: u32,

    /// Largest n-gram in topic representations
    pub n_gram_max: u32,

    /// Words kept per topic
    pub top_n_words: usize,
}

impl ClusteringConfig {
    /// Validated clustering parameters
    pub fn params(&self) -> Result<ClusterParams, ConfigError> {
        let invalid = |key: &str, value: String| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        };

        let nr_topics = TopicCountPolicy::from_wire(self.nr_topics)
            .map_err(|_| invalid("clustering.nr_topics", self.nr_topics.to_string()))?;
        let n_gram_range = NGramRange::new(self.n_gram_min, self.n_gram_max).map_err(|_| {
            invalid(
                "clustering.n_gram_range",
                format!("({}, {})", self.n_gram_min, self.n_gram_max),
            )
        })?;
        ClusterParams::new(nr_topics, n_gram_range, self.top_n_words)
            .map_err(|_| invalid("clustering.top_n_words", self.top_n_words.to_string()))
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            nr_topics: 0,
            n_gram_min: 1,
            n_gram_max: 2,
            top_n_words: 10,
        }
    }
}

/// Entity normalization switches
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Lowercase every token
    pub lowercase: bool,

    /// Reduce plural nouns to their singular form
    pub lemmatize: bool,

    /// Drop English stop-words
    pub remove_stop_words: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            lemmatize: false,
            remove_stop_words: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl From<ConfigError> for crate::CausalError {
    fn from(err: ConfigError) -> Self {
        crate::CausalError::Config(err.to_string())
    }
}
