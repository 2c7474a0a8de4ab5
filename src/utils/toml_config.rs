//! TOML-based configuration for FoodAtlas
//!
//! All infrastructure and pipeline tuning lives in a single TOML file
//! (`foodatlas.toml`). Secrets are never stored in the file: the config only
//! names the environment variables that hold them.
//!
//! # Hot Reloading
//!
//! Configuration changes are automatically detected and applied at runtime.
//! Use `AtlasConfigManager` for thread-safe access to the current configuration.
//! A file that fails to parse or validate never replaces a good configuration.

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from foodatlas.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtlasConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Text-to-SQL execution budget
    #[serde(default)]
    pub sql: SqlConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

// ============= Authentication Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable name containing the JWT secret
    #[serde(default = "default_jwt_secret_env")]
    pub jwt_secret_env: String,

    #[serde(default = "default_jwt_access_expiry")]
    pub jwt_access_expiry: i64,
}

fn default_jwt_secret_env() -> String {
    "JWT_SECRET".to_string()
}

fn default_jwt_access_expiry() -> i64 {
    3600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: default_jwt_secret_env(),
            jwt_access_expiry: default_jwt_access_expiry(),
        }
    }
}

// ============= Database Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local database path, or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Environment variable for Turso URL (optional cloud config)
    pub turso_url_env: Option<String>,

    /// Environment variable for Turso auth token
    pub turso_token_env: Option<String>,
}

fn default_database_url() -> String {
    "./data/foodatlas.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            turso_url_env: None,
            turso_token_env: None,
        }
    }
}

// ============= LLM Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default)]
    pub classifier_temperature: f32,

    #[serde(default)]
    pub sql_temperature: f32,

    #[serde(default = "default_answer_temperature")]
    pub answer_temperature: f32,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Link offered to the user when no data answers the question
    #[serde(default = "default_support_url")]
    pub support_url: String,
}

fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_answer_temperature() -> f32 {
    0.3
}

fn default_summary_max_tokens() -> u32 {
    120
}

fn default_request_timeout() -> u64 {
    60
}

fn default_support_url() -> String {
    "https://wa.me/551150265550?text=Ola!%20Preciso%20de%20ajuda%20com%20a%20plataforma!".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_api_key_env(),
            api_base: default_api_base(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            classifier_temperature: 0.0,
            sql_temperature: 0.0,
            answer_temperature: default_answer_temperature(),
            summary_max_tokens: default_summary_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            support_url: default_support_url(),
        }
    }
}

// ============= RAG Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Embedded ares-vector HNSW index
    #[default]
    Local,
    /// Embedding tables in BigQuery, searched with VECTOR_SEARCH
    BigQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub index_backend: IndexBackend,

    #[serde(default = "default_top_k_text")]
    pub top_k_text: usize,

    #[serde(default = "default_top_k_tables")]
    pub top_k_tables: usize,

    /// Neighbouring sentences on each side combined before embedding
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Distance percentile above which a sentence gap becomes a chunk boundary
    #[serde(default = "default_breakpoint_percentile")]
    pub breakpoint_percentile: f64,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_min_sentences")]
    pub min_sentences_for_semantic: usize,

    #[serde(default = "default_cache_capacity")]
    pub embedding_cache_capacity: usize,

    /// Directory for the local vector index. `None` keeps it in memory.
    pub vector_path: Option<String>,
}

fn default_top_k_text() -> usize {
    5
}

fn default_top_k_tables() -> usize {
    1
}

fn default_buffer_size() -> usize {
    1
}

fn default_breakpoint_percentile() -> f64 {
    92.0
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_min_sentences() -> usize {
    3
}

fn default_cache_capacity() -> usize {
    10_000
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_backend: IndexBackend::default(),
            top_k_text: default_top_k_text(),
            top_k_tables: default_top_k_tables(),
            buffer_size: default_buffer_size(),
            breakpoint_percentile: default_breakpoint_percentile(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_sentences_for_semantic: default_min_sentences(),
            embedding_cache_capacity: default_cache_capacity(),
            vector_path: None,
        }
    }
}

// ============= Warehouse Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    /// SQLite file via libsql
    #[default]
    Local,
    BigQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub backend: WarehouseBackend,

    #[serde(default = "default_local_warehouse_url")]
    pub local_url: String,

    pub project_id: Option<String>,

    #[serde(default = "default_dataset")]
    pub dataset: String,

    #[serde(default = "default_location")]
    pub location: String,

    /// Environment variable holding a service-account JSON key
    pub credentials_env: Option<String>,

    /// Environment variable holding a ready OAuth access token
    pub access_token_env: Option<String>,

    #[serde(default = "default_bigquery_api_base")]
    pub api_base: String,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_stock_table")]
    pub stock_table: String,

    #[serde(default = "default_integrated_table")]
    pub integrated_table: String,

    #[serde(default = "default_delivery_table")]
    pub delivery_table: String,

    #[serde(default = "default_text_embeddings_table")]
    pub text_embeddings_table: String,

    #[serde(default = "default_tabular_embeddings_table")]
    pub tabular_embeddings_table: String,
}

fn default_local_warehouse_url() -> String {
    "./data/warehouse.db".to_string()
}

fn default_dataset() -> String {
    "foodatlas_bucket".to_string()
}

fn default_location() -> String {
    "US".to_string()
}

fn default_bigquery_api_base() -> String {
    "https://bigquery.googleapis.com".to_string()
}

fn default_query_timeout() -> u64 {
    60
}

fn default_stock_table() -> String {
    "controle_estoque".to_string()
}

fn default_integrated_table() -> String {
    "relatorio_integrado".to_string()
}

fn default_delivery_table() -> String {
    "relatorio_delivery".to_string()
}

fn default_text_embeddings_table() -> String {
    "embeddings_text".to_string()
}

fn default_tabular_embeddings_table() -> String {
    "embeddings_tabular".to_string()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::default(),
            local_url: default_local_warehouse_url(),
            project_id: None,
            dataset: default_dataset(),
            location: default_location(),
            credentials_env: None,
            access_token_env: None,
            api_base: default_bigquery_api_base(),
            query_timeout_secs: default_query_timeout(),
            stock_table: default_stock_table(),
            integrated_table: default_integrated_table(),
            delivery_table: default_delivery_table(),
            text_embeddings_table: default_text_embeddings_table(),
            tabular_embeddings_table: default_tabular_embeddings_table(),
        }
    }
}

// ============= SQL Execution Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Maximum rows any generated query may return
    #[serde(default = "default_row_cap")]
    pub row_cap: usize,

    /// Rows of a result shown to the answering model
    #[serde(default = "default_prompt_sample_rows")]
    pub prompt_sample_rows: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    30
}

fn default_row_cap() -> usize {
    100
}

fn default_prompt_sample_rows() -> usize {
    10
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            row_cap: default_row_cap(),
            prompt_sample_rows: default_prompt_sample_rows(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl AtlasConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse without validation
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate numeric bounds and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_bounds()?;

        self.validate_env_var(&self.auth.jwt_secret_env)?;
        self.validate_env_var(&self.llm.api_key_env)?;

        if let Some(ref env) = self.database.turso_url_env {
            self.validate_env_var(env)?;
        }
        if let Some(ref env) = self.database.turso_token_env {
            self.validate_env_var(env)?;
        }

        if self.uses_bigquery() {
            if self.warehouse.project_id.is_none() {
                return Err(ConfigError::ValidationError(
                    "warehouse.project_id is required for the bigquery backend".to_string(),
                ));
            }
            match (
                &self.warehouse.credentials_env,
                &self.warehouse.access_token_env,
            ) {
                (Some(env), _) | (None, Some(env)) => self.validate_env_var(env)?,
                (None, None) => {
                    return Err(ConfigError::ValidationError(
                        "bigquery needs warehouse.credentials_env or warehouse.access_token_env"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Checks that need no environment
    pub fn validate_bounds(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;
        if !(rag.breakpoint_percentile > 0.0 && rag.breakpoint_percentile <= 100.0) {
            return Err(ConfigError::ValidationError(format!(
                "rag.breakpoint_percentile must be in (0, 100], got {}",
                rag.breakpoint_percentile
            )));
        }
        if rag.chunk_size == 0 || rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if rag.top_k_text == 0 || rag.top_k_tables == 0 {
            return Err(ConfigError::ValidationError(
                "rag.top_k_text and rag.top_k_tables must be at least 1".to_string(),
            ));
        }
        if self.sql.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "sql.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sql.row_cap == 0 || self.sql.prompt_sample_rows > self.sql.row_cap {
            return Err(ConfigError::ValidationError(format!(
                "sql.prompt_sample_rows ({}) must not exceed sql.row_cap ({})",
                self.sql.prompt_sample_rows, self.sql.row_cap
            )));
        }
        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok()
    }

    /// Get the JWT secret from the environment
    pub fn jwt_secret(&self) -> Result<String, ConfigError> {
        self.resolve_env(&self.auth.jwt_secret_env)
            .ok_or_else(|| ConfigError::MissingEnvVar(self.auth.jwt_secret_env.clone()))
    }

    /// Get the LLM API key from the environment
    pub fn llm_api_key(&self) -> Result<String, ConfigError> {
        self.resolve_env(&self.llm.api_key_env)
            .ok_or_else(|| ConfigError::MissingEnvVar(self.llm.api_key_env.clone()))
    }

    /// Whether any component talks to BigQuery
    pub fn uses_bigquery(&self) -> bool {
        self.warehouse.backend == WarehouseBackend::BigQuery
            || self.rag.index_backend == IndexBackend::BigQuery
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct AtlasConfigManager {
    config: Arc<ArcSwap<AtlasConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl AtlasConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = AtlasConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config, without file watching
    pub fn from_config(config: AtlasConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("foodatlas.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<AtlasConfig> {
        self.config.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = AtlasConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let debounce = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                // Coalesce bursts of events from a single save
                tokio::time::sleep(debounce).await;
                while rx.try_recv().is_ok() {}

                match AtlasConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}
