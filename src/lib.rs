//! # FoodAtlas Server
//!
//! Multi-tenant restaurant analytics with a natural-language "ask your data"
//! chat. Owners upload documents and spreadsheets per restaurant; the chat
//! routes each question to document retrieval, generated SQL over the
//! warehouse, or both, and streams the answer.
//!
//! ## Overview
//!
//! FoodAtlas can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `foodatlas-server` binary
//! 2. **As a library** - Build an [`AppState`] and mount [`api::routes::create_router`]
//!
//! ### Configuration-Driven Setup
//!
//! ```rust,ignore
//! use foodatlas::{AppState, AtlasConfigManager};
//! use std::sync::Arc;
//!
//! let config_manager = Arc::new(AtlasConfigManager::new("foodatlas.toml")?);
//! let state = AppState::from_config(config_manager).await?;
//! let app = foodatlas::api::routes::create_router(state);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | OpenAI-compatible chat and embeddings (default) |
//! | `local-db` | Local SQLite database (default) |
//! | `turso` | Remote Turso database |
//! | `swagger-ui` | Interactive API documentation |
//!
//! ## Modules
//!
//! - [`agents`] - Intent routing, text-to-SQL and the SQL repair loop
//! - [`analytics`] - Break-even and dashboard widgets
//! - [`api`] - REST API handlers and routes
//! - [`auth`] - JWT verification and middleware
//! - [`db`] - Relational store and document index
//! - [`llm`] - LLM and embedding clients
//! - [`rag`] - Extraction, chunking and ingestion
//! - [`warehouse`] - SQL warehouse backends (SQLite, BigQuery)
//! - [`workflows`] - The chat workflow
//! - [`types`] - Common types and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// LLM agents of the chat pipeline.
pub mod agents;
/// Dashboard analytics.
pub mod analytics;
/// HTTP API handlers and routes.
pub mod api;
/// JWT authentication and middleware.
pub mod auth;
/// Command-line interface.
pub mod cli;
/// Relational store and document index.
pub mod db;
/// LLM provider clients and abstractions.
pub mod llm;
/// Retrieval Augmented Generation (RAG) components.
pub mod rag;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration, logging and text utilities.
pub mod utils;
/// SQL warehouse backends.
pub mod warehouse;
/// The chat workflow.
pub mod workflows;

// Re-export commonly used types
pub use db::{DocumentIndex, TursoClient};
pub use llm::{Embedder, LLMClient, LLMClientFactory, LLMClientFactoryTrait, Provider};
pub use types::{AppError, Result};
pub use utils::toml_config::{AtlasConfig, AtlasConfigManager};
pub use warehouse::Warehouse;
pub use workflows::ChatWorkflow;

use crate::analytics::DashboardTables;
use crate::auth::jwt::AuthService;
use crate::db::LocalIndex;
use crate::rag::{CachedEmbedder, IngestService};
use crate::utils::toml_config::{IndexBackend, WarehouseBackend};
use crate::warehouse::{
    gcp_auth::ServiceAccountKey, BigQueryIndex, BigQuerySettings, BigQueryWarehouse, GoogleAuth,
    LocalWarehouse,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML configuration with hot-reload support
    pub config_manager: Arc<AtlasConfigManager>,
    /// Restaurants, file records, ledger and chat log
    pub turso: Arc<TursoClient>,
    /// LLM client factory
    pub llm_factory: Arc<dyn LLMClientFactoryTrait>,
    /// Cached embedder
    pub embedder: Arc<dyn Embedder>,
    /// Restaurant-scoped vector index
    pub index: Arc<dyn DocumentIndex>,
    /// Tabular warehouse
    pub warehouse: Arc<dyn Warehouse>,
    /// Authentication service
    pub auth_service: Arc<AuthService>,
}

fn config_error(e: utils::toml_config::ConfigError) -> AppError {
    AppError::Configuration(e.to_string())
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    if path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::Configuration(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    Ok(())
}

impl AppState {
    /// Build every service from the current configuration.
    pub async fn from_config(config_manager: Arc<AtlasConfigManager>) -> Result<Self> {
        let config = config_manager.config();

        let turso = Arc::new(Self::connect_database(&config).await?);

        let auth_service = Arc::new(AuthService::new(
            config.jwt_secret().map_err(config_error)?,
            config.auth.jwt_access_expiry,
        ));

        let api_key = config.llm_api_key().map_err(config_error)?;
        let llm_factory: Arc<dyn LLMClientFactoryTrait> =
            Arc::new(LLMClientFactory::new(Provider::chat_from_config(
                &config.llm,
                api_key.clone(),
            )));

        let embedder = Self::build_embedder(&config, api_key)?;

        let bigquery = if config.uses_bigquery() {
            Some(Arc::new(Self::connect_bigquery(&config)?))
        } else {
            None
        };

        let warehouse: Arc<dyn Warehouse> = match (&config.warehouse.backend, &bigquery) {
            (WarehouseBackend::BigQuery, Some(bq)) => bq.clone(),
            _ => {
                ensure_parent_dir(&config.warehouse.local_url)?;
                Arc::new(LocalWarehouse::new_local(&config.warehouse.local_url).await?)
            }
        };

        let index: Arc<dyn DocumentIndex> = match (&config.rag.index_backend, &bigquery) {
            (IndexBackend::BigQuery, Some(bq)) => Arc::new(BigQueryIndex::new(
                bq.clone(),
                config.warehouse.text_embeddings_table.clone(),
                config.warehouse.tabular_embeddings_table.clone(),
            )),
            _ => Arc::new(LocalIndex::new(config.rag.vector_path.clone()).await?),
        };

        tracing::info!(
            warehouse = ?config.warehouse.backend,
            index = index.provider_name(),
            model = %config.llm.chat_model,
            "services initialised"
        );

        Ok(Self {
            config_manager,
            turso,
            llm_factory,
            embedder,
            index,
            warehouse,
            auth_service,
        })
    }

    async fn connect_database(config: &AtlasConfig) -> Result<TursoClient> {
        let remote = config
            .database
            .turso_url_env
            .as_deref()
            .and_then(|env| config.resolve_env(env))
            .zip(
                config
                    .database
                    .turso_token_env
                    .as_deref()
                    .and_then(|env| config.resolve_env(env)),
            );

        match remote {
            Some((url, token)) => TursoClient::new_remote(url, token).await,
            None if config.database.url == ":memory:" => TursoClient::new_memory().await,
            None => {
                ensure_parent_dir(&config.database.url)?;
                TursoClient::new_local(&config.database.url).await
            }
        }
    }

    #[cfg(feature = "openai")]
    fn build_embedder(config: &AtlasConfig, api_key: String) -> Result<Arc<dyn Embedder>> {
        let embedder = crate::llm::OpenAIEmbedder::new(
            api_key,
            config.llm.api_base.clone(),
            config.llm.embedding_model.clone(),
            Duration::from_secs(config.llm.request_timeout_secs),
        )?;
        Ok(Arc::new(CachedEmbedder::new(
            embedder,
            config.rag.embedding_cache_capacity,
        )))
    }

    #[cfg(not(feature = "openai"))]
    fn build_embedder(_config: &AtlasConfig, _api_key: String) -> Result<Arc<dyn Embedder>> {
        Err(AppError::Configuration(
            "Embeddings require the 'openai' feature".to_string(),
        ))
    }

    fn connect_bigquery(config: &AtlasConfig) -> Result<BigQueryWarehouse> {
        let warehouse = &config.warehouse;
        let project_id = warehouse.project_id.clone().ok_or_else(|| {
            AppError::Configuration("warehouse.project_id is required for BigQuery".to_string())
        })?;
        let timeout = Duration::from_secs(warehouse.query_timeout_secs);

        let static_token = warehouse
            .access_token_env
            .as_deref()
            .and_then(|env| config.resolve_env(env));
        let auth = match static_token {
            Some(token) => GoogleAuth::from_static_token(token),
            None => {
                let env = warehouse.credentials_env.as_deref().ok_or_else(|| {
                    AppError::Configuration(
                        "BigQuery needs warehouse.credentials_env or warehouse.access_token_env"
                            .to_string(),
                    )
                })?;
                let json = config.resolve_env(env).ok_or_else(|| {
                    AppError::Configuration(format!("Environment variable '{}' is not set", env))
                })?;
                GoogleAuth::from_service_account(ServiceAccountKey::from_json(&json)?, timeout)?
            }
        };

        BigQueryWarehouse::new(
            BigQuerySettings {
                api_base: warehouse.api_base.clone(),
                project_id,
                dataset: warehouse.dataset.clone(),
                location: warehouse.location.clone(),
                query_timeout: timeout,
            },
            Arc::new(auth),
        )
    }

    /// Only the warehouse, for commands that need no other service.
    pub async fn connect_warehouse(config: &AtlasConfig) -> Result<Arc<dyn Warehouse>> {
        match config.warehouse.backend {
            WarehouseBackend::BigQuery => Ok(Arc::new(Self::connect_bigquery(config)?)),
            WarehouseBackend::Local => {
                ensure_parent_dir(&config.warehouse.local_url)?;
                Ok(Arc::new(
                    LocalWarehouse::new_local(&config.warehouse.local_url).await?,
                ))
            }
        }
    }

    /// A chat client for the configured model.
    pub async fn llm(&self) -> Result<Arc<dyn LLMClient>> {
        Ok(Arc::from(self.llm_factory.create_default().await?))
    }

    pub fn dashboard_tables(&self) -> DashboardTables {
        DashboardTables::from_config(&self.config_manager.config().warehouse)
    }

    /// Ingestion and deletion pipeline over this state's stores.
    pub async fn ingest_service(&self) -> Result<IngestService> {
        let config = self.config_manager.config();
        IngestService::new(
            self.turso.clone(),
            self.index.clone(),
            self.embedder.clone(),
            self.warehouse.clone(),
            self.llm().await?,
            &config.rag,
            config.llm.summary_max_tokens,
        )
    }

    /// Chat workflow bound to the current configuration.
    pub async fn chat_workflow(&self) -> Result<ChatWorkflow> {
        let config = self.config_manager.config();
        Ok(ChatWorkflow::new(
            self.llm().await?,
            self.embedder.clone(),
            self.index.clone(),
            self.warehouse.clone(),
            self.turso.clone(),
            &config,
        ))
    }
}
