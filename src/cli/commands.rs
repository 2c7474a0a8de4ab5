//! `token`, `config` and `import` subcommands

use super::{output::Output, DashboardTable};
use crate::analytics::DashboardTables;
use crate::auth::jwt::AuthService;
use crate::rag::extract::parse_csv;
use crate::types::{AppError, Result};
use crate::utils::toml_config::{AtlasConfig, ConfigError};
use crate::warehouse::Warehouse;
use std::path::Path;

/// Read a config file without checking its environment variables.
pub fn load_unvalidated(path: &Path) -> std::result::Result<AtlasConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    AtlasConfig::parse(&std::fs::read_to_string(path)?)
}

/// Sign a JWT with the configured secret.
pub fn mint_token(config: &AtlasConfig, user: &str, email: &str, ttl: Option<i64>) -> Result<String> {
    if user.trim().is_empty() {
        return Err(AppError::InvalidInput("--user must not be blank".to_string()));
    }
    let secret = config
        .jwt_secret()
        .map_err(|e| AppError::Configuration(e.to_string()))?;
    let auth = AuthService::new(secret, config.auth.jwt_access_expiry);
    let ttl = ttl.unwrap_or(config.auth.jwt_access_expiry);
    if ttl <= 0 {
        return Err(AppError::InvalidInput("--ttl must be positive".to_string()));
    }
    auth.generate_token_with_ttl(user, email, ttl)
}

/// Print the effective configuration. Secrets are shown by env var name only.
pub fn show_config(config: &AtlasConfig, path: &Path, output: &Output) {
    output.header("FoodAtlas Configuration");
    output.kv("file", &path.display().to_string());

    output.subheader("Server");
    output.kv("address", &format!("{}:{}", config.server.host, config.server.port));
    output.kv("log", &format!("{} ({:?})", config.server.log_level, config.server.log_format));
    output.kv("max upload", &format!("{} bytes", config.server.max_upload_bytes));

    output.subheader("Stores");
    output.kv("database", &config.database.url);
    output.kv("warehouse", &format!("{:?}", config.warehouse.backend));
    output.kv("index", &format!("{:?}", config.rag.index_backend));
    output.kv(
        "dashboard tables",
        &DashboardTables::from_config(&config.warehouse).all().join(", "),
    );

    output.subheader("LLM");
    output.kv("api base", &config.llm.api_base);
    output.kv("chat model", &config.llm.chat_model);
    output.kv("embedding model", &config.llm.embedding_model);
    output.kv("api key env", &config.llm.api_key_env);

    output.subheader("Generated SQL");
    output.kv("max attempts", &config.sql.max_attempts.to_string());
    output.kv("attempt timeout", &format!("{}s", config.sql.attempt_timeout_secs));
    output.kv("row cap", &config.sql.row_cap.to_string());
}

/// Append a CSV report to one of the shared dashboard tables.
pub async fn import_csv(
    warehouse: &dyn Warehouse,
    tables: &DashboardTables,
    table: DashboardTable,
    restaurant_id: &str,
    bytes: &[u8],
) -> Result<usize> {
    if restaurant_id.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "--restaurant must not be blank".to_string(),
        ));
    }
    let name = match table {
        DashboardTable::Stock => &tables.stock,
        DashboardTable::Integrated => &tables.integrated,
        DashboardTable::Delivery => &tables.delivery,
    };

    let csv = parse_csv(bytes)?;
    let loaded = warehouse
        .load_csv(name, restaurant_id, &csv.headers, &csv.rows)
        .await?;

    tracing::info!(restaurant_id, table = %name, rows = loaded, "dashboard report imported");
    Ok(loaded)
}
