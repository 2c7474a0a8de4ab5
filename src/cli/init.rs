//! Init command implementation
//!
//! Scaffolds a new FoodAtlas project: `foodatlas.toml`, `.env.example`,
//! `.gitignore` and the `data/` directory.

use super::{output::Output, WarehouseChoice};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of the init operation
#[derive(Debug)]
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// Project already exists (foodatlas.toml found)
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: PathBuf,
    /// Overwrite existing files
    pub force: bool,
    /// Warehouse backend to configure
    pub warehouse: WarehouseChoice,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing FoodAtlas Project");

    let base_path = &config.path;

    let config_path = base_path.join("foodatlas.toml");
    if config_path.exists() && !config.force {
        output.warning("foodatlas.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    output.subheader("Creating directories");

    let data_dir = base_path.join("data");
    if data_dir.exists() {
        output.skipped("data", "already exists");
    } else {
        if let Err(e) = fs::create_dir_all(&data_dir) {
            output.error(&format!("Failed to create data: {}", e));
            return InitResult::Error(e.to_string());
        }
        output.created_dir("data");
    }

    output.subheader("Creating configuration files");

    let files = [
        ("config", "foodatlas.toml", generate_foodatlas_toml(config.warehouse)),
        ("env", ".env.example", generate_env_example(config.warehouse)),
    ];
    for (file_type, name, content) in &files {
        if let Err(e) = write_file(&base_path.join(name), content, config.force) {
            output.error(&format!("Failed to create {}: {}", name, e));
            return InitResult::Error(e.to_string());
        }
        output.created(file_type, name);
    }

    let gitignore_path = base_path.join(".gitignore");
    if !gitignore_path.exists() {
        if let Err(e) = write_file(&gitignore_path, GITIGNORE, false) {
            output.warning(&format!("Failed to create .gitignore: {}", e));
        } else {
            output.created("file", ".gitignore");
        }
    }

    output.complete("FoodAtlas project initialized successfully!");

    output.header("Next Steps");
    output.newline();
    output.info("1. Set up environment variables:");
    output.command("cp .env.example .env");
    output.command("# Edit .env and set JWT_SECRET (min 32 chars) and OPENAI_API_KEY");
    output.newline();

    if config.warehouse == WarehouseChoice::Bigquery {
        output.info("2. Point foodatlas.toml at your GCP project:");
        output.command("# [warehouse] project_id = \"your-project\"");
        output.newline();
    } else {
        output.info("2. Load dashboard reports (optional):");
        output.command("foodatlas-server import --restaurant <id> --table integrated relatorio.csv");
        output.newline();
    }

    output.info("3. Start the server and mint a token:");
    output.command("foodatlas-server");
    output.command("foodatlas-server token --user <tenant-id>");
    output.newline();

    output.hint("API docs at /api/openapi.json, or /swagger-ui/ with the 'swagger-ui' feature");

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(());
    }
    fs::write(path, content)
}

fn generate_foodatlas_toml(warehouse: WarehouseChoice) -> String {
    let (backend_section, index_backend) = match warehouse {
        WarehouseChoice::Local => (
            r#"backend = "local"
local_url = "./data/warehouse.db"
"#,
            "local",
        ),
        WarehouseChoice::Bigquery => (
            r#"backend = "bigquery"
project_id = "your-gcp-project"
dataset = "foodatlas_bucket"
location = "US"
# Service account JSON (preferred) or a short-lived access token
credentials_env = "GOOGLE_CREDENTIALS_JSON"
# access_token_env = "BQ_ACCESS_TOKEN"
query_timeout_secs = 30
"#,
            "bigquery",
        ),
    };

    format!(
        r#"# FoodAtlas Configuration
# =======================
# Generated by: foodatlas-server init
#
# REQUIRED: Set these environment variables before starting:
#   - JWT_SECRET: secret used to verify JWTs (min 32 characters)
#   - OPENAI_API_KEY: key for the OpenAI-compatible chat and embeddings API
#
# Hot Reloading: changes to this file are detected and applied without
# restarting the server. A file that fails to load is ignored.

# =============================================================================
# Server
# =============================================================================
[server]
host = "127.0.0.1"
port = 3000
log_level = "info"
log_format = "pretty"
cors_origins = []
max_upload_bytes = 26214400

# =============================================================================
# Authentication
# =============================================================================
[auth]
jwt_secret_env = "JWT_SECRET"
jwt_access_expiry = 3600

# =============================================================================
# Relational store
# =============================================================================
[database]
url = "./data/foodatlas.db"
# turso_url_env = "TURSO_URL"
# turso_token_env = "TURSO_AUTH_TOKEN"

# =============================================================================
# LLM
# =============================================================================
[llm]
api_key_env = "OPENAI_API_KEY"
api_base = "https://api.openai.com/v1"
chat_model = "gpt-4o-mini"
embedding_model = "text-embedding-ada-002"
classifier_temperature = 0.0
sql_temperature = 0.0
answer_temperature = 0.3
summary_max_tokens = 120
request_timeout_secs = 60

# =============================================================================
# Retrieval
# =============================================================================
[rag]
index_backend = "{index_backend}"
top_k_text = 5
top_k_tables = 1
breakpoint_percentile = 92.0
chunk_size = 1000
chunk_overlap = 200
embedding_cache_capacity = 10000
vector_path = "./data/vectors"

# =============================================================================
# Warehouse
# =============================================================================
[warehouse]
{backend_section}stock_table = "controle_estoque"
integrated_table = "relatorio_integrado"
delivery_table = "relatorio_delivery"

# =============================================================================
# Generated SQL
# =============================================================================
[sql]
max_attempts = 3
attempt_timeout_secs = 30
row_cap = 100
prompt_sample_rows = 10
"#
    )
}

fn generate_env_example(warehouse: WarehouseChoice) -> String {
    let mut content = String::from(
        r#"# FoodAtlas Environment Variables
# ===============================
# Copy this file to .env and fill in the values.

# REQUIRED: JWT secret (minimum 32 characters)
# Generate with: openssl rand -base64 32
JWT_SECRET=change-me-in-production-use-at-least-32-characters

# REQUIRED: OpenAI (or compatible) API key
OPENAI_API_KEY=sk-...

# Optional: Logging level (trace, debug, info, warn, error)
RUST_LOG=info,foodatlas=debug

# Optional: Turso cloud database
# TURSO_URL=libsql://your-db.turso.io
# TURSO_AUTH_TOKEN=your-token
"#,
    );
    if warehouse == WarehouseChoice::Bigquery {
        content.push_str(
            r#"
# REQUIRED for BigQuery: service account key as a single-line JSON document
GOOGLE_CREDENTIALS_JSON={"type":"service_account","client_email":"...","private_key":"...","token_uri":"https://oauth2.googleapis.com/token"}
"#,
        );
    }
    content
}

const GITIGNORE: &str = r#"# FoodAtlas Generated Files
/data/
*.db
*.db-journal

# Environment
.env
.env.local

# Rust
/target/

# OS
.DS_Store
"#;
