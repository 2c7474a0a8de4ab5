use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============= Restaurant Types =============

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Restaurant {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub cnpj: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRestaurantRequest {
    pub name: String,
    pub cnpj: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Full replacement of a restaurant's editable fields. Blank address or phone
/// clears them.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateRestaurantRequest {
    pub name: String,
    pub cnpj: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

// ============= File Types =============

/// Kind of document accepted for ingestion, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Pdf,
    Csv,
}

impl FileKind {
    /// Detect the kind from a file name. Returns `None` for unsupported extensions.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(FileKind::Text),
            "pdf" => Some(FileKind::Pdf),
            "csv" => Some(FileKind::Csv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Text => "text",
            FileKind::Pdf => "pdf",
            FileKind::Csv => "csv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(FileKind::Text),
            "pdf" => Some(FileKind::Pdf),
            "csv" => Some(FileKind::Csv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RestaurantFile {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    pub kind: FileKind,
    pub size_bytes: i64,
    pub chunk_count: i64,
    /// Warehouse table holding the rows of a CSV upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListFilesQuery {
    pub limit: Option<u32>,
}

// ============= Ledger Types =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Cost,
    Revenue,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Cost => "cost",
            LedgerKind::Revenue => "revenue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CostType {
    Fixed,
    Variable,
}

impl CostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostType::Fixed => "FIXED",
            CostType::Variable => "VARIABLE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FIXED" => Some(CostType::Fixed),
            "VARIABLE" => Some(CostType::Variable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntry {
    pub id: String,
    pub restaurant_id: String,
    pub kind: LedgerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_type: Option<CostType>,
    pub amount: f64,
    pub description: String,
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
    pub created_at: DateTime<Utc>,
}

/// All fields are optional at the wire level so missing ones surface as 400,
/// not as a deserialization rejection.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateCostRequest {
    pub amount: Option<f64>,
    pub cost_type: Option<CostType>,
    pub description: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateRevenueRequest {
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DateRangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

// ============= Analytics Types =============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BreakEvenFigures {
    pub fixed_costs: f64,
    pub variable_costs: f64,
    pub revenue: f64,
    pub break_even_point: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BreakEvenResponse {
    pub current_month: BreakEvenFigures,
    pub last_month: BreakEvenFigures,
    pub projection: BreakEvenFigures,
    pub growth_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyBreakEven {
    /// `YYYY-MM`
    pub month: String,
    pub total_revenue: f64,
    pub variable_costs: f64,
    pub fixed_costs: f64,
    pub contribution_margin_ratio: Option<f64>,
    pub break_even_revenue: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MonthlyBreakEvenQuery {
    pub months: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AvgTicketResponse {
    pub avg_ticket: f64,
    pub percentage: i64,
    pub currency: String,
    pub period: String,
    pub compared_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClientCountResponse {
    pub total: u64,
    pub percentage: i64,
    pub period: String,
    pub compared_to: String,
}

// ============= Chat Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub question: String,
}

/// Routing decision for a chat question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Answerable from document excerpts
    Text,
    /// Needs computation over tabular data
    Numeric,
    /// Both branches
    Mixed,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Text => "text",
            Intent::Numeric => "numeric",
            Intent::Mixed => "mixed",
        }
    }

    pub fn needs_text(&self) -> bool {
        matches!(self, Intent::Text | Intent::Mixed)
    }

    pub fn needs_numeric(&self) -> bool {
        matches!(self, Intent::Numeric | Intent::Mixed)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============= Authentication Types =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Tenant (user) id
    pub sub: String,
    /// Tokens from an external identity provider may omit it
    #[serde(default)]
    pub email: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, message) = match self {
            AppError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::LLM(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Warehouse(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Configuration(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(%status, "{}", message);
        }

        let body = serde_json::json!({
            "error": message
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
