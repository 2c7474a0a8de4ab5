#![allow(dead_code)]

pub mod mocks;

use foodatlas::auth::jwt::AuthService;
use foodatlas::db::LocalIndex;
use foodatlas::warehouse::LocalWarehouse;
use foodatlas::{AppState, AtlasConfig, AtlasConfigManager, TursoClient};
use mocks::{MockEmbedder, MockLLMClient, MockLLMFactory};
use std::sync::Arc;

pub const TEST_SECRET: &str = "test-secret-that-is-at-least-32-characters";

/// In-memory stores, mock LLM and embedder.
pub async fn test_state(llm: MockLLMClient) -> AppState {
    test_state_with(llm, AtlasConfig::default()).await
}

pub async fn test_state_with(llm: MockLLMClient, config: AtlasConfig) -> AppState {
    let expiry = config.auth.jwt_access_expiry;
    AppState {
        config_manager: Arc::new(AtlasConfigManager::from_config(config)),
        turso: Arc::new(TursoClient::new_memory().await.expect("memory db")),
        llm_factory: Arc::new(MockLLMFactory::new(llm)),
        embedder: Arc::new(MockEmbedder::new()),
        index: Arc::new(LocalIndex::new(None).await.expect("memory index")),
        warehouse: Arc::new(LocalWarehouse::new_memory().await.expect("memory warehouse")),
        auth_service: Arc::new(AuthService::new(TEST_SECRET.to_string(), expiry)),
    }
}

/// A JWT for `user`.
pub fn token(state: &AppState, user: &str) -> String {
    state
        .auth_service
        .generate_token(user, &format!("{}@example.com", user))
        .expect("token")
}
