/// Tracing subscriber setup.
pub mod telemetry;
/// TOML configuration with hot reload.
pub mod toml_config;
/// Small text helpers.
pub mod text;
