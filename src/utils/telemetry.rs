//! Logging setup
//!
//! `RUST_LOG` wins over `server.log_level` when set.

use crate::utils::toml_config::{LogFormat, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Build the filter used by the global subscriber.
pub fn env_filter(level: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { level };
        EnvFilter::new(format!(
            "foodatlas={level},foodatlas_server={level},tower_http={level},info"
        ))
    })
}

/// Install the global tracing subscriber.
///
/// Returns `false` when a subscriber was already installed (tests, embedding).
pub fn init(server: &ServerConfig, verbose: bool) -> bool {
    let filter = env_filter(&server.log_level, verbose);

    let fmt_layer = match server.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let server = ServerConfig {
            log_format: LogFormat::Json,
            ..ServerConfig::default()
        };
        let _ = init(&server, false);
        assert!(!init(&server, true));
    }
}
