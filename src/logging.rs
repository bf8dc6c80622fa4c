//! Environment-aware structured logging for the data-access core.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize tracing output. Safe to call more than once; only the first
/// call installs a subscriber. `LEDGER_LOG_FORMAT=json` switches to JSON
/// lines for log shippers, anything else keeps the human-readable format.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment =
            std::env::var("LEDGER_ENV").unwrap_or_else(|_| "development".to_string());
        let default_level = match environment.as_str() {
            "production" => "info",
            "test" => "warn",
            _ => "debug",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let json = std::env::var("LEDGER_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_target(true).with_filter(filter))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_filter(filter))
                .try_init()
        };

        // A subscriber installed by the host application wins.
        if result.is_err() {
            tracing::debug!("tracing subscriber already installed, keeping it");
        }
    });
}
