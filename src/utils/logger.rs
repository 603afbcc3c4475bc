//! Logging setup for ChainWhale

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing logger.
///
/// `LOG_FORMAT=json` switches to structured JSON lines.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chainwhale=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[macro_export]
macro_rules! log_whale {
    ($($arg:tt)*) => {
        tracing::info!(target: "WHALE", "🐋 {}", format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_fallback {
    ($($arg:tt)*) => {
        tracing::warn!(target: "HYBRID", "↪️ {}", format!($($arg)*))
    };
}
