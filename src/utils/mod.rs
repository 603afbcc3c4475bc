//! Utility modules

pub mod convert;
pub mod logger;
pub mod metrics;
pub mod time;

pub use logger::init_logger;
pub use metrics::MetricsService;
