//! ChainWhale aggregation modules

pub mod stats;
pub mod whale_service;

pub use whale_service::WhaleService;
