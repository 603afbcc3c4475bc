//! HTTP API over the whale feeds

pub mod server;

pub use server::ApiServer;
