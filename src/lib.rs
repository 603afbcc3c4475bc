//! ChainWhale - multi-chain whale transfer aggregation over Blockscout
//!
//! Transfers are read from the Blockscout MCP server when it is reachable
//! and from the per-chain Blockscout REST API otherwise, then filtered by
//! USD value, deduplicated and ranked across chains.

pub mod api;
pub mod chains;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod modules;
pub mod utils;
