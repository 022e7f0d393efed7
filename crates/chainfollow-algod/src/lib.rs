//! chainfollow-algod: HTTP [`NodeClient`](chainfollow_core::NodeClient) for algod's v1 API.

pub mod client;
pub mod config;

pub use client::AlgodClient;
pub use config::{AlgodAuth, AlgodConfig};
