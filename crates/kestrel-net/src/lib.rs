//! JSON/HTTP implementation of the sync engine's network contract.

pub mod client;
pub mod config;
pub mod error;
pub mod urls;

pub use client::HttpNetwork;
pub use config::NodeClientConfig;
pub use error::ClientError;
