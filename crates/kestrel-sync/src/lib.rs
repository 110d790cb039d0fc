//! Client-side conversation sync for Kestrel.
//!
//! Keeps an in-memory mirror of the account's conversations, polls the
//! network for the selected conversation, decrypts what it fetches and
//! overlays optimistic outgoing messages until the network confirms them.

pub mod cipher;
pub mod config;
pub mod credentials;
pub mod decrypt;
pub mod directory;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod merge;
pub mod mirror;
pub mod network;
pub mod profiles;
pub mod send;
pub mod session;
pub mod synchronizer;
pub mod time;

pub use config::{DeviceClass, SyncConfig};
pub use engine::{Engine, LoadOutcome};
pub use error::{Result, SyncError};
pub use synchronizer::{SkipReason, TickOutcome};
