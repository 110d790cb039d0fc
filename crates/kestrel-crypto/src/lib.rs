//! Credential-group encryption for Kestrel.
//!
//! Every holder of a credential group shares one AES-256-GCM key, delivered
//! to the client as base64 material alongside the conversation directory.
//! The sync engine reaches these functions through its `MessageCipher`
//! seam only.

pub mod encrypt;
pub mod keys;
