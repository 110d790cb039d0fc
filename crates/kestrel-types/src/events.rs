use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountId, ConversationKey};

/// Severity of a transient, user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Events published by the sync engine for whatever renders the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SyncEvent {
    /// An account logged in, switched, or logged out (`None`).
    SessionChanged { account: Option<AccountId> },

    /// The conversation directory was reloaded
    DirectoryRefreshed { conversations: usize, added: usize },

    /// A conversation's first window finished loading after a switch
    ConversationLoaded { key: ConversationKey, messages: usize },

    /// A background tick merged new confirmed entries
    MessagesMerged { key: ConversationKey, added: usize },

    /// A provisional entry was acknowledged by the network
    SendCommitted { key: ConversationKey, local_id: Uuid },

    /// A provisional entry was removed after a failed send
    SendRolledBack {
        key: ConversationKey,
        local_id: Uuid,
        error: String,
    },

    /// Toast-style notice. Never blocks anything.
    Notice { level: NoticeLevel, message: String },
}

impl SyncEvent {
    /// Returns the conversation this event is scoped to, if any.
    pub fn conversation_key(&self) -> Option<&ConversationKey> {
        match self {
            Self::ConversationLoaded { key, .. }
            | Self::MessagesMerged { key, .. }
            | Self::SendCommitted { key, .. }
            | Self::SendRolledBack { key, .. } => Some(key),
            _ => None,
        }
    }
}
