use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Identities --

/// Opaque identifier of a network participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// -- Credentials --

/// A named key-set owned by one account. Messages sealed under a group can
/// only be opened by holders of that group's material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialGroupId {
    pub owner: AccountId,
    pub name: String,
}

impl CredentialGroupId {
    pub fn new(owner: impl Into<AccountId>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CredentialGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Encoded key material for one credential group. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialMaterial(String);

impl CredentialMaterial {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialMaterial(..)")
    }
}

/// Every credential the session currently knows, keyed by group.
pub type CredentialSet = HashMap<CredentialGroupId, CredentialMaterial>;

// -- Profiles --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub account: AccountId,
    pub username: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub type ProfileMap = HashMap<AccountId, Profile>;

// -- Conversations --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationKind {
    DirectMessage,
    GroupChat,
}

/// Sole lookup key into the conversation mirror.
///
/// Direct messages are keyed by the peer's account id, group chats by the
/// owner id immediately followed by the group name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn direct(peer: &AccountId) -> Self {
        Self(peer.as_str().to_string())
    }

    pub fn group(owner: &AccountId, group_name: &str) -> Self {
        Self(format!("{}{}", owner, group_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery state of a locally synthesized entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingState {
    /// Submitted, no answer from the network yet.
    InFlight,
    /// Acknowledged by the network, confirmed copy not observed yet.
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pending {
    pub local_id: Uuid,
    pub state: PendingState,
}

/// One decrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub sender: AccountId,
    pub sender_group: String,
    pub recipient: AccountId,
    pub recipient_group: String,
    /// Ordering key and deduplication identity within a conversation.
    pub timestamp_nanos: u64,
    pub body: String,
    pub is_sender: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<Pending>,
}

impl MessageEntry {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn local_id(&self) -> Option<Uuid> {
        self.pending.map(|p| p.local_id)
    }
}

/// A conversation's resident state. `messages` is newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub kind: ConversationKind,
    /// The DM peer, or the group owner.
    pub counterpart: AccountId,
    /// The peer's credential group for DMs, the group name for group chats.
    pub counterpart_group: String,
    /// Our own credential group used in this conversation.
    pub self_group: String,
    /// Newest activity the directory reported, for ordering conversations
    /// whose messages are not resident yet.
    #[serde(default)]
    pub last_activity_nanos: Option<u64>,
    pub messages: Vec<MessageEntry>,
}

impl Conversation {
    pub fn empty(
        kind: ConversationKind,
        counterpart: AccountId,
        counterpart_group: impl Into<String>,
        self_group: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            counterpart,
            counterpart_group: counterpart_group.into(),
            self_group: self_group.into(),
            last_activity_nanos: None,
            messages: Vec::new(),
        }
    }

    pub fn key(&self) -> ConversationKey {
        match self.kind {
            ConversationKind::DirectMessage => ConversationKey::direct(&self.counterpart),
            ConversationKind::GroupChat => {
                ConversationKey::group(&self.counterpart, &self.counterpart_group)
            }
        }
    }

    pub fn newest_timestamp(&self) -> Option<u64> {
        self.messages.first().map(|m| m.timestamp_nanos)
    }

    /// Newest resident message, else the directory's activity timestamp.
    pub fn activity_timestamp(&self) -> Option<u64> {
        self.newest_timestamp().or(self.last_activity_nanos)
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConversationKind::GroupChat
    }
}
