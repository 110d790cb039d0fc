use serde::{Deserialize, Serialize};

use crate::models::{
    AccountId, ConversationKind, CredentialGroupId, CredentialMaterial, CredentialSet, ProfileMap,
};

// -- Directory --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListConversationsRequest {
    pub account: AccountId,
    /// Groups the client already holds material for, so the node can skip them.
    pub known_groups: Vec<CredentialGroupId>,
}

/// One conversation the account participates in. Carries no message bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub kind: ConversationKind,
    pub counterpart: AccountId,
    pub counterpart_group: String,
    pub self_group: String,
    #[serde(default)]
    pub newest_timestamp_nanos: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub owner: AccountId,
    pub group_name: String,
    pub material: CredentialMaterial,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationDirectory {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
    /// Profiles bundled with the listing, keyed by account id.
    #[serde(default)]
    pub profiles: ProfileMap,
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

impl ConversationDirectory {
    pub fn credential_set(&self) -> CredentialSet {
        self.credentials
            .iter()
            .map(|entry| {
                (
                    CredentialGroupId::new(entry.owner.clone(), entry.group_name.clone()),
                    entry.material.clone(),
                )
            })
            .collect()
    }
}

// -- Threads --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectThreadRequest {
    pub account: AccountId,
    pub account_group: String,
    pub peer: AccountId,
    pub peer_group: String,
    pub max_count: u32,
    pub start_timestamp_nanos: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupThreadRequest {
    pub owner: AccountId,
    pub group_name: String,
    pub start_timestamp_nanos: u64,
    pub max_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupMembersRequest {
    pub owner: AccountId,
    pub group_name: String,
    pub max_count: u32,
}

/// A message as stored on the network. The network only ever sees ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub sender: AccountId,
    pub sender_group: String,
    pub recipient: AccountId,
    pub recipient_group: String,
    pub timestamp_nanos: u64,
    /// Credential group whose material sealed this message.
    pub credential: CredentialGroupId,
    /// Base64 ciphertext.
    pub ciphertext: String,
    /// Base64 nonce.
    pub nonce: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadResponse {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

// -- Sending --

/// Plaintext message handed to the cipher for sealing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub plaintext: String,
    pub sender: AccountId,
    pub sender_group: String,
    pub recipient: AccountId,
    pub recipient_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
    pub sender: AccountId,
    pub sender_group: String,
    pub recipient: AccountId,
    pub recipient_group: String,
    pub credential: CredentialGroupId,
    pub ciphertext: String,
    pub nonce: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAck {
    /// Timestamp the network assigned, when it reports one.
    #[serde(default)]
    pub timestamp_nanos: Option<u64>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

// -- Profiles --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupProfilesRequest {
    pub accounts: Vec<AccountId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilesResponse {
    #[serde(default)]
    pub profiles: ProfileMap,
}
