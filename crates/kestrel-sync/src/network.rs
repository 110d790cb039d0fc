use async_trait::async_trait;
use kestrel_types::api::{ConversationDirectory, RawMessage, SealedMessage, SendAck};
use kestrel_types::models::{AccountId, CredentialGroupId, ProfileMap};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("response too large")]
    ResponseTooLarge,
}

/// Read/write contract of the remote network. Every call may fail with a
/// transport error; none of them is fatal to the session.
#[async_trait]
pub trait Network: Send + Sync {
    /// Every conversation the account participates in, profiles bundled
    /// with the listing and the account's credential list.
    async fn list_conversations(
        &self,
        account: &AccountId,
        known_groups: &[CredentialGroupId],
    ) -> Result<ConversationDirectory, NetworkError>;

    async fn fetch_direct_thread(
        &self,
        account: &AccountId,
        account_group: &str,
        peer: &AccountId,
        peer_group: &str,
        max_count: u32,
        start_timestamp_nanos: u64,
    ) -> Result<Vec<RawMessage>, NetworkError>;

    async fn fetch_group_thread(
        &self,
        owner: &AccountId,
        group_name: &str,
        start_timestamp_nanos: u64,
        max_count: u32,
    ) -> Result<Vec<RawMessage>, NetworkError>;

    async fn fetch_group_members(
        &self,
        owner: &AccountId,
        group_name: &str,
        max_count: u32,
    ) -> Result<ProfileMap, NetworkError>;

    async fn send_encrypted_message(&self, message: &SealedMessage)
    -> Result<SendAck, NetworkError>;

    async fn lookup_profiles(&self, accounts: &[AccountId]) -> Result<ProfileMap, NetworkError>;
}
