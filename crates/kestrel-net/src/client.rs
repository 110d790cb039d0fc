use std::time::Duration;

use async_trait::async_trait;
use kestrel_sync::network::{Network, NetworkError};
use kestrel_types::api::{
    ConversationDirectory, DirectThreadRequest, GroupMembersRequest, GroupThreadRequest,
    ListConversationsRequest, LookupProfilesRequest, ProfilesResponse, RawMessage, SealedMessage,
    SendAck, ThreadResponse,
};
use kestrel_types::models::{AccountId, CredentialGroupId, ProfileMap};
use reqwest::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::NodeClientConfig;
use crate::error::ClientError;
use crate::urls;

/// Talks to one node over JSON POSTs.
pub struct HttpNetwork {
    base_url: String,
    http: reqwest::Client,
    max_response_bytes: usize,
}

impl HttpNetwork {
    pub fn new(config: &NodeClientConfig) -> Result<Self, ClientError> {
        if config.timeout_ms == 0 {
            return Err(ClientError::InvalidConfig("timeout_ms"));
        }
        if config.connect_timeout_ms == 0 {
            return Err(ClientError::InvalidConfig("connect_timeout_ms"));
        }
        if config.max_response_bytes == 0 {
            return Err(ClientError::InvalidConfig("max_response_bytes"));
        }
        let base_url = urls::validated_base(&config.base_url)?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;
        Ok(Self {
            base_url,
            http,
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<TReq: Serialize, TResp: DeserializeOwned>(
        &self,
        url: String,
        payload: &TReq,
    ) -> Result<TResp, NetworkError> {
        debug!(%url, "POST");
        let resp = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                warn!(%url, error = %e, "request failed");
                NetworkError::Transport(e.to_string())
            })?;
        self.handle_json_response(resp).await
    }

    async fn handle_json_response<T: DeserializeOwned>(
        &self,
        resp: Response,
    ) -> Result<T, NetworkError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(NetworkError::Status(status.as_u16()));
        }
        if resp
            .content_length()
            .is_some_and(|len| len as usize > self.max_response_bytes)
        {
            return Err(NetworkError::ResponseTooLarge);
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        if body.len() > self.max_response_bytes {
            return Err(NetworkError::ResponseTooLarge);
        }
        serde_json::from_slice(&body).map_err(|e| NetworkError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn list_conversations(
        &self,
        account: &AccountId,
        known_groups: &[CredentialGroupId],
    ) -> Result<ConversationDirectory, NetworkError> {
        let req = ListConversationsRequest {
            account: account.clone(),
            known_groups: known_groups.to_vec(),
        };
        self.post_json(urls::conversations(&self.base_url), &req).await
    }

    async fn fetch_direct_thread(
        &self,
        account: &AccountId,
        account_group: &str,
        peer: &AccountId,
        peer_group: &str,
        max_count: u32,
        start_timestamp_nanos: u64,
    ) -> Result<Vec<RawMessage>, NetworkError> {
        let req = DirectThreadRequest {
            account: account.clone(),
            account_group: account_group.to_string(),
            peer: peer.clone(),
            peer_group: peer_group.to_string(),
            max_count,
            start_timestamp_nanos,
        };
        let resp: ThreadResponse = self.post_json(urls::direct_thread(&self.base_url), &req).await?;
        Ok(resp.messages)
    }

    async fn fetch_group_thread(
        &self,
        owner: &AccountId,
        group_name: &str,
        start_timestamp_nanos: u64,
        max_count: u32,
    ) -> Result<Vec<RawMessage>, NetworkError> {
        let req = GroupThreadRequest {
            owner: owner.clone(),
            group_name: group_name.to_string(),
            start_timestamp_nanos,
            max_count,
        };
        let resp: ThreadResponse = self.post_json(urls::group_thread(&self.base_url), &req).await?;
        Ok(resp.messages)
    }

    async fn fetch_group_members(
        &self,
        owner: &AccountId,
        group_name: &str,
        max_count: u32,
    ) -> Result<ProfileMap, NetworkError> {
        let req = GroupMembersRequest {
            owner: owner.clone(),
            group_name: group_name.to_string(),
            max_count,
        };
        let resp: ProfilesResponse = self.post_json(urls::group_members(&self.base_url), &req).await?;
        Ok(resp.profiles)
    }

    async fn send_encrypted_message(
        &self,
        message: &SealedMessage,
    ) -> Result<SendAck, NetworkError> {
        self.post_json(urls::send_message(&self.base_url), message).await
    }

    async fn lookup_profiles(&self, accounts: &[AccountId]) -> Result<ProfileMap, NetworkError> {
        if accounts.is_empty() {
            return Ok(ProfileMap::new());
        }
        let req = LookupProfilesRequest {
            accounts: accounts.to_vec(),
        };
        let resp: ProfilesResponse = self.post_json(urls::profiles(&self.base_url), &req).await?;
        Ok(resp.profiles)
    }
}
