use std::sync::Arc;

use kestrel_types::api::RawMessage;
use kestrel_types::models::{ConversationKey, ConversationKind};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::network::Network;
use crate::session::Session;
use crate::time::now_nanos;

/// Loads the first (newest) window of one conversation.
///
/// Only that window is kept resident; older pages are not fetched.
#[derive(Clone)]
pub struct ConversationFetcher {
    session: Arc<Session>,
    network: Arc<dyn Network>,
    page_size: u32,
}

impl ConversationFetcher {
    pub fn new(session: Arc<Session>, network: Arc<dyn Network>, page_size: u32) -> Self {
        Self {
            session,
            network,
            page_size,
        }
    }

    /// Fetch raw messages for `key`, newest first. `window_start` defaults to
    /// the newest possible window.
    pub async fn fetch(
        &self,
        key: &ConversationKey,
        window_start: Option<u64>,
    ) -> Result<Vec<RawMessage>> {
        let account = self.session.require_account()?;
        let conversation = self
            .session
            .mirror()
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::UnknownConversation(key.clone()))?;

        let raw = match conversation.kind {
            ConversationKind::DirectMessage => {
                let start = window_start.unwrap_or_else(now_nanos);
                self.network
                    .fetch_direct_thread(
                        &account,
                        &conversation.self_group,
                        &conversation.counterpart,
                        &conversation.counterpart_group,
                        self.page_size,
                        start,
                    )
                    .await?
            }
            ConversationKind::GroupChat => {
                let start = window_start.unwrap_or_else(|| {
                    group_window_start(conversation.newest_timestamp(), now_nanos())
                });
                self.network
                    .fetch_group_thread(
                        &conversation.counterpart,
                        &conversation.counterpart_group,
                        start,
                        self.page_size,
                    )
                    .await?
            }
        };

        let window = normalize_window(raw, self.page_size as usize);
        debug!(key = %key, messages = window.len(), "conversation window fetched");
        Ok(window)
    }
}

/// Start cursor for a group thread: strictly past the newest resident entry
/// and never earlier than now, so the window always covers everything since
/// the conversation's current first message, even when that entry's
/// timestamp came from a clock running ahead of ours.
pub fn group_window_start(newest_resident: Option<u64>, now: u64) -> u64 {
    match newest_resident {
        Some(ts) => ts.saturating_add(1).max(now),
        None => now,
    }
}

/// Newest first, one entry per timestamp, at most `limit` entries.
fn normalize_window(mut raw: Vec<RawMessage>, limit: usize) -> Vec<RawMessage> {
    raw.sort_by(|a, b| b.timestamp_nanos.cmp(&a.timestamp_nanos));
    raw.dedup_by_key(|m| m.timestamp_nanos);
    raw.truncate(limit);
    raw
}
