use std::sync::Arc;

use kestrel_types::api::{OutgoingMessage, SealedMessage, SendAck};
use kestrel_types::events::{NoticeLevel, SyncEvent};
use kestrel_types::models::{
    ConversationKey, CredentialSet, MessageEntry, Pending, PendingState,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cipher::{CipherError, MessageCipher};
use crate::credentials::CredentialCache;
use crate::error::{Result, SyncError};
use crate::network::Network;
use crate::session::Session;
use crate::time::now_nanos;

/// Optimistic send: `Composed -> Pending -> {Committed | RolledBack}`.
///
/// At most one in-flight provisional entry per conversation; a second send
/// into the same conversation is rejected until the first is answered.
#[derive(Clone)]
pub struct SendPipeline {
    session: Arc<Session>,
    network: Arc<dyn Network>,
    cipher: Arc<dyn MessageCipher>,
    credentials: CredentialCache,
}

impl SendPipeline {
    pub fn new(
        session: Arc<Session>,
        network: Arc<dyn Network>,
        cipher: Arc<dyn MessageCipher>,
        credentials: CredentialCache,
    ) -> Self {
        Self {
            session,
            network,
            cipher,
            credentials,
        }
    }

    /// Send `text` into conversation `key`. On success the returned entry
    /// is the provisional one, now marked sent and still at the head.
    pub async fn send(&self, key: &ConversationKey, text: &str) -> Result<MessageEntry> {
        let login = self.session.require_login()?;
        if !self.session.is_online() {
            self.session
                .notice(NoticeLevel::Error, "You are offline. Message not sent.");
            return Err(SyncError::NetworkUnavailable);
        }

        // Composed -> Pending
        let local_id = Uuid::new_v4();
        let (outgoing, mut entry, guard) = {
            let mut mirror = self.session.mirror().write().await;
            if !self.session.is_login(&login) {
                return Err(SyncError::AuthRequired);
            }
            if mirror.has_in_flight(key) {
                return Err(SyncError::SendInFlight(key.clone()));
            }
            let conversation = mirror
                .get(key)
                .ok_or_else(|| SyncError::UnknownConversation(key.clone()))?;

            let outgoing = OutgoingMessage {
                plaintext: text.to_string(),
                sender: login.account.clone(),
                sender_group: conversation.self_group.clone(),
                recipient: conversation.counterpart.clone(),
                recipient_group: conversation.counterpart_group.clone(),
            };
            // Keep timestamps strictly decreasing even if the newest entry
            // came from a clock ahead of ours.
            let timestamp_nanos = match conversation.newest_timestamp() {
                Some(head) => now_nanos().max(head.saturating_add(1)),
                None => now_nanos(),
            };
            let entry = MessageEntry {
                sender: outgoing.sender.clone(),
                sender_group: outgoing.sender_group.clone(),
                recipient: outgoing.recipient.clone(),
                recipient_group: outgoing.recipient_group.clone(),
                timestamp_nanos,
                body: outgoing.plaintext.clone(),
                is_sender: true,
                pending: Some(Pending {
                    local_id,
                    state: PendingState::InFlight,
                }),
            };

            let guard = self.session.lock_refresh("send");
            mirror.prepend(key, entry.clone());
            (outgoing, entry, guard)
        };

        match self.submit(&outgoing).await {
            Ok(ack) => {
                let committed = self.session.mirror().write().await.mark_sent(key, local_id);
                drop(guard);
                info!(key = %key, %local_id, network_ts = ?ack.timestamp_nanos, "message sent");
                if committed.is_some() {
                    self.session.publish(SyncEvent::SendCommitted {
                        key: key.clone(),
                        local_id,
                    });
                } else {
                    debug!(key = %key, %local_id, "session ended before the send was answered");
                }
                entry.pending = Some(Pending {
                    local_id,
                    state: PendingState::Sent,
                });
                Ok(entry)
            }
            Err(e) => {
                let removed = self
                    .session
                    .mirror()
                    .write()
                    .await
                    .remove_provisional(key, local_id);
                drop(guard);
                let reason = e.to_string();
                warn!(key = %key, %local_id, error = %reason, "send failed, rolled back");
                if removed {
                    self.session.publish(SyncEvent::SendRolledBack {
                        key: key.clone(),
                        local_id,
                        error: reason.clone(),
                    });
                    self.session.notice(
                        NoticeLevel::Error,
                        format!("Message not sent: {}", reason),
                    );
                }
                Err(SyncError::SendFailure(reason))
            }
        }
    }

    /// Seal and submit. A missing credential gets one cache refresh.
    async fn submit(&self, outgoing: &OutgoingMessage) -> Result<SendAck> {
        let credentials = self.credentials.get().await;
        let sealed = match self.seal(outgoing, &credentials) {
            Err(CipherError::MissingCredential(group)) => {
                warn!(group = %group, "no credential to seal with, refreshing");
                let refreshed = self.credentials.refresh().await?;
                self.seal(outgoing, &refreshed)?
            }
            other => other?,
        };
        Ok(self.network.send_encrypted_message(&sealed).await?)
    }

    fn seal(
        &self,
        outgoing: &OutgoingMessage,
        credentials: &CredentialSet,
    ) -> std::result::Result<SealedMessage, CipherError> {
        self.cipher.seal(outgoing, credentials)
    }
}
