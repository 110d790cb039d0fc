use std::sync::Arc;

use kestrel_types::api::RawMessage;
use kestrel_types::models::{AccountId, CredentialSet, MessageEntry};
use tracing::{debug, warn};

use crate::cipher::{CipherError, MessageCipher};
use crate::credentials::CredentialCache;
use crate::error::{Result, SyncError};
use crate::session::Session;

/// Result of decrypting one batch.
#[derive(Debug, Clone)]
pub struct Decrypted {
    /// Opened entries, in input order.
    pub entries: Vec<MessageEntry>,
    /// The credential set the batch was finally opened with. Reuse it for
    /// the rest of the tick to avoid another refresh.
    pub credentials: CredentialSet,
    /// Entries given up on.
    pub dropped: usize,
    pub refreshed: bool,
}

#[derive(Clone)]
pub struct MessageDecryptor {
    session: Arc<Session>,
    cipher: Arc<dyn MessageCipher>,
    cache: CredentialCache,
}

impl MessageDecryptor {
    pub fn new(
        session: Arc<Session>,
        cipher: Arc<dyn MessageCipher>,
        cache: CredentialCache,
    ) -> Self {
        Self {
            session,
            cipher,
            cache,
        }
    }

    /// Open every entry of `raw` with `credentials`.
    ///
    /// Entries whose credential group is unknown trigger exactly one cache
    /// refresh, after which only those entries are retried. Whatever still
    /// fails is dropped and logged; one bad entry never fails the batch.
    pub async fn decrypt(
        &self,
        raw: Vec<RawMessage>,
        credentials: CredentialSet,
    ) -> Result<Decrypted> {
        let account = self.session.require_account()?;
        let mut credentials = credentials;
        let mut opened: Vec<Option<MessageEntry>> = Vec::with_capacity(raw.len());
        let mut missing = Vec::new();
        let mut dropped = 0;

        for (idx, message) in raw.iter().enumerate() {
            match self.cipher.open(&account, message, &credentials) {
                Ok(body) => opened.push(Some(to_entry(&account, message, body))),
                Err(CipherError::MissingCredential(group)) => {
                    debug!(group = %group, ts = message.timestamp_nanos, "credential missing, will retry");
                    missing.push(idx);
                    opened.push(None);
                }
                Err(e) => {
                    warn!(ts = message.timestamp_nanos, error = %e, "dropping undecryptable message");
                    dropped += 1;
                    opened.push(None);
                }
            }
        }

        let mut refreshed = false;
        if !missing.is_empty() {
            match self.cache.refresh().await {
                Ok(set) => {
                    credentials = set;
                    refreshed = true;
                    for idx in missing {
                        let message = &raw[idx];
                        match self.cipher.open(&account, message, &credentials) {
                            Ok(body) => opened[idx] = Some(to_entry(&account, message, body)),
                            Err(e) => {
                                warn!(ts = message.timestamp_nanos, error = %e, "dropping message after credential refresh");
                                dropped += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, missing = missing.len(), "credential refresh failed, dropping messages");
                    dropped += missing.len();
                }
            }
        }

        if dropped > 0 {
            let gap = SyncError::DecryptionGap { dropped };
            warn!(total = raw.len(), "{}", gap);
        }

        Ok(Decrypted {
            entries: opened.into_iter().flatten().collect(),
            credentials,
            dropped,
            refreshed,
        })
    }
}

fn to_entry(account: &AccountId, raw: &RawMessage, body: String) -> MessageEntry {
    MessageEntry {
        sender: raw.sender.clone(),
        sender_group: raw.sender_group.clone(),
        recipient: raw.recipient.clone(),
        recipient_group: raw.recipient_group.clone(),
        timestamp_nanos: raw.timestamp_nanos,
        body,
        is_sender: raw.sender == *account,
        pending: None,
    }
}
