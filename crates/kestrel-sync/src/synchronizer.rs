use std::sync::Arc;
use std::time::Duration;

use kestrel_types::events::SyncEvent;
use kestrel_types::models::{AccountId, ConversationKey};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::credentials::CredentialCache;
use crate::decrypt::MessageDecryptor;
use crate::directory::DirectoryRefresher;
use crate::error::{Result, SyncError};
use crate::fetch::ConversationFetcher;
use crate::merge::{MergeOutcome, is_strictly_newest_first, merge_window};
use crate::profiles::ProfileResolver;
use crate::session::{Login, Selection, Session};

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAccount,
    NoSelection,
    Locked,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Guard failed: no network calls, no mutations.
    Skipped(SkipReason),
    /// The world moved on while the tick was fetching (selection, account
    /// or refresh lock changed); its result was thrown away.
    Discarded,
    Merged {
        key: ConversationKey,
        outcome: MergeOutcome,
    },
    /// A network or session error, already logged.
    Failed(String),
}

/// Timer-driven refresh of the directory and the selected conversation.
#[derive(Clone)]
pub struct BackgroundSynchronizer {
    session: Arc<Session>,
    credentials: CredentialCache,
    directory: DirectoryRefresher,
    fetcher: ConversationFetcher,
    decryptor: MessageDecryptor,
    profiles: ProfileResolver,
    interval: Duration,
}

impl BackgroundSynchronizer {
    pub fn new(
        session: Arc<Session>,
        credentials: CredentialCache,
        directory: DirectoryRefresher,
        fetcher: ConversationFetcher,
        decryptor: MessageDecryptor,
        profiles: ProfileResolver,
        interval: Duration,
    ) -> Self {
        Self {
            session,
            credentials,
            directory,
            fetcher,
            decryptor,
            profiles,
            interval,
        }
    }

    /// Run one tick. Everything it needs is read from the session at call
    /// time. Errors are absorbed here and never reach the poller.
    pub async fn tick(&self) -> TickOutcome {
        let (login, selection) = match self.guard() {
            Ok(state) => state,
            Err(reason) => {
                trace!(?reason, "tick skipped");
                return TickOutcome::Skipped(reason);
            }
        };

        match self.refresh_selected(&login, &selection).await {
            Ok(outcome) => outcome,
            Err(SyncError::AuthRequired) => {
                debug!("login ended during tick");
                TickOutcome::Discarded
            }
            Err(e) => {
                warn!(error = %e, "background refresh failed");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    fn guard(&self) -> std::result::Result<(Login, Selection), SkipReason> {
        let login = self.session.login().ok_or(SkipReason::NoAccount)?;
        let selection = self.session.selection();
        if selection.key.is_none() {
            return Err(SkipReason::NoSelection);
        }
        if self.session.is_refresh_locked() {
            return Err(SkipReason::Locked);
        }
        if !self.session.is_online() {
            return Err(SkipReason::Offline);
        }
        Ok((login, selection))
    }

    async fn refresh_selected(
        &self,
        login: &Login,
        selection: &Selection,
    ) -> Result<TickOutcome> {
        let Some(key) = selection.key.clone() else {
            return Ok(TickOutcome::Skipped(SkipReason::NoSelection));
        };

        // Refreshing
        let known = self.credentials.get().await;
        let listing = self.directory.refresh(&login.account, &known).await?;
        let listed = listing.conversations.len();
        let added = self.directory.apply(login, listing).await?;
        if added > 0 {
            self.session.publish(SyncEvent::DirectoryRefreshed {
                conversations: listed,
                added,
            });
        }

        let raw = self.fetcher.fetch(&key, None).await?;
        let credentials = self.credentials.get().await;
        let decrypted = self.decryptor.decrypt(raw, credentials).await?;

        // Merging
        let senders: Vec<AccountId> = decrypted.entries.iter().map(|m| m.sender.clone()).collect();
        let outcome = {
            let mut mirror = self.session.mirror().write().await;
            if !self.session.is_current(selection)
                || !self.session.is_login(login)
                || self.session.is_refresh_locked()
            {
                debug!(key = %key, "selection changed during tick, discarding fetch");
                return Ok(TickOutcome::Discarded);
            }
            let Some(conversation) = mirror.get_mut(&key) else {
                return Ok(TickOutcome::Discarded);
            };
            let outcome = merge_window(&mut conversation.messages, decrypted.entries);
            debug_assert!(is_strictly_newest_first(&conversation.messages));
            outcome
        };

        if let MergeOutcome::Merged { added, superseded } = outcome {
            info!(key = %key, added, superseded, "merged new messages");
            self.session.publish(SyncEvent::MessagesMerged {
                key: key.clone(),
                added,
            });
        }

        if let Err(e) = self.profiles.resolve_unknown(login, &senders).await {
            debug!(error = %e, "username lookup failed");
        }

        Ok(TickOutcome::Merged { key, outcome })
    }

    /// Spawn the polling loop. Ticks never overlap; a tick that would have
    /// fired while the previous one was still running is skipped.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_ms = self.interval.as_millis() as u64, "poller started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let outcome = self.tick().await;
                        trace!(?outcome, "tick finished");
                    }
                }
            }

            info!("poller stopped");
        })
    }
}
