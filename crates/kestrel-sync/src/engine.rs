use std::sync::Arc;

use kestrel_types::events::{NoticeLevel, SyncEvent};
use kestrel_types::models::{AccountId, Conversation, ConversationKey, ConversationKind, MessageEntry};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cipher::MessageCipher;
use crate::config::SyncConfig;
use crate::credentials::CredentialCache;
use crate::decrypt::MessageDecryptor;
use crate::directory::DirectoryRefresher;
use crate::error::{Result, SyncError};
use crate::fetch::ConversationFetcher;
use crate::merge::replace_window;
use crate::network::Network;
use crate::profiles::ProfileResolver;
use crate::send::SendPipeline;
use crate::session::{Login, Session};
use crate::synchronizer::{BackgroundSynchronizer, TickOutcome};

/// Result of a foreground conversation load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The window was installed; `messages` entries are now resident.
    Loaded { messages: usize },
    /// Another selection was made before the load finished.
    Superseded,
}

/// Owns one session and every component operating on it.
#[derive(Clone)]
pub struct Engine {
    config: SyncConfig,
    session: Arc<Session>,
    credentials: CredentialCache,
    directory: DirectoryRefresher,
    fetcher: ConversationFetcher,
    decryptor: MessageDecryptor,
    profiles: ProfileResolver,
    synchronizer: BackgroundSynchronizer,
    sender: SendPipeline,
}

impl Engine {
    pub fn new(
        config: SyncConfig,
        network: Arc<dyn Network>,
        cipher: Arc<dyn MessageCipher>,
    ) -> Self {
        let session = Session::new(config.event_capacity);
        let credentials = CredentialCache::new(session.clone(), network.clone());
        let directory = DirectoryRefresher::new(
            session.clone(),
            network.clone(),
            config.default_group_name.clone(),
        );
        let fetcher = ConversationFetcher::new(session.clone(), network.clone(), config.page_size);
        let decryptor = MessageDecryptor::new(session.clone(), cipher.clone(), credentials.clone());
        let profiles = ProfileResolver::new(
            session.clone(),
            network.clone(),
            config.group_member_page_size,
        );
        let synchronizer = BackgroundSynchronizer::new(
            session.clone(),
            credentials.clone(),
            directory.clone(),
            fetcher.clone(),
            decryptor.clone(),
            profiles.clone(),
            config.poll_interval(),
        );
        let sender = SendPipeline::new(session.clone(), network, cipher, credentials.clone());

        Self {
            config,
            session,
            credentials,
            directory,
            fetcher,
            decryptor,
            profiles,
            synchronizer,
            sender,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn decryptor(&self) -> &MessageDecryptor {
        &self.decryptor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.session.subscribe()
    }

    pub fn set_online(&self, online: bool) {
        info!(online, "connectivity changed");
        self.session.set_online(online);
    }

    // -- Account lifecycle --

    /// Log `account` in and load its conversation directory. The account
    /// stays logged in even if the directory load fails; the error is
    /// returned so it can be reported and retried with [`Self::reload`].
    pub async fn login(&self, account: AccountId) -> Result<usize> {
        if self.session.account().is_some() {
            return Err(SyncError::AlreadyLoggedIn);
        }
        let _guard = self.session.lock_refresh("login");
        self.begin_session(account).await
    }

    pub async fn logout(&self) {
        let previous = self.session.account();
        self.session.clear().await;
        if let Some(account) = previous {
            info!(account = %account, "logged out");
        }
        self.session
            .publish(SyncEvent::SessionChanged { account: None });
    }

    /// Replace the logged-in account. Background ticks are held off until
    /// the new directory is loaded.
    pub async fn switch_account(&self, account: AccountId) -> Result<usize> {
        let _guard = self.session.lock_refresh("account switch");
        self.session.clear().await;
        self.begin_session(account).await
    }

    /// Reload the conversation directory for the logged-in account.
    pub async fn reload(&self) -> Result<usize> {
        let login = self.session.require_login()?;
        self.require_online()?;
        self.load_directory(&login).await
    }

    async fn begin_session(&self, account: AccountId) -> Result<usize> {
        self.require_online()?;
        let login = self.session.begin(account.clone());
        info!(account = %account, "logged in");
        self.session.publish(SyncEvent::SessionChanged {
            account: Some(account),
        });
        self.load_directory(&login).await.inspect_err(|e| {
            self.session
                .notice(NoticeLevel::Error, format!("Could not load conversations: {}", e));
        })
    }

    async fn load_directory(&self, login: &Login) -> Result<usize> {
        let known = self.credentials.get().await;
        let listing = self.directory.refresh(&login.account, &known).await?;
        let listed = listing.conversations.len();
        let added = self.directory.apply(login, listing).await?;
        self.session.publish(SyncEvent::DirectoryRefreshed {
            conversations: listed,
            added,
        });
        Ok(added)
    }

    // -- Conversations --

    /// Snapshot of every conversation, newest activity first. Conversations
    /// with no resident messages are ordered by what the directory reported.
    pub async fn conversations(&self) -> Vec<Conversation> {
        let mirror = self.session.mirror().read().await;
        let mut conversations: Vec<Conversation> = mirror.iter().map(|(_, c)| c.clone()).collect();
        conversations.sort_by(|a, b| b.activity_timestamp().cmp(&a.activity_timestamp()));
        conversations
    }

    pub async fn conversation(&self, key: &ConversationKey) -> Option<Conversation> {
        self.session.mirror().read().await.get(key).cloned()
    }

    /// Select `key` and load its newest window.
    ///
    /// The selection changes immediately; the fetched window is committed
    /// only if nothing selected something else in the meantime.
    pub async fn select_conversation(&self, key: ConversationKey) -> Result<LoadOutcome> {
        let login = self.session.require_login()?;
        let conversation = self
            .conversation(&key)
            .await
            .ok_or_else(|| SyncError::UnknownConversation(key.clone()))?;

        let selection = self.session.select(Some(key.clone()));
        self.require_online()?;
        let _guard = self.session.lock_refresh("conversation switch");

        if conversation.is_group() {
            if let Err(e) = self.profiles.group_members(&login, &conversation).await {
                warn!(key = %key, error = %e, "could not load group members");
            }
        }

        let raw = self.fetcher.fetch(&key, None).await?;
        let credentials = self.credentials.get().await;
        let decrypted = self.decryptor.decrypt(raw, credentials).await?;
        let senders: Vec<AccountId> = decrypted.entries.iter().map(|m| m.sender.clone()).collect();

        let messages = {
            let mut mirror = self.session.mirror().write().await;
            if !self.session.is_current(&selection) || !self.session.is_login(&login) {
                debug!(key = %key, "selection changed during load, discarding");
                return Ok(LoadOutcome::Superseded);
            }
            let Some(conversation) = mirror.get_mut(&key) else {
                return Ok(LoadOutcome::Superseded);
            };
            replace_window(&mut conversation.messages, decrypted.entries);
            conversation.messages.len()
        };

        self.session.publish(SyncEvent::ConversationLoaded {
            key: key.clone(),
            messages,
        });
        if let Err(e) = self.profiles.resolve_unknown(&login, &senders).await {
            debug!(error = %e, "username lookup failed");
        }
        Ok(LoadOutcome::Loaded { messages })
    }

    /// Open a conversation with `peer`, synthesizing an empty one if the
    /// account has never messaged them.
    pub async fn start_conversation(&self, peer: AccountId) -> Result<(ConversationKey, LoadOutcome)> {
        let login = self.session.require_login()?;
        let group = self.config.default_group_name.clone();
        let conversation =
            Conversation::empty(ConversationKind::DirectMessage, peer, group.clone(), group);
        let key = conversation.key();
        {
            let mut mirror = self.session.mirror().write().await;
            if !self.session.is_login(&login) {
                return Err(SyncError::AuthRequired);
            }
            if mirror.insert_if_absent(conversation) {
                debug!(key = %key, "synthesized empty conversation");
            }
        }
        let outcome = self.select_conversation(key.clone()).await?;
        Ok((key, outcome))
    }

    /// Close the open conversation; background ticks go idle.
    pub fn deselect(&self) {
        self.session.select(None);
    }

    // -- Messaging --

    /// Send `text` into the selected conversation.
    pub async fn send(&self, text: &str) -> Result<MessageEntry> {
        let key = self
            .session
            .selected_key()
            .ok_or(SyncError::NoConversationSelected)?;
        self.sender.send(&key, text).await
    }

    // -- Polling --

    pub async fn tick(&self) -> TickOutcome {
        self.synchronizer.tick().await
    }

    pub fn spawn_poller(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.synchronizer.clone().spawn(shutdown)
    }

    fn require_online(&self) -> Result<()> {
        if self.session.is_online() {
            Ok(())
        } else {
            self.session
                .notice(NoticeLevel::Error, "You are offline.");
            Err(SyncError::NetworkUnavailable)
        }
    }
}
