use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use kestrel_types::events::{NoticeLevel, SyncEvent};
use kestrel_types::models::{AccountId, ConversationKey, CredentialSet};
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::lock::{RefreshGuard, RefreshLock};
use crate::mirror::ConversationMirror;
use crate::profiles::ProfileCache;

/// The currently selected conversation. `epoch` increases on every change,
/// so a result computed for an older selection can be told apart even if
/// the same key was selected again in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub key: Option<ConversationKey>,
    pub epoch: u64,
}

/// One login of one account. `generation` changes whenever the account
/// does, so work started under a login can tell it was logged out under it,
/// even if the same account logged in again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub account: AccountId,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct AccountState {
    account: Option<AccountId>,
    generation: u64,
}

/// Everything one logged-in session shares between the background poller
/// and foreground actions. Created once per engine, emptied on logout.
pub struct Session {
    account: StdRwLock<AccountState>,
    selection: StdRwLock<Selection>,
    online: AtomicBool,
    refresh_lock: Arc<RefreshLock>,
    credentials: RwLock<CredentialSet>,
    mirror: RwLock<ConversationMirror>,
    profiles: RwLock<ProfileCache>,
    events: broadcast::Sender<SyncEvent>,
}

impl Session {
    pub fn new(event_capacity: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Arc::new(Self {
            account: StdRwLock::new(AccountState::default()),
            selection: StdRwLock::new(Selection {
                key: None,
                epoch: 0,
            }),
            online: AtomicBool::new(true),
            refresh_lock: Arc::new(RefreshLock::new()),
            credentials: RwLock::new(CredentialSet::new()),
            mirror: RwLock::new(ConversationMirror::new()),
            profiles: RwLock::new(ProfileCache::default()),
            events,
        })
    }

    // -- Account --

    pub fn account(&self) -> Option<AccountId> {
        self.account
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .account
            .clone()
    }

    pub fn require_account(&self) -> Result<AccountId> {
        self.account().ok_or(SyncError::AuthRequired)
    }

    pub fn login(&self) -> Option<Login> {
        let state = self.account.read().unwrap_or_else(PoisonError::into_inner);
        state.account.clone().map(|account| Login {
            account,
            generation: state.generation,
        })
    }

    pub fn require_login(&self) -> Result<Login> {
        self.login().ok_or(SyncError::AuthRequired)
    }

    /// True if `login` is still the current login. Writers into the shared
    /// caches check this while holding the cache's lock.
    pub fn is_login(&self, login: &Login) -> bool {
        let state = self.account.read().unwrap_or_else(PoisonError::into_inner);
        state.generation == login.generation && state.account.as_ref() == Some(&login.account)
    }

    fn set_account(&self, account: Option<AccountId>) -> u64 {
        let mut state = self.account.write().unwrap_or_else(PoisonError::into_inner);
        state.account = account;
        state.generation += 1;
        state.generation
    }

    pub(crate) fn begin(&self, account: AccountId) -> Login {
        let generation = self.set_account(Some(account.clone()));
        Login {
            account,
            generation,
        }
    }

    // -- Selection --

    pub fn selection(&self) -> Selection {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn selected_key(&self) -> Option<ConversationKey> {
        self.selection().key
    }

    /// Change the selection and return the new one.
    pub fn select(&self, key: Option<ConversationKey>) -> Selection {
        let mut selection = self.selection.write().unwrap_or_else(PoisonError::into_inner);
        selection.key = key;
        selection.epoch += 1;
        debug!(key = ?selection.key, epoch = selection.epoch, "selection changed");
        selection.clone()
    }

    /// True if nothing changed the selection since `seen` was taken.
    pub fn is_current(&self, seen: &Selection) -> bool {
        *self.selection.read().unwrap_or_else(PoisonError::into_inner) == *seen
    }

    // -- Connectivity & refresh lock --

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn is_refresh_locked(&self) -> bool {
        self.refresh_lock.is_held()
    }

    pub fn lock_refresh(&self, reason: &'static str) -> RefreshGuard {
        self.refresh_lock.acquire(reason)
    }

    // -- Shared state --

    pub(crate) fn credentials(&self) -> &RwLock<CredentialSet> {
        &self.credentials
    }

    pub fn mirror(&self) -> &RwLock<ConversationMirror> {
        &self.mirror
    }

    pub fn profiles(&self) -> &RwLock<ProfileCache> {
        &self.profiles
    }

    /// Drop everything tied to the logged-in account. The login ends before
    /// any cache lock is taken, so a writer that gets a lock after this
    /// point sees a stale login and backs off.
    pub(crate) async fn clear(&self) {
        self.set_account(None);
        self.select(None);
        self.credentials.write().await.clear();
        self.mirror.write().await.clear();
        self.profiles.write().await.clear();
    }

    // -- Events --

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.publish(SyncEvent::Notice {
            level,
            message: message.into(),
        });
    }
}
