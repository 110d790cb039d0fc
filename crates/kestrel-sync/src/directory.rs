use std::sync::Arc;

use kestrel_types::api::ConversationSummary;
use kestrel_types::models::{AccountId, Conversation, CredentialGroupId, CredentialSet, ProfileMap};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::network::Network;
use crate::session::{Login, Session};

/// Everything one directory listing returned.
#[derive(Debug, Clone, Default)]
pub struct DirectoryRefresh {
    pub conversations: Vec<ConversationSummary>,
    pub profiles: ProfileMap,
    pub credentials: CredentialSet,
}

/// Loads the set of conversations the account participates in. Never
/// fetches message bodies.
#[derive(Clone)]
pub struct DirectoryRefresher {
    session: Arc<Session>,
    network: Arc<dyn Network>,
    default_group: String,
}

impl DirectoryRefresher {
    pub fn new(session: Arc<Session>, network: Arc<dyn Network>, default_group: String) -> Self {
        Self {
            session,
            network,
            default_group,
        }
    }

    pub async fn refresh(
        &self,
        account: &AccountId,
        known: &CredentialSet,
    ) -> Result<DirectoryRefresh> {
        let known_groups: Vec<CredentialGroupId> = known.keys().cloned().collect();
        let directory = self.network.list_conversations(account, &known_groups).await?;
        let credentials = directory.credential_set();
        debug!(
            conversations = directory.conversations.len(),
            profiles = directory.profiles.len(),
            credentials = credentials.len(),
            "directory listed"
        );
        Ok(DirectoryRefresh {
            conversations: directory.conversations,
            profiles: directory.profiles,
            credentials,
        })
    }

    /// Fold a listing into the session: unknown keys become empty
    /// conversations, bundled profiles feed the username cache and the
    /// credentials are merged in. Existing conversations are left untouched.
    /// Returns how many conversations were added.
    ///
    /// Each cache is re-checked against `login` under its own lock; once the
    /// login has ended nothing more is written.
    pub async fn apply(&self, login: &Login, refresh: DirectoryRefresh) -> Result<usize> {
        let added = {
            let mut mirror = self.session.mirror().write().await;
            self.ensure_login(login)?;
            refresh
                .conversations
                .iter()
                .map(|summary| self.empty_conversation(summary))
                .filter(|conversation| mirror.insert_if_absent(conversation.clone()))
                .count()
        };

        {
            let mut profiles = self.session.profiles().write().await;
            self.ensure_login(login)?;
            profiles.absorb(&refresh.profiles);
        }
        {
            let mut credentials = self.session.credentials().write().await;
            self.ensure_login(login)?;
            credentials.extend(refresh.credentials);
        }

        if added > 0 {
            debug!(added, "new conversations in directory");
        }
        Ok(added)
    }

    fn ensure_login(&self, login: &Login) -> Result<()> {
        if self.session.is_login(login) {
            Ok(())
        } else {
            debug!(account = %login.account, "login ended during directory refresh, discarding");
            Err(SyncError::AuthRequired)
        }
    }

    fn empty_conversation(&self, summary: &ConversationSummary) -> Conversation {
        let or_default = |group: &str| {
            if group.is_empty() {
                self.default_group.clone()
            } else {
                group.to_string()
            }
        };
        let mut conversation = Conversation::empty(
            summary.kind,
            summary.counterpart.clone(),
            or_default(&summary.counterpart_group),
            or_default(&summary.self_group),
        );
        conversation.last_activity_nanos = summary.newest_timestamp_nanos;
        conversation
    }
}
