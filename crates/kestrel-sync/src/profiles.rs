use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kestrel_types::models::{AccountId, Conversation, ConversationKey, ProfileMap};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::network::Network;
use crate::session::{Login, Session};

/// Username and group-membership caches. Append-only for the session.
#[derive(Debug, Default, Clone)]
pub struct ProfileCache {
    usernames: HashMap<AccountId, String>,
    memberships: HashMap<ConversationKey, ProfileMap>,
}

impl ProfileCache {
    pub fn username(&self, account: &AccountId) -> Option<&str> {
        self.usernames.get(account).map(String::as_str)
    }

    /// Display name, falling back to a shortened account id.
    pub fn display_name(&self, account: &AccountId) -> String {
        match self.username(account) {
            Some(name) => name.to_string(),
            None => account.as_str().chars().take(12).collect(),
        }
    }

    /// Record every username in `profiles`. Returns how many were new.
    pub fn absorb(&mut self, profiles: &ProfileMap) -> usize {
        let mut added = 0;
        for (account, profile) in profiles {
            if let Some(name) = profile.username.as_ref() {
                if self.usernames.insert(account.clone(), name.clone()).is_none() {
                    added += 1;
                }
            }
        }
        added
    }

    /// Accounts from `accounts` with no cached username, deduplicated.
    pub fn unknown<'a>(&self, accounts: impl IntoIterator<Item = &'a AccountId>) -> Vec<AccountId> {
        let mut seen = HashSet::new();
        accounts
            .into_iter()
            .filter(|a| !self.usernames.contains_key(*a) && seen.insert(*a))
            .cloned()
            .collect()
    }

    pub fn members(&self, group: &ConversationKey) -> Option<&ProfileMap> {
        self.memberships.get(group)
    }

    pub fn set_members(&mut self, group: ConversationKey, members: ProfileMap) {
        self.absorb(&members);
        self.memberships.insert(group, members);
    }

    pub fn clear(&mut self) {
        self.usernames.clear();
        self.memberships.clear();
    }
}

/// Fills the profile caches from the network on demand.
#[derive(Clone)]
pub struct ProfileResolver {
    session: Arc<Session>,
    network: Arc<dyn Network>,
    member_page_size: u32,
}

impl ProfileResolver {
    pub fn new(session: Arc<Session>, network: Arc<dyn Network>, member_page_size: u32) -> Self {
        Self {
            session,
            network,
            member_page_size,
        }
    }

    /// Look up any account without a cached username. Returns how many
    /// names were added.
    pub async fn resolve_unknown(&self, login: &Login, accounts: &[AccountId]) -> Result<usize> {
        let unknown = self.session.profiles().read().await.unknown(accounts);
        if unknown.is_empty() {
            return Ok(0);
        }

        let profiles = self.network.lookup_profiles(&unknown).await?;
        let added = {
            let mut cache = self.session.profiles().write().await;
            self.ensure_login(login)?;
            cache.absorb(&profiles)
        };
        debug!(requested = unknown.len(), added, "usernames resolved");
        Ok(added)
    }

    /// Members of a group conversation, fetched on first view only.
    pub async fn group_members(
        &self,
        login: &Login,
        conversation: &Conversation,
    ) -> Result<ProfileMap> {
        let key = conversation.key();
        if let Some(members) = self.session.profiles().read().await.members(&key) {
            return Ok(members.clone());
        }

        let members = self
            .network
            .fetch_group_members(
                &conversation.counterpart,
                &conversation.counterpart_group,
                self.member_page_size,
            )
            .await?;
        {
            let mut cache = self.session.profiles().write().await;
            self.ensure_login(login)?;
            debug!(group = %key, members = members.len(), "group membership cached");
            cache.set_members(key, members.clone());
        }
        Ok(members)
    }

    fn ensure_login(&self, login: &Login) -> Result<()> {
        if self.session.is_login(login) {
            Ok(())
        } else {
            Err(SyncError::AuthRequired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::models::Profile;

    fn profile(id: &str, name: Option<&str>) -> (AccountId, Profile) {
        let account = AccountId::new(id);
        (
            account.clone(),
            Profile {
                account,
                username: name.map(str::to_string),
                description: None,
            },
        )
    }

    #[test]
    fn absorb_skips_nameless_profiles() {
        let mut cache = ProfileCache::default();
        let profiles: ProfileMap = [profile("a", Some("alice")), profile("b", None)]
            .into_iter()
            .collect();

        assert_eq!(cache.absorb(&profiles), 1);
        assert_eq!(cache.username(&AccountId::new("a")), Some("alice"));
        assert_eq!(
            cache.unknown(&[AccountId::new("a"), AccountId::new("b"), AccountId::new("b")]),
            vec![AccountId::new("b")]
        );
    }

    #[test]
    fn display_name_falls_back_to_short_id() {
        let cache = ProfileCache::default();
        let name = cache.display_name(&AccountId::new("BC1YLgk9Z8y9u3nKmA"));
        assert_eq!(name, "BC1YLgk9Z8y9");
    }
}
