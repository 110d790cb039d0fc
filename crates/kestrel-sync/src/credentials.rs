use std::sync::Arc;

use kestrel_types::models::{CredentialGroupId, CredentialSet};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::network::Network;
use crate::session::{Login, Session};

/// The account's known decryption credentials.
///
/// Grows monotonically during a session: a refresh merges the full list the
/// network returns into the snapshot, it never drops entries.
#[derive(Clone)]
pub struct CredentialCache {
    session: Arc<Session>,
    network: Arc<dyn Network>,
}

impl CredentialCache {
    pub fn new(session: Arc<Session>, network: Arc<dyn Network>) -> Self {
        Self { session, network }
    }

    /// Current snapshot.
    pub async fn get(&self) -> CredentialSet {
        self.session.credentials().read().await.clone()
    }

    /// Re-fetch the account's whole credential list and install it. On
    /// error the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<CredentialSet> {
        let login = self.session.require_login()?;
        let known: Vec<CredentialGroupId> =
            self.session.credentials().read().await.keys().cloned().collect();

        let directory = self.network.list_conversations(&login.account, &known).await?;

        let fetched = directory.credential_set();
        let fetched_count = fetched.len();
        let snapshot = self.absorb(&login, fetched).await?;
        info!(
            fetched = fetched_count,
            total = snapshot.len(),
            "credentials refreshed"
        );
        Ok(snapshot)
    }

    /// Merge `credentials` into the snapshot and return the result. Nothing
    /// is written if `login` ended in the meantime.
    pub async fn absorb(&self, login: &Login, credentials: CredentialSet) -> Result<CredentialSet> {
        let mut guard = self.session.credentials().write().await;
        if !self.session.is_login(login) {
            debug!(account = %login.account, "login ended before credentials arrived, discarding");
            return Err(SyncError::AuthRequired);
        }
        guard.extend(credentials);
        Ok(guard.clone())
    }
}
