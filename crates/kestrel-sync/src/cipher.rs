use kestrel_crypto::encrypt::{self, SealedText};
use kestrel_crypto::keys::GroupKey;
use kestrel_types::api::{OutgoingMessage, RawMessage, SealedMessage};
use kestrel_types::models::{AccountId, CredentialGroupId, CredentialSet};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The credential group is not in the set. A refresh may fix this.
    #[error("missing credential for group {0}")]
    MissingCredential(CredentialGroupId),
    /// Anything a refresh cannot fix.
    #[error("corrupt message: {0}")]
    Corrupt(String),
}

/// Seam over the cryptographic primitives.
pub trait MessageCipher: Send + Sync {
    fn open(
        &self,
        account: &AccountId,
        raw: &RawMessage,
        credentials: &CredentialSet,
    ) -> Result<String, CipherError>;

    fn seal(
        &self,
        outgoing: &OutgoingMessage,
        credentials: &CredentialSet,
    ) -> Result<SealedMessage, CipherError>;
}

/// Shared-key AES-256-GCM: every holder of a credential group can open
/// what was sealed under it. Outgoing messages are sealed under the
/// recipient's group.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCipher;

impl AesGcmCipher {
    fn key_for(
        group: &CredentialGroupId,
        credentials: &CredentialSet,
    ) -> Result<GroupKey, CipherError> {
        let material = credentials
            .get(group)
            .ok_or_else(|| CipherError::MissingCredential(group.clone()))?;
        GroupKey::from_material(material.expose()).map_err(|e| CipherError::Corrupt(format!("{:#}", e)))
    }
}

impl MessageCipher for AesGcmCipher {
    fn open(
        &self,
        _account: &AccountId,
        raw: &RawMessage,
        credentials: &CredentialSet,
    ) -> Result<String, CipherError> {
        let key = Self::key_for(&raw.credential, credentials)?;
        let sealed = SealedText {
            ciphertext: raw.ciphertext.clone(),
            nonce: raw.nonce.clone(),
        };
        encrypt::open(&key, &sealed).map_err(|e| CipherError::Corrupt(format!("{:#}", e)))
    }

    fn seal(
        &self,
        outgoing: &OutgoingMessage,
        credentials: &CredentialSet,
    ) -> Result<SealedMessage, CipherError> {
        let credential =
            CredentialGroupId::new(outgoing.recipient.clone(), outgoing.recipient_group.clone());
        let key = Self::key_for(&credential, credentials)?;
        let SealedText { ciphertext, nonce } =
            encrypt::seal(&key, &outgoing.plaintext).map_err(|e| CipherError::Corrupt(format!("{:#}", e)))?;
        Ok(SealedMessage {
            sender: outgoing.sender.clone(),
            sender_group: outgoing.sender_group.clone(),
            recipient: outgoing.recipient.clone(),
            recipient_group: outgoing.recipient_group.clone(),
            credential,
            ciphertext,
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_crypto::keys::GroupKey;
    use kestrel_types::models::CredentialMaterial;

    fn outgoing() -> OutgoingMessage {
        OutgoingMessage {
            plaintext: "gm".into(),
            sender: AccountId::new("alice"),
            sender_group: "default-key".into(),
            recipient: AccountId::new("bob"),
            recipient_group: "default-key".into(),
        }
    }

    #[test]
    fn sealed_message_opens_with_the_same_group() {
        let group = CredentialGroupId::new("bob", "default-key");
        let mut credentials = CredentialSet::new();
        credentials.insert(
            group.clone(),
            CredentialMaterial::new(GroupKey::generate().to_material()),
        );

        let sealed = AesGcmCipher.seal(&outgoing(), &credentials).unwrap();
        assert_eq!(sealed.credential, group);

        let raw = RawMessage {
            sender: sealed.sender,
            sender_group: sealed.sender_group,
            recipient: sealed.recipient,
            recipient_group: sealed.recipient_group,
            timestamp_nanos: 1,
            credential: sealed.credential,
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
        };
        let body = AesGcmCipher
            .open(&AccountId::new("bob"), &raw, &credentials)
            .unwrap();
        assert_eq!(body, "gm");
    }

    #[test]
    fn unknown_group_reports_missing_credential() {
        let err = AesGcmCipher
            .seal(&outgoing(), &CredentialSet::new())
            .unwrap_err();
        assert!(matches!(err, CipherError::MissingCredential(_)));
    }
}
