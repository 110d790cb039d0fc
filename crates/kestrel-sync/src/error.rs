use kestrel_types::models::ConversationKey;
use thiserror::Error;

use crate::cipher::CipherError;
use crate::network::NetworkError;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no authenticated account")]
    AuthRequired,
    #[error("an account is already logged in")]
    AlreadyLoggedIn,
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("{dropped} message(s) could not be decrypted")]
    DecryptionGap { dropped: usize },
    #[error("send failed: {0}")]
    SendFailure(String),
    #[error("a send is already pending in conversation {0}")]
    SendInFlight(ConversationKey),
    #[error("no conversation selected")]
    NoConversationSelected,
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationKey),
    #[error("network: {0}")]
    Network(#[from] NetworkError),
    #[error("cipher: {0}")]
    Cipher(#[from] CipherError),
}
