use thiserror::Error;
use wave_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Durable store read or write failed. In-memory state is not rolled back.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Corrupt stored record for {conversation_id}: {reason}")]
    Corrupt {
        conversation_id: String,
        reason: String,
    },

    #[error("{member_id} is not a participant of {conversation_id}")]
    NotParticipant {
        conversation_id: String,
        member_id: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
