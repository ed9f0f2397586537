use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// GCM tag mismatch. Wrong passphrase, wrong key and tampering all land here
    /// and are not distinguished further.
    #[error("Authentication failed")]
    Authentication,

    #[error("Key material not found: {0}")]
    MissingKeyMaterial(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("AEAD encryption failed")]
    Encryption,

    #[error("Key vault is locked")]
    Locked,

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
