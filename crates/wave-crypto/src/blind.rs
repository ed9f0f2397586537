use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::keys::SymmetricKey;

type HmacSha256 = Hmac<Sha256>;

/// Blinded lookup key for a (conversation, member) pair.
///
/// `hex(HMAC-SHA256(key, len(conv) || conv || member))` with a big-endian u32
/// length prefix, so pairs whose concatenations coincide still map apart.
/// One-way: storage keyed by this cannot be traced back to the pair.
pub fn blind_pair(key: &SymmetricKey, conversation_id: &str, member_id: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(&(conversation_id.len() as u32).to_be_bytes());
    mac.update(conversation_id.as_bytes());
    mac.update(member_id.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
