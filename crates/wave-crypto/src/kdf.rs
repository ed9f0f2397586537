use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::keys::{KEY_LEN, SymmetricKey};

pub const SALT_LEN: usize = 16;
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// PBKDF2 parameters, stored alongside anything wrapped with a derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a wrapping key from a passphrase with PBKDF2-HMAC-SHA256.
///
/// Deterministic in `(passphrase, salt, params)`. Zero iterations is refused
/// rather than degrading to an unstretched key.
pub fn derive_wrapping_key(passphrase: &str, salt: &[u8], params: KdfParams) -> Result<SymmetricKey> {
    if params.iterations == 0 {
        return Err(CryptoError::InvalidKey("PBKDF2 iteration count must be non-zero".into()));
    }
    if salt.is_empty() {
        return Err(CryptoError::InvalidKey("salt must not be empty".into()));
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, params.iterations, &mut key);
    Ok(SymmetricKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: KdfParams = KdfParams { iterations: 1_000 };

    #[test]
    fn deterministic() {
        let salt = [1u8; SALT_LEN];
        let a = derive_wrapping_key("correct-horse", &salt, FAST).unwrap();
        let b = derive_wrapping_key("correct-horse", &salt, FAST).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn salt_and_passphrase_both_matter() {
        let a = derive_wrapping_key("correct-horse", &[1u8; SALT_LEN], FAST).unwrap();
        let b = derive_wrapping_key("correct-horse", &[2u8; SALT_LEN], FAST).unwrap();
        let c = derive_wrapping_key("wrong-horse", &[1u8; SALT_LEN], FAST).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rfc_vector_prefix() {
        // PBKDF2-HMAC-SHA256("password", "salt", 1), first 32 bytes.
        let key = derive_wrapping_key("password", b"salt", KdfParams { iterations: 1 }).unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }

    #[test]
    fn fails_closed_on_bad_params() {
        assert!(derive_wrapping_key("p", &[1u8; SALT_LEN], KdfParams { iterations: 0 }).is_err());
        assert!(derive_wrapping_key("p", &[], FAST).is_err());
    }
}
