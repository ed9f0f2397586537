use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};

use crate::envelope::{NONCE_LEN, SealedEnvelope};
use crate::error::{CryptoError, Result};
use crate::keys::SymmetricKey;

/// Encrypt with AES-256-GCM under a fresh random 96-bit nonce.
///
/// The nonce is never derived or counted: clients write concurrently with no
/// shared ordering, so randomness is the only uniqueness source available.
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Result<SealedEnvelope> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    Ok(SealedEnvelope::new(nonce_bytes, ciphertext))
}

/// Decrypt and authenticate an envelope.
pub fn open(key: &SymmetricKey, envelope: &SealedEnvelope) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let nonce = Nonce::from_slice(&envelope.nonce);

    cipher
        .decrypt(nonce, envelope.ciphertext.as_slice())
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = SymmetricKey::generate();
        let message = b"Hello from the wave!";

        let envelope = seal(&key, message).unwrap();
        assert_ne!(&envelope.ciphertext[..message.len()], message);

        let decrypted = open(&key, &envelope).unwrap();
        assert_eq!(decrypted, message);
    }

    #[test]
    fn wrong_key_fails() {
        let key1 = SymmetricKey::generate();
        let key2 = SymmetricKey::generate();

        let envelope = seal(&key1, b"Secret message").unwrap();
        assert!(matches!(open(&key2, &envelope), Err(CryptoError::Authentication)));
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = SymmetricKey::generate();
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    proptest! {
        #[test]
        fn any_bit_flip_is_rejected(
            message in proptest::collection::vec(any::<u8>(), 0..64),
            flip in any::<usize>(),
            bit in 0u8..8,
        ) {
            let key = SymmetricKey::generate();
            let envelope = seal(&key, &message).unwrap();
            let mut wire = envelope.to_wire();
            let idx = flip % wire.len();
            wire[idx] ^= 1 << bit;

            let tampered = SealedEnvelope::from_wire(&wire).unwrap();
            prop_assert!(matches!(open(&key, &tampered), Err(CryptoError::Authentication)));
        }
    }
}
