//! ECDH P-384 identities.
//!
//! Public keys travel as base64 SEC1 uncompressed points (97 bytes). Private
//! keys are serialized as PKCS#8 DER only to be wrapped, never in the clear.

use aes_gcm::aead::OsRng;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use p384::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use p384::{PublicKey, SecretKey};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::keys::{KEY_LEN, SymmetricKey};

/// A user's long-term keypair, resident only while the vault is unlocked.
#[derive(Clone)]
pub struct Identity {
    secret: SecretKey,
    public: PublicKey,
}

impl Identity {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn public_base64(&self) -> String {
        export_public(&self.public)
    }

    pub fn to_pkcs8(&self) -> Result<Zeroizing<Vec<u8>>> {
        let der = self
            .secret
            .to_pkcs8_der()
            .map_err(|e| CryptoError::InvalidKey(format!("PKCS#8 export failed: {e}")))?;
        Ok(Zeroizing::new(der.as_bytes().to_vec()))
    }

    pub fn from_pkcs8(der: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_pkcs8_der(der)
            .map_err(|_| CryptoError::InvalidKey("not a P-384 PKCS#8 private key".into()))?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public_base64())
            .finish_non_exhaustive()
    }
}

pub fn export_public(public: &PublicKey) -> String {
    BASE64.encode(public.to_sec1_bytes())
}

pub fn import_public(encoded: &str) -> Result<PublicKey> {
    let bytes = BASE64.decode(encoded)?;
    PublicKey::from_sec1_bytes(&bytes)
        .map_err(|_| CryptoError::InvalidKey("not a P-384 public point".into()))
}

/// ECDH shared secret used directly as an AES-256-GCM key.
///
/// Takes the first 256 bits of the shared x-coordinate, the same truncation
/// WebCrypto applies for `deriveKey(ECDH -> AES-GCM-256)`. There is no KDF and
/// no context binding; each pairing secret only ever wraps key blobs.
pub fn derive_shared(my_secret: &SecretKey, their_public: &PublicKey) -> SymmetricKey {
    let shared = p384::ecdh::diffie_hellman(my_secret.to_nonzero_scalar(), their_public.as_affine());
    let raw = shared.raw_secret_bytes();
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&raw[..KEY_LEN]);
    SymmetricKey::from_bytes(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_is_symmetric() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let ab = derive_shared(alice.secret(), bob.public());
        let ba = derive_shared(bob.secret(), alice.public());
        assert_eq!(ab, ba);

        let carol = Identity::generate();
        assert_ne!(ab, derive_shared(alice.secret(), carol.public()));
    }

    #[test]
    fn public_export_roundtrip() {
        let id = Identity::generate();
        let encoded = id.public_base64();
        assert_eq!(BASE64.decode(&encoded).unwrap().len(), 97);
        assert_eq!(&import_public(&encoded).unwrap(), id.public());
    }

    #[test]
    fn pkcs8_roundtrip_preserves_keypair() {
        let id = Identity::generate();
        let der = id.to_pkcs8().unwrap();
        let restored = Identity::from_pkcs8(&der).unwrap();
        assert_eq!(restored.public(), id.public());
    }

    #[test]
    fn garbage_public_key_rejected() {
        let encoded = BASE64.encode([4u8; 97]);
        assert!(matches!(import_public(&encoded), Err(CryptoError::InvalidKey(_))));
    }
}
