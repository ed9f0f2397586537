//! Passphrase-protected key hierarchy.
//!
//! passphrase + salt --PBKDF2--> wrapping key --AES-GCM--> wrapped private key
//!
//! The recovery path is structurally identical with its own salt, so either
//! passphrase alone unlocks the identity and neither weakens the other.

use serde::{Deserialize, Serialize};

use crate::ecdh::Identity;
use crate::encrypt::{open, seal};
use crate::envelope::SealedEnvelope;
use crate::error::{CryptoError, Result};
use crate::kdf::{KdfParams, SALT_LEN, derive_wrapping_key, generate_salt};
use crate::keys::SymmetricKey;

/// A private key sealed under a passphrase-derived key, with everything needed
/// to re-derive that key except the passphrase itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub envelope: SealedEnvelope,
    #[serde(with = "hex::serde")]
    pub salt: [u8; SALT_LEN],
    pub kdf: KdfParams,
}

/// Everything about an identity that is safe to hand to the untrusted server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedIdentity {
    pub public_key: String,
    pub primary: WrappedKey,
    pub recovery: Option<WrappedKey>,
}

pub fn generate_identity() -> Identity {
    Identity::generate()
}

pub fn wrap_private_key(identity: &Identity, wrapping_key: &SymmetricKey) -> Result<SealedEnvelope> {
    let der = identity.to_pkcs8()?;
    seal(wrapping_key, &der)
}

/// Fails with [`CryptoError::Authentication`] on a wrong key or any tampering.
pub fn unwrap_private_key(envelope: &SealedEnvelope, wrapping_key: &SymmetricKey) -> Result<Identity> {
    let der = zeroize::Zeroizing::new(open(wrapping_key, envelope)?);
    Identity::from_pkcs8(&der)
}

fn wrap_with_passphrase(identity: &Identity, passphrase: &str, kdf: KdfParams) -> Result<WrappedKey> {
    let salt = generate_salt();
    let wrapping_key = derive_wrapping_key(passphrase, &salt, kdf)?;
    Ok(WrappedKey {
        envelope: wrap_private_key(identity, &wrapping_key)?,
        salt,
        kdf,
    })
}

fn unwrap_with_passphrase(wrapped: &WrappedKey, passphrase: &str) -> Result<Identity> {
    let wrapping_key = derive_wrapping_key(passphrase, &wrapped.salt, wrapped.kdf)?;
    unwrap_private_key(&wrapped.envelope, &wrapping_key)
}

/// Create a new identity protected by `passphrase`.
pub fn setup_identity(passphrase: &str, kdf: KdfParams) -> Result<(Identity, WrappedIdentity)> {
    let identity = generate_identity();
    let primary = wrap_with_passphrase(&identity, passphrase, kdf)?;
    let wrapped = WrappedIdentity {
        public_key: identity.public_base64(),
        primary,
        recovery: None,
    };
    Ok((identity, wrapped))
}

pub fn create_recovery_envelope(identity: &Identity, recovery_passphrase: &str, kdf: KdfParams) -> Result<WrappedKey> {
    wrap_with_passphrase(identity, recovery_passphrase, kdf)
}

pub fn recover_identity(recovery: &WrappedKey, recovery_passphrase: &str) -> Result<Identity> {
    unwrap_with_passphrase(recovery, recovery_passphrase)
}

/// Login-time check. Never a substitute for a real unwrap.
pub fn verify_passphrase(passphrase: &str, wrapped: &WrappedKey) -> bool {
    unwrap_with_passphrase(wrapped, passphrase).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    Locked,
    Unlocking,
    Unlocked,
}

/// Holds the wrapped identity and, only while unlocked, the private key.
pub struct KeyVault {
    wrapped: WrappedIdentity,
    state: VaultState,
    identity: Option<Identity>,
}

impl KeyVault {
    pub fn new(wrapped: WrappedIdentity) -> Self {
        Self {
            wrapped,
            state: VaultState::Locked,
            identity: None,
        }
    }

    /// Create an identity and return it already unlocked.
    pub fn create(passphrase: &str, kdf: KdfParams) -> Result<Self> {
        let (identity, wrapped) = setup_identity(passphrase, kdf)?;
        Ok(Self {
            wrapped,
            state: VaultState::Unlocked,
            identity: Some(identity),
        })
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn wrapped(&self) -> &WrappedIdentity {
        &self.wrapped
    }

    pub fn unlock(&mut self, passphrase: &str) -> Result<&Identity> {
        self.lock();
        self.state = VaultState::Unlocking;
        let outcome = unwrap_with_passphrase(&self.wrapped.primary, passphrase);
        self.finish_unlock(outcome)
    }

    /// Unlock with the recovery passphrase and re-wrap the primary path under
    /// `new_passphrase`.
    pub fn recover(&mut self, recovery_passphrase: &str, new_passphrase: &str) -> Result<&Identity> {
        self.lock();
        let recovery = self
            .wrapped
            .recovery
            .clone()
            .ok_or_else(|| CryptoError::MissingKeyMaterial("no recovery envelope".into()))?;

        self.state = VaultState::Unlocking;
        let kdf = self.wrapped.primary.kdf;
        let outcome = recover_identity(&recovery, recovery_passphrase).and_then(|identity| {
            let primary = wrap_with_passphrase(&identity, new_passphrase, kdf)?;
            Ok((identity, primary))
        });
        let outcome = outcome.map(|(identity, primary)| {
            self.wrapped.primary = primary;
            identity
        });
        self.finish_unlock(outcome)
    }

    fn finish_unlock(&mut self, outcome: Result<Identity>) -> Result<&Identity> {
        match outcome {
            Ok(identity) => {
                self.state = VaultState::Unlocked;
                Ok(self.identity.insert(identity))
            }
            Err(e) => {
                self.identity = None;
                self.state = VaultState::Locked;
                Err(e)
            }
        }
    }

    /// Drop the private key. Idempotent.
    pub fn lock(&mut self) {
        self.identity = None;
        self.state = VaultState::Locked;
    }

    pub fn identity(&self) -> Result<&Identity> {
        self.identity.as_ref().ok_or(CryptoError::Locked)
    }

    /// Re-wrap the primary path under a new passphrase and fresh salt.
    pub fn change_passphrase(&mut self, new_passphrase: &str) -> Result<()> {
        let identity = self.identity()?;
        let primary = wrap_with_passphrase(identity, new_passphrase, self.wrapped.primary.kdf)?;
        self.wrapped.primary = primary;
        Ok(())
    }

    pub fn set_recovery_passphrase(&mut self, recovery_passphrase: &str) -> Result<()> {
        let identity = self.identity()?;
        let recovery = create_recovery_envelope(identity, recovery_passphrase, self.wrapped.primary.kdf)?;
        self.wrapped.recovery = Some(recovery);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: KdfParams = KdfParams { iterations: 1_000 };

    #[test]
    fn wrap_unwrap_roundtrip() {
        let identity = generate_identity();
        let salt = generate_salt();
        let key = derive_wrapping_key("pass", &salt, FAST).unwrap();

        let envelope = wrap_private_key(&identity, &key).unwrap();
        let restored = unwrap_private_key(&envelope, &key).unwrap();
        assert_eq!(restored.public(), identity.public());
    }

    #[test]
    fn wrong_salt_is_authentication_failure() {
        let identity = generate_identity();
        let key = derive_wrapping_key("pass", &[1u8; SALT_LEN], FAST).unwrap();
        let other = derive_wrapping_key("pass", &[2u8; SALT_LEN], FAST).unwrap();

        let envelope = wrap_private_key(&identity, &key).unwrap();
        assert!(matches!(
            unwrap_private_key(&envelope, &other),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn tampered_envelope_is_authentication_failure() {
        let (_, wrapped) = setup_identity("pass", FAST).unwrap();
        let mut envelope = wrapped.primary.envelope.clone();
        envelope.ciphertext[0] ^= 0x01;
        let key = derive_wrapping_key("pass", &wrapped.primary.salt, FAST).unwrap();
        assert!(matches!(
            unwrap_private_key(&envelope, &key),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn verify_passphrase_reports_without_error() {
        let (_, wrapped) = setup_identity("pass", FAST).unwrap();
        assert!(verify_passphrase("pass", &wrapped.primary));
        assert!(!verify_passphrase("nope", &wrapped.primary));
    }

    #[test]
    fn recovery_path_is_independent() {
        let mut vault = KeyVault::create("primary", FAST).unwrap();
        vault.set_recovery_passphrase("recovery").unwrap();
        let public = vault.wrapped().public_key.clone();

        let wrapped = vault.wrapped().clone();
        let recovery = wrapped.recovery.as_ref().unwrap();
        assert_ne!(recovery.salt, wrapped.primary.salt);
        assert!(!verify_passphrase("recovery", &wrapped.primary));
        assert!(!verify_passphrase("primary", recovery));

        let restored = recover_identity(recovery, "recovery").unwrap();
        assert_eq!(restored.public_base64(), public);
    }

    #[test]
    fn vault_state_machine() {
        let vault = KeyVault::create("pass", FAST).unwrap();
        let mut vault = KeyVault::new(vault.wrapped().clone());
        assert_eq!(vault.state(), VaultState::Locked);
        assert!(matches!(vault.identity(), Err(CryptoError::Locked)));

        assert!(vault.unlock("wrong").is_err());
        assert_eq!(vault.state(), VaultState::Locked);
        assert!(vault.identity().is_err());

        vault.unlock("pass").unwrap();
        assert_eq!(vault.state(), VaultState::Unlocked);
        assert!(vault.identity().is_ok());

        vault.lock();
        assert_eq!(vault.state(), VaultState::Locked);
        assert!(vault.identity().is_err());
    }

    #[test]
    fn failed_unlock_clears_previous_key() {
        let mut vault = KeyVault::create("pass", FAST).unwrap();
        assert_eq!(vault.state(), VaultState::Unlocked);
        assert!(vault.unlock("wrong").is_err());
        assert!(vault.identity().is_err());
    }

    #[test]
    fn change_passphrase_keeps_identity() {
        let mut vault = KeyVault::create("old", FAST).unwrap();
        let public = vault.wrapped().public_key.clone();
        vault.change_passphrase("new").unwrap();
        vault.lock();

        assert!(vault.unlock("old").is_err());
        let identity = vault.unlock("new").unwrap();
        assert_eq!(identity.public_base64(), public);
    }

    #[test]
    fn recover_resets_primary_passphrase() {
        let mut vault = KeyVault::create("forgotten", FAST).unwrap();
        vault.set_recovery_passphrase("recovery").unwrap();
        let mut vault = KeyVault::new(vault.wrapped().clone());

        assert!(vault.recover("bad", "fresh").is_err());
        assert_eq!(vault.state(), VaultState::Locked);

        vault.recover("recovery", "fresh").unwrap();
        vault.lock();
        assert!(vault.unlock("forgotten").is_err());
        assert!(vault.unlock("fresh").is_ok());
    }

    #[test]
    fn recover_without_envelope_is_missing_key() {
        let vault = KeyVault::create("pass", FAST).unwrap();
        let mut vault = KeyVault::new(vault.wrapped().clone());
        assert!(matches!(
            vault.recover("anything", "new"),
            Err(CryptoError::MissingKeyMaterial(_))
        ));
    }

    #[test]
    fn wrapped_identity_json_roundtrip() {
        let mut vault = KeyVault::create("pass", FAST).unwrap();
        vault.set_recovery_passphrase("recovery").unwrap();

        let json = serde_json::to_string(vault.wrapped()).unwrap();
        assert!(json.contains(&hex::encode(vault.wrapped().primary.salt)));
        let decoded: WrappedIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(&decoded, vault.wrapped());

        let mut restored = KeyVault::new(decoded);
        assert!(restored.unlock("pass").is_ok());
    }
}
