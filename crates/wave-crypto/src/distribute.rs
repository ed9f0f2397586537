//! Wave key generation and pairwise fan-out.
//!
//! A wave key reaches each participant as
//! `seal(ECDH(sender_secret, recipient_public), wave_key)`; the recipient
//! recomputes the same pairing secret from its own secret and the sender's
//! public key. Any member can admit another, there is no owner key.

use p384::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cache::{CacheKey, WaveKeyCache};
use crate::ecdh::{Identity, derive_shared, import_public};
use crate::encrypt::{open, seal};
use crate::envelope::SealedEnvelope;
use crate::error::{CryptoError, Result};
use crate::keys::SymmetricKey;

pub const INITIAL_VERSION: u32 = 1;

/// An unwrapped wave key and the version it was distributed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveKey {
    key: SymmetricKey,
    version: u32,
}

impl WaveKey {
    pub fn new(key: SymmetricKey, version: u32) -> Self {
        Self { key, version }
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

/// A conversation member as supplied by the membership service.
#[derive(Debug, Clone)]
pub struct Participant {
    pub member_id: String,
    /// Base64 SEC1 public key, `None` if the member never published one.
    pub public_key: Option<String>,
}

impl Participant {
    pub fn new(member_id: impl Into<String>, public_key: Option<String>) -> Self {
        Self {
            member_id: member_id.into(),
            public_key,
        }
    }
}

/// One recipient's copy of a wave key, as uploaded to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedWaveKey {
    pub recipient_id: String,
    pub sender_public_key: String,
    pub version: u32,
    pub envelope: SealedEnvelope,
}

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("recipient has no published public key")]
    MissingPublicKey,

    #[error("recipient public key is unusable: {0}")]
    InvalidPublicKey(String),

    #[error("sealing failed: {0}")]
    Sealing(String),
}

#[derive(Debug)]
pub struct RecipientOutcome {
    pub member_id: String,
    pub outcome: std::result::Result<SealedWaveKey, DistributionError>,
}

/// Result of a fan-out. Individual recipients may fail without failing the batch.
#[derive(Debug)]
pub struct Distribution {
    pub wave_key: WaveKey,
    pub records: Vec<RecipientOutcome>,
}

impl Distribution {
    pub fn delivered(&self) -> impl Iterator<Item = &SealedWaveKey> {
        self.records.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DistributionError)> {
        self.records
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.member_id.as_str(), e)))
    }

    pub fn sealed_for(&self, member_id: &str) -> Option<&SealedWaveKey> {
        self.delivered().find(|s| s.recipient_id == member_id)
    }
}

/// Content sealed under one specific wave key version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedContent {
    pub version: u32,
    pub envelope: SealedEnvelope,
}

pub fn create_wave_key() -> SymmetricKey {
    SymmetricKey::generate()
}

pub fn seal_wave_key_for(
    wave_key: &SymmetricKey,
    recipient_public: &PublicKey,
    sender_secret: &SecretKey,
) -> Result<SealedEnvelope> {
    let pairing = derive_shared(sender_secret, recipient_public);
    seal(&pairing, wave_key.as_bytes())
}

/// Fails with [`CryptoError::Authentication`] on tampering or a key mismatch.
pub fn open_wave_key_from(
    envelope: &SealedEnvelope,
    sender_public: &PublicKey,
    recipient_secret: &SecretKey,
) -> Result<SymmetricKey> {
    let pairing = derive_shared(recipient_secret, sender_public);
    let raw = zeroize::Zeroizing::new(open(&pairing, envelope)?);
    SymmetricKey::from_slice(&raw)
}

/// Open a sealed copy addressed to `recipient`.
pub fn open_sealed_wave_key(sealed: &SealedWaveKey, recipient: &Identity) -> Result<WaveKey> {
    let sender_public = import_public(&sealed.sender_public_key)?;
    let key = open_wave_key_from(&sealed.envelope, &sender_public, recipient.secret())?;
    Ok(WaveKey::new(key, sealed.version))
}

fn seal_for_participant(
    wave_key: &WaveKey,
    participant: &Participant,
    sender: &Identity,
) -> std::result::Result<SealedWaveKey, DistributionError> {
    let encoded = participant
        .public_key
        .as_deref()
        .ok_or(DistributionError::MissingPublicKey)?;
    let recipient_public =
        import_public(encoded).map_err(|e| DistributionError::InvalidPublicKey(e.to_string()))?;
    let envelope = seal_wave_key_for(wave_key.key(), &recipient_public, sender.secret())
        .map_err(|e| DistributionError::Sealing(e.to_string()))?;

    Ok(SealedWaveKey {
        recipient_id: participant.member_id.clone(),
        sender_public_key: sender.public_base64(),
        version: wave_key.version(),
        envelope,
    })
}

fn fan_out(wave_key: WaveKey, participants: &[Participant], sender: &Identity) -> Distribution {
    let records = participants
        .iter()
        .map(|participant| {
            let outcome = seal_for_participant(&wave_key, participant, sender);
            if let Err(e) = &outcome {
                warn!(member_id = %participant.member_id, "wave key not sealed for recipient: {}", e);
            }
            RecipientOutcome {
                member_id: participant.member_id.clone(),
                outcome,
            }
        })
        .collect();

    Distribution { wave_key, records }
}

/// Generate a wave key and seal it for every participant.
pub fn distribute_new_wave(participants: &[Participant], creator: &Identity) -> Distribution {
    let wave_key = WaveKey::new(create_wave_key(), INITIAL_VERSION);
    fan_out(wave_key, participants, creator)
}

/// Admit a new member under the current key, sealed by any existing member.
pub fn add_participant(
    wave_key: &WaveKey,
    participant: &Participant,
    admitter: &Identity,
) -> std::result::Result<SealedWaveKey, DistributionError> {
    seal_for_participant(wave_key, participant, admitter)
}

/// Replace the wave's key for the given (current) membership.
///
/// The cache keeps `current` reachable by version for historical content but
/// no longer returns it as the wave's current key.
pub fn rotate_wave_key(
    wave_id: &str,
    current: &WaveKey,
    participants: &[Participant],
    rotator: &Identity,
    cache: &mut WaveKeyCache,
) -> Distribution {
    let next = WaveKey::new(create_wave_key(), current.version() + 1);
    let distribution = fan_out(next, participants, rotator);

    cache.invalidate(&CacheKey::Current(wave_id.to_string()));
    cache.insert(CacheKey::Version(wave_id.to_string(), current.version()), current.clone());
    cache.store_current(wave_id, distribution.wave_key.clone());

    distribution
}

pub fn seal_content(plaintext: &[u8], wave_key: &WaveKey) -> Result<SealedContent> {
    Ok(SealedContent {
        version: wave_key.version(),
        envelope: seal(wave_key.key(), plaintext)?,
    })
}

pub fn open_content(sealed: &SealedContent, wave_key: &WaveKey) -> Result<Vec<u8>> {
    if sealed.version != wave_key.version() {
        return Err(CryptoError::MissingKeyMaterial(format!(
            "content sealed under version {}, key is version {}",
            sealed.version,
            wave_key.version()
        )));
    }
    open(wave_key.key(), &sealed.envelope)
}

/// Decrypt using whatever the cache holds for the content's version.
pub fn open_cached_content(cache: &WaveKeyCache, wave_id: &str, sealed: &SealedContent) -> Result<Vec<u8>> {
    let wave_key = cache
        .version(wave_id, sealed.version)
        .or_else(|| cache.current(wave_id).filter(|k| k.version() == sealed.version))
        .ok_or_else(|| {
            CryptoError::MissingKeyMaterial(format!("wave {wave_id} key version {} not found", sealed.version))
        })?;
    open_content(sealed, wave_key)
}
