//! Sealed envelope: the output of one AES-256-GCM operation.
//!
//! Two encodings exist:
//! - wire:    `[nonce(12)][ciphertext+tag]`, exchanged with the server and
//!   stored/forwarded opaquely.
//! - tagged:  `[version(1)][nonce(12)][ciphertext+tag]`, used for blobs the
//!   server seals for itself at rest.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, Result};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Algorithm identifier carried by tagged envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnvelopeVersion {
    AesGcmV1 = 1,
}

impl TryFrom<u8> for EnvelopeVersion {
    type Error = CryptoError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::AesGcmV1),
            other => Err(CryptoError::Malformed(format!("unknown envelope version {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub version: EnvelopeVersion,
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the 16-byte GCM tag appended.
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    pub fn new(nonce: [u8; NONCE_LEN], ciphertext: Vec<u8>) -> Self {
        Self {
            version: EnvelopeVersion::AesGcmV1,
            nonce,
            ciphertext,
        }
    }

    /// Build from separately transported nonce and ciphertext.
    pub fn from_parts(nonce: &[u8], ciphertext: Vec<u8>) -> Result<Self> {
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| CryptoError::Malformed(format!("nonce must be {NONCE_LEN} bytes")))?;
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::Malformed("ciphertext shorter than auth tag".into()));
        }
        Ok(Self::new(nonce, ciphertext))
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_wire(data: &[u8]) -> Result<Self> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Malformed("data too short for nonce and tag".into()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        Self::from_parts(nonce, ciphertext.to_vec())
    }

    pub fn to_tagged(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + NONCE_LEN + self.ciphertext.len());
        out.push(self.version as u8);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_tagged(data: &[u8]) -> Result<Self> {
        let (&tag, rest) = data
            .split_first()
            .ok_or_else(|| CryptoError::Malformed("empty envelope".into()))?;
        let version = EnvelopeVersion::try_from(tag)?;
        let mut envelope = Self::from_wire(rest)?;
        envelope.version = version;
        Ok(envelope)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_wire())
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::from_wire(&BASE64.decode(encoded)?)
    }

    pub fn nonce_base64(&self) -> String {
        BASE64.encode(self.nonce)
    }

    pub fn ciphertext_base64(&self) -> String {
        BASE64.encode(&self.ciphertext)
    }
}

/// Serialized as the base64 wire form, the shape clients hand to the server.
impl Serialize for SealedEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for SealedEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
