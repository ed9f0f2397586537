//! Wave Crypto Library
//!
//! Everything here works on keys and sealed envelopes; nothing touches the
//! network or storage.
//!
//! Client side (feature `client`):
//! - passphrase -> PBKDF2 -> wrapping key -> wrapped P-384 identity
//! - per-wave AES-256-GCM keys fanned out over pairwise ECDH
//! - a bounded cache of unwrapped wave keys
//!
//! Without `client` only the primitives remain: at-rest sealing and HMAC
//! blinding, which is all the server needs.

pub mod blind;
pub mod encrypt;
pub mod envelope;
pub mod error;
pub mod keys;

#[cfg(feature = "client")]
pub mod cache;
#[cfg(feature = "client")]
pub mod distribute;
#[cfg(feature = "client")]
pub mod ecdh;
#[cfg(feature = "client")]
pub mod identity;
#[cfg(feature = "client")]
pub mod kdf;

pub use envelope::SealedEnvelope;
pub use error::CryptoError;
pub use keys::SymmetricKey;
