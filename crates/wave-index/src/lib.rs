//! Server-side participation index.
//!
//! Membership lives in memory as a bidirectional map and at rest as one
//! sealed member list per conversation. Per-member metadata is sealed and
//! addressed by blinded keys. Without a configured key the index falls back
//! to the legacy plaintext tables.

pub mod adjacency;
pub mod config;
pub mod error;
pub mod index;
pub mod locks;
pub mod metadata;
pub mod migrate;

pub use config::{Deployment, IndexConfig};
pub use error::{IndexError, Result};
pub use index::{ParticipationIndex, SyncReport};
pub use migrate::MigrationReport;
