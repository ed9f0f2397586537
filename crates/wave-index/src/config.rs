use wave_crypto::SymmetricKey;

use crate::error::{IndexError, Result};

pub const PARTICIPATION_KEY_VAR: &str = "WAVE_PARTICIPATION_KEY";
pub const DEPLOYMENT_VAR: &str = "WAVE_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Production,
    Development,
}

impl Deployment {
    fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") | Some("production") | Some("prod") => Ok(Self::Production),
            Some("development") | Some("dev") => Ok(Self::Development),
            Some(other) => Err(IndexError::Config(format!("unknown {DEPLOYMENT_VAR} value '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// `None` means plaintext fallback: no confidentiality at rest.
    pub participation_key: Option<SymmetricKey>,
    pub deployment: Deployment,
}

impl IndexConfig {
    pub fn sealed(key: SymmetricKey) -> Self {
        Self {
            participation_key: Some(key),
            deployment: Deployment::Production,
        }
    }

    pub fn plaintext(deployment: Deployment) -> Self {
        Self {
            participation_key: None,
            deployment,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_values(
            std::env::var(PARTICIPATION_KEY_VAR).ok().as_deref(),
            std::env::var(DEPLOYMENT_VAR).ok().as_deref(),
        )
    }

    /// An absent or empty key selects plaintext mode; a malformed one is an
    /// error rather than a silent downgrade.
    pub fn from_values(key_hex: Option<&str>, deployment: Option<&str>) -> Result<Self> {
        let deployment = Deployment::parse(deployment)?;
        let participation_key = match key_hex.map(str::trim) {
            None | Some("") => None,
            Some(hex) => Some(SymmetricKey::from_hex(hex).map_err(|e| {
                IndexError::Config(format!("{PARTICIPATION_KEY_VAR} must be 64 hex chars: {e}"))
            })?),
        };
        Ok(Self {
            participation_key,
            deployment,
        })
    }
}
