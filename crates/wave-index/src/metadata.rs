use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;
use wave_crypto::blind::blind_pair;
use wave_crypto::encrypt::{open, seal};
use wave_crypto::{SealedEnvelope, SymmetricKey};
use wave_db::models::MetadataRow;
use wave_types::models::MemberMetadata;

use crate::error::{IndexError, Result};
use crate::index::ParticipationIndex;

impl ParticipationIndex {
    /// Metadata for one pair. `None` if nothing was ever stored.
    ///
    /// In sealed mode the row is found only by recomputing the blinded key.
    pub fn get_metadata(&self, conversation_id: &str, member_id: &str) -> Result<Option<MemberMetadata>> {
        match &self.inner.key {
            Some(key) => {
                let key_id = blind_pair(key, conversation_id, member_id)?;
                self.inner
                    .db
                    .get_encrypted_metadata(&key_id)?
                    .map(|blob| unseal_metadata(key, conversation_id, &blob))
                    .transpose()
            }
            None => self
                .inner
                .db
                .get_legacy_metadata(conversation_id, member_id)?
                .map(|row| metadata_from_row(&row))
                .transpose(),
        }
    }

    /// Replace a participant's metadata.
    pub fn set_metadata(&self, conversation_id: &str, member_id: &str, metadata: &MemberMetadata) -> Result<()> {
        self.with_conversation(conversation_id, || -> Result<()> {
            self.ensure_participant(conversation_id, member_id)?;
            self.write_metadata_record(conversation_id, member_id, metadata)
        })
    }

    /// Read-modify-write under the conversation lock. Starts from the
    /// default when nothing is stored yet. Returns the stored value.
    pub fn update_metadata(
        &self,
        conversation_id: &str,
        member_id: &str,
        f: impl FnOnce(&mut MemberMetadata),
    ) -> Result<MemberMetadata> {
        self.with_conversation(conversation_id, || -> Result<MemberMetadata> {
            self.ensure_participant(conversation_id, member_id)?;
            let mut metadata = self.get_metadata(conversation_id, member_id)?.unwrap_or_default();
            f(&mut metadata);
            self.write_metadata_record(conversation_id, member_id, &metadata)?;
            Ok(metadata)
        })
    }

    pub fn delete_metadata(&self, conversation_id: &str, member_id: &str) -> Result<()> {
        self.with_conversation(conversation_id, || self.delete_metadata_record(conversation_id, member_id))
    }

    /// Every stored metadata record of one member, by conversation.
    ///
    /// Blinded keys cannot be reversed, so this walks the member's known
    /// conversations and recomputes each key.
    pub fn list_member_metadata(&self, member_id: &str) -> Result<Vec<(String, MemberMetadata)>> {
        let mut out = Vec::new();
        for conversation_id in self.get_user_conversations(member_id) {
            if let Some(metadata) = self.get_metadata(&conversation_id, member_id)? {
                out.push((conversation_id, metadata));
            }
        }
        Ok(out)
    }

    fn ensure_participant(&self, conversation_id: &str, member_id: &str) -> Result<()> {
        if self.is_participant(conversation_id, member_id) {
            Ok(())
        } else {
            Err(IndexError::NotParticipant {
                conversation_id: conversation_id.to_string(),
                member_id: member_id.to_string(),
            })
        }
    }

    /// Caller holds the conversation lock.
    pub(crate) fn write_metadata_record(
        &self,
        conversation_id: &str,
        member_id: &str,
        metadata: &MemberMetadata,
    ) -> Result<()> {
        match &self.inner.key {
            Some(key) => {
                let key_id = blind_pair(key, conversation_id, member_id)?;
                let blob = seal_metadata(key, conversation_id, metadata)?;
                self.inner.db.upsert_encrypted_metadata(&key_id, &blob)?;
            }
            None => {
                self.inner
                    .db
                    .upsert_legacy_metadata(&metadata_to_row(conversation_id, member_id, metadata))?;
            }
        }
        debug!(conversation_id, "metadata stored");
        Ok(())
    }

    /// Caller holds the conversation lock.
    pub(crate) fn delete_metadata_record(&self, conversation_id: &str, member_id: &str) -> Result<()> {
        if let Some(key) = &self.inner.key {
            let key_id = blind_pair(key, conversation_id, member_id)?;
            self.inner.db.delete_encrypted_metadata(&key_id)?;
        }
        // A leftover plaintext row would be re-sealed by the next migration.
        self.inner.db.delete_legacy_metadata(conversation_id, member_id)?;
        Ok(())
    }
}

pub(crate) fn seal_metadata(key: &SymmetricKey, conversation_id: &str, metadata: &MemberMetadata) -> Result<Vec<u8>> {
    let plaintext = serde_json::to_vec(metadata).map_err(|e| IndexError::Corrupt {
        conversation_id: conversation_id.to_string(),
        reason: e.to_string(),
    })?;
    Ok(seal(key, &plaintext)?.to_tagged())
}

fn unseal_metadata(key: &SymmetricKey, conversation_id: &str, blob: &[u8]) -> Result<MemberMetadata> {
    let corrupt = |reason: String| IndexError::Corrupt {
        conversation_id: conversation_id.to_string(),
        reason,
    };
    let envelope = SealedEnvelope::from_tagged(blob).map_err(|e| corrupt(e.to_string()))?;
    let plaintext = open(key, &envelope).map_err(|e| corrupt(e.to_string()))?;
    serde_json::from_slice(&plaintext).map_err(|e| corrupt(e.to_string()))
}

pub(crate) fn metadata_from_row(row: &MetadataRow) -> Result<MemberMetadata> {
    let last_read = row
        .last_read
        .as_deref()
        .map(|raw| {
            parse_timestamp(raw).ok_or_else(|| IndexError::Corrupt {
                conversation_id: row.conversation_id.clone(),
                reason: format!("unreadable last_read '{raw}'"),
            })
        })
        .transpose()?;

    Ok(MemberMetadata {
        archived: row.archived,
        pinned: row.pinned,
        hidden: row.hidden,
        last_read,
        category: row.category.clone(),
    })
}

fn metadata_to_row(conversation_id: &str, member_id: &str, metadata: &MemberMetadata) -> MetadataRow {
    MetadataRow {
        conversation_id: conversation_id.to_string(),
        member_id: member_id.to_string(),
        archived: metadata.archived,
        pinned: metadata.pinned,
        hidden: metadata.hidden,
        last_read: metadata.last_read.map(|t| t.to_rfc3339()),
        category: metadata.category.clone(),
    }
}

/// RFC 3339, or SQLite's `datetime('now')` form taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|t| t.and_utc())
}
