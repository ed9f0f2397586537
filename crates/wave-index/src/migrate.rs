use tracing::info;
use wave_crypto::SymmetricKey;
use wave_crypto::blind::blind_pair;

use crate::error::{IndexError, Result};
use crate::index::ParticipationIndex;
use crate::metadata::{metadata_from_row, seal_metadata};

/// Rows touched by each step of a full migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub participants: usize,
    pub key_ids: usize,
    pub metadata: usize,
}

impl MigrationReport {
    pub fn total(&self) -> usize {
        self.participants + self.key_ids + self.metadata
    }
}

/// Key id used by stores written before blinding.
fn legacy_key_id(conversation_id: &str, member_id: &str) -> String {
    format!("{conversation_id}:{member_id}")
}

impl ParticipationIndex {
    fn require_key(&self) -> Result<&SymmetricKey> {
        self.inner
            .key
            .as_ref()
            .ok_or_else(|| IndexError::Config("migration requires a participation key".into()))
    }

    /// Fold every legacy conversation into memory and re-seal its full list.
    ///
    /// Runs are merges, so members who joined through the index before the
    /// migration are kept. Leaves delete the legacy row, which keeps a re-run
    /// from bringing departed members back. Returns the number of legacy
    /// rows that were not yet in the index.
    pub fn migrate_participants_to_encrypted(&self) -> Result<usize> {
        let key = self.require_key()?;
        let mut migrated = 0;

        for (conversation_id, legacy_members) in self.legacy_rows_by_conversation()? {
            migrated += self.with_conversation(&conversation_id, || -> Result<usize> {
                let (merged, members) = {
                    let mut adjacency = self.write_adjacency();
                    let mut merged = 0;
                    for member_id in &legacy_members {
                        if adjacency.insert(&conversation_id, member_id) {
                            merged += 1;
                        }
                    }
                    (merged, adjacency.sorted_members(&conversation_id))
                };
                self.persist_members(key, &conversation_id, members)?;
                Ok(merged)
            })?;
        }

        info!("Migrated {migrated} participant rows to sealed storage");
        Ok(migrated)
    }

    /// Seal legacy plaintext metadata under blinded keys.
    ///
    /// Pairs that already have a sealed record are skipped: that record is
    /// at least as new as the plaintext row.
    pub fn migrate_metadata_to_encrypted(&self) -> Result<usize> {
        let key = self.require_key()?;
        let mut migrated = 0;

        for row in self.inner.db.all_legacy_metadata()? {
            let written = self.with_conversation(&row.conversation_id, || -> Result<bool> {
                let key_id = blind_pair(key, &row.conversation_id, &row.member_id)?;
                if self.inner.db.get_encrypted_metadata(&key_id)?.is_some() {
                    return Ok(false);
                }
                let metadata = metadata_from_row(&row)?;
                let blob = seal_metadata(key, &row.conversation_id, &metadata)?;
                self.inner.db.upsert_encrypted_metadata(&key_id, &blob)?;
                Ok(true)
            })?;
            if written {
                migrated += 1;
            }
        }

        info!("Migrated {migrated} metadata rows to sealed storage");
        Ok(migrated)
    }

    /// Move sealed metadata from `conversation:member` ids to blinded ids.
    ///
    /// Legacy ids cannot be listed by owner, so this walks the known pairs
    /// and checks each one. Blobs move byte for byte.
    pub fn migrate_key_ids_to_blinded(&self) -> Result<usize> {
        let key = self.require_key()?;
        let pairs: Vec<(String, String)> = self
            .read_adjacency()
            .pairs()
            .map(|(c, m)| (c.to_string(), m.to_string()))
            .collect();

        let mut migrated = 0;
        for (conversation_id, member_id) in pairs {
            let moved = self.with_conversation(&conversation_id, || -> Result<bool> {
                let blinded = blind_pair(key, &conversation_id, &member_id)?;
                Ok(self
                    .inner
                    .db
                    .rekey_encrypted_metadata(&legacy_key_id(&conversation_id, &member_id), &blinded)?)
            })?;
            if moved {
                migrated += 1;
            }
        }

        info!("Re-keyed {migrated} metadata rows to blinded ids");
        Ok(migrated)
    }

    /// Participants first so the pair walk sees every legacy conversation,
    /// then key ids, then plaintext metadata for whatever is still missing.
    pub fn run_all_migrations(&self) -> Result<MigrationReport> {
        let participants = self.migrate_participants_to_encrypted()?;
        let key_ids = self.migrate_key_ids_to_blinded()?;
        let metadata = self.migrate_metadata_to_encrypted()?;
        Ok(MigrationReport {
            participants,
            key_ids,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wave_db::Database;
    use wave_db::models::MetadataRow;

    use super::*;
    use crate::config::{Deployment, IndexConfig};
    use wave_types::models::MemberMetadata;

    fn legacy_db() -> Arc<Database> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_participant_row("c1", "alice").unwrap();
        db.insert_participant_row("c1", "bob").unwrap();
        db.insert_participant_row("c2", "bob").unwrap();
        db.upsert_legacy_metadata(&MetadataRow {
            conversation_id: "c1".into(),
            member_id: "alice".into(),
            archived: true,
            ..Default::default()
        })
        .unwrap();
        db
    }

    #[test]
    fn plaintext_index_refuses_to_migrate() {
        let db = legacy_db();
        let index = ParticipationIndex::open(db, IndexConfig::plaintext(Deployment::Development)).unwrap();
        assert!(matches!(index.run_all_migrations(), Err(IndexError::Config(_))));
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = legacy_db();
        let index = ParticipationIndex::open(db.clone(), IndexConfig::sealed(SymmetricKey::generate())).unwrap();
        assert_eq!(index.conversation_count(), 0);

        let first = index.run_all_migrations().unwrap();
        assert_eq!(first, MigrationReport { participants: 3, key_ids: 0, metadata: 1 });
        assert_eq!(index.sorted_participants("c1"), vec!["alice", "bob"]);
        assert!(index.get_metadata("c1", "alice").unwrap().unwrap().archived);

        let second = index.run_all_migrations().unwrap();
        assert_eq!(second.total(), 0);
        assert_eq!(db.all_participation_blobs().unwrap().len(), 2);
    }

    #[test]
    fn rerun_does_not_resurrect_departed_members() {
        let db = legacy_db();
        let index = ParticipationIndex::open(db, IndexConfig::sealed(SymmetricKey::generate())).unwrap();
        index.migrate_participants_to_encrypted().unwrap();
        index.remove_participant("c1", "bob").unwrap();

        index.migrate_participants_to_encrypted().unwrap();
        assert_eq!(index.sorted_participants("c1"), vec!["alice"]);
    }

    #[test]
    fn join_before_migration_keeps_legacy_members() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_participant_row("c1", "alice").unwrap();
        db.insert_participant_row("c1", "bob").unwrap();
        let key = SymmetricKey::generate();
        let index = ParticipationIndex::open(db.clone(), IndexConfig::sealed(key.clone())).unwrap();

        index.add_participant("c1", "carol").unwrap();
        assert_eq!(index.migrate_participants_to_encrypted().unwrap(), 2);
        assert_eq!(index.sorted_participants("c1"), vec!["alice", "bob", "carol"]);

        let reloaded = ParticipationIndex::open(db, IndexConfig::sealed(key)).unwrap();
        assert_eq!(reloaded.sorted_participants("c1"), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn emptied_conversation_stays_empty_after_rerun() {
        let db = legacy_db();
        let index = ParticipationIndex::open(db, IndexConfig::sealed(SymmetricKey::generate())).unwrap();
        index.run_all_migrations().unwrap();
        index.remove_participant("c2", "bob").unwrap();
        index.remove_participant("c1", "alice").unwrap();

        let rerun = index.run_all_migrations().unwrap();
        assert_eq!(rerun.total(), 0);
        assert!(index.sorted_participants("c2").is_empty());
        assert_eq!(index.sorted_participants("c1"), vec!["bob"]);
        assert_eq!(index.get_metadata("c1", "alice").unwrap(), None);
    }

    #[test]
    fn legacy_key_ids_move_verbatim() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let key = SymmetricKey::generate();
        let index = ParticipationIndex::open(db.clone(), IndexConfig::sealed(key.clone())).unwrap();
        index.add_participant("c1", "alice").unwrap();

        let metadata = MemberMetadata {
            pinned: true,
            ..Default::default()
        };
        let blob = seal_metadata(&key, "c1", &metadata).unwrap();
        db.upsert_encrypted_metadata("c1:alice", &blob).unwrap();

        assert_eq!(index.migrate_key_ids_to_blinded().unwrap(), 1);
        assert_eq!(index.migrate_key_ids_to_blinded().unwrap(), 0);

        let blinded = blind_pair(&key, "c1", "alice").unwrap();
        assert_eq!(db.get_encrypted_metadata(&blinded).unwrap(), Some(blob));
        assert_eq!(index.get_metadata("c1", "alice").unwrap(), Some(metadata));
    }

    #[test]
    fn sealed_metadata_wins_over_plaintext_row() {
        let db = legacy_db();
        let index = ParticipationIndex::open(db, IndexConfig::sealed(SymmetricKey::generate())).unwrap();
        index.migrate_participants_to_encrypted().unwrap();
        index.update_metadata("c1", "alice", |m| m.archived = false).unwrap();

        assert_eq!(index.migrate_metadata_to_encrypted().unwrap(), 0);
        assert!(!index.get_metadata("c1", "alice").unwrap().unwrap().archived);
    }
}
