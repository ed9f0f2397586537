use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wave_crypto::encrypt::{open, seal};
use wave_crypto::{SealedEnvelope, SymmetricKey};
use wave_db::Database;

use crate::adjacency::Adjacency;
use crate::config::{Deployment, IndexConfig};
use crate::error::{IndexError, Result};
use crate::locks::{ConversationLocks, acquire};

/// Plaintext of one sealed participation blob.
///
/// Carries its own conversation id so a blob copied onto another row is
/// detected at load instead of silently granting membership.
#[derive(Debug, Serialize, Deserialize)]
struct MemberList {
    conversation_id: String,
    members: Vec<String>,
}

/// Delta applied by a resync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub conversation_id: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The server's membership graph.
///
/// Reads are served from memory only. Every mutation updates memory, then
/// re-seals the conversation's full member list and upserts it, all under
/// that conversation's lock. Cloning shares the same index.
#[derive(Clone)]
pub struct ParticipationIndex {
    pub(crate) inner: Arc<IndexInner>,
}

pub(crate) struct IndexInner {
    pub(crate) db: Arc<Database>,
    /// `None`: plaintext fallback, the legacy tables are the store.
    pub(crate) key: Option<SymmetricKey>,
    pub(crate) adjacency: RwLock<Adjacency>,
    pub(crate) locks: ConversationLocks,
}

impl ParticipationIndex {
    /// Build the index and load it from durable storage.
    pub fn open(db: Arc<Database>, config: IndexConfig) -> Result<Self> {
        match (&config.participation_key, config.deployment) {
            (Some(_), _) => info!("Participation index sealing data at rest"),
            (None, Deployment::Production) => warn!(
                "No participation encryption key configured; membership and metadata are stored in plaintext"
            ),
            (None, Deployment::Development) => {
                info!("No participation encryption key configured; using plaintext storage (development)")
            }
        }

        let index = Self {
            inner: Arc::new(IndexInner {
                db,
                key: config.participation_key,
                adjacency: RwLock::new(Adjacency::new()),
                locks: ConversationLocks::new(),
            }),
        };
        index.load()?;
        Ok(index)
    }

    fn load(&self) -> Result<()> {
        let mut loaded = Adjacency::new();

        match &self.inner.key {
            Some(key) => {
                for row in self.inner.db.all_participation_blobs()? {
                    let list = unseal_member_list(key, &row.conversation_id, &row.blob)?;
                    for member_id in &list.members {
                        loaded.insert(&row.conversation_id, member_id);
                    }
                }
            }
            None => {
                for row in self.inner.db.all_participant_rows()? {
                    loaded.insert(&row.conversation_id, &row.member_id);
                }
            }
        }

        info!("Participation index loaded {} conversations", loaded.conversation_count());
        *self.write_adjacency() = loaded;
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.inner.key.is_some()
    }

    pub(crate) fn read_adjacency(&self) -> RwLockReadGuard<'_, Adjacency> {
        self.inner.adjacency.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_adjacency(&self) -> RwLockWriteGuard<'_, Adjacency> {
        self.inner.adjacency.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside the conversation's critical section. The mutex is
    /// forgotten afterwards unless another caller still holds it.
    pub(crate) fn with_conversation<T>(&self, conversation_id: &str, f: impl FnOnce() -> T) -> T {
        let handle = self.inner.locks.handle(conversation_id);
        let out = {
            let _guard = acquire(&handle);
            f()
        };
        drop(handle);
        self.inner.locks.release(conversation_id);
        out
    }

    // -- Reads (hot path) --

    pub fn is_participant(&self, conversation_id: &str, member_id: &str) -> bool {
        self.read_adjacency().contains(conversation_id, member_id)
    }

    /// Borrow the member set without copying it. `None` for an unknown
    /// conversation. The read lock is held while `f` runs.
    pub fn with_participants<R>(&self, conversation_id: &str, f: impl FnOnce(Option<&HashSet<String>>) -> R) -> R {
        f(self.read_adjacency().members_of(conversation_id))
    }

    /// Unordered copy of the member set.
    pub fn get_participants(&self, conversation_id: &str) -> Vec<String> {
        self.with_participants(conversation_id, |members| {
            members.map(|m| m.iter().cloned().collect::<Vec<_>>()).unwrap_or_default()
        })
    }

    pub fn sorted_participants(&self, conversation_id: &str) -> Vec<String> {
        self.read_adjacency().sorted_members(conversation_id)
    }

    pub fn participant_count(&self, conversation_id: &str) -> usize {
        self.read_adjacency().members_of(conversation_id).map_or(0, |m| m.len())
    }

    pub fn get_user_conversations(&self, member_id: &str) -> Vec<String> {
        self.read_adjacency().sorted_conversations(member_id)
    }

    pub fn conversation_count(&self) -> usize {
        self.read_adjacency().conversation_count()
    }

    // -- Mutations --

    /// Returns true if the member was newly added. The member list is
    /// persisted either way so a retry repairs an earlier failed write.
    pub fn add_participant(&self, conversation_id: &str, member_id: &str) -> Result<bool> {
        self.with_conversation(conversation_id, || -> Result<bool> {
            let (added, members) = {
                let mut adjacency = self.write_adjacency();
                let added = adjacency.insert(conversation_id, member_id);
                (added, adjacency.sorted_members(conversation_id))
            };
            debug!(conversation_id, member_id, added, "participant added");

            match &self.inner.key {
                Some(key) => {
                    self.persist_members(key, conversation_id, members)?;
                    // Mirror joins while legacy rows remain, so migration and
                    // resync see them.
                    if self.inner.db.has_participant_rows(conversation_id)? {
                        self.inner.db.insert_participant_row(conversation_id, member_id)?;
                    }
                }
                None => self.inner.db.insert_participant_row(conversation_id, member_id)?,
            }
            Ok(added)
        })
    }

    /// Returns true if the member was present. Their metadata for this
    /// conversation is deleted with them.
    pub fn remove_participant(&self, conversation_id: &str, member_id: &str) -> Result<bool> {
        self.with_conversation(conversation_id, || -> Result<bool> {
            let (removed, members) = {
                let mut adjacency = self.write_adjacency();
                let removed = adjacency.remove(conversation_id, member_id);
                (removed, adjacency.sorted_members(conversation_id))
            };
            debug!(conversation_id, member_id, removed, "participant removed");

            if let Some(key) = &self.inner.key {
                self.persist_members(key, conversation_id, members)?;
            }
            self.inner.db.delete_participant_row(conversation_id, member_id)?;
            self.delete_metadata_record(conversation_id, member_id)?;
            Ok(removed)
        })
    }

    /// Bulk delete: every member, the sealed list and all their metadata.
    /// Returns the former members.
    pub fn remove_conversation(&self, conversation_id: &str) -> Result<Vec<String>> {
        let members = self.with_conversation(conversation_id, || -> Result<Vec<String>> {
            let members = self.write_adjacency().remove_conversation(conversation_id);

            if self.inner.key.is_some() {
                self.inner.db.delete_participation_blob(conversation_id)?;
            }
            self.inner.db.delete_conversation_rows(conversation_id)?;
            for member_id in &members {
                self.delete_metadata_record(conversation_id, member_id)?;
            }
            Ok(members)
        })?;

        info!(conversation_id, members = members.len(), "conversation removed");
        Ok(members)
    }

    /// Reconcile one conversation against the legacy plaintext table.
    ///
    /// Applies only the difference, under one write lock, so readers never
    /// observe an empty intermediate state. In sealed mode a conversation
    /// with no legacy rows has been cut over and is left untouched.
    pub fn sync_from_store(&self, conversation_id: &str) -> Result<SyncReport> {
        self.with_conversation(conversation_id, || -> Result<SyncReport> {
            let stored: BTreeSet<String> = self.inner.db.participant_rows_for(conversation_id)?.into_iter().collect();
            if stored.is_empty() && self.inner.key.is_some() {
                debug!(conversation_id, "no legacy rows, resync skipped");
                return Ok(SyncReport {
                    conversation_id: conversation_id.to_string(),
                    ..SyncReport::default()
                });
            }

            let (report, members) = {
                let mut adjacency = self.write_adjacency();
                let current: BTreeSet<String> = adjacency.sorted_members(conversation_id).into_iter().collect();

                let added: Vec<String> = stored.difference(&current).cloned().collect();
                let removed: Vec<String> = current.difference(&stored).cloned().collect();
                for member_id in &added {
                    adjacency.insert(conversation_id, member_id);
                }
                for member_id in &removed {
                    adjacency.remove(conversation_id, member_id);
                }

                let report = SyncReport {
                    conversation_id: conversation_id.to_string(),
                    added,
                    removed,
                };
                (report, adjacency.sorted_members(conversation_id))
            };

            if !report.is_empty() {
                info!(
                    conversation_id,
                    added = report.added.len(),
                    removed = report.removed.len(),
                    "participation resynced from store"
                );
                if let Some(key) = &self.inner.key {
                    self.persist_members(key, conversation_id, members)?;
                }
            }
            Ok(report)
        })
    }

    /// Resync every conversation known to either memory or the legacy table.
    /// Returns only the reports that changed something.
    pub fn sync_all_from_store(&self) -> Result<Vec<SyncReport>> {
        let mut conversation_ids: BTreeSet<String> = self
            .inner
            .db
            .all_participant_rows()?
            .into_iter()
            .map(|row| row.conversation_id)
            .collect();
        conversation_ids.extend(self.read_adjacency().conversation_ids().cloned());

        let mut reports = Vec::new();
        for conversation_id in conversation_ids {
            let report = self.sync_from_store(&conversation_id)?;
            if !report.is_empty() {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Seal and upsert the full member list, or drop the row once empty.
    pub(crate) fn persist_members(&self, key: &SymmetricKey, conversation_id: &str, members: Vec<String>) -> Result<()> {
        if members.is_empty() {
            self.inner.db.delete_participation_blob(conversation_id)?;
            return Ok(());
        }

        let list = MemberList {
            conversation_id: conversation_id.to_string(),
            members,
        };
        let plaintext = serde_json::to_vec(&list).map_err(|e| IndexError::Corrupt {
            conversation_id: conversation_id.to_string(),
            reason: e.to_string(),
        })?;
        let envelope = seal(key, &plaintext)?;
        self.inner.db.upsert_participation_blob(conversation_id, &envelope.to_tagged())?;
        Ok(())
    }

    /// Group legacy rows by conversation.
    pub(crate) fn legacy_rows_by_conversation(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for row in self.inner.db.all_participant_rows()? {
            grouped.entry(row.conversation_id).or_default().push(row.member_id);
        }
        Ok(grouped)
    }
}

fn unseal_member_list(key: &SymmetricKey, conversation_id: &str, blob: &[u8]) -> Result<MemberList> {
    let corrupt = |reason: String| IndexError::Corrupt {
        conversation_id: conversation_id.to_string(),
        reason,
    };

    let envelope = SealedEnvelope::from_tagged(blob).map_err(|e| corrupt(e.to_string()))?;
    let plaintext = open(key, &envelope).map_err(|e| corrupt(e.to_string()))?;
    let list: MemberList = serde_json::from_slice(&plaintext).map_err(|e| corrupt(e.to_string()))?;

    if list.conversation_id != conversation_id {
        return Err(corrupt(format!("blob belongs to {}", list.conversation_id)));
    }
    Ok(list)
}
