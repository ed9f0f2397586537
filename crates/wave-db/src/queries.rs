use crate::models::{BlobRow, MetadataRow, ParticipantRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Legacy participants --

    pub fn insert_participant_row(&self, conversation_id: &str, member_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO participants (conversation_id, member_id) VALUES (?1, ?2)",
                (conversation_id, member_id),
            )?;
            Ok(())
        })
    }

    pub fn delete_participant_row(&self, conversation_id: &str, member_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM participants WHERE conversation_id = ?1 AND member_id = ?2",
                (conversation_id, member_id),
            )?;
            Ok(())
        })
    }

    pub fn delete_conversation_rows(&self, conversation_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM participants WHERE conversation_id = ?1", [conversation_id])?;
            Ok(())
        })
    }

    /// True while the conversation still has rows in the legacy table.
    pub fn has_participant_rows(&self, conversation_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM participants WHERE conversation_id = ?1)",
                [conversation_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn participant_rows_for(&self, conversation_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT member_id FROM participants WHERE conversation_id = ?1 ORDER BY member_id",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    pub fn all_participant_rows(&self) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, member_id FROM participants ORDER BY conversation_id, member_id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ParticipantRow {
                        conversation_id: row.get(0)?,
                        member_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Sealed participation blobs --

    pub fn upsert_participation_blob(&self, conversation_id: &str, blob: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO participation_blobs (conversation_id, blob) VALUES (?1, ?2)
                 ON CONFLICT(conversation_id) DO UPDATE SET blob = excluded.blob, updated_at = datetime('now')",
                rusqlite::params![conversation_id, blob],
            )?;
            Ok(())
        })
    }

    pub fn delete_participation_blob(&self, conversation_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM participation_blobs WHERE conversation_id = ?1",
                [conversation_id],
            )?;
            Ok(())
        })
    }

    pub fn get_participation_blob(&self, conversation_id: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT blob FROM participation_blobs WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn all_participation_blobs(&self) -> Result<Vec<BlobRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT conversation_id, blob FROM participation_blobs")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(BlobRow {
                        conversation_id: row.get(0)?,
                        blob: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Legacy plaintext metadata --

    pub fn upsert_legacy_metadata(&self, row: &MetadataRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO member_metadata
                    (conversation_id, member_id, archived, pinned, hidden, last_read, category)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(conversation_id, member_id) DO UPDATE SET
                    archived = excluded.archived,
                    pinned = excluded.pinned,
                    hidden = excluded.hidden,
                    last_read = excluded.last_read,
                    category = excluded.category",
                rusqlite::params![
                    row.conversation_id,
                    row.member_id,
                    row.archived,
                    row.pinned,
                    row.hidden,
                    row.last_read,
                    row.category,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_legacy_metadata(&self, conversation_id: &str, member_id: &str) -> Result<Option<MetadataRow>> {
        self.with_conn(|conn| query_legacy_metadata(conn, Some((conversation_id, member_id))))
            .map(|mut rows| rows.pop())
    }

    pub fn all_legacy_metadata(&self) -> Result<Vec<MetadataRow>> {
        self.with_conn(|conn| query_legacy_metadata(conn, None))
    }

    pub fn delete_legacy_metadata(&self, conversation_id: &str, member_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM member_metadata WHERE conversation_id = ?1 AND member_id = ?2",
                (conversation_id, member_id),
            )?;
            Ok(())
        })
    }

    // -- Sealed metadata --

    pub fn upsert_encrypted_metadata(&self, key_id: &str, blob: &[u8]) -> Result<()> {
        self.with_conn(|conn| upsert_encrypted_metadata(conn, key_id, blob))
    }

    pub fn get_encrypted_metadata(&self, key_id: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT blob FROM encrypted_metadata WHERE key_id = ?1",
                [key_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Returns true if a row was removed.
    pub fn delete_encrypted_metadata(&self, key_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM encrypted_metadata WHERE key_id = ?1", [key_id])?;
            Ok(n > 0)
        })
    }

    /// Move a sealed blob to a new key id, byte for byte, in one transaction.
    pub fn rekey_encrypted_metadata(&self, old_key_id: &str, new_key_id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let blob: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT blob FROM encrypted_metadata WHERE key_id = ?1",
                    [old_key_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(blob) = blob else {
                return Ok(false);
            };

            upsert_encrypted_metadata(tx, new_key_id, &blob)?;
            tx.execute("DELETE FROM encrypted_metadata WHERE key_id = ?1", [old_key_id])?;
            Ok(true)
        })
    }
}

fn upsert_encrypted_metadata(conn: &Connection, key_id: &str, blob: &[u8]) -> Result<()> {
    conn.execute(
        "INSERT INTO encrypted_metadata (key_id, blob) VALUES (?1, ?2)
         ON CONFLICT(key_id) DO UPDATE SET blob = excluded.blob, updated_at = datetime('now')",
        rusqlite::params![key_id, blob],
    )?;
    Ok(())
}

fn query_legacy_metadata(conn: &Connection, pair: Option<(&str, &str)>) -> Result<Vec<MetadataRow>> {
    let base = "SELECT conversation_id, member_id, archived, pinned, hidden, last_read, category
                FROM member_metadata";

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<MetadataRow> {
        Ok(MetadataRow {
            conversation_id: row.get(0)?,
            member_id: row.get(1)?,
            archived: row.get(2)?,
            pinned: row.get(3)?,
            hidden: row.get(4)?,
            last_read: row.get(5)?,
            category: row.get(6)?,
        })
    };

    let rows = match pair {
        Some((conversation_id, member_id)) => {
            let mut stmt = conn.prepare(&format!("{base} WHERE conversation_id = ?1 AND member_id = ?2"))?;
            let rows = stmt
                .query_map((conversation_id, member_id), map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY conversation_id, member_id"))?;
            let rows = stmt
                .query_map([], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
