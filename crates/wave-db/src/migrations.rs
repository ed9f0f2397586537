use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Legacy plaintext participation. Still written in plaintext mode and by
        -- older writers during a migration window.
        CREATE TABLE IF NOT EXISTS participants (
            conversation_id TEXT NOT NULL,
            member_id       TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (conversation_id, member_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_member
            ON participants(member_id);

        -- One sealed member list per conversation.
        CREATE TABLE IF NOT EXISTS participation_blobs (
            conversation_id TEXT PRIMARY KEY,
            blob            BLOB NOT NULL,
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Legacy plaintext per-member metadata.
        CREATE TABLE IF NOT EXISTS member_metadata (
            conversation_id TEXT NOT NULL,
            member_id       TEXT NOT NULL,
            archived        INTEGER NOT NULL DEFAULT 0,
            pinned          INTEGER NOT NULL DEFAULT 0,
            hidden          INTEGER NOT NULL DEFAULT 0,
            last_read       TEXT,
            category        TEXT,
            PRIMARY KEY (conversation_id, member_id)
        );

        -- Sealed metadata keyed by blinded id (older rows: 'conversation:member').
        CREATE TABLE IF NOT EXISTS encrypted_metadata (
            key_id      TEXT PRIMARY KEY,
            blob        BLOB NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
