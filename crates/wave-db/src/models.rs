/// Database row types. These map directly to SQLite rows.
/// Distinct from wave-types models to keep the DB layer independent.

pub struct ParticipantRow {
    pub conversation_id: String,
    pub member_id: String,
}

pub struct BlobRow {
    pub conversation_id: String,
    pub blob: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRow {
    pub conversation_id: String,
    pub member_id: String,
    pub archived: bool,
    pub pinned: bool,
    pub hidden: bool,
    /// RFC 3339
    pub last_read: Option<String>,
    pub category: Option<String>,
}
