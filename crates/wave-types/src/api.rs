use serde::{Deserialize, Serialize};

use crate::models::MemberMetadata;

// -- Participation --

#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipantsResponse {
    pub conversation_id: String,
    pub members: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    pub conversation_id: String,
    pub member_id: String,
    pub participant: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberConversationsResponse {
    pub member_id: String,
    pub conversations: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub conversation_id: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

// -- Metadata --

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub conversation_id: String,
    pub member_id: String,
    pub metadata: Option<MemberMetadata>,
}

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub conversations: usize,
    pub encrypted_at_rest: bool,
}
