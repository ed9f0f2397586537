use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use wave_index::{IndexError, ParticipationIndex};
use wave_types::api::{
    HealthResponse, MemberConversationsResponse, MembershipResponse, MetadataResponse, ParticipantsResponse,
    SyncResponse,
};
use wave_types::models::MemberMetadata;

pub fn router(index: ParticipationIndex) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/conversations/{conversation_id}", delete(delete_conversation))
        .route("/conversations/{conversation_id}/participants", get(get_participants))
        .route(
            "/conversations/{conversation_id}/participants/{member_id}",
            get(get_membership).put(add_participant).delete(remove_participant),
        )
        .route(
            "/conversations/{conversation_id}/metadata/{member_id}",
            get(get_metadata).put(set_metadata),
        )
        .route("/conversations/{conversation_id}/sync", post(sync_conversation))
        .route("/members/{member_id}/conversations", get(get_member_conversations))
        .layer(TraceLayer::new_for_http())
        .with_state(index)
}

fn status_for(err: IndexError) -> StatusCode {
    match err {
        IndexError::NotParticipant { .. } => StatusCode::NOT_FOUND,
        IndexError::Config(msg) => {
            warn!("Rejected request: {}", msg);
            StatusCode::CONFLICT
        }
        other => {
            error!("Participation index error: {}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Run an index call that touches the database off the async runtime.
async fn blocking<T, F>(index: ParticipationIndex, f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&ParticipationIndex) -> wave_index::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&index))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_for)
}

async fn health(State(index): State<ParticipationIndex>) -> Json<HealthResponse> {
    Json(HealthResponse {
        conversations: index.conversation_count(),
        encrypted_at_rest: index.is_encrypted(),
    })
}

async fn get_participants(
    State(index): State<ParticipationIndex>,
    Path(conversation_id): Path<String>,
) -> Json<ParticipantsResponse> {
    let members = index.sorted_participants(&conversation_id);
    Json(ParticipantsResponse { conversation_id, members })
}

async fn get_membership(
    State(index): State<ParticipationIndex>,
    Path((conversation_id, member_id)): Path<(String, String)>,
) -> Json<MembershipResponse> {
    let participant = index.is_participant(&conversation_id, &member_id);
    Json(MembershipResponse {
        conversation_id,
        member_id,
        participant,
    })
}

async fn add_participant(
    State(index): State<ParticipationIndex>,
    Path((conversation_id, member_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let (cid, mid) = (conversation_id.clone(), member_id.clone());
    let added = blocking(index, move |index| index.add_participant(&cid, &mid)).await?;

    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(MembershipResponse {
            conversation_id,
            member_id,
            participant: true,
        }),
    ))
}

async fn remove_participant(
    State(index): State<ParticipationIndex>,
    Path((conversation_id, member_id)): Path<(String, String)>,
) -> Result<StatusCode, StatusCode> {
    let removed = blocking(index, move |index| index.remove_participant(&conversation_id, &member_id)).await?;
    Ok(if removed { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND })
}

async fn delete_conversation(
    State(index): State<ParticipationIndex>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ParticipantsResponse>, StatusCode> {
    let cid = conversation_id.clone();
    let members = blocking(index, move |index| index.remove_conversation(&cid)).await?;
    Ok(Json(ParticipantsResponse { conversation_id, members }))
}

async fn get_member_conversations(
    State(index): State<ParticipationIndex>,
    Path(member_id): Path<String>,
) -> Json<MemberConversationsResponse> {
    let conversations = index.get_user_conversations(&member_id);
    Json(MemberConversationsResponse {
        member_id,
        conversations,
    })
}

async fn get_metadata(
    State(index): State<ParticipationIndex>,
    Path((conversation_id, member_id)): Path<(String, String)>,
) -> Result<Json<MetadataResponse>, StatusCode> {
    if !index.is_participant(&conversation_id, &member_id) {
        return Err(StatusCode::NOT_FOUND);
    }

    let (cid, mid) = (conversation_id.clone(), member_id.clone());
    let metadata = blocking(index, move |index| index.get_metadata(&cid, &mid)).await?;
    Ok(Json(MetadataResponse {
        conversation_id,
        member_id,
        metadata,
    }))
}

async fn set_metadata(
    State(index): State<ParticipationIndex>,
    Path((conversation_id, member_id)): Path<(String, String)>,
    Json(metadata): Json<MemberMetadata>,
) -> Result<Json<MetadataResponse>, StatusCode> {
    let (cid, mid) = (conversation_id.clone(), member_id.clone());
    let stored = metadata.clone();
    blocking(index, move |index| index.set_metadata(&cid, &mid, &stored)).await?;
    Ok(Json(MetadataResponse {
        conversation_id,
        member_id,
        metadata: Some(metadata),
    }))
}

async fn sync_conversation(
    State(index): State<ParticipationIndex>,
    Path(conversation_id): Path<String>,
) -> Result<Json<SyncResponse>, StatusCode> {
    let report = blocking(index, move |index| index.sync_from_store(&conversation_id)).await?;
    Ok(Json(SyncResponse {
        conversation_id: report.conversation_id,
        added: report.added,
        removed: report.removed,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;
    use wave_crypto::SymmetricKey;
    use wave_db::Database;
    use wave_index::{Deployment, IndexConfig};

    use super::*;

    fn app() -> (Arc<Database>, Router) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let index = ParticipationIndex::open(db.clone(), IndexConfig::sealed(SymmetricKey::generate())).unwrap();
        (db, router(index))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn join_list_and_leave() {
        let (_, app) = app();

        let (status, _) = send(&app, Method::PUT, "/conversations/c1/participants/alice", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, Method::PUT, "/conversations/c1/participants/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        send(&app, Method::PUT, "/conversations/c1/participants/bob", None).await;

        let (_, body) = send(&app, Method::GET, "/conversations/c1/participants", None).await;
        assert_eq!(body["members"], serde_json::json!(["alice", "bob"]));

        let (_, body) = send(&app, Method::GET, "/members/bob/conversations", None).await;
        assert_eq!(body["conversations"], serde_json::json!(["c1"]));

        let (status, _) = send(&app, Method::DELETE, "/conversations/c1/participants/alice", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, "/conversations/c1/participants/alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, Method::GET, "/conversations/c1/participants/alice", None).await;
        assert_eq!(body["participant"], Value::Bool(false));
    }

    #[tokio::test]
    async fn metadata_requires_membership() {
        let (_, app) = app();

        let (status, _) = send(&app, Method::GET, "/conversations/c1/metadata/alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let meta = serde_json::json!({ "archived": true });
        let (status, _) = send(&app, Method::PUT, "/conversations/c1/metadata/alice", Some(meta.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&app, Method::PUT, "/conversations/c1/participants/alice", None).await;
        let (_, body) = send(&app, Method::GET, "/conversations/c1/metadata/alice", None).await;
        assert_eq!(body["metadata"], Value::Null);

        let (status, _) = send(&app, Method::PUT, "/conversations/c1/metadata/alice", Some(meta)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, Method::GET, "/conversations/c1/metadata/alice", None).await;
        assert_eq!(body["metadata"]["archived"], Value::Bool(true));
    }

    #[tokio::test]
    async fn sync_and_delete_conversation() {
        let (db, app) = app();
        send(&app, Method::PUT, "/conversations/c1/participants/alice", None).await;
        db.insert_participant_row("c1", "bob").unwrap();

        let (status, body) = send(&app, Method::POST, "/conversations/c1/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["added"], serde_json::json!(["bob"]));
        assert_eq!(body["removed"], serde_json::json!(["alice"]));

        let (_, body) = send(&app, Method::DELETE, "/conversations/c1", None).await;
        assert_eq!(body["members"], serde_json::json!(["bob"]));

        let (_, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(body["conversations"], 0);
        assert_eq!(body["encrypted_at_rest"], Value::Bool(true));
    }

    #[tokio::test]
    async fn health_reports_plaintext_mode() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let index = ParticipationIndex::open(db, IndexConfig::plaintext(Deployment::Development)).unwrap();
        let app = router(index);

        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["encrypted_at_rest"], Value::Bool(false));
    }
}
