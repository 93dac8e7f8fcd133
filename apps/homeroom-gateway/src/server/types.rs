use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use super::{
    core::METRICS_TEXT_CONTENT_TYPE,
    metrics::render_metrics,
    store::{NewMessage, StoredMessage},
};

#[derive(Debug, Serialize)]
pub(crate) struct AuthError {
    pub(crate) error: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub(crate) async fn metrics() -> impl IntoResponse {
    ([(CONTENT_TYPE, METRICS_TEXT_CONTENT_TYPE)], render_metrics())
}

#[derive(Debug, Deserialize)]
pub(crate) struct GatewayAuthQuery {
    pub(crate) access_token: Option<String>,
}

/// The single inbound gateway event payload.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SendMessageRequest {
    pub(crate) recipient_id: String,
    pub(crate) body: String,
    #[serde(default)]
    pub(crate) kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MessageResponse {
    pub(crate) message_id: i64,
    pub(crate) sender_id: String,
    pub(crate) sender_name: String,
    pub(crate) recipient_id: String,
    pub(crate) body: String,
    pub(crate) kind: String,
    pub(crate) created_at_unix: i64,
    pub(crate) delivered: bool,
}

impl MessageResponse {
    /// Echo for a message whose persist attempt failed. Store-assigned ids
    /// start at 1; id 0 marks the unpersisted case.
    pub(crate) fn unpersisted(message: &NewMessage) -> Self {
        Self {
            message_id: 0,
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            recipient_id: message.recipient_id.clone(),
            body: message.body.clone(),
            kind: message.kind.clone(),
            created_at_unix: message.created_at_unix,
            delivered: message.delivered,
        }
    }
}

impl From<StoredMessage> for MessageResponse {
    fn from(message: StoredMessage) -> Self {
        Self {
            message_id: message.message_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            recipient_id: message.recipient_id,
            body: message.body,
            kind: message.kind,
            created_at_unix: message.created_at_unix,
            delivered: message.delivered,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryResponse {
    pub(crate) messages: Vec<MessageResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ConversationSummary {
    pub(crate) counterpart_id: String,
    pub(crate) counterpart_name: String,
    pub(crate) last_message_body: String,
    pub(crate) last_message_kind: String,
    pub(crate) last_message_time: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ConversationsResponse {
    pub(crate) conversations: Vec<ConversationSummary>,
}
