use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use homeroom_core::UserId;

use super::{
    auth::authenticate,
    core::{AppState, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT},
    errors::AuthFailure,
    types::{ConversationsResponse, HistoryQuery, HistoryResponse, MessageResponse},
};

/// Ordered pairwise history between the caller and one counterpart, both
/// directions, oldest first. The limit is a fixed window capped at 100.
pub(crate) async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(counterpart_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AuthFailure> {
    let auth = authenticate(&state, &headers)?;
    let counterpart =
        UserId::try_from(counterpart_id).map_err(|_| AuthFailure::InvalidRequest)?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(AuthFailure::InvalidRequest);
    }

    let messages = state
        .store
        .history_between(auth.user_id.as_str(), counterpart.as_str(), limit)
        .await?;
    Ok(Json(HistoryResponse {
        messages: messages.into_iter().map(MessageResponse::from).collect(),
    }))
}

/// The caller's inbox: one most-recent-message summary per counterpart,
/// newest conversation first.
pub(crate) async fn get_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConversationsResponse>, AuthFailure> {
    let auth = authenticate(&state, &headers)?;
    let conversations = state.store.inbox_for(auth.user_id.as_str()).await?;
    Ok(Json(ConversationsResponse { conversations }))
}
