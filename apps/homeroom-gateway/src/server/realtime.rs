use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use homeroom_core::{MessageBody, MessageKind, UserId};
use homeroom_protocol::parse_envelope;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::{
    auth::{bearer_token, now_unix, origin_allowed, verify_token},
    core::{AppState, AuthContext, ConnectionControl},
    errors::AuthFailure,
    gateway_events::{self, GatewayEvent},
    metrics::{
        record_gateway_event_dropped, record_gateway_event_emitted,
        record_gateway_event_parse_rejected, record_gateway_event_unknown_received,
        record_store_write_failure, record_ws_disconnect,
    },
    store::NewMessage,
    types::{GatewayAuthQuery, MessageResponse, SendMessageRequest},
};

pub(crate) async fn gateway_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<GatewayAuthQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthFailure> {
    if !origin_allowed(&state.runtime.allowed_origins, &headers) {
        return Err(AuthFailure::ForbiddenOrigin);
    }

    // The credential rides the upgrade request, so verification happens
    // before the socket exists and a failed handshake never upgrades.
    let token = query
        .access_token
        .or_else(|| bearer_token(&headers).map(ToOwned::to_owned))
        .ok_or(AuthFailure::MissingToken)?;
    let auth = verify_token(&state, &token)?;

    Ok(ws.on_upgrade(move |socket| async move {
        handle_gateway_connection(state, socket, auth).await;
    }))
}

#[allow(clippy::too_many_lines)]
pub(crate) async fn handle_gateway_connection(state: AppState, socket: WebSocket, auth: AuthContext) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let slow_consumer_disconnect = Arc::new(AtomicBool::new(false));

    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<String>(state.runtime.gateway_outbound_queue);
    state
        .connection_senders
        .write()
        .await
        .insert(connection_id, outbound_tx.clone());
    let (control_tx, mut control_rx) = watch::channel(ConnectionControl::Open);
    state
        .connection_controls
        .write()
        .await
        .insert(connection_id, control_tx);

    // Register first, broadcast second: a racing lookup that sees this user
    // online is guaranteed to have the online event already enqueued.
    let superseded = state
        .presence
        .register(
            &auth.user_id,
            auth.display_name.clone(),
            connection_id,
            outbound_tx.clone(),
        )
        .await;
    if superseded.is_some() {
        tracing::info!(
            event = "gateway.presence.replaced",
            user_id = %auth.user_id
        );
    }

    let online_event =
        gateway_events::user_online(auth.user_id.as_str(), auth.display_name.as_str());
    broadcast_event(&state, Some(connection_id), &online_event).await;

    let ready_event = gateway_events::ready(auth.user_id.as_str());
    let _ = outbound_tx.send(ready_event.payload).await;
    record_gateway_event_emitted("connection", ready_event.event_type);

    let roster = state.presence.online_users().await;
    let sync_event = gateway_events::presence_sync(&roster);
    match outbound_tx.try_send(sync_event.payload) {
        Ok(()) => record_gateway_event_emitted("connection", sync_event.event_type),
        Err(mpsc::error::TrySendError::Closed(_)) => {
            record_gateway_event_dropped("connection", sync_event.event_type, "closed");
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            record_gateway_event_dropped("connection", sync_event.event_type, "full_queue");
        }
    }

    let slow_consumer_disconnect_send = Arc::clone(&slow_consumer_disconnect);
    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if sink.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                control_change = control_rx.changed() => {
                    if control_change.is_ok() && *control_rx.borrow() == ConnectionControl::Close {
                        slow_consumer_disconnect_send.store(true, Ordering::Relaxed);
                        record_ws_disconnect("slow_consumer");
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: 1008,
                                reason: "slow_consumer".into(),
                            })))
                            .await;
                        break;
                    }
                }
                maybe_payload = outbound_rx.recv() => {
                    match maybe_payload {
                        Some(payload) => {
                            if sink.send(Message::Text(payload.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    let mut ingress = VecDeque::new();
    let mut disconnect_reason = "connection_closed";
    while let Some(incoming) = stream.next().await {
        let Ok(message) = incoming else {
            disconnect_reason = "socket_error";
            break;
        };

        let payload: Vec<u8> = match message {
            Message::Text(text) => {
                if text.len() > state.runtime.max_gateway_event_bytes {
                    disconnect_reason = "event_too_large";
                    break;
                }
                text.as_bytes().to_vec()
            }
            Message::Binary(bytes) => {
                if bytes.len() > state.runtime.max_gateway_event_bytes {
                    disconnect_reason = "event_too_large";
                    break;
                }
                bytes.to_vec()
            }
            Message::Close(_) => {
                disconnect_reason = "client_close";
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if !allow_gateway_ingress(
            &mut ingress,
            state.runtime.gateway_ingress_events_per_window,
            state.runtime.gateway_ingress_window,
        ) {
            disconnect_reason = "ingress_rate_limited";
            break;
        }

        let Ok(envelope) = parse_envelope(&payload) else {
            record_gateway_event_parse_rejected("ingress", "invalid_envelope");
            disconnect_reason = "invalid_envelope";
            break;
        };

        match envelope.t.as_str() {
            "send_message" => {
                let Ok(request) = serde_json::from_value::<SendMessageRequest>(envelope.d) else {
                    record_gateway_event_parse_rejected("ingress", "invalid_send_message_payload");
                    disconnect_reason = "invalid_send_message_payload";
                    break;
                };
                match route_message(&state, &auth, request).await {
                    Ok(message) => {
                        let echo = gateway_events::message_sent(&message);
                        if outbound_tx.try_send(echo.payload).is_err() {
                            record_gateway_event_dropped(
                                "connection",
                                echo.event_type,
                                "full_queue",
                            );
                            disconnect_reason = "outbound_queue_full";
                            break;
                        }
                        record_gateway_event_emitted("connection", echo.event_type);
                    }
                    Err(_) => {
                        disconnect_reason = "message_rejected";
                        break;
                    }
                }
            }
            _ => {
                record_gateway_event_unknown_received("ingress", envelope.t.as_str());
                disconnect_reason = "unknown_event";
                break;
            }
        }
    }

    if !slow_consumer_disconnect.load(Ordering::Relaxed) {
        record_ws_disconnect(disconnect_reason);
    }
    remove_connection(&state, connection_id, &auth).await;
    send_task.abort();
}

/// The routing path for one `send_message` event: construct, persist-attempt,
/// push-attempt, echo. Persistence and delivery are deliberately independent
/// best-effort steps, not a transaction.
pub(crate) async fn route_message(
    state: &AppState,
    auth: &AuthContext,
    request: SendMessageRequest,
) -> Result<MessageResponse, AuthFailure> {
    let recipient_id =
        UserId::try_from(request.recipient_id).map_err(|_| AuthFailure::InvalidRequest)?;
    let body = MessageBody::try_from(request.body).map_err(|_| AuthFailure::InvalidRequest)?;
    let kind = match request.kind {
        Some(kind) => MessageKind::try_from(kind).map_err(|_| AuthFailure::InvalidRequest)?,
        None => MessageKind::text(),
    };

    // The delivered flag snapshots recipient presence at send time. It is
    // best-effort by contract, never a delivery receipt.
    let recipient_entry = state.presence.lookup(&recipient_id).await;
    let new_message = NewMessage {
        sender_id: auth.user_id.to_string(),
        sender_name: auth.display_name.to_string(),
        recipient_id: recipient_id.to_string(),
        body: body.as_str().to_owned(),
        kind: kind.as_str().to_owned(),
        created_at_unix: now_unix(),
        delivered: recipient_entry.is_some(),
    };

    let message = match state.store.append(new_message.clone()).await {
        Ok(stored) => MessageResponse::from(stored),
        Err(error) => {
            record_store_write_failure("append");
            tracing::error!(
                event = "router.persist",
                sender_id = %auth.user_id,
                error = %error,
                "message persist failed; continuing with live delivery"
            );
            MessageResponse::unpersisted(&new_message)
        }
    };

    if let Some(entry) = recipient_entry {
        let event = gateway_events::message_received(&message);
        match entry.sender.try_send(event.payload) {
            Ok(()) => record_gateway_event_emitted("user", event.event_type),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                record_gateway_event_dropped("user", event.event_type, "closed");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                record_gateway_event_dropped("user", event.event_type, "full_queue");
                close_slow_connections(state, vec![entry.connection_id]).await;
            }
        }
    }

    Ok(message)
}

/// Fan an event out to every live connection, skipping `except`. Closed
/// queues are pruned; full queues mark the peer as a slow consumer and
/// trigger a control-channel close instead of buffering without bound.
pub(crate) async fn broadcast_event(state: &AppState, except: Option<Uuid>, event: &GatewayEvent) {
    let mut slow_connections = Vec::new();
    let mut delivered = 0usize;
    let mut senders = state.connection_senders.write().await;
    senders.retain(|connection_id, sender| {
        if Some(*connection_id) == except {
            return true;
        }
        match sender.try_send(event.payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                record_gateway_event_dropped("broadcast", event.event_type, "closed");
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                record_gateway_event_dropped("broadcast", event.event_type, "full_queue");
                slow_connections.push(*connection_id);
                false
            }
        }
    });
    drop(senders);

    close_slow_connections(state, slow_connections).await;
    if delivered > 0 {
        tracing::debug!(
            event = "gateway.event.emit",
            scope = "broadcast",
            event_type = event.event_type,
            delivered
        );
        for _ in 0..delivered {
            record_gateway_event_emitted("broadcast", event.event_type);
        }
    }
}

async fn close_slow_connections(state: &AppState, slow_connections: Vec<Uuid>) {
    if slow_connections.is_empty() {
        return;
    }

    let controls = state.connection_controls.read().await;
    for connection_id in slow_connections {
        if let Some(control) = controls.get(&connection_id) {
            let _ = control.send(ConnectionControl::Close);
        }
    }
}

pub(crate) async fn remove_connection(state: &AppState, connection_id: Uuid, auth: &AuthContext) {
    state
        .connection_controls
        .write()
        .await
        .remove(&connection_id);
    state
        .connection_senders
        .write()
        .await
        .remove(&connection_id);

    // Guarded unregister: a superseded connection's disconnect must not
    // evict the newer registration. The offline broadcast is suppressed in
    // that case because the user is still online through the replacement.
    let removed = state.presence.unregister(&auth.user_id, connection_id).await;
    if removed {
        let offline_event = gateway_events::user_offline(auth.user_id.as_str());
        broadcast_event(state, None, &offline_event).await;
    }
}

pub(crate) fn allow_gateway_ingress(
    ingress: &mut VecDeque<Instant>,
    limit: u32,
    window: Duration,
) -> bool {
    let now = Instant::now();
    while ingress
        .front()
        .is_some_and(|oldest| now.duration_since(*oldest) > window)
    {
        let _ = ingress.pop_front();
    }

    if ingress.len() >= limit as usize {
        return false;
    }

    ingress.push_back(now);
    true
}
