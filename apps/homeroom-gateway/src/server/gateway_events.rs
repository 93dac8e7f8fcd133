use serde::Serialize;

use super::{auth::outbound_event, types::MessageResponse};

pub(crate) const READY_EVENT: &str = "ready";
pub(crate) const PRESENCE_SYNC_EVENT: &str = "presence_sync";
pub(crate) const USER_ONLINE_EVENT: &str = "user_online";
pub(crate) const USER_OFFLINE_EVENT: &str = "user_offline";
pub(crate) const MESSAGE_RECEIVED_EVENT: &str = "message_received";
pub(crate) const MESSAGE_SENT_EVENT: &str = "message_sent";

pub(crate) struct GatewayEvent {
    pub(crate) event_type: &'static str,
    pub(crate) payload: String,
}

fn build_event<T: Serialize>(event_type: &'static str, payload: T) -> GatewayEvent {
    GatewayEvent {
        event_type,
        payload: outbound_event(event_type, payload),
    }
}

#[derive(Serialize)]
struct ReadyPayload<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
struct PresenceSyncPayload {
    users: Vec<OnlineUserPayload>,
}

#[derive(Serialize)]
struct OnlineUserPayload {
    user_id: String,
    display_name: String,
}

#[derive(Serialize)]
struct UserOnlinePayload<'a> {
    user_id: &'a str,
    display_name: &'a str,
}

#[derive(Serialize)]
struct UserOfflinePayload<'a> {
    user_id: &'a str,
}

pub(crate) fn ready(user_id: &str) -> GatewayEvent {
    build_event(READY_EVENT, ReadyPayload { user_id })
}

pub(crate) fn presence_sync(users: &[(String, String)]) -> GatewayEvent {
    build_event(
        PRESENCE_SYNC_EVENT,
        PresenceSyncPayload {
            users: users
                .iter()
                .map(|(user_id, display_name)| OnlineUserPayload {
                    user_id: user_id.clone(),
                    display_name: display_name.clone(),
                })
                .collect(),
        },
    )
}

pub(crate) fn user_online(user_id: &str, display_name: &str) -> GatewayEvent {
    build_event(
        USER_ONLINE_EVENT,
        UserOnlinePayload {
            user_id,
            display_name,
        },
    )
}

pub(crate) fn user_offline(user_id: &str) -> GatewayEvent {
    build_event(USER_OFFLINE_EVENT, UserOfflinePayload { user_id })
}

pub(crate) fn message_received(message: &MessageResponse) -> GatewayEvent {
    build_event(MESSAGE_RECEIVED_EVENT, message)
}

pub(crate) fn message_sent(message: &MessageResponse) -> GatewayEvent {
    build_event(MESSAGE_SENT_EVENT, message)
}
