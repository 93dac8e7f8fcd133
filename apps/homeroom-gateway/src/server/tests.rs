#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::super::{
        auth::issue_access_token,
        core::{AppConfig, AppState},
        realtime::route_message,
        router::{build_router, router_with_state},
        types::SendMessageRequest,
    };
    use crate::server::core::AuthContext;
    use homeroom_core::{DisplayName, UserId};

    const TEST_SECRET: &str = "homeroom-test-secret";
    const TEST_IP: &str = "203.0.113.40";

    fn test_config() -> AppConfig {
        AppConfig {
            token_secret: Some(String::from(TEST_SECRET)),
            rate_limit_requests_per_minute: 200,
            ..AppConfig::default()
        }
    }

    fn mint_token(user_id: &str, display_name: &str) -> String {
        issue_access_token(TEST_SECRET, user_id, display_name, Duration::from_secs(900))
            .expect("token should mint")
    }

    fn auth_context(user_id: &str, display_name: &str) -> AuthContext {
        AuthContext {
            user_id: UserId::try_from(user_id.to_owned()).expect("valid user id"),
            display_name: DisplayName::try_from(display_name.to_owned())
                .expect("valid display name"),
        }
    }

    fn send_request(recipient_id: &str, body: &str) -> SendMessageRequest {
        SendMessageRequest {
            recipient_id: recipient_id.to_owned(),
            body: body.to_owned(),
            kind: None,
        }
    }

    async fn get_json(
        app: &axum::Router,
        uri: &str,
        token: Option<&str>,
    ) -> (StatusCode, Option<Value>) {
        let mut builder = Request::builder()
            .method("GET")
            .uri(uri)
            .header("x-forwarded-for", TEST_IP);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload = serde_json::from_slice(&bytes).ok();
        (status, payload)
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = build_router(&test_config()).unwrap();
        let (status, payload) = get_json(&app, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.unwrap()["status"], "ok");
    }

    #[tokio::test]
    async fn read_endpoints_distinguish_missing_and_invalid_tokens() {
        let app = build_router(&test_config()).unwrap();

        let (status, payload) = get_json(&app, "/chat/history/teacher-2", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(payload.unwrap()["error"], "missing_token");

        let (status, payload) = get_json(&app, "/chat/history/teacher-2", Some("junk")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(payload.unwrap()["error"], "invalid_token");

        let (status, payload) = get_json(&app, "/chat/conversations", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(payload.unwrap()["error"], "missing_token");

        let foreign = issue_access_token(
            "some-other-secret",
            "student-1",
            "Student One",
            Duration::from_secs(900),
        )
        .unwrap();
        let (status, payload) = get_json(&app, "/chat/conversations", Some(&foreign)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(payload.unwrap()["error"], "invalid_token");
    }

    #[tokio::test]
    async fn history_and_conversations_reflect_routed_messages() {
        let config = test_config();
        let state = AppState::new(&config).unwrap();
        let app = router_with_state(&config, state.clone()).unwrap();

        let alice = auth_context("student-1", "Student One");
        let bob = auth_context("teacher-2", "Teacher Two");
        route_message(&state, &alice, send_request("teacher-2", "hello"))
            .await
            .unwrap();
        route_message(&state, &bob, send_request("student-1", "hi back"))
            .await
            .unwrap();
        route_message(&state, &alice, send_request("admin-3", "separate thread"))
            .await
            .unwrap();

        let alice_token = mint_token("student-1", "Student One");
        let (status, payload) =
            get_json(&app, "/chat/history/teacher-2", Some(&alice_token)).await;
        assert_eq!(status, StatusCode::OK);
        let history = payload.unwrap();
        let messages = history["messages"].as_array().unwrap().clone();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["body"], "hello");
        assert_eq!(messages[0]["sender_id"], "student-1");
        assert_eq!(messages[0]["kind"], "text");
        assert_eq!(messages[0]["delivered"], false);
        assert_eq!(messages[1]["body"], "hi back");
        assert!(messages[0]["created_at_unix"].as_i64() <= messages[1]["created_at_unix"].as_i64());

        let bob_token = mint_token("teacher-2", "Teacher Two");
        let (status, payload) = get_json(&app, "/chat/history/student-1", Some(&bob_token)).await;
        assert_eq!(status, StatusCode::OK);
        let mirrored = payload.unwrap();
        assert_eq!(mirrored["messages"].as_array().unwrap().len(), 2);

        let (status, payload) = get_json(&app, "/chat/conversations", Some(&alice_token)).await;
        assert_eq!(status, StatusCode::OK);
        let inbox = payload.unwrap();
        let conversations = inbox["conversations"].as_array().unwrap().clone();
        assert_eq!(conversations.len(), 2);
        let with_bob = conversations
            .iter()
            .find(|entry| entry["counterpart_id"] == "teacher-2")
            .expect("conversation with teacher-2 expected");
        assert_eq!(with_bob["counterpart_name"], "Teacher Two");
        assert_eq!(with_bob["last_message_body"], "hi back");
        let with_admin = conversations
            .iter()
            .find(|entry| entry["counterpart_id"] == "admin-3")
            .expect("conversation with admin-3 expected");
        assert_eq!(with_admin["counterpart_name"], "admin-3");
        assert_eq!(with_admin["last_message_body"], "separate thread");
    }

    #[tokio::test]
    async fn history_limit_is_validated_and_applied() {
        let config = test_config();
        let state = AppState::new(&config).unwrap();
        let app = router_with_state(&config, state.clone()).unwrap();

        let alice = auth_context("student-1", "Student One");
        route_message(&state, &alice, send_request("teacher-2", "first"))
            .await
            .unwrap();
        route_message(&state, &alice, send_request("teacher-2", "second"))
            .await
            .unwrap();

        let token = mint_token("student-1", "Student One");
        let (status, _) = get_json(&app, "/chat/history/teacher-2?limit=0", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(&app, "/chat/history/teacher-2?limit=101", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, payload) =
            get_json(&app, "/chat/history/teacher-2?limit=1", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let messages = payload.unwrap()["messages"].as_array().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["body"], "first");
    }

    #[tokio::test]
    async fn history_rejects_malformed_counterpart_id() {
        let app = build_router(&test_config()).unwrap();
        let token = mint_token("student-1", "Student One");
        let (status, payload) = get_json(&app, "/chat/history/not%20valid", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload.unwrap()["error"], "invalid_request");
    }

    #[tokio::test]
    async fn metrics_endpoint_exposes_gateway_counters() {
        let app = build_router(&test_config()).unwrap();

        let (status, _) = get_json(&app, "/chat/conversations", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let metrics_request = Request::builder()
            .method("GET")
            .uri("/metrics")
            .header("x-forwarded-for", TEST_IP)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(metrics_request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("homeroom_auth_failures_total"));
        assert!(text.contains("homeroom_rate_limit_hits_total"));
        assert!(text.contains("homeroom_ws_disconnects_total"));
        assert!(text.contains("homeroom_gateway_events_emitted_total"));
        assert!(text.contains("homeroom_gateway_events_dropped_total"));
        assert!(text.contains("homeroom_gateway_events_unknown_received_total"));
        assert!(text.contains("homeroom_gateway_events_parse_rejected_total"));
        assert!(text.contains("homeroom_store_write_failures_total"));
    }

    #[tokio::test]
    async fn router_rejects_invalid_gateway_limits() {
        let oversized = build_router(&AppConfig {
            max_gateway_event_bytes: homeroom_protocol::MAX_EVENT_BYTES + 1,
            ..test_config()
        });
        assert!(oversized.is_err());

        let empty_queue = build_router(&AppConfig {
            gateway_outbound_queue: 0,
            ..test_config()
        });
        assert!(empty_queue.is_err());

        let no_ingress = build_router(&AppConfig {
            gateway_ingress_events_per_window: 0,
            ..test_config()
        });
        assert!(no_ingress.is_err());
    }
}
