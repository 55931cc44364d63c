//! End-to-end tests: the real router on an ephemeral port, driven over
//! HTTP with `reqwest` and over WebSocket with `tokio-tungstenite`.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use safeguard_gateway::app_state::{AppState, RuntimeSettings};
use safeguard_gateway::auth::{JwtTokenService, TokenIssuer};
use safeguard_gateway::notify::LogNotifier;
use safeguard_gateway::persistence::{MemoryStore, Store};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Gateway {
    base: String,
    ws_url: String,
    http: reqwest::Client,
}

async fn spawn_gateway() -> Gateway {
    let state = AppState::build(
        Arc::new(MemoryStore::new()) as Arc<dyn Store>,
        Arc::new(LogNotifier),
        Arc::new(JwtTokenService::new("integration-secret", 1)) as Arc<dyn TokenIssuer>,
        RuntimeSettings::default(),
    );
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, safeguard_gateway::router(state)).await;
    });
    Gateway {
        base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        http: reqwest::Client::new(),
    }
}

impl Gateway {
    async fn sign_in(&self, email: &str, name: &str, phone: &str) -> (String, String) {
        let body = self
            .post(
                "/api/v1/auth/token",
                None,
                json!({ "email": email, "name": name, "phone": phone }),
            )
            .await
            .1;
        let (Some(token), Some(id)) = (
            body.get("access_token").and_then(Value::as_str),
            body.pointer("/user/id").and_then(Value::as_str),
        ) else {
            panic!("unexpected token response: {body}");
        };
        (token.to_string(), id.to_string())
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (u16, Value) {
        let mut req = self.http.post(format!("{}{path}", self.base)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let Ok(resp) = req.send().await else {
            panic!("POST {path} failed");
        };
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (u16, Value) {
        let mut req = self.http.get(format!("{}{path}", self.base));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let Ok(resp) = req.send().await else {
            panic!("GET {path} failed");
        };
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        let Ok(resp) = self
            .http
            .put(format!("{}{path}", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
        else {
            panic!("PUT {path} failed");
        };
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn connect(&self, token: &str) -> Ws {
        let Ok((mut ws, _)) = connect_async(self.ws_url.as_str()).await else {
            panic!("ws connect failed");
        };
        send(&mut ws, json!({ "event": "authenticate", "data": { "token": token } })).await;
        let reply = next_event(&mut ws, "authenticated").await;
        assert_eq!(reply.pointer("/data/success"), Some(&Value::Bool(true)));
        ws
    }
}

async fn send(ws: &mut Ws, frame: Value) {
    if ws.send(Message::text(frame.to_string())).await.is_err() {
        panic!("ws send failed");
    }
}

/// Reads frames until one named `event` arrives.
async fn next_event(ws: &mut Ws, event: &str) -> Value {
    let wait = async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg
                && let Ok(value) = serde_json::from_str::<Value>(text.as_str())
                && value.get("event").and_then(Value::as_str) == Some(event)
            {
                return value;
            }
        }
        panic!("ws closed before {event}");
    };
    match tokio::time::timeout(Duration::from_secs(5), wait).await {
        Ok(value) => value,
        Err(_) => panic!("timed out waiting for {event}"),
    }
}

#[tokio::test]
async fn health_reports_connections() {
    let gw = spawn_gateway().await;
    let (token, _) = gw.sign_in("h@example.com", "H", "+10").await;
    let _ws = gw.connect(&token).await;

    let (status, body) = gw.get("/health", None).await;
    assert_eq!(status, 200);
    assert_eq!(body.get("status").and_then(Value::as_str), Some("healthy"));
    assert_eq!(body.get("connections").and_then(Value::as_u64), Some(1));
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let gw = spawn_gateway().await;
    let (status, body) = gw.get("/api/v1/users/profile", None).await;
    assert_eq!(status, 401);
    assert_eq!(body.pointer("/error/code").and_then(Value::as_u64), Some(4001));

    let (status, _) = gw.get("/api/v1/users/profile", Some("not-a-token")).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn contacts_round_trip() {
    let gw = spawn_gateway().await;
    let (token, _) = gw.sign_in("c@example.com", "C", "+20").await;

    let (status, created) = gw
        .post(
            "/api/v1/users/emergency-contacts",
            Some(&token),
            json!({ "name": "Mum", "phone": "+21", "relationship": "mother" }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(created.get("priority_order").and_then(Value::as_i64), Some(1));
    let Some(contact_id) = created.get("id").and_then(Value::as_str) else {
        panic!("contact has no id: {created}");
    };

    let (_, list) = gw.get("/api/v1/users/emergency-contacts", Some(&token)).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let Ok(resp) = gw
        .http
        .delete(format!(
            "{}/api/v1/users/emergency-contacts/{contact_id}",
            gw.base
        ))
        .bearer_auth(&token)
        .send()
        .await
    else {
        panic!("DELETE failed");
    };
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn emergency_reaches_nearby_user_and_dismissal_is_broadcast() {
    let gw = spawn_gateway().await;
    let (alice, alice_id) = gw.sign_in("alice@example.com", "Alice", "+100").await;
    let (bob, _) = gw.sign_in("bob@example.com", "Bob", "+200").await;

    // Alice lists Bob as a contact; Bob is also standing next to her.
    let (status, _) = gw
        .post(
            "/api/v1/users/emergency-contacts",
            Some(&alice),
            json!({ "name": "Bob", "phone": "+200" }),
        )
        .await;
    assert_eq!(status, 201);

    let mut bob_ws = gw.connect(&bob).await;
    send(
        &mut bob_ws,
        json!({ "event": "location_update", "data": { "lat": 12.9716, "lng": 77.5946 } }),
    )
    .await;

    // Wait until Bob's ping is visible to proximity search.
    let mut visible = false;
    for _ in 0..50 {
        let (_, nearby) = gw
            .get(
                "/api/v1/location/nearby-users?lat=12.9720&lng=77.5950",
                Some(&alice),
            )
            .await;
        if nearby
            .get("users")
            .and_then(Value::as_array)
            .is_some_and(|u| !u.is_empty())
        {
            visible = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(visible, "Bob should become visible nearby");

    let (status, trigger) = gw
        .post(
            "/api/v1/emergency/trigger",
            Some(&alice),
            json!({
                "trigger_type": "manual",
                "location": { "latitude": 12.9720, "longitude": 77.5950, "accuracy": 10.0 }
            }),
        )
        .await;
    assert_eq!(status, 200, "trigger failed: {trigger}");
    assert_eq!(trigger.get("contacts_notified").and_then(Value::as_u64), Some(1));
    assert_eq!(trigger.get("nearby_users_notified").and_then(Value::as_u64), Some(1));
    let Some(session_id) = trigger.get("session_id").and_then(Value::as_str) else {
        panic!("no session id: {trigger}");
    };

    let alert = next_event(&mut bob_ws, "emergency_alert").await;
    assert_eq!(
        alert.pointer("/data/session_id").and_then(Value::as_str),
        Some(session_id)
    );
    assert_eq!(
        alert.pointer("/data/user/id").and_then(Value::as_str),
        Some(alice_id.as_str())
    );

    let (status, conflict) = gw
        .post("/api/v1/emergency/trigger", Some(&alice), json!({}))
        .await;
    assert_eq!(status, 409);
    assert_eq!(conflict.pointer("/error/code").and_then(Value::as_u64), Some(2101));

    let (status, _) = gw
        .post(
            "/api/v1/emergency/dismiss",
            Some(&alice),
            json!({ "session_id": session_id, "reason": "false alarm" }),
        )
        .await;
    assert_eq!(status, 200);

    let dismissed = next_event(&mut bob_ws, "emergency_dismissed").await;
    assert_eq!(
        dismissed.pointer("/data/reason").and_then(Value::as_str),
        Some("false alarm")
    );

    let (_, status_body) = gw.get("/api/v1/emergency/status", Some(&alice)).await;
    assert_eq!(status_body.get("active"), Some(&Value::Bool(false)));

    let (status, alerts) = gw
        .get(&format!("/api/v1/emergency/{session_id}/alerts"), Some(&alice))
        .await;
    assert_eq!(status, 200);
    // One contact SMS, one nearby push, one police dispatch.
    assert_eq!(alerts.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn dismissing_someone_elses_session_is_not_found() {
    let gw = spawn_gateway().await;
    let (alice, _) = gw.sign_in("a2@example.com", "A", "+1").await;
    let (mallory, _) = gw.sign_in("m@example.com", "M", "+2").await;

    let (_, trigger) = gw
        .post("/api/v1/emergency/trigger", Some(&alice), json!({}))
        .await;
    let Some(session_id) = trigger.get("session_id").and_then(Value::as_str) else {
        panic!("no session id: {trigger}");
    };

    let (status, _) = gw
        .post(
            "/api/v1/emergency/dismiss",
            Some(&mallory),
            json!({ "session_id": session_id }),
        )
        .await;
    assert_eq!(status, 404);

    let (_, status_body) = gw.get("/api/v1/emergency/status", Some(&alice)).await;
    assert_eq!(status_body.get("active"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn voice_phrase_flow_over_rest_and_ws() {
    let gw = spawn_gateway().await;
    let (token, user_id) = gw.sign_in("v@example.com", "V", "+3").await;

    let (status, _) = gw
        .post(
            "/api/v1/voice/train-phrase",
            Some(&token),
            json!({ "phrase": "Pineapple Express", "password": "pw" }),
        )
        .await;
    assert_eq!(status, 200);

    let (_, verdict) = gw
        .post(
            "/api/v1/voice/verify-phrase",
            Some(&token),
            json!({ "transcript": "call the pineapple express", "confidence": 0.7 }),
        )
        .await;
    assert_eq!(verdict.get("match"), Some(&Value::Bool(true)));

    let (_, wrong) = gw
        .put(
            "/api/v1/voice/update-phrase",
            &token,
            json!({ "old_password": "nope", "phrase": "new", "new_password": "pw2" }),
        )
        .await;
    assert_eq!(wrong.get("success"), Some(&Value::Bool(false)));

    let mut ws = gw.connect(&token).await;
    send(
        &mut ws,
        json!({
            "event": "voice_phrase_detected",
            "data": { "transcript": "pineapple express!", "confidence": 0.95 }
        }),
    )
    .await;
    let hint = next_event(&mut ws, "emergency_trigger").await;
    assert_eq!(
        hint.pointer("/data/user_id").and_then(Value::as_str),
        Some(user_id.as_str())
    );
}
