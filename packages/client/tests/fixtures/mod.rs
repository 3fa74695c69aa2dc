//! In-process backend for integration tests.
//!
//! Serves the live channel at `/ws` and the REST endpoints under
//! `/api/users/me`, bound to an ephemeral port.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{sync::broadcast, task::JoinHandle};

/// Bearer token accepted by the REST endpoints.
pub const VALID_TOKEN: &str = "good-token";

const CLOSE_SIGNAL: &str = "__close__";

/// Observable server state.
#[derive(Clone)]
pub struct FixtureState {
    connections: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    received: Arc<Mutex<Vec<Value>>>,
    push_requests: Arc<Mutex<Vec<(String, Value)>>>,
    shipment_requests: Arc<AtomicUsize>,
    events: broadcast::Sender<String>,
}

impl FixtureState {
    fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            connections: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(AtomicUsize::new(0)),
            auth_headers: Arc::new(Mutex::new(Vec::new())),
            received: Arc::new(Mutex::new(Vec::new())),
            push_requests: Arc::new(Mutex::new(Vec::new())),
            shipment_requests: Arc::new(AtomicUsize::new(0)),
            events,
        }
    }
}

pub struct TestServer {
    addr: SocketAddr,
    state: FixtureState,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = FixtureState::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to read local address");

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/users/me/shipments", get(list_shipments))
            .route("/api/users/me/shipments/{id}", get(shipment_detail))
            .route("/api/users/me/shipments/{id}/history", get(shipment_history))
            .route(
                "/api/users/me/push-token",
                axum::routing::post(register_push_token).delete(unregister_push_token),
            )
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server failed");
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Total WebSocket connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// WebSocket connections currently open.
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.state.auth_headers.lock().unwrap().clone()
    }

    /// Frames received from clients, parsed as JSON.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    /// `(method, body)` of push-token requests.
    pub fn push_requests(&self) -> Vec<(String, Value)> {
        self.state.push_requests.lock().unwrap().clone()
    }

    pub fn shipment_requests(&self) -> usize {
        self.state.shipment_requests.load(Ordering::SeqCst)
    }

    /// Send `{"event": event, "data": data}` to every open socket.
    pub fn broadcast(&self, event: &str, data: Value) {
        let _ = self
            .state
            .events
            .send(json!({ "event": event, "data": data }).to_string());
    }

    /// Close every open socket from the server side.
    pub fn close_connections(&self) {
        let _ = self.state.events.send(CLOSE_SIGNAL.to_string());
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Poll `condition` every 10 ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// A port nothing listens on.
pub async fn unused_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    listener.local_addr().expect("Failed to read address").port()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {VALID_TOKEN}"))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<FixtureState>,
) -> Response {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.auth_headers.lock().unwrap().push(auth);
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: FixtureState) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.open.fetch_add(1, Ordering::SeqCst);
    let mut events = state.events.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let hello = json!({
        "event": "connected",
        "data": {
            "message": "Connected to notification service",
            "socketId": uuid::Uuid::new_v4().to_string(),
            "timestamp": "2026-01-01T00:00:00Z"
        }
    });
    if sender
        .send(Message::Text(hello.to_string().into()))
        .await
        .is_ok()
    {
        loop {
            tokio::select! {
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str(text.as_str()) {
                            state.received.lock().unwrap().push(value);
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                event = events.recv() => match event {
                    Ok(text) if text == CLOSE_SIGNAL => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                    Ok(text) => {
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
            }
        }
    }

    state.open.fetch_sub(1, Ordering::SeqCst);
}

async fn list_shipments(State(state): State<FixtureState>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.shipment_requests.fetch_add(1, Ordering::SeqCst);
    Json(json!([
        { "id": "42", "status": "in_transit" },
        { "id": "43", "status": "pending" }
    ]))
    .into_response()
}

async fn shipment_detail(
    State(state): State<FixtureState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.shipment_requests.fetch_add(1, Ordering::SeqCst);
    if id == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({ "id": id, "status": "in_transit" })).into_response()
}

async fn shipment_history(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([
        { "shipmentId": id, "latitude": 35.0, "longitude": 139.0 },
        { "shipmentId": id, "latitude": 35.01, "longitude": 139.0 }
    ]))
    .into_response()
}

async fn register_push_token(
    State(state): State<FixtureState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state
        .push_requests
        .lock()
        .unwrap()
        .push(("POST".to_string(), body));
    Json(json!({ "success": true })).into_response()
}

async fn unregister_push_token(
    State(state): State<FixtureState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state
        .push_requests
        .lock()
        .unwrap()
        .push(("DELETE".to_string(), body));
    Json(json!({ "success": true })).into_response()
}
