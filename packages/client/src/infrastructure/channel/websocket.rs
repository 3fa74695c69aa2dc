//! WebSocket implementation of the live channel.
//!
//! One spawned task owns the socket for a connection generation. It posts
//! decoded events to the consumer queue, reconnects with a fixed delay and
//! gives up after the policy's attempt budget. `disconnect()` bumps the
//! generation and aborts the task, so envelopes still queued from the old
//! generation are recognised as stale by the consumer.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};

use super::reconnect::ReconnectPolicy;
use crate::{
    domain::{
        ChannelConnectionState, ChannelEndpoint, ChannelEnvelope, ChannelError, ChannelEvent,
        ConnectionHandle, RealtimeChannel, Timestamp, Topic,
    },
    infrastructure::dto::websocket::{OutboundMessage, decode_event},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection generation and its transport state.
#[derive(Debug)]
struct ConnectionSlot {
    generation: u64,
    state: ChannelConnectionState,
    subscriptions: BTreeSet<(String, String)>,
}

fn lock(slot: &Mutex<ConnectionSlot>) -> MutexGuard<'_, ConnectionSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live channel over a WebSocket connection.
pub struct WebSocketChannel {
    events: mpsc::UnboundedSender<ChannelEnvelope>,
    policy: ReconnectPolicy,
    slot: Arc<Mutex<ConnectionSlot>>,
    outbound: Option<mpsc::UnboundedSender<OutboundMessage>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketChannel {
    /// Create a disconnected channel posting envelopes to `events`.
    pub fn new(events: mpsc::UnboundedSender<ChannelEnvelope>, policy: ReconnectPolicy) -> Self {
        Self {
            events,
            policy,
            slot: Arc::new(Mutex::new(ConnectionSlot {
                generation: 0,
                state: ChannelConnectionState::Disconnected,
                subscriptions: BTreeSet::new(),
            })),
            outbound: None,
            task: None,
        }
    }

    fn task_alive(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn send(&self, message: OutboundMessage) {
        match &self.outbound {
            Some(outbound) if outbound.send(message).is_ok() => {}
            _ => tracing::warn!("Live channel outbound queue closed; message dropped"),
        }
    }
}

impl RealtimeChannel for WebSocketChannel {
    fn state(&self) -> ChannelConnectionState {
        lock(&self.slot).state
    }

    fn connect(&mut self, endpoint: ChannelEndpoint) -> ConnectionHandle {
        let generation = {
            let mut slot = lock(&self.slot);
            if slot.state != ChannelConnectionState::Disconnected && self.task_alive() {
                tracing::debug!(
                    generation = slot.generation,
                    "Live channel already {:?}; reusing connection",
                    slot.state
                );
                return ConnectionHandle {
                    generation: slot.generation,
                };
            }
            slot.generation += 1;
            slot.state = ChannelConnectionState::Connecting;
            slot.subscriptions.clear();
            slot.generation
        };

        if let Some(stale) = self.task.take() {
            stale.abort();
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);

        let task = ConnectionTask {
            generation,
            endpoint,
            policy: self.policy,
            slot: self.slot.clone(),
            events: self.events.clone(),
        };
        tracing::info!(generation, url = %task.endpoint.url, "Opening live channel");
        self.task = Some(tokio::spawn(task.run(outbound_rx)));

        ConnectionHandle { generation }
    }

    fn disconnect(&mut self) {
        {
            let mut slot = lock(&self.slot);
            if slot.state == ChannelConnectionState::Disconnected && self.task.is_none() {
                return;
            }
            slot.generation += 1;
            slot.state = ChannelConnectionState::Disconnected;
            slot.subscriptions.clear();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.outbound = None;
        tracing::info!("Live channel disconnected");
    }

    fn subscribe(&self, topic: Topic, id: &str) {
        {
            let mut slot = lock(&self.slot);
            if slot.state != ChannelConnectionState::Connected {
                tracing::warn!(%topic, id, "Cannot subscribe: live channel not connected");
                return;
            }
            slot.subscriptions
                .insert((topic.to_string(), id.to_string()));
        }
        self.send(OutboundMessage::subscribe(topic, id));
    }

    fn unsubscribe(&self, topic: Topic, id: &str) {
        {
            let mut slot = lock(&self.slot);
            if slot.state != ChannelConnectionState::Connected {
                tracing::warn!(%topic, id, "Cannot unsubscribe: live channel not connected");
                return;
            }
            slot.subscriptions
                .remove(&(topic.to_string(), id.to_string()));
        }
        self.send(OutboundMessage::unsubscribe(topic, id));
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.slot).generation == generation
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Why a connected socket stopped pumping.
enum PumpExit {
    /// The channel owner dropped the outbound queue.
    LocalClose,
    /// The server closed the socket or the transport failed.
    Closed(String),
}

struct ConnectionTask {
    generation: u64,
    endpoint: ChannelEndpoint,
    policy: ReconnectPolicy,
    slot: Arc<Mutex<ConnectionSlot>>,
    events: mpsc::UnboundedSender<ChannelEnvelope>,
}

impl ConnectionTask {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<OutboundMessage>) {
        let mut failed_attempts = 0u32;
        loop {
            match open(&self.endpoint).await {
                Ok(socket) => {
                    failed_attempts = 0;
                    let Some(resubscribe) = self.mark_connected() else {
                        return;
                    };
                    tracing::info!(generation = self.generation, "Live channel connected");
                    match self.pump(socket, &mut outbound, resubscribe).await {
                        PumpExit::LocalClose => return,
                        PumpExit::Closed(reason) => {
                            tracing::warn!(generation = self.generation, %reason, "Live channel closed");
                            if !self.set_state(ChannelConnectionState::Connecting)
                                || !self.emit(ChannelEvent::Disconnected { reason })
                            {
                                return;
                            }
                        }
                    }
                }
                Err(error) => {
                    failed_attempts += 1;
                    let exhausted = !self.policy.allows_retry(failed_attempts);
                    tracing::warn!(
                        generation = self.generation,
                        attempt = failed_attempts,
                        max_attempts = self.policy.max_attempts,
                        %error,
                        "Live channel connection attempt failed"
                    );
                    if exhausted {
                        self.set_state(ChannelConnectionState::Disconnected);
                        self.emit(ChannelEvent::TransportError {
                            message: error.to_string(),
                            exhausted: true,
                        });
                        return;
                    }
                    if !self.emit(ChannelEvent::TransportError {
                        message: error.to_string(),
                        exhausted: false,
                    }) {
                        return;
                    }
                }
            }
            tokio::time::sleep(self.policy.delay).await;
        }
    }

    async fn pump(
        &self,
        socket: Socket,
        outbound: &mut mpsc::UnboundedReceiver<OutboundMessage>,
        resubscribe: Vec<OutboundMessage>,
    ) -> PumpExit {
        let (mut sink, mut stream) = socket.split();

        for message in resubscribe {
            if let Err(error) = send_json(&mut sink, &message).await {
                return PumpExit::Closed(error.to_string());
            }
        }

        loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match decode_event(text.as_str(), Timestamp::now()) {
                            Ok(event) => {
                                if !self.emit(event) {
                                    return PumpExit::LocalClose;
                                }
                            }
                            Err(error) => {
                                tracing::warn!(generation = self.generation, %error, "Ignoring live channel message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "server closed connection".to_string());
                        return PumpExit::Closed(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => return PumpExit::Closed(error.to_string()),
                    None => return PumpExit::Closed("connection lost".to_string()),
                },
                message = outbound.recv() => match message {
                    Some(message) => {
                        if let Err(error) = send_json(&mut sink, &message).await {
                            return PumpExit::Closed(error.to_string());
                        }
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return PumpExit::LocalClose;
                    }
                },
            }
        }
    }

    /// Flip to `Connected` and collect subscriptions to restore.
    ///
    /// Returns `None` if this generation is no longer current.
    fn mark_connected(&self) -> Option<Vec<OutboundMessage>> {
        let mut slot = lock(&self.slot);
        if slot.generation != self.generation {
            return None;
        }
        slot.state = ChannelConnectionState::Connected;
        Some(
            slot.subscriptions
                .iter()
                .map(|(topic, id)| OutboundMessage {
                    event: format!("subscribe:{topic}"),
                    data: id.clone(),
                })
                .collect(),
        )
    }

    fn set_state(&self, state: ChannelConnectionState) -> bool {
        let mut slot = lock(&self.slot);
        if slot.generation != self.generation {
            return false;
        }
        slot.state = state;
        true
    }

    fn emit(&self, event: ChannelEvent) -> bool {
        self.events
            .send(ChannelEnvelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

async fn open(endpoint: &ChannelEndpoint) -> Result<Socket, ChannelError> {
    let mut request = endpoint
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| ChannelError::Transport(e.to_string()))?;
    if let Some(token) = &endpoint.bearer_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    let (socket, _response) = connect_async(request)
        .await
        .map_err(|e| ChannelError::Transport(e.to_string()))?;
    Ok(socket)
}

async fn send_json<S>(sink: &mut S, message: &OutboundMessage) -> Result<(), ChannelError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json =
        serde_json::to_string(message).map_err(|e| ChannelError::InvalidEvent(e.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| ChannelError::Transport(e.to_string()))
}
