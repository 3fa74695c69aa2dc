//! UseCase: ライブチャンネルのライフサイクル管理
//!
//! 認証状態とプロセスの可視状態から「チャンネルを開くべきか」を決める唯一の
//! 権限者です。判断は常に両入力の最新値だけから導かれ、到着順には依存しません。
//!
//! | Desire | Event | Condition | New | Action |
//! |---|---|---|---|---|
//! | Disconnected | AuthChanged(Authenticated) | visibility Active | Connected | connect() |
//! | Disconnected | VisibilityChanged(Active) | authenticated, prior not Active | Connected | invalidate `shipments:all`, then connect() |
//! | Connected | AuthChanged(≠Authenticated) | | Disconnected | disconnect() |
//! | Connected | VisibilityChanged(Background/Inactive) | prior Active | Disconnected | disconnect() |
//! | Connected | VisibilityChanged(Active) | already connected | Connected | no-op |
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 任意の入力列の後で desired state が最新入力の純関数になっていること
//! - connect() / disconnect() が重複して呼ばれないこと
//! - バックグラウンド中のプッシュ → フォアグラウンド復帰の順序
//! - 切断済み世代のイベントが破棄されること
//! - 再接続の打ち切りと手動 retry
//! - バックグラウンド移行時にキューに残った位置イベントが近接通知に届くこと
//!
//! ### どのような状況を想定しているか
//! - フェイクチャンネル（状態と呼び出しログを共有）と mockall のモックを併用

use std::mem;

use tokio::sync::{mpsc, oneshot};

use crate::domain::{
    AuthSession, AuthStatus, ChannelConnectionState, ChannelEndpoint, ChannelEnvelope,
    ChannelEvent, ConnectionHandle, NotificationData, ProcessVisibility, RealtimeChannel,
    Timestamp, Topic, session::channel_should_be_open,
};

use super::{
    dispatch::{ChannelEventListener, DispatchContext, EventDispatcher},
    invalidate_cache::InvalidateCacheUseCase,
    register_push::PushRegistrationManager,
};

/// Inputs accepted by the coordinator loop.
#[derive(Debug)]
pub enum LifecycleInput {
    AuthChanged(AuthSession),
    VisibilityChanged(ProcessVisibility),
    PushReceived(NotificationData),
    Subscribe(Topic, String),
    Unsubscribe(Topic, String),
    Retry,
    Status(oneshot::Sender<CoordinatorStatus>),
    Shutdown,
}

/// Whether the coordinator wants the live channel open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesiredState {
    Disconnected,
    Connected,
}

/// Snapshot for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub desired: DesiredState,
    pub channel: ChannelConnectionState,
    pub auth: AuthStatus,
    pub visibility: ProcessVisibility,
    pub generation: Option<u64>,
    pub reconnect_exhausted: bool,
}

/// ライフサイクルコーディネーター
pub struct LifecycleCoordinator<C: RealtimeChannel> {
    channel: C,
    realtime_url: String,
    invalidation: InvalidateCacheUseCase,
    dispatcher: EventDispatcher,
    push: Option<PushRegistrationManager>,
    auth: AuthSession,
    visibility: ProcessVisibility,
    desired: DesiredState,
    handle: Option<ConnectionHandle>,
    reconnect_exhausted: bool,
}

impl<C: RealtimeChannel> LifecycleCoordinator<C> {
    /// 新しい LifecycleCoordinator を作成
    ///
    /// Starts signed out, in the foreground, with the channel closed. The
    /// cache invalidation listener is always the first listener.
    pub fn new(
        channel: C,
        realtime_url: impl Into<String>,
        invalidation: InvalidateCacheUseCase,
    ) -> Self {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Box::new(invalidation.clone()));
        Self {
            channel,
            realtime_url: realtime_url.into(),
            invalidation,
            dispatcher,
            push: None,
            auth: AuthSession::idle(),
            visibility: ProcessVisibility::Active,
            desired: DesiredState::Disconnected,
            handle: None,
            reconnect_exhausted: false,
        }
    }

    /// Add a listener after the cache invalidation listener.
    pub fn with_listener(mut self, listener: Box<dyn ChannelEventListener>) -> Self {
        self.dispatcher.register(listener);
        self
    }

    pub fn with_push(mut self, push: PushRegistrationManager) -> Self {
        self.push = Some(push);
        self
    }

    pub fn desired(&self) -> DesiredState {
        self.desired
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            desired: self.desired,
            channel: self.channel.state(),
            auth: self.auth.status,
            visibility: self.visibility,
            generation: self.handle.map(|handle| handle.generation),
            reconnect_exhausted: self.reconnect_exhausted,
        }
    }

    /// 認証状態の変化
    pub fn handle_auth_changed(&mut self, session: AuthSession) {
        let previous = mem::replace(&mut self.auth, session);
        let signed_in = !previous.is_authenticated() && self.auth.is_authenticated();
        let signed_out = previous.is_authenticated() && !self.auth.is_authenticated();
        let switched_user = previous.is_authenticated()
            && self.auth.is_authenticated()
            && previous.user_id != self.auth.user_id;

        tracing::info!(
            from = ?previous.status,
            to = ?self.auth.status,
            user_id = ?self.auth.user_id.as_ref().map(ToString::to_string),
            "Auth changed"
        );

        if (signed_out || switched_user)
            && let Some(push) = &self.push
        {
            push.reset();
        }
        if switched_user && self.desired == DesiredState::Connected {
            // the open connection carries the previous user's token
            self.close();
        }

        self.reconcile();

        if signed_in || switched_user {
            self.spawn_push_registration();
        }
    }

    /// プロセス可視状態の変化
    pub fn handle_visibility_changed(&mut self, next: ProcessVisibility) {
        let previous = mem::replace(&mut self.visibility, next);
        if previous == next {
            return;
        }
        tracing::info!(from = %previous, to = %next, "Visibility changed");

        let regained = previous.is_foreground_regain(next) && self.auth.is_authenticated();
        if regained {
            // updates may have arrived by push only while backgrounded
            self.invalidation.on_foreground_regain();
        }

        self.reconcile();

        if regained {
            self.spawn_push_registration();
        }
    }

    /// Bring the channel in line with the latest inputs.
    fn reconcile(&mut self) {
        let should_open = channel_should_be_open(self.auth.status, self.visibility);
        match (self.desired, should_open) {
            (DesiredState::Disconnected, true) => self.open(),
            (DesiredState::Connected, false) => self.close(),
            (DesiredState::Connected, true) | (DesiredState::Disconnected, false) => {
                tracing::trace!(desired = ?self.desired, "Channel already as desired");
            }
        }
    }

    fn endpoint(&self) -> ChannelEndpoint {
        ChannelEndpoint {
            url: self.realtime_url.clone(),
            bearer_token: self.auth.token.clone(),
        }
    }

    fn open(&mut self) {
        let endpoint = self.endpoint();
        let handle = self.channel.connect(endpoint);
        tracing::info!(generation = handle.generation, "Live channel requested");
        self.handle = Some(handle);
        self.desired = DesiredState::Connected;
        self.reconnect_exhausted = false;
    }

    fn close(&mut self) {
        self.channel.disconnect();
        self.handle = None;
        self.desired = DesiredState::Disconnected;
        self.reconnect_exhausted = false;
    }

    fn spawn_push_registration(&self) {
        if let Some(push) = &self.push {
            let push = push.clone();
            tokio::spawn(async move {
                push.register_if_needed().await;
            });
        }
    }

    /// チャンネルからのイベント
    ///
    /// Envelopes from a torn-down generation are dropped.
    pub fn handle_channel_envelope(&mut self, envelope: ChannelEnvelope) {
        self.dispatch_envelope(envelope, self.visibility);
    }

    /// Dispatch current-generation envelopes still queued in `events` as if
    /// they arrived after the switch to `next`.
    ///
    /// Called before leaving the foreground closes the channel, so a position
    /// report that raced the visibility change is seen with the new
    /// visibility instead of being dropped.
    pub fn drain_backlog(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<ChannelEnvelope>,
        next: ProcessVisibility,
    ) -> usize {
        let mut drained = 0;
        while let Ok(envelope) = events.try_recv() {
            self.dispatch_envelope(envelope, next);
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(drained, visibility = %next, "Drained queued channel events");
        }
        drained
    }

    fn leaves_foreground(&self, next: ProcessVisibility) -> bool {
        self.visibility.is_active() && !next.is_active() && self.desired == DesiredState::Connected
    }

    fn dispatch_envelope(&mut self, envelope: ChannelEnvelope, visibility: ProcessVisibility) {
        let ChannelEnvelope { generation, event } = envelope;
        if self.desired != DesiredState::Connected || !self.channel.is_current(generation) {
            tracing::debug!(generation, event = event.name(), "Dropping stale channel event");
            return;
        }

        match &event {
            ChannelEvent::Connected { socket_id, .. } => {
                self.reconnect_exhausted = false;
                tracing::info!(generation, socket_id, "Live channel ready");
            }
            ChannelEvent::Disconnected { reason } => {
                tracing::info!(generation, reason, "Live channel dropped; reconnecting");
            }
            ChannelEvent::TransportError {
                message,
                exhausted: true,
            } => {
                self.reconnect_exhausted = true;
                tracing::error!(
                    generation,
                    message,
                    "Live channel gave up reconnecting; use retry to try again"
                );
            }
            ChannelEvent::TransportError { message, .. } => {
                tracing::debug!(generation, message, "Live channel transport error");
            }
            _ => {}
        }

        let context = DispatchContext {
            visibility,
            now: Timestamp::now(),
        };
        self.dispatcher.dispatch(&event, &context);
    }

    /// プッシュ通知の受信（バックグラウンド中の更新経路）
    pub fn handle_push(&mut self, data: &NotificationData) -> usize {
        tracing::info!(kind = ?data.kind, shipment_id = ?data.shipment_id.as_ref().map(ToString::to_string), "Push received");
        self.invalidation.on_push(data)
    }

    /// Reopen the channel after reconnect attempts ran out.
    ///
    /// Returns `false` when the channel should not be open or is not closed.
    pub fn retry(&mut self) -> bool {
        if self.desired != DesiredState::Connected {
            tracing::warn!("Retry ignored: live channel is not wanted right now");
            return false;
        }
        if self.channel.state() != ChannelConnectionState::Disconnected {
            tracing::debug!("Retry ignored: live channel still active");
            return false;
        }
        tracing::info!("Retrying live channel");
        self.open();
        true
    }

    pub fn subscribe(&self, topic: Topic, id: &str) {
        self.channel.subscribe(topic, id);
    }

    pub fn unsubscribe(&self, topic: Topic, id: &str) {
        self.channel.unsubscribe(topic, id);
    }

    fn handle_input(&mut self, input: LifecycleInput) {
        match input {
            LifecycleInput::AuthChanged(session) => self.handle_auth_changed(session),
            LifecycleInput::VisibilityChanged(next) => self.handle_visibility_changed(next),
            LifecycleInput::PushReceived(data) => {
                self.handle_push(&data);
            }
            LifecycleInput::Subscribe(topic, id) => self.subscribe(topic, &id),
            LifecycleInput::Unsubscribe(topic, id) => self.unsubscribe(topic, &id),
            LifecycleInput::Retry => {
                self.retry();
            }
            LifecycleInput::Status(reply) => {
                let _ = reply.send(self.status());
            }
            LifecycleInput::Shutdown => {}
        }
    }

    /// Drive the coordinator until `Shutdown` or until all input senders drop.
    ///
    /// Inputs are handled before queued channel events, so a sign-out is
    /// applied before anything it makes stale. Leaving the foreground first
    /// drains the current generation's queued events with the new visibility.
    pub async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<LifecycleInput>,
        mut events: mpsc::UnboundedReceiver<ChannelEnvelope>,
    ) {
        tracing::info!(listeners = self.dispatcher.len(), "Lifecycle coordinator started");
        loop {
            tokio::select! {
                biased;
                input = inputs.recv() => match input {
                    Some(LifecycleInput::Shutdown) | None => break,
                    Some(LifecycleInput::VisibilityChanged(next)) => {
                        if self.leaves_foreground(next) {
                            self.drain_backlog(&mut events, next);
                        }
                        self.handle_visibility_changed(next);
                    }
                    Some(input) => self.handle_input(input),
                },
                Some(envelope) = events.recv() => self.handle_channel_envelope(envelope),
            }
        }
        if self.desired == DesiredState::Connected {
            self.close();
        }
        tracing::info!("Lifecycle coordinator stopped");
    }
}
