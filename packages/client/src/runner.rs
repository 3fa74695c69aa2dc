//! Client wiring and command loop.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    config::SyncConfig,
    domain::{
        AuthSession, AuthStatus, LocalNotification, NotificationScheduler, ShipmentId, Timestamp,
        Topic,
    },
    error::ClientError,
    infrastructure::{
        cache::InMemoryQueryCache,
        channel::WebSocketChannel,
        http::{ApiClient, SessionTokenProvider},
        notification::{ConfiguredPushPlatform, TracingNotificationScheduler},
        storage::FilePushTokenStore,
    },
    signal::shutdown_signal,
    ui::{Command, HELP, spawn_repl},
    usecase::{
        InvalidateCacheUseCase, LifecycleCoordinator, LifecycleInput, ProximityMonitor,
        PushRegistrationManager, QueryError, ShipmentQueries,
    },
};

const PLATFORM: &str = "cli";

/// Handles to everything a command may touch.
struct Client {
    auth: Arc<SessionTokenProvider>,
    inputs: mpsc::UnboundedSender<LifecycleInput>,
    push: PushRegistrationManager,
    proximity: ProximityMonitor,
    queries: ShipmentQueries,
    scheduler: Arc<TracingNotificationScheduler>,
    route_speed_kmh: f64,
}

/// Wire the sync core and run the interactive prompt until quit or Ctrl-C.
///
/// # Errors
///
/// Returns an error if the REST client cannot be built.
pub async fn run_client(config: SyncConfig) -> Result<(), ClientError> {
    let (session_tx, session_rx) = watch::channel(AuthSession::idle());
    let auth = Arc::new(SessionTokenProvider::new(session_tx));
    let api = Arc::new(ApiClient::new(&config.api_url, auth.clone(), PLATFORM)?);

    let cache = Arc::new(InMemoryQueryCache::new());
    let scheduler = Arc::new(TracingNotificationScheduler::new());
    let push = PushRegistrationManager::new(
        Arc::new(ConfiguredPushPlatform::new(
            config.permission(),
            config.device_push_token.clone(),
        )),
        Arc::new(FilePushTokenStore::new(config.push_token_path.clone())),
        api.clone(),
        auth.subscribe(),
    );
    let proximity = ProximityMonitor::new(scheduler.clone(), config.proximity_policy());
    let queries = ShipmentQueries::new(cache.clone(), api);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let channel = WebSocketChannel::new(events_tx, config.reconnect_policy());
    let coordinator = LifecycleCoordinator::new(
        channel,
        config.realtime_url.clone(),
        InvalidateCacheUseCase::new(cache),
    )
    .with_listener(Box::new(proximity.clone()))
    .with_push(push.clone());

    let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
    let coordinator_task = tokio::spawn(coordinator.run(inputs_rx, events_rx));
    let forward_task = tokio::spawn(forward_auth_changes(session_rx, inputs_tx.clone()));

    let client = Client {
        auth,
        inputs: inputs_tx.clone(),
        push,
        proximity,
        queries,
        scheduler,
        route_speed_kmh: config.route_speed_kmh,
    };

    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
    spawn_repl(commands_tx);
    println!("Trackline sync client. Type 'help' for commands.");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            command = commands_rx.recv() => match command {
                None | Some(Command::Quit) => break,
                Some(command) => client.handle(command).await,
            },
        }
    }

    let _ = inputs_tx.send(LifecycleInput::Shutdown);
    if let Err(error) = coordinator_task.await {
        tracing::error!(%error, "Lifecycle coordinator task failed");
    }
    forward_task.abort();
    Ok(())
}

/// Publish every auth session change to the coordinator.
async fn forward_auth_changes(
    mut session: watch::Receiver<AuthSession>,
    inputs: mpsc::UnboundedSender<LifecycleInput>,
) {
    while session.changed().await.is_ok() {
        let current = session.borrow_and_update().clone();
        if inputs.send(LifecycleInput::AuthChanged(current)).is_err() {
            break;
        }
    }
}

/// Refetch stale queries once the coordinator has applied a foreground regain.
///
/// The status round trip orders the refetch after the regain's invalidation.
/// Returns `None` when the coordinator is gone or nobody is signed in.
async fn refresh_after_regain(
    inputs: &mpsc::UnboundedSender<LifecycleInput>,
    queries: &ShipmentQueries,
) -> Option<JoinHandle<usize>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    inputs.send(LifecycleInput::Status(reply_tx)).ok()?;
    let status = reply_rx.await.ok()?;
    if status.auth != AuthStatus::Authenticated {
        return None;
    }
    let queries = queries.clone();
    Some(tokio::spawn(async move {
        let refreshed = queries.refresh_stale().await;
        tracing::info!(refreshed, "Refetched stale queries after foreground regain");
        refreshed
    }))
}

fn format_timestamp(timestamp: Timestamp) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp.value())
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_query(result: Result<serde_json::Value, QueryError>) {
    match result {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{value}"),
        },
        Err(error) => println!("error: {error}"),
    }
}

impl Client {
    fn send(&self, input: LifecycleInput) {
        if self.inputs.send(input).is_err() {
            tracing::warn!("Lifecycle coordinator stopped; input dropped");
        }
    }

    async fn handle(&self, command: Command) {
        match command {
            Command::SignIn { user_id, token } => {
                println!("signed in as {user_id}");
                self.auth.publish(AuthSession::authenticated(user_id, token));
            }
            Command::SignOut => {
                if !self.auth.current().is_authenticated() {
                    println!("not signed in");
                    return;
                }
                // the DELETE needs the bearer token, so unregister first
                self.push.unregister().await;
                self.auth.publish(AuthSession::idle());
                println!("signed out");
            }
            Command::Visibility(next) => {
                self.send(LifecycleInput::VisibilityChanged(next));
                if next.is_active() {
                    refresh_after_regain(&self.inputs, &self.queries).await;
                }
            }
            Command::Push(data) => self.send(LifecycleInput::PushReceived(data)),
            Command::EnablePush => match self.push.enable_after_user_action().await {
                Some(token) => println!("push registered: {token}"),
                None => println!("push not registered ({:?})", self.push.snapshot().state()),
            },
            Command::Retry => self.send(LifecycleInput::Retry),
            Command::Status => self.print_status().await,
            Command::Subscribe { topic, id } => self.send(LifecycleInput::Subscribe(topic, id)),
            Command::Unsubscribe { topic, id } => {
                self.send(LifecycleInput::Unsubscribe(topic, id))
            }
            Command::Track {
                shipment_id,
                destination,
                driver_id,
            } => {
                self.proximity
                    .track(shipment_id.clone(), destination, driver_id);
                self.send(LifecycleInput::Subscribe(
                    Topic::Shipment,
                    shipment_id.to_string(),
                ));
            }
            Command::Untrack(shipment_id) => {
                self.proximity.untrack(&shipment_id);
                self.send(LifecycleInput::Unsubscribe(
                    Topic::Shipment,
                    shipment_id.to_string(),
                ));
            }
            Command::Shipments => print_query(self.queries.shipments().await),
            Command::Shipment(id) => print_query(self.queries.shipment(&id).await),
            Command::History(id) => print_query(self.queries.shipment_history(&id).await),
            Command::Eta(id) => self.print_eta(&id),
            Command::TestNotification => {
                if let Err(error) = self.scheduler.schedule(LocalNotification::test()) {
                    println!("error: {error}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    async fn print_status(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LifecycleInput::Status(reply_tx));
        match reply_rx.await {
            Ok(status) => {
                println!(
                    "auth: {:?}  visibility: {}  desired: {:?}  channel: {:?}",
                    status.auth, status.visibility, status.desired, status.channel
                );
                if status.reconnect_exhausted {
                    println!("live channel gave up reconnecting; type 'retry'");
                }
            }
            Err(_) => println!("coordinator stopped"),
        }

        let registration = self.push.snapshot();
        println!(
            "push: {:?}  backend: {}  failures: {}  last attempt: {}",
            registration.state(),
            registration.registered_with_backend(),
            registration.backend_failures(),
            registration
                .last_attempt_at()
                .map(format_timestamp)
                .unwrap_or_else(|| "never".to_string()),
        );
    }

    fn print_eta(&self, shipment_id: &ShipmentId) {
        match self.proximity.route_eta(shipment_id, self.route_speed_kmh) {
            Some(estimate) => println!(
                "{shipment_id}: {:.1} km, about {} min",
                estimate.distance_km, estimate.minutes
            ),
            None => println!("{shipment_id}: no driver position yet (use 'track' first)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            CacheKey, ChannelConnectionState, ProcessVisibility, QueryCache,
            port::MockShipmentFetcher,
        },
        usecase::{CoordinatorStatus, DesiredState},
    };
    use mockall::predicate::eq;
    use serde_json::json;

    /// Answer the next `Status` input with `auth`.
    fn answer_status(mut inputs: mpsc::UnboundedReceiver<LifecycleInput>, auth: AuthStatus) {
        tokio::spawn(async move {
            if let Some(LifecycleInput::Status(reply)) = inputs.recv().await {
                let _ = reply.send(CoordinatorStatus {
                    desired: DesiredState::Connected,
                    channel: ChannelConnectionState::Connected,
                    auth,
                    visibility: ProcessVisibility::Active,
                    generation: Some(1),
                    reconnect_exhausted: false,
                });
            }
        });
    }

    #[tokio::test]
    async fn test_foreground_regain_refetches_stale_queries() {
        // テスト項目: フォアグラウンド復帰後、無効化済みのクエリを再取得する
        // given (前提条件):
        let cache = Arc::new(InMemoryQueryCache::new());
        cache.put(CacheKey::ShipmentsAll, json!([]), Timestamp::new(0));
        cache.invalidate(&CacheKey::ShipmentsAll);
        let mut fetcher = MockShipmentFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq("/api/users/me/shipments"))
            .times(1)
            .returning(|_| Ok(json!([{"id": "42"}])));
        let queries = ShipmentQueries::new(cache.clone(), Arc::new(fetcher));
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        answer_status(inputs_rx, AuthStatus::Authenticated);

        // when (操作):
        let refreshed = refresh_after_regain(&inputs_tx, &queries)
            .await
            .unwrap()
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(refreshed, 1);
        assert!(cache.stale_keys().is_empty());
    }

    #[tokio::test]
    async fn test_foreground_regain_while_signed_out_does_not_refetch() {
        // テスト項目: 未認証のフォアグラウンド復帰では再取得しない
        // given (前提条件):
        let cache = Arc::new(InMemoryQueryCache::new());
        cache.put(CacheKey::ShipmentsAll, json!([]), Timestamp::new(0));
        cache.invalidate(&CacheKey::ShipmentsAll);
        let mut fetcher = MockShipmentFetcher::new();
        fetcher.expect_fetch().never();
        let queries = ShipmentQueries::new(cache.clone(), Arc::new(fetcher));
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        answer_status(inputs_rx, AuthStatus::Idle);

        // when (操作):
        let task = refresh_after_regain(&inputs_tx, &queries).await;

        // then (期待する結果):
        assert!(task.is_none());
        assert_eq!(cache.stale_keys(), vec![CacheKey::ShipmentsAll]);
    }
}
