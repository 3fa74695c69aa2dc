//! UseCase: プッシュ通知トークンの登録
//!
//! サインイン時とフォアグラウンド復帰時に呼び出されます。
//!
//! 1. 通知許可を確認する（拒否されたら終了、再プロンプトしない）
//! 2. デバイストークンを取得する
//! 3. ローカルに保存する
//! 4. バックエンドへ POST する（失敗はログに残して握りつぶす）
//!
//! 一度成功した後は、ローカルのトークン照合と失敗していた POST の再送だけを
//! 行う軽い再検証になります。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 許可拒否後にプロンプトを再表示しないこと
//! - サインアウト中に完了した古い登録が新しいセッションの状態を書き換えないこと
//! - バックエンド登録失敗が呼び出し元に伝播しないこと
//!
//! ### どのような状況を想定しているか
//! - 正常系：初回登録、再検証
//! - 異常系：許可拒否、トークン取得不可、バックエンド不達
//! - 競合：登録中のサインアウト（ブロックするフェイクバックエンドで再現）

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::domain::{
    AuthSession, PermissionStatus, PushPlatform, PushRegistration, PushToken, PushTokenBackend,
    PushTokenStore, RegistrationError, RegistrationState, Timestamp, UserId,
};

/// What `register_if_needed` decided to do.
enum Plan {
    Full { attempt: u64, user_id: UserId },
    Revalidate { attempt: u64, token: PushToken, backend_ok: bool },
    Skip,
}

/// プッシュ登録のユースケース
///
/// Clones share the registration state; flows are serialised so only one is
/// in flight at a time.
#[derive(Clone)]
pub struct PushRegistrationManager {
    platform: Arc<dyn PushPlatform>,
    store: Arc<dyn PushTokenStore>,
    backend: Arc<dyn PushTokenBackend>,
    registration: Arc<Mutex<PushRegistration>>,
    session: watch::Receiver<AuthSession>,
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl PushRegistrationManager {
    /// 新しい PushRegistrationManager を作成
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        store: Arc<dyn PushTokenStore>,
        backend: Arc<dyn PushTokenBackend>,
        session: watch::Receiver<AuthSession>,
    ) -> Self {
        Self {
            platform,
            store,
            backend,
            registration: Arc::new(Mutex::new(PushRegistration::new())),
            session,
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn registration(&self) -> MutexGuard<'_, PushRegistration> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current registration.
    pub fn snapshot(&self) -> PushRegistration {
        self.registration().clone()
    }

    fn signed_in_user(&self) -> Option<UserId> {
        let session = self.session.borrow();
        if session.is_authenticated() {
            session.user_id.clone()
        } else {
            None
        }
    }

    /// Attempt `attempt` may still write state.
    fn is_current(&self, attempt: u64, user_id: &UserId) -> bool {
        self.registration().attempt() == attempt
            && self.signed_in_user().as_ref() == Some(user_id)
    }

    /// Register the device for the signed-in user unless already done.
    ///
    /// Never fails; failures are logged and recorded on the registration.
    ///
    /// # Returns
    ///
    /// The registered token, or `None` when not authenticated, denied,
    /// unavailable or superseded by a sign-out.
    pub async fn register_if_needed(&self) -> Option<PushToken> {
        let _in_flight = self.in_flight.lock().await;

        let Some(user_id) = self.signed_in_user() else {
            tracing::debug!("Not signed in; skipping push registration");
            return None;
        };

        match self.plan(user_id) {
            Plan::Full { attempt, user_id } => self.register(attempt, user_id).await,
            Plan::Revalidate {
                attempt,
                token,
                backend_ok,
            } => self.revalidate(attempt, token, backend_ok).await,
            Plan::Skip => None,
        }
    }

    fn plan(&self, user_id: UserId) -> Plan {
        let mut registration = self.registration();
        let now = Timestamp::now();

        if registration.state() == RegistrationState::Registered
            && !registration.is_registered_for(&user_id)
        {
            tracing::info!(%user_id, "Push registration belongs to another user; starting over");
            registration.reset();
        }

        match registration.state() {
            RegistrationState::Registered => {
                let token = registration.token().cloned();
                let backend_ok = registration.registered_with_backend();
                match (registration.begin_revalidation(now), token) {
                    (Ok(attempt), Some(token)) => Plan::Revalidate {
                        attempt,
                        token,
                        backend_ok,
                    },
                    _ => Plan::Skip,
                }
            }
            RegistrationState::Unregistered => match registration.begin(user_id.clone(), now) {
                Ok(attempt) => Plan::Full { attempt, user_id },
                Err(error) => {
                    tracing::warn!(%error, "Cannot start push registration");
                    Plan::Skip
                }
            },
            state => {
                tracing::debug!(?state, "Push registration not attempted");
                Plan::Skip
            }
        }
    }

    async fn register(&self, attempt: u64, user_id: UserId) -> Option<PushToken> {
        tracing::info!(%user_id, attempt, "Starting push registration");

        if self.platform.request_permission().await == PermissionStatus::Denied {
            self.fail(attempt, RegistrationError::PermissionDenied);
            return None;
        }

        let token = match self.platform.device_token().await {
            Ok(token) => token,
            Err(error) => {
                self.fail(attempt, error);
                return None;
            }
        };

        if !self.is_current(attempt, &user_id) {
            tracing::info!(attempt, "Push registration superseded before saving token");
            return None;
        }
        if let Err(error) = self.store.save(&token).await {
            self.fail(attempt, error);
            return None;
        }

        let backend_ok = self.post_to_backend(&token).await;

        if !self.is_current(attempt, &user_id) {
            tracing::info!(attempt, "Push registration superseded; discarding result");
            return None;
        }
        match self
            .registration()
            .complete(attempt, token.clone(), backend_ok)
        {
            Ok(()) => {
                tracing::info!(%user_id, backend_ok, "Push registration complete");
                Some(token)
            }
            Err(error) => {
                tracing::info!(%error, "Discarding push registration result");
                None
            }
        }
    }

    async fn revalidate(&self, attempt: u64, token: PushToken, backend_ok: bool) -> Option<PushToken> {
        match self.store.load().await {
            Ok(Some(stored)) if stored == token => {}
            Ok(_) => {
                tracing::info!("Local push token missing or changed; saving again");
                if let Err(error) = self.store.save(&token).await {
                    tracing::warn!(%error, "Failed to persist push token");
                }
            }
            Err(error) => tracing::warn!(%error, "Failed to read local push token"),
        }

        if !backend_ok {
            let ok = self.post_to_backend(&token).await;
            if let Err(error) = self.registration().record_backend_result(attempt, ok) {
                tracing::info!(%error, "Discarding push re-registration result");
                return None;
            }
        }
        Some(token)
    }

    async fn post_to_backend(&self, token: &PushToken) -> bool {
        match self.backend.register(token).await {
            Ok(()) => true,
            Err(error) => {
                let failures = self.registration().backend_failures() + 1;
                tracing::warn!(
                    %error,
                    failures,
                    "Failed to register push token with backend; will retry on next foreground"
                );
                false
            }
        }
    }

    fn fail(&self, attempt: u64, error: RegistrationError) {
        tracing::warn!(%error, terminal = error.is_terminal(), "Push registration failed");
        if let Err(stale) = self.registration().fail(attempt, &error) {
            tracing::debug!(%stale, "Ignoring failure of superseded push registration");
        }
    }

    /// Sign-out: the next sign-in registers again.
    pub fn reset(&self) {
        self.registration().reset();
        tracing::debug!("Push registration reset");
    }

    /// Explicit sign-out: best-effort backend DELETE and local clear.
    pub async fn unregister(&self) {
        let _in_flight = self.in_flight.lock().await;

        let registered = self.registration().token().cloned();
        let token = match registered {
            Some(token) => Some(token),
            None => self.store.load().await.unwrap_or_else(|error| {
                tracing::warn!(%error, "Failed to read local push token");
                None
            }),
        };
        if let Some(token) = token {
            if let Err(error) = self.backend.unregister(&token).await {
                tracing::warn!(%error, "Failed to unregister push token from backend");
            }
        }
        if let Err(error) = self.store.clear().await {
            tracing::warn!(%error, "Failed to clear local push token");
        }
        self.reset();
    }

    /// User re-enabled notifications: lift a terminal failure and try again.
    pub async fn enable_after_user_action(&self) -> Option<PushToken> {
        self.registration().clear_terminal();
        self.register_if_needed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::port::{MockPushTokenBackend, MockPushTokenStore},
        infrastructure::notification::ConfiguredPushPlatform,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    const DEVICE_TOKEN: &str = "ExponentPushToken[device]";

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn signed_in(id: &str) -> AuthSession {
        AuthSession::authenticated(user(id), format!("jwt-{id}"))
    }

    fn granted() -> Arc<ConfiguredPushPlatform> {
        Arc::new(ConfiguredPushPlatform::new(
            PermissionStatus::Granted,
            Some(DEVICE_TOKEN.to_string()),
        ))
    }

    fn accepting_store() -> MockPushTokenStore {
        let mut store = MockPushTokenStore::new();
        store.expect_save().returning(|_| Ok(()));
        store
            .expect_load()
            .returning(|| Ok(Some(PushToken::new(DEVICE_TOKEN.to_string()).unwrap())));
        store.expect_clear().returning(|| Ok(()));
        store
    }

    /// Backend whose `register` blocks until released.
    struct GatedBackend {
        entered: Notify,
        release: Notify,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PushTokenBackend for GatedBackend {
        async fn register(&self, _token: &PushToken) -> Result<(), RegistrationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }

        async fn unregister(&self, _token: &PushToken) -> Result<(), RegistrationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_first_registration_persists_and_posts() {
        // テスト項目: 初回登録で保存と POST が行われ、再検証では再プロンプトしない
        // given (前提条件):
        let (_session_tx, session_rx) = watch::channel(signed_in("alice"));
        let platform = granted();
        let mut backend = MockPushTokenBackend::new();
        backend.expect_register().times(1).returning(|_| Ok(()));
        let manager = PushRegistrationManager::new(
            platform.clone(),
            Arc::new(accepting_store()),
            Arc::new(backend),
            session_rx,
        );

        // when (操作):
        let first = manager.register_if_needed().await;
        let second = manager.register_if_needed().await;

        // then (期待する結果):
        assert_eq!(first.unwrap().as_str(), DEVICE_TOKEN);
        assert_eq!(second.unwrap().as_str(), DEVICE_TOKEN);
        assert_eq!(platform.prompts(), 1);
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.state(), RegistrationState::Registered);
        assert!(snapshot.registered_with_backend());
    }

    #[tokio::test]
    async fn test_permission_denied_is_not_prompted_again() {
        // テスト項目: 許可拒否後は何度呼ばれてもプロンプトを再表示しない
        // given (前提条件):
        let (session_tx, session_rx) = watch::channel(signed_in("alice"));
        let platform = Arc::new(ConfiguredPushPlatform::new(
            PermissionStatus::Denied,
            Some(DEVICE_TOKEN.to_string()),
        ));
        let mut store = MockPushTokenStore::new();
        store.expect_save().never();
        let mut backend = MockPushTokenBackend::new();
        backend.expect_register().never();
        let manager = PushRegistrationManager::new(
            platform.clone(),
            Arc::new(store),
            Arc::new(backend),
            session_rx,
        );

        // when (操作):
        let first = manager.register_if_needed().await;
        let second = manager.register_if_needed().await;
        manager.reset();
        session_tx.send(signed_in("alice")).unwrap();
        let after_sign_in = manager.register_if_needed().await;

        // then (期待する結果):
        assert!(first.is_none() && second.is_none() && after_sign_in.is_none());
        assert_eq!(platform.prompts(), 1);
        assert_eq!(manager.snapshot().state(), RegistrationState::PermissionDenied);
    }

    #[tokio::test]
    async fn test_user_action_lifts_permission_denial() {
        // テスト項目: ユーザーの明示的な操作で再試行できる
        // given (前提条件):
        let (_session_tx, session_rx) = watch::channel(signed_in("alice"));
        let platform = Arc::new(ConfiguredPushPlatform::new(
            PermissionStatus::Denied,
            Some(DEVICE_TOKEN.to_string()),
        ));
        let manager = PushRegistrationManager::new(
            platform.clone(),
            Arc::new(accepting_store()),
            Arc::new(MockPushTokenBackend::new()),
            session_rx,
        );
        manager.register_if_needed().await;

        // when (操作):
        let result = manager.enable_after_user_action().await;

        // then (期待する結果):
        assert!(result.is_none());
        assert_eq!(platform.prompts(), 2);
    }

    #[tokio::test]
    async fn test_missing_device_token_is_terminal() {
        // テスト項目: デバイストークンが取得できない場合は TokenUnavailable で終了
        // given (前提条件):
        let (_session_tx, session_rx) = watch::channel(signed_in("alice"));
        let platform = Arc::new(ConfiguredPushPlatform::new(PermissionStatus::Granted, None));
        let manager = PushRegistrationManager::new(
            platform,
            Arc::new(MockPushTokenStore::new()),
            Arc::new(MockPushTokenBackend::new()),
            session_rx,
        );

        // when (操作):
        let result = manager.register_if_needed().await;

        // then (期待する結果):
        assert!(result.is_none());
        assert_eq!(manager.snapshot().state(), RegistrationState::TokenUnavailable);
    }

    #[tokio::test]
    async fn test_backend_failure_is_swallowed_and_retried() {
        // テスト項目: バックエンド不達は握りつぶされ、次回の再検証で再送される
        // given (前提条件):
        let (_session_tx, session_rx) = watch::channel(signed_in("alice"));
        let calls = Arc::new(AtomicU32::new(0));
        let mut backend = MockPushTokenBackend::new();
        let counter = calls.clone();
        backend.expect_register().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RegistrationError::BackendUnreachable("503".to_string()))
            } else {
                Ok(())
            }
        });
        let manager = PushRegistrationManager::new(
            granted(),
            Arc::new(accepting_store()),
            Arc::new(backend),
            session_rx,
        );

        // when (操作):
        let first = manager.register_if_needed().await;
        let after_first = manager.snapshot();
        manager.register_if_needed().await;

        // then (期待する結果):
        assert!(first.is_some());
        assert_eq!(after_first.state(), RegistrationState::Registered);
        assert!(!after_first.registered_with_backend());
        assert_eq!(after_first.backend_failures(), 1);
        assert!(manager.snapshot().registered_with_backend());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sign_out_during_registration_discards_result() {
        // テスト項目: 登録中にサインアウトすると、古い完了は新しいセッションに書き込まれない
        // given (前提条件):
        let (session_tx, session_rx) = watch::channel(signed_in("alice"));
        let backend = Arc::new(GatedBackend {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicU32::new(0),
        });
        let manager = PushRegistrationManager::new(
            granted(),
            Arc::new(accepting_store()),
            backend.clone(),
            session_rx,
        );
        let in_flight = tokio::spawn({
            let manager = manager.clone();
            async move { manager.register_if_needed().await }
        });
        backend.entered.notified().await;

        // when (操作):
        session_tx.send(AuthSession::idle()).unwrap();
        manager.reset();
        backend.release.notify_one();
        let stale = in_flight.await.unwrap();

        // then (期待する結果):
        assert!(stale.is_none());
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.state(), RegistrationState::Unregistered);
        assert!(snapshot.token().is_none());
        assert!(!snapshot.registered_with_backend());

        // 次のサインインで改めて登録される
        session_tx.send(signed_in("bob")).unwrap();
        let next = tokio::spawn({
            let manager = manager.clone();
            async move { manager.register_if_needed().await }
        });
        backend.entered.notified().await;
        backend.release.notify_one();
        assert!(next.await.unwrap().is_some());
        assert!(manager.snapshot().is_registered_for(&user("bob")));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_signed_in_does_nothing() {
        // テスト項目: 未認証では何もしない
        // given (前提条件):
        let (_session_tx, session_rx) = watch::channel(AuthSession::loading());
        let platform = granted();
        let manager = PushRegistrationManager::new(
            platform.clone(),
            Arc::new(MockPushTokenStore::new()),
            Arc::new(MockPushTokenBackend::new()),
            session_rx,
        );

        // when (操作):
        let result = manager.register_if_needed().await;

        // then (期待する結果):
        assert!(result.is_none());
        assert_eq!(platform.prompts(), 0);
    }

    #[tokio::test]
    async fn test_unregister_deletes_and_clears() {
        // テスト項目: 明示的なサインアウトでバックエンドから削除し、ローカルも消去する
        // given (前提条件):
        let (_session_tx, session_rx) = watch::channel(signed_in("alice"));
        let mut backend = MockPushTokenBackend::new();
        backend.expect_register().returning(|_| Ok(()));
        backend.expect_unregister().times(1).returning(|_| Ok(()));
        let mut store = MockPushTokenStore::new();
        store.expect_save().returning(|_| Ok(()));
        store.expect_clear().times(1).returning(|| Ok(()));
        let manager = PushRegistrationManager::new(
            granted(),
            Arc::new(store),
            Arc::new(backend),
            session_rx,
        );
        manager.register_if_needed().await;

        // when (操作):
        manager.unregister().await;

        // then (期待する結果):
        assert_eq!(manager.snapshot().state(), RegistrationState::Unregistered);
    }
}
