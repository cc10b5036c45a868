//! Session store: establishes, persists, restores and ends the session.

use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};

use serde_json::{Value, json};
use storefront_core::{
    AUTHORIZATION, ApiRequest, ApiTransport, Credential, KeyValueStore, SessionFeed,
    SessionState, SessionSubscription, StorageError, User,
};
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Result of the startup restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// A persisted session was installed.
    Restored,
    /// Nothing (or only half a record) was persisted.
    Empty,
    /// The persisted record could not be used and was cleared.
    Corrupt(String),
    /// `restore` already ran; nothing changed.
    AlreadyResolved,
}

#[derive(Clone)]
struct Identity {
    user: User,
    credential: Credential,
}

/// Internal session value. User and credential only exist together.
enum Phase {
    Resolving,
    Anonymous,
    Authenticated(Identity),
}

impl Phase {
    fn view(&self) -> SessionState {
        match self {
            Self::Resolving => SessionState::resolving(),
            Self::Anonymous => SessionState::anonymous(),
            Self::Authenticated(identity) => SessionState::authenticated(identity.user.clone()),
        }
    }
}

#[derive(Clone, Copy)]
enum AuthFlow {
    Login,
    Register,
}

impl AuthFlow {
    fn path(self, config: &SessionConfig) -> &str {
        match self {
            Self::Login => &config.login_path,
            Self::Register => &config.register_path,
        }
    }

    const fn fallback_message(self) -> &'static str {
        match self {
            Self::Login => "Login failed",
            Self::Register => "Registration failed",
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
        }
    }
}

/// Single source of truth for the session.
///
/// The store is the only writer of the persisted credential and user
/// record, and of the transport's `Authorization` default header.
pub struct SessionStore<S, T>
where
    S: KeyValueStore,
    T: ApiTransport,
{
    storage: S,
    transport: T,
    config: SessionConfig,
    phase: RwLock<Phase>,
    feed: Arc<SessionFeed>,
    auth_in_flight: Mutex<()>,
    restored: AtomicBool,
}

impl<S, T> SessionStore<S, T>
where
    S: KeyValueStore,
    T: ApiTransport,
{
    /// Create a store in `Resolving` status.
    #[must_use]
    pub fn new(storage: S, transport: T, config: SessionConfig) -> Self {
        Self::with_feed(storage, transport, config, Arc::new(SessionFeed::default()))
    }

    /// Create a store that publishes into an existing feed.
    #[must_use]
    pub fn with_feed(
        storage: S,
        transport: T,
        config: SessionConfig,
        feed: Arc<SessionFeed>,
    ) -> Self {
        feed.publish(SessionState::resolving());
        Self {
            storage,
            transport,
            config,
            phase: RwLock::new(Phase::Resolving),
            feed,
            auth_in_flight: Mutex::new(()),
            restored: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current `{status, user}` snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.feed.current()
    }

    /// Signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state().user
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().user.is_some()
    }

    /// Subscribe to session changes, starting from the current snapshot.
    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        self.feed.subscribe()
    }

    /// Shared handle to the feed, for subscribers that outlive a borrow.
    #[must_use]
    pub fn feed(&self) -> Arc<SessionFeed> {
        Arc::clone(&self.feed)
    }

    pub(crate) fn credential(&self) -> Option<Credential> {
        self.identity().map(|identity| identity.credential)
    }

    fn identity(&self) -> Option<Identity> {
        match &*self.phase.read().unwrap_or_else(PoisonError::into_inner) {
            Phase::Authenticated(identity) => Some(identity.clone()),
            Phase::Resolving | Phase::Anonymous => None,
        }
    }

    /// Swap the session value and publish it as one step.
    fn transition(&self, next: Phase) {
        let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        let state = next.view();
        *phase = next;
        self.feed.publish(state);
    }

    /// Reconstruct the session from persisted storage.
    ///
    /// Never fails: any problem with the persisted record clears it and
    /// resolves to `Anonymous`. Only the first call does anything.
    pub async fn restore(&self) -> RestoreOutcome {
        if self.restored.swap(true, Ordering::SeqCst) {
            return RestoreOutcome::AlreadyResolved;
        }

        let outcome = match self.load_persisted().await {
            Ok(Some(identity)) => {
                match self
                    .transport
                    .set_default_header(AUTHORIZATION, &identity.credential.bearer())
                {
                    Ok(()) => {
                        tracing::info!(user_id = %identity.user.id, "Session restored");
                        self.transition(Phase::Authenticated(identity));
                        return RestoreOutcome::Restored;
                    }
                    Err(e) => RestoreOutcome::Corrupt(e.to_string()),
                }
            }
            Ok(None) => RestoreOutcome::Empty,
            Err(reason) => RestoreOutcome::Corrupt(reason),
        };

        match &outcome {
            RestoreOutcome::Corrupt(reason) => {
                tracing::warn!(reason = %reason, "Persisted session corrupt, clearing");
                self.clear_persisted().await;
            }
            _ => tracing::info!("No persisted session"),
        }
        self.transition(Phase::Anonymous);
        outcome
    }

    async fn load_persisted(&self) -> Result<Option<Identity>, String> {
        let token = self
            .storage
            .get(&self.config.credential_key)
            .await
            .map_err(|e| e.to_string())?;
        let raw_user = self
            .storage
            .get(&self.config.user_key)
            .await
            .map_err(|e| e.to_string())?;

        let credential = token.and_then(Credential::new);
        match (credential, raw_user) {
            (Some(credential), Some(raw_user)) => {
                let user = serde_json::from_str::<User>(&raw_user)
                    .map_err(|e| format!("invalid user record: {e}"))?;
                Ok(Some(Identity { user, credential }))
            }
            (None, None) => Ok(None),
            _ => {
                tracing::debug!("Dropping half of a persisted session");
                self.clear_persisted().await;
                Ok(None)
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    /// Returns error if the server rejects the credentials, the request
    /// fails, the new session cannot be persisted, or another login or
    /// register call is in flight. The session is unchanged in every case.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        self.authenticate(
            AuthFlow::Login,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    /// Same as [`login`](Self::login).
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        self.authenticate(
            AuthFlow::Register,
            json!({ "name": name, "email": email, "password": password }),
        )
        .await
    }

    async fn authenticate(&self, flow: AuthFlow, body: Value) -> Result<User, SessionError> {
        let Ok(_in_flight) = self.auth_in_flight.try_lock() else {
            tracing::debug!(flow = flow.name(), "Rejected overlapping auth request");
            return Err(SessionError::InFlight);
        };

        let request = ApiRequest::post(flow.path(&self.config), body);
        let response = self.transport.send(request).await.map_err(|e| {
            tracing::warn!(flow = flow.name(), "Auth request failed: {e}");
            SessionError::Transport(e)
        })?;

        if !response.is_success() {
            let message = response
                .message()
                .unwrap_or_else(|| flow.fallback_message())
                .to_string();
            tracing::warn!(flow = flow.name(), status = response.status, "Auth rejected");
            return Err(SessionError::Authentication {
                status: response.status,
                message,
            });
        }

        let Identity { user, credential } = parse_auth_body(&response.body)?;
        let previous = self.identity();

        self.transport.set_default_header(AUTHORIZATION, &credential.bearer())?;
        if let Err(e) = self.persist(&credential, &user).await {
            tracing::warn!(flow = flow.name(), "Failed to persist session: {e}");
            self.roll_back(previous.as_ref()).await;
            return Err(e);
        }

        tracing::info!(flow = flow.name(), user_id = %user.id, "Signed in");
        self.transition(Phase::Authenticated(Identity {
            user: user.clone(),
            credential,
        }));
        Ok(user)
    }

    async fn persist(&self, credential: &Credential, user: &User) -> Result<(), SessionError> {
        let record = serde_json::to_string(user).map_err(StorageError::from)?;
        self.storage
            .set(&self.config.credential_key, credential.expose())
            .await?;
        self.storage.set(&self.config.user_key, &record).await?;
        Ok(())
    }

    /// Put the header and persisted record back to the session still in
    /// effect after a failed sign-in.
    async fn roll_back(&self, previous: Option<&Identity>) {
        let Some(identity) = previous else {
            self.transport.remove_default_header(AUTHORIZATION);
            self.clear_persisted().await;
            return;
        };

        if let Err(e) = self
            .transport
            .set_default_header(AUTHORIZATION, &identity.credential.bearer())
        {
            tracing::warn!("Failed to reinstall previous header: {e}");
        }
        if let Err(e) = self.persist(&identity.credential, &identity.user).await {
            tracing::warn!("Failed to restore persisted session: {e}");
            self.clear_persisted().await;
        }
    }

    /// End the session.
    ///
    /// Local effects always happen. A configured remote invalidation call
    /// runs afterwards and its failure is only logged.
    pub async fn logout(&self) {
        let previous = self.credential();

        self.transport.remove_default_header(AUTHORIZATION);
        self.clear_persisted().await;
        self.transition(Phase::Anonymous);
        tracing::info!("Signed out");

        if let (Some(path), Some(credential)) = (&self.config.logout_path, previous) {
            let request = ApiRequest::post(path.as_str(), json!({})).with_bearer(credential);
            match self.transport.send(request).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => {
                    tracing::warn!(status = response.status, "Remote logout rejected");
                }
                Err(e) => tracing::warn!("Remote logout failed: {e}"),
            }
        }
    }

    async fn clear_persisted(&self) {
        for key in [&self.config.credential_key, &self.config.user_key] {
            if let Err(e) = self.storage.remove(key).await {
                tracing::warn!(key = %key, "Failed to clear persisted value: {e}");
            }
        }
    }
}

fn parse_auth_body(body: &Value) -> Result<Identity, SessionError> {
    let credential = body
        .get("token")
        .and_then(Value::as_str)
        .and_then(Credential::new)
        .ok_or_else(|| SessionError::MalformedResponse("missing token".to_string()))?;
    let user = body
        .get("user")
        .cloned()
        .ok_or_else(|| SessionError::MalformedResponse("missing user".to_string()))
        .and_then(|raw| {
            serde_json::from_value::<User>(raw)
                .map_err(|e| SessionError::MalformedResponse(format!("invalid user: {e}")))
        })?;
    Ok(Identity { user, credential })
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use storefront_core::{ApiResponse, SessionStatus, TransportError, UserId};
    use tokio::sync::Notify;

    use super::*;
    use crate::storage::MemoryStore;

    /// Scripted transport that records requests and keeps a header map.
    #[derive(Clone, Default)]
    struct StubTransport {
        responses: Arc<StdMutex<VecDeque<Result<ApiResponse, TransportError>>>>,
        headers: Arc<StdMutex<HashMap<String, String>>>,
        requests: Arc<StdMutex<Vec<ApiRequest>>>,
        gate: Option<Arc<Notify>>,
        feed: Option<Arc<SessionFeed>>,
        status_at_install: Arc<StdMutex<Vec<SessionStatus>>>,
        status_at_remove: Arc<StdMutex<Vec<SessionStatus>>>,
    }

    impl StubTransport {
        fn replying(responses: Vec<Result<ApiResponse, TransportError>>) -> Self {
            Self {
                responses: Arc::new(StdMutex::new(responses.into())),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ApiTransport for StubTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("no scripted response".into())))
        }

        fn set_default_header(&self, name: &str, value: &str) -> Result<(), TransportError> {
            if value.contains('\n') {
                return Err(TransportError::InvalidHeader(name.to_string()));
            }
            if let Some(feed) = &self.feed {
                self.status_at_install
                    .lock()
                    .unwrap()
                    .push(feed.current().status);
            }
            self.headers
                .lock()
                .unwrap()
                .insert(name.to_string(), value.to_string());
            Ok(())
        }

        fn remove_default_header(&self, name: &str) {
            if let Some(feed) = &self.feed {
                self.status_at_remove
                    .lock()
                    .unwrap()
                    .push(feed.current().status);
            }
            self.headers.lock().unwrap().remove(name);
        }

        fn default_header(&self, name: &str) -> Option<String> {
            self.headers.lock().unwrap().get(name).cloned()
        }
    }

    /// Memory storage whose next write of the user record fails.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_user_write: Arc<AtomicBool>,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == "user" && self.fail_user_write.swap(false, Ordering::SeqCst) {
                return Err(StorageError::Internal("disk full".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    fn auth_ok() -> Result<ApiResponse, TransportError> {
        Ok(ApiResponse::new(
            200,
            json!({"token": "T", "user": {"id": 1, "name": "A"}}),
        ))
    }

    fn store_with(
        storage: MemoryStore,
        transport: StubTransport,
    ) -> SessionStore<MemoryStore, StubTransport> {
        SessionStore::new(storage, transport, SessionConfig::default())
    }

    /// Persisted keys and the in-memory session agree on presence.
    async fn assert_consistent<S: KeyValueStore>(store: &SessionStore<S, StubTransport>) {
        let state = store.state();
        let credential = store.credential();
        assert_eq!(state.user.is_some(), credential.is_some());
        assert_eq!(
            state.status == SessionStatus::Authenticated,
            state.user.is_some()
        );
        let token = store.storage().get("token").await.unwrap();
        let user = store.storage().get("user").await.unwrap();
        assert_eq!(token.is_some(), user.is_some());
    }

    #[tokio::test]
    async fn test_new_store_is_resolving() {
        let store = store_with(MemoryStore::new(), StubTransport::default());
        assert_eq!(store.state().status, SessionStatus::Resolving);
        assert!(store.user().is_none());
    }

    #[tokio::test]
    async fn test_restore_without_keys_is_anonymous() {
        let store = store_with(MemoryStore::new(), StubTransport::default());
        assert_eq!(store.restore().await, RestoreOutcome::Empty);
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.transport().default_header(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_restore_valid_record_installs_header() {
        let storage =
            MemoryStore::with_entries([("token", "T"), ("user", r#"{"id":1,"name":"A"}"#)]);
        let store = store_with(storage, StubTransport::default());

        assert_eq!(store.restore().await, RestoreOutcome::Restored);
        assert_eq!(store.state().status, SessionStatus::Authenticated);
        assert_eq!(store.user().map(|u| u.id), Some(UserId::Number(1)));
        assert_eq!(
            store.transport().default_header(AUTHORIZATION).as_deref(),
            Some("Bearer T")
        );
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_restore_corrupt_user_clears_both_keys() {
        let storage = MemoryStore::with_entries([("token", "T"), ("user", "{not json")]);
        let store = store_with(storage, StubTransport::default());

        assert!(matches!(store.restore().await, RestoreOutcome::Corrupt(_)));
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.storage().is_empty().unwrap());
        assert!(store.transport().default_header(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_restore_half_record_is_empty_and_cleared() {
        let storage = MemoryStore::with_entries([("token", "T")]);
        let store = store_with(storage, StubTransport::default());

        assert_eq!(store.restore().await, RestoreOutcome::Empty);
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.storage().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_restore_blank_token_counts_as_missing() {
        let storage =
            MemoryStore::with_entries([("token", ""), ("user", r#"{"id":1,"name":"A"}"#)]);
        let store = store_with(storage, StubTransport::default());
        assert_eq!(store.restore().await, RestoreOutcome::Empty);
        assert_eq!(store.state().status, SessionStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_restore_unusable_token_is_corrupt() {
        let storage = MemoryStore::with_entries([
            ("token", "bad\ntoken"),
            ("user", r#"{"id":1,"name":"A"}"#),
        ]);
        let store = store_with(storage, StubTransport::default());
        assert!(matches!(store.restore().await, RestoreOutcome::Corrupt(_)));
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.storage().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_restore_runs_once() {
        let store = store_with(MemoryStore::new(), StubTransport::default());
        store.restore().await;
        store.storage().set("token", "T").await.unwrap();
        assert_eq!(store.restore().await, RestoreOutcome::AlreadyResolved);
        assert_eq!(store.state().status, SessionStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_login_success_persists_and_installs_header() {
        let transport = StubTransport::replying(vec![auth_ok()]);
        let store = store_with(MemoryStore::new(), transport);
        store.restore().await;

        let user = store.login("a@b.com", "pw").await.unwrap();
        assert_eq!(user.name, "A");
        assert_eq!(store.state().status, SessionStatus::Authenticated);
        assert_eq!(
            store.storage().get("token").await.unwrap().as_deref(),
            Some("T")
        );
        assert_eq!(
            store.transport().default_header(AUTHORIZATION).as_deref(),
            Some("Bearer T")
        );

        let requests = store.transport().requests();
        assert_eq!(requests[0].path, "/auth/login");
        assert_eq!(requests[0].body["email"], "a@b.com");
        assert_eq!(requests[0].body["password"], "pw");
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_persisted_login_restores_in_new_process() {
        let storage = MemoryStore::new();
        let first = store_with(storage.clone(), StubTransport::replying(vec![auth_ok()]));
        first.restore().await;
        first.login("a@b.com", "pw").await.unwrap();

        let second = store_with(storage, StubTransport::default());
        assert_eq!(second.restore().await, RestoreOutcome::Restored);
        assert_eq!(second.user().map(|u| u.name), Some("A".to_string()));
    }

    #[tokio::test]
    async fn test_login_rejected_leaves_state_untouched() {
        let transport = StubTransport::replying(vec![Ok(ApiResponse::new(
            401,
            json!({"message": "Invalid credentials"}),
        ))]);
        let store = store_with(MemoryStore::new(), transport);
        store.restore().await;

        let err = store.login("a@b.com", "wrong").await.unwrap_err();
        match err {
            SessionError::Authentication { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.storage().is_empty().unwrap());
        assert!(store.transport().default_header(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_register_rejected_uses_fallback_message() {
        let transport = StubTransport::replying(vec![Ok(ApiResponse::new(400, Value::Null))]);
        let store = store_with(MemoryStore::new(), transport);
        store.restore().await;

        let err = store.register("Ann", "a@b.com", "pw").await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(err.to_string(), "Registration failed");
        assert_eq!(store.transport().requests()[0].path, "/auth/register");
        assert_eq!(store.transport().requests()[0].body["name"], "Ann");
    }

    #[tokio::test]
    async fn test_failed_login_keeps_existing_session() {
        let transport = StubTransport::replying(vec![
            auth_ok(),
            Err(TransportError::Network("connection reset".into())),
        ]);
        let store = store_with(MemoryStore::new(), transport);
        store.restore().await;
        store.login("a@b.com", "pw").await.unwrap();

        let err = store.login("b@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert!(!err.is_authentication());
        assert_eq!(store.user().map(|u| u.name), Some("A".to_string()));
        assert_eq!(
            store.transport().default_header(AUTHORIZATION).as_deref(),
            Some("Bearer T")
        );
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_rejected() {
        let transport = StubTransport::replying(vec![
            Ok(ApiResponse::new(200, json!({"user": {"id": 1, "name": "A"}}))),
            Ok(ApiResponse::new(200, json!({"token": "T", "user": {"id": 1}}))),
        ]);
        let store = store_with(MemoryStore::new(), transport);
        store.restore().await;

        for _ in 0..2 {
            let err = store.login("a@b.com", "pw").await.unwrap_err();
            assert!(matches!(err, SessionError::MalformedResponse(_)));
        }
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.storage().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_unusable_token_touches_nothing() {
        let transport = StubTransport::replying(vec![Ok(ApiResponse::new(
            200,
            json!({"token": "a\nb", "user": {"id": 1, "name": "A"}}),
        ))]);
        let store = store_with(MemoryStore::new(), transport);
        store.restore().await;

        let err = store.login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::InvalidHeader(_))));
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.storage().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_failed_relogin_keeps_persisted_session() {
        let storage = MemoryStore::new();
        let transport = StubTransport::replying(vec![
            auth_ok(),
            Ok(ApiResponse::new(200, json!({"token": "a\nb", "user": {"id": 2, "name": "B"}}))),
        ]);
        let store = store_with(storage.clone(), transport);
        store.restore().await;
        store.login("a@b.com", "pw").await.unwrap();

        let err = store.login("b@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::InvalidHeader(_))));
        assert_eq!(store.user().map(|u| u.name), Some("A".to_string()));
        assert_eq!(
            store.transport().default_header(AUTHORIZATION).as_deref(),
            Some("Bearer T")
        );
        assert_eq!(
            store.storage().get("token").await.unwrap().as_deref(),
            Some("T")
        );
        assert_consistent(&store).await;

        let next = store_with(storage, StubTransport::default());
        assert_eq!(next.restore().await, RestoreOutcome::Restored);
        assert_eq!(next.user().map(|u| u.name), Some("A".to_string()));
    }

    #[tokio::test]
    async fn test_persist_failure_restores_previous_session() {
        let storage = FlakyStore::default();
        let transport = StubTransport::replying(vec![
            auth_ok(),
            Ok(ApiResponse::new(200, json!({"token": "U", "user": {"id": 2, "name": "B"}}))),
        ]);
        let store = SessionStore::new(storage.clone(), transport, SessionConfig::default());
        store.restore().await;
        store.login("a@b.com", "pw").await.unwrap();

        storage.fail_user_write.store(true, Ordering::SeqCst);
        let err = store.login("b@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(StorageError::Internal(_))));

        assert_eq!(store.state().status, SessionStatus::Authenticated);
        assert_eq!(store.user().map(|u| u.name), Some("A".to_string()));
        assert_eq!(
            store.transport().default_header(AUTHORIZATION).as_deref(),
            Some("Bearer T")
        );
        assert_eq!(storage.get("token").await.unwrap().as_deref(), Some("T"));
        let record = storage.get("user").await.unwrap().unwrap();
        let persisted: User = serde_json::from_str(&record).unwrap();
        assert_eq!(persisted.name, "A");
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_persist_failure_without_session_leaves_nothing() {
        let storage = FlakyStore::default();
        storage.fail_user_write.store(true, Ordering::SeqCst);
        let transport = StubTransport::replying(vec![auth_ok()]);
        let store = SessionStore::new(storage.clone(), transport, SessionConfig::default());
        store.restore().await;

        let err = store.register("Ann", "a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.transport().default_header(AUTHORIZATION).is_none());
        assert!(storage.inner.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let transport = StubTransport::replying(vec![auth_ok()]);
        let store = store_with(MemoryStore::new(), transport);
        store.restore().await;
        store.login("a@b.com", "pw").await.unwrap();

        store.logout().await;
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.storage().is_empty().unwrap());
        assert!(store.transport().default_header(AUTHORIZATION).is_none());
        assert!(store.credential().is_none());
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_remote_logout_failure_does_not_block_local_logout() {
        let transport = StubTransport::replying(vec![
            auth_ok(),
            Err(TransportError::Network("offline".into())),
        ]);
        let store = SessionStore::new(
            MemoryStore::new(),
            transport,
            SessionConfig::default().with_logout_path("/auth/logout"),
        );
        store.restore().await;
        store.login("a@b.com", "pw").await.unwrap();

        store.logout().await;
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.storage().is_empty().unwrap());

        let requests = store.transport().requests();
        let remote = &requests[1];
        assert_eq!(remote.path, "/auth/logout");
        assert_eq!(remote.bearer.as_ref().map(Credential::expose), Some("T"));
    }

    #[tokio::test]
    async fn test_header_installed_before_status_flips() {
        let feed = Arc::new(SessionFeed::default());
        let transport = StubTransport {
            feed: Some(Arc::clone(&feed)),
            ..StubTransport::replying(vec![auth_ok()])
        };
        let store = SessionStore::with_feed(
            MemoryStore::new(),
            transport,
            SessionConfig::default(),
            feed,
        );
        store.restore().await;
        let mut sub = store.subscribe();

        store.login("a@b.com", "pw").await.unwrap();
        assert_eq!(
            *store.transport().status_at_install.lock().unwrap(),
            vec![SessionStatus::Anonymous]
        );

        let seen = sub.changed().await.map(|s| s.status);
        assert_eq!(seen, Some(SessionStatus::Authenticated));
        assert!(store.transport().default_header(AUTHORIZATION).is_some());
    }

    #[tokio::test]
    async fn test_header_removed_before_status_flips() {
        let feed = Arc::new(SessionFeed::default());
        let transport = StubTransport {
            feed: Some(Arc::clone(&feed)),
            ..StubTransport::replying(vec![auth_ok()])
        };
        let store = SessionStore::with_feed(
            MemoryStore::new(),
            transport,
            SessionConfig::default(),
            feed,
        );
        store.restore().await;
        store.login("a@b.com", "pw").await.unwrap();

        store.logout().await;
        assert_eq!(
            *store.transport().status_at_remove.lock().unwrap(),
            vec![SessionStatus::Authenticated]
        );
        assert_eq!(store.state().status, SessionStatus::Anonymous);
        assert!(store.transport().default_header(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_overlapping_login_is_rejected() {
        let gate = Arc::new(Notify::new());
        let transport = StubTransport {
            gate: Some(Arc::clone(&gate)),
            ..StubTransport::replying(vec![auth_ok()])
        };
        let store = store_with(MemoryStore::new(), transport);
        store.restore().await;

        let (first, second) = tokio::join!(store.login("a@b.com", "pw"), async {
            let second = store.register("B", "b@b.com", "pw").await;
            gate.notify_one();
            second
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(SessionError::InFlight)));
        assert_eq!(store.transport().requests().len(), 1);
        assert_eq!(store.user().map(|u| u.name), Some("A".to_string()));
    }

    #[tokio::test]
    async fn test_subscribers_never_see_partial_state() {
        let transport = StubTransport::replying(vec![auth_ok()]);
        let store = store_with(MemoryStore::new(), transport);
        let mut sub = store.subscribe();

        store.restore().await;
        store.login("a@b.com", "pw").await.unwrap();
        store.logout().await;

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let state = sub.changed().await.unwrap();
            assert_eq!(
                state.status == SessionStatus::Authenticated,
                state.user.is_some()
            );
            statuses.push(state.status);
        }
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Anonymous,
                SessionStatus::Authenticated,
                SessionStatus::Anonymous
            ]
        );
        assert!(!sub.catch_up());
    }
}
