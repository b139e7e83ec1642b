//! Session lifecycle tests against a scripted in-process auth API.
//! These exercise login, identity checks, refresh, logout and startup
//! hydration without any network.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::tempdir;

use nutrack::error::{SessionError, SessionResult};
use nutrack::identity::{
    guard_navigation, AuthApi, AuthStatus, GuardDecision, LoginRequest, Navigator, PasswordChange, RegisterRequest,
    RouteMeta, SessionManager, TokenResponse, TwoFactorSetup, UserProfile, LOGIN_PATH,
};
use nutrack::storage::{
    FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};

fn user() -> UserProfile {
    UserProfile::new(1, "a@b.com")
}

fn tokens(access: &str, refresh: &str) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        token_type: "bearer".to_string(),
        user: user(),
    }
}

#[derive(Default)]
struct ScriptedApi {
    // password accepted for a@b.com
    password: String,
    login_error: Mutex<Option<SessionError>>,
    register_error: Mutex<Option<SessionError>>,
    accepted_access: Mutex<HashSet<String>>,
    refreshes: Mutex<HashMap<String, TokenResponse>>,
    refresh_delay: Duration,
    me_user: Mutex<Option<UserProfile>>,
    default_auth: Mutex<Option<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedApi {
    fn new() -> Self {
        Self { password: "correct".to_string(), ..Self::default() }
    }

    fn accept(&self, access: &str) {
        self.accepted_access.lock().insert(access.to_string());
    }

    fn revoke(&self, access: &str) {
        self.accepted_access.lock().remove(access);
    }

    fn on_refresh(&self, refresh: &str, resp: TokenResponse) {
        self.accept(&resp.access_token);
        self.refreshes.lock().insert(refresh.to_string(), resp);
    }

    fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == name).count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    fn default_auth(&self) -> Option<String> {
        self.default_auth.lock().clone()
    }

    fn authorized(&self) -> SessionResult<()> {
        let current = self.default_auth.lock().clone();
        match current {
            Some(t) if self.accepted_access.lock().contains(&t) => Ok(()),
            _ => Err(SessionError::from_status(401, Some("Invalid authentication credentials".into()))),
        }
    }
}

#[async_trait]
impl AuthApi for ScriptedApi {
    async fn login(&self, req: &LoginRequest) -> SessionResult<TokenResponse> {
        self.calls.lock().push("login");
        if let Some(e) = self.login_error.lock().clone() {
            return Err(e);
        }
        if req.email == "a@b.com" && req.password == self.password {
            self.accept("AT1");
            Ok(tokens("AT1", "RT1"))
        } else {
            Err(SessionError::from_status(401, Some("Invalid email or password".into())))
        }
    }

    async fn register(&self, _req: &RegisterRequest) -> SessionResult<UserProfile> {
        self.calls.lock().push("register");
        match self.register_error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(user()),
        }
    }

    async fn me(&self) -> SessionResult<UserProfile> {
        self.calls.lock().push("me");
        self.authorized()?;
        Ok(self.me_user.lock().clone().unwrap_or_else(user))
    }

    async fn refresh(&self, refresh_token: &str) -> SessionResult<TokenResponse> {
        self.calls.lock().push("refresh");
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        self.refreshes
            .lock()
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| SessionError::from_status(401, Some("Invalid refresh token".into())))
    }

    async fn change_password(&self, req: &PasswordChange) -> SessionResult<()> {
        self.calls.lock().push("change_password");
        self.authorized()?;
        if req.old_password != self.password {
            return Err(SessionError::from_status(400, Some("Current password is incorrect".into())));
        }
        Ok(())
    }

    async fn setup_2fa(&self) -> SessionResult<TwoFactorSetup> {
        self.calls.lock().push("setup_2fa");
        self.authorized()?;
        Ok(TwoFactorSetup {
            qr_code: "data:image/png;base64,AAAA".into(),
            secret: "JBSWY3DPEHPK3PXP".into(),
            backup_codes: vec!["11111111".into(), "22222222".into()],
        })
    }

    async fn disable_2fa(&self) -> SessionResult<()> {
        self.calls.lock().push("disable_2fa");
        self.authorized()
    }

    fn set_default_authorization(&self, access_token: Option<&str>) {
        *self.default_auth.lock() = access_token.map(|t| t.to_string());
    }
}

#[derive(Default)]
struct RecordingNavigator {
    current: Mutex<Option<String>>,
    pushed: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> Option<String> {
        self.current.lock().clone()
    }

    fn push(&self, view: &str) {
        self.pushed.lock().push(view.to_string());
    }
}

/// Token store whose writes always fail.
struct ReadOnlyStore;

impl TokenStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Result<Option<String>, TokenStoreError> {
        Ok(None)
    }
    fn set(&self, _key: &str, _value: &str) -> Result<(), TokenStoreError> {
        Err(TokenStoreError::Io {
            path: "tokens.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
    fn remove(&self, _key: &str) -> Result<(), TokenStoreError> {
        Ok(())
    }
}

fn setup(api: ScriptedApi, store: MemoryTokenStore) -> (Arc<ScriptedApi>, Arc<MemoryTokenStore>, SessionManager) {
    let api = Arc::new(api);
    let store = Arc::new(store);
    let manager = SessionManager::new(api.clone(), store.clone());
    (api, store, manager)
}

fn stored(store: &MemoryTokenStore, key: &str) -> Option<String> {
    store.get(key).unwrap()
}

fn assert_fully_anonymous(manager: &SessionManager, store: &MemoryTokenStore) {
    assert_eq!(manager.status(), AuthStatus::Anonymous);
    assert!(manager.user().is_none());
    assert!(manager.access_token().is_none());
    assert!(manager.refresh_token().is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn login_then_check_auth_keeps_user() {
    let (api, store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());

    let user = manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    assert!(manager.is_authenticated());
    assert!(!manager.is_admin());
    assert_eq!(stored(&store, ACCESS_TOKEN_KEY).as_deref(), Some("AT1"));
    assert_eq!(stored(&store, REFRESH_TOKEN_KEY).as_deref(), Some("RT1"));
    assert_eq!(api.default_auth().as_deref(), Some("AT1"));
    assert_eq!(manager.last_error(), None);
    assert!(!manager.is_loading());

    let checked = manager.check_auth().await.unwrap();
    assert_eq!(checked, user);
    assert_eq!(manager.user(), Some(user));
    assert!(manager.is_authenticated());
    assert_eq!(api.count("refresh"), 0);
}

#[tokio::test]
async fn invalid_login_writes_nothing() {
    let (api, store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());

    let err = manager.login(&LoginRequest::new("a@b.com", "wrong")).await.unwrap_err();
    assert!(err.is_credential_rejected());
    assert_eq!(manager.last_error().as_deref(), Some("Invalid email or password"));
    assert_fully_anonymous(&manager, &store);
    assert_eq!(api.default_auth(), None);
}

#[tokio::test]
async fn transport_failure_without_detail_uses_fallback_message() {
    let api = ScriptedApi::new();
    *api.login_error.lock() = Some(SessionError::from_status(503, None));
    let (_api, store, manager) = setup(api, MemoryTokenStore::new());

    let err = manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap_err();
    assert!(!err.is_credential_rejected());
    assert_eq!(manager.last_error().as_deref(), Some("Login failed"));
    assert_fully_anonymous(&manager, &store);
}

#[tokio::test]
async fn successful_login_clears_previous_error() {
    let (_api, _store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());
    assert!(manager.login(&LoginRequest::new("a@b.com", "nope")).await.is_err());
    assert!(manager.last_error().is_some());
    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    assert_eq!(manager.last_error(), None);
}

#[tokio::test]
async fn storage_failure_fails_login_and_leaves_session_clear() {
    let api = Arc::new(ScriptedApi::new());
    let manager = SessionManager::new(api.clone(), Arc::new(ReadOnlyStore));

    let err = manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap_err();
    assert!(matches!(err, SessionError::Storage { .. }));
    assert_eq!(manager.last_error().as_deref(), Some("Login failed"));
    assert!(!manager.is_authenticated());
    assert!(manager.access_token().is_none());
    assert_eq!(api.default_auth(), None);
}

#[tokio::test]
async fn logout_clears_everything_regardless_of_state() {
    let (api, store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());
    manager.logout();
    assert_fully_anonymous(&manager, &store);

    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    manager.logout();
    assert_fully_anonymous(&manager, &store);
    assert_eq!(api.default_auth(), None);
    // no server-side revocation
    assert_eq!(api.count("login"), 1);
    assert_eq!(api.total_calls(), 1);
}

#[tokio::test]
async fn logout_redirects_to_login_unless_already_there() {
    let api: Arc<ScriptedApi> = Arc::new(ScriptedApi::new());
    let nav = Arc::new(RecordingNavigator::default());
    *nav.current.lock() = Some("/dashboard".into());
    let manager = SessionManager::new(api.clone(), Arc::new(MemoryTokenStore::new())).with_navigator(nav.clone());

    manager.logout();
    assert_eq!(*nav.pushed.lock(), vec!["Login".to_string()]);

    *nav.current.lock() = Some(LOGIN_PATH.into());
    manager.logout();
    assert_eq!(nav.pushed.lock().len(), 1);
}

#[tokio::test]
async fn logout_without_active_view_does_not_navigate() {
    let nav = Arc::new(RecordingNavigator::default());
    let manager =
        SessionManager::new(Arc::new(ScriptedApi::new()), Arc::new(MemoryTokenStore::new())).with_navigator(nav.clone());

    manager.logout();
    assert!(nav.pushed.lock().is_empty());
}

#[tokio::test]
async fn orphaned_refresh_token_is_dropped_on_startup() {
    let store = MemoryTokenStore::new();
    store.set(REFRESH_TOKEN_KEY, "RT0").unwrap();
    let (api, store, manager) = setup(ScriptedApi::new(), store);

    assert!(manager.refresh_token().is_none());
    assert_eq!(stored(&store, REFRESH_TOKEN_KEY), None);
    manager.initialize().await;
    assert_fully_anonymous(&manager, &store);
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn initialize_checks_identity_at_most_once() {
    let api = ScriptedApi::new();
    api.accept("AT1");
    let (api, _store, manager) = setup(api, MemoryTokenStore::with_tokens("AT1", Some("RT1")));
    assert!(!manager.is_initialized());
    assert!(!manager.is_authenticated());

    tokio::join!(manager.initialize(), manager.initialize());
    manager.initialize().await;

    assert!(manager.is_initialized());
    assert!(manager.is_authenticated());
    assert_eq!(api.count("me"), 1);
    assert_eq!(api.default_auth().as_deref(), Some("AT1"));
}

#[tokio::test]
async fn initialize_without_stored_token_makes_no_calls() {
    let (api, _store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());
    manager.initialize().await;
    assert!(manager.is_initialized());
    assert!(!manager.is_authenticated());
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn initialize_with_dead_session_clears_and_still_marks_initialized() {
    let (api, store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::with_tokens("AT0", Some("RT0")));
    manager.initialize().await;
    assert!(manager.is_initialized());
    assert_fully_anonymous(&manager, &store);
    assert_eq!(api.count("me"), 1);
    assert_eq!(api.count("refresh"), 1);
}

#[tokio::test]
async fn rejected_access_token_is_refreshed_transparently() {
    let (api, store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());
    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();

    api.revoke("AT1");
    api.on_refresh("RT1", tokens("AT2", "RT2"));

    let user = manager.check_auth().await.unwrap();
    assert_eq!(user.id, 1);
    assert!(manager.is_authenticated());
    assert_eq!(manager.access_token().as_deref(), Some("AT2"));
    assert_eq!(manager.refresh_token().as_deref(), Some("RT2"));
    assert_eq!(stored(&store, ACCESS_TOKEN_KEY).as_deref(), Some("AT2"));
    assert_eq!(stored(&store, REFRESH_TOKEN_KEY).as_deref(), Some("RT2"));
    assert_eq!(api.default_auth().as_deref(), Some("AT2"));
    assert_eq!(api.count("refresh"), 1);
}

#[tokio::test]
async fn failed_refresh_is_terminal() {
    let (api, store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());
    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    api.revoke("AT1");

    let err = manager.check_auth().await.unwrap_err();
    assert!(err.is_credential_rejected());
    assert_eq!(api.count("refresh"), 1);
    assert_fully_anonymous(&manager, &store);
    assert_eq!(api.default_auth(), None);

    // nothing left to refresh with
    assert!(manager.refresh_access_token().await.is_err());
    assert_eq!(api.count("refresh"), 1);
}

#[tokio::test]
async fn rejected_token_without_refresh_token_clears_without_refreshing() {
    let (api, store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::with_tokens("AT0", None));
    assert_eq!(manager.access_token().as_deref(), Some("AT0"));

    assert!(manager.check_auth().await.is_err());
    assert_eq!(api.count("me"), 1);
    assert_eq!(api.count("refresh"), 0);
    assert_fully_anonymous(&manager, &store);
}

#[tokio::test]
async fn check_auth_with_nothing_stored_makes_no_call() {
    let (api, _store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());
    let err = manager.check_auth().await.unwrap_err();
    assert_eq!(err.code_str(), "not_authenticated");
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn overlapping_refreshes_hit_the_endpoint_once() {
    let api = ScriptedApi { refresh_delay: Duration::from_millis(50), ..ScriptedApi::new() };
    let (api, _store, manager) = setup(api, MemoryTokenStore::new());
    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    api.on_refresh("RT1", tokens("AT2", "RT2"));

    let (a, b) = tokio::join!(manager.refresh_access_token(), manager.refresh_access_token());
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(api.count("refresh"), 1);
    assert_eq!(manager.access_token().as_deref(), Some("AT2"));
}

#[tokio::test]
async fn overlapping_failed_refreshes_hit_the_endpoint_once() {
    let api = ScriptedApi { refresh_delay: Duration::from_millis(50), ..ScriptedApi::new() };
    let (api, store, manager) = setup(api, MemoryTokenStore::new());
    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();

    // RT1 has no scripted rotation, so the endpoint refuses it
    let (a, b) = tokio::join!(manager.refresh_access_token(), manager.refresh_access_token());
    assert!(a.is_err());
    assert!(b.is_err());
    assert_eq!(api.count("refresh"), 1);
    assert_fully_anonymous(&manager, &store);
    assert_eq!(api.default_auth(), None);
}

#[tokio::test]
async fn logout_during_refresh_keeps_session_ended() {
    let api = ScriptedApi { refresh_delay: Duration::from_millis(50), ..ScriptedApi::new() };
    let (api, store, manager) = setup(api, MemoryTokenStore::new());
    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    api.on_refresh("RT1", tokens("AT2", "RT2"));

    let (refreshed, ()) = tokio::join!(manager.refresh_access_token(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.logout();
    });
    assert!(refreshed.is_err());
    assert_eq!(api.count("refresh"), 1);
    assert_fully_anonymous(&manager, &store);
    assert_eq!(api.default_auth(), None);
}

#[tokio::test]
async fn register_logs_in_with_same_credentials() {
    let (api, store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());
    let req = RegisterRequest { email: "a@b.com".into(), password: "correct".into(), newsletter: false };

    manager.register(&req).await.unwrap();
    assert_eq!(api.count("register"), 1);
    assert_eq!(api.count("login"), 1);
    assert!(manager.is_authenticated());
    assert_eq!(stored(&store, ACCESS_TOKEN_KEY).as_deref(), Some("AT1"));
}

#[tokio::test]
async fn failed_registration_skips_login() {
    let api = ScriptedApi::new();
    *api.register_error.lock() =
        Some(SessionError::from_status(400, Some("An account with this email already exists".into())));
    let (api, store, manager) = setup(api, MemoryTokenStore::new());
    let req = RegisterRequest { email: "a@b.com".into(), password: "correct".into(), newsletter: true };

    assert!(manager.register(&req).await.is_err());
    assert_eq!(api.count("login"), 0);
    assert_eq!(manager.last_error().as_deref(), Some("An account with this email already exists"));
    assert_fully_anonymous(&manager, &store);
}

#[tokio::test]
async fn change_password_reports_without_touching_session() {
    let (_api, _store, manager) = setup(ScriptedApi::new(), MemoryTokenStore::new());
    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    let before = manager.snapshot();

    let bad = PasswordChange { old_password: "nope".into(), new_password: "new-password".into() };
    assert!(manager.change_password(&bad).await.is_err());
    assert_eq!(manager.last_error().as_deref(), Some("Current password is incorrect"));
    assert_eq!(manager.user(), before.user);
    assert_eq!(manager.access_token(), before.access_token);

    let good = PasswordChange { old_password: "correct".into(), new_password: "new-password".into() };
    manager.change_password(&good).await.unwrap();
    assert_eq!(manager.last_error(), None);
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn two_factor_setup_and_disable() {
    let api = ScriptedApi::new();
    let mut enrolled = user();
    enrolled.is_2fa_enabled = true;
    *api.me_user.lock() = Some(enrolled);
    let (api, _store, manager) = setup(api, MemoryTokenStore::new());
    manager.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    manager.check_auth().await.unwrap();
    assert!(manager.user().unwrap().is_2fa_enabled);

    let setup = manager.setup_2fa().await.unwrap();
    assert_eq!(setup.backup_codes.len(), 2);

    manager.disable_2fa().await.unwrap();
    assert!(!manager.user().unwrap().is_2fa_enabled);
    assert_eq!(api.count("disable_2fa"), 1);

    manager.logout();
    assert!(manager.disable_2fa().await.is_err());
    assert_eq!(manager.last_error().as_deref(), Some("Invalid authentication credentials"));
}

#[tokio::test]
async fn navigation_guard_initializes_first() {
    let api = ScriptedApi::new();
    api.accept("AT1");
    let (api, _store, manager) = setup(api, MemoryTokenStore::with_tokens("AT1", Some("RT1")));

    assert_eq!(guard_navigation(&manager, &RouteMeta::authenticated()).await, GuardDecision::Proceed);
    assert_eq!(guard_navigation(&manager, &RouteMeta::guest()).await, GuardDecision::Redirect("/dashboard"));
    assert_eq!(guard_navigation(&manager, &RouteMeta::admin()).await, GuardDecision::Redirect("/dashboard"));
    assert_eq!(api.count("me"), 1);

    manager.logout();
    assert_eq!(guard_navigation(&manager, &RouteMeta::authenticated()).await, GuardDecision::Redirect(LOGIN_PATH));
}

#[tokio::test]
async fn file_store_session_survives_restart() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("tokens.json");
    let api = Arc::new(ScriptedApi::new());

    {
        let first = SessionManager::new(api.clone(), Arc::new(FileTokenStore::new(&path)));
        first.login(&LoginRequest::new("a@b.com", "correct")).await.unwrap();
    }

    let second = SessionManager::new(api.clone(), Arc::new(FileTokenStore::new(&path)));
    assert_eq!(second.access_token().as_deref(), Some("AT1"));
    assert_eq!(second.refresh_token().as_deref(), Some("RT1"));
    assert!(!second.is_authenticated());

    second.initialize().await;
    assert!(second.is_authenticated());
    assert_eq!(second.user().map(|u| u.email), Some("a@b.com".to_string()));

    second.logout();
    let third = SessionManager::new(api, Arc::new(FileTokenStore::new(&path)));
    assert!(third.access_token().is_none());
}
