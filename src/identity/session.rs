use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::storage::{SharedTokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::tprintln;

use super::navigation::{Navigator, LOGIN_PATH, LOGIN_VIEW};
use super::principal::UserProfile;
use super::provider::{AuthApi, LoginRequest, PasswordChange, RegisterRequest, TokenResponse, TwoFactorSetup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Anonymous,
    Authenticated,
}

/// Point-in-time copy of the session. Tokens are never serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub user: Option<UserProfile>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub initialized: bool,
    pub loading: bool,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }

    pub fn status(&self) -> AuthStatus {
        if self.is_authenticated() { AuthStatus::Authenticated } else { AuthStatus::Anonymous }
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().map(|u| u.is_admin).unwrap_or(false)
    }
}

/// Owns the authenticated identity and the access/refresh credential pair.
///
/// One manager per process, built by the composition root and shared as
/// `Arc<SessionManager>`. Every credential mutation is written through to the
/// token store and mirrored into the API client's default `Authorization`
/// header before the operation returns.
pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    store: SharedTokenStore,
    navigator: Option<Arc<dyn Navigator>>,
    state: RwLock<SessionSnapshot>,
    in_flight: AtomicUsize,
    init_gate: tokio::sync::Mutex<()>,
    refresh_gate: tokio::sync::Mutex<()>,
}

/// Marks a user-facing operation as in flight for the lifetime of the guard.
struct Busy<'a>(&'a AtomicUsize);

impl Drop for Busy<'_> {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); }
}

impl SessionManager {
    /// Build a manager hydrated from whatever tokens `store` holds. The user
    /// record is not restored; `initialize` fetches it.
    pub fn new(api: Arc<dyn AuthApi>, store: SharedTokenStore) -> Self {
        let read = |key: &str| match store.get(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "nutrack::session", "ignoring unreadable stored {}: {}", key, e);
                None
            }
        };
        let access_token = read(ACCESS_TOKEN_KEY);
        // a refresh token is useless without the session it belongs to
        let refresh_token = if access_token.is_some() {
            read(REFRESH_TOKEN_KEY)
        } else {
            if let Err(e) = store.remove(REFRESH_TOKEN_KEY) {
                warn!(target: "nutrack::session", "could not remove orphaned {}: {}", REFRESH_TOKEN_KEY, e);
            }
            None
        };
        debug!(
            target: "nutrack::session",
            "hydrated session: access_token={} refresh_token={}",
            access_token.is_some(), refresh_token.is_some()
        );
        Self {
            api,
            store,
            navigator: None,
            state: RwLock::new(SessionSnapshot { access_token, refresh_token, ..SessionSnapshot::default() }),
            in_flight: AtomicUsize::new(0),
            init_gate: tokio::sync::Mutex::new(()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snap = self.state.read().clone();
        snap.loading = self.is_loading();
        snap
    }

    pub fn user(&self) -> Option<UserProfile> { self.state.read().user.clone() }
    pub fn access_token(&self) -> Option<String> { self.state.read().access_token.clone() }
    pub fn refresh_token(&self) -> Option<String> { self.state.read().refresh_token.clone() }
    pub fn last_error(&self) -> Option<String> { self.state.read().last_error.clone() }
    pub fn is_initialized(&self) -> bool { self.state.read().initialized }
    pub fn is_loading(&self) -> bool { self.in_flight.load(Ordering::SeqCst) > 0 }
    pub fn status(&self) -> AuthStatus { self.state.read().status() }
    pub fn is_authenticated(&self) -> bool { self.state.read().is_authenticated() }
    pub fn is_admin(&self) -> bool { self.state.read().is_admin() }

    /// Startup check. Runs once per manager; later and concurrent calls wait
    /// for the first and return without touching the network.
    pub async fn initialize(&self) {
        let _gate = self.init_gate.lock().await;
        if self.state.read().initialized {
            return;
        }
        if let Some(access) = self.access_token() {
            self.api.set_default_authorization(Some(&access));
            if let Err(e) = self.check_auth().await {
                warn!(target: "nutrack::session", "startup session check failed: {}", e);
                self.clear_session();
            }
        }
        self.state.write().initialized = true;
        info!(target: "nutrack::session", "session initialized: status={:?}", self.status());
    }

    pub async fn login(&self, req: &LoginRequest) -> SessionResult<UserProfile> {
        let _busy = self.begin_user_action();
        let result = match self.api.login(req).await {
            Ok(tokens) => self.apply_tokens(tokens, None),
            Err(e) => Err(e),
        };
        match &result {
            Ok(user) => info!(target: "nutrack::session", "login succeeded: user_id={}", user.id),
            Err(e) => self.record_error(e, "Login failed"),
        }
        result
    }

    /// Register, then log in with the same credentials.
    pub async fn register(&self, req: &RegisterRequest) -> SessionResult<UserProfile> {
        let _busy = self.begin_user_action();
        if let Err(e) = self.api.register(req).await {
            self.record_error(&e, "Registration failed");
            return Err(e);
        }
        self.login(&req.to_login()).await
    }

    /// Confirm the access token by fetching the current identity, falling back
    /// to a single refresh when the token is refused.
    pub async fn check_auth(&self) -> SessionResult<UserProfile> {
        let Some(access) = self.access_token() else {
            return Err(SessionError::not_authenticated());
        };
        self.api.set_default_authorization(Some(&access));
        match self.api.me().await {
            Ok(user) => {
                let mut st = self.state.write();
                // logged out while the identity request was in flight
                if st.access_token.is_none() {
                    return Err(SessionError::not_authenticated());
                }
                st.user = Some(user.clone());
                Ok(user)
            }
            Err(e) => {
                debug!(target: "nutrack::session", "identity check failed: {}", e);
                if self.refresh_token().is_some() {
                    return self.refresh_access_token().await;
                }
                self.clear_session();
                Err(e)
            }
        }
    }

    /// Trade the refresh token for a new credential pair. Any failure is
    /// terminal for the session.
    ///
    /// Overlapping calls are serialized: a caller that waited behind a refresh
    /// which already rotated or cleared its refresh token reports that outcome
    /// instead of calling the endpoint again.
    pub async fn refresh_access_token(&self) -> SessionResult<UserProfile> {
        let started_with = self.refresh_token();
        let _flight = self.refresh_gate.lock().await;
        let current = self.refresh_token();
        if current != started_with {
            let snap = self.state.read().clone();
            return match snap.user {
                Some(user) if snap.access_token.is_some() => Ok(user),
                _ => Err(SessionError::not_authenticated()),
            };
        }
        let Some(refresh) = current else {
            self.clear_session();
            return Err(SessionError::rejected("no_refresh_token", "no refresh token available"));
        };
        match self.api.refresh(&refresh).await {
            Ok(tokens) => {
                let user = self.apply_tokens(tokens, Some(&refresh))?;
                tprintln!("session.refresh user_id={}", user.id);
                Ok(user)
            }
            Err(e) => {
                warn!(target: "nutrack::session", "token refresh failed, clearing session: {}", e);
                self.clear_session();
                Err(e)
            }
        }
    }

    /// Drop every credential and send the navigator to the login view.
    pub fn logout(&self) {
        self.clear_session();
        info!(target: "nutrack::session", "logged out");
        if let Some(nav) = &self.navigator {
            match nav.current_path() {
                Some(path) if path != LOGIN_PATH => nav.push(LOGIN_VIEW),
                _ => {}
            }
        }
    }

    pub async fn change_password(&self, req: &PasswordChange) -> SessionResult<()> {
        let _busy = self.begin_user_action();
        let result = self.api.change_password(req).await;
        if let Err(e) = &result {
            self.record_error(e, "Password change failed");
        }
        result
    }

    pub async fn setup_2fa(&self) -> SessionResult<TwoFactorSetup> {
        let result = self.api.setup_2fa().await;
        if let Err(e) = &result {
            self.record_error(e, "2FA setup failed");
        }
        result
    }

    pub async fn disable_2fa(&self) -> SessionResult<()> {
        match self.api.disable_2fa().await {
            Ok(()) => {
                if let Some(user) = self.state.write().user.as_mut() {
                    user.is_2fa_enabled = false;
                }
                Ok(())
            }
            Err(e) => {
                self.record_error(&e, "2FA disable failed");
                Err(e)
            }
        }
    }

    fn begin_user_action(&self) -> Busy<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.write().last_error = None;
        Busy(&self.in_flight)
    }

    fn record_error(&self, err: &SessionError, fallback: &str) {
        warn!(target: "nutrack::session", "auth operation failed: code={} kind={}", err.code_str(), kind_label(err));
        self.state.write().last_error = Some(err.user_message(fallback));
    }

    /// Write the pair through to the store, then publish it in memory and on
    /// the client. A store failure leaves the session fully cleared.
    ///
    /// With `expected_refresh` set, the pair is dropped unless the session
    /// still holds that refresh token when the response lands.
    fn apply_tokens(&self, tokens: TokenResponse, expected_refresh: Option<&str>) -> SessionResult<UserProfile> {
        let persisted = {
            let mut st = self.state.write();
            if let Some(expected) = expected_refresh {
                if st.refresh_token.as_deref() != Some(expected) {
                    debug!(target: "nutrack::session", "discarding refreshed tokens: session ended while in flight");
                    return Err(SessionError::not_authenticated());
                }
            }
            let persisted = self
                .store
                .set(ACCESS_TOKEN_KEY, &tokens.access_token)
                .and_then(|_| self.store.set(REFRESH_TOKEN_KEY, &tokens.refresh_token));
            if persisted.is_ok() {
                st.access_token = Some(tokens.access_token.clone());
                st.refresh_token = Some(tokens.refresh_token);
                st.user = Some(tokens.user.clone());
                self.api.set_default_authorization(Some(&tokens.access_token));
            }
            persisted
        };
        if let Err(e) = persisted {
            warn!(target: "nutrack::session", "could not persist tokens: {}", e);
            self.clear_session();
            return Err(e.into());
        }
        Ok(tokens.user)
    }

    fn clear_session(&self) {
        {
            let mut st = self.state.write();
            st.access_token = None;
            st.refresh_token = None;
            st.user = None;
        }
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(target: "nutrack::session", "could not remove stored {}: {}", key, e);
            }
        }
        self.api.set_default_authorization(None);
        tprintln!("session.clear");
    }
}

fn kind_label(err: &SessionError) -> &'static str {
    match err {
        SessionError::CredentialRejected { .. } => "credential_rejected",
        SessionError::Transport { .. } => "transport",
        SessionError::Storage { .. } => "storage",
    }
}
