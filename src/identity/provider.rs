use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::principal::UserProfile;
use crate::error::SessionResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp_code: Option<String>,
}

impl LoginRequest {
    pub fn new(email: &str, password: &str) -> Self {
        Self { email: email.to_string(), password: password.to_string(), totp_code: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub newsletter: bool,
}

impl RegisterRequest {
    pub fn to_login(&self) -> LoginRequest {
        LoginRequest::new(&self.email, &self.password)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

/// Body of a successful `/auth/login` or `/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: UserProfile,
}

fn default_token_type() -> String { "bearer".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TwoFactorSetup {
    pub qr_code: String,
    pub secret: String,
    #[serde(default)]
    pub backup_codes: Vec<String>,
}

/// Remote authentication endpoints the session manager depends on.
///
/// `me`, `change_password` and the 2FA calls authorize with the default
/// `Authorization` header installed through `set_default_authorization`;
/// `refresh` always sends the refresh token it is given instead.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> SessionResult<TokenResponse>;
    async fn register(&self, req: &RegisterRequest) -> SessionResult<UserProfile>;
    async fn me(&self) -> SessionResult<UserProfile>;
    async fn refresh(&self, refresh_token: &str) -> SessionResult<TokenResponse>;
    async fn change_password(&self, req: &PasswordChange) -> SessionResult<()>;
    async fn setup_2fa(&self) -> SessionResult<TwoFactorSetup>;
    async fn disable_2fa(&self) -> SessionResult<()>;

    /// Install (`Some`) or drop (`None`) the bearer token sent by default on
    /// every later request, including those of other components sharing the client.
    fn set_default_authorization(&self, access_token: Option<&str>);
}
