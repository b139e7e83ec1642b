//!
//! nutrack HTTP API client
//! -----------------------
//! Thin JSON-over-HTTP client for the tracker API. One `ApiClient` is shared
//! by the session manager and every other component that calls the API; the
//! session installs the default bearer token here and all clones see it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{SessionError, SessionResult};
use crate::identity::{AuthApi, LoginRequest, PasswordChange, RegisterRequest, TokenResponse, TwoFactorSetup, UserProfile};

#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    client: reqwest::Client,
    default_bearer: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Self::with_client(&config.api_base, client)
    }

    pub fn with_client(base: &str, client: reqwest::Client) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base).map_err(|e| anyhow::anyhow!("invalid API base URL '{}': {}", base, e))?;
        // keep any path prefix (e.g. /api) when joining relative endpoint paths
        if !base_url.path().ends_with('/') {
            let p = format!("{}/", base_url.path());
            base_url.set_path(&p);
        }
        Ok(Self { base: base_url, client, default_bearer: Arc::new(RwLock::new(None)) })
    }

    pub fn base(&self) -> &Url { &self.base }

    /// Current value of the default `Authorization` header, if one is installed.
    pub fn default_authorization(&self) -> Option<String> {
        self.default_bearer.read().as_ref().map(|t| format!("Bearer {}", t))
    }

    pub fn url(&self, path: &str) -> SessionResult<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| SessionError::Transport {
                code: "bad_url".into(),
                message: format!("cannot build URL for {}: {}", path, e),
                detail: None,
            })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        let url = self.url(path)?;
        let resp = self.send(self.client.get(url), None).await?;
        Ok(resp.json::<T>().await?)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> SessionResult<T> {
        self.post_json_as(path, body, None).await
    }

    async fn post_json_as<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> SessionResult<T> {
        let url = self.url(path)?;
        let resp = self.send(self.client.post(url).json(body), bearer).await?;
        Ok(resp.json::<T>().await?)
    }

    /// Attach the bearer (explicit override first, then the default), send,
    /// and turn non-2xx answers into errors carrying the server's `detail`.
    async fn send(&self, builder: RequestBuilder, bearer: Option<&str>) -> SessionResult<reqwest::Response> {
        let token = match bearer {
            Some(t) => Some(t.to_string()),
            None => self.default_bearer.read().clone(),
        };
        let builder = match token {
            Some(t) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", t))
                    .map_err(|_| SessionError::rejected("bad_token", "token is not a valid header value"))?;
                builder.header(AUTHORIZATION, value)
            }
            None => builder,
        };
        let resp = builder.send().await?;
        let status = resp.status();
        debug!(target: "nutrack::http", "{} -> {}", resp.url().path(), status.as_u16());
        if status.is_success() {
            return Ok(resp);
        }
        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        Err(SessionError::from_status(status.as_u16(), extract_detail(&body)))
    }
}

/// Pull a human readable message out of an error body. Accepts a plain
/// string `detail` or a list of validation entries with `msg` fields.
pub fn extract_detail(body: &serde_json::Value) -> Option<String> {
    match body.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let msgs: Vec<&str> = items.iter().filter_map(|i| i.get("msg").and_then(|m| m.as_str())).collect();
            if msgs.is_empty() { None } else { Some(msgs.join("; ")) }
        }
        _ => None,
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, req: &LoginRequest) -> SessionResult<TokenResponse> {
        self.post_json("/auth/login", req).await
    }

    async fn register(&self, req: &RegisterRequest) -> SessionResult<UserProfile> {
        self.post_json("/auth/register", req).await
    }

    async fn me(&self) -> SessionResult<UserProfile> {
        self.get_json("/auth/me").await
    }

    async fn refresh(&self, refresh_token: &str) -> SessionResult<TokenResponse> {
        self.post_json_as("/auth/refresh", &serde_json::json!({}), Some(refresh_token)).await
    }

    async fn change_password(&self, req: &PasswordChange) -> SessionResult<()> {
        let _: serde_json::Value = self.post_json("/auth/change-password", req).await?;
        Ok(())
    }

    async fn setup_2fa(&self) -> SessionResult<TwoFactorSetup> {
        self.post_json("/auth/setup-2fa", &serde_json::json!({})).await
    }

    async fn disable_2fa(&self) -> SessionResult<()> {
        let _: serde_json::Value = self.post_json("/auth/disable-2fa", &serde_json::json!({})).await?;
        Ok(())
    }

    fn set_default_authorization(&self, access_token: Option<&str>) {
        *self.default_bearer.write() = access_token.map(|t| t.to_string());
    }
}
