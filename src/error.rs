//! Session error model and mapping helpers.
//! Every public session operation reports failure through `SessionError`. The
//! kind only picks the message text; callers branch on success/failure alone.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionError {
    /// Bad login, expired or invalid token, or any other 4xx answer.
    CredentialRejected {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Network, timeout, decoding, throttling or server-side failure.
    Transport {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Durable token storage could not be read or written.
    Storage { code: String, message: String },
}

impl SessionError {
    pub fn code_str(&self) -> &str {
        match self {
            SessionError::CredentialRejected { code, .. }
            | SessionError::Transport { code, .. }
            | SessionError::Storage { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SessionError::CredentialRejected { message, .. }
            | SessionError::Transport { message, .. }
            | SessionError::Storage { message, .. } => message.as_str(),
        }
    }

    /// Server-supplied human readable detail, surfaced verbatim to users.
    pub fn detail(&self) -> Option<&str> {
        match self {
            SessionError::CredentialRejected { detail, .. } | SessionError::Transport { detail, .. } => {
                detail.as_deref()
            }
            SessionError::Storage { .. } => None,
        }
    }

    pub fn rejected<S: Into<String>>(code: S, msg: S) -> Self {
        SessionError::CredentialRejected { code: code.into(), message: msg.into(), detail: None }
    }
    pub fn transport<S: Into<String>>(code: S, msg: S) -> Self {
        SessionError::Transport { code: code.into(), message: msg.into(), detail: None }
    }
    pub fn storage<S: Into<String>>(code: S, msg: S) -> Self {
        SessionError::Storage { code: code.into(), message: msg.into() }
    }

    pub fn not_authenticated() -> Self {
        Self::rejected("not_authenticated", "no access token available")
    }

    /// Classify a non-success HTTP answer. 4xx (except 429) means the
    /// credentials or request were refused; everything else is transport.
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        let code = format!("http_{}", status);
        let message = match &detail {
            Some(d) => d.clone(),
            None => format!("remote answered HTTP {}", status),
        };
        if (400..500).contains(&status) && status != 429 {
            SessionError::CredentialRejected { code, message, detail }
        } else {
            SessionError::Transport { code, message, detail }
        }
    }

    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, SessionError::CredentialRejected { .. })
    }

    /// Text recorded as the session's last error: the server detail when
    /// present, otherwise the operation's fallback.
    pub fn user_message(&self, fallback: &str) -> String {
        self.detail().unwrap_or(fallback).to_string()
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for SessionError {}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connect"
        } else if err.is_decode() {
            "decode"
        } else {
            "request"
        };
        SessionError::Transport { code: code.into(), message: err.to_string(), detail: None }
    }
}

impl From<crate::storage::TokenStoreError> for SessionError {
    fn from(err: crate::storage::TokenStoreError) -> Self {
        SessionError::Storage { code: err.code().into(), message: err.to_string() }
    }
}
