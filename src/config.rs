//! Client configuration: environment variables with defaults, overridden by
//! command-line flags in the binary.

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_API_BASE: &str = "NUTRACK_API_BASE";
pub const ENV_TOKEN_FILE: &str = "NUTRACK_TOKEN_FILE";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "NUTRACK_HTTP_TIMEOUT_SECS";

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub token_file: PathBuf,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_file: default_token_file(None),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset or unparsable values
    /// fall back to defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let api_base = lookup(ENV_API_BASE)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let token_file = lookup(ENV_TOKEN_FILE)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_token_file(lookup("HOME").or_else(|| lookup("USERPROFILE"))));
        let timeout = lookup(ENV_HTTP_TIMEOUT_SECS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        Self { api_base, token_file, timeout }
    }
}

fn default_token_file(home: Option<String>) -> PathBuf {
    match home {
        Some(h) => PathBuf::from(h).join(".config").join("nutrack").join("tokens.json"),
        None => PathBuf::from("nutrack_tokens.json"),
    }
}
