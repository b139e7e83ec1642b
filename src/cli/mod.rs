//! Command-line front end: argument parsing and terminal rendering.

pub mod outputformatter;

pub use outputformatter::{print_profile, print_status, print_two_factor, render_fields};

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::config::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String, totp_code: Option<String> },
    Register { email: String, password: String, newsletter: bool },
    Logout,
    Whoami,
    Refresh,
    Status,
    ChangePassword { old_password: String, new_password: String },
    Setup2fa,
    Disable2fa,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub api_base: Option<String>,
    pub token_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    /// Print JSON instead of tables.
    pub json: bool,
}

impl Invocation {
    /// Layer flag values over an env-derived configuration.
    pub fn apply_to(&self, cfg: &mut ClientConfig) {
        if let Some(b) = &self.api_base { cfg.api_base = b.clone(); }
        if let Some(p) = &self.token_file { cfg.token_file = p.clone(); }
        if let Some(s) = self.timeout_secs { cfg.timeout = Duration::from_secs(s); }
    }
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage:\n  {program} [global flags] <command> [command flags]\n\nCommands:\n  login --email <e> --password <p> [--totp <code>]\n  register --email <e> --password <p> [--newsletter]\n  logout                      drop stored credentials\n  whoami                      validate the stored session and show the user\n  refresh                     exchange the refresh token for a new pair\n  status                      show local session state (no network)\n  change-password --old-password <p> --new-password <p>\n  2fa-setup | 2fa-disable\n\nGlobal flags:\n  --api <url>          API base URL (env: NUTRACK_API_BASE)\n  --token-file <path>  credential file (env: NUTRACK_TOKEN_FILE)\n  --timeout <secs>     HTTP timeout (env: NUTRACK_HTTP_TIMEOUT_SECS)\n  --json               print JSON instead of tables\n  -h, --help           show this help"
    )
}

/// Parse everything after the program name.
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut command: Option<String> = None;
    let mut api_base: Option<String> = None;
    let mut token_file: Option<PathBuf> = None;
    let mut timeout_secs: Option<u64> = None;
    let mut json = false;
    let mut email: Option<String> = None;
    let mut password: Option<String> = None;
    let mut totp_code: Option<String> = None;
    let mut old_password: Option<String> = None;
    let mut new_password: Option<String> = None;
    let mut newsletter = false;

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || -> Result<String> {
            args.get(i + 1).cloned().ok_or_else(|| anyhow!("{} requires a value", flag))
        };
        match flag {
            "--api" => { api_base = Some(value()?); i += 2; continue; }
            "--token-file" => { token_file = Some(PathBuf::from(value()?)); i += 2; continue; }
            "--timeout" => {
                let v = value()?;
                timeout_secs = Some(v.parse::<u64>().map_err(|_| anyhow!("--timeout expects seconds, got '{}'", v))?);
                i += 2; continue;
            }
            "--email" => { email = Some(value()?); i += 2; continue; }
            "--password" => { password = Some(value()?); i += 2; continue; }
            "--totp" => { totp_code = Some(value()?); i += 2; continue; }
            "--old-password" => { old_password = Some(value()?); i += 2; continue; }
            "--new-password" => { new_password = Some(value()?); i += 2; continue; }
            "--newsletter" => { newsletter = true; i += 1; continue; }
            "--json" => { json = true; i += 1; continue; }
            "-h" | "--help" => { command = Some("help".into()); i += 1; continue; }
            other if other.starts_with('-') => bail!("Unrecognized argument: {}", other),
            other => {
                if let Some(prev) = &command { bail!("unexpected argument '{}' after command '{}'", other, prev); }
                command = Some(other.to_string());
                i += 1;
            }
        }
    }

    let need = |v: Option<String>, flag: &str, cmd: &str| v.ok_or_else(|| anyhow!("{} requires {}", cmd, flag));
    let command = match command.as_deref().unwrap_or("help") {
        "login" => Command::Login {
            email: need(email, "--email", "login")?,
            password: need(password, "--password", "login")?,
            totp_code,
        },
        "register" => Command::Register {
            email: need(email, "--email", "register")?,
            password: need(password, "--password", "register")?,
            newsletter,
        },
        "logout" => Command::Logout,
        "whoami" => Command::Whoami,
        "refresh" => Command::Refresh,
        "status" => Command::Status,
        "change-password" => Command::ChangePassword {
            old_password: need(old_password, "--old-password", "change-password")?,
            new_password: need(new_password, "--new-password", "change-password")?,
        },
        "2fa-setup" => Command::Setup2fa,
        "2fa-disable" => Command::Disable2fa,
        "help" => Command::Help,
        unk => bail!("unknown command '{}'", unk),
    };
    Ok(Invocation { command, api_base, token_file, timeout_secs, json })
}
