//!
//! nutrack CLI binary
//! ------------------
//! Command-line client for the tracker's auth API. Credentials live in a JSON
//! token file so a session survives between invocations, exactly like the web
//! client's local storage.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nutrack::cli::{self, Command, Invocation};
use nutrack::config::ClientConfig;
use nutrack::connectivity::ApiClient;
use nutrack::error::SessionError;
use nutrack::identity::{LoginRequest, PasswordChange, RegisterRequest, SessionManager, UserProfile};
use nutrack::storage::FileTokenStore;

#[tokio::main]
async fn main() -> Result<()> {
    // logs go to stderr so command output stays clean on stdout
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let mut args: Vec<String> = env::args().collect();
    let program = if args.is_empty() { "nutrack".to_string() } else { args.remove(0) };

    let inv = match cli::parse_args(&args) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", cli::usage(&program));
            std::process::exit(2);
        }
    };
    if inv.command == Command::Help {
        println!("{}", cli::usage(&program));
        return Ok(());
    }

    let mut cfg = ClientConfig::from_env();
    inv.apply_to(&mut cfg);
    info!(target: "nutrack", "api_base={} token_file={:?} timeout_secs={}", cfg.api_base, cfg.token_file, cfg.timeout.as_secs());

    let api = Arc::new(ApiClient::new(&cfg).context("while building the HTTP client")?);
    let store = Arc::new(FileTokenStore::new(&cfg.token_file));
    let manager = SessionManager::new(api, store);

    if !run(&manager, &inv).await? {
        std::process::exit(1);
    }
    Ok(())
}

/// Execute one command. Returns false when the operation failed.
async fn run(manager: &SessionManager, inv: &Invocation) -> Result<bool> {
    match &inv.command {
        Command::Login { email, password, totp_code } => {
            let req = LoginRequest { email: email.clone(), password: password.clone(), totp_code: totp_code.clone() };
            show_user(manager, manager.login(&req).await, inv.json)
        }
        Command::Register { email, password, newsletter } => {
            let req = RegisterRequest { email: email.clone(), password: password.clone(), newsletter: *newsletter };
            show_user(manager, manager.register(&req).await, inv.json)
        }
        Command::Logout => {
            manager.logout();
            println!("logged out");
            Ok(true)
        }
        Command::Whoami => {
            manager.initialize().await;
            match manager.user() {
                Some(user) => show_user(manager, Ok(user), inv.json),
                None => {
                    eprintln!("not logged in");
                    Ok(false)
                }
            }
        }
        Command::Refresh => {
            let result = manager.refresh_access_token().await;
            show_user(manager, result, inv.json)
        }
        Command::Status => {
            let snap = manager.snapshot();
            if inv.json { print_json(&snap)?; } else { cli::print_status(&snap); }
            Ok(true)
        }
        Command::ChangePassword { old_password, new_password } => {
            if !require_session(manager).await { return Ok(false); }
            let req = PasswordChange { old_password: old_password.clone(), new_password: new_password.clone() };
            match manager.change_password(&req).await {
                Ok(()) => { println!("password changed"); Ok(true) }
                Err(e) => { report(manager, &e); Ok(false) }
            }
        }
        Command::Setup2fa => {
            if !require_session(manager).await { return Ok(false); }
            match manager.setup_2fa().await {
                Ok(setup) => {
                    if inv.json { print_json(&setup)?; } else { cli::print_two_factor(&setup); }
                    Ok(true)
                }
                Err(e) => { report(manager, &e); Ok(false) }
            }
        }
        Command::Disable2fa => {
            if !require_session(manager).await { return Ok(false); }
            match manager.disable_2fa().await {
                Ok(()) => { println!("2FA disabled"); Ok(true) }
                Err(e) => { report(manager, &e); Ok(false) }
            }
        }
        Command::Help => Ok(true),
    }
}

async fn require_session(manager: &SessionManager) -> bool {
    manager.initialize().await;
    if manager.is_authenticated() { return true; }
    eprintln!("not logged in");
    false
}

fn show_user(manager: &SessionManager, result: Result<UserProfile, SessionError>, json: bool) -> Result<bool> {
    match result {
        Ok(user) => {
            if json { print_json(&user)?; } else { cli::print_profile(&user); }
            Ok(true)
        }
        Err(e) => {
            report(manager, &e);
            Ok(false)
        }
    }
}

fn report(manager: &SessionManager, err: &SessionError) {
    let msg = manager.last_error().unwrap_or_else(|| err.user_message(err.message()));
    eprintln!("error: {}", msg);
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
