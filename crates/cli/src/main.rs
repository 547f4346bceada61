//! `audilink`: log in to myAudi and print the account's vehicles.
//!
//! Credentials come from flags, `AUDILINK_USERNAME`/`AUDILINK_PASSWORD`
//! (optionally via `.env`), or a JSON/TOML config file. The session is kept in
//! `~/.audi_tokens.json` so later runs reuse or refresh it.
//!
//! The vehicle list is user-facing output and goes to stdout; everything else
//! is logged to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use anyhow::{bail, Context};
use audilink_common::config::{self, AppConfig, AuthConfig};
use audilink_common::{init_tracing, ErrorClassification, Session};
use tracing::{debug, error, info};

mod args;

use args::{Args, USAGE};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e:#}");
            eprintln!();
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_tracing(args.log_format, "info") {
        eprintln!("Could not initialize logging: {e}");
    }

    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) => debug!(error = %e, "No .env loaded"),
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let app = resolve_config(args)?;
    let session = Session::from_app_config(app).context("could not create session")?;
    debug!(token_file = %session.token_file().display(), "Session created");

    let outcome = session.login().await.map_err(|e| {
        if e.is_critical() {
            error!("The sign-in pages did not look as expected; the provider may have changed");
        }
        anyhow::Error::new(e).context("login failed")
    })?;
    info!(source = %outcome.source, persisted = outcome.persisted, "Logged in");

    let url = session.config().vehicles_url();
    let vehicles: serde_json::Value =
        session.authenticated_json(&url).await.context("could not list vehicles")?;

    println!("{}", serde_json::to_string_pretty(&vehicles)?);
    Ok(())
}

/// Flags override the config file, which is used only when flags and the
/// environment do not provide both credentials.
fn resolve_config(args: Args) -> anyhow::Result<AppConfig> {
    let mut app = match (&args.config, &args.username, &args.password) {
        (Some(path), _, _) => config::load_from_file(Some(path.clone()))
            .with_context(|| format!("could not load {}", path.display()))?,
        (None, Some(username), Some(password)) => AppConfig {
            username: username.clone(),
            password: password.clone(),
            token_file: None,
            auth: AuthConfig::default(),
        },
        _ => config::load().context(
            "no credentials: pass --username/--password, set AUDILINK_USERNAME and \
             AUDILINK_PASSWORD, or provide a config file",
        )?,
    };

    if let Some(username) = args.username {
        app.username = username;
    }
    if let Some(password) = args.password {
        app.password = password;
    }
    if let Some(token_file) = args.token_file {
        app.token_file = Some(token_file);
    }

    if app.username.is_empty() || app.password.is_empty() {
        bail!("username and password must not be empty");
    }
    Ok(app)
}
