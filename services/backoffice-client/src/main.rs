//! Back-office client
//!
//! Command-line client for the back-office REST API that:
//! 1. Logs in and keeps the token pair in a durable credential file
//! 2. Attaches the access token to every request
//! 3. Refreshes transparently on 401, once for any number of concurrent calls
//! 4. Refreshes proactively on a timer while `watch` runs

mod api;
mod app;
mod cli;
mod config;
mod error;

use std::sync::Arc;

use anyhow::{Context, Result};
use backoffice_auth::RegisterRequest;
use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{Method, OutboundRequest};

use crate::app::{App, CliObserver};
use crate::cli::{Cli, Command, TransactionsCommand};
use crate::config::{Config, NEW_PASSWORD_ENV, PASSWORD_ENV, resolve_password};
use crate::error::Error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // LOG_LEVEL / RUST_LOG support; logs go to stderr so stdout stays JSON
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        credentials = %config.session.credentials_path.display(),
        refresh_interval_secs = config.session.refresh_interval_secs,
        "configuration loaded"
    );

    let observer = Arc::new(CliObserver::default());
    let app = App::build(config, observer.clone()).await?;
    run(&app, &observer, cli.command).await
}

async fn run(app: &App, observer: &CliObserver, command: Command) -> Result<()> {
    match command {
        Command::Login {
            email,
            password_file,
        } => {
            let password = resolve_password(PASSWORD_ENV, password_file.as_deref())?
                .ok_or(Error::MissingPassword(PASSWORD_ENV))?;
            let user = app.login(email, password).await?;
            match user {
                Some(user) => println!("logged in as {}", user.display_name()),
                None => println!("logged in"),
            }
        }
        Command::Logout => {
            app.logout().await?;
            println!("logged out");
        }
        Command::Whoami => {
            if app.session().access_token().await.is_none() {
                return Err(Error::NotLoggedIn.into());
            }
            match app.session().user().await {
                Some(user) => print_json(&serde_json::to_value(&user)?)?,
                None => println!("logged in (no profile stored)"),
            }
        }
        Command::Register {
            email,
            full_name,
            role,
            password_file,
        } => {
            let password = resolve_password(PASSWORD_ENV, password_file.as_deref())?
                .ok_or(Error::MissingPassword(PASSWORD_ENV))?;
            app.register(RegisterRequest {
                email,
                password,
                full_name,
                role,
            })
            .await?;
            println!("registered");
        }
        Command::UpdatePassword {
            password_file,
            new_password_file,
        } => {
            let old = resolve_password(PASSWORD_ENV, password_file.as_deref())?
                .ok_or(Error::MissingPassword(PASSWORD_ENV))?;
            let new = resolve_password(NEW_PASSWORD_ENV, new_password_file.as_deref())?
                .ok_or(Error::MissingPassword(NEW_PASSWORD_ENV))?;
            app.update_password(&old, &new).await?;
            println!("password updated, please log in again");
        }
        Command::Request { method, path, body } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| Error::InvalidMethod(method))?;
            let mut request = OutboundRequest::new(method, path);
            if let Some(body) = body {
                let value: Value =
                    serde_json::from_str(&body).context("--body must be valid JSON")?;
                request = request.json(&value)?;
            }
            let response = app.client().send(request).await?;
            print_json(&api::into_json(response)?)?;
        }
        Command::Transactions(command) => {
            let client = app.client();
            let value = match command {
                TransactionsCommand::List { paging, status } => match status {
                    Some(status) => {
                        api::transactions_by_status(client, &status, &paging.into()).await?
                    }
                    None => api::list_transactions(client, &paging.into()).await?,
                },
                TransactionsCommand::Overdue { paging } => {
                    api::overdue_transactions(client, &paging.into()).await?
                }
                TransactionsCommand::Get { id } => api::transaction(client, id).await?,
                TransactionsCommand::Update { id, status, note } => {
                    api::update_transaction(client, id, &status, &note).await?
                }
            };
            print_json(&value)?;
        }
        Command::Watch => {
            if !app.session().resume().await {
                return Err(Error::NotLoggedIn.into());
            }
            info!(
                interval_secs = app.session().refresh_interval().as_secs(),
                "keeping session alive"
            );
            tokio::select! {
                result = shutdown_signal() => result?,
                _ = observer.forced_end() => {
                    anyhow::bail!("session ended, log in again");
                }
            }
            app.session().cancel_timer();
            info!("refresh timer stopped");
        }
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("received SIGINT, shutting down");
            }
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl+C, shutting down");
    }

    Ok(())
}
