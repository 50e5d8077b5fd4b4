// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `mobdeen` command line.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::models::{Credentials, Plan};
use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::session::store::TokenStore;
use crate::session::terminator::Navigator;
use crate::session::{RefreshTrigger, SessionEvent, SessionManager, SessionSettings};

#[derive(Parser)]
#[command(name = "mobdeen", version, about = "Family subscription client for the mobdeen backend")]
pub struct Cli {
    #[command(flatten)]
    pub config: ClientConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and persist the session
    Login {
        #[arg(long, env = "MOBDEEN_EMAIL")]
        email: String,
        #[arg(long, env = "MOBDEEN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the local session
    Logout,
    /// Show the cached identity
    Whoami,
    /// List subscription plans
    Plans,
    /// Subscribe to a plan and print the checkout URL
    Subscribe {
        /// Plan id as listed by `mobdeen plans`
        plan_id: String,
    },
    /// Show the family's current subscription
    Subscription,
    /// Cancel the current subscription
    Cancel,
    /// Email a one-time password for resetting the password
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Exchange a one-time password for a reset token
    VerifyOtp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        otp: String,
    },
    /// Set a new password using a reset token
    ResetPassword {
        #[arg(long)]
        reset_token: String,
        #[arg(long, env = "MOBDEEN_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Keep the session alive until interrupted (SIGUSR1 re-arms the refresh)
    Watch,
}

/// Ends the process-wide run when the session cannot be kept alive.
pub struct CliNavigator {
    shutdown: CancellationToken,
}

impl CliNavigator {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }
}

impl Navigator for CliNavigator {
    fn redirect_to_login(&self) {
        warn!("session expired, sign in again with `mobdeen login`");
        self.shutdown.cancel();
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let navigator = Arc::new(CliNavigator::new(shutdown.clone()));
    let store = TokenStore::open(cli.config.session_path());
    let session = SessionManager::new(SessionSettings::from_config(&cli.config), store, navigator);
    let client = ApiClient::new(&cli.config, Arc::clone(&session));

    let result = dispatch(&client, cli.command, shutdown).await;
    session.shutdown();
    result
}

async fn dispatch(
    client: &ApiClient,
    command: Command,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Login { email, password } => {
            let session = client.login(&Credentials { email, password }).await?;
            println!(
                "Signed in as user {} ({})",
                session.user_id.as_deref().unwrap_or("?"),
                session.user_role.as_deref().unwrap_or("?")
            );
        }
        Command::Logout => {
            client.logout().await;
            println!("Signed out");
        }
        Command::Whoami => {
            let session = client.session().store().read();
            if !session.is_authenticated() {
                println!("Not signed in");
            } else {
                println!("user_id: {}", session.user_id.as_deref().unwrap_or("\u{2014}"));
                println!("role:    {}", session.user_role.as_deref().unwrap_or("\u{2014}"));
            }
        }
        Command::Plans => print_plans(&client.plans().await?),
        Command::Subscribe { plan_id } => {
            let plans = client.plans().await?;
            let plan = plans
                .iter()
                .find(|p| p.id == plan_id)
                .ok_or_else(|| anyhow::anyhow!("no plan with id {plan_id}"))?;
            let checkout = client.subscribe(plan).await?;
            println!(
                "Subscription {} is {}",
                checkout.subscription_id.as_deref().unwrap_or("?"),
                checkout.status
            );
            println!();
            println!("Complete payment at:");
            println!("  {}", checkout.checkout_url);
        }
        Command::Subscription => match client.current_subscription().await? {
            Some(current) => println!("{}", serde_json::to_string_pretty(&current)?),
            None => println!("No active subscription"),
        },
        Command::Cancel => {
            client.cancel_subscription().await?;
            println!("Subscription cancelled");
        }
        Command::ForgotPassword { email } => {
            client.forgot_password(&email).await?;
            println!("A one-time password was sent to {email}");
        }
        Command::VerifyOtp { email, otp } => {
            let reset_token = client.verify_otp(&email, &otp).await?;
            println!("Reset token: {reset_token}");
        }
        Command::ResetPassword { reset_token, password } => {
            client.reset_password(&password, &reset_token).await?;
            println!("Password updated, sign in with the new password");
        }
        Command::Watch => watch(client, shutdown).await?,
    }
    Ok(())
}

fn print_plans(plans: &[Plan]) {
    let id_w = plans.iter().map(|p| p.id.len()).max().unwrap_or(0).max(2);
    let name_w = plans.iter().map(|p| p.name.len()).max().unwrap_or(0).max(4);

    println!("{:<id_w$}  {:<name_w$}  {:<10}  INTERVAL", "ID", "NAME", "PRICE");
    for p in plans {
        let price = if p.effective_price() != p.price {
            format!("{} (-{}%)", p.effective_price(), p.discount_percent)
        } else {
            p.price.clone()
        };
        println!("{:<id_w$}  {:<name_w$}  {:<10}  {}", p.id, p.name, price, p.billing_interval);
    }
}

/// Keep the session alive until interrupted or terminated.
async fn watch(client: &ApiClient, shutdown: CancellationToken) -> anyhow::Result<()> {
    let session = client.session();
    if !session.store().read().is_authenticated() {
        anyhow::bail!("not signed in");
    }

    spawn_signal_handler(shutdown.clone());
    let mut events = session.subscribe();
    let mut focus = signal(SignalKind::user_defined1()).ok();

    match session.start() {
        Some(delay) => info!(delay_ms = delay.as_millis() as u64, "watching session"),
        None => info!("watching session, no proactive refresh armed"),
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = focus_regained(&mut focus) => {
                rearm_on_focus(session);
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Refreshed { trigger }) => {
                    println!("Session refreshed ({})", trigger.as_str());
                }
                Ok(SessionEvent::RefreshFailed { trigger: RefreshTrigger::Proactive, error }) => {
                    println!("Background refresh failed: {error}");
                    // Nothing else would notice until the next request; check now.
                    if let Err(e) = client.current_subscription().await {
                        warn!(err = %e, "session check failed");
                    }
                }
                Ok(SessionEvent::RefreshFailed { .. }) => {}
                Ok(SessionEvent::Terminated) => {
                    println!("Session ended, sign in again with `mobdeen login`");
                    break;
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn rearm_on_focus(session: &SessionManager) {
    match session.on_focus() {
        Some(delay) => info!(delay_ms = delay.as_millis() as u64, "refresh re-armed"),
        None => info!("refresh not re-armed"),
    }
}

async fn focus_regained(sig: &mut Option<Signal>) {
    match sig {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
