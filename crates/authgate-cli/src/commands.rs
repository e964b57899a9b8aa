use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use authgate_core::{AuthContext, Config, GuardOutcome, RecordingNavigator, StorageBackend};
use tracing::warn;

fn open(config: Config) -> Result<(AuthContext, Arc<RecordingNavigator>)> {
    let navigator = Arc::new(RecordingNavigator::new());
    let ctx = AuthContext::from_config(config, navigator.clone())?;
    Ok((ctx, navigator))
}

pub fn login(config: Config, token: Option<String>) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => rpassword::prompt_password("Token: ").context("Failed to read token")?,
    };
    let token = token.trim();
    if token.is_empty() {
        bail!("Token must not be empty");
    }

    let (ctx, _) = open(config)?;
    ctx.login(token)?;
    println!("Signed in ({} storage)", ctx.config().storage);
    Ok(())
}

pub fn logout(config: Config) -> Result<()> {
    let (ctx, _) = open(config)?;
    ctx.logout()?;
    println!("Signed out");
    Ok(())
}

pub fn status(config: Config) -> Result<()> {
    let (ctx, _) = open(config)?;
    let state = if ctx.session().is_authenticated() {
        "signed in"
    } else {
        "signed out"
    };
    println!("Session:  {}", state);
    println!("Storage:  {} (key '{}')", ctx.config().storage, ctx.session().token_key());
    println!("Guard:    {}", ctx.guard().mode());
    println!("Backend:  {}", ctx.api().base_url());
    println!(
        "Public:   {}",
        ctx.guard().public_routes().iter().collect::<Vec<_>>().join(" ")
    );
    Ok(())
}

pub async fn whoami(config: Config) -> Result<()> {
    let (ctx, _) = open(config)?;
    if !ctx.session().is_authenticated() {
        bail!("Not signed in");
    }
    let user = ctx
        .refresh_profile()
        .await
        .context("Failed to resolve current user")?;
    println!("{}", user.email);
    Ok(())
}

pub async fn check(config: Config, routes: &[String]) -> Result<()> {
    let (ctx, navigator) = open(config)?;
    let mut denied = 0;

    for route in routes {
        match ctx.guard().check(route).await {
            GuardOutcome::Allowed => println!("{:<24} allowed", route),
            GuardOutcome::Redirected(to) => {
                denied += 1;
                println!("{:<24} redirect -> {}", route, to);
            }
        }
    }

    if let Some(email) = ctx.session().email() {
        println!("Signed in as {}", email);
    }
    if denied > 0 {
        warn!(denied, redirects = navigator.redirects().len(), "Some routes require a session");
        bail!("{} of {} routes require a session", denied, routes.len());
    }
    Ok(())
}

pub async fn watch(config: Config) -> Result<()> {
    ensure_watchable(config.storage)?;
    let (mut ctx, _) = open(config)?;
    ctx.start();

    let mut rx = ctx.session().subscribe();
    println!(
        "Session is {} - watching for changes (Ctrl+C to stop)",
        describe(*rx.borrow_and_update())
    );

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("Session is now {}", describe(*rx.borrow_and_update()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    ctx.shutdown().await;
    Ok(())
}

/// Only storage another process can write to is worth watching.
fn ensure_watchable(storage: StorageBackend) -> Result<()> {
    match storage {
        StorageBackend::File => Ok(()),
        StorageBackend::Keyring => {
            bail!("Keyring storage has no change notifications and cannot be watched")
        }
        StorageBackend::Memory => {
            bail!("Memory storage is private to this process and cannot be watched")
        }
    }
}

pub fn show_config(config: &Config, save: bool, path: Option<&Path>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        match path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        println!("Saved");
    }
    Ok(())
}

fn describe(authenticated: bool) -> &'static str {
    if authenticated {
        "signed in"
    } else {
        "signed out"
    }
}
