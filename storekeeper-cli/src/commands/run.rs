//! `storekeeper <action>`: build collaborators and run one action.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;

use storekeeper_clients::{audit_backend, http_client, PimClient, ShopifyClient};
use storekeeper_core::config::{load_at, Config};
use storekeeper_core::types::TriggerEvent;
use storekeeper_sync::{pipeline, ActionContext, RunOutcome, SyncSettings};

use crate::Cli;

pub fn execute(cli: Cli) -> Result<std::process::ExitCode> {
    let mut config = match &cli.config {
        Some(path) => load_at(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::from_env().context("failed to load config from environment")?,
    };
    if let Some(retries) = cli.retries {
        config.engine.retries = retries;
    }

    let event = cli.event.or_else(|| {
        (!config.ci.github_actions).then_some(TriggerEvent::LocalDispatch)
    });
    let trigger = config.ci.trigger(event, cli.run_id.clone());

    let client = http_client(Duration::from_secs(config.engine.http_timeout_secs));
    let ctx = ActionContext {
        platform: Arc::new(ShopifyClient::new(client.clone(), &config.shopify)),
        availability: Arc::new(PimClient::new(client.clone(), &config.pim)),
        backend: audit_backend(client, &config.audit),
        settings: SyncSettings::from_config(&config),
        trigger,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let outcome = runtime.block_on(pipeline::run(cli.action, &ctx));

    print_outcome(cli.action.title(), &outcome);
    Ok(if outcome.terminal.is_success() {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::FAILURE
    })
}

fn print_outcome(title: &str, outcome: &RunOutcome) {
    let attempts = if outcome.attempts == 1 {
        "1 attempt".to_string()
    } else {
        format!("{} attempts", outcome.attempts)
    };
    let line = format!("{title}: {} ({}, {attempts})", outcome.message, outcome.status);
    if outcome.terminal.is_success() {
        println!("{} {}", "✓".green().bold(), line.green());
    } else {
        println!("{} {}", "✗".red().bold(), line.red());
    }
}
