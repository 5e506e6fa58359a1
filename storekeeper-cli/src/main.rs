//! storekeeper: Shopify reconciliation actions.
//!
//! # Usage
//!
//! ```text
//! storekeeper sync-collections-status [--event <event>] [--retries <1..=10>] [--runId <id>] [--config <path>]
//! storekeeper sync-products-quantity  [...]
//! storekeeper clean-airtable          [...]
//! ```
//!
//! Exits 0 only when the action reached a successful terminal state.

mod annotate;
mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use storekeeper_core::config::RetryCount;
use storekeeper_core::types::TriggerEvent;
use storekeeper_sync::ActionKind;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "storekeeper",
    version,
    about = "Reconcile a Shopify store against its sources of truth",
    long_about = None,
)]
pub struct Cli {
    /// Action to run: sync-collections-status, sync-products-quantity or clean-airtable.
    pub action: ActionKind,

    /// Event that triggered this run (e.g. workflow_dispatch, schedule).
    #[arg(long)]
    pub event: Option<TriggerEvent>,

    /// Number of attempts, between 1 and 10. Overrides RETRIES.
    #[arg(long, value_parser = parse_retries)]
    pub retries: Option<RetryCount>,

    /// CI run id, used to link audit rows back to the run.
    #[arg(long = "runId", alias = "run-id")]
    pub run_id: Option<String>,

    /// Read configuration from a YAML file instead of the environment.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_retries(s: &str) -> Result<RetryCount, String> {
    let attempts: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a whole number"))?;
    RetryCount::new(attempts).map_err(|err| err.to_string())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    annotate::init_tracing();

    match commands::run::execute(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
