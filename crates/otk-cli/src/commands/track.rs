//! `otk track`: one session, printed as JSON lines until terminal.

use anyhow::{Context, Result};
use otk_config::{report_unused_keys, resolve_credential, ConfigMode, UnusedKeyPolicy};
use otk_runtime::Tracker;
use tracing::{info, warn};

use super::load_config;

/// Conventional exit code after SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

/// Returns the process exit code.
pub async fn run(order_id: &str, config_paths: &[String]) -> Result<i32> {
    let order_id = order_id.trim();
    anyhow::ensure!(!order_id.is_empty(), "--order-id must not be empty");

    let loaded = load_config(config_paths)?;
    let report = report_unused_keys(ConfigMode::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(pointer = %pointer, "unused config key");
    }

    let cfg = loaded.tracker()?;
    let credential = resolve_credential(&cfg.api)?;
    info!(order_id, config_hash = %loaded.config_hash, "tracking");

    let session = Tracker::from_config(&cfg).track(order_id, credential);
    let mut snaps = session.subscribe_snapshot();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = snaps.changed() => {
                if changed.is_err() {
                    anyhow::bail!("session ended without a terminal status");
                }
                let snap = snaps.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snap).context("snapshot serialize failed")?);
                if snap.is_terminal() {
                    session.dispose();
                    return Ok(0);
                }
            }
            _ = &mut ctrl_c => {
                session.dispose();
                eprintln!("interrupted; session disposed");
                return Ok(EXIT_INTERRUPTED);
            }
        }
    }
}
