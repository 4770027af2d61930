//! Command handler modules for otk-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod track;

use anyhow::Result;
use otk_config::{
    load_layered_yaml, report_unused_keys, ConfigMode, DaemonConfig, LoadedConfig,
    UnusedKeyPolicy,
};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    load_layered_yaml(&path_refs)
}

/// `otk config-check`: typed validation for `mode`, then the unused-key
/// report. With `strict`, unused keys are an error.
pub fn config_check(paths: &[String], mode: ConfigMode, strict: bool) -> Result<()> {
    let loaded = load_config(paths)?;

    let tracker = loaded.tracker()?;
    if mode == ConfigMode::Daemon {
        DaemonConfig::from_config_json(&loaded.config_json)?;
    }

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(mode, &loaded.config_json, policy)?;

    println!("config_hash={}", loaded.config_hash);
    println!("mode={}", report.mode);
    println!("credential_env={}", tracker.api.credential_env);
    println!("unused_keys={}", report.unused_leaf_pointers.len());
    for p in &report.unused_leaf_pointers {
        println!("unused={p}");
    }
    Ok(())
}
