//! Registry of consumed JSON-pointer prefixes per host mode.
//!
//! Only list pointers the code in that mode actually reads. Anything else in
//! the effective config is reported as unused by
//! [`report_unused_keys`](crate::report_unused_keys).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// `otk track`: one order, one session, exits on terminal.
    Cli,
    /// `otk-daemon`: many sessions behind the HTTP control plane.
    Daemon,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Cli => "CLI",
            ConfigMode::Daemon => "DAEMON",
        }
    }
}

// Observed reads:
// - TrackerConfig::from_config_json      /api/*, /timing/*
// - resolve_credential                   /api/credential_env (CLI only)
// - DaemonConfig::from_config_json       /daemon/* (daemon only)
// The daemon takes its credential from each request's bearer header.
static CLI: &[&str] = &["/api", "/timing"];

static DAEMON: &[&str] = &[
    "/api/rest_base_url",
    "/api/push_base_url",
    "/timing",
    "/daemon",
];

pub fn consumed_pointers_for_mode(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Cli => CLI,
        ConfigMode::Daemon => DAEMON,
    }
}
