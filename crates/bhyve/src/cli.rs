//! Clap derive structures for the `bhyve` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use bhyve_config::Settings;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// bhyve -- talk to the Orbit B-hyve irrigation cloud
#[derive(Debug, Parser)]
#[command(
    name = "bhyve",
    version,
    about = "Log in to B-hyve, list devices, and watch real-time events",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "BHYVE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Account email
    #[arg(long, short = 'e', global = true)]
    pub email: Option<String>,

    /// Account password
    #[arg(long, env = "BHYVE_PASSWORD", global = true, hide_env = true)]
    pub password: Option<String>,

    /// REST base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Real-time events URL
    #[arg(long, global = true)]
    pub wss_url: Option<String>,

    /// REST request timeout in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    pub timeout: Option<u64>,

    /// WebSocket handshake timeout in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    pub ws_timeout: Option<u64>,

    /// Log request and stream traffic (token excluded)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl GlobalOpts {
    /// Flags as the top configuration layer. Unset flags stay `None` so the
    /// file and environment values show through.
    pub fn overrides(&self) -> Settings {
        Settings {
            base_url: self.base_url.clone(),
            wss_url: self.wss_url.clone(),
            timeout_ms: self.timeout,
            ws_timeout_ms: self.ws_timeout,
            email: self.email.clone(),
            password: self.password.clone(),
            debug: self.debug.then_some(true),
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authenticate and print the account's user id
    Login(LoginArgs),

    /// List the devices registered to the account
    #[command(alias = "dev")]
    Devices(DevicesArgs),

    /// Stream real-time events until Ctrl-C or the server closes
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Also print the session token
    #[arg(long)]
    pub show_token: bool,
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Single-line JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Pretty-print messages that are valid JSON
    #[arg(long)]
    pub pretty: bool,
}
