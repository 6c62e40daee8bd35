//! CLI application definition using clap.

use clap::{Parser, Subcommand, ValueEnum};

/// macblock - local DNS sinkhole for macOS
#[derive(Parser, Debug)]
#[command(
    name = "macblock",
    version,
    about = "Local DNS sinkhole for macOS",
    long_about = "Blocks unwanted domains at the DNS level by running a loopback\n\
                  dnsmasq resolver and keeping every managed network service\n\
                  pointed at it. Split-DNS upstreams from VPNs are preserved."
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the resolver, daemon, and system integration (needs root)
    Install {
        /// Redo steps that look already installed
        #[arg(long)]
        force: bool,

        /// Defer the first blocklist compile
        #[arg(long)]
        skip_update: bool,
    },

    /// Remove everything install created (needs root)
    Uninstall {
        /// Continue past per-item failures and remove the resolver user
        #[arg(long)]
        force: bool,
    },

    /// Turn blocking on
    Enable,

    /// Turn blocking off and restore DNS
    Disable,

    /// Suspend blocking for a while, e.g. `macblock pause 30m`
    Pause {
        /// Duration like 30s, 10m, 2h, 1d
        duration: String,
    },

    /// End a pause early
    Resume,

    /// Download, compile, and apply the blocklist
    Update {
        /// Use this source (catalog name or https:// URL) and remember it
        #[arg(long)]
        source: Option<String>,

        /// Lower the safety floor for custom URL sources
        #[arg(long)]
        min_domains: Option<usize>,
    },

    /// Manage the blocklist source selection
    Sources {
        #[command(subcommand)]
        command: SourcesCommands,
    },

    /// Manage the never-block list
    Allow {
        #[command(subcommand)]
        command: ListCommands,
    },

    /// Manage the always-block list
    Deny {
        #[command(subcommand)]
        command: ListCommands,
    },

    /// Manage fallback upstream resolvers
    Upstreams {
        #[command(subcommand)]
        command: UpstreamsCommands,
    },

    /// Show what macblock is doing right now
    Status,

    /// Run read-only health checks with remediation hints
    Doctor,

    /// Show daemon logs
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,

        /// Keep printing as new lines arrive
        #[arg(short, long)]
        follow: bool,

        /// Which log stream to read
        #[arg(long, value_enum, default_value = "auto")]
        stream: LogStream,
    },

    /// Query the loopback resolver and report whether a domain is blocked
    Test {
        /// Domain to look up
        domain: String,
    },

    /// Daemon entry points (used by launchd)
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

/// Sources subcommands
#[derive(Subcommand, Debug)]
pub enum SourcesCommands {
    /// List known sources and mark the active one
    List,
    /// Select a source; takes effect on the next update
    Set {
        /// Catalog name or https:// URL
        name: String,
    },
}

/// Allow/deny list subcommands
#[derive(Subcommand, Debug)]
pub enum ListCommands {
    /// Add a domain and recompile the blocklist
    Add {
        /// Domain to add
        domain: String,
    },
    /// Remove a domain and recompile the blocklist
    Remove {
        /// Domain to remove
        domain: String,
    },
    /// Print the list
    List,
}

/// Upstreams subcommands
#[derive(Subcommand, Debug)]
pub enum UpstreamsCommands {
    /// Print the fallback upstream IPs
    List,
    /// Replace the fallback upstream IPs
    Set {
        /// One or more IP addresses
        #[arg(required = true)]
        ips: Vec<String>,
    },
    /// Restore the shipped default fallbacks
    Reset,
}

/// Log stream options
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogStream {
    /// The daemon log if present, else the launchd stderr capture
    #[default]
    Auto,
    /// launchd stdout capture
    Stdout,
    /// launchd stderr capture
    Stderr,
}

/// Daemon subcommands
#[derive(Subcommand, Debug)]
pub enum DaemonCommands {
    /// Run the reconcile loop in the foreground (launchd does this)
    Run,
}
