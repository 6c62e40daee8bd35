//! macOS system integration for macblock.
//!
//! Everything that talks to the host OS lives here: the bounded process
//! runner, the `scutil --dns` resolver-table reader, network-service listing
//! and selection, the per-service DNS controller, launchd manifest handling,
//! and the network-change watcher.
//!
//! Parsers are pure functions over captured command output so they stay
//! testable on any OS; only the watcher needs macOS APIs at compile time.

#![warn(missing_docs)]

pub mod dns;
pub mod launchd;
pub mod resolver_table;
pub mod run;
pub mod services;
pub mod watch;

pub use resolver_table::ResolverTable;
pub use run::CommandOutput;
pub use services::NetworkService;
pub use watch::NetworkWatcher;

/// Returns an error unless running on macOS.
pub fn require_macos() -> macblock_types::Result<()> {
    if cfg!(target_os = "macos") {
        Ok(())
    } else {
        Err(macblock_types::Error::platform(
            "macblock manages macOS network services and only runs on macOS",
        ))
    }
}
