//! Allow/deny list commands.

use crate::app::ListCommands;
use macblock_core::{lists, store};
use macblock_types::{domain, paths, Result};
use std::path::PathBuf;
use tracing::warn;

/// Which list a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    /// The never-block list (`whitelist.txt`).
    Allow,
    /// The always-block list (`blacklist.txt`).
    Deny,
}

impl Which {
    fn path(self) -> PathBuf {
        match self {
            Self::Allow => paths::allowlist_file(),
            Self::Deny => paths::denylist_file(),
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Self::Allow => "allowlist",
            Self::Deny => "denylist",
        }
    }
}

fn print_warnings(warnings: &[lists::ListWarning]) {
    for warning in warnings {
        eprintln!("warning: skipping {warning}");
    }
}

/// `macblock allow|deny <add|remove|list>`
pub async fn run(which: Which, command: ListCommands) -> Result<()> {
    match command {
        ListCommands::List => {
            let (domains, warnings) = lists::read(&which.path())?;
            print_warnings(&warnings);
            for d in &domains {
                println!("{d}");
            }
            Ok(())
        }
        ListCommands::Add { domain } => mutate(which, &domain, true).await,
        ListCommands::Remove { domain } => mutate(which, &domain, false).await,
    }
}

async fn mutate(which: Which, raw_domain: &str, add: bool) -> Result<()> {
    // Validate the domain before taking the lock or touching files.
    let normalized = domain::normalize(raw_domain)?;

    let changed = {
        let _lock = store::lock()?;
        let path = which.path();
        let (changed, warnings) = if add {
            lists::add(&path, &normalized)?
        } else {
            lists::remove(&path, &normalized)?
        };
        print_warnings(&warnings);

        // Mirror the file into state so status and the daemon see it.
        let (domains, _) = lists::read(&path)?;
        let mut state = store::load()?;
        match which {
            Which::Allow => state.allowlist = domains,
            Which::Deny => state.denylist = domains,
        }
        store::save(&state)?;
        changed
    };

    let verb = if add { "added to" } else { "removed from" };
    if changed {
        println!("{normalized} {verb} the {}.", which.noun());
    } else if add {
        println!("{normalized} is already on the {}.", which.noun());
    } else {
        println!("{normalized} was not on the {}.", which.noun());
    }

    // The edit only bites once the compiled set is rebuilt.
    if changed {
        let state = store::load()?;
        if state.last_update_at.is_some() {
            if let Err(e) = super::update::run(None, None).await {
                warn!(error = %e, "list updated but recompile failed; run `macblock update`");
            }
        } else {
            println!("Run `macblock update` to compile the blocklist.");
        }
    }
    Ok(())
}
