//! Source catalog commands.

use crate::app::SourcesCommands;
use macblock_core::{sources, store};
use macblock_types::Result;

/// `macblock sources <list|set>`
pub async fn run(command: SourcesCommands) -> Result<()> {
    match command {
        SourcesCommands::List => list(),
        SourcesCommands::Set { name } => set(&name),
    }
}

fn list() -> Result<()> {
    let state = store::load()?;
    let mut active_is_builtin = false;

    for spec in sources::CATALOG {
        let marker = if spec.name == state.source {
            active_is_builtin = true;
            "*"
        } else {
            " "
        };
        println!("{marker} {:24} {}", spec.name, spec.description);
    }
    if !active_is_builtin {
        println!("* {:24} custom URL", state.source);
    }
    Ok(())
}

fn set(name: &str) -> Result<()> {
    // Validate before touching state so unknown names change nothing.
    let resolved = sources::resolve(name)?;

    let _lock = store::lock()?;
    let mut state = store::load()?;
    state.source = resolved.id.clone();
    store::save(&state)?;

    println!("Source set to {}. Run `macblock update` to apply it.", resolved.id);
    Ok(())
}
