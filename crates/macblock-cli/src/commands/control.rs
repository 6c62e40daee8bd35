//! enable / disable / pause / resume.

use macblock_core::store;
use macblock_daemon::markers;
use macblock_types::{duration, Result};
use tracing::warn;

/// Mutates state under the control-plane lock, then kicks the daemon. The
/// state write lands before the signal so the daemon never reads stale
/// state on the wakeup we just caused.
fn mutate_and_kick(
    apply: impl FnOnce(&mut macblock_types::DesiredState),
) -> Result<macblock_types::DesiredState> {
    let state = {
        let _lock = store::lock()?;
        let mut state = store::load()?;
        apply(&mut state);
        store::save(&state)?;
        state
    };
    if !markers::kick()? {
        warn!("daemon is not running; the change applies once it starts");
    }
    Ok(state)
}

/// `macblock enable`
pub async fn enable() -> Result<()> {
    mutate_and_kick(|state| {
        state.enabled = true;
        state.paused_until = None;
    })?;
    println!("Blocking enabled.");
    Ok(())
}

/// `macblock disable`
pub async fn disable() -> Result<()> {
    mutate_and_kick(|state| {
        state.enabled = false;
        state.paused_until = None;
    })?;
    println!("Blocking disabled; DNS is being restored.");
    Ok(())
}

/// `macblock pause <duration>`
pub async fn pause(duration: &str) -> Result<()> {
    // Validate before taking any locks so bad input fails fast.
    let parsed = duration::parse_brief(duration)?;
    let until = chrono::Utc::now().timestamp() + parsed.as_secs() as i64;

    mutate_and_kick(|state| {
        state.paused_until = Some(until);
    })?;

    let when = chrono::DateTime::from_timestamp(until, 0)
        .map_or_else(|| until.to_string(), |t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string());
    println!("Blocking paused until {when}.");
    Ok(())
}

/// `macblock resume`
pub async fn resume() -> Result<()> {
    mutate_and_kick(|state| {
        state.paused_until = None;
    })?;
    println!("Pause cleared.");
    Ok(())
}
