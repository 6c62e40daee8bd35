//! Log tailing.

use crate::app::LogStream;
use macblock_types::{paths, Error, Result};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

fn resolve_log_file(stream: LogStream) -> Result<PathBuf> {
    let candidates = match stream {
        LogStream::Stdout => vec![paths::daemon_stdio_log_file("stdout")],
        LogStream::Stderr => vec![paths::daemon_stdio_log_file("stderr")],
        LogStream::Auto => vec![
            paths::daemon_log_file(),
            paths::daemon_stdio_log_file("stderr"),
            paths::daemon_stdio_log_file("stdout"),
        ],
    };
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            Error::user(format!(
                "no log file found (looked for {}); is macblock installed?",
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

fn print_tail(path: &PathBuf, lines: usize) -> Result<u64> {
    let text = std::fs::read_to_string(path)?;
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    for line in &all[start..] {
        println!("{line}");
    }
    Ok(text.len() as u64)
}

/// `macblock logs [--follow] [--stream ...] [-n lines]`
pub async fn run(lines: usize, follow: bool, stream: LogStream) -> Result<()> {
    let path = resolve_log_file(stream)?;
    let mut offset = print_tail(&path, lines)?;

    while follow {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        let len = metadata.len();
        if len < offset {
            // Rotated or truncated; start over from the top.
            offset = 0;
        }
        if len == offset {
            continue;
        }
        let mut file = std::fs::File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut fresh = String::new();
        file.read_to_string(&mut fresh)?;
        print!("{fresh}");
        offset = len;
    }
    Ok(())
}
