//! Pipe words through `sort` and print them back in order.
//!
//! Usage: `sort-words [WORD]...` (defaults to "put a ring on it").
//! Set `RUST_LOG=debug` to see the spawn and reap events, and
//! `LOG_FORMAT=json` for JSON log lines.

use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use subproc::ProcessHandle;
use tracing_subscriber::EnvFilter;

const DEFAULT_WORDS: [&str; 5] = ["put", "a", "ring", "on", "it"];
const SORT: &str = "sort";

fn init_logging() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    init_logging();

    let mut words: Vec<String> = std::env::args().skip(1).collect();
    if words.is_empty() {
        words = DEFAULT_WORDS.iter().map(ToString::to_string).collect();
    }

    let mut child = subproc::spawn(&[SORT], true, true)
        .with_context(|| format!("failed to spawn `{SORT}`"))?;
    let supply = child
        .take_supply()
        .context("child was spawned without a stdin pipe")?;
    let ingest = child
        .take_ingest()
        .context("child was spawned without a stdout pipe")?;

    // sort prints nothing until its input ends, so all writes come first
    let mut writer = File::from(supply);
    for word in &words {
        writeln!(writer, "{word}").context("failed to write to sort")?;
    }
    drop(writer);

    let mut stdout = std::io::stdout().lock();
    for line in BufReader::new(File::from(ingest)).lines() {
        let line = line.context("failed to read from sort")?;
        writeln!(stdout, "{line}")?;
    }

    let state = subproc::wait(child.pid()).context("failed to reap sort")?;
    if state.is_exec_failure() {
        bail!("`{SORT}` could not be executed");
    }
    if !state.success() {
        bail!("`{SORT}` finished with {state}");
    }
    Ok(())
}
