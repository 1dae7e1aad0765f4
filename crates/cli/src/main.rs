//! # CLI - Sediment Interactive Shell
//!
//! A REPL-style command-line interface for the Sediment storage engine.
//! Reads commands from stdin, executes them against the database, and prints
//! results to stdout. Log output goes to stderr, so scripted runs (commands
//! piped via stdin) see only command results on stdout.
//!
//! ## Commands
//!
//! ```text
//! SET key value            Insert or update a key-value pair
//! GET key                  Look up a key (prints value or "(nil)")
//! DEL key                  Delete a key
//! SCAN [>=|>|<=|<] [key]   Walk keys in order (default: >= from the first key)
//! MERGE                    Run one merge round now
//! STAT                     Print repository statistics
//! EXIT / QUIT              Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! SEDIMENT_DIR        repository directory          (default: "data")
//! SEDIMENT_PAGE_SIZE  records per page              (default: 2048)
//! SEDIMENT_WATERMARK  updates before a merge        (default: 100000)
//! SEDIMENT_MERGE      run the merge thread          (default: "true")
//! SEDIMENT_GC         delete unreferenced db files  (default: "true")
//! SEDIMENT_READ_ONLY  open without writing          (default: "false")
//! SEDIMENT_LOG_SYNC   fsync every log append        (default: "false")
//! RUST_LOG            log filter                    (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! Sediment started (dir=data, epoch=1, psn=0, page_size=2048, merge=true)
//! > SET name Alice
//! OK
//! > GET name
//! Alice
//! > SCAN
//! name -> Alice
//! (1 entries)
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use config::Config;
use engine::{Db, Order};
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn config_from_env() -> Config {
    let dir = env_or("SEDIMENT_DIR", "data");
    let page_size: usize = env_or("SEDIMENT_PAGE_SIZE", "2048").parse().unwrap_or(2048);
    let watermark: usize = env_or("SEDIMENT_WATERMARK", "100000").parse().unwrap_or(100_000);
    let merge: bool = env_or("SEDIMENT_MERGE", "true").parse().unwrap_or(true);
    let gc: bool = env_or("SEDIMENT_GC", "true").parse().unwrap_or(true);
    let read_only: bool = env_or("SEDIMENT_READ_ONLY", "false").parse().unwrap_or(false);
    let log_sync: bool = env_or("SEDIMENT_LOG_SYNC", "false").parse().unwrap_or(false);

    Config::builder(dir)
        .page_size(page_size)
        .merge_watermark(watermark)
        .merge(merge)
        .gc(gc)
        .read_only(read_only)
        .log_sync(log_sync)
        .build()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = config_from_env();
    let db = Db::open(config)?;
    let stat = db.stat();
    println!(
        "Sediment started (dir={}, epoch={}, psn={}, page_size={}, merge={})",
        db.config().dir.display(),
        stat.epoch,
        stat.psn,
        db.config().page_size,
        db.config().merge
    );
    println!("Commands: SET key value | GET key | DEL key | SCAN [>=|>|<=|<] [key]");
    println!("          MERGE | STAT | EXIT");

    let stdin = io::stdin();
    let stdout = io::stdout();
    run(&db, stdin.lock(), stdout.lock())?;
    db.close()?;
    info!("shell closed");
    Ok(())
}

/// Executes commands from `input` until EOF or `EXIT`, writing replies to `out`.
fn run(db: &Db, input: impl BufRead, mut out: impl Write) -> Result<()> {
    write!(out, "> ")?;
    out.flush()?;

    for line in input.lines() {
        let line = line?;
        if !execute(db, &line, &mut out)? {
            break;
        }
        write!(out, "> ")?;
        out.flush()?;
    }
    Ok(())
}

/// Runs one command line. Returns `false` when the shell should stop.
fn execute(db: &Db, line: &str, out: &mut impl Write) -> Result<bool> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(true);
    };

    match cmd.to_uppercase().as_str() {
        "SET" => {
            let Some(k) = parts.next() else {
                writeln!(out, "ERR usage: SET key value")?;
                return Ok(true);
            };
            let v: String = parts.collect::<Vec<&str>>().join(" ");
            if v.is_empty() {
                writeln!(out, "ERR usage: SET key value")?;
            } else {
                match db.set(k.as_bytes(), v.as_bytes()) {
                    Ok(()) => writeln!(out, "OK")?,
                    Err(e) => writeln!(out, "ERR set failed: {e}")?,
                }
            }
        }
        "GET" => match parts.next() {
            Some(k) => match db.get(k.as_bytes()) {
                Ok(Some(v)) => writeln!(out, "{}", String::from_utf8_lossy(&v))?,
                Ok(None) => writeln!(out, "(nil)")?,
                Err(e) => writeln!(out, "ERR read failed: {e}")?,
            },
            None => writeln!(out, "ERR usage: GET key")?,
        },
        "DEL" => match parts.next() {
            Some(k) => match db.delete(k.as_bytes()) {
                Ok(()) => writeln!(out, "OK")?,
                Err(e) => writeln!(out, "ERR del failed: {e}")?,
            },
            None => writeln!(out, "ERR usage: DEL key")?,
        },
        "SCAN" => {
            let (order, key) = match parts.next() {
                Some(">=") => (Order::Gte, parts.next()),
                Some(">") => (Order::Gt, parts.next()),
                Some("<=") => (Order::Lte, parts.next()),
                Some("<") => (Order::Lt, parts.next()),
                other => (Order::Gte, other),
            };
            scan(db, order, key, out)?;
        }
        "MERGE" => match db.merge_force() {
            Ok(()) => {
                let stat = db.stat();
                writeln!(
                    out,
                    "OK (epoch={}, pages={}, db_files={})",
                    stat.epoch, stat.catalog_page_count, stat.db_epoch_count
                )?;
            }
            Err(e) => writeln!(out, "ERR merge failed: {e}")?,
        },
        "STAT" => {
            writeln!(out, "{:#?}", db.stat())?;
        }
        "EXIT" | "QUIT" => {
            writeln!(out, "bye")?;
            return Ok(false);
        }
        other => {
            writeln!(out, "unknown command: {other}")?;
        }
    }
    Ok(true)
}

fn scan(db: &Db, order: Order, key: Option<&str>, out: &mut impl Write) -> Result<()> {
    let cursor = match db.cursor(order, key.map(str::as_bytes)) {
        Ok(c) => c,
        Err(e) => {
            writeln!(out, "ERR scan failed: {e}")?;
            return Ok(());
        }
    };

    let mut n = 0usize;
    for kv in cursor {
        match kv {
            Ok((k, v)) => {
                writeln!(
                    out,
                    "{} -> {}",
                    String::from_utf8_lossy(&k),
                    String::from_utf8_lossy(&v)
                )?;
                n += 1;
            }
            Err(e) => {
                writeln!(out, "ERR scan failed: {e}")?;
                return Ok(());
            }
        }
    }
    if n == 0 {
        writeln!(out, "(empty)")?;
    } else {
        writeln!(out, "({n} entries)")?;
    }
    Ok(())
}
