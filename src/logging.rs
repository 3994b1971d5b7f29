//! Logging setup.
//!
//! The original `bbfs.c` called `log_open()` once in `main` to redirect
//! every `log_msg()` call at a fixed `bbfs.log` in the current directory.
//! This keeps the "one file, set up once at startup" shape but routes
//! through `log`/`env_logger` so level filtering comes from `RUST_LOG`
//! instead of being compiled in, and the destination is overridable via
//! `BBFS_LOG_FILE` instead of hardcoded.

use std::fs::OpenOptions;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

pub const DEFAULT_LOG_FILE: &str = "bbfs.log";

pub fn init(foreground: bool) -> std::io::Result<()> {
    let log_path = std::env::var("BBFS_LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info).parse_default_env();

    if foreground {
        // Stay on stderr so `--foreground` runs behave like a normal
        // terminal program.
        builder.init();
        return Ok(());
    }

    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
    builder.target(env_logger::Target::Pipe(Box::new(file)));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}: {}",
            chrono_like_timestamp(),
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.init();
    Ok(())
}

/// A coarse, dependency-free timestamp for log lines. The original
/// `log_msg` didn't timestamp at all; this is the minimum needed to make
/// a long-running mount's log readable without pulling in a date/time
/// crate the rest of the crate has no other use for.
fn chrono_like_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
