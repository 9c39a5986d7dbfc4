//! Tracing setup shared by the server and the `docqa` CLI.
//!
//! Events go to a console writer (stdout for the server, stderr for the CLI so extracted text on
//! stdout stays clean). Setting `DOCQA_LOG_FILE` adds a second, uncoloured sink appending to that
//! file through a non-blocking writer. `RUST_LOG` overrides the default filter.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, fmt::writer::BoxMakeWriter, prelude::*};

/// Environment variable naming the optional log file.
pub const LOG_FILE_ENV: &str = "DOCQA_LOG_FILE";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where console output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    /// Standard output, used by the HTTP server.
    Stdout,
    /// Standard error, used by the CLI.
    Stderr,
}

impl Console {
    fn writer(self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(std::io::stdout),
            Self::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Install the server subscriber: stdout at `info` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    init_tracing_with(Console::Stdout, "info");
}

/// Install a subscriber writing to `console`, plus the optional file sink.
///
/// Calling this twice leaves the first subscriber in place.
pub fn init_tracing_with(console: Console, default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let console_layer = fmt::layer()
        .with_writer(console.writer())
        .with_target(false)
        .compact();

    let file_layer = std::env::var_os(LOG_FILE_ENV)
        .filter(|path| !path.is_empty())
        .and_then(|path| file_writer(Path::new(&path)))
        .map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact()
        });

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Open `path` for appending and wrap it in a non-blocking writer.
///
/// The worker guard lives for the rest of the process, so only the first file sink is kept.
/// Returns `None` (after reporting on stderr) when the file cannot be opened.
fn file_writer(path: &Path) -> Option<NonBlocking> {
    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Err(err) = parent.map_or(Ok(()), std::fs::create_dir_all) {
        eprintln!("Failed to create log directory for {}: {err}", path.display());
        return None;
    }
    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(file);
    if LOG_GUARD.set(guard).is_err() {
        return None;
    }
    Some(writer)
}
