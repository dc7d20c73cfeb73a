//! Tracing setup and log file access.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Keeps the file writer flushing. Drop it last.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Always logs to stderr. With `log_file`, also appends plain-text lines to
/// that file. `RUST_LOG` overrides the default `info` level.
pub fn init(log_file: Option<&Path>) -> LogGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let mut open_error = None;
    let (file_layer, guard) = match log_file.map(file_writer) {
        Some(Ok((writer, guard))) => {
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            open_error = Some(e);
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .try_init();

    if let (Some(path), Some(e)) = (log_file, open_error) {
        warn!(path = %path.display(), error = %e, "Log file unavailable, logging to stderr only");
    }

    LogGuard { _file: guard }
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), String> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("invalid log file name: {}", path.display()))?;

    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| e.to_string())?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Last `lines` lines of the log file. A missing file has no lines.
///
/// The file is streamed; at most `lines` lines are held at once.
pub async fn tail(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    if lines == 0 {
        return Ok(Vec::new());
    }
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut reader = BufReader::new(file).lines();
    let mut last = VecDeque::with_capacity(lines.min(1024));
    while let Some(line) = reader.next_line().await? {
        if last.len() == lines {
            last.pop_front();
        }
        last.push_back(line);
    }
    Ok(last.into())
}
