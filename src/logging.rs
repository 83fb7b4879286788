//! Tracing subscriber setup.
//!
//! The file writer's [`WorkerGuard`] lives in a process-wide slot so that
//! [`flush`] can be called from [`exit::terminate`](crate::exit::terminate),
//! which never returns to `main`.

use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{Error, Result};

/// File name used when logging to a directory
pub const LOG_FILE_NAME: &str = "macvm.log";

static FILE_GUARD: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();

/// Install the global subscriber.
///
/// Filtering comes from `RUST_LOG` and defaults to `info`. With `log_dir`
/// set, output is also written to `macvm.log` there. Buffered file output is
/// written out by [`flush`].
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {}", e)))?;

    if let Some(guard) = guard {
        let slot = FILE_GUARD.get_or_init(|| Mutex::new(None));
        if let Ok(mut slot) = slot.lock() {
            *slot = Some(guard);
        }
    }
    Ok(())
}

/// Write out buffered file output and stop the file writer.
///
/// Events logged afterwards only reach stderr. Safe to call more than once.
pub fn flush() {
    let guard = FILE_GUARD
        .get()
        .and_then(|slot| slot.lock().ok())
        .and_then(|mut slot| slot.take());
    drop(guard);
}
