//! Top-level error handling.
//!
//! Every failure in macvm is fatal: the library returns typed errors and the
//! binary funnels them through [`terminate`], which logs a diagnostic and
//! ends the process.

use tracing::{error, info};

use crate::{logging, Error, Result};

/// Process exit status for `result`.
pub fn exit_status(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// One-line diagnostic for a fatal error, with a hint where one helps.
pub fn diagnostic(err: &Error) -> String {
    match err {
        Error::MissingArtifact { .. } => format!(
            "{}. Run the installation tool first to create the virtual machine bundle.",
            err
        ),
        _ => err.to_string(),
    }
}

/// Log the outcome, flush the file log and exit the process.
pub fn terminate(result: Result<()>) -> ! {
    match &result {
        Ok(()) => info!("Exiting"),
        Err(err) => error!("{}", diagnostic(err)),
    }
    logging::flush();
    std::process::exit(exit_status(&result))
}
