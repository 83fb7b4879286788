//! Command line and environment configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::bundle::VmBundle;
use crate::config::SizingPolicy;
use crate::Result;

/// Boot a provisioned macOS guest with Virtualization.framework
#[derive(Debug, Parser)]
#[command(name = "macvm", version, about)]
pub struct Cli {
    /// VM bundle directory (default: ~/VM.bundle)
    #[arg(long, env = "MACVM_BUNDLE", global = true)]
    pub bundle: Option<PathBuf>,

    /// Fixed guest CPU count, clamped to what the host allows
    #[arg(long, env = "MACVM_CPUS", global = true)]
    pub cpus: Option<usize>,

    /// Guest memory in megabytes, clamped to what the host allows
    #[arg(long, env = "MACVM_MEMORY_MB", global = true)]
    pub memory_mb: Option<u64>,

    /// Also write logs to macvm.log in this directory
    #[arg(long, env = "MACVM_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Boot the guest and show its display (default)
    Run {
        /// Do not open a window
        #[arg(long)]
        headless: bool,
    },
    /// Load the bundle and validate the configuration without booting
    Check,
}

/// Resolved launch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bundle: VmBundle,
    pub sizing: SizingPolicy,
    pub headless: bool,
}

impl Cli {
    /// The subcommand, defaulting to a windowed `run`.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Run { headless: false })
    }

    pub fn settings(&self) -> Result<Settings> {
        let bundle = VmBundle::resolve(self.bundle.as_deref())?;

        let mut sizing = SizingPolicy::default();
        if let Some(cpus) = self.cpus {
            sizing = sizing.cpus(cpus);
        }
        if let Some(mb) = self.memory_mb {
            sizing = sizing.memory_mb(mb);
        }

        let headless = matches!(self.command(), Command::Run { headless: true });

        Ok(Settings {
            bundle,
            sizing,
            headless,
        })
    }
}
