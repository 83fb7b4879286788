use std::process::ExitCode;

use clap::Parser;

use macvm::cli::{Cli, Command, Settings};
use macvm::{exit, logging, Result};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_dir.as_deref()) {
        eprintln!("macvm: {}", e);
        return ExitCode::FAILURE;
    }

    let result = run(&cli);
    if let Err(ref e) = result {
        tracing::error!("{}", exit::diagnostic(e));
    }
    logging::flush();
    ExitCode::from(exit::exit_status(&result) as u8)
}

fn run(cli: &Cli) -> Result<()> {
    let settings = cli.settings()?;
    match cli.command() {
        Command::Check => cmd_check(&settings),
        Command::Run { .. } => cmd_run(settings),
    }
}

#[cfg(target_os = "macos")]
fn cmd_run(settings: Settings) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("macvm-worker")
        .build()?;
    macvm::app::run(settings, runtime.handle().clone())
}

#[cfg(target_os = "macos")]
fn cmd_check(settings: &Settings) -> Result<()> {
    let config = macvm::app::check(settings)?;
    println!(
        "valid: {} (cpus={}, memory={}MB)",
        settings.bundle.root().display(),
        config.cpu_count(),
        config.memory_size() / (1024 * 1024)
    );
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn cmd_run(_settings: Settings) -> Result<()> {
    Err(unsupported_host())
}

#[cfg(not(target_os = "macos"))]
fn cmd_check(_settings: &Settings) -> Result<()> {
    Err(unsupported_host())
}

#[cfg(not(target_os = "macos"))]
fn unsupported_host() -> macvm::Error {
    macvm::Error::UnsupportedHost(
        "Virtualization.framework is only available on macOS".into(),
    )
}
