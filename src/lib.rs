//! macvm: boot a provisioned macOS guest with Virtualization.framework
//!
//! macvm loads the identity artifacts an installation step left in a VM
//! bundle, assembles a machine configuration from them, starts the guest and
//! shows its display in a window. Everything the guest needs at runtime is
//! supplied by the host framework behind the [`backend::Hypervisor`] trait.
//!
//! # Flow
//!
//! - [`config::from_bundle`]: artifacts + sizing policy → [`MachineConfig`]
//! - [`Bootstrapper::launch`]: validate, construct, attach observer, bind
//!   display, start
//! - [`lifecycle::LifecycleObserver`]: the guest's single terminal event
//!
//! # Example
//!
//! ```no_run
//! use macvm::backend::mock::{MockDisplay, MockHypervisor};
//! use macvm::{config, Bootstrapper, SizingPolicy, VmBundle};
//!
//! #[tokio::main]
//! async fn main() -> macvm::Result<()> {
//!     let hypervisor = MockHypervisor::new();
//!     let bundle = VmBundle::new("/Users/me/VM.bundle");
//!
//!     let config = config::from_bundle(&hypervisor, &bundle, &SizingPolicy::default())?;
//!     let launch = Bootstrapper::new().launch(&hypervisor, config, &mut MockDisplay::new())?;
//!
//!     let (_machine, started, observer) = launch.into_parts();
//!     started.wait().await?;
//!     if let Some(event) = observer.wait().await {
//!         event.into_result()?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod bootstrap;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod devices;
pub mod display;
pub mod error;
pub mod exit;
pub mod lifecycle;
pub mod logging;
pub mod platform;

#[cfg(target_os = "macos")]
pub mod app;

// Re-exports for convenience
pub use bootstrap::{Bootstrapper, Launch};
pub use bundle::VmBundle;
pub use config::{MachineConfig, SizingPolicy};
pub use error::{Error, Result};
