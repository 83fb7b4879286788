//! macOS Virtualization.framework backend.
//!
//! Implements [`Hypervisor`](crate::backend::Hypervisor) on top of Apple's
//! Virtualization.framework for macOS guests on Apple Silicon.
//!
//! ## Architecture
//!
//! - **Platform**: `VZMacPlatformConfiguration` from the bundle's hardware
//!   model, machine identifier and auxiliary storage
//! - **Boot**: `VZMacOSBootLoader`
//! - **Devices**: Mac graphics, virtio block, NAT virtio-net, USB pointing and
//!   keyboard, virtio sound
//! - **Queue**: the VM is created on the main queue, so every call into it
//!   happens on the main thread
//! - **Lifecycle**: a `VZVirtualMachineDelegate` forwards stop events into a
//!   [`StopNotifier`](crate::lifecycle::StopNotifier)

mod backend;
pub mod config;
mod delegate;
mod display;

pub use backend::{VzHypervisor, VzMachine};
pub use display::VmView;
