//! Hypervisor abstraction.
//!
//! This module defines the seam between macvm and the framework that actually
//! runs the guest. A [`Hypervisor`] decodes identity artifacts, validates a
//! [`MachineConfig`](crate::config::MachineConfig) and constructs a
//! [`VirtualMachine`]; the machine accepts a lifecycle observer and a start
//! request.
//!
//! Backends:
//! - **macOS**: `VzHypervisor`, Apple Virtualization.framework
//! - **any host**: [`MockHypervisor`](mock::MockHypervisor), in-process,
//!   records every call for tests

pub mod mock;

#[cfg(target_os = "macos")]
pub mod vz;

use std::cell::RefCell;

use crate::config::MachineConfig;
use crate::error::Result;
use crate::lifecycle::{StartCompletion, StopNotifier};
use crate::platform::{HardwareModel, MachineIdentifier};

/// Resource bounds reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLimits {
    /// Logical processors on the host.
    pub host_cpus: usize,
    /// Smallest CPU count the hypervisor accepts.
    pub min_cpus: usize,
    /// Largest CPU count the hypervisor accepts.
    pub max_cpus: usize,
    /// Smallest memory size in bytes.
    pub min_memory: u64,
    /// Largest memory size in bytes.
    pub max_memory: u64,
}

/// Backend configuration built by a successful [`Hypervisor::validate`].
///
/// Holds at most one entry. [`ValidatedSlot::take`] hands it back only for
/// the same [`MachineConfig`], so `create_machine` can skip a second build.
#[derive(Debug, Clone)]
pub struct ValidatedSlot<T> {
    slot: RefCell<Option<(MachineConfig, T)>>,
}

impl<T> Default for ValidatedSlot<T> {
    fn default() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }
}

impl<T> ValidatedSlot<T> {
    /// Remember `built` as the validated form of `config`.
    pub fn store(&self, config: &MachineConfig, built: T) {
        *self.slot.borrow_mut() = Some((config.clone(), built));
    }

    /// Take the entry if it was validated from `config`. Always empties the slot.
    pub fn take(&self, config: &MachineConfig) -> Option<T> {
        let (validated, built) = self.slot.borrow_mut().take()?;
        (validated == *config).then_some(built)
    }
}

/// Host framework boundary.
///
/// Implementations own everything the guest needs at runtime; macvm only
/// hands them a validated configuration.
pub trait Hypervisor {
    /// The running guest type produced by [`Hypervisor::create_machine`].
    type Machine: VirtualMachine;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// CPU and memory bounds for configurations on this host.
    fn host_limits(&self) -> HostLimits;

    /// Decode a hardware model data representation.
    ///
    /// Returns a reason string on malformed data. Host support is recorded on
    /// the returned value rather than reported as an error.
    fn decode_hardware_model(&self, data: &[u8]) -> std::result::Result<HardwareModel, String>;

    /// Decode a machine identifier data representation.
    fn decode_machine_identifier(
        &self,
        data: &[u8],
    ) -> std::result::Result<MachineIdentifier, String>;

    /// Framework-side validation of a configuration.
    ///
    /// A successful call may keep the built framework configuration for a
    /// following [`Hypervisor::create_machine`] with the same config.
    fn validate(&self, config: &MachineConfig) -> Result<()>;

    /// Construct the VM. The configuration is consumed and never changes
    /// afterwards. Validates first unless `config` was just validated.
    fn create_machine(&self, config: MachineConfig) -> Result<Self::Machine>;
}

/// A constructed guest.
pub trait VirtualMachine {
    /// Register the stop-event sink. Must happen before [`VirtualMachine::start`].
    fn attach_observer(&mut self, notifier: StopNotifier);

    /// Request an asynchronous start.
    ///
    /// Returns immediately; `completion` is resolved once, possibly on
    /// another thread. There is no way to cancel a start once issued.
    fn start(&self, completion: StartCompletion);
}
