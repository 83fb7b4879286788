//! VzHypervisor: [`Hypervisor`] implementation using Apple's Virtualization.framework.
//!
//! ## Lifecycle
//!
//! 1. `validate()`: builds and validates a `VZVirtualMachineConfiguration`,
//!    kept for the next step
//! 2. `create_machine()`: a `VZVirtualMachine` bound to the main queue
//! 3. `attach_observer()`: installs the stop delegate
//! 4. `start()`: `startWithCompletionHandler:`, resolving a
//!    [`StartCompletion`] from the main queue
//!
//! Every method must be called on the main thread; [`VzHypervisor::new`]
//! takes a `MainThreadMarker` to enforce that.

use block2::RcBlock;
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2::{AnyThread, MainThreadMarker};
use objc2_foundation::NSError;
use objc2_virtualization::{VZVirtualMachine, VZVirtualMachineConfiguration};
use tracing::{debug, info};

use super::config;
use super::delegate::VirtualMachineDelegate;
use crate::backend::{HostLimits, Hypervisor, ValidatedSlot, VirtualMachine};
use crate::config::MachineConfig;
use crate::lifecycle::{StartCompletion, StopNotifier};
use crate::platform::{HardwareModel, MachineIdentifier};
use crate::{Error, Result};

/// Virtualization.framework on the current host.
pub struct VzHypervisor {
    mtm: MainThreadMarker,
    validated: ValidatedSlot<Retained<VZVirtualMachineConfiguration>>,
}

impl VzHypervisor {
    pub fn new(mtm: MainThreadMarker) -> Self {
        Self {
            mtm,
            validated: ValidatedSlot::default(),
        }
    }
}

impl Hypervisor for VzHypervisor {
    type Machine = VzMachine;

    fn name(&self) -> &'static str {
        "virtualization-framework"
    }

    fn host_limits(&self) -> HostLimits {
        config::host_limits()
    }

    fn decode_hardware_model(&self, data: &[u8]) -> std::result::Result<HardwareModel, String> {
        let model = config::decode_hardware_model(data)
            .ok_or_else(|| "Failed to create hardware model.".to_string())?;
        let supported = unsafe { model.isSupported() };
        Ok(HardwareModel::new(data.to_vec(), supported))
    }

    fn decode_machine_identifier(
        &self,
        data: &[u8],
    ) -> std::result::Result<MachineIdentifier, String> {
        config::decode_machine_identifier(data)
            .map(|_| MachineIdentifier::new(data.to_vec()))
            .ok_or_else(|| "Failed to create machine identifier.".to_string())
    }

    fn validate(&self, machine: &MachineConfig) -> Result<()> {
        let vm_config = config::build(machine)?;
        config::validate(&vm_config)?;
        self.validated.store(machine, vm_config);
        Ok(())
    }

    fn create_machine(&self, machine: MachineConfig) -> Result<VzMachine> {
        let vm_config = match self.validated.take(&machine) {
            Some(vm_config) => vm_config,
            None => {
                let vm_config = config::build(&machine)?;
                config::validate(&vm_config)?;
                vm_config
            }
        };

        // Created without an explicit queue: the VM belongs to the main queue.
        let vm = unsafe {
            VZVirtualMachine::initWithConfiguration(VZVirtualMachine::alloc(), &vm_config)
        };
        info!("VzHypervisor: virtual machine created");

        Ok(VzMachine {
            vm,
            delegate: None,
            mtm: self.mtm,
        })
    }
}

/// A `VZVirtualMachine` owned by the application.
///
/// The VM holds its delegate weakly, so the delegate is kept alive here.
pub struct VzMachine {
    vm: Retained<VZVirtualMachine>,
    delegate: Option<Retained<VirtualMachineDelegate>>,
    mtm: MainThreadMarker,
}

impl VzMachine {
    /// The underlying framework object.
    pub fn raw(&self) -> &VZVirtualMachine {
        &self.vm
    }
}

impl VirtualMachine for VzMachine {
    fn attach_observer(&mut self, notifier: StopNotifier) {
        let delegate = VirtualMachineDelegate::new(self.mtm, notifier);
        unsafe {
            self.vm
                .setDelegate(Some(ProtocolObject::from_ref(&*delegate)));
        }
        self.delegate = Some(delegate);
        debug!("VzMachine: delegate attached");
    }

    fn start(&self, completion: StartCompletion) {
        let handler = RcBlock::new(move |err: *mut NSError| {
            let result = if err.is_null() {
                Ok(())
            } else {
                let desc = unsafe { &*err }.localizedDescription().to_string();
                Err(Error::StartFailed(desc))
            };
            completion.complete(result);
        });
        unsafe {
            self.vm.startWithCompletionHandler(&handler);
        }
    }
}

impl Drop for VzMachine {
    fn drop(&mut self) {
        // Clear the delegate before it is released so the VM never calls a
        // dangling object during teardown.
        unsafe { self.vm.setDelegate(None) };
    }
}
