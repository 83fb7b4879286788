//! Bootstrap sequence: configuration → running VM.
//!
//! [`Bootstrapper::launch`] validates a [`MachineConfig`], constructs the VM,
//! attaches the lifecycle observer, binds the display surface and finally
//! issues the asynchronous start. The steps never branch beyond validation.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::backend::{Hypervisor, VirtualMachine};
use crate::config::MachineConfig;
use crate::display::DisplaySurface;
use crate::lifecycle::{self, LifecycleObserver, StartHandle};
use crate::{Error, Result};

/// Launches at most one virtual machine.
///
/// The application owns a single `Bootstrapper`; a second [`launch`] on it is
/// rejected with [`Error::AlreadyBootstrapped`], even when the first attempt
/// failed.
///
/// [`launch`]: Bootstrapper::launch
#[derive(Debug, Default)]
pub struct Bootstrapper {
    launched: AtomicBool,
}

/// A started (or starting) VM.
#[derive(Debug)]
pub struct Launch<M> {
    machine: M,
    started: StartHandle,
    observer: LifecycleObserver,
}

impl<M> Launch<M> {
    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Split into the machine, the start completion handle and the observer.
    pub fn into_parts(self) -> (M, StartHandle, LifecycleObserver) {
        (self.machine, self.started, self.observer)
    }
}

impl Bootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`Bootstrapper::launch`] has been called.
    pub fn has_launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }

    /// Validate `config`, build the VM and request its start.
    ///
    /// The observer is attached before `start` is issued, so no stop event
    /// can be missed. The returned [`Launch`] carries the start handle; the
    /// start itself may still be in flight.
    pub fn launch<H, D>(
        &self,
        hypervisor: &H,
        config: MachineConfig,
        display: &mut D,
    ) -> Result<Launch<H::Machine>>
    where
        H: Hypervisor,
        D: DisplaySurface<H::Machine>,
    {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyBootstrapped);
        }

        info!(
            "Creating virtual machine (backend={}, cpus={}, memory={}MB)",
            hypervisor.name(),
            config.cpu_count(),
            config.memory_size() / (1024 * 1024)
        );

        check(hypervisor, &config)?;
        debug!("Configuration validated");

        let mut machine = hypervisor.create_machine(config)?;

        let (notifier, observer) = lifecycle::channel();
        machine.attach_observer(notifier);

        display.bind(&machine)?;

        let (completion, started) = lifecycle::start_channel();
        machine.start(completion);
        debug!("Start requested");

        Ok(Launch {
            machine,
            started,
            observer,
        })
    }
}

/// Run the local and the framework validation passes without constructing
/// anything.
pub fn check<H: Hypervisor>(hypervisor: &H, config: &MachineConfig) -> Result<()> {
    config.validate(&hypervisor.host_limits())?;
    hypervisor.validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Call, MockDisplay, MockHypervisor};
    use crate::devices::StorageDevice;
    use crate::platform::{AuxiliaryStorage, HardwareModel, MachineIdentifier, PlatformConfig};

    fn config() -> MachineConfig {
        MachineConfig::builder(PlatformConfig {
            hardware_model: HardwareModel::new(vec![1], true),
            machine_identifier: MachineIdentifier::new(vec![2]),
            auxiliary_storage: AuxiliaryStorage::new("/tmp/AuxiliaryStorage"),
        })
        .cpu_count(2)
        .standard_devices(StorageDevice::disk_image("/tmp/Disk.img"))
        .build()
    }

    #[test]
    fn sequence_order() {
        let hv = MockHypervisor::new();
        let mut display = MockDisplay::new();
        Bootstrapper::new()
            .launch(&hv, config(), &mut display)
            .unwrap();
        assert_eq!(
            hv.calls(),
            vec![
                Call::Validate,
                Call::CreateMachine,
                Call::AttachObserver,
                Call::BindDisplay,
                Call::Start
            ]
        );
    }

    #[test]
    fn local_validation_runs_before_framework_validation() {
        let hv = MockHypervisor::new();
        let bad = MachineConfig::builder(config().platform().clone())
            .cpu_count(2)
            .build();
        let err = Bootstrapper::new()
            .launch(&hv, bad, &mut MockDisplay::new())
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
        assert!(hv.calls().is_empty());
    }

    #[test]
    fn check_constructs_nothing() {
        let hv = MockHypervisor::new();
        check(&hv, &config()).unwrap();
        assert_eq!(hv.calls(), vec![Call::Validate]);
    }

    #[test]
    fn framework_rejection_prevents_construction() {
        let hv = MockHypervisor::new().reject_config("unsupported device combination");
        let err = Bootstrapper::new()
            .launch(&hv, config(), &mut MockDisplay::new())
            .unwrap_err();
        assert!(err.to_string().contains("unsupported device combination"));
        assert_eq!(hv.machines_created(), 0);
    }

    #[test]
    fn second_launch_is_rejected() {
        let hv = MockHypervisor::new();
        let boot = Bootstrapper::new();
        boot.launch(&hv, config(), &mut MockDisplay::new()).unwrap();
        assert!(boot.has_launched());

        let err = boot
            .launch(&hv, config(), &mut MockDisplay::new())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyBootstrapped));
        assert_eq!(hv.machines_created(), 1);
    }

    #[test]
    fn failed_first_launch_still_consumes_the_bootstrapper() {
        let boot = Bootstrapper::new();
        let rejecting = MockHypervisor::new().reject_config("nope");
        assert!(boot
            .launch(&rejecting, config(), &mut MockDisplay::new())
            .is_err());

        let hv = MockHypervisor::new();
        assert!(matches!(
            boot.launch(&hv, config(), &mut MockDisplay::new()),
            Err(Error::AlreadyBootstrapped)
        ));
    }
}
