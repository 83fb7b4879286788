//! In-process hypervisor.
//!
//! [`MockHypervisor`] stands in for the host framework on machines where it
//! is unavailable and in tests. It records every call it receives in a shared
//! [`CallLog`], so callers can assert on ordering.
//!
//! Identity artifacts use small JSON documents instead of the framework's
//! opaque data representations; see [`hardware_model_bytes`] and
//! [`machine_identifier_bytes`].

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{HostLimits, Hypervisor, ValidatedSlot, VirtualMachine};
use crate::config::MachineConfig;
use crate::display::DisplaySurface;
use crate::lifecycle::{StartCompletion, StopEvent, StopNotifier};
use crate::platform::{HardwareModel, MachineIdentifier};
use crate::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Platform version accepted by a default [`MockHypervisor`].
pub const DEFAULT_PLATFORM_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HardwareModelRepr {
    data_representation_version: u32,
    platform_version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct MachineIdentifierRepr {
    #[serde(rename = "ECID")]
    ecid: u64,
}

/// Encode a hardware model the mock hypervisor can decode.
pub fn hardware_model_bytes(platform_version: u32) -> Vec<u8> {
    serde_json::to_vec(&HardwareModelRepr {
        data_representation_version: 1,
        platform_version,
    })
    .unwrap_or_default()
}

/// Encode a machine identifier the mock hypervisor can decode.
pub fn machine_identifier_bytes(ecid: u64) -> Vec<u8> {
    serde_json::to_vec(&MachineIdentifierRepr { ecid }).unwrap_or_default()
}

/// Framework operations observed by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Validate,
    CreateMachine,
    AttachObserver,
    BindDisplay,
    Start,
}

/// Shared, ordered record of [`Call`]s.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn record(&self, call: Call) {
        debug!("mock hypervisor: {:?}", call);
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }

    /// Snapshot of the calls so far.
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// How many times `call` was recorded.
    pub fn count(&self, call: Call) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

/// What a mock machine reports when started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartBehavior {
    Succeed,
    Fail(String),
}

/// Recording hypervisor.
#[derive(Debug, Clone)]
pub struct MockHypervisor {
    limits: HostLimits,
    supported_platforms: Vec<u32>,
    rejection: Option<String>,
    start: StartBehavior,
    validated: ValidatedSlot<()>,
    log: CallLog,
}

impl Default for MockHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHypervisor {
    /// An eight-core host accepting platform version 2 whose machines start
    /// successfully.
    pub fn new() -> Self {
        Self {
            limits: HostLimits {
                host_cpus: 8,
                min_cpus: 1,
                max_cpus: 8,
                min_memory: 128 * MIB,
                max_memory: 32 * 1024 * MIB,
            },
            supported_platforms: vec![DEFAULT_PLATFORM_VERSION],
            rejection: None,
            start: StartBehavior::Succeed,
            validated: ValidatedSlot::default(),
            log: CallLog::default(),
        }
    }

    pub fn limits(mut self, limits: HostLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Platform versions this host can run
    pub fn supported_platforms(mut self, versions: Vec<u32>) -> Self {
        self.supported_platforms = versions;
        self
    }

    /// Make framework validation fail with `reason`
    pub fn reject_config<S: Into<String>>(mut self, reason: S) -> Self {
        self.rejection = Some(reason.into());
        self
    }

    /// Make every start request fail with `reason`
    pub fn fail_start<S: Into<String>>(mut self, reason: S) -> Self {
        self.start = StartBehavior::Fail(reason.into());
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.calls()
    }

    /// Number of machines constructed
    pub fn machines_created(&self) -> usize {
        self.log.count(Call::CreateMachine)
    }
}

impl MockHypervisor {
    fn framework_check(&self) -> Result<()> {
        self.log.record(Call::Validate);
        match &self.rejection {
            Some(reason) => Err(Error::ValidationFailed(reason.clone())),
            None => Ok(()),
        }
    }
}

impl Hypervisor for MockHypervisor {
    type Machine = MockMachine;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn host_limits(&self) -> HostLimits {
        self.limits
    }

    fn decode_hardware_model(&self, data: &[u8]) -> std::result::Result<HardwareModel, String> {
        let repr: HardwareModelRepr = serde_json::from_slice(data)
            .map_err(|e| format!("Failed to create hardware model: {}", e))?;
        let supported = self.supported_platforms.contains(&repr.platform_version);
        Ok(HardwareModel::new(data.to_vec(), supported))
    }

    fn decode_machine_identifier(
        &self,
        data: &[u8],
    ) -> std::result::Result<MachineIdentifier, String> {
        let repr: MachineIdentifierRepr = serde_json::from_slice(data)
            .map_err(|e| format!("Failed to create machine identifier: {}", e))?;
        if repr.ecid == 0 {
            return Err("Failed to create machine identifier: zero ECID".into());
        }
        Ok(MachineIdentifier::new(data.to_vec()))
    }

    fn validate(&self, config: &MachineConfig) -> Result<()> {
        self.framework_check()?;
        self.validated.store(config, ());
        Ok(())
    }

    fn create_machine(&self, config: MachineConfig) -> Result<MockMachine> {
        if self.validated.take(&config).is_none() {
            self.framework_check()?;
        }
        self.log.record(Call::CreateMachine);
        Ok(MockMachine {
            config,
            notifier: None,
            start: self.start.clone(),
            log: self.log.clone(),
        })
    }
}

/// Machine produced by [`MockHypervisor`].
#[derive(Debug)]
pub struct MockMachine {
    config: MachineConfig,
    notifier: Option<StopNotifier>,
    start: StartBehavior,
    log: CallLog,
}

impl MockMachine {
    /// The configuration the machine was constructed with
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Simulate the guest shutting down. Returns whether the event was
    /// delivered to an observer.
    pub fn guest_stop(&self) -> bool {
        self.emit(StopEvent::GuestStopped)
    }

    /// Simulate the VM stopping with an error.
    pub fn stop_with_error<S: Into<String>>(&self, message: S) -> bool {
        self.emit(StopEvent::Error(message.into()))
    }

    fn emit(&self, event: StopEvent) -> bool {
        match &self.notifier {
            Some(notifier) => notifier.notify(event),
            None => false,
        }
    }
}

impl VirtualMachine for MockMachine {
    fn attach_observer(&mut self, notifier: StopNotifier) {
        self.log.record(Call::AttachObserver);
        self.notifier = Some(notifier);
    }

    fn start(&self, completion: StartCompletion) {
        self.log.record(Call::Start);
        let result = match &self.start {
            StartBehavior::Succeed => Ok(()),
            StartBehavior::Fail(reason) => Err(Error::StartFailed(reason.clone())),
        };
        completion.complete(result);
    }
}

/// Display surface that records its binding in the machine's call log.
#[derive(Debug, Default)]
pub struct MockDisplay {
    bound: bool,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySurface<MockMachine> for MockDisplay {
    fn bind(&mut self, machine: &MockMachine) -> Result<()> {
        machine.log.record(Call::BindDisplay);
        self.bound = true;
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::StorageDevice;
    use crate::platform::{AuxiliaryStorage, PlatformConfig};

    #[test]
    fn decodes_supported_hardware_model() {
        let hv = MockHypervisor::new();
        let model = hv.decode_hardware_model(&hardware_model_bytes(2)).unwrap();
        assert!(model.is_supported());

        let model = hv.decode_hardware_model(&hardware_model_bytes(3)).unwrap();
        assert!(!model.is_supported());
    }

    #[test]
    fn rejects_corrupt_identifier() {
        let hv = MockHypervisor::new();
        assert!(hv.decode_machine_identifier(b"\xde\xad\xbe\xef").is_err());
        assert!(hv.decode_machine_identifier(&machine_identifier_bytes(0)).is_err());
        assert!(hv
            .decode_machine_identifier(&machine_identifier_bytes(7))
            .is_ok());
    }

    #[test]
    fn create_machine_validates_unless_just_validated() {
        let config = MachineConfig::builder(PlatformConfig {
            hardware_model: HardwareModel::new(hardware_model_bytes(2), true),
            machine_identifier: MachineIdentifier::new(machine_identifier_bytes(7)),
            auxiliary_storage: AuxiliaryStorage::new("/tmp/AuxiliaryStorage"),
        })
        .cpu_count(2)
        .standard_devices(StorageDevice::disk_image("/tmp/Disk.img"))
        .build();

        let hv = MockHypervisor::new();
        hv.validate(&config).unwrap();
        hv.create_machine(config.clone()).unwrap();
        assert_eq!(hv.calls(), vec![Call::Validate, Call::CreateMachine]);

        let rejecting = MockHypervisor::new().reject_config("no audio");
        assert!(rejecting.create_machine(config).is_err());
        assert_eq!(rejecting.calls(), vec![Call::Validate]);
    }

    #[test]
    fn call_log_is_shared_with_clones() {
        let hv = MockHypervisor::new();
        let copy = hv.clone();
        copy.log().record(Call::Validate);
        assert_eq!(hv.calls(), vec![Call::Validate]);
    }
}
