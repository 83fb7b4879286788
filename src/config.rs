//! Machine configuration
//!
//! [`MachineConfig`] is assembled once with [`MachineConfigBuilder`] and is
//! read-only afterwards. [`from_bundle`] is the usual entry point: it loads
//! the bundle artifacts through a [`Hypervisor`] and sizes the machine with a
//! [`SizingPolicy`].

use tracing::{debug, info};

use crate::backend::{HostLimits, Hypervisor};
use crate::bundle::VmBundle;
use crate::devices::{
    AudioDevice, DisplayConfig, GraphicsDevice, KeyboardDevice, NetworkDevice, PointingDevice,
    StorageDevice,
};
use crate::error::ArtifactKind;
use crate::platform::{self, PlatformConfig};
use crate::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Default guest memory (4 GiB)
pub const DEFAULT_MEMORY_BYTES: u64 = 4 * 1024 * MIB;

/// Boot loader of the guest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BootLoader {
    /// macOS boot loader
    #[default]
    MacOs,
}

/// How many CPUs to give the guest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CpuCount {
    /// All host processors but one
    #[default]
    Auto,
    /// A fixed number, still clamped to the host limits
    Fixed(usize),
}

/// CPU and memory sizing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingPolicy {
    pub cpus: CpuCount,
    /// Requested memory in bytes
    pub memory_bytes: u64,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            cpus: CpuCount::Auto,
            memory_bytes: DEFAULT_MEMORY_BYTES,
        }
    }
}

impl SizingPolicy {
    /// Set a fixed CPU count
    pub fn cpus(mut self, count: usize) -> Self {
        self.cpus = CpuCount::Fixed(count);
        self
    }

    /// Set the memory size in megabytes
    pub fn memory_mb(mut self, mb: u64) -> Self {
        self.memory_bytes = mb.saturating_mul(MIB);
        self
    }

    /// CPU count clamped to `limits`
    pub fn cpu_count(&self, limits: &HostLimits) -> usize {
        let wanted = match self.cpus {
            CpuCount::Auto if limits.host_cpus <= 1 => 1,
            CpuCount::Auto => limits.host_cpus - 1,
            CpuCount::Fixed(n) => n,
        };
        wanted.max(limits.min_cpus).min(limits.max_cpus)
    }

    /// Memory size clamped to `limits`, rounded down to a whole MiB
    pub fn memory_size(&self, limits: &HostLimits) -> u64 {
        let clamped = self
            .memory_bytes
            .max(limits.min_memory)
            .min(limits.max_memory);
        clamped - clamped % MIB
    }
}

/// Complete description of the guest machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    platform: PlatformConfig,
    boot_loader: BootLoader,
    cpu_count: usize,
    memory_size: u64,
    graphics_devices: Vec<GraphicsDevice>,
    storage_devices: Vec<StorageDevice>,
    network_devices: Vec<NetworkDevice>,
    pointing_devices: Vec<PointingDevice>,
    keyboards: Vec<KeyboardDevice>,
    audio_devices: Vec<AudioDevice>,
}

impl MachineConfig {
    /// Start a builder with no devices, one CPU and the default memory size.
    pub fn builder(platform: PlatformConfig) -> MachineConfigBuilder {
        MachineConfigBuilder::new(platform)
    }

    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    pub fn boot_loader(&self) -> BootLoader {
        self.boot_loader
    }

    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// Memory size in bytes
    pub fn memory_size(&self) -> u64 {
        self.memory_size
    }

    pub fn graphics_devices(&self) -> &[GraphicsDevice] {
        &self.graphics_devices
    }

    pub fn storage_devices(&self) -> &[StorageDevice] {
        &self.storage_devices
    }

    pub fn network_devices(&self) -> &[NetworkDevice] {
        &self.network_devices
    }

    pub fn pointing_devices(&self) -> &[PointingDevice] {
        &self.pointing_devices
    }

    pub fn keyboards(&self) -> &[KeyboardDevice] {
        &self.keyboards
    }

    pub fn audio_devices(&self) -> &[AudioDevice] {
        &self.audio_devices
    }

    /// Validate the configuration against `limits`.
    ///
    /// Exactly one device per category is supported.
    pub fn validate(&self, limits: &HostLimits) -> Result<()> {
        if self.cpu_count < limits.min_cpus || self.cpu_count > limits.max_cpus {
            return Err(Error::ValidationFailed(format!(
                "CPU count {} outside allowed range {}..={}",
                self.cpu_count, limits.min_cpus, limits.max_cpus
            )));
        }

        if self.memory_size < limits.min_memory || self.memory_size > limits.max_memory {
            return Err(Error::ValidationFailed(format!(
                "Memory size {} bytes outside allowed range {}..={}",
                self.memory_size, limits.min_memory, limits.max_memory
            )));
        }
        if self.memory_size % MIB != 0 {
            return Err(Error::ValidationFailed(
                "Memory size must be a multiple of 1 MiB".into(),
            ));
        }

        exactly_one("graphics", self.graphics_devices.len())?;
        exactly_one("storage", self.storage_devices.len())?;
        exactly_one("network", self.network_devices.len())?;
        exactly_one("pointing", self.pointing_devices.len())?;
        exactly_one("keyboard", self.keyboards.len())?;
        exactly_one("audio", self.audio_devices.len())?;

        for graphics in &self.graphics_devices {
            if graphics.displays.is_empty() {
                return Err(Error::ValidationFailed(
                    "Graphics device has no display".into(),
                ));
            }
            let zero_sized = |d: &DisplayConfig| {
                d.width_in_pixels == 0 || d.height_in_pixels == 0 || d.pixels_per_inch == 0
            };
            if graphics.displays.iter().any(zero_sized) {
                return Err(Error::ValidationFailed(
                    "Display dimensions must be non-zero".into(),
                ));
            }
        }

        for audio in &self.audio_devices {
            if !audio.host_input && !audio.host_output {
                return Err(Error::ValidationFailed(
                    "Audio device has no streams".into(),
                ));
            }
        }

        Ok(())
    }
}

fn exactly_one(category: &str, count: usize) -> Result<()> {
    if count == 1 {
        Ok(())
    } else {
        Err(Error::ValidationFailed(format!(
            "Expected exactly one {} device, found {}",
            category, count
        )))
    }
}

/// Builder for [`MachineConfig`]
#[derive(Debug, Clone)]
pub struct MachineConfigBuilder {
    config: MachineConfig,
}

impl MachineConfigBuilder {
    fn new(platform: PlatformConfig) -> Self {
        Self {
            config: MachineConfig {
                platform,
                boot_loader: BootLoader::MacOs,
                cpu_count: 1,
                memory_size: DEFAULT_MEMORY_BYTES,
                graphics_devices: Vec::new(),
                storage_devices: Vec::new(),
                network_devices: Vec::new(),
                pointing_devices: Vec::new(),
                keyboards: Vec::new(),
                audio_devices: Vec::new(),
            },
        }
    }

    /// Set the number of CPUs
    pub fn cpu_count(mut self, count: usize) -> Self {
        self.config.cpu_count = count;
        self
    }

    /// Set the memory size in bytes
    pub fn memory_size(mut self, bytes: u64) -> Self {
        self.config.memory_size = bytes;
        self
    }

    /// Apply `policy` against `limits`
    pub fn sized(self, policy: &SizingPolicy, limits: &HostLimits) -> Self {
        self.cpu_count(policy.cpu_count(limits))
            .memory_size(policy.memory_size(limits))
    }

    pub fn graphics(mut self, device: GraphicsDevice) -> Self {
        self.config.graphics_devices.push(device);
        self
    }

    pub fn storage(mut self, device: StorageDevice) -> Self {
        self.config.storage_devices.push(device);
        self
    }

    pub fn network(mut self, device: NetworkDevice) -> Self {
        self.config.network_devices.push(device);
        self
    }

    pub fn pointing(mut self, device: PointingDevice) -> Self {
        self.config.pointing_devices.push(device);
        self
    }

    pub fn keyboard(mut self, device: KeyboardDevice) -> Self {
        self.config.keyboards.push(device);
        self
    }

    pub fn audio(mut self, device: AudioDevice) -> Self {
        self.config.audio_devices.push(device);
        self
    }

    /// Add the standard Mac device set: one of each category, with the disk
    /// image at `disk` as the boot volume.
    pub fn standard_devices(self, disk: StorageDevice) -> Self {
        self.graphics(GraphicsDevice::default())
            .storage(disk)
            .network(NetworkDevice::Nat)
            .pointing(PointingDevice::UsbScreenCoordinate)
            .keyboard(KeyboardDevice::Usb)
            .audio(AudioDevice::default())
    }

    pub fn build(self) -> MachineConfig {
        self.config
    }
}

/// Load the bundle artifacts and assemble the full machine configuration.
///
/// Nothing is constructed unless every artifact is present and decodes.
pub fn from_bundle<H: Hypervisor>(
    hypervisor: &H,
    bundle: &VmBundle,
    sizing: &SizingPolicy,
) -> Result<MachineConfig> {
    info!("Loading virtual machine bundle at {}", bundle.root().display());

    let platform = platform::load_platform(hypervisor, bundle)?;

    let disk = bundle.disk_image();
    platform::require_file(ArtifactKind::DiskImage, &disk)?;

    let limits = hypervisor.host_limits();
    let config = MachineConfig::builder(platform)
        .sized(sizing, &limits)
        .standard_devices(StorageDevice::disk_image(disk))
        .build();

    debug!(
        "Machine configuration: cpus={}, memory={}MB, backend={}",
        config.cpu_count(),
        config.memory_size() / MIB,
        hypervisor.name()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{AuxiliaryStorage, HardwareModel, MachineIdentifier};

    fn limits() -> HostLimits {
        HostLimits {
            host_cpus: 8,
            min_cpus: 1,
            max_cpus: 6,
            min_memory: 2 * 1024 * MIB,
            max_memory: 16 * 1024 * MIB,
        }
    }

    fn platform() -> PlatformConfig {
        PlatformConfig {
            hardware_model: HardwareModel::new(vec![1], true),
            machine_identifier: MachineIdentifier::new(vec![2]),
            auxiliary_storage: AuxiliaryStorage::new("/tmp/VM.bundle/AuxiliaryStorage"),
        }
    }

    fn standard() -> MachineConfig {
        MachineConfig::builder(platform())
            .cpu_count(4)
            .standard_devices(StorageDevice::disk_image("/tmp/Disk.img"))
            .build()
    }

    #[test]
    fn auto_cpu_leaves_one_for_host() {
        assert_eq!(SizingPolicy::default().cpu_count(&limits()), 6);
        let small = HostLimits {
            host_cpus: 4,
            ..limits()
        };
        assert_eq!(SizingPolicy::default().cpu_count(&small), 3);
    }

    #[test]
    fn auto_cpu_on_single_core_host() {
        let single = HostLimits {
            host_cpus: 1,
            min_cpus: 1,
            max_cpus: 1,
            ..limits()
        };
        assert_eq!(SizingPolicy::default().cpu_count(&single), 1);
    }

    #[test]
    fn fixed_cpu_is_clamped() {
        assert_eq!(SizingPolicy::default().cpus(64).cpu_count(&limits()), 6);
        assert_eq!(SizingPolicy::default().cpus(0).cpu_count(&limits()), 1);
        assert_eq!(SizingPolicy::default().cpus(2).cpu_count(&limits()), 2);
    }

    #[test]
    fn memory_is_clamped_and_rounded() {
        assert_eq!(
            SizingPolicy::default().memory_size(&limits()),
            DEFAULT_MEMORY_BYTES
        );
        assert_eq!(
            SizingPolicy::default().memory_mb(512).memory_size(&limits()),
            2 * 1024 * MIB
        );
        assert_eq!(
            SizingPolicy::default().memory_mb(1 << 20).memory_size(&limits()),
            16 * 1024 * MIB
        );

        let odd = SizingPolicy {
            cpus: CpuCount::Auto,
            memory_bytes: 3 * 1024 * MIB + 12345,
        };
        assert_eq!(odd.memory_size(&limits()), 3 * 1024 * MIB);
    }

    #[test]
    fn standard_config_validates() {
        let config = standard();
        assert!(config.validate(&limits()).is_ok());
        assert_eq!(config.boot_loader(), BootLoader::MacOs);
        assert_eq!(config.graphics_devices().len(), 1);
        assert_eq!(config.storage_devices().len(), 1);
        assert_eq!(config.network_devices(), &[NetworkDevice::Nat]);
        assert_eq!(config.pointing_devices().len(), 1);
        assert_eq!(config.keyboards().len(), 1);
        assert_eq!(config.audio_devices().len(), 1);
    }

    #[test]
    fn second_device_in_category_is_rejected() {
        let config = MachineConfig::builder(platform())
            .cpu_count(2)
            .standard_devices(StorageDevice::disk_image("/tmp/Disk.img"))
            .keyboard(KeyboardDevice::Usb)
            .build();
        let err = config.validate(&limits()).unwrap_err();
        assert!(err.to_string().contains("keyboard"));
    }

    #[test]
    fn missing_device_is_rejected() {
        let config = MachineConfig::builder(platform())
            .cpu_count(2)
            .graphics(GraphicsDevice::default())
            .build();
        assert!(matches!(
            config.validate(&limits()),
            Err(Error::ValidationFailed(_))
        ));
    }

    #[test]
    fn out_of_range_resources_are_rejected() {
        let too_many = MachineConfig::builder(platform())
            .cpu_count(7)
            .standard_devices(StorageDevice::disk_image("/tmp/Disk.img"))
            .build();
        assert!(too_many.validate(&limits()).is_err());

        let unaligned = MachineConfig::builder(platform())
            .cpu_count(2)
            .memory_size(3 * 1024 * MIB + 1)
            .standard_devices(StorageDevice::disk_image("/tmp/Disk.img"))
            .build();
        assert!(unaligned.validate(&limits()).is_err());
    }

    #[test]
    fn silent_audio_device_is_rejected() {
        let config = MachineConfig::builder(platform())
            .cpu_count(2)
            .graphics(GraphicsDevice::default())
            .storage(StorageDevice::disk_image("/tmp/Disk.img"))
            .network(NetworkDevice::Nat)
            .pointing(PointingDevice::UsbScreenCoordinate)
            .keyboard(KeyboardDevice::Usb)
            .audio(AudioDevice {
                host_input: false,
                host_output: false,
            })
            .build();
        assert!(config.validate(&limits()).is_err());
    }
}
