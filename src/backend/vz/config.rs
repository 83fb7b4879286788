//! Configuration mapping from [`MachineConfig`] to VZ types.
//!
//! Translates macvm's device descriptors into the Virtualization.framework
//! objects needed to boot a Mac guest.

use objc2::rc::Retained;
use objc2::AnyThread;
use objc2_foundation::{NSArray, NSData, NSProcessInfo, NSString, NSURL};
use objc2_virtualization::*;

use crate::backend::HostLimits;
use crate::config::{BootLoader, MachineConfig};
use crate::devices::{
    AudioDevice, DisplayConfig, GraphicsDevice, KeyboardDevice, NetworkDevice, PointingDevice,
    StorageDevice,
};
use crate::platform::{HardwareModel, MachineIdentifier, PlatformConfig};
use crate::{Error, Result};

fn file_url(path: &std::path::Path) -> Result<Retained<NSURL>> {
    let path = path
        .to_str()
        .ok_or_else(|| Error::Config(format!("Path is not UTF-8: {}", path.display())))?;
    Ok(NSURL::fileURLWithPath(&NSString::from_str(path)))
}

/// Bounds reported by Virtualization.framework and the host.
pub fn host_limits() -> HostLimits {
    let host_cpus = NSProcessInfo::processInfo().processorCount();
    unsafe {
        HostLimits {
            host_cpus,
            min_cpus: VZVirtualMachineConfiguration::minimumAllowedCPUCount(),
            max_cpus: VZVirtualMachineConfiguration::maximumAllowedCPUCount(),
            min_memory: VZVirtualMachineConfiguration::minimumAllowedMemorySize(),
            max_memory: VZVirtualMachineConfiguration::maximumAllowedMemorySize(),
        }
    }
}

/// Decode a hardware model data representation.
pub fn decode_hardware_model(data: &[u8]) -> Option<Retained<VZMacHardwareModel>> {
    let data = NSData::with_bytes(data);
    unsafe { VZMacHardwareModel::initWithDataRepresentation(VZMacHardwareModel::alloc(), &data) }
}

/// Decode a machine identifier data representation.
pub fn decode_machine_identifier(data: &[u8]) -> Option<Retained<VZMacMachineIdentifier>> {
    let data = NSData::with_bytes(data);
    unsafe {
        VZMacMachineIdentifier::initWithDataRepresentation(VZMacMachineIdentifier::alloc(), &data)
    }
}

fn hardware_model(model: &HardwareModel) -> Result<Retained<VZMacHardwareModel>> {
    decode_hardware_model(model.data_representation())
        .ok_or_else(|| Error::ValidationFailed("Failed to create hardware model.".into()))
}

fn machine_identifier(id: &MachineIdentifier) -> Result<Retained<VZMacMachineIdentifier>> {
    decode_machine_identifier(id.data_representation())
        .ok_or_else(|| Error::ValidationFailed("Failed to create machine identifier.".into()))
}

fn platform(platform: &PlatformConfig) -> Result<Retained<VZMacPlatformConfiguration>> {
    let aux_url = file_url(platform.auxiliary_storage.path())?;
    let model = hardware_model(&platform.hardware_model)?;
    let identifier = machine_identifier(&platform.machine_identifier)?;

    unsafe {
        let mac_platform = VZMacPlatformConfiguration::new();
        let aux = VZMacAuxiliaryStorage::initWithURL(VZMacAuxiliaryStorage::alloc(), &aux_url);
        mac_platform.setAuxiliaryStorage(Some(&aux));
        mac_platform.setHardwareModel(&model);
        mac_platform.setMachineIdentifier(&identifier);
        Ok(mac_platform)
    }
}

fn boot_loader(kind: BootLoader) -> Retained<VZBootLoader> {
    match kind {
        BootLoader::MacOs => Retained::into_super(unsafe { VZMacOSBootLoader::new() }),
    }
}

fn display(d: &DisplayConfig) -> Retained<VZMacGraphicsDisplayConfiguration> {
    type Display = VZMacGraphicsDisplayConfiguration;
    unsafe {
        Display::initWithWidthInPixels_heightInPixels_pixelsPerInch(
            Display::alloc(),
            d.width_in_pixels as isize,
            d.height_in_pixels as isize,
            d.pixels_per_inch as isize,
        )
    }
}

fn graphics(device: &GraphicsDevice) -> Retained<VZGraphicsDeviceConfiguration> {
    unsafe {
        let displays: Vec<Retained<VZMacGraphicsDisplayConfiguration>> =
            device.displays.iter().map(display).collect();
        let graphics = VZMacGraphicsDeviceConfiguration::new();
        graphics.setDisplays(&NSArray::from_retained_slice(&displays));
        Retained::into_super(graphics)
    }
}

fn storage(device: &StorageDevice) -> Result<Retained<VZStorageDeviceConfiguration>> {
    let url = file_url(device.image())?;
    unsafe {
        let attachment = VZDiskImageStorageDeviceAttachment::initWithURL_readOnly_error(
            VZDiskImageStorageDeviceAttachment::alloc(),
            &url,
            device.read_only,
        )
        .map_err(|e| {
            Error::ValidationFailed(format!(
                "Failed to create disk attachment for {}: {}",
                device.image().display(),
                e.localizedDescription()
            ))
        })?;
        let block = VZVirtioBlockDeviceConfiguration::initWithAttachment(
            VZVirtioBlockDeviceConfiguration::alloc(),
            &attachment,
        );
        Ok(Retained::into_super(block))
    }
}

fn network(device: NetworkDevice) -> Retained<VZNetworkDeviceConfiguration> {
    unsafe {
        let net = VZVirtioNetworkDeviceConfiguration::new();
        match device {
            NetworkDevice::Nat => {
                let nat = VZNATNetworkDeviceAttachment::new();
                net.setAttachment(Some(&nat));
            }
        }
        Retained::into_super(net)
    }
}

fn pointing(device: PointingDevice) -> Retained<VZPointingDeviceConfiguration> {
    match device {
        PointingDevice::UsbScreenCoordinate => Retained::into_super(unsafe {
            VZUSBScreenCoordinatePointingDeviceConfiguration::new()
        }),
    }
}

fn keyboard(device: KeyboardDevice) -> Retained<VZKeyboardConfiguration> {
    match device {
        KeyboardDevice::Usb => Retained::into_super(unsafe { VZUSBKeyboardConfiguration::new() }),
    }
}

fn audio(device: &AudioDevice) -> Retained<VZAudioDeviceConfiguration> {
    unsafe {
        let mut streams: Vec<Retained<VZVirtioSoundDeviceStreamConfiguration>> = Vec::new();
        if device.host_input {
            let input = VZVirtioSoundDeviceInputStreamConfiguration::new();
            let source = VZHostAudioInputStreamSource::new();
            input.setSource(Some(&source));
            streams.push(Retained::into_super(input));
        }
        if device.host_output {
            let output = VZVirtioSoundDeviceOutputStreamConfiguration::new();
            let sink = VZHostAudioOutputStreamSink::new();
            output.setSink(Some(&sink));
            streams.push(Retained::into_super(output));
        }
        let sound = VZVirtioSoundDeviceConfiguration::new();
        sound.setStreams(&NSArray::from_retained_slice(&streams));
        Retained::into_super(sound)
    }
}

/// Build the framework configuration for `config`.
pub fn build(config: &MachineConfig) -> Result<Retained<VZVirtualMachineConfiguration>> {
    let platform = platform(config.platform())?;

    let storage_devices = config
        .storage_devices()
        .iter()
        .map(storage)
        .collect::<Result<Vec<_>>>()?;
    let graphics_devices: Vec<_> = config.graphics_devices().iter().map(graphics).collect();
    let network_devices: Vec<_> = config
        .network_devices()
        .iter()
        .copied()
        .map(network)
        .collect();
    let pointing_devices: Vec<_> = config
        .pointing_devices()
        .iter()
        .copied()
        .map(pointing)
        .collect();
    let keyboards: Vec<_> = config.keyboards().iter().copied().map(keyboard).collect();
    let audio_devices: Vec<_> = config.audio_devices().iter().map(audio).collect();

    unsafe {
        let vm_config = VZVirtualMachineConfiguration::new();
        vm_config.setPlatform(&platform);
        vm_config.setBootLoader(Some(&boot_loader(config.boot_loader())));
        vm_config.setCPUCount(config.cpu_count());
        vm_config.setMemorySize(config.memory_size());
        vm_config.setGraphicsDevices(&NSArray::from_retained_slice(&graphics_devices));
        vm_config.setStorageDevices(&NSArray::from_retained_slice(&storage_devices));
        vm_config.setNetworkDevices(&NSArray::from_retained_slice(&network_devices));
        vm_config.setPointingDevices(&NSArray::from_retained_slice(&pointing_devices));
        vm_config.setKeyboards(&NSArray::from_retained_slice(&keyboards));
        vm_config.setAudioDevices(&NSArray::from_retained_slice(&audio_devices));
        Ok(vm_config)
    }
}

/// Framework-side validation.
pub fn validate(vm_config: &VZVirtualMachineConfiguration) -> Result<()> {
    unsafe { vm_config.validateWithError() }.map_err(|e| {
        Error::ValidationFailed(e.localizedDescription().to_string())
    })
}
