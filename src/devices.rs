//! Device descriptors.
//!
//! Plain data describing the devices a Mac guest is configured with. Each
//! backend maps these to its own device objects.

use std::path::{Path, PathBuf};

/// Default display width in pixels
pub const DEFAULT_DISPLAY_WIDTH: usize = 1920;
/// Default display height in pixels
pub const DEFAULT_DISPLAY_HEIGHT: usize = 1200;
/// Default display density
pub const DEFAULT_PIXELS_PER_INCH: usize = 80;

/// One display attached to a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    pub width_in_pixels: usize,
    pub height_in_pixels: usize,
    pub pixels_per_inch: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width_in_pixels: DEFAULT_DISPLAY_WIDTH,
            height_in_pixels: DEFAULT_DISPLAY_HEIGHT,
            pixels_per_inch: DEFAULT_PIXELS_PER_INCH,
        }
    }
}

/// Mac graphics device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsDevice {
    pub displays: Vec<DisplayConfig>,
}

impl Default for GraphicsDevice {
    fn default() -> Self {
        Self {
            displays: vec![DisplayConfig::default()],
        }
    }
}

/// Virtio block device backed by a disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDevice {
    pub image: PathBuf,
    pub read_only: bool,
}

impl StorageDevice {
    /// Read-write disk image
    pub fn disk_image<P: Into<PathBuf>>(image: P) -> Self {
        Self {
            image: image.into(),
            read_only: false,
        }
    }

    pub fn image(&self) -> &Path {
        &self.image
    }
}

/// Virtio network device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkDevice {
    /// NAT managed by the host
    #[default]
    Nat,
}

/// Pointing device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PointingDevice {
    /// USB device reporting absolute screen coordinates
    #[default]
    UsbScreenCoordinate,
}

/// Keyboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyboardDevice {
    #[default]
    Usb,
}

/// Virtio sound device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDevice {
    /// Stream from the host's default input into the guest
    pub host_input: bool,
    /// Stream from the guest to the host's default output
    pub host_output: bool,
}

impl Default for AudioDevice {
    fn default() -> Self {
        Self {
            host_input: true,
            host_output: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_display_matches_sample_geometry() {
        let graphics = GraphicsDevice::default();
        assert_eq!(graphics.displays.len(), 1);
        assert_eq!(graphics.displays[0].width_in_pixels, 1920);
        assert_eq!(graphics.displays[0].height_in_pixels, 1200);
        assert_eq!(graphics.displays[0].pixels_per_inch, 80);
    }

    #[test]
    fn disk_image_is_writable() {
        let disk = StorageDevice::disk_image("/tmp/Disk.img");
        assert!(!disk.read_only);
        assert_eq!(disk.image(), Path::new("/tmp/Disk.img"));
    }
}
