//! VM bundle layout
//!
//! A bundle is the directory an out-of-band installation step fills with the
//! guest's auxiliary storage, hardware model, machine identifier and disk
//! image. This crate only ever reads from it.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Environment variable overriding the bundle location
pub const BUNDLE_ENV: &str = "MACVM_BUNDLE";

/// Directory name used under the home directory when no override is given
pub const DEFAULT_BUNDLE_NAME: &str = "VM.bundle";

const AUXILIARY_STORAGE: &str = "AuxiliaryStorage";
const HARDWARE_MODEL: &str = "HardwareModel";
const MACHINE_IDENTIFIER: &str = "MachineIdentifier";
const DISK_IMAGE: &str = "Disk.img";

/// Paths to the files inside a VM bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmBundle {
    root: PathBuf,
}

impl VmBundle {
    /// Use `root` as the bundle directory
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// `$HOME/VM.bundle/`
    pub fn default_location() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| Error::Config("HOME is not set; pass --bundle".into()))?;
        Ok(Self::new(PathBuf::from(home).join(DEFAULT_BUNDLE_NAME)))
    }

    /// Resolve the bundle from an explicit path, `MACVM_BUNDLE`, or the default.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        match std::env::var_os(BUNDLE_ENV) {
            Some(path) if !path.is_empty() => Ok(Self::new(path)),
            _ => Self::default_location(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn auxiliary_storage(&self) -> PathBuf {
        self.root.join(AUXILIARY_STORAGE)
    }

    pub fn hardware_model(&self) -> PathBuf {
        self.root.join(HARDWARE_MODEL)
    }

    pub fn machine_identifier(&self) -> PathBuf {
        self.root.join(MACHINE_IDENTIFIER)
    }

    pub fn disk_image(&self) -> PathBuf {
        self.root.join(DISK_IMAGE)
    }

    /// Whether the bundle directory exists
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_layout() {
        let bundle = VmBundle::new("/Users/me/VM.bundle");
        assert_eq!(
            bundle.auxiliary_storage(),
            PathBuf::from("/Users/me/VM.bundle/AuxiliaryStorage")
        );
        assert_eq!(
            bundle.hardware_model(),
            PathBuf::from("/Users/me/VM.bundle/HardwareModel")
        );
        assert_eq!(
            bundle.machine_identifier(),
            PathBuf::from("/Users/me/VM.bundle/MachineIdentifier")
        );
        assert_eq!(
            bundle.disk_image(),
            PathBuf::from("/Users/me/VM.bundle/Disk.img")
        );
    }

    #[test]
    fn explicit_path_wins() {
        let bundle = VmBundle::resolve(Some(Path::new("/tmp/explicit"))).unwrap();
        assert_eq!(bundle.root(), Path::new("/tmp/explicit"));
    }

    #[test]
    fn exists_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VmBundle::new(dir.path()).exists());
        assert!(!VmBundle::new(dir.path().join("nope")).exists());
    }
}
