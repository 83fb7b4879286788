//! Platform identity artifacts.
//!
//! The hardware model and machine identifier are opaque tokens produced when
//! the guest was installed. They are kept as raw data representations here;
//! the backend that decoded them turns them back into framework objects when
//! the VM is constructed.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::Hypervisor;
use crate::bundle::VmBundle;
use crate::error::{ArtifactKind, Error, Result};

/// Decoded hardware model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareModel {
    data: Vec<u8>,
    supported: bool,
}

impl HardwareModel {
    /// Wrap a data representation the hypervisor has already decoded.
    pub fn new(data: Vec<u8>, supported: bool) -> Self {
        Self { data, supported }
    }

    pub fn data_representation(&self) -> &[u8] {
        &self.data
    }

    /// Whether the current host can run guests of this model
    pub fn is_supported(&self) -> bool {
        self.supported
    }
}

/// Decoded machine identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentifier {
    data: Vec<u8>,
}

impl MachineIdentifier {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data_representation(&self) -> &[u8] {
        &self.data
    }
}

/// Reference to the auxiliary storage file in the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliaryStorage {
    path: PathBuf,
}

impl AuxiliaryStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Platform identity of a Mac guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub hardware_model: HardwareModel,
    pub machine_identifier: MachineIdentifier,
    pub auxiliary_storage: AuxiliaryStorage,
}

/// Load and decode the three identity artifacts of `bundle`.
///
/// The hardware model is checked for host support before the machine
/// identifier is read, so an unsupported model is always reported as such.
pub fn load_platform<H: Hypervisor>(hypervisor: &H, bundle: &VmBundle) -> Result<PlatformConfig> {
    if !bundle.exists() {
        return Err(Error::MissingArtifact {
            kind: ArtifactKind::Bundle,
            path: bundle.root().to_path_buf(),
        });
    }

    let aux_path = bundle.auxiliary_storage();
    require_file(ArtifactKind::AuxiliaryStorage, &aux_path)?;

    let model_path = bundle.hardware_model();
    let model_data = read_artifact(ArtifactKind::HardwareModel, &model_path)?;
    let hardware_model = hypervisor
        .decode_hardware_model(&model_data)
        .map_err(|reason| Error::InvalidArtifact {
            kind: ArtifactKind::HardwareModel,
            path: model_path.clone(),
            reason,
        })?;
    if !hardware_model.is_supported() {
        return Err(Error::UnsupportedHardware);
    }
    debug!("Loaded hardware model from {}", model_path.display());

    let id_path = bundle.machine_identifier();
    let id_data = read_artifact(ArtifactKind::MachineIdentifier, &id_path)?;
    let machine_identifier = hypervisor
        .decode_machine_identifier(&id_data)
        .map_err(|reason| Error::InvalidArtifact {
            kind: ArtifactKind::MachineIdentifier,
            path: id_path.clone(),
            reason,
        })?;
    debug!("Loaded machine identifier from {}", id_path.display());

    Ok(PlatformConfig {
        hardware_model,
        machine_identifier,
        auxiliary_storage: AuxiliaryStorage::new(aux_path),
    })
}

/// Check that `path` is a regular file.
///
/// A path that does not exist is `MissingArtifact`; anything else in the way
/// (a directory, an unreadable entry) is `ReadArtifact`.
pub(crate) fn require_file(kind: ArtifactKind, path: &Path) -> Result<()> {
    let read_error = |source| Error::ReadArtifact {
        kind,
        path: path.to_path_buf(),
        source,
    };
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(read_error(io::Error::other("not a regular file"))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::MissingArtifact {
            kind,
            path: path.to_path_buf(),
        }),
        Err(e) => Err(read_error(e)),
    }
}

fn read_artifact(kind: ArtifactKind, path: &Path) -> Result<Vec<u8>> {
    require_file(kind, path)?;
    std::fs::read(path).map_err(|source| Error::ReadArtifact {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{self, MockHypervisor};

    fn write_bundle(dir: &Path, model: &[u8], id: &[u8]) -> VmBundle {
        let bundle = VmBundle::new(dir);
        std::fs::write(bundle.auxiliary_storage(), b"aux").unwrap();
        std::fs::write(bundle.hardware_model(), model).unwrap();
        std::fs::write(bundle.machine_identifier(), id).unwrap();
        bundle
    }

    #[test]
    fn loads_all_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            &mock::hardware_model_bytes(2),
            &mock::machine_identifier_bytes(42),
        );
        let platform = load_platform(&MockHypervisor::new(), &bundle).unwrap();
        assert!(platform.hardware_model.is_supported());
        assert_eq!(
            platform.machine_identifier.data_representation(),
            mock::machine_identifier_bytes(42).as_slice()
        );
        assert_eq!(platform.auxiliary_storage.path(), bundle.auxiliary_storage());
    }

    #[test]
    fn missing_bundle_directory() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = VmBundle::new(dir.path().join("VM.bundle"));
        let err = load_platform(&MockHypervisor::new(), &bundle).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArtifact {
                kind: ArtifactKind::Bundle,
                ..
            }
        ));
    }

    #[test]
    fn corrupt_hardware_model_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            b"\x00\x01garbage",
            &mock::machine_identifier_bytes(1),
        );
        let err = load_platform(&MockHypervisor::new(), &bundle).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArtifact {
                kind: ArtifactKind::HardwareModel,
                ..
            }
        ));
    }

    #[test]
    fn unsupported_model_reported_before_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(dir.path(), &mock::hardware_model_bytes(9), b"corrupt");
        let err = load_platform(&MockHypervisor::new(), &bundle).unwrap_err();
        assert!(matches!(err, Error::UnsupportedHardware));
    }

    #[test]
    fn directory_in_place_of_artifact_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            &mock::hardware_model_bytes(2),
            &mock::machine_identifier_bytes(42),
        );

        std::fs::remove_file(bundle.hardware_model()).unwrap();
        std::fs::create_dir(bundle.hardware_model()).unwrap();
        let err = load_platform(&MockHypervisor::new(), &bundle).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadArtifact {
                kind: ArtifactKind::HardwareModel,
                ..
            }
        ));

        std::fs::remove_file(bundle.auxiliary_storage()).unwrap();
        std::fs::create_dir(bundle.auxiliary_storage()).unwrap();
        let err = load_platform(&MockHypervisor::new(), &bundle).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadArtifact {
                kind: ArtifactKind::AuxiliaryStorage,
                ..
            }
        ));
    }
}
