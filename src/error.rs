//! Error types for macvm

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using macvm Error
pub type Result<T> = std::result::Result<T, Error>;

/// The files a VM bundle is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The bundle directory itself
    Bundle,
    /// Auxiliary storage used by the guest boot firmware
    AuxiliaryStorage,
    /// Hardware model data representation
    HardwareModel,
    /// Machine identifier data representation
    MachineIdentifier,
    /// Boot disk image
    DiskImage,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Bundle => "virtual machine bundle",
            ArtifactKind::AuxiliaryStorage => "auxiliary storage",
            ArtifactKind::HardwareModel => "hardware model",
            ArtifactKind::MachineIdentifier => "machine identifier",
            ArtifactKind::DiskImage => "disk image",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while configuring or launching the virtual machine
#[derive(Error, Debug)]
pub enum Error {
    /// A bundle artifact does not exist
    #[error("Missing {kind} at {}", path.display())]
    MissingArtifact { kind: ArtifactKind, path: PathBuf },

    /// A bundle artifact exists but could not be read
    #[error("Failed to read {kind} at {}: {source}", path.display())]
    ReadArtifact {
        kind: ArtifactKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A bundle artifact could not be decoded into its identity type
    #[error("Invalid {kind} at {}: {reason}", path.display())]
    InvalidArtifact {
        kind: ArtifactKind,
        path: PathBuf,
        reason: String,
    },

    /// The hardware model decoded but this host cannot run it
    #[error("The hardware model isn't supported on the current host")]
    UnsupportedHardware,

    /// Configuration rejected before the VM was constructed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The asynchronous start request reported failure
    #[error("Virtual machine failed to start: {0}")]
    StartFailed(String),

    /// The guest stopped because of an error
    #[error("The guest shut down with error: {0}")]
    GuestError(String),

    /// A second bootstrap was attempted in the same run
    #[error("Virtual machine already bootstrapped")]
    AlreadyBootstrapped,

    /// No hypervisor backend is available on this host
    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    /// Application configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_names_kind_and_path() {
        let err = Error::MissingArtifact {
            kind: ArtifactKind::MachineIdentifier,
            path: PathBuf::from("/bundle/MachineIdentifier"),
        };
        assert_eq!(
            err.to_string(),
            "Missing machine identifier at /bundle/MachineIdentifier"
        );
    }

    #[test]
    fn unsupported_hardware_message() {
        assert!(Error::UnsupportedHardware
            .to_string()
            .contains("isn't supported on the current host"));
    }
}
