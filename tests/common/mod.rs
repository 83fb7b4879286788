//! Shared fixtures: VM bundles on disk for the mock hypervisor.

#![allow(dead_code)]

use std::path::Path;

use macvm::backend::mock;
use macvm::VmBundle;
use tempfile::TempDir;

/// A complete, valid bundle in a temporary directory.
pub struct BundleFixture {
    pub dir: TempDir,
    pub bundle: VmBundle,
}

impl BundleFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bundle = VmBundle::new(dir.path().join("VM.bundle"));
        std::fs::create_dir_all(bundle.root()).unwrap();

        write(&bundle.auxiliary_storage(), b"auxiliary storage");
        write(
            &bundle.hardware_model(),
            &mock::hardware_model_bytes(mock::DEFAULT_PLATFORM_VERSION),
        );
        write(
            &bundle.machine_identifier(),
            &mock::machine_identifier_bytes(0x1234_5678),
        );
        write(&bundle.disk_image(), &[0u8; 4096]);

        Self { dir, bundle }
    }

    pub fn remove(&self, path: &Path) -> &Self {
        std::fs::remove_file(path).unwrap();
        self
    }

    pub fn overwrite(&self, path: &Path, contents: &[u8]) -> &Self {
        write(path, contents);
        self
    }
}

fn write(path: &Path, contents: &[u8]) {
    std::fs::write(path, contents).unwrap();
}
