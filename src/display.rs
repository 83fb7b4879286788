//! Display surfaces.
//!
//! A display surface presents the graphics output of a VM. The windowed
//! application uses a `VZVirtualMachineView`; `--headless` runs use
//! [`HeadlessDisplay`], which only remembers that it was bound.

use tracing::info;

use crate::backend::VirtualMachine;
use crate::Result;

/// Something that can show the output of machine type `M`.
pub trait DisplaySurface<M> {
    /// Bind the surface to `machine`. Called once, before the VM starts.
    fn bind(&mut self, machine: &M) -> Result<()>;

    /// Whether a machine is bound.
    fn is_bound(&self) -> bool;
}

/// Display surface that shows nothing.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    bound: bool,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }
}

impl<M: VirtualMachine> DisplaySurface<M> for HeadlessDisplay {
    fn bind(&mut self, _machine: &M) -> Result<()> {
        info!("Running headless; guest graphics output is not displayed");
        self.bound = true;
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.bound
    }
}
