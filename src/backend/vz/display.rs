//! `VZVirtualMachineView` as a [`DisplaySurface`].

use objc2::rc::Retained;
use objc2_virtualization::VZVirtualMachineView;

use super::VzMachine;
use crate::display::DisplaySurface;
use crate::Result;

/// The view showing the guest's graphics output.
pub struct VmView {
    view: Retained<VZVirtualMachineView>,
    bound: bool,
}

impl VmView {
    pub fn new(view: Retained<VZVirtualMachineView>) -> Self {
        Self { view, bound: false }
    }
}

impl DisplaySurface<VzMachine> for VmView {
    fn bind(&mut self, machine: &VzMachine) -> Result<()> {
        unsafe { self.view.setVirtualMachine(Some(machine.raw())) };
        self.bound = true;
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.bound
    }
}
