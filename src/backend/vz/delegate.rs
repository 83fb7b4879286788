//! `VZVirtualMachineDelegate` forwarding stop events to a [`StopNotifier`].

use objc2::rc::Retained;
use objc2::{define_class, msg_send, DefinedClass, MainThreadMarker, MainThreadOnly};
use objc2_foundation::{NSError, NSObject, NSObjectProtocol};
use objc2_virtualization::{VZVirtualMachine, VZVirtualMachineDelegate};

use crate::lifecycle::{StopEvent, StopNotifier};

pub(super) struct DelegateIvars {
    notifier: StopNotifier,
}

define_class!(
    // SAFETY:
    // - NSObject has no subclassing requirements
    // - We don't implement Drop
    #[unsafe(super(NSObject))]
    #[thread_kind = MainThreadOnly]
    #[name = "MacvmVirtualMachineDelegate"]
    #[ivars = DelegateIvars]
    pub(super) struct VirtualMachineDelegate;

    unsafe impl NSObjectProtocol for VirtualMachineDelegate {}

    unsafe impl VZVirtualMachineDelegate for VirtualMachineDelegate {
        #[unsafe(method(guestDidStopVirtualMachine:))]
        fn guest_did_stop(&self, _vm: &VZVirtualMachine) {
            self.ivars().notifier.notify(StopEvent::GuestStopped);
        }

        #[unsafe(method(virtualMachine:didStopWithError:))]
        fn did_stop_with_error(&self, _vm: &VZVirtualMachine, error: &NSError) {
            let message = error.localizedDescription().to_string();
            self.ivars().notifier.notify(StopEvent::Error(message));
        }
    }
);

impl VirtualMachineDelegate {
    pub(super) fn new(mtm: MainThreadMarker, notifier: StopNotifier) -> Retained<Self> {
        let this = Self::alloc(mtm).set_ivars(DelegateIvars { notifier });
        // SAFETY: Calling init on a freshly allocated NSObject subclass
        unsafe { msg_send![super(this), init] }
    }
}
