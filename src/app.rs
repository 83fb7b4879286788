//! AppKit application: one window showing one VM.
//!
//! `applicationDidFinishLaunching:` opens the window and then defers the
//! bootstrap onto the main queue, so the UI finishes initializing before the
//! VM is constructed. The start completion and the stop observer are awaited
//! on the tokio runtime; both end the process through [`exit::terminate`]
//! when they carry a terminal outcome.

use std::cell::OnceCell;

use dispatch2::DispatchQueue;
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2::{define_class, msg_send, DefinedClass, MainThreadMarker, MainThreadOnly, Message};
use objc2_app_kit::{
    NSApplication, NSApplicationActivationPolicy, NSApplicationDelegate, NSBackingStoreType,
    NSWindow, NSWindowStyleMask,
};
use objc2_foundation::{
    NSNotification, NSObject, NSObjectProtocol, NSPoint, NSRect, NSSize, NSString,
};
use objc2_virtualization::VZVirtualMachineView;
use tokio::runtime::Handle;
use tracing::{error, info};

use crate::backend::vz::{VmView, VzHypervisor, VzMachine};
use crate::bootstrap::{self, Bootstrapper, Launch};
use crate::cli::Settings;
use crate::config::{self, MachineConfig};
use crate::display::HeadlessDisplay;
use crate::{exit, Error, Result};

const WINDOW_TITLE: &str = "macOS Virtual Machine";
const WINDOW_WIDTH: f64 = 1280.0;
const WINDOW_HEIGHT: f64 = 800.0;

struct AppDelegateIvars {
    settings: Settings,
    runtime: Handle,
    bootstrapper: Bootstrapper,
    window: OnceCell<Retained<NSWindow>>,
    view: OnceCell<Retained<VZVirtualMachineView>>,
    machine: OnceCell<VzMachine>,
}

define_class!(
    // SAFETY:
    // - NSObject has no subclassing requirements
    // - We don't implement Drop
    #[unsafe(super(NSObject))]
    #[thread_kind = MainThreadOnly]
    #[name = "MacvmAppDelegate"]
    #[ivars = AppDelegateIvars]
    struct AppDelegate;

    unsafe impl NSObjectProtocol for AppDelegate {}

    unsafe impl NSApplicationDelegate for AppDelegate {
        #[unsafe(method(applicationDidFinishLaunching:))]
        fn did_finish_launching(&self, _notification: &NSNotification) {
            if !self.ivars().settings.headless {
                self.open_window(self.mtm());
            }

            // Reclaimed in the deferred block; keeps the delegate alive until then.
            let this = Retained::into_raw(self.retain()) as usize;
            DispatchQueue::main().exec_async(move || {
                let this = unsafe { Retained::from_raw(this as *mut AppDelegate) };
                let Some(this) = this else {
                    return;
                };
                let Some(mtm) = MainThreadMarker::new() else {
                    exit::terminate(Err(Error::UnsupportedHost(
                        "main queue block ran off the main thread".into(),
                    )));
                };
                this.bootstrap(mtm);
            });
        }

        #[unsafe(method(applicationShouldTerminateAfterLastWindowClosed:))]
        fn should_terminate_after_last_window_closed(&self, _sender: &NSApplication) -> bool {
            !self.ivars().settings.headless
        }
    }
);

impl AppDelegate {
    fn new(mtm: MainThreadMarker, settings: Settings, runtime: Handle) -> Retained<Self> {
        let this = Self::alloc(mtm).set_ivars(AppDelegateIvars {
            settings,
            runtime,
            bootstrapper: Bootstrapper::new(),
            window: OnceCell::new(),
            view: OnceCell::new(),
            machine: OnceCell::new(),
        });
        // SAFETY: Calling init on a freshly allocated NSObject subclass
        unsafe { msg_send![super(this), init] }
    }

    fn open_window(&self, mtm: MainThreadMarker) {
        let frame = NSRect::new(
            NSPoint::new(0.0, 0.0),
            NSSize::new(WINDOW_WIDTH, WINDOW_HEIGHT),
        );
        let style = NSWindowStyleMask::Titled
            | NSWindowStyleMask::Closable
            | NSWindowStyleMask::Miniaturizable
            | NSWindowStyleMask::Resizable;

        let window = unsafe {
            NSWindow::initWithContentRect_styleMask_backing_defer(
                NSWindow::alloc(mtm),
                frame,
                style,
                NSBackingStoreType::Buffered,
                false,
            )
        };
        unsafe { window.setReleasedWhenClosed(false) };
        window.setTitle(&NSString::from_str(WINDOW_TITLE));

        let view = unsafe {
            VZVirtualMachineView::initWithFrame(VZVirtualMachineView::alloc(mtm), frame)
        };
        unsafe { view.setCapturesSystemKeys(true) };

        window.setContentView(Some(&view));
        window.center();
        window.makeKeyAndOrderFront(None);

        let ivars = self.ivars();
        let _ = ivars.view.set(view);
        let _ = ivars.window.set(window);
    }

    fn launch(&self, mtm: MainThreadMarker) -> Result<Launch<VzMachine>> {
        let ivars = self.ivars();
        let hypervisor = VzHypervisor::new(mtm);
        let config = config::from_bundle(
            &hypervisor,
            &ivars.settings.bundle,
            &ivars.settings.sizing,
        )?;

        match ivars.view.get() {
            Some(view) => {
                let mut display = VmView::new(view.clone());
                ivars.bootstrapper.launch(&hypervisor, config, &mut display)
            }
            None => {
                let mut display = HeadlessDisplay::new();
                ivars.bootstrapper.launch(&hypervisor, config, &mut display)
            }
        }
    }

    fn bootstrap(&self, mtm: MainThreadMarker) {
        let launch = match self.launch(mtm) {
            Ok(launch) => launch,
            Err(err) => exit::terminate(Err(err)),
        };

        let ivars = self.ivars();
        let (machine, started, observer) = launch.into_parts();
        if ivars.machine.set(machine).is_err() {
            error!("A virtual machine was already running");
        }

        ivars.runtime.spawn(async move {
            match started.wait().await {
                Ok(()) => info!("Virtual machine successfully started."),
                Err(err) => exit::terminate(Err(err)),
            }
        });
        ivars.runtime.spawn(async move {
            if let Some(event) = observer.wait().await {
                exit::terminate(event.into_result());
            }
        });
    }
}

/// Run the application until the guest stops or the window closes.
///
/// Must be called on the main thread. `runtime` hosts the tasks waiting on
/// the start completion and the stop observer.
pub fn run(settings: Settings, runtime: Handle) -> Result<()> {
    let mtm = MainThreadMarker::new()
        .ok_or_else(|| Error::UnsupportedHost("macvm must run on the main thread".into()))?;

    let app = NSApplication::sharedApplication(mtm);
    let policy = if settings.headless {
        NSApplicationActivationPolicy::Accessory
    } else {
        NSApplicationActivationPolicy::Regular
    };
    app.setActivationPolicy(policy);

    let delegate = AppDelegate::new(mtm, settings, runtime);
    app.setDelegate(Some(ProtocolObject::from_ref(&*delegate)));

    #[allow(deprecated)]
    app.activateIgnoringOtherApps(true);
    app.run();
    Ok(())
}

/// Load the bundle and run both validation passes without creating a VM.
pub fn check(settings: &Settings) -> Result<MachineConfig> {
    let mtm = MainThreadMarker::new()
        .ok_or_else(|| Error::UnsupportedHost("macvm must run on the main thread".into()))?;
    let hypervisor = VzHypervisor::new(mtm);
    let config = config::from_bundle(&hypervisor, &settings.bundle, &settings.sizing)?;
    bootstrap::check(&hypervisor, &config)?;
    Ok(config)
}
