//! Lifecycle plumbing between a running VM and the application.
//!
//! Two single-shot channels cross the framework boundary:
//!
//! - the start completion ([`StartCompletion`] → [`StartHandle`]), resolved
//!   once when the framework finishes starting the guest;
//! - the stop notification ([`StopNotifier`] → [`LifecycleObserver`]),
//!   carrying the first terminal event of the guest.
//!
//! The VM side only ever holds the sending halves. Both senders tolerate
//! being called from any thread and silently drop everything after the first
//! delivery.

use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::{Error, Result};

/// Terminal event reported by the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopEvent {
    /// The guest shut itself down.
    GuestStopped,
    /// The VM stopped because of an error.
    Error(String),
}

impl StopEvent {
    /// Map the event onto the application's outcome.
    ///
    /// A clean guest shutdown is success; an error stop is fatal.
    pub fn into_result(self) -> Result<()> {
        match self {
            StopEvent::GuestStopped => Ok(()),
            StopEvent::Error(message) => Err(Error::GuestError(message)),
        }
    }
}

/// Sending half of the stop channel, held by the VM.
#[derive(Debug)]
pub struct StopNotifier {
    tx: Mutex<Option<oneshot::Sender<StopEvent>>>,
}

impl StopNotifier {
    /// Deliver `event`. Returns `false` when an event was already delivered.
    pub fn notify(&self, event: StopEvent) -> bool {
        let Some(tx) = self.tx.lock().ok().and_then(|mut slot| slot.take()) else {
            warn!("Ignoring stop event after the first: {:?}", event);
            return false;
        };
        // The observer may already be gone; the event is still consumed.
        let _ = tx.send(event);
        true
    }
}

/// Receiving half of the stop channel.
///
/// Holds no reference to the VM and cannot affect it.
#[derive(Debug)]
pub struct LifecycleObserver {
    rx: oneshot::Receiver<StopEvent>,
}

impl LifecycleObserver {
    /// Wait for the terminal event.
    ///
    /// `None` means the VM went away without reporting a stop.
    pub async fn wait(self) -> Option<StopEvent> {
        let event = self.rx.await.ok()?;
        match &event {
            StopEvent::GuestStopped => info!("The guest shut down. Exiting."),
            StopEvent::Error(message) => warn!("The guest shut down with error: {}", message),
        }
        Some(event)
    }

    /// Non-blocking check for the terminal event.
    pub fn try_event(&mut self) -> Option<StopEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected stop notifier / observer pair.
pub fn channel() -> (StopNotifier, LifecycleObserver) {
    let (tx, rx) = oneshot::channel();
    (
        StopNotifier {
            tx: Mutex::new(Some(tx)),
        },
        LifecycleObserver { rx },
    )
}

/// Sending half of the start completion, handed to [`VirtualMachine::start`].
///
/// [`VirtualMachine::start`]: crate::backend::VirtualMachine::start
#[derive(Debug)]
pub struct StartCompletion {
    tx: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl StartCompletion {
    /// Resolve the start request. Returns `false` if it was already resolved.
    pub fn complete(&self, result: Result<()>) -> bool {
        let Some(tx) = self.tx.lock().ok().and_then(|mut slot| slot.take()) else {
            warn!("Ignoring duplicate start completion: {:?}", result);
            return false;
        };
        let _ = tx.send(result);
        true
    }
}

/// Receiving half of the start completion.
///
/// Dropping the handle does not cancel the start; starts cannot be cancelled.
#[derive(Debug)]
pub struct StartHandle {
    rx: oneshot::Receiver<Result<()>>,
}

impl StartHandle {
    /// Wait for the start request to finish.
    pub async fn wait(self) -> Result<()> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::StartFailed(
                "completion handler dropped without a result".into(),
            )),
        }
    }

    /// Non-blocking check. `None` while the start is still in flight.
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::StartFailed(
                "completion handler dropped without a result".into(),
            ))),
        }
    }
}

/// Create a connected start completion / handle pair.
pub fn start_channel() -> (StartCompletion, StartHandle) {
    let (tx, rx) = oneshot::channel();
    (
        StartCompletion {
            tx: Mutex::new(Some(tx)),
        },
        StartHandle { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_stop_event_is_delivered() {
        let (notifier, observer) = channel();
        assert!(notifier.notify(StopEvent::Error("boom".into())));
        assert!(!notifier.notify(StopEvent::GuestStopped));

        let event = tokio_test::block_on(observer.wait());
        assert_eq!(event, Some(StopEvent::Error("boom".into())));
    }

    #[test]
    fn try_event_polls_without_blocking() {
        let (notifier, mut observer) = channel();
        assert_eq!(observer.try_event(), None);
        notifier.notify(StopEvent::GuestStopped);
        assert_eq!(observer.try_event(), Some(StopEvent::GuestStopped));
    }

    #[test]
    fn dropped_notifier_yields_no_event() {
        let (notifier, observer) = channel();
        drop(notifier);
        assert_eq!(tokio_test::block_on(observer.wait()), None);
    }

    #[test]
    fn stop_event_outcomes() {
        assert!(StopEvent::GuestStopped.into_result().is_ok());
        assert!(matches!(
            StopEvent::Error("disk".into()).into_result(),
            Err(Error::GuestError(m)) if m == "disk"
        ));
    }

    #[test]
    fn start_completes_once() {
        let (completion, mut handle) = start_channel();
        assert!(handle.try_result().is_none());
        assert!(completion.complete(Ok(())));
        assert!(!completion.complete(Err(Error::StartFailed("late".into()))));
        assert!(matches!(handle.try_result(), Some(Ok(()))));
    }

    #[test]
    fn dropped_completion_is_a_start_failure() {
        let (completion, handle) = start_channel();
        drop(completion);
        let result = tokio_test::block_on(handle.wait());
        assert!(matches!(result, Err(Error::StartFailed(_))));
    }

    #[tokio::test]
    async fn completion_from_another_thread() {
        let (completion, handle) = start_channel();
        std::thread::spawn(move || {
            completion.complete(Err(Error::StartFailed("no disk".into())));
        });
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "Virtual machine failed to start: no disk");
    }
}
