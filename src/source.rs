//! Interface to the external call-interception source
//!
//! The interception mechanism itself (a runtime hook observing method
//! dispatch) lives outside this crate. A session injects its observer into
//! a `CallSource`; the source invokes the observer synchronously for every
//! intercepted call while active. The dependency direction is fixed: the
//! source calls the observer, never the other way around.

use std::sync::{Arc, Mutex, PoisonError};

use crate::event::CallEvent;

/// Receiver of intercepted call events.
pub trait CallObserver: Send {
    fn on_call(&mut self, event: &CallEvent);
}

/// A call-interception source: toggled by the session, delivers events to
/// the installed observer while active.
pub trait CallSource {
    /// Install the observer that receives every intercepted call.
    fn install(&mut self, observer: Box<dyn CallObserver>);

    /// Begin delivering events. Idempotent.
    fn start(&mut self);

    /// Stop delivering events. Idempotent.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

#[derive(Default)]
struct ManualSourceInner {
    observer: Option<Box<dyn CallObserver>>,
    active: bool,
}

/// In-process source driven by explicit `emit` calls.
///
/// Cloning yields another handle to the same source, so an embedding
/// runtime hook (or a test) can keep feeding events while the session owns
/// its own handle.
#[derive(Clone, Default)]
pub struct ManualSource {
    inner: Arc<Mutex<ManualSourceInner>>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one event to the installed observer, if currently active.
    pub fn emit(&self, event: &CallEvent) {
        let mut inner = self.lock();
        if !inner.active {
            return;
        }
        if let Some(observer) = inner.observer.as_mut() {
            observer.on_call(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualSourceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CallSource for ManualSource {
    fn install(&mut self, observer: Box<dyn CallObserver>) {
        self.lock().observer = Some(observer);
    }

    fn start(&mut self) {
        self.lock().active = true;
    }

    fn stop(&mut self) {
        self.lock().active = false;
    }

    fn is_active(&self) -> bool {
        self.lock().active
    }
}
