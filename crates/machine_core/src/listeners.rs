//! Observer fan-out for machine lifecycle and activity events.

use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::error;

use crate::resources::{Head, Identifiable};

/// Every callback defaults to a no-op so listeners only implement what they
/// care about.
pub trait MachineListener: Send + Sync {
    fn head_activity(&self, _head: &Arc<dyn Head>) {}
    fn enabled(&self) {}
    fn enable_failed(&self, _reason: &str) {}
    fn disabled(&self, _reason: &str) {}
    fn disable_failed(&self, _reason: &str) {}
    fn busy_changed(&self, _busy: bool) {}
}

#[derive(Clone)]
pub enum MachineEvent {
    HeadActivity(Arc<dyn Head>),
    Enabled,
    EnableFailed(String),
    Disabled(String),
    DisableFailed(String),
    BusyChanged(bool),
}

impl MachineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MachineEvent::HeadActivity(_) => "head_activity",
            MachineEvent::Enabled => "enabled",
            MachineEvent::EnableFailed(_) => "enable_failed",
            MachineEvent::Disabled(_) => "disabled",
            MachineEvent::DisableFailed(_) => "disable_failed",
            MachineEvent::BusyChanged(_) => "busy_changed",
        }
    }

    fn deliver(&self, listener: &dyn MachineListener) {
        match self {
            MachineEvent::HeadActivity(head) => listener.head_activity(head),
            MachineEvent::Enabled => listener.enabled(),
            MachineEvent::EnableFailed(reason) => listener.enable_failed(reason),
            MachineEvent::Disabled(reason) => listener.disabled(reason),
            MachineEvent::DisableFailed(reason) => listener.disable_failed(reason),
            MachineEvent::BusyChanged(busy) => listener.busy_changed(*busy),
        }
    }
}

impl fmt::Debug for MachineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineEvent::HeadActivity(head) => {
                f.debug_tuple("HeadActivity").field(&head.id()).finish()
            }
            MachineEvent::Enabled => f.write_str("Enabled"),
            MachineEvent::EnableFailed(reason) => {
                f.debug_tuple("EnableFailed").field(reason).finish()
            }
            MachineEvent::Disabled(reason) => f.debug_tuple("Disabled").field(reason).finish(),
            MachineEvent::DisableFailed(reason) => {
                f.debug_tuple("DisableFailed").field(reason).finish()
            }
            MachineEvent::BusyChanged(busy) => f.debug_tuple("BusyChanged").field(busy).finish(),
        }
    }
}

/// Registered listeners, delivered to in subscription order.
///
/// `emit` works on a snapshot of the set, so listeners may subscribe or
/// unsubscribe from inside a callback. A panicking listener is logged and
/// skipped; the remaining listeners still receive the event.
#[derive(Default)]
pub struct ListenerHub {
    listeners: RwLock<Vec<Arc<dyn MachineListener>>>,
}

impl ListenerHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn MachineListener>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &listener))
        {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn unsubscribe(&self, listener: &Arc<dyn MachineListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|existing| !Arc::ptr_eq(existing, listener));
        listeners.len() != before
    }

    /// Returns how many listeners faulted while handling the event.
    pub fn emit(&self, event: &MachineEvent) -> usize {
        let snapshot: Vec<Arc<dyn MachineListener>> = self.listeners.read().clone();
        let mut faults = 0;
        for listener in snapshot {
            let delivered = catch_unwind(AssertUnwindSafe(|| event.deliver(listener.as_ref())));
            if let Err(payload) = delivered {
                faults += 1;
                error!(
                    event = event.name(),
                    panic = %panic_message(payload.as_ref()),
                    "machine listener panicked; continuing delivery"
                );
            }
        }
        faults
    }

    pub fn fire_head_activity(&self, head: &Arc<dyn Head>) {
        self.emit(&MachineEvent::HeadActivity(Arc::clone(head)));
    }

    pub fn fire_enabled(&self) {
        self.emit(&MachineEvent::Enabled);
    }

    pub fn fire_enable_failed(&self, reason: impl Into<String>) {
        self.emit(&MachineEvent::EnableFailed(reason.into()));
    }

    pub fn fire_disabled(&self, reason: impl Into<String>) {
        self.emit(&MachineEvent::Disabled(reason.into()));
    }

    pub fn fire_disable_failed(&self, reason: impl Into<String>) {
        self.emit(&MachineEvent::DisableFailed(reason.into()));
    }

    pub fn fire_busy(&self, busy: bool) {
        self.emit(&MachineEvent::BusyChanged(busy));
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl fmt::Debug for ListenerHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHub")
            .field("listeners", &self.len())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "tests/listeners_tests.rs"]
mod tests;
