/// Output listener registry
///
/// The transport pushes every parsed chunk (or foreign notification)
/// through the registry; listeners are invoked synchronously, in
/// registration order, on the delivering task. This keeps outbound event
/// order identical to debugger output order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::types::MiOutput;
use crate::wire::VmNotification;
use crate::Result;

/// What the transport delivers to listeners. The variant is resolved
/// once, before any MI-specific logic runs.
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggerNotification {
    /// A parsed MI output chunk.
    Mi(MiOutput),
    /// A foreign notification from the debuggee's runtime.
    Vm(VmNotification),
}

/// Receives every delivered notification.
pub trait OutputListener: Send + Sync {
    fn on_output(&self, notification: &DebuggerNotification) -> Result<()>;
}

/// Handle returned by `register`; needed to unregister.
#[derive(Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<(u64, Arc<dyn OutputListener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn OutputListener>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));
        ListenerId(id)
    }

    /// Remove a listener. Safe to call with an id that was already
    /// removed; returns whether anything was removed.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id.0);
        listeners.len() != before
    }

    /// Deliver one notification to every listener, in registration
    /// order. The first listener error aborts delivery and is returned
    /// to the dispatching caller.
    pub fn dispatch(&self, notification: &DebuggerNotification) -> Result<()> {
        let listeners: Vec<Arc<dyn OutputListener>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener.on_output(notification)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl OutputListener for Counter {
        fn on_output(&self, _notification: &DebuggerNotification) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn dispatch_reaches_registered_listeners() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let id = registry.register(counter.clone());

        let chunk = DebuggerNotification::Mi(MiOutput::default());
        registry.dispatch(&chunk).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        assert!(registry.unregister(id));
        registry.dispatch(&chunk).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_twice_is_harmless() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let id = registry.register(counter);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(ListenerId(0)));
    }
}
