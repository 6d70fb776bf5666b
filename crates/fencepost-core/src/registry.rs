//! Subscriptions to geofence enter and exit events.
//!
//! Callbacks are invoked from a snapshot of the registry taken before
//! dispatch, so a callback may register or unregister (itself included)
//! without affecting the dispatch already under way.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

use crate::types::PositionSample;

/// Receives the sample that caused a transition.
pub type SampleCallback = Box<dyn Fn(&PositionSample) + Send + Sync>;

/// A pair of optional enter/exit callbacks.
#[derive(Default)]
pub struct GeofenceCallbacks {
    on_enter: Option<SampleCallback>,
    on_exit: Option<SampleCallback>,
}

impl GeofenceCallbacks {
    /// An empty set of callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `f` when the device enters the fence.
    #[must_use]
    pub fn on_enter(mut self, f: impl Fn(&PositionSample) + Send + Sync + 'static) -> Self {
        self.on_enter = Some(Box::new(f));
        self
    }

    /// Call `f` when the device leaves the fence.
    #[must_use]
    pub fn on_exit(mut self, f: impl Fn(&PositionSample) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Box::new(f));
        self
    }

    pub(crate) fn fire_enter(&self, sample: &PositionSample) {
        if let Some(f) = &self.on_enter {
            f(sample);
        }
    }

    pub(crate) fn fire_exit(&self, sample: &PositionSample) {
        if let Some(f) = &self.on_exit {
            f(sample);
        }
    }
}

impl fmt::Debug for GeofenceCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeofenceCallbacks")
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// The set of active geofence subscriptions.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: Mutex<Vec<(u64, Arc<GeofenceCallbacks>)>>,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a subscription. It stays active until [`Registration::unregister`].
    pub fn register(self: &Arc<Self>, callbacks: GeofenceCallbacks) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(callbacks)));
        debug!(id, "Registered geofence callbacks");

        Registration {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Copy of the current subscriptions, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<GeofenceCallbacks>> {
        self.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no active subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        before != entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Arc<GeofenceCallbacks>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}

/// Handle for removing a subscription.
#[derive(Debug)]
#[must_use = "dropping a Registration leaves the callbacks registered with no way to remove them"]
pub struct Registration {
    id: u64,
    registry: Weak<CallbackRegistry>,
}

impl Registration {
    /// Identifier of the subscription.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Remove the subscription. Returns `false` if the registry is gone.
    #[allow(clippy::needless_pass_by_value)]
    pub fn unregister(self) -> bool {
        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id));
        if removed {
            debug!(id = self.id, "Unregistered geofence callbacks");
        }
        removed
    }
}
