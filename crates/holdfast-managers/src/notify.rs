use std::sync::RwLock;

/// Which persistent domain a change belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    Favorites,
    Ratings,
    AutoLoad,
    Whitelist,
    Thumbnails,
}

/// A change notification raised after a successful set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub domain: Domain,
    pub key: String,
}

type Subscriber = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Synchronous fan-out of change events to registered subscribers.
///
/// UI collaborators subscribe once and refresh on notification instead of
/// polling. Delivery happens on the mutating thread, after the store call
/// succeeded; subscribers must be brief and must not call back into the
/// publishing manager.
#[derive(Default)]
pub struct ChangeRouter {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl std::fmt::Debug for ChangeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .subscribers
            .read()
            .map(|subs| subs.len())
            .unwrap_or(0);
        f.debug_struct("ChangeRouter")
            .field("subscribers", &count)
            .finish()
    }
}

impl ChangeRouter {
    /// Create a router with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for all change events.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .expect("router lock poisoned")
            .push(Box::new(callback));
    }

    /// Deliver an event to every subscriber, in registration order.
    pub fn publish(&self, event: &ChangeEvent) {
        let subs = self.subscribers.read().expect("router lock poisoned");
        for sub in subs.iter() {
            sub(event);
        }
    }
}
