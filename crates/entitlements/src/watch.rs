use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use atrium_core::{Subscription, UserId};
use parking_lot::Mutex;

/// Callback receiving the latest stored subscription of one user.
pub type SubscriptionCallback = Arc<dyn Fn(Option<&Subscription>) + Send + Sync>;

/// Registry of subscription watchers, keyed by user.
///
/// Callbacks are invoked synchronously by [`notify`](Self::notify), outside
/// the internal lock. A callback must not synchronously trigger another
/// subscription write.
#[derive(Default)]
pub struct WatchHub {
    next_id: AtomicU64,
    watchers: Mutex<HashMap<UserId, Vec<(u64, SubscriptionCallback)>>>,
}

impl std::fmt::Debug for WatchHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHub")
            .field("watchers", &self.watcher_count())
            .finish_non_exhaustive()
    }
}

impl WatchHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `callback` for `user_id`. The watcher stays registered until
    /// the returned handle is dropped or unsubscribed.
    pub fn register(self: &Arc<Self>, user_id: &UserId, callback: SubscriptionCallback) -> WatchHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.watchers
            .lock()
            .entry(user_id.clone())
            .or_default()
            .push((id, callback));
        WatchHandle {
            hub: Arc::downgrade(self),
            user_id: user_id.clone(),
            id,
            active: true,
        }
    }

    /// Invoke every watcher of `user_id` with `sub`.
    pub fn notify(&self, user_id: &UserId, sub: Option<&Subscription>) {
        let callbacks: Vec<SubscriptionCallback> = self
            .watchers
            .lock()
            .get(user_id)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(sub);
        }
    }

    /// Total number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().values().map(Vec::len).sum()
    }

    fn remove(&self, user_id: &UserId, id: u64) {
        let mut watchers = self.watchers.lock();
        if let Some(list) = watchers.get_mut(user_id) {
            list.retain(|(existing, _)| *existing != id);
            if list.is_empty() {
                watchers.remove(user_id);
            }
        }
    }
}

/// Keeps a subscription watcher registered. Dropping it unsubscribes.
#[must_use = "dropping the handle unsubscribes immediately"]
#[derive(Debug)]
pub struct WatchHandle {
    hub: Weak<WatchHub>,
    user_id: UserId,
    id: u64,
    active: bool,
}

impl WatchHandle {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Remove the watcher now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(&self.user_id, self.id);
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, SubscriptionCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let cb: SubscriptionCallback = Arc::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, cb)
    }

    #[test]
    fn notify_reaches_only_matching_user() {
        let hub = WatchHub::new();
        let (a_count, a_cb) = counter();
        let (b_count, b_cb) = counter();
        let _a = hub.register(&UserId::new("a"), a_cb);
        let _b = hub.register(&UserId::new("b"), b_cb);

        hub.notify(&UserId::new("a"), None);
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn drop_unsubscribes() {
        let hub = WatchHub::new();
        let (count, cb) = counter();
        let handle = hub.register(&UserId::new("a"), cb);
        assert_eq!(hub.watcher_count(), 1);
        drop(handle);
        assert_eq!(hub.watcher_count(), 0);
        hub.notify(&UserId::new("a"), None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn explicit_unsubscribe_leaves_others() {
        let hub = WatchHub::new();
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        let h1 = hub.register(&UserId::new("a"), first_cb);
        let _h2 = hub.register(&UserId::new("a"), second_cb);
        h1.unsubscribe();
        hub.notify(&UserId::new("a"), None);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_outliving_hub_is_harmless() {
        let hub = WatchHub::new();
        let (_, cb) = counter();
        let handle = hub.register(&UserId::new("a"), cb);
        drop(hub);
        handle.unsubscribe();
    }

    #[test]
    fn callback_may_register_another_watcher() {
        let hub = WatchHub::new();
        let inner_hub = Arc::clone(&hub);
        let spawned = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&spawned);
        let _h = hub.register(
            &UserId::new("a"),
            Arc::new(move |_| {
                let (_, cb) = counter();
                sink.lock().push(inner_hub.register(&UserId::new("b"), cb));
            }),
        );
        hub.notify(&UserId::new("a"), None);
        assert_eq!(hub.watcher_count(), 2);
    }
}
