//! Listener registry and event fan-out.
//!
//! Dispatch snapshots the listener list for the event kind, releases the
//! lock, invokes every snapshotted listener in registration order, and
//! finally removes the `once` entries that fired. Listeners may freely add
//! or remove listeners while being invoked: additions are not seen by the
//! in-flight event and removals do not skip anyone else.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{error, trace};

use super::event::{Event, EventKind};

// ============================================================================
// Types
// ============================================================================

/// Listener callback invoked with the dispatch target and the event.
///
/// Identity is the `Arc` allocation: clone the `Arc` you registered to
/// remove it later.
pub type Callback<T> = Arc<dyn Fn(&T, &Event) + Send + Sync>;

/// Wraps a closure into a [`Callback`].
#[inline]
pub fn listener<T, F>(f: F) -> Callback<T>
where
    F: Fn(&T, &Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-registration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ListenerOptions {
    /// Remove the listener after its next invocation.
    pub once: bool,
}

impl ListenerOptions {
    /// Options for a one-shot listener.
    #[inline]
    #[must_use]
    pub const fn once() -> Self {
        Self { once: true }
    }
}

/// A single registration.
struct Entry<T> {
    id: u64,
    callback: Callback<T>,
    options: Option<ListenerOptions>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
            options: self.options,
        }
    }
}

impl<T> Entry<T> {
    #[inline]
    fn is_once(&self) -> bool {
        self.options.is_some_and(|o| o.once)
    }

    /// Removal matches callback identity and options equality.
    #[inline]
    fn matches(&self, callback: &Callback<T>, options: Option<ListenerOptions>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.callback), Arc::as_ptr(callback))
            && self.options == options
    }
}

// ============================================================================
// ListenerTable
// ============================================================================

/// Ordered listener lists keyed by event kind.
///
/// Duplicate registrations of the same callback are kept and each one is
/// invoked.
pub struct ListenerTable<T> {
    entries: FxHashMap<EventKind, Vec<Entry<T>>>,
    next_id: u64,
}

impl<T> Default for ListenerTable<T> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            next_id: 0,
        }
    }
}

impl<T> ListenerTable<T> {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener for `kind`.
    pub fn add(
        &mut self,
        kind: EventKind,
        callback: Callback<T>,
        options: Option<ListenerOptions>,
    ) {
        let id = self.next_id;
        self.next_id += 1;

        self.entries.entry(kind).or_default().push(Entry {
            id,
            callback,
            options,
        });
    }

    /// Removes every entry for `kind` registered with this callback and
    /// these options. Returns the number of entries removed.
    pub fn remove(
        &mut self,
        kind: EventKind,
        callback: &Callback<T>,
        options: Option<ListenerOptions>,
    ) -> usize {
        let Some(list) = self.entries.get_mut(&kind) else {
            return 0;
        };

        let before = list.len();
        list.retain(|entry| !entry.matches(callback, options));
        before - list.len()
    }

    /// Returns the number of listeners registered for `kind`.
    #[inline]
    #[must_use]
    pub fn len(&self, kind: EventKind) -> usize {
        self.entries.get(&kind).map_or(0, Vec::len)
    }

    /// Returns `true` if no listener is registered for any kind.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Entry<T>> {
        self.entries.get(&kind).cloned().unwrap_or_default()
    }

    fn remove_ids(&mut self, kind: EventKind, ids: &[u64]) {
        if let Some(list) = self.entries.get_mut(&kind) {
            list.retain(|entry| !ids.contains(&entry.id));
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Thread-safe listener registry that fans events out to listeners.
pub struct Dispatcher<T> {
    table: Mutex<ListenerTable<T>>,
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self {
            table: Mutex::new(ListenerTable::new()),
        }
    }
}

impl<T> Dispatcher<T> {
    /// Creates a dispatcher with no listeners.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `kind`.
    pub fn add_listener(
        &self,
        kind: EventKind,
        callback: Callback<T>,
        options: Option<ListenerOptions>,
    ) {
        self.table.lock().add(kind, callback, options);
    }

    /// Unregisters a listener for `kind`. Returns the number removed.
    pub fn remove_listener(
        &self,
        kind: EventKind,
        callback: &Callback<T>,
        options: Option<ListenerOptions>,
    ) -> usize {
        self.table.lock().remove(kind, callback, options)
    }

    /// Returns the number of listeners registered for `kind`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.table.lock().len(kind)
    }

    /// Delivers `event` to every listener registered for its kind.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still receive the event. Returns the number of listeners invoked.
    pub fn dispatch(&self, target: &T, event: &Event) -> usize {
        let kind = event.kind();
        let snapshot = self.table.lock().snapshot(kind);

        if snapshot.is_empty() {
            return 0;
        }

        let mut fired_once = Vec::new();

        for entry in &snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.callback)(target, event)));

            if outcome.is_err() {
                error!(%kind, listener = entry.id, "Event listener panicked");
            }

            if entry.is_once() {
                fired_once.push(entry.id);
            }
        }

        if !fired_once.is_empty() {
            self.table.lock().remove_ids(kind, &fired_once);
        }

        trace!(%kind, listeners = snapshot.len(), "Event dispatched");

        snapshot.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_tungstenite::tungstenite::Message;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, name: &'static str) -> Callback<()> {
        let log = Arc::clone(log);
        listener(move |_, _| log.lock().push(name))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        dispatcher.add_listener(EventKind::Open, recorder(&log, "a"), None);
        dispatcher.add_listener(EventKind::Open, recorder(&log, "b"), None);
        dispatcher.add_listener(EventKind::Close, recorder(&log, "c"), None);

        assert_eq!(dispatcher.dispatch(&(), &Event::Open), 2);
        assert_eq!(*log.lock(), ["a", "b"]);
    }

    #[test]
    fn test_duplicates_are_invoked_twice() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        let callback = recorder(&log, "dup");

        dispatcher.add_listener(EventKind::Open, Arc::clone(&callback), None);
        dispatcher.add_listener(EventKind::Open, callback, None);

        dispatcher.dispatch(&(), &Event::Open);
        assert_eq!(*log.lock(), ["dup", "dup"]);
    }

    #[test]
    fn test_once_listener_removed_after_dispatch() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        let once = Some(ListenerOptions::once());
        dispatcher.add_listener(EventKind::Open, recorder(&log, "once"), once);
        dispatcher.add_listener(EventKind::Open, recorder(&log, "always"), None);

        dispatcher.dispatch(&(), &Event::Open);
        dispatcher.dispatch(&(), &Event::Open);

        assert_eq!(*log.lock(), ["once", "always", "always"]);
        assert_eq!(dispatcher.listener_count(EventKind::Open), 1);
    }

    #[test]
    fn test_once_cleanup_keeps_duplicate_persistent_registration() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        let callback = recorder(&log, "x");

        let once = Some(ListenerOptions::once());
        dispatcher.add_listener(EventKind::Open, Arc::clone(&callback), once);
        dispatcher.add_listener(EventKind::Open, callback, None);

        dispatcher.dispatch(&(), &Event::Open);
        assert_eq!(dispatcher.listener_count(EventKind::Open), 1);

        dispatcher.dispatch(&(), &Event::Open);
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn test_remove_requires_matching_options() {
        let dispatcher = Dispatcher::<()>::new();
        let callback: Callback<()> = listener(|_, _| {});
        let other: Callback<()> = listener(|_, _| {});

        let once = Some(ListenerOptions::once());
        dispatcher.add_listener(EventKind::Message, Arc::clone(&callback), once);
        dispatcher.add_listener(EventKind::Message, Arc::clone(&callback), None);
        dispatcher.add_listener(EventKind::Message, Arc::clone(&other), once);

        // Same callback, different options: only the exact match goes.
        assert_eq!(dispatcher.remove_listener(EventKind::Message, &callback, None), 1);
        assert_eq!(dispatcher.listener_count(EventKind::Message), 2);

        // Options alone never match a different callback.
        assert_eq!(dispatcher.remove_listener(EventKind::Message, &callback, once), 1);
        assert_eq!(dispatcher.listener_count(EventKind::Message), 1);

        // Wrong kind removes nothing.
        assert_eq!(
            dispatcher.remove_listener(EventKind::Open, &other, Some(ListenerOptions::once())),
            0
        );
    }

    #[test]
    fn test_removal_during_dispatch_does_not_skip_others() {
        let dispatcher = Arc::new(Dispatcher::<()>::new());
        let log = Log::default();
        let victim = recorder(&log, "victim");

        let remover: Callback<()> = {
            let dispatcher = Arc::clone(&dispatcher);
            let victim = Arc::clone(&victim);
            let log = Arc::clone(&log);
            listener(move |_, _| {
                log.lock().push("remover");
                dispatcher.remove_listener(EventKind::Open, &victim, None);
            })
        };

        dispatcher.add_listener(EventKind::Open, remover, None);
        dispatcher.add_listener(EventKind::Open, victim, None);
        dispatcher.add_listener(EventKind::Open, recorder(&log, "tail"), None);

        dispatcher.dispatch(&(), &Event::Open);
        assert_eq!(*log.lock(), ["remover", "victim", "tail"]);

        log.lock().clear();
        dispatcher.dispatch(&(), &Event::Open);
        assert_eq!(*log.lock(), ["remover", "tail"]);
    }

    #[test]
    fn test_added_during_dispatch_not_invoked_for_inflight_event() {
        let dispatcher = Arc::new(Dispatcher::<()>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let adder: Callback<()> = {
            let dispatcher = Arc::clone(&dispatcher);
            let calls = Arc::clone(&calls);
            listener(move |_, _| {
                let calls = Arc::clone(&calls);
                dispatcher.add_listener(
                    EventKind::Open,
                    listener(move |_, _| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }),
                    None,
                );
            })
        };

        dispatcher.add_listener(EventKind::Open, adder, Some(ListenerOptions::once()));

        assert_eq!(dispatcher.dispatch(&(), &Event::Open), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        dispatcher.dispatch(&(), &Event::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        let panicking = listener(|_, _| panic!("listener failure"));
        dispatcher.add_listener(EventKind::Message, panicking, None);
        dispatcher.add_listener(EventKind::Message, recorder(&log, "after"), None);

        let invoked = dispatcher.dispatch(&(), &Event::Message(Message::text("x")));
        assert_eq!(invoked, 2);
        assert_eq!(*log.lock(), ["after"]);
    }

    #[test]
    fn test_table_is_empty() {
        let mut table = ListenerTable::<()>::new();
        assert!(table.is_empty());

        let callback: Callback<()> = listener(|_, _| {});
        table.add(EventKind::Retry, Arc::clone(&callback), None);
        assert!(!table.is_empty());
        assert_eq!(table.len(EventKind::Retry), 1);

        table.remove(EventKind::Retry, &callback, None);
        assert!(table.is_empty());
    }
}
