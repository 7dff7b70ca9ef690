//! Double-buffered event listener.
//!
//! Events scheduled during tick N sit in the scheduled buffer until the
//! cleanup of tick N, when they are swapped into the published buffer.
//! Executors read them during tick N+1; at the cleanup of tick N+1 every
//! subscriber receives the whole batch once and the buffer is cleared.
//!
//! ```text
//!            schedule              cleanup                cleanup
//!   Idle ─────────────▶ Scheduled ─────────▶ Published ─────────▶ Idle
//!                                               │  ▲
//!                                      schedule │  │ cleanup
//!                                               ▼  │
//!                                    PublishedAndScheduled
//! ```
//!
//! A listener with work pending sits in the feature's active list; it
//! leaves the list on the cleanup that finds nothing left to do.

use std::{
    any::type_name,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::event::WorldEvent;

/// Where a listener is in its publish cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerPhase {
    /// Nothing scheduled, nothing published.
    Idle,
    /// Events are waiting for the next cleanup.
    Scheduled,
    /// Events are visible this tick and dispatched at the next cleanup.
    Published,
    /// Both of the above.
    PublishedAndScheduled,
}

impl ListenerPhase {
    const fn has_published(self) -> bool {
        matches!(self, Self::Published | Self::PublishedAndScheduled)
    }

    const fn with_scheduled(self) -> Self {
        match self {
            Self::Idle | Self::Scheduled => Self::Scheduled,
            Self::Published | Self::PublishedAndScheduled => Self::PublishedAndScheduled,
        }
    }
}

/// Handle returned by [`EventListener::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Result of one listener update.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct UpdateOutcome {
    pub(crate) stay_active: bool,
    pub(crate) panicked: usize,
}

/// Type-erased listener, as stored in the active list.
pub(crate) trait UpdateListener: Send + Sync {
    fn update(&self) -> UpdateOutcome;

    fn event_name(&self) -> &'static str;
}

/// Listeners with pending work.
pub(crate) type ActiveList = Arc<Mutex<Vec<Arc<dyn UpdateListener>>>>;

type Callback<T> = Box<dyn FnMut(&[T]) + Send>;

struct Subscriber<T> {
    id: SubscriptionId,
    callback: Callback<T>,
}

struct ListenerState<T> {
    phase: ListenerPhase,
    scheduled: Vec<T>,
    published: Arc<Vec<T>>,
    subscribers: Vec<Subscriber<T>>,
    next_subscription: u64,
    /// Subscribers are checked out while a dispatch is running.
    dispatching: bool,
    /// Unsubscribed while checked out.
    cancelled: Vec<SubscriptionId>,
    /// Present in the active list.
    enqueued: bool,
}

pub(crate) struct ListenerCore<T> {
    state: Mutex<ListenerState<T>>,
    active: ActiveList,
}

impl<T: WorldEvent> UpdateListener for ListenerCore<T> {
    fn update(&self) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        let checked_out = {
            let mut state = self.state.lock();
            if state.phase.has_published() {
                state.dispatching = true;
                Some((
                    std::mem::take(&mut state.published),
                    std::mem::take(&mut state.subscribers),
                ))
            } else {
                None
            }
        };

        if let Some((events, mut subscribers)) = checked_out {
            for subscriber in &mut subscribers {
                let result = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(&events)));
                if result.is_err() {
                    outcome.panicked += 1;
                    error!(
                        event = type_name::<T>(),
                        subscription = subscriber.id.0,
                        "event subscriber panicked"
                    );
                }
            }

            let mut state = self.state.lock();
            let added = std::mem::replace(&mut state.subscribers, subscribers);
            state.subscribers.extend(added);
            let cancelled = std::mem::take(&mut state.cancelled);
            state
                .subscribers
                .retain(|subscriber| !cancelled.contains(&subscriber.id));
            state.dispatching = false;
        }

        let mut state = self.state.lock();
        if state.scheduled.is_empty() {
            state.phase = ListenerPhase::Idle;
            state.enqueued = false;
        } else {
            state.published = Arc::new(std::mem::take(&mut state.scheduled));
            state.phase = ListenerPhase::Published;
            outcome.stay_active = true;
        }
        trace!(event = type_name::<T>(), phase = ?state.phase, "listener updated");
        outcome
    }

    fn event_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Shared handle to the single listener for event type `T` in a world.
///
/// Clones refer to the same listener.
pub struct EventListener<T: WorldEvent> {
    core: Arc<ListenerCore<T>>,
}

impl<T: WorldEvent> Clone for EventListener<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: WorldEvent> fmt::Debug for EventListener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("EventListener")
            .field("event", &type_name::<T>())
            .field("phase", &state.phase)
            .field("scheduled", &state.scheduled.len())
            .field("published", &state.published.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl<T: WorldEvent> EventListener<T> {
    pub(crate) fn new(active: ActiveList) -> Self {
        Self {
            core: Arc::new(ListenerCore {
                state: Mutex::new(ListenerState {
                    phase: ListenerPhase::Idle,
                    scheduled: Vec::new(),
                    published: Arc::default(),
                    subscribers: Vec::new(),
                    next_subscription: 0,
                    dispatching: false,
                    cancelled: Vec::new(),
                    enqueued: false,
                }),
                active,
            }),
        }
    }

    /// Queue `event` for publication at the end of this tick.
    pub fn schedule(&self, event: T) {
        let newly_active = {
            let mut state = self.core.state.lock();
            state.scheduled.push(event);
            state.phase = state.phase.with_scheduled();
            !std::mem::replace(&mut state.enqueued, true)
        };

        if newly_active {
            let core: Arc<dyn UpdateListener> = self.core.clone();
            self.core.active.lock().push(core);
        }
    }

    /// Queue every event in `events`.
    pub fn schedule_all(&self, events: impl IntoIterator<Item = T>) {
        for event in events {
            self.schedule(event);
        }
    }

    /// Call `callback` once per dispatch with the whole published batch.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&[T]) + Send + 'static,
    {
        let mut state = self.core.state.lock();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.subscribers.push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.core.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|subscriber| subscriber.id != id);
        if state.subscribers.len() != before {
            return true;
        }
        if state.dispatching && !state.cancelled.contains(&id) {
            state.cancelled.push(id);
            return true;
        }
        false
    }

    /// Current phase of the listener.
    #[must_use]
    pub fn phase(&self) -> ListenerPhase {
        self.core.state.lock().phase
    }

    /// Check if events are visible this tick.
    #[must_use]
    pub fn has_published_events(&self) -> bool {
        self.core.state.lock().phase.has_published()
    }

    /// Events visible this tick. Cheap to clone; holds no lock.
    #[must_use]
    pub fn published(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.core.state.lock().published)
    }

    /// Number of events waiting for the next publication.
    #[must_use]
    pub fn scheduled_len(&self) -> usize {
        self.core.state.lock().scheduled.len()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.core.state.lock().subscribers.len()
    }

    /// Whether two handles refer to the same listener.
    #[must_use]
    pub fn same_listener(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener<T: WorldEvent>() -> (EventListener<T>, ActiveList) {
        let active = ActiveList::default();
        (EventListener::new(Arc::clone(&active)), active)
    }

    fn run(active: &ActiveList) -> usize {
        let batch = std::mem::take(&mut *active.lock());
        let mut panicked = 0;
        for listener in batch {
            let outcome = listener.update();
            panicked += outcome.panicked;
            if outcome.stay_active {
                active.lock().push(listener);
            }
        }
        panicked
    }

    #[test]
    fn test_phase_cycle() {
        let (listener, active) = listener::<u32>();
        assert_eq!(listener.phase(), ListenerPhase::Idle);

        listener.schedule(1);
        listener.schedule(2);
        assert_eq!(listener.phase(), ListenerPhase::Scheduled);
        assert_eq!(active.lock().len(), 1);

        run(&active);
        assert_eq!(listener.phase(), ListenerPhase::Published);
        assert_eq!(*listener.published(), vec![1, 2]);

        listener.schedule(3);
        assert_eq!(listener.phase(), ListenerPhase::PublishedAndScheduled);
        assert_eq!(active.lock().len(), 1);

        run(&active);
        assert_eq!(*listener.published(), vec![3]);

        run(&active);
        assert_eq!(listener.phase(), ListenerPhase::Idle);
        assert!(listener.published().is_empty());
        assert!(active.lock().is_empty());
    }

    #[test]
    fn test_subscribers_see_each_batch_once() {
        let (listener, active) = listener::<&'static str>();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        listener.subscribe(move |events: &[&'static str]| sink.lock().push(events.to_vec()));

        listener.schedule("a");
        run(&active);
        assert!(seen.lock().is_empty());

        run(&active);
        run(&active);
        assert_eq!(*seen.lock(), vec![vec!["a"]]);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let (listener, active) = listener::<u8>();
        let calls = Arc::new(Mutex::new(0));

        listener.subscribe(|_events: &[u8]| panic!("bad consumer"));
        let counter = Arc::clone(&calls);
        listener.subscribe(move |events: &[u8]| *counter.lock() += events.len());

        listener.schedule(7);
        run(&active);
        listener.schedule(8);
        let panicked = run(&active);

        assert_eq!(panicked, 1);
        assert_eq!(*calls.lock(), 1);
        assert_eq!(*listener.published(), vec![8]);
        assert_eq!(listener.subscriber_count(), 2);
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let (listener, active) = listener::<u8>();
        let handle = listener.clone();
        let own_id = Arc::new(Mutex::new(None));
        let id_slot = Arc::clone(&own_id);

        let id = listener.subscribe(move |_events: &[u8]| {
            if let Some(id) = *id_slot.lock() {
                handle.unsubscribe(id);
            }
        });
        *own_id.lock() = Some(id);

        listener.schedule(1);
        run(&active);
        run(&active);
        assert_eq!(listener.subscriber_count(), 0);
        assert!(!listener.unsubscribe(id));
    }

    #[test]
    fn test_scheduling_from_a_subscriber_lands_next_cycle() {
        let (listener, active) = listener::<u32>();
        let handle = listener.clone();
        listener.subscribe(move |events: &[u32]| {
            for &event in events {
                if event < 3 {
                    handle.schedule(event + 1);
                }
            }
        });

        listener.schedule(1);
        run(&active);
        assert_eq!(*listener.published(), vec![1]);
        run(&active);
        assert_eq!(*listener.published(), vec![2]);
        run(&active);
        assert_eq!(*listener.published(), vec![3]);
        run(&active);
        assert_eq!(listener.phase(), ListenerPhase::Idle);
    }
}
