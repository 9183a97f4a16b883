//! Observable progress and status cells.
//!
//! A [`ProgressTracker`] holds a progress value in `0.0..=1.0` and a status
//! line. Every write notifies subscribers synchronously on the writing
//! thread, in write order, without de-duplication.

pub mod aggregate;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub use aggregate::AggregateProgressTracker;

/// Change published by a tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(f64),
    Status(String),
}

/// Identifies a subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Default)]
struct State {
    progress: f64,
    status: String,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_id: AtomicU64,
}

/// Shared, thread-safe progress cell. Clones refer to the same cell.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Observers run outside the locks, so a poisoned lock still holds valid data
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> f64 {
        lock(&self.shared.state).progress
    }

    pub fn status(&self) -> String {
        lock(&self.shared.state).status.clone()
    }

    /// Sets the progress and notifies subscribers, even if unchanged.
    ///
    /// Values are clamped to `0.0..=1.0`; NaN is treated as 0. Decreasing
    /// values are allowed.
    pub fn set_progress(&self, progress: f64) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        lock(&self.shared.state).progress = progress;
        log::trace!("Progress -> {progress:.3}");
        self.publish(&ProgressEvent::Progress(progress));
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        lock(&self.shared.state).status = status.clone();
        self.publish(&ProgressEvent::Status(status));
    }

    /// Registers an observer called on every write.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.observers).push((id, Arc::new(observer)));
        id
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = lock(&self.shared.observers);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Creates a child tracker mapped onto `start..start + span` of this one.
    ///
    /// Child progress `p` becomes parent progress `start + p * span`; status
    /// writes are forwarded unchanged.
    pub fn sub_range(&self, start: f64, span: f64) -> ProgressTracker {
        let child = ProgressTracker::new();
        let parent = self.clone();
        child.subscribe(move |event| match event {
            ProgressEvent::Progress(p) => parent.set_progress(start + p * span),
            ProgressEvent::Status(status) => parent.set_status(status.clone()),
        });
        child
    }

    /// Read-only handle for consumers that must not write.
    pub fn view(&self) -> ProgressView {
        ProgressView {
            tracker: self.clone(),
        }
    }

    fn publish(&self, event: &ProgressEvent) {
        // Snapshot so observers may subscribe or unsubscribe re-entrantly
        let observers: Vec<Observer> = lock(&self.shared.observers)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(event);
        }
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("ProgressTracker")
            .field("progress", &state.progress)
            .field("status", &state.status)
            .finish()
    }
}

/// Read-only view of a [`ProgressTracker`].
#[derive(Debug, Clone)]
pub struct ProgressView {
    tracker: ProgressTracker,
}

impl ProgressView {
    pub fn progress(&self) -> f64 {
        self.tracker.progress()
    }

    pub fn status(&self) -> String {
        self.tracker.status()
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.tracker.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.tracker.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tracker: &ProgressTracker) -> Arc<Mutex<Vec<ProgressEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        tracker.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn every_write_is_published() {
        let tracker = ProgressTracker::new();
        let events = record(&tracker);

        tracker.set_progress(0.5);
        tracker.set_progress(0.5);
        tracker.set_progress(0.2);
        tracker.set_status("uploading");

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ProgressEvent::Progress(0.5),
                ProgressEvent::Progress(0.5),
                ProgressEvent::Progress(0.2),
                ProgressEvent::Status("uploading".into()),
            ]
        );
        assert_eq!(tracker.progress(), 0.2);
        assert_eq!(tracker.status(), "uploading");
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let tracker = ProgressTracker::new();
        tracker.set_progress(1.7);
        assert_eq!(tracker.progress(), 1.0);
        tracker.set_progress(-0.3);
        assert_eq!(tracker.progress(), 0.0);
        tracker.set_progress(f64::NAN);
        assert_eq!(tracker.progress(), 0.0);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let tracker = ProgressTracker::new();
        let events = Arc::new(Mutex::new(0usize));
        let sink = events.clone();
        let id = tracker.subscribe(move |_| *sink.lock().unwrap() += 1);

        tracker.set_progress(0.1);
        assert!(tracker.unsubscribe(id));
        assert!(!tracker.unsubscribe(id));
        tracker.set_progress(0.2);

        assert_eq!(*events.lock().unwrap(), 1);
    }

    #[test]
    fn sub_range_maps_into_parent() {
        let parent = ProgressTracker::new();
        let child = parent.sub_range(0.5, 0.25);

        child.set_progress(0.0);
        assert_eq!(parent.progress(), 0.5);
        child.set_progress(0.5);
        assert_eq!(parent.progress(), 0.625);
        child.set_progress(1.0);
        assert_eq!(parent.progress(), 0.75);

        child.set_status("step");
        assert_eq!(parent.status(), "step");
    }

    #[test]
    fn view_reads_and_subscribes() {
        let tracker = ProgressTracker::new();
        let view = tracker.view();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        view.subscribe(move |event| *sink.lock().unwrap() = Some(event.clone()));

        tracker.set_progress(0.4);
        assert_eq!(view.progress(), 0.4);
        assert_eq!(*seen.lock().unwrap(), Some(ProgressEvent::Progress(0.4)));
    }
}
