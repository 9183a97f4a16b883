//! Weighted average over several independent trackers.

use std::sync::{Arc, Weak};

use super::{ProgressEvent, ProgressTracker, ProgressView, SubscriptionId};

struct Shared {
    children: Vec<(ProgressTracker, f64)>,
    output: ProgressTracker,
}

impl Shared {
    fn compute(&self) -> f64 {
        let total: f64 = self.children.iter().map(|(_, weight)| weight).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = self
            .children
            .iter()
            .map(|(child, weight)| child.progress() * weight)
            .sum();
        weighted / total
    }
}

/// Combines child trackers into one averaged tracker.
///
/// Any child change recomputes `Σ(progress · weight) / Σ(weight)` and
/// republishes it on the aggregate. Child status lines are forwarded as-is.
/// With zero total weight the aggregate reports 0.
pub struct AggregateProgressTracker {
    shared: Arc<Shared>,
    subscriptions: Vec<(ProgressTracker, SubscriptionId)>,
}

impl AggregateProgressTracker {
    /// Equal-weight average of the children.
    pub fn new(children: Vec<ProgressTracker>) -> Self {
        Self::weighted(children.into_iter().map(|child| (child, 1.0)).collect())
    }

    /// Weighted average; negative or non-finite weights count as zero.
    pub fn weighted(children: Vec<(ProgressTracker, f64)>) -> Self {
        let children: Vec<(ProgressTracker, f64)> = children
            .into_iter()
            .map(|(child, weight)| {
                let weight = if weight.is_finite() && weight > 0.0 {
                    weight
                } else {
                    0.0
                };
                (child, weight)
            })
            .collect();

        let shared = Arc::new(Shared {
            children,
            output: ProgressTracker::new(),
        });
        shared.output.set_progress(shared.compute());

        let subscriptions = shared
            .children
            .iter()
            .map(|(child, _)| {
                // Weak so the children never keep the aggregate alive
                let weak: Weak<Shared> = Arc::downgrade(&shared);
                let id = child.subscribe(move |event| {
                    if let Some(shared) = weak.upgrade() {
                        if let ProgressEvent::Status(status) = event {
                            shared.output.set_status(status.clone());
                        }
                        shared.output.set_progress(shared.compute());
                    }
                });
                (child.clone(), id)
            })
            .collect();

        Self {
            shared,
            subscriptions,
        }
    }

    pub fn progress(&self) -> f64 {
        self.shared.output.progress()
    }

    pub fn status(&self) -> String {
        self.shared.output.status()
    }

    pub fn len(&self) -> usize {
        self.shared.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.children.is_empty()
    }

    /// Read-only view of the aggregated value.
    pub fn view(&self) -> ProgressView {
        self.shared.output.view()
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.shared.output.subscribe(observer)
    }
}

impl Drop for AggregateProgressTracker {
    fn drop(&mut self) {
        for (child, id) in self.subscriptions.drain(..) {
            child.unsubscribe(id);
        }
    }
}
