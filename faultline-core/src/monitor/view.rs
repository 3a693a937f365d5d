use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::record::DependencyStatus;

/// Copy of the monitor's belief about the dependency at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencySnapshot {
    pub connected: bool,
    pub last_transition_at: Instant,
    /// Set on available -> unavailable, cleared on the next recovery.
    pub disconnect_started_at: Option<Instant>,
}

impl DependencySnapshot {
    #[must_use]
    pub fn status(&self) -> DependencyStatus {
        DependencyStatus::from_connected(self.connected)
    }

    /// Length of the ongoing outage as of `now`, if one is open.
    #[must_use]
    pub fn current_downtime(&self, now: Instant) -> Option<Duration> {
        self.disconnect_started_at
            .map(|started| now.saturating_duration_since(started))
    }
}

/// Read side of the dependency state. Cheap to clone, never blocks, never mutates.
#[derive(Debug, Clone)]
pub struct DependencyView {
    rx: watch::Receiver<DependencySnapshot>,
}

impl DependencyView {
    pub(crate) fn new(rx: watch::Receiver<DependencySnapshot>) -> Self {
        Self { rx }
    }

    /// A view pinned to `status`, for runs without a monitor.
    #[must_use]
    pub fn fixed(status: DependencyStatus) -> Self {
        let now = Instant::now();
        let connected = status == DependencyStatus::Available;
        let (_tx, rx) = watch::channel(DependencySnapshot {
            connected,
            last_transition_at: now,
            disconnect_started_at: (!connected).then_some(now),
        });
        Self { rx }
    }

    #[must_use]
    pub fn snapshot(&self) -> DependencySnapshot {
        *self.rx.borrow()
    }

    #[must_use]
    pub fn status(&self) -> DependencyStatus {
        self.snapshot().status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_view_survives_sender_drop() {
        let view = DependencyView::fixed(DependencyStatus::Unavailable);
        assert_eq!(view.status(), DependencyStatus::Unavailable);
        assert!(view.snapshot().disconnect_started_at.is_some());

        let view = DependencyView::fixed(DependencyStatus::Available);
        assert_eq!(view.clone().status(), DependencyStatus::Available);
        assert_eq!(view.snapshot().current_downtime(Instant::now()), None);
    }
}
