mod probe;
mod view;

use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{Error, Result};
use crate::record::DependencyStatus;

pub use probe::{Probe, ScriptedProbe, TcpProbe};
pub use view::{DependencySnapshot, DependencyView};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Name used in log lines.
    pub dependency: String,
    pub poll_interval: Duration,
    /// Upper bound on a single probe; an overrunning probe counts as unavailable.
    pub probe_timeout: Duration,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidDuration("pollInterval"));
        }
        if self.probe_timeout.is_zero() {
            return Err(Error::InvalidDuration("probeTimeout"));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dependency: "dependency".to_string(),
            poll_interval: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: DependencyStatus,
    pub at: SystemTime,
    /// Only set on recovery: time since the matching disconnect.
    pub downtime: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outage {
    pub started_at: SystemTime,
    pub downtime: Duration,
    /// False when the run ended while the dependency was still down.
    pub recovered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub initial: DependencyStatus,
    pub final_status: DependencyStatus,
    /// Polls after the initial probe.
    pub polls: u64,
    pub transitions: Vec<Transition>,
    /// Length of the outage still in progress when the monitor stopped.
    pub open_downtime: Option<Duration>,
}

impl MonitorReport {
    #[must_use]
    pub fn outages(&self) -> Vec<Outage> {
        let mut out = Vec::new();
        let mut started: Option<SystemTime> = None;
        for t in &self.transitions {
            match t.to {
                DependencyStatus::Unavailable => started = Some(t.at),
                DependencyStatus::Available => {
                    if let Some(started_at) = started.take() {
                        out.push(Outage {
                            started_at,
                            downtime: t.downtime.unwrap_or_default(),
                            recovered: true,
                        });
                    }
                }
            }
        }

        if let Some(downtime) = self.open_downtime {
            // The run may have started during an outage, in which case there is no
            // down-transition to anchor on.
            let started_at = started.unwrap_or_else(|| {
                SystemTime::now()
                    .checked_sub(downtime)
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            });
            out.push(Outage {
                started_at,
                downtime,
                recovered: false,
            });
        }
        out
    }

    #[must_use]
    pub fn total_downtime(&self) -> Duration {
        self.outages().iter().map(|o| o.downtime).sum()
    }
}

/// Two-state machine behind the monitor. Pure: callers supply the clock.
#[derive(Debug, Clone)]
pub struct DependencyTracker {
    connected: bool,
    last_transition_at: Instant,
    disconnect_started_at: Option<Instant>,
}

impl DependencyTracker {
    #[must_use]
    pub fn new(connected: bool, now: Instant) -> Self {
        Self {
            connected,
            last_transition_at: now,
            disconnect_started_at: (!connected).then_some(now),
        }
    }

    /// Feed one probe result. Returns the transition if the state changed.
    pub fn observe(
        &mut self,
        connected: bool,
        now: Instant,
        wall: SystemTime,
    ) -> Option<Transition> {
        if connected == self.connected {
            return None;
        }

        self.connected = connected;
        self.last_transition_at = now;

        let downtime = if connected {
            self.disconnect_started_at
                .take()
                .map(|started| now.saturating_duration_since(started))
        } else {
            self.disconnect_started_at = Some(now);
            None
        };

        Some(Transition {
            to: DependencyStatus::from_connected(connected),
            at: wall,
            downtime,
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> DependencySnapshot {
        DependencySnapshot {
            connected: self.connected,
            last_transition_at: self.last_transition_at,
            disconnect_started_at: self.disconnect_started_at,
        }
    }
}

/// Background poller handle. Dropping it cancels the poll loop.
#[derive(Debug)]
pub struct MonitorHandle {
    view: DependencyView,
    guard: DropGuard,
    task: JoinHandle<MonitorReport>,
}

impl MonitorHandle {
    #[must_use]
    pub fn view(&self) -> DependencyView {
        self.view.clone()
    }

    /// Cancel the poll loop and wait for its report.
    pub async fn stop(self) -> Result<MonitorReport> {
        let Self { guard, task, .. } = self;
        guard.disarm().cancel();
        Ok(task.await?)
    }
}

/// Run the initial probe, then keep polling in a background task until stopped.
pub async fn start<P: Probe>(mut probe: P, cfg: MonitorConfig) -> Result<MonitorHandle> {
    cfg.validate()?;

    let connected = probe_once(&mut probe, cfg.probe_timeout).await;
    let tracker = DependencyTracker::new(connected, Instant::now());
    let initial = DependencyStatus::from_connected(connected);

    if connected {
        tracing::info!(dependency = %cfg.dependency, "dependency available");
    } else {
        tracing::warn!(dependency = %cfg.dependency, "dependency unavailable at start");
    }

    let (tx, rx) = watch::channel(tracker.snapshot());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(poll_loop(probe, cfg, tracker, initial, tx, cancel.clone()));

    Ok(MonitorHandle {
        view: DependencyView::new(rx),
        guard: cancel.drop_guard(),
        task,
    })
}

async fn probe_once<P: Probe>(probe: &mut P, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, probe.probe())
        .await
        .unwrap_or(false)
}

async fn poll_loop<P: Probe>(
    mut probe: P,
    cfg: MonitorConfig,
    mut tracker: DependencyTracker,
    initial: DependencyStatus,
    tx: watch::Sender<DependencySnapshot>,
    cancel: CancellationToken,
) -> MonitorReport {
    let mut ticker = tokio::time::interval(cfg.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; the initial probe already covered it.
    ticker.tick().await;

    let mut polls = 0u64;
    let mut transitions = Vec::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            c = probe_once(&mut probe, cfg.probe_timeout) => c,
        };
        polls += 1;

        if let Some(t) = tracker.observe(connected, Instant::now(), SystemTime::now()) {
            match t.downtime {
                Some(downtime) => tracing::info!(
                    dependency = %cfg.dependency,
                    downtime = ?downtime,
                    "dependency recovered"
                ),
                None => {
                    tracing::warn!(dependency = %cfg.dependency, "dependency became unavailable")
                }
            }
            transitions.push(t);
            tx.send_replace(tracker.snapshot());
        }
    }

    let snapshot = tracker.snapshot();
    MonitorReport {
        initial,
        final_status: snapshot.status(),
        polls,
        transitions,
        open_downtime: snapshot.current_downtime(Instant::now()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const INTERVAL: Duration = Duration::from_secs(2);

    fn cfg() -> MonitorConfig {
        MonitorConfig {
            poll_interval: INTERVAL,
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn tracker_sets_and_clears_disconnect_start() {
        let t0 = Instant::now();
        let wall = SystemTime::now();
        let mut tracker = DependencyTracker::new(true, t0);

        assert_eq!(tracker.observe(true, t0 + INTERVAL, wall), None);

        let down = tracker.observe(false, t0 + INTERVAL * 2, wall).unwrap();
        assert_eq!(down.to, DependencyStatus::Unavailable);
        assert_eq!(down.downtime, None);
        assert_eq!(tracker.snapshot().disconnect_started_at, Some(t0 + INTERVAL * 2));

        assert_eq!(tracker.observe(false, t0 + INTERVAL * 3, wall), None);

        let up = tracker.observe(true, t0 + INTERVAL * 4, wall).unwrap();
        assert_eq!(up.to, DependencyStatus::Available);
        assert_eq!(up.downtime, Some(INTERVAL * 2));
        assert_eq!(tracker.snapshot().disconnect_started_at, None);
        assert_eq!(tracker.snapshot().last_transition_at, t0 + INTERVAL * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_outage_yields_one_down_and_one_up() {
        let probe = ScriptedProbe::new([true, true, false, false, true]);
        let handle = start(probe, cfg()).await.unwrap();
        let view = handle.view();
        assert_eq!(view.status(), DependencyStatus::Available);

        tokio::time::sleep(INTERVAL * 6 + Duration::from_millis(10)).await;
        let report = handle.stop().await.unwrap();

        assert_eq!(report.initial, DependencyStatus::Available);
        assert_eq!(report.final_status, DependencyStatus::Available);
        assert_eq!(report.transitions.len(), 2);
        assert_eq!(report.transitions[0].to, DependencyStatus::Unavailable);
        assert_eq!(report.transitions[1].to, DependencyStatus::Available);

        let downtime = report.transitions[1].downtime.unwrap();
        assert!(
            downtime >= INTERVAL && downtime <= INTERVAL * 2 + Duration::from_millis(1),
            "downtime={downtime:?}"
        );

        let outages = report.outages();
        assert_eq!(outages.len(), 1);
        assert!(outages[0].recovered);
        assert_eq!(report.total_downtime(), downtime);
        assert_eq!(report.open_downtime, None);
    }

    #[tokio::test(start_paused = true)]
    async fn view_follows_transitions() {
        let probe = ScriptedProbe::new([true, false]);
        let handle = start(probe, cfg()).await.unwrap();
        let view = handle.view();
        assert_eq!(view.status(), DependencyStatus::Available);

        tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(view.status(), DependencyStatus::Unavailable);
        assert!(view.snapshot().disconnect_started_at.is_some());

        let report = handle.stop().await.unwrap();
        assert_eq!(report.final_status, DependencyStatus::Unavailable);
        let outages = report.outages();
        assert_eq!(outages.len(), 1);
        assert!(!outages[0].recovered);
    }

    struct HangingProbe;

    impl Probe for HangingProbe {
        async fn probe(&mut self) -> bool {
            std::future::pending::<()>().await;
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probe_overrunning_its_timeout_counts_as_unavailable() {
        let handle = start(HangingProbe, cfg()).await.unwrap();
        assert_eq!(handle.view().status(), DependencyStatus::Unavailable);

        // Stopping must not wait for the hung probe.
        tokio::time::sleep(INTERVAL + Duration::from_millis(500)).await;
        let report = handle.stop().await.unwrap();
        assert_eq!(report.initial, DependencyStatus::Unavailable);
        assert!(report.transitions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_ends_the_loop() {
        let handle = start(ScriptedProbe::constant(true), cfg()).await.unwrap();
        let view = handle.view();
        drop(handle);
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(view.status(), DependencyStatus::Available);
    }

    #[tokio::test]
    async fn zero_poll_interval_is_rejected_up_front() {
        let zero = MonitorConfig {
            poll_interval: Duration::ZERO,
            ..MonitorConfig::default()
        };
        let err = start(ScriptedProbe::constant(true), zero).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDuration("pollInterval")));
    }

    /// Each check takes three intervals; missed ticks are dropped, not replayed.
    struct SlowCheck;

    impl Probe for SlowCheck {
        async fn probe(&mut self) -> bool {
            tokio::time::sleep(INTERVAL * 3).await;
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_polls_skip_missed_ticks() {
        let slow = MonitorConfig {
            probe_timeout: INTERVAL * 10,
            ..cfg()
        };
        let handle = start(SlowCheck, slow).await.unwrap();

        tokio::time::sleep(INTERVAL * 20).await;
        let report = handle.stop().await.unwrap();

        // At most one poll per 4 intervals: 3 checking plus the wait for the next tick.
        assert!(report.polls <= 5, "polls={}", report.polls);
        assert!(report.polls >= 3, "polls={}", report.polls);
    }
}
