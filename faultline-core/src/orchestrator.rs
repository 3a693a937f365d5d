use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::config::{CredentialPool, Credentials};
use crate::error::{Error, Result};
use crate::monitor::{self, DependencyView, MonitorConfig, MonitorReport, Probe};
use crate::record::{DependencyStatus, OperationKind, ResultRecord};

/// Everything one simulated client gets. Nothing in here is shared mutably.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// 1-based, unique per run.
    pub worker_id: u64,
    pub credentials: Credentials,
    pub dependency: DependencyView,
}

/// What each worker runs.
pub trait Workload: Send + Sync + 'static {
    /// Operation of the `index`-th record a worker produces.
    fn operation_at(&self, index: u64) -> OperationKind;

    /// Records a worker produces when it runs to completion.
    fn records_per_worker(&self) -> u64 {
        1
    }

    fn run(&self, ctx: WorkerContext) -> impl Future<Output = Vec<ResultRecord>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutConfig {
    pub workers: u64,
    /// Cap on workers in flight at once; `None` launches all of them together.
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub completed: u64,
    pub total: u64,
    pub elapsed: Duration,
    pub dependency: DependencyStatus,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub worker_id: u64,
    pub records: Vec<ResultRecord>,
    /// The worker task died; `records` are stand-ins.
    pub faulted: bool,
}

#[derive(Debug, Clone)]
pub struct FanOutReport {
    /// One per worker, in worker id order.
    pub outcomes: Vec<WorkerOutcome>,
    pub wall_clock: Duration,
}

impl FanOutReport {
    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.outcomes.iter().flat_map(|o| o.records.iter())
    }

    #[must_use]
    pub fn into_records(self) -> Vec<ResultRecord> {
        self.outcomes.into_iter().flat_map(|o| o.records).collect()
    }

    pub fn faulted_workers(&self) -> usize {
        self.outcomes.iter().filter(|o| o.faulted).count()
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub fan_out: FanOutReport,
    pub monitor: Option<MonitorReport>,
    /// Set when the monitor task died; the fan-out is still complete.
    pub monitor_error: Option<String>,
}

/// Ticks progress when dropped, so a panicking worker is still counted.
struct CompletionTick {
    completed: Arc<AtomicU64>,
    total: u64,
    started: Instant,
    dependency: DependencyView,
    progress: ProgressFn,
}

impl Drop for CompletionTick {
    fn drop(&mut self) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        (self.progress)(ProgressUpdate {
            completed,
            total: self.total,
            elapsed: self.started.elapsed(),
            dependency: self.dependency.status(),
        });
    }
}

pub struct Orchestrator {
    cfg: FanOutConfig,
    credentials: CredentialPool,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cfg", &self.cfg)
            .field("credentials", &self.credentials.len())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(cfg: FanOutConfig, credentials: CredentialPool) -> Result<Self> {
        if cfg.concurrency == Some(0) {
            return Err(Error::InvalidConcurrency);
        }
        Ok(Self {
            cfg,
            credentials,
            progress: None,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Start the monitor, fan out, stop the monitor.
    ///
    /// Only an invalid monitor config is an error. If the monitor task dies mid-run the
    /// worker records are kept and the outcome carries `monitor_error` instead of a report.
    pub async fn run_with_monitor<P: Probe, W: Workload>(
        &self,
        probe: P,
        monitor_cfg: MonitorConfig,
        workload: Arc<W>,
    ) -> Result<RunOutcome> {
        let handle = monitor::start(probe, monitor_cfg).await?;
        let fan_out = self.fan_out(handle.view(), workload).await;
        let (monitor, monitor_error) = match handle.stop().await {
            Ok(report) => (Some(report), None),
            Err(err) => {
                tracing::warn!(error = %err, "dependency monitor failed; report omitted");
                (None, Some(err.to_string()))
            }
        };
        Ok(RunOutcome {
            fan_out,
            monitor,
            monitor_error,
        })
    }

    /// Fan out with every record tagged available.
    pub async fn run_unmonitored<W: Workload>(&self, workload: Arc<W>) -> RunOutcome {
        let view = DependencyView::fixed(DependencyStatus::Available);
        RunOutcome {
            fan_out: self.fan_out(view, workload).await,
            monitor: None,
            monitor_error: None,
        }
    }

    /// Launch every worker, wait for all of them, and return exactly one outcome per
    /// worker. A worker whose task panics or is cancelled is reported as faulted with
    /// internal-failure records; its siblings are unaffected.
    pub async fn fan_out<W: Workload>(
        &self,
        dependency: DependencyView,
        workload: Arc<W>,
    ) -> FanOutReport {
        let started = Instant::now();
        let total = self.cfg.workers;
        let semaphore = self.cfg.concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let completed = Arc::new(AtomicU64::new(0));

        tracing::info!(
            workers = total,
            concurrency = ?self.cfg.concurrency,
            "starting workers"
        );

        let mut handles = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
        for worker_id in 1..=total {
            let ctx = WorkerContext {
                worker_id,
                credentials: self.credentials.for_worker(worker_id),
                dependency: dependency.clone(),
            };
            let tick = self.progress.clone().map(|progress| CompletionTick {
                completed: completed.clone(),
                total,
                started,
                dependency: dependency.clone(),
                progress,
            });
            let semaphore = semaphore.clone();
            let workload = workload.clone();

            handles.push((
                worker_id,
                tokio::spawn(async move {
                    let _tick = tick;
                    let _permit = match semaphore {
                        Some(s) => s.acquire_owned().await.ok(),
                        None => None,
                    };
                    workload.run(ctx).await
                }),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (worker_id, handle) in handles {
            match handle.await {
                Ok(records) => outcomes.push(WorkerOutcome {
                    worker_id,
                    records,
                    faulted: false,
                }),
                Err(err) => {
                    tracing::error!(worker_id, error = %err, "worker task failed");
                    let message = format!("worker task failed: {err}");
                    let status = dependency.status();
                    let records = (0..workload.records_per_worker().max(1))
                        .map(|i| {
                            ResultRecord::degenerate(
                                worker_id,
                                workload.operation_at(i),
                                status,
                                message.clone(),
                            )
                        })
                        .collect();
                    outcomes.push(WorkerOutcome {
                        worker_id,
                        records,
                        faulted: true,
                    });
                }
            }
        }

        let wall_clock = started.elapsed();
        tracing::info!(workers = total, wall_clock = ?wall_clock, "all workers finished");

        FanOutReport {
            outcomes,
            wall_clock,
        }
    }
}
