use hdrhistogram::Histogram;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::record::{DependencyStatus, FaultKind, OperationKind, Phase, ResultRecord, StepStatus};

pub const DEFAULT_ERROR_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl Counts {
    fn record(&mut self, success: bool) {
        self.attempted = self.attempted.saturating_add(1);
        if success {
            self.succeeded = self.succeeded.saturating_add(1);
        } else {
            self.failed = self.failed.saturating_add(1);
        }
    }

    /// Success percentage in `[0, 100]`; 0 when nothing was attempted.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.attempted as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationSummary {
    pub operation: OperationKind,
    pub counts: Counts,
    pub latency: Option<LatencySummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    pub phase: Phase,
    /// Steps that ran (succeeded + failed).
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Planned steps skipped because an earlier step failed.
    pub not_attempted: u64,
    /// Latency over attempted steps only.
    pub latency: Option<LatencySummary>,
}

/// Behaviour of the operations tagged while the dependency was believed unavailable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutageSummary {
    pub counts: Counts,
    pub by_operation: Vec<(OperationKind, Counts)>,
    pub faults: Vec<(FaultKind, u64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub total: Counts,
    pub latency: Option<LatencySummary>,
    pub by_operation: Vec<OperationSummary>,
    pub by_dependency: Vec<(DependencyStatus, Counts)>,
    pub outage: OutageSummary,
    pub faults: Vec<(FaultKind, u64)>,
    pub phases: Vec<PhaseSummary>,
    /// The first `limit` error descriptions, in arrival order.
    pub errors: Vec<String>,
    pub errors_total: u64,
}

#[derive(Debug, Clone)]
struct LatencyAgg {
    count: u64,
    sum_us: u128,
    min_us: u64,
    max_us: u64,
    hist: Histogram<u64>,
}

impl Default for LatencyAgg {
    fn default() -> Self {
        // Up to one hour in microseconds (3 sigfigs).
        let hist = Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)
            .unwrap_or_else(|err| panic!("failed to init histogram: {err}"));
        Self {
            count: 0,
            sum_us: 0,
            min_us: u64::MAX,
            max_us: 0,
            hist,
        }
    }
}

impl LatencyAgg {
    fn record(&mut self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count = self.count.saturating_add(1);
        self.sum_us = self.sum_us.saturating_add(u128::from(us));
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        self.hist.saturating_record(us.max(1));
    }

    fn summary(&self) -> Option<LatencySummary> {
        if self.count == 0 {
            return None;
        }

        let ms = |us: u64| us as f64 / 1000.0;
        Some(LatencySummary {
            count: self.count,
            mean_ms: (self.sum_us as f64 / self.count as f64) / 1000.0,
            min_ms: ms(self.min_us),
            max_ms: ms(self.max_us),
            p50_ms: ms(self.hist.value_at_quantile(0.50)),
            p90_ms: ms(self.hist.value_at_quantile(0.90)),
            p99_ms: ms(self.hist.value_at_quantile(0.99)),
        })
    }
}

#[derive(Debug, Clone, Default)]
struct PhaseAgg {
    succeeded: u64,
    failed: u64,
    not_attempted: u64,
    latency: LatencyAgg,
}

#[derive(Debug, Clone, Default)]
struct OperationAgg {
    counts: Counts,
    latency: LatencyAgg,
}

/// Single-consumer fold over [`ResultRecord`]s.
///
/// Records are drained into it by one owner after the fan-out completes, so it carries
/// no locks.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    error_limit: usize,
    total: Counts,
    latency: LatencyAgg,
    operations: BTreeMap<OperationKind, OperationAgg>,
    dependency: BTreeMap<DependencyStatus, Counts>,
    outage: Counts,
    outage_operations: BTreeMap<OperationKind, Counts>,
    outage_faults: BTreeMap<FaultKind, u64>,
    faults: BTreeMap<FaultKind, u64>,
    phases: BTreeMap<Phase, PhaseAgg>,
    errors: Vec<String>,
    errors_total: u64,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_SAMPLE_LIMIT)
    }
}

impl StatsAggregator {
    #[must_use]
    pub fn new(error_limit: usize) -> Self {
        Self {
            error_limit,
            total: Counts::default(),
            latency: LatencyAgg::default(),
            operations: BTreeMap::new(),
            dependency: BTreeMap::new(),
            outage: Counts::default(),
            outage_operations: BTreeMap::new(),
            outage_faults: BTreeMap::new(),
            faults: BTreeMap::new(),
            phases: BTreeMap::new(),
            errors: Vec::new(),
            errors_total: 0,
        }
    }

    pub fn add(&mut self, record: &ResultRecord) {
        let success = record.success();

        self.total.record(success);
        self.latency.record(record.elapsed());

        let op = self.operations.entry(record.operation()).or_default();
        op.counts.record(success);
        op.latency.record(record.elapsed());

        self.dependency
            .entry(record.dependency())
            .or_default()
            .record(success);

        let in_outage = record.dependency() == DependencyStatus::Unavailable;
        if in_outage {
            self.outage.record(success);
            self.outage_operations
                .entry(record.operation())
                .or_default()
                .record(success);
        }

        if let Some(kind) = record.fault_kind() {
            *self.faults.entry(kind).or_default() += 1;
            if in_outage {
                *self.outage_faults.entry(kind).or_default() += 1;
            }
        }

        for step in record.steps() {
            let phase = self.phases.entry(step.phase).or_default();
            match step.status {
                StepStatus::Succeeded => {
                    phase.succeeded += 1;
                    phase.latency.record(step.elapsed);
                }
                StepStatus::Failed => {
                    phase.failed += 1;
                    phase.latency.record(step.elapsed);
                }
                StepStatus::NotAttempted => phase.not_attempted += 1,
            }
        }

        if let Some(message) = record.error_message() {
            self.errors_total += 1;
            if self.errors.len() < self.error_limit {
                self.errors.push(format!(
                    "worker {} {}: {message}",
                    record.worker_id(),
                    record.operation()
                ));
            }
        }
    }

    pub fn extend<'a>(&mut self, records: impl IntoIterator<Item = &'a ResultRecord>) {
        for r in records {
            self.add(r);
        }
    }

    pub fn total(&self) -> Counts {
        self.total
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.total,
            latency: self.latency.summary(),
            by_operation: self
                .operations
                .iter()
                .map(|(operation, agg)| OperationSummary {
                    operation: *operation,
                    counts: agg.counts,
                    latency: agg.latency.summary(),
                })
                .collect(),
            by_dependency: self.dependency.iter().map(|(k, v)| (*k, *v)).collect(),
            outage: OutageSummary {
                counts: self.outage,
                by_operation: self
                    .outage_operations
                    .iter()
                    .map(|(k, v)| (*k, *v))
                    .collect(),
                faults: self.outage_faults.iter().map(|(k, v)| (*k, *v)).collect(),
            },
            faults: self.faults.iter().map(|(k, v)| (*k, *v)).collect(),
            phases: self
                .phases
                .iter()
                .map(|(phase, agg)| PhaseSummary {
                    phase: *phase,
                    attempted: agg.succeeded + agg.failed,
                    succeeded: agg.succeeded,
                    failed: agg.failed,
                    not_attempted: agg.not_attempted,
                    latency: agg.latency.summary(),
                })
                .collect(),
            errors: self.errors.clone(),
            errors_total: self.errors_total,
        }
    }
}

/// Fold a complete set of records into a fresh summary.
#[must_use]
pub fn aggregate(records: &[ResultRecord], error_limit: usize) -> RunSummary {
    let mut agg = StatsAggregator::new(error_limit);
    agg.extend(records);
    agg.summary()
}
