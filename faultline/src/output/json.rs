use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use faultline_core::{Counts, LatencySummary, MonitorReport, ProgressUpdate};

use super::{OutputFormatter, RunPlan, RunReport};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _plan: &RunPlan) {}

    fn progress(&self) -> Option<faultline_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub completed: u64,
    pub total: u64,
    pub elapsed_secs: f64,
    pub dependency: String,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        completed: u.completed,
        total: u.total,
        elapsed_secs: u.elapsed.as_secs_f64(),
        dependency: u.dependency.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub workflow: &'static str,
    pub wall_clock_secs: f64,
    pub faulted_workers: usize,
    pub totals: JsonCounts,
    pub latency: Option<JsonLatencySummary>,
    pub operations: BTreeMap<String, JsonOperationSummary>,
    pub phases: BTreeMap<String, JsonPhaseSummary>,
    pub dependency: BTreeMap<String, JsonCounts>,
    pub outage: JsonOutageSummary,
    pub faults: BTreeMap<String, u64>,
    pub errors: Vec<String>,
    pub errors_total: u64,
    pub monitor: Option<JsonMonitorSummary>,
    pub monitor_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCounts {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate: f64,
}

impl From<&Counts> for JsonCounts {
    fn from(c: &Counts) -> Self {
        Self {
            attempted: c.attempted,
            succeeded: c.succeeded,
            failed: c.failed,
            success_rate: c.success_rate(),
        }
    }
}

/// Latencies in milliseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: u64,
}

impl From<&LatencySummary> for JsonLatencySummary {
    fn from(l: &LatencySummary) -> Self {
        Self {
            p50: l.p50_ms,
            p90: l.p90_ms,
            p99: l.p99_ms,
            min: l.min_ms,
            max: l.max_ms,
            mean: l.mean_ms,
            count: l.count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonOperationSummary {
    #[serde(flatten)]
    pub counts: JsonCounts,
    pub latency: Option<JsonLatencySummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonPhaseSummary {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub not_attempted: u64,
    pub latency: Option<JsonLatencySummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonOutageSummary {
    #[serde(flatten)]
    pub counts: JsonCounts,
    pub by_operation: BTreeMap<String, JsonCounts>,
    pub faults: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonMonitorSummary {
    pub initial: String,
    #[serde(rename = "final")]
    pub final_status: String,
    pub polls: u64,
    pub transitions: Vec<JsonTransition>,
    pub outages: Vec<JsonOutage>,
    pub total_downtime_secs: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTransition {
    pub to: String,
    pub at: String,
    pub downtime_secs: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonOutage {
    pub started_at: String,
    pub downtime_secs: f64,
    pub recovered: bool,
}

fn build_monitor(m: &MonitorReport) -> JsonMonitorSummary {
    JsonMonitorSummary {
        initial: m.initial.to_string(),
        final_status: m.final_status.to_string(),
        polls: m.polls,
        transitions: m
            .transitions
            .iter()
            .map(|t| JsonTransition {
                to: t.to.to_string(),
                at: humantime::format_rfc3339_seconds(t.at).to_string(),
                downtime_secs: t.downtime.map(|d| d.as_secs_f64()),
            })
            .collect(),
        outages: m
            .outages()
            .iter()
            .map(|o| JsonOutage {
                started_at: humantime::format_rfc3339_seconds(o.started_at).to_string(),
                downtime_secs: o.downtime.as_secs_f64(),
                recovered: o.recovered,
            })
            .collect(),
        total_downtime_secs: m.total_downtime().as_secs_f64(),
    }
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let s = &report.summary;

    JsonSummaryLine {
        kind: "summary",
        workflow: report.workflow,
        wall_clock_secs: report.wall_clock.as_secs_f64(),
        faulted_workers: report.faulted_workers,
        totals: JsonCounts::from(&s.total),
        latency: s.latency.as_ref().map(JsonLatencySummary::from),
        operations: s
            .by_operation
            .iter()
            .map(|op| {
                (
                    op.operation.to_string(),
                    JsonOperationSummary {
                        counts: JsonCounts::from(&op.counts),
                        latency: op.latency.as_ref().map(JsonLatencySummary::from),
                    },
                )
            })
            .collect(),
        phases: s
            .phases
            .iter()
            .map(|p| {
                (
                    p.phase.to_string(),
                    JsonPhaseSummary {
                        attempted: p.attempted,
                        succeeded: p.succeeded,
                        failed: p.failed,
                        not_attempted: p.not_attempted,
                        latency: p.latency.as_ref().map(JsonLatencySummary::from),
                    },
                )
            })
            .collect(),
        dependency: s
            .by_dependency
            .iter()
            .map(|(status, c)| (status.to_string(), JsonCounts::from(c)))
            .collect(),
        outage: JsonOutageSummary {
            counts: JsonCounts::from(&s.outage.counts),
            by_operation: s
                .outage
                .by_operation
                .iter()
                .map(|(op, c)| (op.to_string(), JsonCounts::from(c)))
                .collect(),
            faults: s
                .outage
                .faults
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        },
        faults: s.faults.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        errors: s.errors.clone(),
        errors_total: s.errors_total,
        monitor: report.monitor.as_ref().map(build_monitor),
        monitor_error: report.monitor_error.clone(),
    }
}

fn emit_json_line<T: Serialize>(value: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, value).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use faultline_core::{
        DependencyStatus, FaultKind, OperationKind, Phase, ResultRecord, StepOutcome,
        StepStatus, aggregate,
    };

    use super::*;

    #[test]
    fn progress_line_has_kind_and_counts() {
        let line = build_progress_line(&ProgressUpdate {
            completed: 3,
            total: 10,
            elapsed: Duration::from_millis(1500),
            dependency: DependencyStatus::Unavailable,
        });
        let v = serde_json::to_value(&line).unwrap();
        assert_eq!(v["kind"], "progress");
        assert_eq!(v["completed"], 3);
        assert_eq!(v["total"], 10);
        assert_eq!(v["elapsed_secs"], 1.5);
        assert_eq!(v["dependency"], "unavailable");
    }

    #[test]
    fn summary_line_flattens_counts_and_keys_by_name() {
        let records = vec![
            ResultRecord::succeeded(
                1,
                OperationKind::Collect,
                DependencyStatus::Available,
                Duration::from_millis(4),
                200,
                vec![StepOutcome {
                    phase: Phase::Collect,
                    status: StepStatus::Succeeded,
                    elapsed: Duration::from_millis(4),
                    http_status: 200,
                }],
            ),
            ResultRecord::failed(
                2,
                OperationKind::Comment,
                DependencyStatus::Unavailable,
                Duration::from_millis(9),
                0,
                vec![StepOutcome {
                    phase: Phase::Comment,
                    status: StepStatus::Failed,
                    elapsed: Duration::from_millis(9),
                    http_status: 0,
                }],
                FaultKind::Transport,
                "comment: connection refused",
            ),
        ];
        let report = RunReport {
            workflow: "interact",
            summary: aggregate(&records, 10),
            wall_clock: Duration::from_secs(2),
            faulted_workers: 0,
            monitor: None,
            monitor_error: None,
        };

        let v = serde_json::to_value(build_summary_line(&report)).unwrap();
        assert_eq!(v["kind"], "summary");
        assert_eq!(v["workflow"], "interact");
        assert_eq!(v["totals"]["attempted"], 2);
        assert_eq!(v["totals"]["success_rate"], 50.0);
        assert_eq!(v["operations"]["collect"]["succeeded"], 1);
        assert_eq!(v["operations"]["comment"]["failed"], 1);
        assert_eq!(v["phases"]["comment"]["failed"], 1);
        assert_eq!(v["dependency"]["unavailable"]["attempted"], 1);
        assert_eq!(v["outage"]["attempted"], 1);
        assert_eq!(v["outage"]["faults"]["transport"], 1);
        assert_eq!(v["faults"]["transport"], 1);
        assert_eq!(v["errors_total"], 1);
        assert!(v["monitor"].is_null());
        assert!(v["monitor_error"].is_null());
    }
}
