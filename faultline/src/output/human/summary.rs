use std::fmt::Write as _;

use faultline_core::{Counts, DependencyStatus, LatencySummary, RunSummary};

use super::format::*;
use crate::output::RunReport;

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let s = &report.summary;

    out.push_str("summary\n");
    writeln!(&mut out, "  workflow: {}", report.workflow).ok();
    writeln!(&mut out, "  wall_clock: {}", format_duration(report.wall_clock)).ok();
    writeln!(&mut out, "  total: {}", format_counts(&s.total)).ok();
    if report.faulted_workers > 0 {
        writeln!(&mut out, "  faulted_workers: {}", report.faulted_workers).ok();
    }
    match &s.latency {
        Some(l) => {
            writeln!(&mut out, "  latency = {}", format_latency(l)).ok();
        }
        None => out.push_str("  latency: n/a\n"),
    }
    out.push('\n');

    if s.total.attempted == 0 {
        out.push_str("no operations were run\n");
        render_monitor(report, &mut out);
        return out;
    }

    render_operations(s, &mut out);
    render_phases(s, &mut out);
    render_dependency(s, &mut out);
    render_monitor(report, &mut out);
    render_errors(s, &mut out);

    out
}

fn format_counts(c: &Counts) -> String {
    format!(
        "{} attempted, {} succeeded ({}), {} failed",
        c.attempted,
        c.succeeded,
        format_percent(c.success_rate()),
        c.failed
    )
}

fn format_latency(l: &LatencySummary) -> String {
    format!(
        "p50={} p90={} p99={} mean={} min={} max={} (n={})",
        format_ms(l.p50_ms),
        format_ms(l.p90_ms),
        format_ms(l.p99_ms),
        format_ms(l.mean_ms),
        format_ms(l.min_ms),
        format_ms(l.max_ms),
        l.count
    )
}

fn render_operations(s: &RunSummary, out: &mut String) {
    out.push_str("operations\n");
    for op in &s.by_operation {
        writeln!(out, "  {}: {}", op.operation, format_counts(&op.counts)).ok();
        if let Some(l) = &op.latency {
            writeln!(out, "    latency = {}", format_latency(l)).ok();
        }
    }
    out.push('\n');
}

fn render_phases(s: &RunSummary, out: &mut String) {
    if s.phases.is_empty() {
        return;
    }

    out.push_str("phases\n");
    for p in &s.phases {
        write!(
            out,
            "  {}: ok={} failed={} skipped={}",
            p.phase, p.succeeded, p.failed, p.not_attempted
        )
        .ok();
        match &p.latency {
            Some(l) => writeln!(
                out,
                " mean={} min={} max={} p99={}",
                format_ms(l.mean_ms),
                format_ms(l.min_ms),
                format_ms(l.max_ms),
                format_ms(l.p99_ms)
            )
            .ok(),
            None => writeln!(out).ok(),
        };
    }
    out.push('\n');
}

fn render_dependency(s: &RunSummary, out: &mut String) {
    out.push_str("dependency\n");
    for (status, counts) in &s.by_dependency {
        writeln!(out, "  {status}: {}", format_counts(counts)).ok();
    }

    let outage = &s.outage;
    if outage.counts.attempted == 0 {
        out.push_str("  outage: no operation started while the dependency was unavailable\n");
    } else {
        writeln!(
            out,
            "  outage ({}): {}",
            DependencyStatus::Unavailable,
            format_counts(&outage.counts)
        )
        .ok();
        for (op, counts) in &outage.by_operation {
            writeln!(out, "    {op}: {}", format_counts(counts)).ok();
        }
        for (fault, count) in &outage.faults {
            writeln!(out, "    fault {fault}: {count}").ok();
        }
    }

    if !s.faults.is_empty() {
        out.push_str("  faults:\n");
        for (fault, count) in &s.faults {
            writeln!(out, "    {fault}: {count}").ok();
        }
    }
    out.push('\n');
}

fn render_monitor(report: &RunReport, out: &mut String) {
    if let Some(err) = &report.monitor_error {
        out.push_str("monitor\n");
        writeln!(out, "  failed: {err}").ok();
        writeln!(out, "  dependency tags after the failure are stale").ok();
        out.push('\n');
        return;
    }
    let Some(m) = &report.monitor else {
        return;
    };

    out.push_str("monitor\n");
    writeln!(
        out,
        "  initial={} final={} polls={} transitions={}",
        m.initial,
        m.final_status,
        m.polls,
        m.transitions.len()
    )
    .ok();

    let outages = m.outages();
    for o in &outages {
        if o.recovered {
            writeln!(
                out,
                "  down at {}: recovered after {}",
                format_timestamp(o.started_at),
                format_duration(o.downtime)
            )
            .ok();
        } else {
            writeln!(
                out,
                "  down at {}: still down after {}",
                format_timestamp(o.started_at),
                format_duration(o.downtime)
            )
            .ok();
        }
    }
    if !outages.is_empty() {
        writeln!(out, "  total_downtime: {}", format_duration(m.total_downtime())).ok();
    }
    out.push('\n');
}

fn render_errors(s: &RunSummary, out: &mut String) {
    if s.errors_total == 0 {
        return;
    }

    writeln!(
        out,
        "errors (first {} of {})",
        s.errors.len(),
        s.errors_total
    )
    .ok();
    for e in &s.errors {
        writeln!(out, "  {e}").ok();
    }
}
