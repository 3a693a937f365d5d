use std::time::Duration;

use crate::cli::OutputFormat;

mod human;
mod json;

/// What is about to run, for the report header.
#[derive(Debug, Clone)]
pub(crate) struct RunPlan {
    pub workflow: &'static str,
    pub workers: u64,
    pub concurrency: Option<usize>,
    pub base_url: String,
    /// `(label, address, poll interval)` of the monitored dependency.
    pub dependency: Option<(String, String, Duration)>,
    pub resource_pool: Option<Vec<i64>>,
}

/// Everything the summary is rendered from.
#[derive(Debug, Clone)]
pub(crate) struct RunReport {
    pub workflow: &'static str,
    pub summary: faultline_core::RunSummary,
    pub wall_clock: Duration,
    pub faulted_workers: usize,
    pub monitor: Option<faultline_core::MonitorReport>,
    /// Why `monitor` is missing on a monitored run.
    pub monitor_error: Option<String>,
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, plan: &RunPlan);
    fn progress(&self) -> Option<faultline_core::ProgressFn>;
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
