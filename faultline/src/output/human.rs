use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::format_duration;
use progress::HumanProgress;
use summary::render;

use super::{OutputFormatter, RunPlan, RunReport};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan: &RunPlan) {
        let concurrency = plan
            .concurrency
            .map_or_else(|| "unbounded".to_string(), |c| c.to_string());
        println!(
            "workflow: {} workers={} concurrency={concurrency}",
            plan.workflow, plan.workers
        );
        println!("service: {}", plan.base_url);
        match &plan.dependency {
            Some((label, address, poll)) => println!(
                "dependency: {label} ({address}) poll={}",
                format_duration(*poll)
            ),
            None => println!("dependency: not monitored"),
        }
        if let Some(pool) = &plan.resource_pool {
            println!("resource pool: {pool:?}");
        }
        println!();
    }

    fn progress(&self) -> Option<faultline_core::ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u| {
            let message = format!(
                "dependency={} elapsed={}",
                u.dependency,
                format_duration(u.elapsed)
            );
            progress.update(u.completed, u.total, message);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));
        Ok(())
    }
}
