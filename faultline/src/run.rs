use std::sync::Arc;

use anyhow::Context as _;

use faultline_core::{FanOutConfig, Orchestrator, StatsAggregator, Workflow};

use crate::cli::{RunArgs, WorkflowKind};
use crate::config::{self, ConfigYaml, WorkflowYaml};
use crate::exit_codes::ExitCode;
use crate::output::{self, RunPlan, RunReport};
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let cfg = config::load(args.config.as_deref())
        .await
        .map_err(RunError::InvalidInput)?;
    let settings = apply_overrides(cfg, &args)
        .resolve()
        .map_err(RunError::InvalidInput)?;

    let out = output::formatter(args.output);

    let workflow = Arc::new(Workflow::prepare(settings.service.clone(), settings.workflow).await);

    out.print_header(&RunPlan {
        workflow: workflow.name(),
        workers: settings.workers,
        concurrency: settings.concurrency,
        base_url: settings.service.base_url.clone(),
        dependency: settings.dependency.as_ref().map(|d| {
            (
                d.monitor.dependency.clone(),
                d.probe.address().to_string(),
                d.monitor.poll_interval,
            )
        }),
        resource_pool: workflow.resource_pool().map(<[i64]>::to_vec),
    });

    let mut orchestrator = Orchestrator::new(
        FanOutConfig {
            workers: settings.workers,
            concurrency: settings.concurrency,
        },
        settings.credentials,
    )
    .map_err(|e| RunError::InvalidInput(e.into()))?;
    if let Some(progress) = out.progress() {
        orchestrator = orchestrator.with_progress(progress);
    }

    tracing::info!(
        workflow = workflow.name(),
        workers = settings.workers,
        monitored = settings.dependency.is_some(),
        "run starting"
    );

    let outcome = match settings.dependency {
        Some(dep) => orchestrator
            .run_with_monitor(dep.probe, dep.monitor, workflow.clone())
            .await
            .context("invalid dependency monitor config")
            .map_err(RunError::InvalidInput)?,
        None => orchestrator.run_unmonitored(workflow.clone()).await,
    };

    let mut stats = StatsAggregator::new(settings.error_sample_limit);
    stats.extend(outcome.fan_out.records());

    let report = RunReport {
        workflow: workflow.name(),
        summary: stats.summary(),
        wall_clock: outcome.fan_out.wall_clock,
        faulted_workers: outcome.fan_out.faulted_workers(),
        monitor: outcome.monitor,
        monitor_error: outcome.monitor_error,
    };
    tracing::info!(
        attempted = report.summary.total.attempted,
        succeeded = report.summary.total.succeeded,
        "run finished"
    );

    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::Success)
}

/// CLI flags win over the config file. Selecting a different workflow kind replaces the
/// configured workflow with that kind's defaults.
fn apply_overrides(mut cfg: ConfigYaml, args: &RunArgs) -> ConfigYaml {
    if let Some(workers) = args.workers {
        cfg.workers = Some(workers);
    }
    if let Some(concurrency) = args.concurrency {
        cfg.concurrency = Some(concurrency);
    }
    if let Some(base_url) = &args.base_url {
        cfg.service.base_url = Some(base_url.clone());
    }
    if let Some(storage_url) = &args.storage_url {
        cfg.service.storage_url = Some(storage_url.clone());
    }
    if let Some(dependency) = &args.dependency {
        cfg.dependency.address = Some(dependency.clone());
        cfg.dependency.enabled = true;
    }
    if let Some(poll) = args.poll_interval {
        cfg.dependency.poll_interval = Some(poll.into());
    }
    if args.no_monitor {
        cfg.dependency.enabled = false;
    }
    if let Some(kind) = args.workflow {
        let same = matches!(
            (kind, &cfg.workflow),
            (WorkflowKind::Consume, WorkflowYaml::Consume(_))
                | (WorkflowKind::Produce, WorkflowYaml::Produce(_))
                | (WorkflowKind::Interact, WorkflowYaml::Interact(_))
        );
        if !same {
            cfg.workflow = match kind {
                WorkflowKind::Consume => WorkflowYaml::Consume(Default::default()),
                WorkflowKind::Produce => WorkflowYaml::Produce(Default::default()),
                WorkflowKind::Interact => WorkflowYaml::Interact(Default::default()),
            };
        }
    }
    cfg
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser as _;

    use super::*;
    use crate::cli::{Cli, Command};
    use faultline_core::WorkflowConfig;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["faultline", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full) {
            Ok(Cli {
                command: Command::Run(args),
                ..
            }) => args,
            Ok(_) => panic!("expected run command"),
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    fn base() -> ConfigYaml {
        config::parse(
            br#"
workers: 10
service:
  baseUrl: http://file:8080
dependency:
  address: db:3306
  pollInterval: 5s
workflow:
  kind: interact
  operations: 4
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"))
    }

    #[test]
    fn flags_override_file_values() {
        let args = run_args(&[
            "--workers",
            "3",
            "--base-url",
            "http://cli:9000",
            "--dependency",
            "other:5432",
            "--poll-interval",
            "250ms",
        ]);
        let s = apply_overrides(base(), &args)
            .resolve()
            .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(s.workers, 3);
        assert_eq!(s.service.base_url, "http://cli:9000");
        let dep = s.dependency.unwrap_or_else(|| panic!("dependency expected"));
        assert_eq!(dep.probe.address(), "other:5432");
        assert_eq!(dep.monitor.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn no_monitor_disables_dependency() {
        let s = apply_overrides(base(), &run_args(&["--no-monitor"]))
            .resolve()
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert!(s.dependency.is_none());
    }

    #[test]
    fn same_workflow_kind_keeps_file_settings() {
        let s = apply_overrides(base(), &run_args(&["--workflow", "interact"]))
            .resolve()
            .unwrap_or_else(|e| panic!("{e:#}"));
        match s.workflow {
            WorkflowConfig::Interact(i) => assert_eq!(i.operations, 4),
            other => panic!("unexpected workflow: {other:?}"),
        }
    }

    #[test]
    fn other_workflow_kind_uses_defaults() {
        let s = apply_overrides(base(), &run_args(&["--workflow", "produce"]))
            .resolve()
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert!(matches!(s.workflow, WorkflowConfig::Produce(_)));
    }

    #[test]
    fn malformed_dependency_is_rejected() {
        let res = apply_overrides(base(), &run_args(&["--dependency", "no-port"])).resolve();
        assert!(res.is_err());
    }
}
