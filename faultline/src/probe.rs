use anyhow::Context as _;
use tokio::time::Instant;

use crate::cli::ProbeArgs;
use crate::config;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;

/// One probe of the dependency. Reachable exits 0, unreachable exits
/// [`ExitCode::DependencyUnavailable`].
pub async fn probe(args: ProbeArgs) -> Result<ExitCode, RunError> {
    let mut cfg = config::load(args.config.as_deref())
        .await
        .map_err(RunError::InvalidInput)?;

    cfg.dependency.enabled = true;
    if let Some(address) = args.dependency {
        cfg.dependency.address = Some(address);
    }
    if let Some(timeout) = args.timeout {
        cfg.dependency.probe_timeout = Some(timeout.into());
    }

    let dep = cfg
        .dependency
        .resolve()
        .context("invalid dependency config")
        .map_err(RunError::InvalidInput)?
        .ok_or_else(|| RunError::InvalidInput(anyhow::anyhow!("dependency is disabled")))?;

    let started = Instant::now();
    let result = dep.probe.check().await;
    let elapsed_ms = started.elapsed().as_millis();

    match result {
        Ok(()) => {
            println!(
                "{} ({}): available ({elapsed_ms}ms)",
                dep.monitor.dependency,
                dep.probe.address()
            );
            Ok(ExitCode::Success)
        }
        Err(err) => {
            println!(
                "{} ({}): unavailable: {err}",
                dep.monitor.dependency,
                dep.probe.address()
            );
            Ok(ExitCode::DependencyUnavailable)
        }
    }
}
