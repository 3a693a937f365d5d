use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 2s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 2s, 250ms, 1m)"))
}

fn parse_positive(input: &str) -> Result<usize, String> {
    match input.trim().parse::<usize>() {
        Ok(0) => Err("must be a positive integer".to_string()),
        Ok(v) => Ok(v),
        Err(err) => Err(format!("invalid integer '{input}': {err}")),
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr, text summary on stdout.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and one summary line to stdout.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WorkflowKind {
    Consume,
    Produce,
    Interact,
}

#[derive(Debug, Parser)]
#[command(
    name = "faultline",
    author,
    version,
    about = "Concurrent workload simulation with dependency fault monitoring",
    long_about = "faultline drives many simulated clients through a fixed business workflow against a service under test, while a background monitor probes one of the service's dependencies (typically its database).\n\nEvery operation is tagged with the dependency state observed when it started, so the summary shows how the workload behaved during an outage. Stopping and starting the dependency is left to the operator.",
    after_help = "Examples:\n  faultline run\n  faultline run faultline.yaml --workers 50\n  faultline run --workflow interact --dependency db.internal:3306 --output json\n  faultline probe --dependency localhost:3306"
)]
pub struct Cli {
    /// Log filter (e.g. info, debug, faultline_core=trace). Defaults to RUST_LOG, then info.
    #[arg(long, global = true, env = "FAULTLINE_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the workload with the dependency monitor alongside it
    #[command(
        long_about = "Run the configured workflow with N concurrent workers.\n\nCLI flags override values from the YAML config; without a config file the built-in defaults apply (500 consume workers against http://localhost:8080, monitoring localhost:3306)."
    )]
    Run(RunArgs),

    /// Probe the dependency once and report whether it is reachable
    Probe(ProbeArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the YAML config (optional)
    pub config: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(long, env = "FAULTLINE_WORKERS")]
    pub workers: Option<u64>,

    /// Upper bound on workers in flight at once [default: 32 for produce, unbounded otherwise]
    #[arg(long, value_parser = parse_positive)]
    pub concurrency: Option<usize>,

    /// Base URL of the service under test
    #[arg(long, env = "FAULTLINE_BASE_URL")]
    pub base_url: Option<String>,

    /// Base URL that relative download locators resolve against
    #[arg(long, env = "FAULTLINE_STORAGE_URL")]
    pub storage_url: Option<String>,

    /// Dependency address to monitor (host:port)
    #[arg(long, env = "FAULTLINE_DEPENDENCY")]
    pub dependency: Option<String>,

    /// Dependency poll interval (e.g. 2s, 500ms)
    #[arg(long, value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Run without the dependency monitor
    #[arg(long, conflicts_with_all = ["dependency", "poll_interval"])]
    pub no_monitor: bool,

    /// Workflow to run, replacing the configured one (with its defaults)
    #[arg(long, value_enum)]
    pub workflow: Option<WorkflowKind>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Path to the YAML config (optional)
    pub config: Option<PathBuf>,

    /// Dependency address to probe (host:port)
    #[arg(long, env = "FAULTLINE_DEPENDENCY")]
    pub dependency: Option<String>,

    /// Probe timeout (e.g. 2s)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_overrides() {
        let parsed = Cli::try_parse_from([
            "faultline",
            "run",
            "load.yaml",
            "--workers",
            "25",
            "--concurrency",
            "5",
            "--base-url",
            "http://svc:8080",
            "--dependency",
            "db:3306",
            "--poll-interval",
            "500ms",
            "--workflow",
            "interact",
            "--output",
            "json",
            "--log-level",
            "debug",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        assert_eq!(cli.log_level.as_deref(), Some("debug"));

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("load.yaml")));
                assert_eq!(args.workers, Some(25));
                assert_eq!(args.concurrency, Some(5));
                assert_eq!(args.base_url.as_deref(), Some("http://svc:8080"));
                assert_eq!(args.dependency.as_deref(), Some("db:3306"));
                assert_eq!(args.poll_interval, Some(Duration::from_millis(500)));
                assert_eq!(args.workflow, Some(WorkflowKind::Interact));
                assert!(!args.no_monitor);
                assert!(matches!(args.output, OutputFormat::Json));
            }
            Command::Probe(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(Cli::try_parse_from(["faultline", "run", "--concurrency", "0"]).is_err());
    }

    #[test]
    fn no_monitor_conflicts_with_dependency() {
        let parsed = Cli::try_parse_from([
            "faultline",
            "run",
            "--no-monitor",
            "--dependency",
            "db:3306",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_parses_probe() {
        let parsed = Cli::try_parse_from([
            "faultline",
            "probe",
            "--dependency",
            "db:3306",
            "--timeout",
            "1s",
        ]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Probe(args) => {
                assert_eq!(args.config, None);
                assert_eq!(args.dependency.as_deref(), Some("db:3306"));
                assert_eq!(args.timeout, Some(Duration::from_secs(1)));
            }
            Command::Run(_) => panic!("expected probe command"),
        }
    }
}
