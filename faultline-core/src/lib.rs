pub mod api;
pub mod config;
mod error;
pub mod monitor;
pub mod orchestrator;
pub mod record;
pub mod stats;
pub mod workflow;

pub use config::{
    ConsumeConfig, CredentialPool, Credentials, DEFAULT_PRODUCE_CONCURRENCY, InteractConfig, MIB,
    ProduceConfig, ServiceConfig, WorkflowConfig,
};
pub use error::{Error, Result, StepError};
pub use monitor::{
    DependencySnapshot, DependencyView, MonitorConfig, MonitorHandle, MonitorReport, Outage,
    Probe, ScriptedProbe, TcpProbe, Transition,
};
pub use orchestrator::{
    FanOutConfig, FanOutReport, Orchestrator, ProgressFn, ProgressUpdate, RunOutcome,
    WorkerContext, WorkerOutcome, Workload,
};
pub use record::{
    DependencyStatus, FaultKind, OperationKind, Phase, ResultRecord, StepOutcome, StepStatus,
};
pub use stats::{
    Counts, DEFAULT_ERROR_SAMPLE_LIMIT, LatencySummary, OperationSummary, OutageSummary,
    PhaseSummary, RunSummary, StatsAggregator, aggregate,
};
pub use workflow::Workflow;
