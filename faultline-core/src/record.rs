use std::time::Duration;

/// Logical operation a [`ResultRecord`] reports on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    /// Login, fetch a resource descriptor, partially download it.
    Consume,
    /// Login, upload a payload, download it back and verify it.
    Produce,
    /// Mark a resource as favorite.
    Collect,
    /// Add a comment to a resource.
    Comment,
}

/// One step inside a workflow.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Login,
    FetchResource,
    ResolveLocator,
    Download,
    Upload,
    Verify,
    Collect,
    Comment,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum DependencyStatus {
    Available,
    Unavailable,
}

impl DependencyStatus {
    #[must_use]
    pub fn from_connected(connected: bool) -> Self {
        if connected {
            Self::Available
        } else {
            Self::Unavailable
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum FaultKind {
    /// Connect error, reset, timeout.
    Transport,
    /// Non-2xx status.
    Http,
    /// 2xx with an envelope whose `code != 0`.
    Business,
    /// Undecodable body or a missing required field.
    Protocol,
    /// Post-upload size or content-hash mismatch.
    Integrity,
    /// The worker task itself failed (panic, cancellation).
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    NotAttempted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub phase: Phase,
    pub status: StepStatus,
    pub elapsed: Duration,
    /// Last HTTP status observed by the step; 0 when no response was received.
    pub http_status: u16,
}

impl StepOutcome {
    #[must_use]
    pub fn not_attempted(phase: Phase) -> Self {
        Self {
            phase,
            status: StepStatus::NotAttempted,
            elapsed: Duration::ZERO,
            http_status: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    kind: FaultKind,
    message: String,
}

/// Outcome of one logical operation by one worker.
///
/// Fields are private so the `error_message().is_some() == !success()` invariant
/// holds for every record in existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    worker_id: u64,
    operation: OperationKind,
    elapsed: Duration,
    dependency: DependencyStatus,
    http_status: u16,
    failure: Option<Failure>,
    steps: Vec<StepOutcome>,
}

impl ResultRecord {
    #[must_use]
    pub fn succeeded(
        worker_id: u64,
        operation: OperationKind,
        dependency: DependencyStatus,
        elapsed: Duration,
        http_status: u16,
        steps: Vec<StepOutcome>,
    ) -> Self {
        Self {
            worker_id,
            operation,
            elapsed,
            dependency,
            http_status,
            failure: None,
            steps,
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn failed(
        worker_id: u64,
        operation: OperationKind,
        dependency: DependencyStatus,
        elapsed: Duration,
        http_status: u16,
        steps: Vec<StepOutcome>,
        kind: FaultKind,
        message: impl Into<String>,
    ) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = kind.to_string();
        }

        Self {
            worker_id,
            operation,
            elapsed,
            dependency,
            http_status,
            failure: Some(Failure { kind, message }),
            steps,
        }
    }

    /// Stand-in for a worker whose task died before producing its own record.
    #[must_use]
    pub fn degenerate(
        worker_id: u64,
        operation: OperationKind,
        dependency: DependencyStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::failed(
            worker_id,
            operation,
            dependency,
            Duration::ZERO,
            0,
            Vec::new(),
            FaultKind::Internal,
            message,
        )
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn dependency(&self) -> DependencyStatus {
        self.dependency
    }

    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }

    pub fn fault_kind(&self) -> Option<FaultKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_present_iff_failed() {
        let ok = ResultRecord::succeeded(
            1,
            OperationKind::Collect,
            DependencyStatus::Available,
            Duration::from_millis(5),
            200,
            vec![],
        );
        assert!(ok.success());
        assert_eq!(ok.error_message(), None);
        assert_eq!(ok.fault_kind(), None);

        let failed = ResultRecord::failed(
            2,
            OperationKind::Comment,
            DependencyStatus::Unavailable,
            Duration::from_millis(5),
            500,
            vec![],
            FaultKind::Http,
            "HTTP 500: boom",
        );
        assert!(!failed.success());
        assert_eq!(failed.error_message(), Some("HTTP 500: boom"));
        assert_eq!(failed.fault_kind(), Some(FaultKind::Http));
    }

    #[test]
    fn failed_record_never_carries_an_empty_message() {
        let failed = ResultRecord::failed(
            1,
            OperationKind::Consume,
            DependencyStatus::Available,
            Duration::ZERO,
            0,
            vec![],
            FaultKind::Transport,
            "",
        );
        assert_eq!(failed.error_message(), Some("transport"));
    }

    #[test]
    fn degenerate_record_is_an_internal_failure() {
        let r = ResultRecord::degenerate(
            7,
            OperationKind::Produce,
            DependencyStatus::Available,
            "worker task panicked",
        );
        assert_eq!(r.worker_id(), 7);
        assert_eq!(r.fault_kind(), Some(FaultKind::Internal));
        assert_eq!(r.http_status(), 0);
        assert!(r.steps().is_empty());
    }

    #[test]
    fn enums_render_snake_case() {
        assert_eq!(Phase::FetchResource.to_string(), "fetch_resource");
        assert_eq!(DependencyStatus::Unavailable.to_string(), "unavailable");
        assert_eq!("produce".parse::<OperationKind>(), Ok(OperationKind::Produce));
    }
}
