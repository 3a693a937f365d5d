use std::future::Future;
use std::time::{Duration, Instant};

use crate::api::Reply;
use crate::error::StepError;
use crate::record::{
    DependencyStatus, FaultKind, OperationKind, Phase, ResultRecord, StepOutcome, StepStatus,
};

/// Timeline of one operation: runs steps in order, stops at the first failure and turns
/// whatever happened into exactly one [`ResultRecord`].
#[derive(Debug)]
pub struct StepLog {
    planned: Vec<Phase>,
    dependency: DependencyStatus,
    started: Instant,
    steps: Vec<StepOutcome>,
    http_status: u16,
    failure: Option<(FaultKind, String)>,
}

impl StepLog {
    /// `dependency` is the monitor's belief when the operation is invoked.
    #[must_use]
    pub fn new(planned: Vec<Phase>, dependency: DependencyStatus) -> Self {
        Self {
            planned,
            dependency,
            started: Instant::now(),
            steps: Vec::new(),
            http_status: 0,
            failure: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Status of the most recent response; 0 before any response arrived.
    pub fn last_status(&self) -> u16 {
        self.http_status
    }

    /// Run a remote step. Returns `None` (without running it) once an earlier step
    /// failed, or when this one fails.
    pub async fn step<T, F>(&mut self, phase: Phase, fut: F) -> Option<T>
    where
        F: Future<Output = Result<Reply<T>, StepError>>,
    {
        if self.failed() {
            return None;
        }

        let started = Instant::now();
        let res = fut.await;
        let elapsed = started.elapsed();

        match res {
            Ok(reply) => {
                self.push(phase, StepStatus::Succeeded, elapsed, reply.status);
                Some(reply.value)
            }
            Err(err) => {
                self.fail(phase, elapsed, err);
                None
            }
        }
    }

    /// Run a step that never leaves the process (extraction, verification).
    pub fn local<T>(
        &mut self,
        phase: Phase,
        f: impl FnOnce() -> Result<T, StepError>,
    ) -> Option<T> {
        if self.failed() {
            return None;
        }

        let started = Instant::now();
        let res = f();
        let elapsed = started.elapsed();

        match res {
            Ok(value) => {
                let status = self.http_status;
                self.push(phase, StepStatus::Succeeded, elapsed, status);
                Some(value)
            }
            Err(err) => {
                self.fail(phase, elapsed, err);
                None
            }
        }
    }

    fn push(&mut self, phase: Phase, status: StepStatus, elapsed: Duration, http_status: u16) {
        if http_status != 0 {
            self.http_status = http_status;
        }
        self.steps.push(StepOutcome {
            phase,
            status,
            elapsed,
            http_status,
        });
    }

    fn fail(&mut self, phase: Phase, elapsed: Duration, err: StepError) {
        let http_status = err.http_status();
        self.push(phase, StepStatus::Failed, elapsed, http_status);
        if http_status == 0 && err.fault_kind() == FaultKind::Transport {
            // The call never completed.
            self.http_status = 0;
        }
        self.failure = Some((err.fault_kind(), format!("{phase}: {err}")));
    }

    /// Seal the log. Planned phases that never ran are recorded as not attempted.
    #[must_use]
    pub fn finish(mut self, worker_id: u64, operation: OperationKind) -> ResultRecord {
        let elapsed = self.started.elapsed();
        let ran = self.steps.len();
        for phase in self.planned.iter().skip(ran) {
            self.steps.push(StepOutcome::not_attempted(*phase));
        }

        match self.failure {
            None => ResultRecord::succeeded(
                worker_id,
                operation,
                self.dependency,
                elapsed,
                self.http_status,
                self.steps,
            ),
            Some((kind, message)) => ResultRecord::failed(
                worker_id,
                operation,
                self.dependency,
                elapsed,
                self.http_status,
                self.steps,
                kind,
                message,
            ),
        }
    }
}
