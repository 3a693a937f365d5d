use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom as _;

use crate::api::{Reply, ResourceId, ServiceApi};
use crate::config::{InteractConfig, ServiceConfig};
use crate::error::StepError;
use crate::orchestrator::WorkerContext;
use crate::record::{FaultKind, OperationKind, Phase, ResultRecord, StepOutcome, StepStatus};

use super::step::StepLog;

/// Resources targeted when the recommended list cannot be fetched.
pub const FALLBACK_POOL: std::ops::RangeInclusive<ResourceId> = 2..=21;
const POOL_SIZE: usize = 20;

/// Log in once, then run `cfg.operations` collect/comment operations, one record each.
///
/// Each operation is tagged with the dependency state at its own start. If login fails
/// every operation still yields a failed record, so a worker always reports exactly
/// `cfg.operations` records.
pub async fn run(
    service: &ServiceConfig,
    cfg: &InteractConfig,
    pool: &[ResourceId],
    ctx: &WorkerContext,
) -> Vec<ResultRecord> {
    let mut api = ServiceApi::new(service);
    let mut records = Vec::with_capacity(usize::try_from(cfg.operations).unwrap_or(0));
    let mut login_failure: Option<ResultRecord> = None;

    for i in 0..cfg.operations {
        let (operation, phase) = if i % 2 == 0 {
            (OperationKind::Collect, Phase::Collect)
        } else {
            (OperationKind::Comment, Phase::Comment)
        };

        if let Some(failed) = &login_failure {
            records.push(ResultRecord::failed(
                ctx.worker_id,
                operation,
                ctx.dependency.status(),
                Duration::ZERO,
                failed.http_status(),
                vec![StepOutcome::not_attempted(phase)],
                failed.fault_kind().unwrap_or(FaultKind::Internal),
                failed.error_message().unwrap_or_default(),
            ));
            continue;
        }

        if i > 0 {
            tokio::time::sleep(cfg.delay).await;
        }

        let plan = if i == 0 {
            vec![Phase::Login, phase]
        } else {
            vec![phase]
        };
        let mut log = StepLog::new(plan, ctx.dependency.status());

        if i == 0 {
            log.step(
                Phase::Login,
                with_timeout(cfg.timeout, api.login(&ctx.credentials)),
            )
            .await;
        }

        let target = pool.choose(&mut rand::thread_rng()).copied();
        match (phase, target) {
            (_, None) => {
                log.local(phase, || {
                    Err::<(), _>(StepError::protocol(0, "resource pool is empty"))
                });
            }
            (Phase::Collect, Some(id)) => {
                log.step(phase, with_timeout(cfg.timeout, api.collect(id)))
                    .await;
            }
            (_, Some(id)) => {
                let content = comment_text(&ctx.credentials.email, i);
                log.step(phase, with_timeout(cfg.timeout, api.comment(id, &content)))
                    .await;
            }
        }

        let record = log.finish(ctx.worker_id, operation);
        if i == 0 && login_step_failed(&record) {
            login_failure = Some(record.clone());
        }
        records.push(record);
    }

    records
}

fn login_step_failed(record: &ResultRecord) -> bool {
    record
        .steps()
        .first()
        .is_some_and(|s| s.phase == Phase::Login && s.status == StepStatus::Failed)
}

fn comment_text(email: &str, i: u64) -> String {
    let user = email.split('@').next().unwrap_or("user");
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("faultline comment {user} #{i} @{ts}")
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<Reply<T>, StepError>>,
) -> Result<Reply<T>, StepError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(StepError::Transport(faultline_http::Error::Timeout(timeout))),
    }
}

/// Up to twenty resource ids from the recommended list, or [`FALLBACK_POOL`] when the
/// list is unavailable or empty.
pub async fn discover_resource_pool(service: &ServiceConfig) -> Vec<ResourceId> {
    let api = ServiceApi::new(service);
    let ids: Vec<ResourceId> = match api.recommended().await {
        Ok(reply) => reply
            .value
            .iter()
            .filter_map(|r| r.id)
            .take(POOL_SIZE)
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "could not fetch resource pool, using fallback ids");
            Vec::new()
        }
    };

    if ids.is_empty() {
        return FALLBACK_POOL.collect();
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_pool_has_twenty_ids() {
        let pool: Vec<ResourceId> = FALLBACK_POOL.collect();
        assert_eq!(pool.len(), 20);
        assert_eq!(pool.first(), Some(&2));
        assert_eq!(pool.last(), Some(&21));
    }

    #[test]
    fn comment_text_names_user_and_index() {
        let text = comment_text("testuser3@test.com", 5);
        assert!(text.starts_with("faultline comment testuser3 #5 @"), "{text}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operations_time_out_as_transport_faults() {
        let fut = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, StepError>(Reply { status: 200, value: () })
        };
        match with_timeout(Duration::from_secs(30), fut).await {
            Err(err) => assert_eq!(err.fault_kind(), FaultKind::Transport),
            Ok(_) => panic!("expected a timeout"),
        }
    }
}
