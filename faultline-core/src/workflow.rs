mod consume;
mod interact;
mod payload;
mod produce;
mod step;

use std::sync::Arc;

use crate::api::ResourceId;
use crate::config::{ConsumeConfig, InteractConfig, ProduceConfig, ServiceConfig, WorkflowConfig};
use crate::orchestrator::{WorkerContext, Workload};
use crate::record::{OperationKind, ResultRecord};

pub use interact::{FALLBACK_POOL, discover_resource_pool};
pub use payload::{Fingerprint, Payload, digest, estimated_duration_secs, hex, verify_payload};

/// Only the first few workers log their failures, to keep large runs readable.
const VERBOSE_WORKERS: u64 = 5;

#[derive(Debug, Clone)]
enum Shape {
    Consume(ConsumeConfig),
    Produce(ProduceConfig),
    Interact {
        cfg: InteractConfig,
        pool: Arc<[ResourceId]>,
    },
}

/// A workflow bound to the service it runs against, ready to hand to the orchestrator.
#[derive(Debug, Clone)]
pub struct Workflow {
    service: ServiceConfig,
    shape: Shape,
}

impl Workflow {
    /// Bind `cfg` to `service`. The interact workflow without a configured pool
    /// discovers one from the service here, once, before any worker starts.
    pub async fn prepare(service: ServiceConfig, cfg: WorkflowConfig) -> Self {
        let shape = match cfg {
            WorkflowConfig::Consume(c) => Shape::Consume(c),
            WorkflowConfig::Produce(p) => Shape::Produce(p),
            WorkflowConfig::Interact(mut i) => {
                let pool = if i.pool.is_empty() {
                    discover_resource_pool(&service).await
                } else {
                    std::mem::take(&mut i.pool)
                };
                tracing::info!(resources = pool.len(), "resource pool ready");
                Shape::Interact {
                    cfg: i,
                    pool: pool.into(),
                }
            }
        };
        Self { service, shape }
    }

    pub fn name(&self) -> &'static str {
        match self.shape {
            Shape::Consume(_) => "consume",
            Shape::Produce(_) => "produce",
            Shape::Interact { .. } => "interact",
        }
    }

    pub fn resource_pool(&self) -> Option<&[ResourceId]> {
        match &self.shape {
            Shape::Interact { pool, .. } => Some(pool),
            _ => None,
        }
    }
}

impl Workload for Workflow {
    fn operation_at(&self, index: u64) -> OperationKind {
        match self.shape {
            Shape::Consume(_) => OperationKind::Consume,
            Shape::Produce(_) => OperationKind::Produce,
            Shape::Interact { .. } if index % 2 == 0 => OperationKind::Collect,
            Shape::Interact { .. } => OperationKind::Comment,
        }
    }

    fn records_per_worker(&self) -> u64 {
        match &self.shape {
            Shape::Interact { cfg, .. } => cfg.operations,
            _ => 1,
        }
    }

    async fn run(&self, ctx: WorkerContext) -> Vec<ResultRecord> {
        let records = match &self.shape {
            Shape::Consume(cfg) => vec![consume::run(&self.service, cfg, &ctx).await],
            Shape::Produce(cfg) => vec![produce::run(&self.service, cfg, &ctx).await],
            Shape::Interact { cfg, pool } => interact::run(&self.service, cfg, pool, &ctx).await,
        };

        if ctx.worker_id <= VERBOSE_WORKERS {
            for r in records.iter().filter(|r| !r.success()) {
                tracing::debug!(
                    worker_id = ctx.worker_id,
                    operation = %r.operation(),
                    dependency = %r.dependency(),
                    error = r.error_message().unwrap_or_default(),
                    "operation failed"
                );
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configured_pool_skips_discovery() {
        let service = ServiceConfig {
            // Nothing listens here; discovery would fall back to 2..=21.
            base_url: "http://127.0.0.1:9".to_string(),
            ..ServiceConfig::default()
        };
        let wf = Workflow::prepare(
            service,
            WorkflowConfig::Interact(InteractConfig {
                pool: vec![7, 8],
                ..InteractConfig::default()
            }),
        )
        .await;
        assert_eq!(wf.resource_pool(), Some(&[7, 8][..]));
        assert_eq!(wf.name(), "interact");
    }

    #[tokio::test]
    async fn interact_shape_alternates_operations() {
        let wf = Workflow::prepare(
            ServiceConfig::default(),
            WorkflowConfig::Interact(InteractConfig {
                operations: 4,
                pool: vec![1],
                ..InteractConfig::default()
            }),
        )
        .await;
        assert_eq!(wf.records_per_worker(), 4);
        assert_eq!(wf.operation_at(0), OperationKind::Collect);
        assert_eq!(wf.operation_at(1), OperationKind::Comment);
        assert_eq!(wf.operation_at(2), OperationKind::Collect);
    }

    #[tokio::test]
    async fn single_record_shapes() {
        let wf = Workflow::prepare(ServiceConfig::default(), WorkflowConfig::default()).await;
        assert_eq!(wf.name(), "consume");
        assert_eq!(wf.records_per_worker(), 1);
        assert_eq!(wf.operation_at(3), OperationKind::Consume);
        assert!(wf.resource_pool().is_none());
    }
}
