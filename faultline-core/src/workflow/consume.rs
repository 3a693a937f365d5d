use rand::seq::SliceRandom as _;

use crate::api::{Reply, Resource, ResourceId, ServiceApi};
use crate::config::{ConsumeConfig, ServiceConfig};
use crate::error::StepError;
use crate::orchestrator::WorkerContext;
use crate::record::{OperationKind, Phase, ResultRecord};

use super::step::StepLog;

const PLAN: [Phase; 4] = [
    Phase::Login,
    Phase::FetchResource,
    Phase::ResolveLocator,
    Phase::Download,
];

/// Login, fetch a resource, partially download it.
pub async fn run(
    service: &ServiceConfig,
    cfg: &ConsumeConfig,
    ctx: &WorkerContext,
) -> ResultRecord {
    let mut api = ServiceApi::new(service);
    let mut log = StepLog::new(PLAN.to_vec(), ctx.dependency.status());

    log.step(Phase::Login, api.login(&ctx.credentials)).await;

    let resource = log
        .step(Phase::FetchResource, fetch_resource(&api, cfg.resource_id))
        .await;

    let status = log.last_status();
    let locator = log.local(Phase::ResolveLocator, || match resource {
        Some(Resource {
            locator: Some(locator),
            ..
        }) => Ok(locator),
        _ => Err(StepError::EmptyLocator { status }),
    });

    if let Some(locator) = locator {
        let body = log
            .step(Phase::Download, api.download(&locator, Some(cfg.range_bytes)))
            .await;
        if let Some(body) = body {
            tracing::trace!(
                worker_id = ctx.worker_id,
                bytes = body.len(),
                "partial download done"
            );
        }
    }

    log.finish(ctx.worker_id, OperationKind::Consume)
}

/// A fixed resource's detail, or a random pick from the recommended list.
async fn fetch_resource(
    api: &ServiceApi,
    id: Option<ResourceId>,
) -> Result<Reply<Resource>, StepError> {
    if let Some(id) = id {
        return api.resource_detail(id).await;
    }

    let reply = api.recommended().await?;
    let status = reply.status;
    let picked = reply.value.choose(&mut rand::thread_rng()).cloned();
    match picked {
        Some(resource) => Ok(Reply {
            status,
            value: resource,
        }),
        None => Err(StepError::protocol(status, "recommended list is empty")),
    }
}
