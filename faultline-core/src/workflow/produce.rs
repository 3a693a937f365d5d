use faultline_http::Multipart;
use rand::seq::SliceRandom as _;

use crate::api::{Reply, ResourceId, ServiceApi};
use crate::config::{Credentials, ProduceConfig, ServiceConfig};
use crate::error::StepError;
use crate::orchestrator::WorkerContext;
use crate::record::{OperationKind, Phase, ResultRecord};

use super::payload::{Payload, verify_payload};
use super::step::StepLog;

const PLAN: [Phase; 4] = [
    Phase::Login,
    Phase::Upload,
    Phase::ResolveLocator,
    Phase::Verify,
];

/// Login, upload a random payload, find where it landed and check it byte for byte.
pub async fn run(
    service: &ServiceConfig,
    cfg: &ProduceConfig,
    ctx: &WorkerContext,
) -> ResultRecord {
    let size = cfg.payload_size;
    let payload = match tokio::task::spawn_blocking(move || Payload::random(size)).await {
        Ok(payload) => payload,
        Err(err) => {
            return ResultRecord::degenerate(
                ctx.worker_id,
                OperationKind::Produce,
                ctx.dependency.status(),
                format!("payload generation failed: {err}"),
            );
        }
    };

    let mut api = ServiceApi::new(service);
    let mut log = StepLog::new(PLAN.to_vec(), ctx.dependency.status());

    log.step(Phase::Login, api.login(&ctx.credentials)).await;

    let style = cfg
        .styles
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_else(|| "other".to_string());
    // The upload borrows the payload buffer; after it only the fingerprint is kept.
    let fingerprint = payload.fingerprint();
    let form = upload_form(ctx.worker_id, &ctx.credentials, &style, payload);
    let Some(id) = log.step(Phase::Upload, api.upload(form)).await else {
        return log.finish(ctx.worker_id, OperationKind::Produce);
    };

    tokio::time::sleep(cfg.settle_delay).await;
    let Some(locator) = log
        .step(Phase::ResolveLocator, resolve_locator(&api, id))
        .await
    else {
        return log.finish(ctx.worker_id, OperationKind::Produce);
    };

    tokio::time::sleep(cfg.settle_delay).await;
    log.step(Phase::Verify, async {
        let reply = api.download(&locator, None).await?;
        verify_payload(&fingerprint, &reply.value, cfg.hash_ceiling)?;
        Ok::<_, StepError>(reply.map(|_| ()))
    })
    .await;

    log.finish(ctx.worker_id, OperationKind::Produce)
}

fn upload_form(worker_id: u64, creds: &Credentials, style: &str, payload: Payload) -> Multipart {
    let user = creds.email.split('@').next().unwrap_or("user");
    Multipart::new()
        .text("songName", format!("faultline_{user}_{worker_id}"))
        .text("style", style)
        .text("isRewardEnabled", "false")
        .text("duration", payload.estimated_duration_secs().to_string())
        .file(
            "audioFile",
            format!("faultline_{worker_id}.mp3"),
            "audio/mpeg",
            payload.data,
        )
}

/// New uploads may sit in moderation, invisible to public endpoints: look in the
/// uploader's own listing first, then fall back to the public detail.
async fn resolve_locator(api: &ServiceApi, id: ResourceId) -> Result<Reply<String>, StepError> {
    match own_listing_locator(api, id).await {
        Ok(Some(found)) => return Ok(found),
        Ok(None) => {}
        Err(err) => tracing::debug!(resource = id, error = %err, "own listing lookup failed"),
    }

    let detail = api.resource_detail(id).await?;
    let status = detail.status;
    match detail.value.locator {
        Some(locator) => Ok(Reply {
            status,
            value: locator,
        }),
        None => Err(StepError::EmptyLocator { status }),
    }
}

async fn own_listing_locator(
    api: &ServiceApi,
    id: ResourceId,
) -> Result<Option<Reply<String>>, StepError> {
    let user_id = api.user_id().await?.value;
    let listing = api.own_uploads(user_id).await?;
    let status = listing.status;
    Ok(listing
        .value
        .into_iter()
        .find(|r| r.id == Some(id))
        .and_then(|r| r.locator)
        .map(|locator| Reply {
            status,
            value: locator,
        }))
}
