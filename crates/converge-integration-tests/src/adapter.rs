//! Resource adapters: submit a mutation, then converge on its outcome.

use crate::control_plane::{ApiError, ControlPlane, Resource};
use converge_core::classify::{self, Classifier};
use converge_core::probe::{ProbeResult, absent_on};
use converge_core::timeouts::{Operation, ResourceTimeouts};
use converge_core::{ConfigError, RetrySpec, WaitSpec};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

/// Create timeout used when the user configured none.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Delete timeout used when the user configured none.
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Budget for waiting out IAM role propagation.
pub const ROLE_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Errors surfaced by the adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter built an invalid retry or wait spec.
    #[error("invalid convergence settings: {0}")]
    Config(#[from] ConfigError),

    /// The resource failed to converge.
    #[error(transparent)]
    Converge(#[from] converge_core::Error<ApiError>),

    /// A create wait converged without returning the resource.
    #[error("{0} disappeared while waiting for it to become available")]
    Vanished(String),
}

/// Throttling is the only API error worth retrying by default.
pub fn api_classifier() -> Classifier<ApiError> {
    classify::classifier(|e: &ApiError| e.is_throttled().into())
}

async fn probe(plane: &dyn ControlPlane, id: &str) -> Result<ProbeResult<Resource>, ApiError> {
    let resource = plane.describe(id).await?;
    let state = resource.state.clone();
    Ok(ProbeResult::new(resource, state))
}

/// Create a resource of `kind` and wait until it is `available`.
///
/// A resource that is not yet visible right after creation is tolerated;
/// one that lands in any state other than `pending` or `available` fails
/// the create. The configured timeout covers submission and the wait
/// together.
pub async fn create_resource(
    plane: &dyn ControlPlane,
    kind: &str,
    timeouts: &ResourceTimeouts,
) -> Result<Resource, AdapterError> {
    let timeout = timeouts.resolve(Operation::Create, DEFAULT_CREATE_TIMEOUT);
    let started = Instant::now();

    let submit = RetrySpec::builder()
        .operation(format!("create {kind}"))
        .timeout(timeout)
        .classifier(api_classifier())
        .build()?;
    let created = submit.execute(|| plane.create(kind)).await?;
    let id = created.id;
    info!(id = %id, kind, "Create submitted, waiting for resource to become available");

    let wait = WaitSpec::builder()
        .resource(format!("{kind} {id}"))
        .pending(["pending"])
        .target(["available"])
        .timeout(timeout.saturating_sub(started.elapsed()))
        .delay(Duration::from_secs(1))
        .min_poll_interval(Duration::from_secs(1))
        .max_poll_interval(Duration::from_secs(5))
        .build()?;
    let ready = wait
        .wait_for(|| absent_on(probe(plane, &id), ApiError::is_not_found))
        .await?;

    ready.ok_or(AdapterError::Vanished(id))
}

/// Delete `id` and wait until it is gone.
///
/// Deleting a resource that no longer exists succeeds. The configured
/// timeout covers submission and the wait together.
pub async fn delete_resource(
    plane: &dyn ControlPlane,
    id: &str,
    timeouts: &ResourceTimeouts,
) -> Result<(), AdapterError> {
    let timeout = timeouts.resolve(Operation::Delete, DEFAULT_DELETE_TIMEOUT);
    let started = Instant::now();

    let submit = RetrySpec::builder()
        .operation(format!("delete {id}"))
        .timeout(timeout)
        .classifier(api_classifier())
        .build()?;
    match submit.execute(|| plane.delete(id)).await {
        Ok(()) => {}
        Err(converge_core::Error::NonRetryable { cause }) if cause.is_not_found() => {
            info!(id, "Resource already deleted");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    let wait = WaitSpec::builder()
        .resource(id)
        .pending(["available", "deleting"])
        .timeout(timeout.saturating_sub(started.elapsed()))
        .min_poll_interval(Duration::from_secs(1))
        .build()?;
    wait.wait_for(|| absent_on(probe(plane, id), ApiError::is_not_found))
        .await?;

    info!(id, "Resource deleted");
    Ok(())
}

/// Create a function, retrying while its execution role propagates.
pub async fn create_function(
    plane: &dyn ControlPlane,
    name: &str,
    role: &str,
) -> Result<Resource, AdapterError> {
    let spec = RetrySpec::builder()
        .operation(format!("create function {name}"))
        .timeout(ROLE_PROPAGATION_TIMEOUT)
        .classifier(classify::any_of([
            api_classifier(),
            classify::message_contains(["cannot be assumed"]),
        ]))
        .build()?;

    Ok(spec.execute(|| plane.create_function(name, role)).await?)
}
