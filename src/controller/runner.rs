//! kube-runtime wiring for the NVIDIADriver controller
//!
//! One [`kube::runtime::Controller`] watches NVIDIADriver, fans ClusterPolicy
//! changes out over its own NVIDIADriver cache, and maps every child kind the
//! state manager declares back to its owner through the [`EventRouter`]. The
//! runtime scheduler dedupes requests per object, lets a newer request replace
//! a later pending one, and never runs two passes for the same object at once.
//! Concurrency is pinned to one so passes across drivers are serialized too.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::controller::{self, Action, Config as ControllerConfig};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Reconciler;
use crate::crd::{ClusterPolicy, NVIDIADriver};
use crate::retry::{OutcomeClass, RetryConfig, RetryScheduler};
use crate::router::{EventRouter, WatchEvent};
use crate::{Error, ReconcileRequest};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Shared state handed to every reconcile and error policy call
pub struct Context {
    reconciler: Arc<Reconciler>,
    retries: RetryScheduler<ReconcileRequest>,
    cancel: CancellationToken,
}

impl Context {
    /// Create a context; `cancel` aborts whatever pass is in flight
    pub fn new(reconciler: Arc<Reconciler>, retry: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            reconciler,
            retries: RetryScheduler::new(retry),
            cancel,
        }
    }

    /// Per-driver failure backoff
    pub fn retries(&self) -> &RetryScheduler<ReconcileRequest> {
        &self.retries
    }
}

/// Run one pass for `driver` and translate the outcome into an [`Action`].
///
/// Errors are returned untouched; [`error_policy`] picks their delay.
pub async fn reconcile(driver: Arc<NVIDIADriver>, ctx: Arc<Context>) -> Result<Action, Error> {
    let request = ObjectRef::from_obj(driver.as_ref());
    let result = Ok(ctx.reconciler.reconcile(&request, &ctx.cancel).await?);
    debug!(driver = %request.name, outcome = ?OutcomeClass::of(&result), "reconcile finished");

    Ok(match ctx.retries.schedule(&request, &result) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

/// Back off a failed pass using the driver's own failure count
pub fn error_policy(driver: Arc<NVIDIADriver>, error: &Error, ctx: Arc<Context>) -> Action {
    let request = ObjectRef::from_obj(driver.as_ref());
    let delay = ctx.retries.backoff(&request);
    match error {
        Error::Cancelled => debug!(driver = %request.name, "reconcile cancelled"),
        e => error!(
            driver = %request.name,
            error = %e,
            retry_ms = delay.as_millis() as u64,
            "reconcile failed, will retry"
        ),
    }
    Action::requeue(delay)
}

/// Build the NVIDIADriver controller future.
///
/// The future finishes once `cancel` fires and the pass in flight, if any,
/// has returned.
pub fn build_controller(
    client: Client,
    reconciler: Arc<Reconciler>,
    retry: RetryConfig,
    watch_timeout: Duration,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let timeout = u32::try_from(watch_timeout.as_secs()).unwrap_or(WATCH_TIMEOUT_SECS);
    let watcher_config = || WatcherConfig::default().timeout(timeout);

    let controller = Controller::new(Api::<NVIDIADriver>::all(client.clone()), watcher_config());
    let router = Arc::new(EventRouter::new(Arc::new(controller.store())));

    let policy_router = Arc::clone(&router);
    let mut controller = controller.watches(
        Api::<ClusterPolicy>::all(client.clone()),
        watcher_config(),
        move |policy| policy_router.route(&WatchEvent::Singleton(policy)),
    );

    for source in reconciler.state_manager().watch_sources() {
        if !router.accepts(&source) {
            warn!(
                kind = %source.resource.kind,
                owner_kind = %source.owner_kind,
                "skipping watch source not owned by NVIDIADriver"
            );
            continue;
        }
        debug!(kind = %source.resource.kind, "watching owned child kind");
        let child_router = Arc::clone(&router);
        controller = controller.watches_with(
            Api::<DynamicObject>::all_with(client.clone(), &source.resource),
            source.resource.clone(),
            watcher_config(),
            move |obj| child_router.route(&WatchEvent::Owned(obj)),
        );
    }

    info!(
        min_retry_ms = retry.initial_delay.as_millis() as u64,
        max_retry_ms = retry.max_delay.as_millis() as u64,
        "Starting NVIDIADriver controller"
    );
    let ctx = Arc::new(Context::new(reconciler, retry, cancel.clone()));

    Box::pin(
        controller
            .with_config(ControllerConfig::default().concurrency(1))
            .graceful_shutdown_on(cancel.cancelled_owned())
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("NVIDIADriver")),
    )
}

fn log_reconcile_result<T, E, Q>(
    controller_name: &'static str,
) -> impl Fn(Result<T, controller::Error<E, Q>>) -> std::future::Ready<()>
where
    T: std::fmt::Debug,
    E: std::error::Error + 'static,
    Q: std::error::Error + 'static,
{
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            // Already logged by error_policy
            Err(controller::Error::ReconcilerFailed(e, obj)) => {
                debug!(object = %obj, error = %e, "{} reconciliation error", controller_name)
            }
            Err(e) => warn!(error = %e, "{} controller error", controller_name),
        }
        std::future::ready(())
    }
}
