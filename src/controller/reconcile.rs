//! The reconcile pass
//!
//! One pass: fetch the NVIDIADriver, pick the ClusterPolicy, build an
//! [`InfoCatalog`], ask the state manager to sync, and map its answer to a
//! [`ReconcileAction`] or an error. Retry timing is left to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::{InfoCatalog, InfoType};
use crate::cluster_info::ClusterInfo;
use crate::crd::{ClusterPolicy, NVIDIADriver};
use crate::events::{actions, reasons, EventPublisher, NoopEventPublisher};
use crate::state::{StateManager, SyncOutcome};
use crate::store::DriverStore;
use crate::{Error, ReconcileRequest, DEFAULT_NOT_READY_REQUEUE};

/// What to do with a request after a successful pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Converged (or gone); wait for the next change
    Done,
    /// Converging; check again after the delay
    RequeueAfter(Duration),
}

/// Runs reconcile passes against injected dependencies
///
/// Holds no per-pass state: every pass builds its own catalog, so repeated
/// passes over an unchanged NVIDIADriver give the same outcome.
pub struct Reconciler {
    store: Arc<dyn DriverStore>,
    state: Arc<dyn StateManager>,
    cluster_info: Arc<ClusterInfo>,
    events: Arc<dyn EventPublisher>,
    not_ready_delay: Duration,
}

impl Reconciler {
    /// Create a reconciler; events are dropped until [`Reconciler::with_events`]
    pub fn new(
        store: Arc<dyn DriverStore>,
        state: Arc<dyn StateManager>,
        cluster_info: Arc<ClusterInfo>,
    ) -> Self {
        Self {
            store,
            state,
            cluster_info,
            events: Arc::new(NoopEventPublisher),
            not_ready_delay: DEFAULT_NOT_READY_REQUEUE,
        }
    }

    /// Publish sync outcomes as Kubernetes Events
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    /// Override the delay used when the driver is not ready yet
    pub fn with_not_ready_delay(mut self, delay: Duration) -> Self {
        self.not_ready_delay = delay;
        self
    }

    /// The state manager passes delegate to
    pub fn state_manager(&self) -> &Arc<dyn StateManager> {
        &self.state
    }

    /// Run one reconcile pass for `request`.
    ///
    /// Every API call and the sync itself race against `cancel`; a cancelled
    /// pass returns [`Error::Cancelled`].
    #[instrument(skip_all, fields(driver = %request.name))]
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<ReconcileAction, Error> {
        info!("Reconciling NVIDIADriver");

        let driver = match cancellable(cancel, self.store.get_driver(request)).await {
            Ok(Some(driver)) => driver,
            Ok(None) => {
                info!("NVIDIADriver not found, assuming it was deleted");
                return Ok(ReconcileAction::Done);
            }
            Err(e) if e.is_not_found() => {
                info!("NVIDIADriver not found, assuming it was deleted");
                return Ok(ReconcileAction::Done);
            }
            Err(e) => {
                error!(error = %e, "Error getting NVIDIADriver object");
                return Err(e);
            }
        };

        let policies = cancellable(cancel, self.store.list_cluster_policies())
            .await
            .inspect_err(|e| error!(error = %e, "error listing ClusterPolicy objects"))?;

        let policy = match select_cluster_policy(policies) {
            Ok(policy) => policy,
            Err(e) => {
                error!(error = %e, "cannot sync without a ClusterPolicy");
                self.publish(
                    &driver,
                    EventType::Warning,
                    reasons::CLUSTER_POLICY_MISSING,
                    Some(e.to_string()),
                )
                .await;
                return Err(e);
            }
        };

        let mut catalog = InfoCatalog::new();
        catalog.add(InfoType::ClusterInfo, Arc::clone(&self.cluster_info));
        catalog.add(InfoType::ClusterPolicy, policy);

        let outcome = cancellable(cancel, async {
            Ok(self.state.sync_state(&driver, &catalog).await)
        })
        .await?;

        // TODO: patch NVIDIADriverStatus (state, conditions) from the outcome;
        // until then Events and logs are the only report
        debug!(outcome = %outcome, "status write-back not performed");

        match outcome {
            SyncOutcome::Ready => {
                info!("NVIDIADriver instance is ready");
                self.publish(&driver, EventType::Normal, reasons::DRIVER_READY, None)
                    .await;
                Ok(ReconcileAction::Done)
            }
            SyncOutcome::NotReady => {
                info!(
                    requeue_after_secs = self.not_ready_delay.as_secs(),
                    "NVIDIADriver instance is not ready"
                );
                self.publish(&driver, EventType::Normal, reasons::DRIVER_NOT_READY, None)
                    .await;
                Ok(ReconcileAction::RequeueAfter(self.not_ready_delay))
            }
            SyncOutcome::Error(msg) => {
                warn!(error = %msg, "NVIDIADriver sync failed");
                self.publish(
                    &driver,
                    EventType::Warning,
                    reasons::SYNC_FAILED,
                    Some(msg.clone()),
                )
                .await;
                Err(Error::sync(msg))
            }
        }
    }

    async fn publish(
        &self,
        driver: &NVIDIADriver,
        type_: EventType,
        reason: &str,
        note: Option<String>,
    ) {
        let reference = driver.object_ref(&());
        self.events
            .publish(&reference, type_, reason, actions::RECONCILE, note)
            .await;
    }
}

/// Pick the ClusterPolicy a pass uses.
///
/// The first listed instance wins. More than one instance is not rejected,
/// only logged.
pub fn select_cluster_policy(policies: Vec<ClusterPolicy>) -> Result<ClusterPolicy, Error> {
    let count = policies.len();
    let policy = policies
        .into_iter()
        .next()
        .ok_or_else(|| Error::configuration("no ClusterPolicy object found in the cluster"))?;

    if count > 1 {
        warn!(
            count,
            selected = %policy.name_any(),
            "multiple ClusterPolicy objects found, using the first"
        );
    }
    Ok(policy)
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
