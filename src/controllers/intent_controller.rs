//! Intent controller
//!
//! Watches one intent kind and the adapter registry, and triggers
//! reconciliation. Only spec changes (a new `metadata.generation`) of the
//! intent itself enqueue it; the status writes of a pass do not, so a
//! failing intent is retried on the requeue policy's schedule.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        predicates,
        reflector::{self, ObjectRef},
        watcher::{self, Config as WatcherConfig},
        WatchStreamExt,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::controllers::{requeue_policy, Context, Reconciled};
use crate::error::{Error, Result};
use crate::metrics;
use crate::registry::REGISTRY_CONFIG_MAP;

/// Keep only events that change the object's generation
pub fn spec_changes<K, S>(events: S) -> impl Stream<Item = std::result::Result<K, watcher::Error>>
where
    K: Reconciled,
    S: Stream<Item = std::result::Result<K, watcher::Error>>,
{
    events.predicate_filter(predicates::generation)
}

/// Run the controller for intent kind `K`
pub async fn run<K: Reconciled>(client: Client, context: Arc<Context>) {
    let api: Api<K> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("{} CRD not installed: {}", K::LABEL, e);
        return;
    }

    info!("Starting {} controller", K::LABEL);

    let registry: Api<ConfigMap> = Api::namespaced(client, &context.config.namespace);
    let registry_watch =
        WatcherConfig::default().fields(&format!("metadata.name={}", REGISTRY_CONFIG_MAP));

    let (reader, writer) = reflector::store();
    let intents = watcher::watcher(api, WatcherConfig::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects();

    let controller = Controller::for_stream(spec_changes(intents), reader);
    let store = controller.store();

    controller
        // A registry change may turn a failed intent into a serviceable one
        .watches(registry, registry_watch, move |_| {
            store
                .state()
                .into_iter()
                .filter(|intent| intent.wants_registry_changes())
                .map(|intent| ObjectRef::from_obj(&*intent))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(name = %obj.name, "Reconciled {}", K::LABEL);
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&[K::LABEL])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(kind = K::LABEL, name = %obj.name_any()))]
async fn reconcile<K: Reconciled>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[K::LABEL])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[K::LABEL]).inc();

    K::reconcile(&obj.name_any(), &ctx).await
}

/// Error policy for the controller
fn error_policy<K: Reconciled>(obj: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        kind = K::LABEL,
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed"
    );
    requeue_policy(error)
}
