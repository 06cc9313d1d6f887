//! Controller wiring: watches, API waiters and the run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::{Api, DynamicObject};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use tigera_common::crd::{
    APIServer, Authentication, Compliance, ImageSet, Installation, LicenseKey, ManagementCluster,
    ManagementClusterConnection, Manager, TigeraStatus, Tier,
};
use tigera_common::kube_utils::{api_group_available, build_api_resource, crd_exists};
use tigera_common::pki::{CA_SECRET_NAME, TRUSTED_BUNDLE_NAME};
use tigera_common::ready::ReadyFlag;
use tigera_common::status::StatusManager;
use tigera_common::{
    Error, ECK_OPERATOR_NAMESPACE, MANAGER_NAMESPACE, PROMETHEUS_NAMESPACE, TIGERA_SECURE,
};
use tigera_render::elasticsearch;
use tigera_render::key_validator::STATIC_JWKS_CONFIG_MAP;
use tigera_render::manager::{
    COMPLIANCE_SERVER_TLS_SECRET, MANAGER_INTERNAL_TLS_SECRET, MANAGER_TLS_SECRET,
    PACKET_CAPTURE_TLS_SECRET, PROMETHEUS_TLS_SECRET, VOLTRON_LINSEED_TLS_SECRET,
    VOLTRON_TUNNEL_SECRET,
};

use crate::client::KubeManagerClient;
use crate::controller::{error_policy, reconcile, Context, ControllerConfig, TIGERA_STATUS_NAME};

/// Watcher timeout (seconds); must be less than the client read timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// How often API discovery is retried while an API is missing
const API_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Pending triggers from the background watches
const TRIGGER_BUFFER: usize = 16;

/// CRDs that must exist before the controller starts
pub const REQUIRED_CRDS: &[&str] = &[
    "installations.operator.tigera.io",
    "apiservers.operator.tigera.io",
    "authentications.operator.tigera.io",
    "compliances.operator.tigera.io",
    "managementclusters.operator.tigera.io",
    "managementclusterconnections.operator.tigera.io",
    "imagesets.operator.tigera.io",
];

/// Secrets whose changes affect the manager
pub const WATCHED_SECRETS: &[&str] = &[
    MANAGER_TLS_SECRET,
    elasticsearch::PUBLIC_CERT_SECRET,
    elasticsearch::MANAGER_USER_SECRET,
    VOLTRON_TUNNEL_SECRET,
    COMPLIANCE_SERVER_TLS_SECRET,
    PACKET_CAPTURE_TLS_SECRET,
    MANAGER_INTERNAL_TLS_SECRET,
    PROMETHEUS_TLS_SECRET,
    CA_SECRET_NAME,
    VOLTRON_LINSEED_TLS_SECRET,
];

/// ConfigMaps whose changes affect the manager
pub const WATCHED_CONFIG_MAPS: &[&str] = &[
    STATIC_JWKS_CONFIG_MAP,
    elasticsearch::CLUSTER_CONFIG_CONFIG_MAP,
    elasticsearch::ECK_LICENSE_CONFIG_MAP,
    TRUSTED_BUNDLE_NAME,
];

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

fn named(name: &str) -> WatcherConfig {
    watcher_config().fields(&format!("metadata.name={name}"))
}

/// The singleton Manager every watched change maps to
fn manager_ref() -> ObjectRef<Manager> {
    ObjectRef::new(TIGERA_SECURE)
}

fn to_manager<K>(_: K) -> Option<ObjectRef<Manager>> {
    Some(manager_ref())
}

fn secret_to_manager(secret: Secret) -> Option<ObjectRef<Manager>> {
    WATCHED_SECRETS
        .contains(&secret.name_any().as_str())
        .then(manager_ref)
}

fn config_map_to_manager(cm: ConfigMap) -> Option<ObjectRef<Manager>> {
    WATCHED_CONFIG_MAPS
        .contains(&cm.name_any().as_str())
        .then(manager_ref)
}

/// Whether the CRDs the controller depends on are installed
pub async fn required_crds_present(client: &Client) -> Result<bool, Error> {
    for crd in REQUIRED_CRDS {
        if !crd_exists(client, crd).await? {
            info!(crd = %crd, "required CRD not installed");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Run the manager controller until a shutdown signal arrives
pub async fn run(client: Client, config: ControllerConfig) {
    let operator_ns = config.operator_namespace.clone();
    let ctx = Arc::new(Context::new(
        Arc::new(KubeManagerClient::new(client.clone())),
        config,
    ));

    let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_BUFFER);
    spawn_api_waiters(&client, &ctx, trigger_tx);
    tokio::spawn(remove_status_on_delete(client.clone()));

    info!("starting Manager controller");
    Controller::new(Api::<Manager>::all(client.clone()), watcher_config())
        .owns(
            Api::<Deployment>::namespaced(client.clone(), MANAGER_NAMESPACE),
            watcher_config(),
        )
        .watches(Api::<APIServer>::all(client.clone()), watcher_config(), to_manager)
        .watches(Api::<Compliance>::all(client.clone()), watcher_config(), to_manager)
        .watches(
            Api::<ManagementCluster>::all(client.clone()),
            watcher_config(),
            to_manager,
        )
        .watches(
            Api::<ManagementClusterConnection>::all(client.clone()),
            watcher_config(),
            to_manager,
        )
        .watches(
            Api::<Authentication>::all(client.clone()),
            watcher_config(),
            to_manager,
        )
        .watches(Api::<Installation>::all(client.clone()), watcher_config(), to_manager)
        .watches(Api::<ImageSet>::all(client.clone()), watcher_config(), to_manager)
        .watches(
            Api::<TigeraStatus>::all(client.clone()),
            named(TIGERA_STATUS_NAME),
            to_manager,
        )
        .watches(
            Api::<Namespace>::all(client.clone()),
            named(PROMETHEUS_NAMESPACE),
            to_manager,
        )
        .watches(
            Api::<Secret>::namespaced(client.clone(), MANAGER_NAMESPACE),
            watcher_config(),
            secret_to_manager,
        )
        .watches(
            Api::<Secret>::namespaced(client.clone(), &operator_ns),
            watcher_config(),
            secret_to_manager,
        )
        .watches(
            Api::<ConfigMap>::namespaced(client.clone(), &operator_ns),
            watcher_config(),
            config_map_to_manager,
        )
        .watches(
            Api::<ConfigMap>::namespaced(client.clone(), ECK_OPERATOR_NAMESPACE),
            named(elasticsearch::ECK_LICENSE_CONFIG_MAP),
            config_map_to_manager,
        )
        .reconcile_all_on(ReceiverStream::new(trigger_rx))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("Manager"))
        .await;
    info!("Manager controller stopped");
}

/// Wait for the aggregated APIs, then watch them
///
/// The LicenseKey and Tier flags flip once their watches start, which
/// unblocks the reconcile gates that check them.
fn spawn_api_waiters(client: &Client, ctx: &Context, trigger: mpsc::Sender<()>) {
    let c = client.clone();
    let tx = trigger.clone();
    tokio::spawn(wait_for_api(
        client.clone(),
        "projectcalico.org",
        "LicenseKey",
        ctx.license_api_ready.clone(),
        async move { forward_changes(Api::<LicenseKey>::all(c), watcher_config(), tx).await },
    ));

    let c = client.clone();
    let tx = trigger.clone();
    tokio::spawn(wait_for_api(
        client.clone(),
        "projectcalico.org",
        "Tier",
        ctx.tier_watch_ready.clone(),
        async move { forward_changes(Api::<Tier>::all(c), watcher_config(), tx).await },
    ));

    let c = client.clone();
    tokio::spawn(wait_for_api(
        client.clone(),
        "projectcalico.org",
        "NetworkPolicy",
        ReadyFlag::new(),
        async move {
            let ar = build_api_resource("projectcalico.org/v3", "NetworkPolicy");
            let api = Api::<DynamicObject>::namespaced_with(c, MANAGER_NAMESPACE, &ar);
            forward_changes(api, watcher_config(), trigger).await
        },
    ));
}

async fn wait_for_api(
    client: Client,
    group: &'static str,
    kind: &'static str,
    ready: ReadyFlag,
    then: impl Future<Output = ()>,
) {
    loop {
        match api_group_available(&client, group, kind).await {
            Ok(true) => break,
            Ok(false) => debug!(%group, %kind, "API not served yet"),
            Err(e) => warn!(%group, %kind, error = %e, "API discovery failed"),
        }
        tokio::time::sleep(API_POLL_INTERVAL).await;
    }
    info!(%group, %kind, "API available, starting watch");
    ready.mark_as_ready();
    then.await;
}

/// Send a trigger for every change of the watched objects
async fn forward_changes<K>(api: Api<K>, config: WatcherConfig, trigger: mpsc::Sender<()>)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
{
    if trigger.send(()).await.is_err() {
        return;
    }
    let mut changes = watcher::watcher(api, config)
        .default_backoff()
        .touched_objects()
        .boxed();
    while let Some(change) = changes.next().await {
        match change {
            Ok(_) => {
                if trigger.send(()).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        }
    }
}

/// Remove the `manager` TigeraStatus when the Manager is deleted
///
/// The controller never reconciles deleted objects, so this runs beside it.
async fn remove_status_on_delete(client: Client) {
    let mut events = watcher::watcher(Api::<Manager>::all(client.clone()), watcher_config())
        .default_backoff()
        .boxed();
    while let Some(event) = events.next().await {
        if let Ok(watcher::Event::Delete(manager)) = event {
            info!(manager = %manager.name_any(), "Manager deleted, removing TigeraStatus");
            if let Err(e) = StatusManager::new(TIGERA_STATUS_NAME).flush(&client).await {
                warn!(error = %e, "failed to remove TigeraStatus");
            }
        }
    }
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn watched_secrets_map_to_the_singleton() {
        let secret = Secret {
            metadata: meta(MANAGER_TLS_SECRET),
            ..Default::default()
        };
        assert_eq!(secret_to_manager(secret), Some(manager_ref()));

        let other = Secret {
            metadata: meta("unrelated"),
            ..Default::default()
        };
        assert_eq!(secret_to_manager(other), None);
    }

    #[test]
    fn watched_config_maps_map_to_the_singleton() {
        let cm = ConfigMap {
            metadata: meta(elasticsearch::ECK_LICENSE_CONFIG_MAP),
            ..Default::default()
        };
        assert_eq!(config_map_to_manager(cm), Some(manager_ref()));

        let other = ConfigMap {
            metadata: meta("kube-root-ca.crt"),
            ..Default::default()
        };
        assert_eq!(config_map_to_manager(other), None);
    }

    #[test]
    fn every_change_maps_to_tigera_secure() {
        assert_eq!(to_manager(()).map(|r| r.name), Some(TIGERA_SECURE.to_string()));
    }
}
