//! Manager reconciler
//!
//! A pass walks the manager's dependencies in a fixed order. The first one
//! that is missing or not ready stops the pass and is reported on the
//! `manager` TigeraStatus; once everything is in place the manager and its
//! certificates are rendered and applied.
//!
//! Passes end in one of three ways:
//! - waiting on a watched object: no requeue, the watch triggers the next pass
//! - waiting on something without a watch (API discovery, the license):
//!   requeue after [`WAIT_REQUEUE`]
//! - an error: handed to [`error_policy`]

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use tigera_common::crd::{
    Authentication, Manager, ManagerStatus, Provider, StatusReason, TigeraStatusState, TlsSpec,
};
use tigera_common::dns::{service_dns_names, DEFAULT_CLUSTER_DOMAIN};
use tigera_common::metrics::{self, ReconcileResult};
use tigera_common::pki::{CertificateManager, KeyPair};
use tigera_common::ready::ReadyFlag;
use tigera_common::status::{update_status_conditions, StatusManager};
use tigera_common::{
    Error, COMPLIANCE_FEATURE, ECK_OPERATOR_NAMESPACE, ELASTICSEARCH_NAMESPACE, MANAGER_NAMESPACE,
    OPERATOR_NAMESPACE, PROMETHEUS_NAMESPACE, TIGERA_COMPONENT_TIER,
};
use tigera_render::certificate_management::{
    certificate_management, CertificateManagementConfig, KeyPairOption,
};
use tigera_render::elasticsearch::{self, ClusterConfig, LicenseType};
use tigera_render::images::{image_set_name, validate_image_set};
use tigera_render::key_validator::{KeyValidatorConfig, STATIC_JWKS_CONFIG_MAP};
use tigera_render::manager::{
    manager as render_manager, manager_dns_names, ManagerConfiguration, LINSEED_SERVICE,
    MANAGER_INTERNAL_TLS_SECRET, MANAGER_TLS_SECRET, PACKET_CAPTURE_TLS_SECRET,
    VOLTRON_LINSEED_TLS_SECRET, VOLTRON_TUNNEL_SECRET,
};
use tigera_render::Component;

use crate::client::ManagerClient;
use crate::handler::ComponentHandler;

/// Name used for logs and metrics
pub const CONTROLLER_NAME: &str = "manager-controller";

/// TigeraStatus the controller reports on
pub const TIGERA_STATUS_NAME: &str = "manager";

/// Requeue delay while waiting on something that is not watched
pub const WAIT_REQUEUE: Duration = Duration::from_secs(10);

/// Requeue delay after an error
pub const ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Settings fixed for the lifetime of the operator
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Operator namespace, the source of truth for secrets
    pub operator_namespace: String,
    /// Cluster DNS domain
    pub cluster_domain: String,
    /// Kubernetes platform
    pub provider: Provider,
    /// Render PodSecurityPolicies
    pub use_psp: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            operator_namespace: OPERATOR_NAMESPACE.to_string(),
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            provider: Provider::None,
            use_psp: false,
        }
    }
}

/// Shared state of the manager controller
pub struct Context {
    /// Kubernetes access (trait object for testability)
    pub client: Arc<dyn ManagerClient>,
    /// Operator settings
    pub config: ControllerConfig,
    /// Set once the LicenseKey API is served
    pub license_api_ready: ReadyFlag,
    /// Set once the Tier watch is running
    pub tier_watch_ready: ReadyFlag,
}

impl Context {
    /// Context with unset ready flags
    pub fn new(client: Arc<dyn ManagerClient>, config: ControllerConfig) -> Self {
        Self {
            client,
            config,
            license_api_ready: ReadyFlag::new(),
            tier_watch_ready: ReadyFlag::new(),
        }
    }
}

/// Why a pass stopped early
enum Halt {
    Wait,
    Requeue(Duration),
    Fail(Error),
}

fn wait(status: &mut StatusManager, reason: StatusReason, message: impl Into<String>) -> Halt {
    status.set_degraded(reason, message, None);
    Halt::Wait
}

fn fail(
    status: &mut StatusManager,
    reason: StatusReason,
    message: impl Into<String>,
    err: Error,
) -> Halt {
    status.set_degraded(reason, message, Some(&err));
    Halt::Fail(err)
}

/// Reconcile the Manager
///
/// The TigeraStatus is written after every pass, whatever the outcome.
#[instrument(skip(manager, ctx), fields(manager = %manager.name_any()))]
pub async fn reconcile(manager: Arc<Manager>, ctx: Arc<Context>) -> Result<Action, Error> {
    let started = Instant::now();
    let name = manager.name_any();
    info!("reconciling Manager");

    let mut status = StatusManager::new(TIGERA_STATUS_NAME);
    let outcome = reconcile_manager(&name, &ctx, &mut status).await;

    if let Err(e) = status.flush(ctx.client.as_ref()).await {
        warn!(error = %e, "failed to write TigeraStatus");
    }

    let (result, action) = match outcome {
        Ok(()) => (ReconcileResult::Success, Ok(Action::await_change())),
        Err(Halt::Wait) => (ReconcileResult::Waiting, Ok(Action::await_change())),
        Err(Halt::Requeue(after)) => (ReconcileResult::Waiting, Ok(Action::requeue(after))),
        Err(Halt::Fail(e)) => (ReconcileResult::Error, Err(e)),
    };
    metrics::record_reconcile(CONTROLLER_NAME, result, started.elapsed().as_secs_f64());
    action
}

/// Error policy: log, then requeue transient errors
///
/// Permanent errors (validation, rendering) wait for a change to the Manager
/// or one of its watched dependencies.
pub fn error_policy(manager: Arc<Manager>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        manager = %manager.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(ERROR_REQUEUE)
    } else {
        Action::await_change()
    }
}

async fn reconcile_manager(
    name: &str,
    ctx: &Context,
    status: &mut StatusManager,
) -> Result<(), Halt> {
    let client = ctx.client.as_ref();
    let cfg = &ctx.config;
    let truth_ns = cfg.operator_namespace.as_str();
    let install_ns = MANAGER_NAMESPACE;

    let manager = match client.get_manager(name).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            info!("Manager object not found");
            status.on_cr_not_found();
            return Err(Halt::Wait);
        }
        Err(e) => {
            status.on_cr_found();
            return Err(fail(
                status,
                StatusReason::ResourceReadError,
                "Error querying Manager",
                e,
            ))
        }
    };
    status.on_cr_found();
    status.set_meta_data(manager.metadata.generation);
    if let Err(e) = manager.spec.validate() {
        let detail = match &e {
            Error::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        status.set_degraded(
            StatusReason::ResourceReadError,
            format!("Error querying Manager: {detail}"),
            None,
        );
        return Err(Halt::Fail(e));
    }

    let mut manager_status = manager.status.clone().unwrap_or_default();
    sync_status_conditions(client, name, &mut manager_status)
        .await
        .map_err(Halt::Fail)?;

    match client.get_api_server().await {
        Ok(Some(api)) if api.is_ready() => {}
        Ok(_) => {
            return Err(wait(
                status,
                StatusReason::ResourceNotReady,
                "Waiting for Tigera API server to be ready",
            ))
        }
        Err(e) => {
            return Err(fail(
                status,
                StatusReason::ResourceReadError,
                "Error querying Tigera API server resource",
                e,
            ))
        }
    }

    if !ctx.tier_watch_ready.is_ready() {
        status.set_degraded(
            StatusReason::ResourceNotReady,
            "Waiting for Tier watch to be established",
            None,
        );
        return Err(Halt::Requeue(WAIT_REQUEUE));
    }

    match client.get_tier(TIGERA_COMPONENT_TIER).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            status.set_degraded(
                StatusReason::ResourceNotReady,
                "Waiting for allow-tigera tier to be created",
                None,
            );
            return Err(Halt::Requeue(WAIT_REQUEUE));
        }
        Err(e) => {
            return Err(fail(
                status,
                StatusReason::ResourceReadError,
                "Error querying allow-tigera tier",
                e,
            ))
        }
    }

    if !ctx.license_api_ready.is_ready() {
        status.set_degraded(
            StatusReason::ResourceNotReady,
            "Waiting for LicenseKeyAPI to be ready",
            None,
        );
        return Err(Halt::Requeue(WAIT_REQUEUE));
    }

    let license = match client.get_license_key().await {
        Ok(Some(l)) => l,
        Ok(None) => {
            status.set_degraded(StatusReason::ResourceNotFound, "License not found", None);
            return Err(Halt::Requeue(WAIT_REQUEUE));
        }
        Err(e) => {
            status.set_degraded(StatusReason::ResourceReadError, "Error querying license", Some(&e));
            return Err(Halt::Requeue(WAIT_REQUEUE));
        }
    };

    let installation = match client.get_installation().await {
        Ok(Some(i)) => i,
        Ok(None) => {
            return Err(wait(
                status,
                StatusReason::ResourceNotFound,
                "Installation not found",
            ))
        }
        Err(e) => {
            return Err(fail(
                status,
                StatusReason::ResourceReadError,
                "Error querying installation",
                e,
            ))
        }
    };
    let (variant, installation) = installation.effective();

    let certificate_manager =
        match CertificateManager::create(client, truth_ns, &cfg.cluster_domain).await {
            Ok(cm) => cm,
            Err(e) => {
                return Err(fail(
                    status,
                    StatusReason::ResourceCreateError,
                    "Unable to create the Tigera CA",
                    e,
                ))
            }
        };

    let tls_key_pair = certificate_manager
        .get_or_create_key_pair(
            client,
            MANAGER_TLS_SECRET,
            truth_ns,
            &manager_dns_names(install_ns, &cfg.cluster_domain),
        )
        .await
        .map_err(|e| {
            fail(
                status,
                StatusReason::ResourceReadError,
                "Error getting or creating manager TLS certificate",
                e,
            )
        })?;

    let compliance_license_active = license.is_feature_active(COMPLIANCE_FEATURE);
    let compliance = client.get_compliance().await.map_err(|e| {
        fail(status, StatusReason::ResourceReadError, "Error querying compliance", e)
    })?;
    if compliance_license_active && compliance.as_ref().is_some_and(|c| !c.is_ready()) {
        return Err(wait(status, StatusReason::ResourceNotReady, "Compliance is not ready"));
    }

    let authentication = client.get_authentication().await.map_err(|e| {
        fail(
            status,
            StatusReason::ResourceReadError,
            "Error while fetching Authentication",
            e,
        )
    })?;
    if let Some(auth) = authentication.as_ref().filter(|a| !a.is_ready()) {
        return Err(wait(
            status,
            StatusReason::ResourceNotReady,
            format!(
                "Authentication is not ready authenticationCR status: {}",
                auth.state()
            ),
        ));
    }

    let mut trusted_bundle = certificate_manager.create_trusted_bundle();
    for (secret, ns) in [(PACKET_CAPTURE_TLS_SECRET, truth_ns)] {
        match certificate_manager.get_certificate(client, secret, ns).await {
            Ok(Some(cert)) => trusted_bundle.add_certificates([&cert]),
            Ok(None) => {
                info!(secret = %format!("{ns}/{secret}"), "waiting for secret");
                return Err(wait(
                    status,
                    StatusReason::ResourceNotReady,
                    format!("Waiting for secret '{ns}/{secret}' to become available"),
                ));
            }
            Err(e) => {
                return Err(fail(
                    status,
                    StatusReason::CertificateError,
                    format!("Failed to retrieve {ns}/{secret}"),
                    e,
                ))
            }
        }
    }

    match client.namespace_exists(PROMETHEUS_NAMESPACE).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(wait(
                status,
                StatusReason::ResourceNotFound,
                "tigera-prometheus namespace does not exist Dependency on tigera-prometheus not satisfied",
            ))
        }
        Err(e) => {
            return Err(fail(
                status,
                StatusReason::ResourceReadError,
                "Error querying prometheus",
                e,
            ))
        }
    }

    let pull_secrets = pull_secrets(client, &installation, truth_ns)
        .await
        .map_err(|e| {
            fail(
                status,
                StatusReason::ResourceReadError,
                "Error retrieving pull secrets",
                e,
            )
        })?;

    let cluster_config = match client
        .get_config_map(elasticsearch::CLUSTER_CONFIG_CONFIG_MAP, truth_ns)
        .await
        .and_then(|cm| cm.as_ref().map(ClusterConfig::from_config_map).transpose())
    {
        Ok(Some(c)) => c,
        Ok(None) => {
            return Err(wait(
                status,
                StatusReason::ResourceNotFound,
                "Elasticsearch cluster configuration is not available, waiting for it to become available",
            ))
        }
        Err(e) => {
            return Err(fail(
                status,
                StatusReason::ResourceReadError,
                "Failed to get the elasticsearch cluster configuration",
                e,
            ))
        }
    };

    let mut es_secrets = Vec::new();
    for secret in [
        elasticsearch::MANAGER_USER_SECRET,
        elasticsearch::PUBLIC_CERT_SECRET,
    ] {
        match client.get_secret(secret, truth_ns).await {
            Ok(Some(s)) => es_secrets.push(s),
            Ok(None) => {
                return Err(wait(
                    status,
                    StatusReason::ResourceNotFound,
                    "Elasticsearch secrets are not available yet, waiting until they become available",
                ))
            }
            Err(e) => {
                return Err(fail(
                    status,
                    StatusReason::ResourceReadError,
                    "Failed to get Elasticsearch credentials",
                    e,
                ))
            }
        }
    }

    let management_cluster = client.get_management_cluster().await.map_err(|e| {
        fail(status, StatusReason::ResourceReadError, "Error reading ManagementCluster", e)
    })?;
    let connection = client.get_management_cluster_connection().await.map_err(|e| {
        fail(
            status,
            StatusReason::ResourceReadError,
            "Error reading ManagementClusterConnection",
            e,
        )
    })?;
    if management_cluster.is_some() && connection.is_some() {
        let message =
            "having both a ManagementCluster and a ManagementClusterConnection is not supported";
        status.set_degraded(StatusReason::ResourceValidationError, message, None);
        return Err(Halt::Fail(Error::validation_for(
            "ManagementClusterConnection/tigera-secure",
            message,
        )));
    }

    let mut tunnel_secret = None;
    let mut internal_traffic_secret = None;
    let mut voltron_linseed_key_pair = None;
    let mut management_cluster = management_cluster;
    if let Some(mc) = management_cluster.as_mut() {
        let tunnel_name = default_tunnel_secret(client, mc).await.map_err(|e| {
            fail(
                status,
                StatusReason::ResourceUpdateError,
                "Error defaulting ManagementCluster TLS secret",
                e,
            )
        })?;

        let linseed_names =
            service_dns_names(LINSEED_SERVICE, ELASTICSEARCH_NAMESPACE, &cfg.cluster_domain);
        let linseed = certificate_manager
            .get_or_create_key_pair(client, VOLTRON_LINSEED_TLS_SECRET, install_ns, &linseed_names)
            .await
            .map_err(|e| {
                fail(
                    status,
                    StatusReason::ResourceReadError,
                    "Error getting or creating Voltron Linseed TLS certificate",
                    e,
                )
            })?;
        voltron_linseed_key_pair = Some(linseed);

        let tunnel = required_key_pair(&certificate_manager, client, &tunnel_name, truth_ns, status)
            .await?;
        let internal = required_key_pair(
            &certificate_manager,
            client,
            MANAGER_INTERNAL_TLS_SECRET,
            truth_ns,
            status,
        )
        .await?;
        trusted_bundle.add_certificates([&internal]);
        tunnel_secret = Some(tunnel);
        internal_traffic_secret = Some(internal);
    }

    let key_validator_config = key_validator_config(
        client,
        authentication.as_ref(),
        truth_ns,
        &cfg.cluster_domain,
    )
    .await
    .map_err(|e| {
        fail(
            status,
            StatusReason::ResourceValidationError,
            "Failed to process the authentication CR.",
            e,
        )
    })?;

    let es_license_type = if connection.is_none() {
        elastic_license_type(client).await.map_err(|e| {
            fail(
                status,
                StatusReason::ResourceReadError,
                "Failed to get Elasticsearch license",
                e,
            )
        })?
    } else {
        LicenseType::Unknown
    };

    let replicas = if management_cluster.is_some() || connection.is_some() {
        Some(1)
    } else {
        installation.control_plane_replicas
    };

    let manager_cfg = ManagerConfiguration {
        key_validator_config,
        es_secrets,
        trusted_bundle: trusted_bundle.clone(),
        cluster_config,
        tls_key_pair: tls_key_pair.clone(),
        voltron_linseed_key_pair: voltron_linseed_key_pair.clone(),
        pull_secrets,
        openshift: cfg.provider == Provider::OpenShift,
        installation,
        management_cluster,
        tunnel_secret: tunnel_secret.clone(),
        internal_traffic_secret: internal_traffic_secret.clone(),
        cluster_domain: cfg.cluster_domain.clone(),
        es_license_type,
        replicas,
        compliance,
        compliance_license_active,
        use_psp: cfg.use_psp,
        namespace: install_ns.to_string(),
    };
    let mut manager_component = render_manager(manager_cfg).map_err(|e| {
        fail(status, StatusReason::ResourceRenderingError, "Error rendering Manager", e)
    })?;

    let set_name = image_set_name(variant);
    let images = async {
        let image_set = client.get_image_set(&set_name).await?;
        if let Some(set) = &image_set {
            validate_image_set(set)?;
        }
        manager_component.resolve_images(image_set.as_ref())
    };
    images.await.map_err(|e| {
        fail(
            status,
            StatusReason::ResourceUpdateError,
            "Error with images from ImageSet",
            e,
        )
    })?;

    let key_pairs = [
        Some(KeyPairOption::new(certificate_manager.key_pair().clone(), false, true)),
        Some(KeyPairOption::new(tls_key_pair, true, true)),
        voltron_linseed_key_pair.map(|kp| KeyPairOption::new(kp, true, true)),
        internal_traffic_secret.map(|kp| KeyPairOption::new(kp, false, true)),
        tunnel_secret.map(|kp| KeyPairOption::new(kp, true, true)),
    ]
    .into_iter()
    .flatten()
    .collect();
    let certificates = certificate_management(CertificateManagementConfig {
        namespace: install_ns.to_string(),
        truth_namespace: truth_ns.to_string(),
        key_pairs,
        trusted_bundle: Some(trusted_bundle),
    });

    let handler = ComponentHandler::new(client)
        .with_owner(manager.controller_owner_ref(&()))
        .skip_owner_in(truth_ns);
    let components: [&dyn Component; 2] = [&manager_component, &certificates];
    for component in components {
        if let Err(e) = handler.create_or_update_or_delete(component, status).await {
            return Err(fail(
                status,
                StatusReason::ResourceUpdateError,
                "Error creating / updating resource",
                e,
            ));
        }
    }

    status.clear_degraded();
    let ready = handler.workloads_ready(status).await.map_err(Halt::Fail)?;
    status.set_workloads_ready(ready);

    if status.is_available() {
        let ready = manager_status.state(TigeraStatusState::Ready);
        client
            .update_manager_status(name, &ready)
            .await
            .map_err(Halt::Fail)?;
    } else {
        debug!("manager applied, waiting for rollout");
    }
    Ok(())
}

/// Mirror the `manager` TigeraStatus conditions on the Manager
async fn sync_status_conditions(
    client: &dyn ManagerClient,
    name: &str,
    manager_status: &mut ManagerStatus,
) -> Result<(), Error> {
    let Some(ts) = client.get_tigera_status(TIGERA_STATUS_NAME).await? else {
        return Ok(());
    };
    let tigera_conditions = ts.status.map(|s| s.conditions).unwrap_or_default();
    let conditions = update_status_conditions(&manager_status.conditions, &tigera_conditions);
    if conditions == manager_status.conditions {
        return Ok(());
    }
    manager_status.conditions = conditions;
    client.update_manager_status(name, manager_status).await
}

/// Pull secrets named by the Installation, read from the operator namespace
async fn pull_secrets(
    client: &dyn ManagerClient,
    installation: &tigera_common::crd::InstallationSpec,
    namespace: &str,
) -> Result<Vec<k8s_openapi::api::core::v1::Secret>, Error> {
    let mut secrets = Vec::with_capacity(installation.image_pull_secrets.len());
    for reference in &installation.image_pull_secrets {
        let secret = client
            .get_secret(&reference.name, namespace)
            .await?
            .ok_or_else(|| Error::not_found("Secret", format!("{namespace}/{}", reference.name)))?;
        secrets.push(secret);
    }
    Ok(secrets)
}

/// Default `spec.tls.secretName` and write it back; returns the secret name
async fn default_tunnel_secret(
    client: &dyn ManagerClient,
    mc: &mut tigera_common::crd::ManagementCluster,
) -> Result<String, Error> {
    if let Some(name) = mc.spec.tls.as_ref().and_then(|t| t.secret_name.clone()) {
        return Ok(name);
    }
    client
        .set_management_cluster_tls_secret(&mc.name_any(), VOLTRON_TUNNEL_SECRET)
        .await?;
    mc.spec.tls = Some(TlsSpec {
        secret_name: Some(VOLTRON_TUNNEL_SECRET.to_string()),
    });
    Ok(VOLTRON_TUNNEL_SECRET.to_string())
}

/// A key pair another controller provisions in the operator namespace
async fn required_key_pair(
    certificate_manager: &CertificateManager,
    client: &dyn ManagerClient,
    name: &str,
    namespace: &str,
    status: &mut StatusManager,
) -> Result<KeyPair, Halt> {
    match certificate_manager.get_key_pair(client, name, namespace).await {
        Ok(Some(kp)) => Ok(kp),
        Ok(None) => Err(wait(
            status,
            StatusReason::ResourceNotReady,
            format!("Waiting for secret {name} in namespace {namespace} to be available"),
        )),
        Err(e) => Err(fail(
            status,
            StatusReason::ResourceReadError,
            format!("Error fetching TLS secret {name} in namespace {namespace}"),
            e,
        )),
    }
}

async fn key_validator_config(
    client: &dyn ManagerClient,
    authentication: Option<&Authentication>,
    namespace: &str,
    cluster_domain: &str,
) -> Result<Option<KeyValidatorConfig>, Error> {
    let static_jwks = match authentication {
        Some(_) => client.get_config_map(STATIC_JWKS_CONFIG_MAP, namespace).await?,
        None => None,
    };
    KeyValidatorConfig::from_authentication(authentication, static_jwks.as_ref(), cluster_domain)
}

async fn elastic_license_type(client: &dyn ManagerClient) -> Result<LicenseType, Error> {
    let cm = client
        .get_config_map(elasticsearch::ECK_LICENSE_CONFIG_MAP, ECK_OPERATOR_NAMESPACE)
        .await?
        .ok_or_else(|| {
            Error::not_found(
                "ConfigMap",
                format!("{ECK_OPERATOR_NAMESPACE}/{}", elasticsearch::ECK_LICENSE_CONFIG_MAP),
            )
        })?;
    Ok(LicenseType::from_config_map(&cm))
}
