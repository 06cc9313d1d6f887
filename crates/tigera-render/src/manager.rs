//! Manager web console manifests
//!
//! The `tigera-manager` pod runs three containers: the UI itself, es-proxy
//! in front of Elasticsearch and Linseed, and Voltron, which terminates
//! TLS, authenticates users and, in a management cluster, accepts tunnels
//! from managed clusters.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, Secret,
    SecurityContext, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::json;
use tracing::debug;

use tigera_common::crd::{Compliance, ImageSet, InstallationSpec, ManagementCluster};
use tigera_common::dns::service_dns_names;
use tigera_common::pki::{KeyPair, TrustedBundle};
use tigera_common::{
    Error, Result, COMPLIANCE_NAMESPACE, ELASTICSEARCH_NAMESPACE, PROMETHEUS_NAMESPACE,
    TIGERA_COMPONENT_TIER,
};

use crate::common::{
    app_labels, cluster_role_binding, control_plane_node_selector, control_plane_tolerations,
    copy_image_pull_secrets, copy_secrets, create_namespace, meta, pull_secret_references, rule,
    service_account,
};
use crate::elasticsearch::{
    elasticsearch_container_decorate, elasticsearch_pod_spec_decorate, ClusterConfig, LicenseType,
};
use crate::images::{self, construct_image, ImageSettings};
use crate::key_validator::KeyValidatorConfig;
use crate::{Component, Manifest};

/// Name of the Deployment, Service and ServiceAccount
pub const MANAGER_NAME: &str = "tigera-manager";
/// ClusterRole and binding granting the manager its API access
pub const MANAGER_CLUSTER_ROLE: &str = "tigera-manager-role";
/// ClusterRole letting Voltron watch ManagedClusters
pub const MANAGED_CLUSTER_WATCH_ROLE: &str = "tigera-managed-cluster-watch";

/// TLS key pair Voltron serves the UI with
pub const MANAGER_TLS_SECRET: &str = "manager-tls";
/// Key pair for in-cluster traffic to Voltron from managed clusters
pub const MANAGER_INTERNAL_TLS_SECRET: &str = "internal-manager-tls";
/// Default key pair Voltron terminates managed-cluster tunnels with
pub const VOLTRON_TUNNEL_SECRET: &str = "tigera-management-cluster-connection";
/// Key pair Voltron serves Linseed traffic from managed clusters with
pub const VOLTRON_LINSEED_TLS_SECRET: &str = "tigera-voltron-linseed-tls";
/// Packet capture API server certificate
pub const PACKET_CAPTURE_TLS_SECRET: &str = "tigera-packetcapture-server-tls";
/// Compliance API server certificate
pub const COMPLIANCE_SERVER_TLS_SECRET: &str = "tigera-compliance-server-tls";
/// Prometheus client certificate
pub const PROMETHEUS_TLS_SECRET: &str = "calico-node-prometheus-tls";
/// Linseed service in the Elasticsearch namespace
pub const LINSEED_SERVICE: &str = "tigera-linseed";

/// Calico policy opening the manager's ports
pub const MANAGER_POLICY_NAME: &str = "allow-tigera.manager-access";
/// Calico policy denying everything else in the namespace
pub const DEFAULT_DENY_POLICY_NAME: &str = "allow-tigera.default-deny";

/// Port Voltron serves the UI on
pub const MANAGER_PORT: i32 = 9443;
/// Port Voltron accepts managed-cluster tunnels on
pub const TUNNEL_PORT: i32 = 9449;

const ES_PROXY_PORT: i32 = 8443;
const UI_PORT: i32 = 8080;
const ES_USER_MANAGER: &str = "tigera-ee-manager";
const CALICO_API_VERSION: &str = "projectcalico.org/v3";

/// DNS names on the manager certificate
pub fn manager_dns_names(namespace: &str, cluster_domain: &str) -> Vec<String> {
    let mut names = service_dns_names(MANAGER_NAME, namespace, cluster_domain);
    names.push("localhost".to_string());
    names
}

/// Inputs of the manager renderer
#[derive(Clone, Debug)]
pub struct ManagerConfiguration {
    /// Token validation; `None` keeps the UI on Kubernetes token login
    pub key_validator_config: Option<KeyValidatorConfig>,
    /// Elasticsearch secrets copied into the namespace
    pub es_secrets: Vec<Secret>,
    /// CAs the containers trust
    pub trusted_bundle: TrustedBundle,
    /// Elasticsearch cluster settings
    pub cluster_config: ClusterConfig,
    /// UI serving certificate
    pub tls_key_pair: KeyPair,
    /// Linseed serving certificate for managed clusters
    pub voltron_linseed_key_pair: Option<KeyPair>,
    /// Pull secrets copied into the namespace
    pub pull_secrets: Vec<Secret>,
    /// Running on OpenShift
    pub openshift: bool,
    /// Effective Installation spec
    pub installation: InstallationSpec,
    /// Present in a management cluster
    pub management_cluster: Option<ManagementCluster>,
    /// Tunnel key pair; required with a ManagementCluster
    pub tunnel_secret: Option<KeyPair>,
    /// Internal traffic key pair; required with a ManagementCluster
    pub internal_traffic_secret: Option<KeyPair>,
    /// Cluster DNS domain
    pub cluster_domain: String,
    /// License ECK runs with; unknown in managed clusters
    pub es_license_type: LicenseType,
    /// Deployment replicas; the API server default applies when `None`
    pub replicas: Option<i32>,
    /// Compliance resource, if installed
    pub compliance: Option<Compliance>,
    /// The license grants compliance reports
    pub compliance_license_active: bool,
    /// Render a PodSecurityPolicy
    pub use_psp: bool,
    /// Namespace to render into
    pub namespace: String,
}

#[derive(Clone, Debug)]
struct ManagerImages {
    manager: String,
    es_proxy: String,
    voltron: String,
}

/// Manager component
pub struct ManagerComponent {
    cfg: ManagerConfiguration,
    images: Option<ManagerImages>,
}

/// Create the manager component
///
/// A management cluster needs both the tunnel and internal traffic key pairs.
pub fn manager(cfg: ManagerConfiguration) -> Result<ManagerComponent> {
    if cfg.management_cluster.is_some() {
        if cfg.tunnel_secret.is_none() {
            return Err(Error::render("manager", "management cluster without tunnel secret"));
        }
        if cfg.internal_traffic_secret.is_none() {
            return Err(Error::render(
                "manager",
                "management cluster without internal traffic secret",
            ));
        }
    }
    Ok(ManagerComponent { cfg, images: None })
}

impl Component for ManagerComponent {
    fn name(&self) -> &str {
        "manager"
    }

    fn resolve_images(&mut self, image_set: Option<&ImageSet>) -> Result<()> {
        let settings = ImageSettings {
            registry: self.cfg.installation.registry.clone(),
            image_path: self.cfg.installation.image_path.clone(),
            image_prefix: self.cfg.installation.image_prefix.clone(),
        };
        self.images = Some(ManagerImages {
            manager: construct_image(&images::MANAGER, &settings, image_set)?,
            es_proxy: construct_image(&images::ES_PROXY, &settings, image_set)?,
            voltron: construct_image(&images::VOLTRON, &settings, image_set)?,
        });
        Ok(())
    }

    fn objects(&self) -> Result<(Vec<Manifest>, Vec<Manifest>)> {
        let images = self
            .images
            .as_ref()
            .ok_or_else(|| Error::render("manager", "images have not been resolved"))?;
        let ns = self.cfg.namespace.as_str();
        let mut create = Vec::new();
        let mut delete = Vec::new();

        create.push(Manifest::from_resource(&create_namespace(ns, self.cfg.openshift))?);
        for secret in copy_image_pull_secrets(&self.cfg.pull_secrets, ns) {
            create.push(Manifest::from_resource(&secret)?);
        }
        create.push(Manifest::from_resource(&service_account(MANAGER_NAME, ns))?);
        create.push(Manifest::from_resource(&self.cluster_role())?);
        create.push(Manifest::from_resource(&cluster_role_binding(
            MANAGER_CLUSTER_ROLE,
            MANAGER_CLUSTER_ROLE,
            MANAGER_NAME,
            ns,
        ))?);

        let watch_role = Manifest::from_resource(&managed_cluster_watch_role())?;
        let watch_binding = Manifest::from_resource(&cluster_role_binding(
            MANAGED_CLUSTER_WATCH_ROLE,
            MANAGED_CLUSTER_WATCH_ROLE,
            MANAGER_NAME,
            ns,
        ))?;
        if self.is_management_cluster() {
            create.extend([watch_role, watch_binding]);
        } else {
            delete.extend([watch_role, watch_binding]);
        }

        for secret in copy_secrets(ns, &self.cfg.es_secrets) {
            create.push(Manifest::from_resource(&secret)?);
        }
        if let Some(kvc) = &self.cfg.key_validator_config {
            for cm in kvc.required_config_maps(ns) {
                create.push(Manifest::from_resource(&cm)?);
            }
        }

        create.push(Manifest::from_resource(&self.service())?);
        create.push(self.manager_policy()?);
        create.push(default_deny_policy(ns)?);
        if self.cfg.use_psp {
            create.push(pod_security_policy()?);
        }
        create.push(Manifest::from_resource(&self.deployment(images))?);

        debug!(
            create = create.len(),
            delete = delete.len(),
            management = self.is_management_cluster(),
            "rendered manager objects"
        );
        Ok((create, delete))
    }

    fn ready(&self) -> bool {
        true
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn https_probe(path: &str, port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            scheme: Some("HTTPS".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(90),
        period_seconds: Some(10),
        ..Default::default()
    }
}

fn restricted_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        privileged: Some(false),
        run_as_non_root: Some(true),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn managed_cluster_watch_role() -> ClusterRole {
    ClusterRole {
        metadata: meta(MANAGED_CLUSTER_WATCH_ROLE, None),
        rules: Some(vec![rule(
            &["projectcalico.org"],
            &["managedclusters"],
            &["get", "list", "watch"],
        )]),
        ..Default::default()
    }
}

impl ManagerComponent {
    fn is_management_cluster(&self) -> bool {
        self.cfg.management_cluster.is_some()
    }

    fn compliance_enabled(&self) -> bool {
        self.cfg.compliance.is_some() && self.cfg.compliance_license_active
    }

    fn cluster_role(&self) -> ClusterRole {
        let mut rules = vec![
            rule(&["authorization.k8s.io"], &["subjectaccessreviews"], &["create"]),
            rule(&["authentication.k8s.io"], &["tokenreviews"], &["create"]),
            rule(
                &["projectcalico.org"],
                &[
                    "networksets",
                    "globalnetworksets",
                    "globalnetworkpolicies",
                    "tier.globalnetworkpolicies",
                    "networkpolicies",
                    "tier.networkpolicies",
                    "stagedglobalnetworkpolicies",
                    "tier.stagedglobalnetworkpolicies",
                    "stagednetworkpolicies",
                    "tier.stagednetworkpolicies",
                    "stagedkubernetesnetworkpolicies",
                ],
                &["list"],
            ),
            rule(
                &["projectcalico.org"],
                &["tiers"],
                &["get", "list"],
            ),
            rule(
                &[""],
                &["serviceaccounts", "namespaces", "nodes", "events", "services", "pods"],
                &["list"],
            ),
            rule(
                &["apps"],
                &["replicasets", "statefulsets", "daemonsets"],
                &["list"],
            ),
            rule(&[""], &["users", "groups", "serviceaccounts"], &["impersonate"]),
            rule(&["lma.tigera.io"], &["*"], &["get"]),
        ];
        if self.is_management_cluster() {
            rules.push(rule(
                &["projectcalico.org"],
                &["managedclusters"],
                &["list", "get", "watch", "update"],
            ));
        }
        if self.cfg.use_psp {
            rules.push(PolicyRule {
                resource_names: Some(vec![MANAGER_NAME.to_string()]),
                ..rule(&["policy"], &["podsecuritypolicies"], &["use"])
            });
        }
        ClusterRole {
            metadata: meta(MANAGER_CLUSTER_ROLE, None),
            rules: Some(rules),
            ..Default::default()
        }
    }

    fn service(&self) -> Service {
        let port = |name: &str, port: i32| ServicePort {
            name: Some(name.to_string()),
            port,
            protocol: Some("TCP".to_string()),
            target_port: Some(IntOrString::Int(port)),
            ..Default::default()
        };
        let mut ports = vec![port("https", MANAGER_PORT)];
        if self.is_management_cluster() {
            ports.push(port("tunnel", TUNNEL_PORT));
        }
        Service {
            metadata: meta(MANAGER_NAME, Some(&self.cfg.namespace)),
            spec: Some(ServiceSpec {
                ports: Some(ports),
                selector: Some(app_labels(MANAGER_NAME)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Key pairs mounted into the pod, UI certificate first
    fn mounted_key_pairs(&self) -> Vec<&KeyPair> {
        std::iter::once(&self.cfg.tls_key_pair)
            .chain(self.cfg.tunnel_secret.as_ref())
            .chain(self.cfg.internal_traffic_secret.as_ref())
            .chain(self.cfg.voltron_linseed_key_pair.as_ref())
            .collect()
    }

    fn annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = self.cfg.trusted_bundle.hash_annotations();
        annotations.extend(self.mounted_key_pairs().into_iter().map(KeyPair::hash_annotation));
        annotations
    }

    fn volumes(&self) -> Vec<Volume> {
        let mut volumes: Vec<Volume> = self
            .mounted_key_pairs()
            .into_iter()
            .map(KeyPair::volume)
            .collect();
        volumes.push(self.cfg.trusted_bundle.volume());
        if let Some(kvc) = &self.cfg.key_validator_config {
            volumes.extend(kvc.required_volumes());
        }
        volumes
    }

    fn manager_container(&self, image: &str) -> Container {
        let mcm = self.is_management_cluster();
        let mut vars = vec![
            env(
                "CNX_PROMETHEUS_API_URL",
                format!(
                    "/api/v1/namespaces/{PROMETHEUS_NAMESPACE}/services/calico-node-prometheus:9090/proxy/api/v1"
                ),
            ),
            env("CNX_COMPLIANCE_REPORTS_API_URL", "/compliance/reports"),
            env(
                "CNX_QUERY_API_URL",
                "/api/v1/namespaces/tigera-system/services/https:tigera-api:8080/proxy",
            ),
            env("CNX_ELASTICSEARCH_API_URL", "/tigera-elasticsearch"),
            env("CNX_ELASTICSEARCH_KIBANA_URL", "/tigera-kibana"),
            env("CNX_ENABLE_ERROR_TRACKING", "false"),
            env("CNX_ALP_SUPPORT", "true"),
            env("CNX_CLUSTER_NAME", self.cfg.cluster_config.cluster_name.clone()),
            env("CNX_POLICY_RECOMMENDATION_SUPPORT", "true"),
            env("ENABLE_MULTI_CLUSTER_MANAGEMENT", mcm.to_string()),
            env("ENABLE_COMPLIANCE_REPORTS", self.compliance_enabled().to_string()),
        ];
        match &self.cfg.key_validator_config {
            Some(kvc) => vars.extend([
                env("CNX_WEB_AUTHENTICATION_TYPE", "OIDC"),
                env("CNX_WEB_OIDC_AUTHORITY", kvc.issuer.clone()),
                env("CNX_WEB_OIDC_CLIENT_ID", kvc.client_id.clone()),
            ]),
            None => vars.push(env("CNX_WEB_AUTHENTICATION_TYPE", "Token")),
        }

        Container {
            name: MANAGER_NAME.to_string(),
            image: Some(image.to_string()),
            env: Some(vars),
            liveness_probe: Some(Probe {
                http_get: Some(HTTPGetAction {
                    path: Some("/".to_string()),
                    port: IntOrString::Int(UI_PORT),
                    ..Default::default()
                }),
                initial_delay_seconds: Some(90),
                period_seconds: Some(10),
                ..Default::default()
            }),
            security_context: Some(restricted_security_context()),
            ..Default::default()
        }
    }

    fn es_proxy_container(&self, image: &str) -> Container {
        let bundle = &self.cfg.trusted_bundle;
        let domain = &self.cfg.cluster_domain;
        let mut vars = vec![
            env("ELASTIC_LICENSE_TYPE", self.cfg.es_license_type.as_str()),
            env(
                "ELASTIC_KIBANA_ENDPOINT",
                format!("https://tigera-secure-es-gateway-http.{ELASTICSEARCH_NAMESPACE}.svc:5601"),
            ),
            env(
                "LINSEED_URL",
                format!("https://{LINSEED_SERVICE}.{ELASTICSEARCH_NAMESPACE}.svc.{domain}"),
            ),
            env("LINSEED_CA", bundle.mount_path()),
            env("FIPS_MODE_ENABLED", "false"),
        ];
        if let Some(kvc) = &self.cfg.key_validator_config {
            vars.extend(kvc.required_env(""));
        }

        let mut mounts = vec![bundle.volume_mount()];
        if let Some(kvc) = &self.cfg.key_validator_config {
            mounts.extend(kvc.required_volume_mounts());
        }

        let container = Container {
            name: "tigera-es-proxy".to_string(),
            image: Some(image.to_string()),
            env: Some(vars),
            volume_mounts: Some(mounts),
            liveness_probe: Some(https_probe("/tigera-elasticsearch/version", ES_PROXY_PORT)),
            security_context: Some(restricted_security_context()),
            ..Default::default()
        };
        elasticsearch_container_decorate(
            container,
            &self.cfg.cluster_config.cluster_name,
            ES_USER_MANAGER,
            domain,
        )
    }

    fn voltron_container(&self, image: &str) -> Container {
        let bundle = &self.cfg.trusted_bundle;
        let tls = &self.cfg.tls_key_pair;
        let domain = &self.cfg.cluster_domain;
        let mcm = self.is_management_cluster();
        let mut vars = vec![
            env("VOLTRON_PORT", MANAGER_PORT.to_string()),
            env(
                "VOLTRON_COMPLIANCE_ENDPOINT",
                format!("https://compliance.{COMPLIANCE_NAMESPACE}.svc.{domain}"),
            ),
            env("VOLTRON_LOGLEVEL", "info"),
            env(
                "VOLTRON_KIBANA_ENDPOINT",
                format!("https://tigera-secure-es-gateway-http.{ELASTICSEARCH_NAMESPACE}.svc:5601"),
            ),
            env("VOLTRON_KIBANA_BASE_PATH", "/tigera-kibana/"),
            env("VOLTRON_KIBANA_CA_BUNDLE_PATH", bundle.mount_path()),
            env("VOLTRON_PACKET_CAPTURE_CA_BUNDLE_PATH", bundle.mount_path()),
            env("VOLTRON_PROMETHEUS_CA_BUNDLE_PATH", bundle.mount_path()),
            env("VOLTRON_COMPLIANCE_CA_BUNDLE_PATH", bundle.mount_path()),
            env("VOLTRON_HTTPS_CERT", tls.cert_path()),
            env("VOLTRON_HTTPS_KEY", tls.key_path()),
            env("VOLTRON_ENABLE_MULTI_CLUSTER_MANAGEMENT", mcm.to_string()),
            env("VOLTRON_ENABLE_COMPLIANCE", self.compliance_enabled().to_string()),
            env("VOLTRON_TUNNEL_PORT", TUNNEL_PORT.to_string()),
            env(
                "VOLTRON_DEFAULT_FORWARD_SERVER",
                format!("tigera-secure-es-gateway-http.{ELASTICSEARCH_NAMESPACE}.svc:9200"),
            ),
        ];
        if let Some(tunnel) = &self.cfg.tunnel_secret {
            vars.extend([
                env("VOLTRON_TUNNEL_CERT", tunnel.cert_path()),
                env("VOLTRON_TUNNEL_KEY", tunnel.key_path()),
            ]);
        }
        if let Some(internal) = &self.cfg.internal_traffic_secret {
            vars.extend([
                env("VOLTRON_INTERNAL_HTTPS_CERT", internal.cert_path()),
                env("VOLTRON_INTERNAL_HTTPS_KEY", internal.key_path()),
            ]);
        }
        if let Some(linseed) = &self.cfg.voltron_linseed_key_pair {
            vars.extend([
                env("VOLTRON_LINSEED_SERVER_CERT", linseed.cert_path()),
                env("VOLTRON_LINSEED_SERVER_KEY", linseed.key_path()),
            ]);
        }
        if let Some(kvc) = &self.cfg.key_validator_config {
            vars.extend(kvc.required_env("VOLTRON_"));
        }

        let mut mounts: Vec<VolumeMount> = self
            .mounted_key_pairs()
            .into_iter()
            .map(KeyPair::volume_mount)
            .collect();
        mounts.push(bundle.volume_mount());
        if let Some(kvc) = &self.cfg.key_validator_config {
            mounts.extend(kvc.required_volume_mounts());
        }

        Container {
            name: "tigera-voltron".to_string(),
            image: Some(image.to_string()),
            env: Some(vars),
            volume_mounts: Some(mounts),
            liveness_probe: Some(https_probe("/voltron/api/health", MANAGER_PORT)),
            security_context: Some(restricted_security_context()),
            ..Default::default()
        }
    }

    fn deployment(&self, images: &ManagerImages) -> Deployment {
        let ns = self.cfg.namespace.as_str();
        let installation = Some(&self.cfg.installation);
        let spec = PodSpec {
            node_selector: Some(control_plane_node_selector(installation)),
            tolerations: Some(control_plane_tolerations(installation)),
            service_account_name: Some(MANAGER_NAME.to_string()),
            image_pull_secrets: pull_secret_references(&self.cfg.pull_secrets),
            containers: vec![
                self.manager_container(&images.manager),
                self.es_proxy_container(&images.es_proxy),
                self.voltron_container(&images.voltron),
            ],
            volumes: Some(self.volumes()),
            ..Default::default()
        };

        let mut pod_meta = meta(MANAGER_NAME, Some(ns));
        pod_meta.labels = Some(app_labels(MANAGER_NAME));
        pod_meta.annotations = Some(self.annotations());

        let mut metadata = meta(MANAGER_NAME, Some(ns));
        metadata.labels = Some(app_labels(MANAGER_NAME));
        Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: self.cfg.replicas,
                selector: LabelSelector {
                    match_labels: Some(app_labels(MANAGER_NAME)),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(pod_meta),
                    spec: Some(elasticsearch_pod_spec_decorate(spec)),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Ingress to the UI (and tunnel) ports; egress to the services the
    /// three containers call
    fn manager_policy(&self) -> Result<Manifest> {
        let mut ingress_ports = vec![MANAGER_PORT];
        if self.is_management_cluster() {
            ingress_ports.push(TUNNEL_PORT);
        }
        let dns = if self.cfg.openshift {
            json!({
                "action": "Allow", "protocol": "UDP",
                "destination": {
                    "namespaceSelector": "projectcalico.org/name == 'openshift-dns'",
                    "selector": "dns.operator.openshift.io/daemonset-dns == 'default'",
                    "ports": [5353],
                },
            })
        } else {
            json!({
                "action": "Allow", "protocol": "UDP",
                "destination": {
                    "namespaceSelector": "projectcalico.org/name == 'kube-system'",
                    "selector": "k8s-app == 'kube-dns'",
                    "ports": [53],
                },
            })
        };
        let egress = json!([
            dns,
            {
                "action": "Allow", "protocol": "TCP",
                "destination": {
                    "namespaceSelector": "projectcalico.org/name == 'default'",
                    "selector": "(provider == 'kubernetes' && component == 'apiserver' && endpoints.projectcalico.org/serviceName == 'kubernetes')",
                    "ports": [443, 6443, 12388],
                },
            },
            {
                "action": "Allow", "protocol": "TCP",
                "destination": {
                    "namespaceSelector": format!("projectcalico.org/name == '{ELASTICSEARCH_NAMESPACE}'"),
                    "selector": "k8s-app in { 'tigera-secure-es-gateway', 'tigera-linseed' }",
                    "ports": [5554, 8444],
                },
            },
            {
                "action": "Allow", "protocol": "TCP",
                "destination": {
                    "namespaceSelector": format!("projectcalico.org/name == '{COMPLIANCE_NAMESPACE}'"),
                    "selector": "k8s-app == 'compliance-server'",
                    "ports": [5443],
                },
            },
            {
                "action": "Allow", "protocol": "TCP",
                "destination": {
                    "namespaceSelector": format!("projectcalico.org/name == '{PROMETHEUS_NAMESPACE}'"),
                    "selector": "k8s-app == 'tigera-prometheus'",
                    "ports": [9095],
                },
            },
            { "action": "Pass" },
        ]);

        Manifest::from_value(json!({
            "apiVersion": CALICO_API_VERSION,
            "kind": "NetworkPolicy",
            "metadata": { "name": MANAGER_POLICY_NAME, "namespace": self.cfg.namespace },
            "spec": {
                "tier": TIGERA_COMPONENT_TIER,
                "order": 1,
                "selector": format!("k8s-app == '{MANAGER_NAME}'"),
                "types": ["Ingress", "Egress"],
                "serviceAccountSelector": "",
                "ingress": [{
                    "action": "Allow", "protocol": "TCP",
                    "destination": { "ports": ingress_ports },
                }],
                "egress": egress,
            },
        }))
    }
}

fn default_deny_policy(namespace: &str) -> Result<Manifest> {
    Manifest::from_value(json!({
        "apiVersion": CALICO_API_VERSION,
        "kind": "NetworkPolicy",
        "metadata": { "name": DEFAULT_DENY_POLICY_NAME, "namespace": namespace },
        "spec": {
            "tier": TIGERA_COMPONENT_TIER,
            "order": 100,
            "selector": "all()",
            "types": ["Ingress", "Egress"],
        },
    }))
}

fn pod_security_policy() -> Result<Manifest> {
    Manifest::from_value(json!({
        "apiVersion": "policy/v1beta1",
        "kind": "PodSecurityPolicy",
        "metadata": { "name": MANAGER_NAME },
        "spec": {
            "privileged": false,
            "allowPrivilegeEscalation": false,
            "requiredDropCapabilities": ["ALL"],
            "volumes": ["configMap", "emptyDir", "projected", "secret", "downwardAPI", "persistentVolumeClaim"],
            "hostNetwork": false,
            "hostIPC": false,
            "hostPID": false,
            "runAsUser": { "rule": "MustRunAsNonRoot" },
            "seLinux": { "rule": "RunAsAny" },
            "supplementalGroups": { "rule": "MustRunAs", "ranges": [{ "min": 1, "max": 65535 }] },
            "fsGroup": { "rule": "MustRunAs", "ranges": [{ "min": 1, "max": 65535 }] },
            "readOnlyRootFilesystem": false,
        },
    }))
}
