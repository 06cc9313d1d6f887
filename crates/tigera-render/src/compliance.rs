//! Compliance subsystem manifests
//!
//! Renders the controller, reporter pod template, API server, snapshotter
//! and CIS benchmarker, their RBAC, and the four built-in GlobalReportTypes.
//! The object set is static apart from the image references, the pull and
//! Elasticsearch secrets, and the OpenShift SecurityContextConstraints.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, DeploymentStrategy,
};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, HTTPGetAction, HostPathVolumeSource, ObjectFieldSelector,
    PodSpec, PodTemplate, PodTemplateSpec, Probe, Secret, SecurityContext, Service, ServicePort,
    ServiceSpec, Toleration, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, Role};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use serde::Serialize;
use tracing::debug;

use tigera_common::crd::{
    AuditEventsSelection, AuditResource, GlobalReportType, ImageSet, ReportTemplate,
    ReportTypeSpec,
};
use tigera_common::dns::DEFAULT_CLUSTER_DOMAIN;
use tigera_common::{Error, Result, COMPLIANCE_NAMESPACE};

use crate::common::{
    app_labels, cluster_role_binding, copy_image_pull_secrets, copy_secrets, create_namespace,
    meta, pull_secret_references, role_binding, rule, service_account,
};
use crate::elasticsearch::{elasticsearch_container_decorate, elasticsearch_pod_spec_decorate};
use crate::images::{self, construct_image, ImageSettings};
use crate::{Component, Manifest};

/// Elasticsearch user of the benchmarker
pub const ES_USER_BENCHMARKER: &str = "tigera-ee-compliance-benchmarker";
/// Elasticsearch user of the controller
pub const ES_USER_CONTROLLER: &str = "tigera-ee-compliance-controller";
/// Elasticsearch user of the reporter
pub const ES_USER_REPORTER: &str = "tigera-ee-compliance-reporter";
/// Elasticsearch user of the snapshotter
pub const ES_USER_SNAPSHOTTER: &str = "tigera-ee-compliance-snapshotter";
/// Elasticsearch user of the API server
pub const ES_USER_SERVER: &str = "tigera-ee-compliance-server";

const CONTROLLER: &str = "compliance-controller";
const SERVER: &str = "compliance-server";
const SNAPSHOTTER: &str = "compliance-snapshotter";
const BENCHMARKER: &str = "compliance-benchmarker";
const REPORTER_APP: &str = "compliance-reporter";
const REPORTER_TEMPLATE: &str = "tigera.io.report";

const CONTROLLER_SA: &str = "tigera-compliance-controller";
const REPORTER_SA: &str = "tigera-compliance-reporter";
const SERVER_SA: &str = "tigera-compliance-server";
const SNAPSHOTTER_SA: &str = "tigera-compliance-snapshotter";
const BENCHMARKER_SA: &str = "tigera-compliance-benchmarker";

const REPORT_TYPE_LABEL: &str = "global-report-type";
const LIVENESS_PORT: i32 = 9099;

/// Inputs of the compliance renderer
#[derive(Clone, Debug, Default)]
pub struct ComplianceConfiguration {
    /// Elasticsearch user and CA secrets, copied into the namespace last
    pub es_secrets: Vec<Secret>,
    /// Registry settings
    pub image_settings: ImageSettings,
    /// Elasticsearch cluster name, used as index suffix
    pub cluster_name: String,
    /// Pull secrets copied into the namespace
    pub pull_secrets: Vec<Secret>,
    /// Render the OpenShift SecurityContextConstraints
    pub openshift: bool,
    /// Cluster DNS domain; [`DEFAULT_CLUSTER_DOMAIN`] when empty
    pub cluster_domain: String,
}

#[derive(Clone, Debug)]
struct ComplianceImages {
    controller: String,
    reporter: String,
    server: String,
    snapshotter: String,
    benchmarker: String,
}

/// Compliance component
pub struct ComplianceComponent {
    cfg: ComplianceConfiguration,
    images: Option<ComplianceImages>,
}

/// Create the compliance component
pub fn compliance(cfg: ComplianceConfiguration) -> ComplianceComponent {
    ComplianceComponent { cfg, images: None }
}

impl Component for ComplianceComponent {
    fn name(&self) -> &str {
        "compliance"
    }

    fn resolve_images(&mut self, image_set: Option<&ImageSet>) -> Result<()> {
        let settings = &self.cfg.image_settings;
        let resolve = |image: &images::ComponentImage| construct_image(image, settings, image_set);
        self.images = Some(ComplianceImages {
            controller: resolve(&images::COMPLIANCE_CONTROLLER)?,
            reporter: resolve(&images::COMPLIANCE_REPORTER)?,
            server: resolve(&images::COMPLIANCE_SERVER)?,
            snapshotter: resolve(&images::COMPLIANCE_SNAPSHOTTER)?,
            benchmarker: resolve(&images::COMPLIANCE_BENCHMARKER)?,
        });
        Ok(())
    }

    fn objects(&self) -> Result<(Vec<Manifest>, Vec<Manifest>)> {
        let images = self
            .images
            .as_ref()
            .ok_or_else(|| Error::render("compliance", "images have not been resolved"))?;
        let ns = COMPLIANCE_NAMESPACE;
        let mut objs = Objects::default();

        objs.add(&create_namespace(ns, self.cfg.openshift))?;
        for secret in copy_image_pull_secrets(&self.cfg.pull_secrets, ns) {
            objs.add(&secret)?;
        }

        objs.add(&service_account(CONTROLLER_SA, ns))?;
        objs.add(&controller_role())?;
        objs.add(&cluster_role(
            CONTROLLER_SA,
            vec![
                rule(&["projectcalico.org"], &["globalreports"], &["list"]),
                rule(&["projectcalico.org"], &["globalreports/status"], &["update", "list"]),
                rule(&["projectcalico.org"], &["globalreports/finalizers"], &["update"]),
            ],
        ))?;
        objs.add(&role_binding(CONTROLLER_SA, CONTROLLER_SA, CONTROLLER_SA, ns))?;
        objs.add(&cluster_role_binding(CONTROLLER_SA, CONTROLLER_SA, CONTROLLER_SA, ns))?;
        objs.add(&self.controller_deployment(&images.controller))?;

        objs.add(&service_account(REPORTER_SA, ns))?;
        objs.add(&cluster_role(
            REPORTER_SA,
            vec![rule(
                &["projectcalico.org"],
                &["globalreporttypes", "globalreports"],
                &["get"],
            )],
        ))?;
        objs.add(&cluster_role_binding(REPORTER_SA, REPORTER_SA, REPORTER_SA, ns))?;
        objs.add(&self.reporter_pod_template(&images.reporter))?;

        objs.add(&service_account(SERVER_SA, ns))?;
        objs.add(&cluster_role(
            SERVER_SA,
            vec![
                rule(
                    &["projectcalico.org"],
                    &["globalreporttypes", "globalreports"],
                    &["get", "list", "watch"],
                ),
                rule(&["authentication.k8s.io"], &["tokenreviews"], &["create"]),
                rule(&["authorization.k8s.io"], &["subjectaccessreviews"], &["create"]),
            ],
        ))?;
        objs.add(&cluster_role_binding(SERVER_SA, SERVER_SA, SERVER_SA, ns))?;
        objs.add(&server_service())?;
        objs.add(&self.server_deployment(&images.server))?;

        objs.add(&service_account(SNAPSHOTTER_SA, ns))?;
        objs.add(&snapshotter_cluster_role())?;
        objs.add(&cluster_role_binding(SNAPSHOTTER_SA, SNAPSHOTTER_SA, SNAPSHOTTER_SA, ns))?;
        objs.add(&self.snapshotter_deployment(&images.snapshotter))?;

        objs.add(&service_account(BENCHMARKER_SA, ns))?;
        objs.add(&cluster_role(
            BENCHMARKER_SA,
            vec![
                rule(&[""], &["pods"], &["list"]),
                rule(&[""], &["nodes"], &["get"]),
            ],
        ))?;
        objs.add(&cluster_role_binding(BENCHMARKER_SA, BENCHMARKER_SA, BENCHMARKER_SA, ns))?;
        objs.add(&self.benchmarker_daemonset(&images.benchmarker))?;

        for report_type in global_report_types() {
            objs.add(&report_type)?;
        }

        if self.cfg.openshift {
            objs.push(benchmarker_security_context_constraints()?);
        }

        for secret in copy_secrets(ns, &self.cfg.es_secrets) {
            objs.add(&secret)?;
        }

        debug!(count = objs.0.len(), "rendered compliance objects");
        Ok((objs.0, Vec::new()))
    }

    fn ready(&self) -> bool {
        true
    }
}

/// Ordered list of rendered objects
#[derive(Default)]
struct Objects(Vec<Manifest>);

impl Objects {
    fn add<K>(&mut self, resource: &K) -> Result<()>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        self.0.push(Manifest::from_resource(resource)?);
        Ok(())
    }

    fn push(&mut self, manifest: Manifest) {
        self.0.push(manifest);
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn liveness_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/liveness".to_string()),
            port: IntOrString::Int(LIVENESS_PORT),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn linux_node_selector() -> BTreeMap<String, String> {
    BTreeMap::from([("beta.kubernetes.io/os".to_string(), "linux".to_string())])
}

fn master_tolerations() -> Vec<Toleration> {
    vec![crate::common::master_toleration()]
}

fn cluster_role(name: &str, rules: Vec<k8s_openapi::api::rbac::v1::PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: meta(name, None),
        rules: Some(rules),
        ..Default::default()
    }
}

fn controller_role() -> Role {
    Role {
        metadata: meta(CONTROLLER_SA, Some(COMPLIANCE_NAMESPACE)),
        rules: Some(vec![
            rule(&["batch"], &["jobs"], &["create", "list", "get", "delete"]),
            rule(&[""], &["podtemplates"], &["get"]),
        ]),
    }
}

fn snapshotter_cluster_role() -> ClusterRole {
    cluster_role(
        SNAPSHOTTER_SA,
        vec![
            rule(
                &["networking.k8s.io", "authentication.k8s.io", ""],
                &[
                    "networkpolicies",
                    "nodes",
                    "namespaces",
                    "pods",
                    "serviceaccounts",
                    "endpoints",
                    "services",
                ],
                &["get", "list"],
            ),
            rule(
                &["projectcalico.org"],
                &[
                    "globalnetworkpolicies",
                    "tier.globalnetworkpolicies",
                    "stagedglobalnetworkpolicies",
                    "tier.stagedglobalnetworkpolicies",
                    "networkpolicies",
                    "tier.networkpolicies",
                    "stagednetworkpolicies",
                    "tier.stagednetworkpolicies",
                    "stagedkubernetesnetworkpolicies",
                    "tiers",
                    "hostendpoints",
                    "globalnetworksets",
                    "networksets",
                ],
                &["get", "list"],
            ),
        ],
    )
}

fn server_service() -> Service {
    Service {
        metadata: meta("compliance", Some(COMPLIANCE_NAMESPACE)),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("compliance-api".to_string()),
                port: 443,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(5443)),
                ..Default::default()
            }]),
            selector: Some(app_labels(SERVER)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl ComplianceComponent {
    fn cluster_domain(&self) -> &str {
        if self.cfg.cluster_domain.is_empty() {
            DEFAULT_CLUSTER_DOMAIN
        } else {
            &self.cfg.cluster_domain
        }
    }

    fn es_container(&self, container: Container, es_user: &str) -> Container {
        elasticsearch_container_decorate(
            container,
            &self.cfg.cluster_name,
            es_user,
            self.cluster_domain(),
        )
    }

    fn pod_template(&self, app: &str, spec: PodSpec) -> PodTemplateSpec {
        let mut metadata = meta(app, Some(COMPLIANCE_NAMESPACE));
        metadata.labels = Some(app_labels(app));
        PodTemplateSpec {
            metadata: Some(metadata),
            spec: Some(elasticsearch_pod_spec_decorate(spec)),
        }
    }

    /// Single-replica Deployment with the Recreate strategy
    fn deployment(&self, app: &str, service_account: &str, container: Container) -> Deployment {
        let mut metadata = meta(app, Some(COMPLIANCE_NAMESPACE));
        metadata.labels = Some(app_labels(app));
        let spec = PodSpec {
            node_selector: Some(linux_node_selector()),
            service_account_name: Some(service_account.to_string()),
            tolerations: Some(master_tolerations()),
            image_pull_secrets: pull_secret_references(&self.cfg.pull_secrets),
            containers: vec![container],
            ..Default::default()
        };
        Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                strategy: Some(DeploymentStrategy {
                    type_: Some("Recreate".to_string()),
                    ..Default::default()
                }),
                selector: LabelSelector {
                    match_labels: Some(app_labels(app)),
                    ..Default::default()
                },
                template: self.pod_template(app, spec),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn controller_deployment(&self, image: &str) -> Deployment {
        let container = Container {
            name: CONTROLLER.to_string(),
            image: Some(image.to_string()),
            env: Some(vec![
                env("LOG_LEVEL", "info"),
                env("TIGERA_COMPLIANCE_JOB_NAMESPACE", COMPLIANCE_NAMESPACE),
                env("TIGERA_COMPLIANCE_MAX_FAILED_JOBS_HISTORY", "3"),
                env("TIGERA_COMPLIANCE_MAX_JOB_RETRIES", "6"),
            ]),
            liveness_probe: Some(liveness_probe()),
            ..Default::default()
        };
        self.deployment(
            CONTROLLER,
            CONTROLLER_SA,
            self.es_container(container, ES_USER_CONTROLLER),
        )
    }

    fn server_deployment(&self, image: &str) -> Deployment {
        let container = Container {
            name: SERVER.to_string(),
            image: Some(image.to_string()),
            env: Some(vec![
                env("LOG_LEVEL", "info"),
                env("TIGERA_COMPLIANCE_JOB_NAMESPACE", COMPLIANCE_NAMESPACE),
            ]),
            ..Default::default()
        };
        self.deployment(SERVER, SERVER_SA, self.es_container(container, ES_USER_SERVER))
    }

    fn snapshotter_deployment(&self, image: &str) -> Deployment {
        let container = Container {
            name: SNAPSHOTTER.to_string(),
            image: Some(image.to_string()),
            env: Some(vec![
                env("LOG_LEVEL", "info"),
                env("TIGERA_COMPLIANCE_JOB_NAMESPACE", COMPLIANCE_NAMESPACE),
                env("TIGERA_COMPLIANCE_MAX_FAILED_JOBS_HISTORY", "3"),
                env("TIGERA_COMPLIANCE_SNAPSHOT_HOUR", "0"),
            ]),
            liveness_probe: Some(liveness_probe()),
            ..Default::default()
        };
        self.deployment(
            SNAPSHOTTER,
            SNAPSHOTTER_SA,
            self.es_container(container, ES_USER_SNAPSHOTTER),
        )
    }

    /// Template the controller uses to launch report jobs
    fn reporter_pod_template(&self, image: &str) -> PodTemplate {
        let container = Container {
            name: "reporter".to_string(),
            image: Some(image.to_string()),
            env: Some(vec![
                env("LOG_LEVEL", "warning"),
                env("TIGERA_COMPLIANCE_JOB_NAMESPACE", COMPLIANCE_NAMESPACE),
            ]),
            liveness_probe: Some(liveness_probe()),
            security_context: Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            volume_mounts: Some(vec![VolumeMount {
                name: "var-log-calico".to_string(),
                mount_path: "/var/log/calico".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let spec = PodSpec {
            node_selector: Some(linux_node_selector()),
            service_account_name: Some(REPORTER_SA.to_string()),
            tolerations: Some(master_tolerations()),
            image_pull_secrets: pull_secret_references(&self.cfg.pull_secrets),
            containers: vec![self.es_container(container, ES_USER_REPORTER)],
            volumes: Some(vec![host_path_volume(
                "var-log-calico",
                "/var/log/calico",
                Some("DirectoryOrCreate"),
            )]),
            ..Default::default()
        };

        let mut metadata = meta(REPORTER_TEMPLATE, Some(COMPLIANCE_NAMESPACE));
        metadata.labels = Some(app_labels(REPORTER_APP));
        let mut template = self.pod_template(REPORTER_TEMPLATE, spec);
        if let Some(m) = template.metadata.as_mut() {
            m.labels = Some(app_labels(REPORTER_APP));
        }
        PodTemplate {
            metadata,
            template: Some(template),
        }
    }

    /// Runs CIS benchmarks on every node, reading host configuration
    fn benchmarker_daemonset(&self, image: &str) -> DaemonSet {
        let host_dirs = [
            ("var-lib-etcd", "/var/lib/etcd"),
            ("var-lib-kubelet", "/var/lib/kubelet"),
            ("etc-systemd", "/etc/systemd"),
            ("etc-kubernetes", "/etc/kubernetes"),
            ("usr-bin", "/usr/bin"),
        ];
        let container = Container {
            name: BENCHMARKER.to_string(),
            image: Some(image.to_string()),
            env: Some(vec![
                env("LOG_LEVEL", "info"),
                EnvVar {
                    name: "NODENAME".to_string(),
                    value_from: Some(EnvVarSource {
                        field_ref: Some(ObjectFieldSelector {
                            field_path: "spec.nodeName".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            volume_mounts: Some(
                host_dirs
                    .iter()
                    .map(|(name, path)| VolumeMount {
                        name: name.to_string(),
                        mount_path: path.to_string(),
                        read_only: Some(true),
                        ..Default::default()
                    })
                    .collect(),
            ),
            liveness_probe: Some(liveness_probe()),
            ..Default::default()
        };
        let exists = |key: Option<&str>, effect: Option<&str>| Toleration {
            key: key.map(str::to_string),
            effect: effect.map(str::to_string),
            operator: Some("Exists".to_string()),
            ..Default::default()
        };
        let spec = PodSpec {
            node_selector: Some(linux_node_selector()),
            service_account_name: Some(BENCHMARKER_SA.to_string()),
            host_pid: Some(true),
            tolerations: Some(vec![
                exists(None, Some("NoSchedule")),
                exists(Some("CriticalAddonsOnly"), None),
                exists(None, Some("NoExecute")),
            ]),
            image_pull_secrets: pull_secret_references(&self.cfg.pull_secrets),
            containers: vec![self.es_container(container, ES_USER_BENCHMARKER)],
            volumes: Some(
                host_dirs
                    .iter()
                    .map(|(name, path)| host_path_volume(name, path, None))
                    .collect(),
            ),
            ..Default::default()
        };

        let mut metadata = meta(BENCHMARKER, Some(COMPLIANCE_NAMESPACE));
        metadata.labels = Some(app_labels(BENCHMARKER));
        DaemonSet {
            metadata,
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_labels: Some(app_labels(BENCHMARKER)),
                    ..Default::default()
                },
                template: self.pod_template(BENCHMARKER, spec),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn host_path_volume(name: &str, path: &str, type_: Option<&str>) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            type_: type_.map(str::to_string),
        }),
        ..Default::default()
    }
}

/// OpenShift SCC letting the benchmarker use the host PID namespace and host paths
fn benchmarker_security_context_constraints() -> Result<Manifest> {
    Manifest::from_value(serde_json::json!({
        "apiVersion": "security.openshift.io/v1",
        "kind": "SecurityContextConstraints",
        "metadata": { "name": BENCHMARKER_SA },
        "allowHostDirVolumePlugin": true,
        "allowHostIPC": false,
        "allowHostNetwork": false,
        "allowHostPID": true,
        "allowHostPorts": false,
        "allowPrivilegeEscalation": true,
        "allowPrivilegedContainer": true,
        "fsGroup": { "type": "RunAsAny" },
        "runAsUser": { "type": "RunAsAny" },
        "readOnlyRootFilesystem": false,
        "seLinuxContext": { "type": "MustRunAs" },
        "supplementalGroups": { "type": "RunAsAny" },
        "users": [format!("system:serviceaccount:{COMPLIANCE_NAMESPACE}:{BENCHMARKER_SA}")],
        "groups": ["system:authenticated"],
        "volumes": ["*"],
    }))
}

fn report_type(name: &str, spec: ReportTypeSpec) -> GlobalReportType {
    let mut report_type = GlobalReportType::new(name, spec);
    report_type.metadata.labels = Some(BTreeMap::from([(
        REPORT_TYPE_LABEL.to_string(),
        name.to_string(),
    )]));
    report_type
}

/// The built-in report types: inventory, network-access, policy-audit, cis-benchmark
pub fn global_report_types() -> Vec<GlobalReportType> {
    let inventory = ReportTypeSpec {
        ui_summary_template: ReportTemplate::new(
            "ui-summary.json",
            include_str!("../templates/inventory-ui-summary.json.tmpl"),
        ),
        download_templates: vec![
            ReportTemplate::new(
                "summary.csv",
                include_str!("../templates/inventory-summary.csv.tmpl"),
            ),
            ReportTemplate::new(
                "endpoints.csv",
                include_str!("../templates/inventory-endpoints.csv.tmpl"),
            ),
            ReportTemplate::new(
                "namespaces.csv",
                include_str!("../templates/inventory-namespaces.csv.tmpl"),
            ),
            ReportTemplate::new(
                "services.csv",
                include_str!("../templates/inventory-services.csv.tmpl"),
            ),
        ],
        include_endpoint_data: true,
        ..Default::default()
    };

    let network_access = ReportTypeSpec {
        ui_summary_template: ReportTemplate::new(
            "ui-summary.json",
            include_str!("../templates/network-access-ui-summary.json.tmpl"),
        ),
        download_templates: vec![
            ReportTemplate::new(
                "summary.csv",
                include_str!("../templates/network-access-summary.csv.tmpl"),
            ),
            ReportTemplate::new(
                "endpoints.csv",
                include_str!("../templates/network-access-endpoints.csv.tmpl"),
            ),
        ],
        include_endpoint_data: true,
        ..Default::default()
    };

    let policy_audit = ReportTypeSpec {
        ui_summary_template: ReportTemplate::new(
            "ui-summary.json",
            include_str!("../templates/policy-audit-ui-summary.json.tmpl"),
        ),
        download_templates: vec![
            ReportTemplate::new(
                "summary.csv",
                include_str!("../templates/policy-audit-summary.csv.tmpl"),
            ),
            ReportTemplate::new("events.json", "{{ toJson .AuditEvents }}"),
            ReportTemplate::new("events.yaml", "{{ toYaml .AuditEvents }}"),
        ],
        audit_events_selection: Some(AuditEventsSelection {
            resources: [
                "globalnetworkpolicies",
                "networkpolicies",
                "stagedglobalnetworkpolicies",
                "stagednetworkpolicies",
                "stagedkubernetesnetworkpolicies",
            ]
            .into_iter()
            .map(AuditResource::resource)
            .collect(),
        }),
        ..Default::default()
    };

    let cis_benchmark = ReportTypeSpec {
        ui_summary_template: ReportTemplate::new(
            "ui-summary.json",
            include_str!("../templates/cis-benchmark-ui-summary.json.tmpl"),
        ),
        download_templates: vec![
            ReportTemplate::new(
                "all-tests.csv",
                include_str!("../templates/cis-benchmark-all-tests.csv.tmpl"),
            ),
            ReportTemplate::new(
                "failed-tests.csv",
                include_str!("../templates/cis-benchmark-failed-tests.csv.tmpl"),
            ),
        ],
        include_cis_benchmark_data: true,
        ..Default::default()
    };

    vec![
        report_type("inventory", inventory),
        report_type("network-access", network_access),
        report_type("policy-audit", policy_audit),
        report_type("cis-benchmark", cis_benchmark),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(openshift: bool) -> Vec<Manifest> {
        let mut component = compliance(ComplianceConfiguration {
            cluster_name: "cluster".to_string(),
            openshift,
            ..Default::default()
        });
        component.resolve_images(None).unwrap();
        component.objects().unwrap().0
    }

    #[test]
    fn objects_require_resolved_images() {
        let component = compliance(ComplianceConfiguration::default());
        assert!(component.objects().is_err());
    }

    #[test]
    fn namespace_first_and_scc_only_on_openshift() {
        let objs = rendered(false);
        assert_eq!(objs[0].kind(), "Namespace");
        assert_eq!(objs[0].name(), COMPLIANCE_NAMESPACE);
        assert!(!objs.iter().any(|m| m.kind() == "SecurityContextConstraints"));

        let objs = rendered(true);
        let scc = objs
            .iter()
            .find(|m| m.kind() == "SecurityContextConstraints")
            .unwrap();
        assert_eq!(
            scc.value()["users"][0],
            "system:serviceaccount:tigera-compliance:tigera-compliance-benchmarker"
        );
    }

    #[test]
    fn report_types_carry_flags() {
        let types = global_report_types();
        let names: Vec<_> = types
            .iter()
            .map(|t| t.metadata.name.clone().unwrap_or_default())
            .collect();
        assert_eq!(
            names,
            vec!["inventory", "network-access", "policy-audit", "cis-benchmark"]
        );
        assert!(types[0].spec.include_endpoint_data);
        assert!(types[3].spec.include_cis_benchmark_data);
        assert_eq!(
            types[2]
                .spec
                .audit_events_selection
                .as_ref()
                .map(|s| s.resources.len()),
            Some(5)
        );
    }
}
