//! Rendering the compliance subsystem
//!
//! These tests tell the story of what an install of compliance looks like
//! from the outside: which objects land in the cluster, in which order, and
//! what the workloads are wired to.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{PodTemplate, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use tigera_common::crd::{GlobalReportType, ImageDigest, ImageSet, ImageSetSpec};
use tigera_render::compliance::{compliance, ComplianceConfiguration};
use tigera_render::images::ImageSettings;
use tigera_render::{to_yaml_stream, Component, Manifest};

// =============================================================================
// Test Fixtures
// =============================================================================

const DIGEST: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";

fn secret(name: &str, namespace: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "username".to_string(),
            ByteString(b"elastic".to_vec()),
        )])),
        ..Default::default()
    }
}

fn config(openshift: bool) -> ComplianceConfiguration {
    ComplianceConfiguration {
        es_secrets: vec![secret(
            "tigera-ee-compliance-controller-elasticsearch-access",
            "tigera-operator",
        )],
        image_settings: ImageSettings::with_registry("registry.example.com/"),
        cluster_name: "cluster".to_string(),
        pull_secrets: vec![secret("tigera-pull-secret", "tigera-operator")],
        openshift,
        cluster_domain: "cluster.local".to_string(),
    }
}

fn render(cfg: ComplianceConfiguration, image_set: Option<&ImageSet>) -> Vec<Manifest> {
    let mut component = compliance(cfg);
    component.resolve_images(image_set).unwrap();
    let (create, delete) = component.objects().unwrap();
    assert!(delete.is_empty(), "compliance never deletes objects");
    create
}

fn find<'a>(objs: &'a [Manifest], kind: &str, name: &str) -> &'a Manifest {
    objs.iter()
        .find(|m| m.kind() == kind && m.name() == name)
        .unwrap_or_else(|| panic!("{kind}/{name} was not rendered"))
}

fn env_value(container: &k8s_openapi::api::core::v1::Container, name: &str) -> Option<String> {
    container
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == name)
        .and_then(|e| e.value.clone())
}

// =============================================================================
// Object set
// =============================================================================

/// Story: a fresh install renders every compliance object in apply order
///
/// The namespace and pull secrets come first so the rest has somewhere to
/// land; Elasticsearch credentials are copied in last.
#[test]
fn story_install_renders_full_object_set_in_order() {
    let objs = render(config(false), None);
    let described: Vec<(String, String)> = objs
        .iter()
        .map(|m| (m.kind().to_string(), m.name().to_string()))
        .collect();
    let expected: Vec<(&str, &str)> = vec![
        ("Namespace", "tigera-compliance"),
        ("Secret", "tigera-pull-secret"),
        ("ServiceAccount", "tigera-compliance-controller"),
        ("Role", "tigera-compliance-controller"),
        ("ClusterRole", "tigera-compliance-controller"),
        ("RoleBinding", "tigera-compliance-controller"),
        ("ClusterRoleBinding", "tigera-compliance-controller"),
        ("Deployment", "compliance-controller"),
        ("ServiceAccount", "tigera-compliance-reporter"),
        ("ClusterRole", "tigera-compliance-reporter"),
        ("ClusterRoleBinding", "tigera-compliance-reporter"),
        ("PodTemplate", "tigera.io.report"),
        ("ServiceAccount", "tigera-compliance-server"),
        ("ClusterRole", "tigera-compliance-server"),
        ("ClusterRoleBinding", "tigera-compliance-server"),
        ("Service", "compliance"),
        ("Deployment", "compliance-server"),
        ("ServiceAccount", "tigera-compliance-snapshotter"),
        ("ClusterRole", "tigera-compliance-snapshotter"),
        ("ClusterRoleBinding", "tigera-compliance-snapshotter"),
        ("Deployment", "compliance-snapshotter"),
        ("ServiceAccount", "tigera-compliance-benchmarker"),
        ("ClusterRole", "tigera-compliance-benchmarker"),
        ("ClusterRoleBinding", "tigera-compliance-benchmarker"),
        ("DaemonSet", "compliance-benchmarker"),
        ("GlobalReportType", "inventory"),
        ("GlobalReportType", "network-access"),
        ("GlobalReportType", "policy-audit"),
        ("GlobalReportType", "cis-benchmark"),
        ("Secret", "tigera-ee-compliance-controller-elasticsearch-access"),
    ];
    let expected: Vec<(String, String)> = expected
        .into_iter()
        .map(|(k, n)| (k.to_string(), n.to_string()))
        .collect();
    assert_eq!(described, expected);

    let copied = find(&objs, "Secret", "tigera-ee-compliance-controller-elasticsearch-access");
    assert_eq!(copied.namespace(), Some("tigera-compliance"));
}

/// Story: OpenShift installs add the benchmarker's SCC before the ES secrets
#[test]
fn story_openshift_install_adds_security_context_constraints() {
    let objs = render(config(true), None);
    let scc = find(&objs, "SecurityContextConstraints", "tigera-compliance-benchmarker");
    assert_eq!(scc.api_version(), "security.openshift.io/v1");
    assert_eq!(scc.value()["allowHostPID"], true);
    assert_eq!(scc.value()["seLinuxContext"]["type"], "MustRunAs");

    let ns = find(&objs, "Namespace", "tigera-compliance");
    assert_eq!(
        ns.value()["metadata"]["annotations"]["openshift.io/node-selector"],
        ""
    );
    assert_eq!(objs.last().map(Manifest::kind), Some("Secret"));
}

// =============================================================================
// Workloads
// =============================================================================

/// Story: the controller knows where to launch report jobs and how often to retry
#[test]
fn story_controller_is_configured_for_report_jobs() {
    let objs = render(config(false), None);
    let deployment: Deployment = find(&objs, "Deployment", "compliance-controller")
        .to_typed()
        .unwrap();
    let spec = deployment.spec.unwrap();
    assert_eq!(spec.replicas, Some(1));
    assert_eq!(
        spec.strategy.and_then(|s| s.type_).as_deref(),
        Some("Recreate")
    );

    let pod = spec.template.spec.unwrap();
    assert_eq!(
        pod.node_selector.unwrap()["beta.kubernetes.io/os"],
        "linux"
    );
    assert_eq!(pod.image_pull_secrets.unwrap()[0].name, "tigera-pull-secret");

    let c = &pod.containers[0];
    assert_eq!(
        c.image.as_deref(),
        Some("registry.example.com/tigera/compliance-controller:v3.18.0")
    );
    assert_eq!(env_value(c, "TIGERA_COMPLIANCE_MAX_JOB_RETRIES").as_deref(), Some("6"));
    assert_eq!(
        env_value(c, "TIGERA_COMPLIANCE_JOB_NAMESPACE").as_deref(),
        Some("tigera-compliance")
    );
    assert_eq!(env_value(c, "ELASTIC_INDEX_SUFFIX").as_deref(), Some("cluster"));
    let probe = c.liveness_probe.as_ref().and_then(|p| p.http_get.as_ref()).unwrap();
    assert_eq!(probe.path.as_deref(), Some("/liveness"));
}

/// Story: the server has no liveness probe and is reachable on 443
#[test]
fn story_server_is_exposed_through_service() {
    let objs = render(config(false), None);
    let svc = find(&objs, "Service", "compliance");
    assert_eq!(svc.value()["spec"]["ports"][0]["port"], 443);
    assert_eq!(svc.value()["spec"]["ports"][0]["targetPort"], 5443);
    assert_eq!(svc.value()["spec"]["selector"]["k8s-app"], "compliance-server");

    let deployment: Deployment = find(&objs, "Deployment", "compliance-server")
        .to_typed()
        .unwrap();
    let pod = deployment.spec.unwrap().template.spec.unwrap();
    assert!(pod.containers[0].liveness_probe.is_none());
}

/// Story: report jobs run privileged and log to the host
#[test]
fn story_reporter_template_writes_host_logs() {
    let objs = render(config(false), None);
    let template: PodTemplate = find(&objs, "PodTemplate", "tigera.io.report")
        .to_typed()
        .unwrap();
    assert_eq!(
        template.metadata.labels.unwrap()["k8s-app"],
        "compliance-reporter"
    );
    let pod = template.template.unwrap().spec.unwrap();
    let c = &pod.containers[0];
    assert_eq!(c.name, "reporter");
    assert_eq!(env_value(c, "LOG_LEVEL").as_deref(), Some("warning"));
    assert_eq!(
        c.security_context.as_ref().and_then(|s| s.privileged),
        Some(true)
    );
    let host = pod
        .volumes
        .unwrap()
        .into_iter()
        .find(|v| v.name == "var-log-calico")
        .and_then(|v| v.host_path)
        .unwrap();
    assert_eq!(host.path, "/var/log/calico");
    assert_eq!(host.type_.as_deref(), Some("DirectoryOrCreate"));
}

/// Story: the benchmarker reads node configuration on every node
#[test]
fn story_benchmarker_runs_everywhere_with_host_access() {
    let objs = render(config(false), None);
    let ds: DaemonSet = find(&objs, "DaemonSet", "compliance-benchmarker")
        .to_typed()
        .unwrap();
    let pod = ds.spec.unwrap().template.spec.unwrap();
    assert_eq!(pod.host_pid, Some(true));
    assert_eq!(pod.tolerations.as_ref().map(Vec::len), Some(3));

    let c = &pod.containers[0];
    let mounts = c.volume_mounts.as_ref().unwrap();
    for path in ["/var/lib/etcd", "/var/lib/kubelet", "/etc/systemd", "/etc/kubernetes", "/usr/bin"] {
        let mount = mounts.iter().find(|m| m.mount_path == path).unwrap();
        assert_eq!(mount.read_only, Some(true), "{path} must be read-only");
    }
    let node_name = c
        .env
        .as_ref()
        .unwrap()
        .iter()
        .find(|e| e.name == "NODENAME")
        .and_then(|e| e.value_from.as_ref())
        .and_then(|v| v.field_ref.as_ref())
        .unwrap();
    assert_eq!(node_name.field_path, "spec.nodeName");
}

// =============================================================================
// Images and report types
// =============================================================================

/// Story: an ImageSet pins every compliance image by digest
#[test]
fn story_image_set_pins_digests() {
    let images = [
        "tigera/compliance-controller",
        "tigera/compliance-reporter",
        "tigera/compliance-server",
        "tigera/compliance-snapshotter",
        "tigera/compliance-benchmarker",
    ];
    let set = ImageSet::new(
        "enterprise-v3.18.0",
        ImageSetSpec {
            images: images
                .iter()
                .map(|i| ImageDigest {
                    image: i.to_string(),
                    digest: DIGEST.to_string(),
                })
                .collect(),
        },
    );
    let objs = render(config(false), Some(&set));
    let deployment: Deployment = find(&objs, "Deployment", "compliance-snapshotter")
        .to_typed()
        .unwrap();
    let pod = deployment.spec.unwrap().template.spec.unwrap();
    assert_eq!(
        pod.containers[0].image.clone().unwrap(),
        format!("registry.example.com/tigera/compliance-snapshotter@{DIGEST}")
    );

    let partial = ImageSet::new(
        "enterprise-v3.18.0",
        ImageSetSpec {
            images: vec![ImageDigest {
                image: images[0].to_string(),
                digest: DIGEST.to_string(),
            }],
        },
    );
    let mut component = compliance(config(false));
    assert!(component.resolve_images(Some(&partial)).is_err());
}

/// Story: report types ship the templates byte for byte
#[test]
fn story_report_types_embed_templates() {
    let objs = render(config(false), None);
    let inventory: GlobalReportType = find(&objs, "GlobalReportType", "inventory")
        .to_typed()
        .unwrap();
    assert_eq!(
        inventory.metadata.labels.unwrap()["global-report-type"],
        "inventory"
    );
    let downloads: Vec<&str> = inventory
        .spec
        .download_templates
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(
        downloads,
        vec!["summary.csv", "endpoints.csv", "namespaces.csv", "services.csv"]
    );
    assert_eq!(
        inventory.spec.download_templates[0].template,
        include_str!("../templates/inventory-summary.csv.tmpl")
    );

    let audit: GlobalReportType = find(&objs, "GlobalReportType", "policy-audit")
        .to_typed()
        .unwrap();
    let events = audit
        .spec
        .download_templates
        .iter()
        .find(|t| t.name == "events.json")
        .unwrap();
    assert_eq!(events.template, "{{ toJson .AuditEvents }}");

    let cis: GlobalReportType = find(&objs, "GlobalReportType", "cis-benchmark")
        .to_typed()
        .unwrap();
    assert!(cis.spec.include_cis_benchmark_data);
    assert!(cis.spec.download_templates[0].template.starts_with("nodeName,"));
}

/// Story: the offline renderer prints one YAML document per object
#[test]
fn story_yaml_stream_has_one_document_per_object() {
    let objs = render(config(false), None);
    let yaml = to_yaml_stream(&objs).unwrap();
    let documents: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&yaml)
        .map(|d| serde::Deserialize::deserialize(d).unwrap())
        .collect();
    assert_eq!(documents.len(), objs.len());
    assert_eq!(documents[0]["kind"], serde_yaml::Value::from("Namespace"));
}
