//! Building blocks shared by the component renderers

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{LocalObjectReference, Namespace, Secret, ServiceAccount, Toleration};
use k8s_openapi::api::rbac::v1::{
    ClusterRoleBinding, PolicyRule, RoleBinding, RoleRef, Subject,
};
use kube::api::ObjectMeta;

use tigera_common::crd::InstallationSpec;
use tigera_common::K8S_APP_LABEL;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const OPENSHIFT_NODE_SELECTOR_ANNOTATION: &str = "openshift.io/node-selector";

/// Object metadata with a name and optional namespace
pub fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

/// `k8s-app: <app>` label set used for selectors
pub fn app_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(K8S_APP_LABEL.to_string(), app.to_string())])
}

/// Namespace for a component
///
/// On OpenShift the project node selector is cleared so DaemonSets can land
/// on every node.
pub fn create_namespace(name: &str, openshift: bool) -> Namespace {
    let mut metadata = meta(name, None);
    metadata.labels = Some(BTreeMap::from([("name".to_string(), name.to_string())]));
    if openshift {
        metadata.annotations = Some(BTreeMap::from([(
            OPENSHIFT_NODE_SELECTOR_ANNOTATION.to_string(),
            String::new(),
        )]));
    }
    Namespace {
        metadata,
        ..Default::default()
    }
}

/// Copies of `secrets` in `namespace`, keeping only name, type and data
pub fn copy_secrets(namespace: &str, secrets: &[Secret]) -> Vec<Secret> {
    secrets
        .iter()
        .map(|s| Secret {
            metadata: meta(s.metadata.name.as_deref().unwrap_or_default(), Some(namespace)),
            type_: s.type_.clone(),
            data: s.data.clone(),
            ..Default::default()
        })
        .collect()
}

/// Pull secrets copied into a component namespace
pub fn copy_image_pull_secrets(secrets: &[Secret], namespace: &str) -> Vec<Secret> {
    copy_secrets(namespace, secrets)
}

/// `imagePullSecrets` entries for a pod spec
pub fn pull_secret_references(secrets: &[Secret]) -> Option<Vec<LocalObjectReference>> {
    if secrets.is_empty() {
        return None;
    }
    Some(
        secrets
            .iter()
            .filter_map(|s| s.metadata.name.clone())
            .map(|name| LocalObjectReference { name })
            .collect(),
    )
}

/// Toleration for the control-plane taint
pub fn master_toleration() -> Toleration {
    Toleration {
        key: Some("node-role.kubernetes.io/master".to_string()),
        effect: Some("NoSchedule".to_string()),
        ..Default::default()
    }
}

/// Linux node selector merged with the Installation's control-plane selector
pub fn control_plane_node_selector(
    installation: Option<&InstallationSpec>,
) -> BTreeMap<String, String> {
    let mut selector = BTreeMap::from([("kubernetes.io/os".to_string(), "linux".to_string())]);
    if let Some(extra) = installation.and_then(|i| i.control_plane_node_selector.as_ref()) {
        selector.extend(extra.clone());
    }
    selector
}

/// Control-plane toleration plus the Installation's extra tolerations
pub fn control_plane_tolerations(installation: Option<&InstallationSpec>) -> Vec<Toleration> {
    let mut tolerations = vec![master_toleration()];
    if let Some(inst) = installation {
        tolerations.extend(inst.control_plane_tolerations.iter().cloned());
    }
    tolerations
}

/// Empty ServiceAccount
pub fn service_account(name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(name, Some(namespace)),
        ..Default::default()
    }
}

/// Policy rule over API groups, resources and verbs
pub fn rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    PolicyRule {
        api_groups: Some(owned(api_groups)),
        resources: Some(owned(resources)),
        verbs: owned(verbs),
        ..Default::default()
    }
}

fn service_account_subject(name: &str, namespace: &str) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Binds a ClusterRole to a ServiceAccount
pub fn cluster_role_binding(
    name: &str,
    cluster_role: &str,
    service_account: &str,
    namespace: &str,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: meta(name, None),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
        },
        subjects: Some(vec![service_account_subject(service_account, namespace)]),
    }
}

/// Binds a Role to a ServiceAccount in the same namespace
pub fn role_binding(name: &str, role: &str, service_account: &str, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: meta(name, Some(namespace)),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![service_account_subject(service_account, namespace)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;

    fn pull_secret() -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("tigera-pull-secret".to_string()),
                namespace: Some("tigera-operator".to_string()),
                resource_version: Some("42".to_string()),
                uid: Some("abc".to_string()),
                ..Default::default()
            },
            type_: Some("kubernetes.io/dockerconfigjson".to_string()),
            data: Some(BTreeMap::from([(
                ".dockerconfigjson".to_string(),
                ByteString(b"{}".to_vec()),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn openshift_namespace_clears_node_selector() {
        let ns = create_namespace("tigera-compliance", true);
        let annotations = ns.metadata.annotations.unwrap();
        assert_eq!(annotations["openshift.io/node-selector"], "");

        let ns = create_namespace("tigera-compliance", false);
        assert!(ns.metadata.annotations.is_none());
        assert_eq!(ns.metadata.labels.unwrap()["name"], "tigera-compliance");
    }

    #[test]
    fn copied_secrets_drop_server_metadata() {
        let copies = copy_secrets("tigera-manager", &[pull_secret()]);
        assert_eq!(copies.len(), 1);
        let copy = &copies[0];
        assert_eq!(copy.metadata.namespace.as_deref(), Some("tigera-manager"));
        assert!(copy.metadata.resource_version.is_none());
        assert!(copy.metadata.uid.is_none());
        assert_eq!(copy.type_, pull_secret().type_);
        assert_eq!(copy.data, pull_secret().data);
    }

    #[test]
    fn pull_secret_refs() {
        assert!(pull_secret_references(&[]).is_none());
        let refs = pull_secret_references(&[pull_secret()]).unwrap();
        assert_eq!(refs[0].name, "tigera-pull-secret");
    }

    #[test]
    fn control_plane_placement_merges_installation() {
        let inst = InstallationSpec {
            control_plane_node_selector: Some(BTreeMap::from([(
                "node-role".to_string(),
                "infra".to_string(),
            )])),
            control_plane_tolerations: vec![Toleration {
                key: Some("dedicated".to_string()),
                operator: Some("Exists".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let selector = control_plane_node_selector(Some(&inst));
        assert_eq!(selector["kubernetes.io/os"], "linux");
        assert_eq!(selector["node-role"], "infra");
        assert_eq!(control_plane_tolerations(Some(&inst)).len(), 2);
        assert_eq!(control_plane_tolerations(None), vec![master_toleration()]);
    }

    #[test]
    fn binding_references_service_account() {
        let b = cluster_role_binding("x-binding", "x-role", "x", "ns");
        assert_eq!(b.role_ref.kind, "ClusterRole");
        let subject = &b.subjects.unwrap()[0];
        assert_eq!(subject.name, "x");
        assert_eq!(subject.namespace.as_deref(), Some("ns"));
    }
}
