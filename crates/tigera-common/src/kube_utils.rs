//! Shared Kubernetes utilities using kube-rs
//!
//! Rendered objects are applied as `DynamicObject`s, so most helpers here
//! deal with turning an apiVersion/kind pair into an `ApiResource` and with
//! classifying API errors.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::{debug, info};

use crate::Error;

/// Build an ApiResource from a known apiVersion and kind.
///
/// The version you provide is used exactly.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into group and version
///
/// ```
/// use tigera_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("projectcalico.org/v3");
/// assert_eq!(group, "projectcalico.org");
/// assert_eq!(version, "v3");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Resource kinds whose plural is not derived by the simple rules below
const KIND_PLURALS: &[(&str, &str)] = &[
    ("networkpolicy", "networkpolicies"),
    ("globalnetworkpolicy", "globalnetworkpolicies"),
    ("podsecuritypolicy", "podsecuritypolicies"),
    ("securitycontextconstraints", "securitycontextconstraints"),
    ("globalreporttype", "globalreporttypes"),
    ("felixconfiguration", "felixconfigurations"),
    ("tigerastatus", "tigerastatuses"),
    ("apiserver", "apiservers"),
    ("ingress", "ingresses"),
    ("endpoints", "endpoints"),
];

/// Pluralize a Kubernetes resource kind
///
/// Uses a lookup table for known irregular kinds, falling back to simple
/// pluralization rules for everything else.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Apply ordering for rendered objects
///
/// Namespaces and identities first, then configuration and policy, then the
/// Services and workloads that depend on them.
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "CustomResourceDefinition" => 1,
        "ServiceAccount" => 2,
        "ClusterRole" | "Role" | "PodSecurityPolicy" | "SecurityContextConstraints" => 3,
        "ClusterRoleBinding" | "RoleBinding" => 4,
        "ConfigMap" | "Secret" => 5,
        // Policies must exist before pods start so traffic is never briefly open
        "NetworkPolicy" | "GlobalNetworkPolicy" => 6,
        "Service" => 7,
        "Deployment" | "DaemonSet" | "StatefulSet" | "CronJob" => 8,
        _ => 10,
    }
}

/// Compute a deterministic hash of the input string, returning a 16-char hex digest.
///
/// Uses truncated SHA-256 so the value is stable across toolchains. Used for
/// the certificate hash annotations on pod templates.
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..8]
        .iter()
        .fold(String::with_capacity(16), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Whether a kube error is a 404 from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Check if a CRD exists
pub async fn crd_exists(client: &Client, crd_name: &str) -> Result<bool, Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    match crds.get(crd_name).await {
        Ok(_) => Ok(true),
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(Error::internal_with_context(
            "crd_exists",
            format!("Failed to check CRD {}: {}", crd_name, e),
        )),
    }
}

/// Whether the API server serves a kind in an API group
///
/// Used to wait for aggregated APIs (projectcalico.org/v3) that appear only
/// after the API server component is running.
pub async fn api_group_available(client: &Client, group: &str, kind: &str) -> Result<bool, Error> {
    use kube::discovery::Discovery;

    let discovery = Discovery::new(client.clone())
        .filter(&[group])
        .run()
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "api_group_available",
                format!("API discovery failed: {}", e),
            )
        })?;

    let found = discovery
        .groups()
        .filter(|g| g.name() == group)
        .flat_map(|g| g.resources_by_stability())
        .any(|(ar, _caps)| ar.kind == kind);

    debug!(group = %group, kind = %kind, found, "API discovery probe");
    Ok(found)
}

/// Install or update CRDs via server-side apply
pub async fn apply_crds(
    client: &Client,
    crds: &[CustomResourceDefinition],
    field_manager: &str,
) -> Result<(), Error> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();

    for crd in crds {
        let name = crd
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("apply_crds", "CRD without a name"))?;
        api.patch(name, &params, &Patch::Apply(crd)).await?;
        info!(crd = %name, "CRD applied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Deployment", "deployments")]
    #[case("NetworkPolicy", "networkpolicies")]
    #[case("SecurityContextConstraints", "securitycontextconstraints")]
    #[case("GlobalReportType", "globalreporttypes")]
    #[case("PodSecurityPolicy", "podsecuritypolicies")]
    #[case("TigeraStatus", "tigerastatuses")]
    #[case("ClusterRoleBinding", "clusterrolebindings")]
    #[case("DaemonSet", "daemonsets")]
    #[case("Service", "services")]
    #[case("PodTemplate", "podtemplates")]
    fn kinds_pluralize(#[case] kind: &str, #[case] plural: &str) {
        assert_eq!(pluralize_kind(kind), plural);
    }

    #[test]
    fn api_resource_for_core_and_grouped_kinds() {
        let ar = build_api_resource("v1", "ServiceAccount");
        assert_eq!(ar.group, "");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.plural, "serviceaccounts");

        let ar = build_api_resource("projectcalico.org/v3", "NetworkPolicy");
        assert_eq!(ar.group, "projectcalico.org");
        assert_eq!(ar.version, "v3");
        assert_eq!(ar.plural, "networkpolicies");
    }

    #[test]
    fn apply_order_puts_workloads_last() {
        let mut kinds = vec![
            "Deployment",
            "Service",
            "NetworkPolicy",
            "Secret",
            "ClusterRoleBinding",
            "ServiceAccount",
            "Namespace",
        ];
        kinds.sort_by_key(|k| kind_priority(k));
        assert_eq!(
            kinds,
            vec![
                "Namespace",
                "ServiceAccount",
                "ClusterRoleBinding",
                "Secret",
                "NetworkPolicy",
                "Service",
                "Deployment"
            ]
        );
    }

    #[test]
    fn hash_is_stable_and_short() {
        let a = deterministic_hash("-----BEGIN CERTIFICATE-----");
        assert_eq!(a.len(), 16);
        assert_eq!(a, deterministic_hash("-----BEGIN CERTIFICATE-----"));
        assert_ne!(a, deterministic_hash("something else"));
    }

    #[test]
    fn not_found_only_for_404() {
        let err = |code| {
            kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: String::new(),
                reason: String::new(),
                code,
            })
        };
        assert!(is_not_found(&err(404)));
        assert!(!is_not_found(&err(409)));
    }
}
