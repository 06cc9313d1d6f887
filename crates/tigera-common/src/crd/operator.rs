//! Other operator.tigera.io resources the manager controller depends on
//!
//! These are owned by sibling controllers. This operator reads them for
//! readiness gating and configuration, and only writes the ManagementCluster
//! TLS default back.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, TigeraStatusState, TlsSpec};

/// Status shared by operator CRs that only report a state
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Current state of the component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TigeraStatusState>,
}

impl ComponentStatus {
    /// Whether the component reports Ready
    pub fn is_ready(&self) -> bool {
        self.state == Some(TigeraStatusState::Ready)
    }
}

/// Compliance reporting subsystem
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "Compliance",
    status = "ComponentStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSpec {}

/// Aggregated API server
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "APIServer",
    status = "ComponentStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct APIServerSpec {}

impl APIServer {
    /// Whether the API server reports Ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(ComponentStatus::is_ready)
    }
}

impl Compliance {
    /// Whether compliance reports Ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(ComponentStatus::is_ready)
    }
}

/// Identity provider configuration shared by the manager and the API server
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "Authentication",
    status = "ComponentStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSpec {
    /// Domain the manager is reachable on (e.g., "https://manager.example.com")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_domain: Option<String>,

    /// Prefix prepended to usernames from the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_prefix: Option<String>,

    /// Prefix prepended to groups from the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_prefix: Option<String>,

    /// Generic OIDC provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<AuthenticationOidc>,

    /// OpenShift OAuth (always brokered by Dex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openshift: Option<serde_json::Value>,

    /// LDAP (always brokered by Dex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap: Option<serde_json::Value>,
}

/// OIDC provider settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOidc {
    /// Issuer URL of the provider
    #[serde(rename = "issuerURL")]
    pub issuer_url: String,

    /// JWT claim holding the username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_claim: Option<String>,

    /// JWT claim holding the groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_claim: Option<String>,

    /// Whether tokens are validated by Dex or directly by the components
    #[serde(rename = "type", default)]
    pub type_: OidcType,
}

/// Who validates OIDC tokens
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum OidcType {
    /// Dex brokers the provider
    #[default]
    Dex,
    /// Components validate provider tokens directly
    Tigera,
}

impl Authentication {
    /// Whether authentication reports Ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(ComponentStatus::is_ready)
    }

    /// Current state, for messages
    pub fn state(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.state)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }
}

/// Marks this cluster as a management cluster for multi-cluster management
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "ManagementCluster"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterSpec {
    /// Address managed clusters use to reach the tunnel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Tunnel TLS secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
}

/// Marks this cluster as managed by a remote management cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "ManagementClusterConnection"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterConnectionSpec {
    /// Address of the management cluster tunnel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_cluster_addr: Option<String>,

    /// Tunnel TLS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
}

/// Per-component status written by the operator
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "TigeraStatus",
    status = "TigeraStatusStatus",
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type=='Available')].status"}"#,
    printcolumn = r#"{"name":"Progressing","type":"string","jsonPath":".status.conditions[?(@.type=='Progressing')].status"}"#,
    printcolumn = r#"{"name":"Degraded","type":"string","jsonPath":".status.conditions[?(@.type=='Degraded')].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TigeraStatusSpec {}

/// Conditions of a TigeraStatus
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TigeraStatusStatus {
    /// Available, Progressing and Degraded conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Pinned image digests for a release
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "operator.tigera.io", version = "v1", kind = "ImageSet")]
#[serde(rename_all = "camelCase")]
pub struct ImageSetSpec {
    /// Image name to digest mappings
    #[serde(default)]
    pub images: Vec<ImageDigest>,
}

/// A single image pinned by digest
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ImageDigest {
    /// Image name without registry or tag (e.g., "tigera/cnx-manager")
    pub image: String,
    /// Digest (e.g., "sha256:...")
    pub digest: String,
}

impl ImageSet {
    /// Digest pinned for an image, if any
    pub fn digest_for(&self, image: &str) -> Option<&str> {
        self.spec
            .images
            .iter()
            .find(|i| i.image == image)
            .map(|i| i.digest.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_oidc_yaml() {
        let yaml = r#"
apiVersion: operator.tigera.io/v1
kind: Authentication
metadata:
  name: tigera-secure
spec:
  managerDomain: https://manager.example.com
  oidc:
    issuerURL: https://accounts.example.com
    usernameClaim: email
    type: Tigera
status:
  state: Ready
"#;
        let auth: Authentication = serde_yaml::from_str(yaml).unwrap();
        let oidc = auth.spec.oidc.as_ref().unwrap();
        assert_eq!(oidc.issuer_url, "https://accounts.example.com");
        assert_eq!(oidc.type_, OidcType::Tigera);
        assert!(auth.is_ready());
        assert_eq!(auth.state(), "Ready");
    }

    #[test]
    fn oidc_type_defaults_to_dex() {
        let oidc: AuthenticationOidc =
            serde_json::from_str(r#"{"issuerURL":"https://idp"}"#).unwrap();
        assert_eq!(oidc.type_, OidcType::Dex);
    }

    #[test]
    fn component_without_status_is_not_ready() {
        let api = APIServer::new("tigera-secure", APIServerSpec {});
        assert!(!api.is_ready());

        let mut compliance = Compliance::new("tigera-secure", ComplianceSpec {});
        compliance.status = Some(ComponentStatus {
            state: Some(TigeraStatusState::Progressing),
        });
        assert!(!compliance.is_ready());
    }

    #[test]
    fn management_cluster_tls_secret_name() {
        let yaml = r#"
apiVersion: operator.tigera.io/v1
kind: ManagementCluster
metadata:
  name: tigera-secure
spec:
  address: mgmt.example.com:9449
  tls:
    secretName: custom-tunnel
"#;
        let mc: ManagementCluster = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            mc.spec.tls.and_then(|t| t.secret_name).as_deref(),
            Some("custom-tunnel")
        );
    }

    #[test]
    fn image_set_digest_lookup() {
        let set = ImageSet::new(
            "enterprise-v3.20.0",
            ImageSetSpec {
                images: vec![ImageDigest {
                    image: "tigera/cnx-manager".to_string(),
                    digest: "sha256:abc".to_string(),
                }],
            },
        );
        assert_eq!(set.digest_for("tigera/cnx-manager"), Some("sha256:abc"));
        assert_eq!(set.digest_for("tigera/voltron"), None);
    }
}
