//! Installation CRD (read-only for this operator)
//!
//! The Installation describes the core platform install. The manager
//! controller reads it for the product variant, registry settings, pull
//! secrets and control-plane placement.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{LocalObjectReference, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ProductVariant, Provider};

/// Core platform installation settings.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "Installation",
    status = "InstallationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    /// Product variant to install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<ProductVariant>,

    /// Registry to pull images from (e.g., "quay.io/")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Path inserted between the registry and the image name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,

    /// Prefix prepended to every image name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prefix: Option<String>,

    /// Pull secrets in the operator namespace, copied into component namespaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Replica count for control plane deployments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_replicas: Option<i32>,

    /// Node selector for control plane pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_node_selector: Option<BTreeMap<String, String>>,

    /// Extra tolerations for control plane pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub control_plane_tolerations: Vec<Toleration>,

    /// Kubernetes platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_provider: Option<Provider>,
}

/// Observed state of the Installation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    /// Variant that was actually installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<ProductVariant>,

    /// Fully defaulted spec used by the core controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<InstallationSpec>,

    /// ImageSet in use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_set: Option<String>,
}

impl Installation {
    /// Installed variant and the effective spec
    ///
    /// Prefers the computed spec and variant from status, falling back to
    /// the user-provided spec while the core controller has not run yet.
    pub fn effective(&self) -> (ProductVariant, InstallationSpec) {
        let status = self.status.as_ref();
        let spec = status
            .and_then(|s| s.computed.clone())
            .unwrap_or_else(|| self.spec.clone());
        let variant = status
            .and_then(|s| s.variant)
            .or(spec.variant)
            .unwrap_or_default();
        (variant, spec)
    }
}

impl InstallationSpec {
    /// Whether the platform is OpenShift
    pub fn is_openshift(&self) -> bool {
        self.kubernetes_provider == Some(Provider::OpenShift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTERPRISE: &str = r#"
apiVersion: operator.tigera.io/v1
kind: Installation
metadata:
  name: default
spec:
  variant: TigeraSecureEnterprise
  registry: registry.example.com/
  imagePullSecrets:
    - name: tigera-pull-secret
  controlPlaneReplicas: 2
status:
  variant: TigeraSecureEnterprise
"#;

    #[test]
    fn enterprise_installation_yaml() {
        let inst: Installation = serde_yaml::from_str(ENTERPRISE).unwrap();
        let (variant, spec) = inst.effective();
        assert_eq!(variant, ProductVariant::TigeraSecureEnterprise);
        assert_eq!(spec.registry.as_deref(), Some("registry.example.com/"));
        assert_eq!(spec.image_pull_secrets.len(), 1);
        assert_eq!(spec.control_plane_replicas, Some(2));
    }

    #[test]
    fn computed_spec_wins_over_user_spec() {
        let mut inst: Installation = serde_yaml::from_str(ENTERPRISE).unwrap();
        inst.status.as_mut().unwrap().computed = Some(InstallationSpec {
            registry: Some("mirror.example.com/".to_string()),
            ..Default::default()
        });
        let (_, spec) = inst.effective();
        assert_eq!(spec.registry.as_deref(), Some("mirror.example.com/"));
    }

    #[test]
    fn variant_defaults_to_calico_without_status() {
        let inst = Installation::new("default", InstallationSpec::default());
        let (variant, _) = inst.effective();
        assert_eq!(variant, ProductVariant::Calico);
    }

    #[test]
    fn openshift_detection() {
        let spec = InstallationSpec {
            kubernetes_provider: Some(Provider::OpenShift),
            ..Default::default()
        };
        assert!(spec.is_openshift());
        assert!(!InstallationSpec::default().is_openshift());
    }
}
