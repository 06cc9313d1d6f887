//! Shared types used across the operator CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Readiness state reported by operator-managed components
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TigeraStatusState {
    /// Component has not converged yet
    #[default]
    Progressing,
    /// Component is fully deployed and available
    Ready,
    /// Component could not be reconciled
    Degraded,
}

impl std::fmt::Display for TigeraStatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Progressing => write!(f, "Progressing"),
            Self::Ready => write!(f, "Ready"),
            Self::Degraded => write!(f, "Degraded"),
        }
    }
}

/// Product variant selected by the Installation
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ProductVariant {
    /// Open source Calico
    #[default]
    Calico,
    /// Calico Enterprise
    TigeraSecureEnterprise,
}

impl ProductVariant {
    /// Prefix used for ImageSet names of this variant
    pub fn image_set_prefix(&self) -> &'static str {
        match self {
            Self::Calico => "calico",
            Self::TigeraSecureEnterprise => "enterprise",
        }
    }
}

/// Kubernetes platform the cluster runs on
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Provider {
    /// Not detected or not specified
    #[default]
    #[serde(rename = "")]
    None,
    /// Amazon EKS
    #[serde(rename = "EKS")]
    Eks,
    /// Google GKE
    #[serde(rename = "GKE")]
    Gke,
    /// Azure AKS
    #[serde(rename = "AKS")]
    Aks,
    /// Red Hat OpenShift
    OpenShift,
    /// Docker Enterprise
    DockerEnterprise,
    /// Rancher RKE2
    #[serde(rename = "RKE2")]
    Rke2,
    /// VMware Tanzu
    #[serde(rename = "TKG")]
    Tkg,
}

impl std::str::FromStr for Provider {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "eks" => Ok(Self::Eks),
            "gke" => Ok(Self::Gke),
            "aks" => Ok(Self::Aks),
            "openshift" => Ok(Self::OpenShift),
            "dockerenterprise" => Ok(Self::DockerEnterprise),
            "rke2" => Ok(Self::Rke2),
            "tkg" => Ok(Self::Tkg),
            other => Err(crate::Error::validation(format!(
                "unknown kubernetes provider: {other}"
            ))),
        }
    }
}

/// Machine-readable reason recorded on a degraded TigeraStatus
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum StatusReason {
    /// Reading a dependency from the API failed
    ResourceReadError,
    /// A dependency exists but is not ready
    ResourceNotReady,
    /// A dependency does not exist
    ResourceNotFound,
    /// Creating a dependency failed
    ResourceCreateError,
    /// Creating or updating a rendered object failed
    ResourceUpdateError,
    /// User configuration is invalid
    ResourceValidationError,
    /// Rendering manifests failed
    ResourceRenderingError,
    /// A certificate could not be loaded or issued
    CertificateError,
    /// No specific reason
    #[default]
    Unknown,
}

impl std::fmt::Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ResourceReadError => "ResourceReadError",
            Self::ResourceNotReady => "ResourceNotReady",
            Self::ResourceNotFound => "ResourceNotFound",
            Self::ResourceCreateError => "ResourceCreateError",
            Self::ResourceUpdateError => "ResourceUpdateError",
            Self::ResourceValidationError => "ResourceValidationError",
            Self::ResourceRenderingError => "ResourceRenderingError",
            Self::CertificateError => "CertificateError",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Condition state cannot be determined
    #[default]
    Unknown,
}

/// Kubernetes-style condition for status reporting
///
/// Used by TigeraStatus and by the status of the operator CRs.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Available, Degraded)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,

    /// Generation of the owning object the condition was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation: None,
        }
    }

    /// Record the generation this condition was computed for
    pub fn with_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    /// Whether two conditions describe the same state, ignoring timestamps
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Reference to a Secret holding TLS material
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    /// Name of the secret (defaults to the tunnel secret for ManagementClusters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("OpenShift".parse::<Provider>().unwrap(), Provider::OpenShift);
        assert_eq!("openshift".parse::<Provider>().unwrap(), Provider::OpenShift);
        assert_eq!("EKS".parse::<Provider>().unwrap(), Provider::Eks);
        assert_eq!("".parse::<Provider>().unwrap(), Provider::None);
        assert!("mainframe".parse::<Provider>().is_err());
    }

    #[test]
    fn provider_serializes_with_api_names() {
        assert_eq!(serde_json::to_string(&Provider::Eks).unwrap(), "\"EKS\"");
        assert_eq!(
            serde_json::to_string(&Provider::OpenShift).unwrap(),
            "\"OpenShift\""
        );
        assert_eq!(serde_json::to_string(&Provider::None).unwrap(), "\"\"");
    }

    #[test]
    fn condition_state_comparison_ignores_time() {
        let a = Condition::new("Degraded", ConditionStatus::True, "ResourceNotReady", "waiting");
        let mut b = a.clone();
        b.last_transition_time = a.last_transition_time - chrono::Duration::hours(1);
        assert!(a.same_state(&b));

        b.message = "different".to_string();
        assert!(!a.same_state(&b));
    }

    #[test]
    fn variant_image_set_prefix() {
        assert_eq!(ProductVariant::Calico.image_set_prefix(), "calico");
        assert_eq!(
            ProductVariant::TigeraSecureEnterprise.image_set_prefix(),
            "enterprise"
        );
    }
}
