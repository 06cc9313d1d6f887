//! Common types for the Tigera operator: CRDs, errors, PKI and status reporting

#![deny(missing_docs)]

pub mod crd;
pub mod dns;
pub mod error;
pub mod kube_utils;
pub mod metrics;
pub mod pki;
pub mod ready;
pub mod status;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every server-side apply issued by the operator
pub const FIELD_MANAGER: &str = "tigera-operator";

/// Namespace the operator runs in and where "source of truth" secrets live
pub const OPERATOR_NAMESPACE: &str = "tigera-operator";

/// Namespace the manager (web console) is installed into
pub const MANAGER_NAMESPACE: &str = "tigera-manager";

/// Namespace of the Prometheus stack the manager depends on
pub const PROMETHEUS_NAMESPACE: &str = "tigera-prometheus";

/// Namespace of Elasticsearch and Linseed
pub const ELASTICSEARCH_NAMESPACE: &str = "tigera-elasticsearch";

/// Namespace of the ECK operator (holds the Elastic license ConfigMap)
pub const ECK_OPERATOR_NAMESPACE: &str = "tigera-eck-operator";

/// Namespace the compliance subsystem is installed into
pub const COMPLIANCE_NAMESPACE: &str = "tigera-compliance";

/// Name of the singleton operator CRs (Manager, Compliance, Authentication, APIServer)
pub const TIGERA_SECURE: &str = "tigera-secure";

/// Name of the singleton Installation and LicenseKey resources
pub const DEFAULT_INSTANCE: &str = "default";

/// Calico tier that holds the network policies rendered by the operator
pub const TIGERA_COMPONENT_TIER: &str = "allow-tigera";

/// License feature that gates the compliance integration
pub const COMPLIANCE_FEATURE: &str = "compliance-reports";

/// Label used to select the pods of every rendered workload
pub const K8S_APP_LABEL: &str = "k8s-app";
