//! Custom Resource Definitions consumed and produced by the operator

mod calico;
mod felix_configuration;
mod installation;
mod manager;
mod operator;
mod types;

pub use calico::{
    AuditEventsSelection, AuditResource, GlobalReportType, LicenseKey, LicenseKeySpec,
    LicenseKeyStatus, ReportTemplate, ReportTypeSpec, Tier, TierSpec,
};
pub use felix_configuration::{
    AWSSrcDstCheckOption, Duration, FelixConfiguration, FelixConfigurationSpec, IptablesBackend,
    NFTablesMode, ProtoPort, RouteTableRange, TPROXYModeOption,
};
pub use installation::{Installation, InstallationSpec, InstallationStatus};
pub use manager::{Auth, AuthType, Manager, ManagerSpec, ManagerStatus};
pub use operator::{
    APIServer, APIServerSpec, Authentication, AuthenticationOidc, AuthenticationSpec, Compliance,
    ComplianceSpec, ComponentStatus, ImageDigest, ImageSet, ImageSetSpec, ManagementCluster,
    ManagementClusterConnection, ManagementClusterConnectionSpec, ManagementClusterSpec, OidcType,
    TigeraStatus, TigeraStatusSpec, TigeraStatusStatus,
};
pub use types::{
    Condition, ConditionStatus, ProductVariant, Provider, StatusReason, TigeraStatusState,
    TlsSpec,
};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// CRDs owned by this operator, in install order
pub fn owned_crds() -> Vec<CustomResourceDefinition> {
    vec![Manager::crd(), TigeraStatus::crd()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_crds_are_operator_group() {
        let crds = owned_crds();
        let names: Vec<_> = crds
            .iter()
            .filter_map(|c| c.metadata.name.as_deref())
            .collect();
        assert_eq!(
            names,
            vec!["managers.operator.tigera.io", "tigerastatuses.operator.tigera.io"]
        );
    }
}
