//! Process configuration, from flags with environment fallbacks

use clap::Args;

use tigera_common::crd::Provider;
use tigera_common::dns::DEFAULT_CLUSTER_DOMAIN;
use tigera_common::OPERATOR_NAMESPACE;
use tigera_manager_controller::ControllerConfig;

/// Settings of the controller process
#[derive(Args, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace the operator runs in
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = OPERATOR_NAMESPACE)]
    pub operator_namespace: String,

    /// Cluster DNS domain used in service FQDNs
    #[arg(long, env = "CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// Kubernetes platform (EKS, GKE, AKS, OpenShift, ...)
    #[arg(long, env = "KUBERNETES_PROVIDER", default_value = "", value_parser = parse_provider)]
    pub provider: Provider,

    /// Render PodSecurityPolicies
    #[arg(long, env = "USE_PSP", default_value_t = false)]
    pub use_psp: bool,

    /// Apply the operator's own CRDs on startup
    #[arg(long, env = "INSTALL_CRDS", default_value_t = false)]
    pub install_crds: bool,
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    s.parse::<Provider>().map_err(|e| e.to_string())
}

impl OperatorConfig {
    /// Settings handed to the manager controller
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            operator_namespace: self.operator_namespace.clone(),
            cluster_domain: self.cluster_domain.clone(),
            provider: self.provider,
            use_psp: self.use_psp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: OperatorConfig,
    }

    fn parse(args: &[&str]) -> OperatorConfig {
        Harness::try_parse_from(std::iter::once("tigera-operator").chain(args.iter().copied()))
            .unwrap()
            .config
    }

    #[test]
    fn defaults() {
        let config = parse(&[]);
        assert_eq!(config.operator_namespace, "tigera-operator");
        assert_eq!(config.cluster_domain, "cluster.local");
        assert_eq!(config.provider, Provider::None);
        assert!(!config.use_psp);
        assert!(!config.install_crds);
    }

    #[rstest]
    #[case("EKS", Provider::Eks)]
    #[case("openshift", Provider::OpenShift)]
    #[case("RKE2", Provider::Rke2)]
    fn provider_is_case_insensitive(#[case] arg: &str, #[case] expected: Provider) {
        assert_eq!(parse(&["--provider", arg]).provider, expected);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = Harness::try_parse_from(["tigera-operator", "--provider", "mesos"]);
        assert!(result.is_err());
    }

    #[test]
    fn controller_config_carries_flags() {
        let config = parse(&[
            "--operator-namespace",
            "ops",
            "--cluster-domain",
            "example.internal",
            "--use-psp",
        ]);
        let controller = config.controller_config();
        assert_eq!(controller.operator_namespace, "ops");
        assert_eq!(controller.cluster_domain, "example.internal");
        assert!(controller.use_psp);
    }
}
