//! Tigera operator - installs and manages the Tigera Manager web console

mod config;

use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::Client;
use tracing::{info, warn};

use tigera_common::crd::owned_crds;
use tigera_common::kube_utils::apply_crds;
use tigera_common::telemetry::{init_telemetry, TelemetryConfig};
use tigera_common::FIELD_MANAGER;
use tigera_render::compliance::{compliance, ComplianceConfiguration};
use tigera_render::images::ImageSettings;
use tigera_render::{to_yaml_stream, Component};

use config::OperatorConfig;

/// How often to look for the enterprise CRDs before starting the controller
const CRD_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Tigera operator - reconciles the Manager and its dependencies
#[derive(Parser, Debug)]
#[command(name = "tigera-operator", version, about, long_about = None)]
struct Cli {
    /// Print the operator's CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the manager controller (default mode)
    Controller,

    /// Print rendered manifests without touching a cluster
    #[command(subcommand)]
    Render(RenderCommands),
}

#[derive(Subcommand, Debug)]
enum RenderCommands {
    /// Compliance namespace, workloads, RBAC and built-in report types
    Compliance {
        /// Image registry, with trailing slash
        #[arg(long)]
        registry: Option<String>,

        /// Elasticsearch cluster name used as index suffix
        #[arg(long, default_value = "cluster")]
        cluster_name: String,

        /// Include the OpenShift SecurityContextConstraints
        #[arg(long)]
        openshift: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install aws-lc-rs crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let docs = owned_crds()
            .iter()
            .map(serde_yaml::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{}", docs.join("---\n"));
        return Ok(());
    }

    match cli.command {
        Some(Commands::Render(RenderCommands::Compliance {
            registry,
            cluster_name,
            openshift,
        })) => {
            print!("{}", render_compliance(registry, cluster_name, openshift)?);
            Ok(())
        }
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

fn render_compliance(
    registry: Option<String>,
    cluster_name: String,
    openshift: bool,
) -> anyhow::Result<String> {
    let mut component = compliance(ComplianceConfiguration {
        image_settings: registry.map(ImageSettings::with_registry).unwrap_or_default(),
        cluster_name,
        openshift,
        ..Default::default()
    });
    component.resolve_images(None)?;
    let (manifests, _) = component.objects()?;
    Ok(to_yaml_stream(&manifests)?)
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig::default())?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if config.install_crds {
        info!("Installing operator CRDs...");
        apply_crds(&client, &owned_crds(), FIELD_MANAGER).await?;
    }

    wait_for_enterprise_crds(&client).await;

    info!(
        namespace = %config.operator_namespace,
        provider = ?config.provider,
        "Starting manager controller"
    );
    tigera_manager_controller::run(client, config.controller_config()).await;
    info!("Controller shut down");
    Ok(())
}

/// Block until the operator.tigera.io CRDs the controller watches exist
async fn wait_for_enterprise_crds(client: &Client) {
    loop {
        match tigera_manager_controller::required_crds_present(client).await {
            Ok(true) => return,
            Ok(false) => info!("Waiting for Tigera enterprise CRDs to be installed"),
            Err(e) => warn!(error = %e, "Failed to check for enterprise CRDs"),
        }
        tokio::time::sleep(CRD_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "tigera-operator",
            "render",
            "compliance",
            "--registry",
            "quay.io/",
            "--openshift",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Render(RenderCommands::Compliance {
                registry,
                cluster_name,
                openshift,
            })) => {
                assert_eq!(registry.as_deref(), Some("quay.io/"));
                assert_eq!(cluster_name, "cluster");
                assert!(openshift);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_runs_the_controller() {
        let cli = Cli::try_parse_from(["tigera-operator"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.crd);
    }

    #[test]
    fn compliance_render_includes_report_types() {
        let yaml = render_compliance(Some("quay.io/".to_string()), "cluster".to_string(), false)
            .unwrap();
        assert!(yaml.contains("kind: Namespace"));
        assert_eq!(yaml.matches("kind: GlobalReportType").count(), 4);
        assert_eq!(yaml.matches("name: inventory\n").count(), 1);
        assert!(yaml.contains("quay.io/"));
        assert!(!yaml.contains("SecurityContextConstraints"));
    }
}
