//! Kubernetes access for the manager reconciler
//!
//! Everything the reconciler reads or writes goes through [`ManagerClient`]
//! so reconcile passes can be driven by mocks in tests.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use tigera_common::crd::{
    APIServer, Authentication, Compliance, ImageSet, Installation, LicenseKey, ManagementCluster,
    ManagementClusterConnection, Manager, ManagerStatus, TigeraStatus, Tier,
};
use tigera_common::kube_utils::{build_api_resource, is_not_found};
use tigera_common::pki::SecretReader;
use tigera_common::status::StatusWriter;
use tigera_common::{Error, DEFAULT_INSTANCE, FIELD_MANAGER, TIGERA_SECURE};
use tigera_render::Manifest;

/// Reads and writes the manager reconciler performs
#[async_trait]
pub trait ManagerClient: SecretReader + StatusWriter {
    /// Get the Manager by name
    async fn get_manager(&self, name: &str) -> Result<Option<Manager>, Error>;

    /// Replace the Manager status
    async fn update_manager_status(&self, name: &str, status: &ManagerStatus)
        -> Result<(), Error>;

    /// Get the `tigera-secure` APIServer
    async fn get_api_server(&self) -> Result<Option<APIServer>, Error>;

    /// Get a Tier by name
    async fn get_tier(&self, name: &str) -> Result<Option<Tier>, Error>;

    /// Get the `default` LicenseKey
    async fn get_license_key(&self) -> Result<Option<LicenseKey>, Error>;

    /// Get the `default` Installation
    async fn get_installation(&self) -> Result<Option<Installation>, Error>;

    /// Get the `tigera-secure` Compliance
    async fn get_compliance(&self) -> Result<Option<Compliance>, Error>;

    /// Get the `tigera-secure` Authentication
    async fn get_authentication(&self) -> Result<Option<Authentication>, Error>;

    /// Get the `tigera-secure` ManagementCluster
    async fn get_management_cluster(&self) -> Result<Option<ManagementCluster>, Error>;

    /// Get the `tigera-secure` ManagementClusterConnection
    async fn get_management_cluster_connection(
        &self,
    ) -> Result<Option<ManagementClusterConnection>, Error>;

    /// Set `spec.tls.secretName` on a ManagementCluster
    async fn set_management_cluster_tls_secret(
        &self,
        name: &str,
        secret_name: &str,
    ) -> Result<(), Error>;

    /// Get an ImageSet by name
    async fn get_image_set(&self, name: &str) -> Result<Option<ImageSet>, Error>;

    /// Whether a namespace exists
    async fn namespace_exists(&self, name: &str) -> Result<bool, Error>;

    /// Get a ConfigMap
    async fn get_config_map(&self, name: &str, namespace: &str)
        -> Result<Option<ConfigMap>, Error>;

    /// Server-side apply a rendered object
    async fn apply_object(&self, manifest: &Manifest) -> Result<(), Error>;

    /// Delete a rendered object; a missing object is not an error
    async fn delete_object(&self, manifest: &Manifest) -> Result<(), Error>;

    /// Whether a Deployment has rolled out; `false` when it does not exist
    async fn deployment_available(&self, name: &str, namespace: &str) -> Result<bool, Error>;

    /// Whether a DaemonSet has rolled out; `false` when it does not exist
    async fn daemonset_ready(&self, name: &str, namespace: &str) -> Result<bool, Error>;
}

/// [`ManagerClient`] backed by the API server
#[derive(Clone)]
pub struct KubeManagerClient {
    client: Client,
}

impl KubeManagerClient {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_cluster<K>(&self, name: &str) -> Result<Option<K>, Error>
    where
        K: kube::Resource + Clone + DeserializeOwned + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    fn dynamic_api(&self, manifest: &Manifest) -> Api<DynamicObject> {
        let ar = build_api_resource(manifest.api_version(), manifest.kind());
        match manifest.namespace() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl SecretReader for KubeManagerClient {
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait]
impl StatusWriter for KubeManagerClient {
    async fn get_tigera_status(&self, name: &str) -> Result<Option<TigeraStatus>, Error> {
        self.client.get_tigera_status(name).await
    }

    async fn write_tigera_status(&self, status: &TigeraStatus) -> Result<(), Error> {
        self.client.write_tigera_status(status).await
    }

    async fn delete_tigera_status(&self, name: &str) -> Result<(), Error> {
        self.client.delete_tigera_status(name).await
    }
}

#[async_trait]
impl ManagerClient for KubeManagerClient {
    async fn get_manager(&self, name: &str) -> Result<Option<Manager>, Error> {
        self.get_cluster(name).await
    }

    async fn update_manager_status(
        &self,
        name: &str,
        status: &ManagerStatus,
    ) -> Result<(), Error> {
        let api: Api<Manager> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "status": status });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_api_server(&self) -> Result<Option<APIServer>, Error> {
        self.get_cluster(TIGERA_SECURE).await
    }

    async fn get_tier(&self, name: &str) -> Result<Option<Tier>, Error> {
        self.get_cluster(name).await
    }

    async fn get_license_key(&self) -> Result<Option<LicenseKey>, Error> {
        self.get_cluster(DEFAULT_INSTANCE).await
    }

    async fn get_installation(&self) -> Result<Option<Installation>, Error> {
        self.get_cluster(DEFAULT_INSTANCE).await
    }

    async fn get_compliance(&self) -> Result<Option<Compliance>, Error> {
        self.get_cluster(TIGERA_SECURE).await
    }

    async fn get_authentication(&self) -> Result<Option<Authentication>, Error> {
        self.get_cluster(TIGERA_SECURE).await
    }

    async fn get_management_cluster(&self) -> Result<Option<ManagementCluster>, Error> {
        self.get_cluster(TIGERA_SECURE).await
    }

    async fn get_management_cluster_connection(
        &self,
    ) -> Result<Option<ManagementClusterConnection>, Error> {
        self.get_cluster(TIGERA_SECURE).await
    }

    async fn set_management_cluster_tls_secret(
        &self,
        name: &str,
        secret_name: &str,
    ) -> Result<(), Error> {
        let api: Api<ManagementCluster> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "spec": { "tls": { "secretName": secret_name } } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_image_set(&self, name: &str) -> Result<Option<ImageSet>, Error> {
        self.get_cluster(name).await
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, Error> {
        let ns: Option<Namespace> = self.get_cluster(name).await?;
        Ok(ns.is_some())
    }

    async fn get_config_map(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_object(&self, manifest: &Manifest) -> Result<(), Error> {
        let obj = manifest.to_dynamic()?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.dynamic_api(manifest)
            .patch(manifest.name(), &params, &Patch::Apply(&obj))
            .await?;
        debug!(object = %manifest.describe(), "applied");
        Ok(())
    }

    async fn delete_object(&self, manifest: &Manifest) -> Result<(), Error> {
        match self
            .dynamic_api(manifest)
            .delete(manifest.name(), &DeleteParams::default())
            .await
        {
            Ok(_) => {
                debug!(object = %manifest.describe(), "deleted");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn deployment_available(&self, name: &str, namespace: &str) -> Result<bool, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .get_opt(name)
            .await?
            .as_ref()
            .is_some_and(deployment_rolled_out))
    }

    async fn daemonset_ready(&self, name: &str, namespace: &str) -> Result<bool, Error> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .get_opt(name)
            .await?
            .as_ref()
            .is_some_and(daemonset_rolled_out))
    }
}

/// Every desired replica is updated and available for the current generation
pub fn deployment_rolled_out(deployment: &Deployment) -> bool {
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let observed = status.observed_generation.unwrap_or_default();
    observed >= deployment.metadata.generation.unwrap_or_default()
        && status.updated_replicas.unwrap_or_default() >= desired
        && status.available_replicas.unwrap_or_default() >= desired
}

/// Every scheduled pod runs the current template and is available
pub fn daemonset_rolled_out(ds: &DaemonSet) -> bool {
    let Some(status) = ds.status.as_ref() else {
        return false;
    };
    let desired = status.desired_number_scheduled;
    status.observed_generation.unwrap_or_default() >= ds.metadata.generation.unwrap_or_default()
        && status.updated_number_scheduled.unwrap_or_default() >= desired
        && status.number_available.unwrap_or_default() >= desired
}

#[cfg(test)]
mockall::mock! {
    pub ManagerClient {}

    #[async_trait]
    impl SecretReader for ManagerClient {
        async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;
    }

    #[async_trait]
    impl StatusWriter for ManagerClient {
        async fn get_tigera_status(&self, name: &str) -> Result<Option<TigeraStatus>, Error>;
        async fn write_tigera_status(&self, status: &TigeraStatus) -> Result<(), Error>;
        async fn delete_tigera_status(&self, name: &str) -> Result<(), Error>;
    }

    #[async_trait]
    impl ManagerClient for ManagerClient {
        async fn get_manager(&self, name: &str) -> Result<Option<Manager>, Error>;
        async fn update_manager_status(&self, name: &str, status: &ManagerStatus) -> Result<(), Error>;
        async fn get_api_server(&self) -> Result<Option<APIServer>, Error>;
        async fn get_tier(&self, name: &str) -> Result<Option<Tier>, Error>;
        async fn get_license_key(&self) -> Result<Option<LicenseKey>, Error>;
        async fn get_installation(&self) -> Result<Option<Installation>, Error>;
        async fn get_compliance(&self) -> Result<Option<Compliance>, Error>;
        async fn get_authentication(&self) -> Result<Option<Authentication>, Error>;
        async fn get_management_cluster(&self) -> Result<Option<ManagementCluster>, Error>;
        async fn get_management_cluster_connection(&self) -> Result<Option<ManagementClusterConnection>, Error>;
        async fn set_management_cluster_tls_secret(&self, name: &str, secret_name: &str) -> Result<(), Error>;
        async fn get_image_set(&self, name: &str) -> Result<Option<ImageSet>, Error>;
        async fn namespace_exists(&self, name: &str) -> Result<bool, Error>;
        async fn get_config_map(&self, name: &str, namespace: &str) -> Result<Option<ConfigMap>, Error>;
        async fn apply_object(&self, manifest: &Manifest) -> Result<(), Error>;
        async fn delete_object(&self, manifest: &Manifest) -> Result<(), Error>;
        async fn deployment_available(&self, name: &str, namespace: &str) -> Result<bool, Error>;
        async fn daemonset_ready(&self, name: &str, namespace: &str) -> Result<bool, Error>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DaemonSetStatus, DeploymentSpec, DeploymentStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn deployment(replicas: i32, updated: i32, available: i32, observed: i64) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                generation: Some(2),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: Some(observed),
                updated_replicas: Some(updated),
                available_replicas: Some(available),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn deployment_rollout_states() {
        assert!(deployment_rolled_out(&deployment(2, 2, 2, 2)));
        assert!(!deployment_rolled_out(&deployment(2, 2, 1, 2)));
        assert!(!deployment_rolled_out(&deployment(2, 1, 2, 2)));
        assert!(!deployment_rolled_out(&deployment(2, 2, 2, 1)));
        assert!(!deployment_rolled_out(&Deployment::default()));
    }

    #[test]
    fn daemonset_rollout_states() {
        let ds = |available| DaemonSet {
            status: Some(DaemonSetStatus {
                desired_number_scheduled: 3,
                updated_number_scheduled: Some(3),
                number_available: Some(available),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(daemonset_rolled_out(&ds(3)));
        assert!(!daemonset_rolled_out(&ds(2)));
    }
}
