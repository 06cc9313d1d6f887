//! Applies rendered components to the cluster

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::{debug, info};

use tigera_common::kube_utils::kind_priority;
use tigera_common::status::StatusManager;
use tigera_common::Error;
use tigera_render::{Component, Manifest};

use crate::client::ManagerClient;

/// Creates, updates and deletes the objects of a component
pub struct ComponentHandler<'a> {
    client: &'a dyn ManagerClient,
    owner: Option<OwnerReference>,
    unowned_namespace: Option<String>,
}

impl<'a> ComponentHandler<'a> {
    /// Handler applying through `client`
    pub fn new(client: &'a dyn ManagerClient) -> Self {
        Self {
            client,
            owner: None,
            unowned_namespace: None,
        }
    }

    /// Set a controller owner reference on every applied object
    pub fn with_owner(mut self, owner: Option<OwnerReference>) -> Self {
        self.owner = owner;
        self
    }

    /// Leave objects in `namespace` without an owner
    ///
    /// Secrets in the operator namespace outlive the Manager.
    pub fn skip_owner_in(mut self, namespace: impl Into<String>) -> Self {
        self.unowned_namespace = Some(namespace.into());
        self
    }

    fn set_owner(&self, manifest: &mut Manifest) {
        let Some(owner) = &self.owner else {
            return;
        };
        if manifest.namespace().is_some() && manifest.namespace() == self.unowned_namespace.as_deref()
        {
            return;
        }
        if let (Some(metadata), Ok(owner)) = (
            manifest
                .value_mut()
                .get_mut("metadata")
                .and_then(|m| m.as_object_mut()),
            serde_json::to_value(owner),
        ) {
            metadata.insert(
                "ownerReferences".to_string(),
                serde_json::Value::Array(vec![owner]),
            );
        }
    }

    /// Apply the component's objects and remove the ones it no longer wants
    ///
    /// Deployments and DaemonSets of the component become the workloads
    /// `status` tracks for availability.
    pub async fn create_or_update_or_delete(
        &self,
        component: &dyn Component,
        status: &mut StatusManager,
    ) -> Result<(), Error> {
        let (mut create, mut delete) = component.objects()?;

        create.sort_by_key(|m| kind_priority(m.kind()));
        for manifest in &mut create {
            self.set_owner(manifest);
            self.client.apply_object(manifest).await?;
        }

        delete.sort_by_key(|m| std::cmp::Reverse(kind_priority(m.kind())));
        for manifest in &delete {
            self.client.delete_object(manifest).await?;
        }

        let (deployments, daemonsets) = workloads(&create);
        if !deployments.is_empty() || !daemonsets.is_empty() {
            status.track_workloads(deployments, daemonsets);
        }

        info!(
            component = component.name(),
            applied = create.len(),
            deleted = delete.len(),
            "component reconciled"
        );
        Ok(())
    }

    /// Whether every workload `status` tracks has rolled out
    pub async fn workloads_ready(&self, status: &StatusManager) -> Result<bool, Error> {
        for key in status.tracked_deployments() {
            let (ns, name) = split_key(key);
            if !self.client.deployment_available(name, ns).await? {
                debug!(deployment = %key, "not available yet");
                return Ok(false);
            }
        }
        for key in status.tracked_daemonsets() {
            let (ns, name) = split_key(key);
            if !self.client.daemonset_ready(name, ns).await? {
                debug!(daemonset = %key, "not ready yet");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn workloads(manifests: &[Manifest]) -> (Vec<String>, Vec<String>) {
    let key = |m: &Manifest| format!("{}/{}", m.namespace().unwrap_or_default(), m.name());
    let of_kind = |kind: &str| {
        manifests
            .iter()
            .filter(|m| m.kind() == kind)
            .map(key)
            .collect::<Vec<_>>()
    };
    (of_kind("Deployment"), of_kind("DaemonSet"))
}

fn split_key(key: &str) -> (&str, &str) {
    key.split_once('/').unwrap_or(("", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockManagerClient;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tigera_common::crd::ImageSet;

    struct Fixed {
        create: Vec<Manifest>,
        delete: Vec<Manifest>,
    }

    impl Component for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn resolve_images(&mut self, _: Option<&ImageSet>) -> tigera_common::Result<()> {
            Ok(())
        }
        fn objects(&self) -> tigera_common::Result<(Vec<Manifest>, Vec<Manifest>)> {
            Ok((self.create.clone(), self.delete.clone()))
        }
        fn ready(&self) -> bool {
            true
        }
    }

    fn manifest(api_version: &str, kind: &str, name: &str, ns: Option<&str>) -> Manifest {
        let mut metadata = json!({ "name": name });
        if let Some(ns) = ns {
            metadata["namespace"] = json!(ns);
        }
        Manifest::from_value(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": metadata,
        }))
        .unwrap()
    }

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "operator.tigera.io/v1".to_string(),
            kind: "Manager".to_string(),
            name: "tigera-secure".to_string(),
            uid: "uid-1".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Story: objects are applied namespace first, owned by the Manager,
    /// except secrets kept in the operator namespace
    #[tokio::test]
    async fn story_apply_order_and_ownership() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let seen = applied.clone();
        let mut client = MockManagerClient::new();
        client.expect_apply_object().returning(move |m| {
            let owned = m.value()["metadata"].get("ownerReferences").is_some();
            seen.lock().unwrap().push((m.describe(), owned));
            Ok(())
        });
        client.expect_delete_object().times(1).returning(|_| Ok(()));

        let component = Fixed {
            create: vec![
                manifest("apps/v1", "Deployment", "tigera-manager", Some("tigera-manager")),
                manifest("v1", "Secret", "manager-tls", Some("tigera-operator")),
                manifest("v1", "Namespace", "tigera-manager", None),
            ],
            delete: vec![manifest(
                "rbac.authorization.k8s.io/v1",
                "ClusterRole",
                "tigera-managed-cluster-watch",
                None,
            )],
        };

        let mut status = StatusManager::new("manager");
        ComponentHandler::new(&client)
            .with_owner(Some(owner()))
            .skip_owner_in("tigera-operator")
            .create_or_update_or_delete(&component, &mut status)
            .await
            .unwrap();

        let applied = applied.lock().unwrap();
        assert_eq!(applied.len(), 3);
        assert!(applied[0].0.contains("Namespace"));
        assert!(applied[0].1);
        assert!(applied[1].0.contains("Secret"));
        assert!(!applied[1].1, "operator namespace secrets stay unowned");
        assert!(applied[2].0.contains("Deployment"));
        assert_eq!(status.tracked_deployments(), ["tigera-manager/tigera-manager"]);
    }

    #[tokio::test]
    async fn component_without_workloads_keeps_tracking() {
        let mut client = MockManagerClient::new();
        client.expect_apply_object().returning(|_| Ok(()));

        let mut status = StatusManager::new("manager");
        status.track_workloads(vec!["tigera-manager/tigera-manager".to_string()], vec![]);
        let component = Fixed {
            create: vec![manifest("v1", "ConfigMap", "tigera-ca-bundle", Some("tigera-manager"))],
            delete: vec![],
        };
        ComponentHandler::new(&client)
            .create_or_update_or_delete(&component, &mut status)
            .await
            .unwrap();
        assert_eq!(status.tracked_deployments().len(), 1);
    }

    #[tokio::test]
    async fn apply_failure_stops_the_component() {
        let mut client = MockManagerClient::new();
        client
            .expect_apply_object()
            .times(1)
            .returning(|_| Err(Error::internal("apply rejected")));
        client.expect_delete_object().never();

        let component = Fixed {
            create: vec![
                manifest("v1", "Namespace", "tigera-manager", None),
                manifest("v1", "Service", "tigera-manager", Some("tigera-manager")),
            ],
            delete: vec![manifest("v1", "Secret", "old", Some("tigera-manager"))],
        };
        let mut status = StatusManager::new("manager");
        let result = ComponentHandler::new(&client)
            .create_or_update_or_delete(&component, &mut status)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn workloads_ready_checks_each_deployment() {
        let mut client = MockManagerClient::new();
        client
            .expect_deployment_available()
            .withf(|name, ns| name == "tigera-manager" && ns == "tigera-manager")
            .returning(|_, _| Ok(false));

        let mut status = StatusManager::new("manager");
        status.track_workloads(vec!["tigera-manager/tigera-manager".to_string()], vec![]);
        let ready = ComponentHandler::new(&client)
            .workloads_ready(&status)
            .await
            .unwrap();
        assert!(!ready);
    }
}
