//! A rendered Kubernetes object

use kube::api::DynamicObject;
use kube::Resource;
use serde::Serialize;
use serde_json::Value;

use tigera_common::{Error, Result};

/// A rendered object as JSON, with typed accessors for its identity
///
/// Built from typed k8s-openapi / CRD objects with [`Manifest::from_resource`],
/// or from raw JSON for kinds without a Rust type (Calico policies,
/// OpenShift SCCs, PSPs).
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest(Value);

impl Manifest {
    /// Render a typed resource; `apiVersion` and `kind` come from its type
    pub fn from_resource<K>(resource: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let mut value = serde_json::to_value(resource)
            .map_err(|e| Error::serialization_for_kind(K::kind(&()), e.to_string()))?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| Error::serialization_for_kind(K::kind(&()), "not a JSON object"))?;
        obj.insert("apiVersion".to_string(), Value::from(K::api_version(&()).as_ref()));
        obj.insert("kind".to_string(), Value::from(K::kind(&()).as_ref()));
        Self::from_value(value)
    }

    /// Wrap raw JSON; it must carry `apiVersion`, `kind` and `metadata.name`
    pub fn from_value(value: Value) -> Result<Self> {
        let manifest = Self(value);
        let kind = manifest.kind().to_string();
        if manifest.api_version().is_empty() || kind.is_empty() {
            return Err(Error::serialization("manifest is missing apiVersion or kind"));
        }
        if manifest.name().is_empty() {
            return Err(Error::serialization_for_kind(kind, "manifest has no metadata.name"));
        }
        Ok(manifest)
    }

    /// `apiVersion`
    pub fn api_version(&self) -> &str {
        self.0["apiVersion"].as_str().unwrap_or_default()
    }

    /// `kind`
    pub fn kind(&self) -> &str {
        self.0["kind"].as_str().unwrap_or_default()
    }

    /// `metadata.name`
    pub fn name(&self) -> &str {
        self.0["metadata"]["name"].as_str().unwrap_or_default()
    }

    /// `metadata.namespace`, `None` for cluster-scoped objects
    pub fn namespace(&self) -> Option<&str> {
        self.0["metadata"]["namespace"].as_str()
    }

    /// The JSON object
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Mutable access to the JSON object
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    /// Consume into JSON
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Deserialize back into a typed resource
    pub fn to_typed<K: serde::de::DeserializeOwned>(&self) -> Result<K> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| Error::serialization_for_kind(self.kind(), e.to_string()))
    }

    /// Convert for use with a dynamic kube API
    pub fn to_dynamic(&self) -> Result<DynamicObject> {
        self.to_typed()
    }

    /// `kind/namespace/name` for logs
    pub fn describe(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}/{}", self.kind(), ns, self.name()),
            None => format!("{}/{}", self.kind(), self.name()),
        }
    }

    /// YAML document
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.0)
            .map_err(|e| Error::serialization_for_kind(self.kind(), e.to_string()))
    }
}

/// Render a YAML stream of manifests separated by `---`
pub fn to_yaml_stream(manifests: &[Manifest]) -> Result<String> {
    let docs = manifests
        .iter()
        .map(Manifest::to_yaml)
        .collect::<Result<Vec<_>>>()?;
    Ok(docs.join("---\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceAccount;
    use kube::api::ObjectMeta;

    fn service_account() -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some("tigera-manager".to_string()),
                namespace: Some("tigera-manager".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn typed_resource_carries_identity() {
        let m = Manifest::from_resource(&service_account()).unwrap();
        assert_eq!(m.api_version(), "v1");
        assert_eq!(m.kind(), "ServiceAccount");
        assert_eq!(m.name(), "tigera-manager");
        assert_eq!(m.namespace(), Some("tigera-manager"));
        assert_eq!(m.describe(), "ServiceAccount/tigera-manager/tigera-manager");
    }

    #[test]
    fn raw_value_requires_name() {
        let err = Manifest::from_value(serde_json::json!({
            "apiVersion": "projectcalico.org/v3",
            "kind": "NetworkPolicy",
            "metadata": {}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn converts_to_dynamic_object() {
        let m = Manifest::from_resource(&service_account()).unwrap();
        let obj = m.to_dynamic().unwrap();
        assert_eq!(obj.metadata.name.as_deref(), Some("tigera-manager"));
        assert_eq!(obj.types.map(|t| t.kind).as_deref(), Some("ServiceAccount"));
    }

    #[test]
    fn yaml_stream_separates_documents() {
        let m = Manifest::from_resource(&service_account()).unwrap();
        let yaml = to_yaml_stream(&[m.clone(), m]).unwrap();
        assert_eq!(yaml.matches("---").count(), 1);
        assert!(yaml.contains("kind: ServiceAccount"));
    }
}
