//! Elasticsearch client wiring shared by components that read logs
//!
//! Components reach Elasticsearch through the in-cluster HTTP service with
//! per-component users. Credentials come from `<user>-elasticsearch-access`
//! Secrets and the CA from the public cert Secret.

use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, EnvVarSource, KeyToPath, PodSpec, SecretKeySelector,
    SecretVolumeSource, Volume, VolumeMount,
};

use tigera_common::{Error, Result};

/// Secret holding the Elasticsearch HTTP CA certificate
pub const PUBLIC_CERT_SECRET: &str = "tigera-secure-es-http-certs-public";

/// ConfigMap in the operator namespace describing the Elasticsearch cluster
pub const CLUSTER_CONFIG_CONFIG_MAP: &str = "tigera-secure-elasticsearch";

/// ConfigMap written by the ECK operator with the license level
pub const ECK_LICENSE_CONFIG_MAP: &str = "elastic-licensing";

/// Secret with the manager's Elasticsearch credentials
pub const MANAGER_USER_SECRET: &str = "tigera-ee-manager-elasticsearch-access";

/// Elasticsearch HTTP service host
pub const HTTP_SERVICE: &str = "tigera-secure-es-http.tigera-elasticsearch.svc";

const HTTP_PORT: &str = "9200";
const CA_VOLUME: &str = "elastic-ca-cert-volume";
const CA_MOUNT_DIR: &str = "/etc/ssl/elastic/";
const CA_FILE: &str = "/etc/ssl/elastic/ca.pem";

/// Secret holding the credentials of `user`
pub fn user_secret_name(user: &str) -> String {
    format!("{user}-elasticsearch-access")
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Add Elasticsearch connection settings and the CA mount to a container
pub fn elasticsearch_container_decorate(
    mut container: Container,
    cluster_name: &str,
    es_user: &str,
    cluster_domain: &str,
) -> Container {
    let user_secret = user_secret_name(es_user);
    let vars = [
        env("ELASTIC_HOST", format!("{HTTP_SERVICE}.{cluster_domain}")),
        env("ELASTIC_PORT", HTTP_PORT),
        env("ELASTIC_ACCESS_MODE", "serviceuser"),
        env("ELASTIC_SSL_VERIFY", "true"),
        secret_env("ELASTIC_USER", &user_secret, "username"),
        secret_env("ELASTIC_USERNAME", &user_secret, "username"),
        secret_env("ELASTIC_PASSWORD", &user_secret, "password"),
        env("ELASTIC_CA", CA_FILE),
        env("ELASTIC_INDEX_SUFFIX", cluster_name),
    ];
    container.env.get_or_insert_with(Vec::new).extend(vars);
    container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(VolumeMount {
            name: CA_VOLUME.to_string(),
            mount_path: CA_MOUNT_DIR.to_string(),
            ..Default::default()
        });
    container
}

/// Add the Elasticsearch CA volume to a pod spec
pub fn elasticsearch_pod_spec_decorate(mut spec: PodSpec) -> PodSpec {
    spec.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: CA_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(PUBLIC_CERT_SECRET.to_string()),
            items: Some(vec![KeyToPath {
                key: "tls.crt".to_string(),
                path: "ca.pem".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    });
    spec
}

/// Elasticsearch cluster settings published by the log storage controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Name used as index suffix
    pub cluster_name: String,
    /// Replicas per index
    pub replicas: u32,
    /// Shards per index
    pub shards: u32,
}

impl ClusterConfig {
    /// Parse the cluster config ConfigMap
    pub fn from_config_map(cm: &ConfigMap) -> Result<Self> {
        let resource = format!("ConfigMap/{CLUSTER_CONFIG_CONFIG_MAP}");
        let data = cm.data.as_ref();
        let field = |key: &str| -> Result<String> {
            data.and_then(|d| d.get(key))
                .cloned()
                .ok_or_else(|| Error::validation_for(&resource, format!("missing {key}")))
        };
        let number = |key: &str| -> Result<u32> {
            let raw = field(key)?;
            raw.parse().map_err(|_| {
                Error::validation_for(&resource, format!("{key} is not a number: {raw:?}"))
            })
        };
        Ok(Self {
            cluster_name: field("clusterName")?,
            replicas: number("replicas")?,
            shards: number("shards")?,
        })
    }
}

/// Elastic license level reported by ECK
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LicenseType {
    /// Free basic license
    Basic,
    /// Trial of the enterprise license
    EnterpriseTrial,
    /// Enterprise license
    Enterprise,
    /// Not reported
    #[default]
    Unknown,
}

impl LicenseType {
    /// Read the license level from the ECK licensing ConfigMap
    pub fn from_config_map(cm: &ConfigMap) -> Self {
        match cm
            .data
            .as_ref()
            .and_then(|d| d.get("eck_license_level"))
            .map(String::as_str)
        {
            Some("basic") => Self::Basic,
            Some("enterprise_trial") => Self::EnterpriseTrial,
            Some("enterprise") => Self::Enterprise,
            _ => Self::Unknown,
        }
    }

    /// Value passed to the manager
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::EnterpriseTrial => "enterprise_trial",
            Self::Enterprise => "enterprise",
            Self::Unknown => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_map(pairs: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            data: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn container_gets_credentials_and_ca() {
        let c = elasticsearch_container_decorate(
            Container {
                name: "compliance-server".to_string(),
                ..Default::default()
            },
            "cluster",
            "tigera-ee-compliance-server",
            "cluster.local",
        );
        let env = c.env.unwrap();
        let host = env.iter().find(|e| e.name == "ELASTIC_HOST").unwrap();
        assert_eq!(
            host.value.as_deref(),
            Some("tigera-secure-es-http.tigera-elasticsearch.svc.cluster.local")
        );
        let password = env.iter().find(|e| e.name == "ELASTIC_PASSWORD").unwrap();
        let selector = password
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(selector.name, "tigera-ee-compliance-server-elasticsearch-access");
        assert_eq!(selector.key, "password");
        assert_eq!(c.volume_mounts.unwrap()[0].name, "elastic-ca-cert-volume");
    }

    #[test]
    fn pod_spec_gets_ca_volume() {
        let spec = elasticsearch_pod_spec_decorate(PodSpec::default());
        let volume = &spec.volumes.unwrap()[0];
        assert_eq!(volume.name, "elastic-ca-cert-volume");
        assert_eq!(
            volume.secret.as_ref().unwrap().secret_name.as_deref(),
            Some(PUBLIC_CERT_SECRET)
        );
    }

    #[test]
    fn cluster_config_parses() {
        let cfg = ClusterConfig::from_config_map(&config_map(&[
            ("clusterName", "cluster"),
            ("replicas", "1"),
            ("shards", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.cluster_name, "cluster");
        assert_eq!(cfg.shards, 5);

        let err = ClusterConfig::from_config_map(&config_map(&[("clusterName", "c")])).unwrap_err();
        assert!(err.to_string().contains("missing replicas"));
    }

    #[test]
    fn license_levels() {
        let cm = config_map(&[("eck_license_level", "enterprise_trial")]);
        assert_eq!(LicenseType::from_config_map(&cm), LicenseType::EnterpriseTrial);
        assert_eq!(
            LicenseType::from_config_map(&ConfigMap::default()),
            LicenseType::Unknown
        );
    }
}
