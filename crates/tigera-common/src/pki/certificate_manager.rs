//! Certificate manager: the operator CA plus key pairs stored in Secrets
//!
//! The manager reads Secrets through [`SecretReader`] and never writes them.
//! Issued key pairs are handed to the certificate-management renderer, which
//! applies them together with the rest of a component.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Secret, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use super::{inspect, CertificateAuthority, CA_COMMON_NAME};
use crate::kube_utils::deterministic_hash;
use crate::{metrics, Error};

/// Secret holding the operator CA key pair
pub const CA_SECRET_NAME: &str = "tigera-ca-private";

/// ConfigMap holding the trusted bundle
pub const TRUSTED_BUNDLE_NAME: &str = "tigera-ca-bundle";

/// Key of the bundle inside the ConfigMap
pub const TRUSTED_BUNDLE_KEY: &str = "tigera-ca-bundle.crt";

/// Directory the trusted bundle is mounted at
pub const TRUSTED_BUNDLE_MOUNT_PATH: &str = "/etc/pki/tls/certs";

const TLS_CERT_KEY: &str = "tls.crt";
const TLS_KEY_KEY: &str = "tls.key";
const HASH_ANNOTATION_PREFIX: &str = "hash.operator.tigera.io";

/// Read access to Secrets
///
/// Returns `Ok(None)` when the Secret does not exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// Get a Secret by name and namespace
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;
}

/// A certificate, optionally with its private key, backed by a Secret
#[derive(Clone, Debug, PartialEq)]
pub struct KeyPair {
    /// Secret name
    pub name: String,
    /// Namespace the Secret was read from
    pub namespace: String,
    /// PEM certificate (may be a chain)
    pub cert_pem: String,
    /// PEM private key; `None` for certificate-only entries
    pub key_pem: Option<String>,
    /// Provided by the user rather than issued by the operator CA
    pub byo: bool,
}

impl KeyPair {
    /// Render the key pair as a `kubernetes.io/tls` Secret in `namespace`
    ///
    /// Without a private key the Secret only carries `tls.crt`.
    pub fn secret(&self, namespace: &str) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(
            TLS_CERT_KEY.to_string(),
            ByteString(self.cert_pem.clone().into_bytes()),
        );
        if let Some(key) = &self.key_pem {
            data.insert(TLS_KEY_KEY.to_string(), ByteString(key.clone().into_bytes()));
        }
        Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            type_: Some(if self.key_pem.is_some() {
                "kubernetes.io/tls".to_string()
            } else {
                "Opaque".to_string()
            }),
            data: Some(data),
            ..Default::default()
        }
    }

    /// Pod-template annotation that rolls pods when the certificate changes
    pub fn hash_annotation(&self) -> (String, String) {
        (
            format!("{HASH_ANNOTATION_PREFIX}/{}", self.name),
            deterministic_hash(&self.cert_pem),
        )
    }

    /// Secret volume named after the key pair
    pub fn volume(&self) -> Volume {
        Volume {
            name: self.name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(self.name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Read-only mount of [`KeyPair::volume`] at `/<name>`
    pub fn volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.name.clone(),
            mount_path: format!("/{}", self.name),
            read_only: Some(true),
            ..Default::default()
        }
    }

    /// Path of the certificate inside [`KeyPair::volume_mount`]
    pub fn cert_path(&self) -> String {
        format!("/{}/{}", self.name, TLS_CERT_KEY)
    }

    /// Path of the private key inside [`KeyPair::volume_mount`]
    pub fn key_path(&self) -> String {
        format!("/{}/{}", self.name, TLS_KEY_KEY)
    }
}

/// Set of certificates that components trust, shipped as a ConfigMap
#[derive(Clone, Debug, PartialEq)]
pub struct TrustedBundle {
    /// (source name, PEM) in insertion order, CA first
    certificates: Vec<(String, String)>,
}

impl TrustedBundle {
    /// Bundle seeded with the CA certificate
    pub fn new(ca: &KeyPair) -> Self {
        Self {
            certificates: vec![(ca.name.clone(), ca.cert_pem.clone())],
        }
    }

    /// Add certificates, skipping any already in the bundle
    pub fn add_certificates<'a>(&mut self, key_pairs: impl IntoIterator<Item = &'a KeyPair>) {
        for kp in key_pairs {
            if self.certificates.iter().any(|(_, pem)| *pem == kp.cert_pem) {
                debug!(certificate = %kp.name, "certificate already in trusted bundle");
                continue;
            }
            self.certificates.push((kp.name.clone(), kp.cert_pem.clone()));
        }
    }

    /// Names of the certificates in the bundle
    pub fn names(&self) -> Vec<&str> {
        self.certificates.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Concatenated PEM
    pub fn pem(&self) -> String {
        self.certificates
            .iter()
            .map(|(_, pem)| pem.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
            + "\n"
    }

    /// One hash annotation per certificate
    pub fn hash_annotations(&self) -> BTreeMap<String, String> {
        self.certificates
            .iter()
            .map(|(name, pem)| {
                (
                    format!("{HASH_ANNOTATION_PREFIX}/{name}"),
                    deterministic_hash(pem),
                )
            })
            .collect()
    }

    /// ConfigMap carrying the bundle in `namespace`
    pub fn config_map(&self, namespace: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(TRUSTED_BUNDLE_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                annotations: Some(self.hash_annotations()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(TRUSTED_BUNDLE_KEY.to_string(), self.pem())])),
            ..Default::default()
        }
    }

    /// ConfigMap volume for pods
    pub fn volume(&self) -> Volume {
        Volume {
            name: TRUSTED_BUNDLE_NAME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: TRUSTED_BUNDLE_NAME.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Read-only mount of [`TrustedBundle::volume`]
    pub fn volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: TRUSTED_BUNDLE_NAME.to_string(),
            mount_path: TRUSTED_BUNDLE_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }
    }

    /// Full path of the bundle file inside the mount
    pub fn mount_path(&self) -> String {
        format!("{TRUSTED_BUNDLE_MOUNT_PATH}/{TRUSTED_BUNDLE_KEY}")
    }
}

/// Operator CA and the key pairs it manages
pub struct CertificateManager {
    ca: CertificateAuthority,
    ca_key_pair: KeyPair,
    cluster_domain: String,
}

fn secret_field(secret: &Secret, key: &str) -> Result<Option<String>, Error> {
    let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(key)) else {
        return Ok(None);
    };
    let name = secret.metadata.name.clone().unwrap_or_default();
    String::from_utf8(bytes.0.clone())
        .map(Some)
        .map_err(|e| Error::certificate(name, format!("{key} is not valid UTF-8: {e}")))
}

fn required_field(secret: &Secret, key: &str) -> Result<String, Error> {
    secret_field(secret, key)?.ok_or_else(|| {
        Error::certificate(
            secret.metadata.name.clone().unwrap_or_default(),
            format!("secret is missing data field {key}"),
        )
    })
}

impl CertificateManager {
    /// Load the CA from `tigera-ca-private` in `truth_namespace`, or create one
    ///
    /// A newly created CA is only persisted when the certificate-management
    /// renderer applies [`CertificateManager::key_pair`].
    pub async fn create<R: SecretReader + ?Sized>(
        reader: &R,
        truth_namespace: &str,
        cluster_domain: &str,
    ) -> Result<Self, Error> {
        let ca = match reader.get_secret(CA_SECRET_NAME, truth_namespace).await? {
            Some(secret) => {
                let cert = required_field(&secret, TLS_CERT_KEY)?;
                let key = required_field(&secret, TLS_KEY_KEY)?;
                debug!(namespace = %truth_namespace, "loaded operator CA");
                CertificateAuthority::from_pem(&cert, &key)?
            }
            None => {
                info!(namespace = %truth_namespace, "creating operator CA");
                CertificateAuthority::new(CA_COMMON_NAME)?
            }
        };

        let ca_key_pair = KeyPair {
            name: CA_SECRET_NAME.to_string(),
            namespace: truth_namespace.to_string(),
            cert_pem: ca.ca_cert_pem().to_string(),
            key_pem: Some(ca.ca_key_pem().to_string()),
            byo: false,
        };

        Ok(Self {
            ca,
            ca_key_pair,
            cluster_domain: cluster_domain.to_string(),
        })
    }

    /// Cluster DNS domain used for service names
    pub fn cluster_domain(&self) -> &str {
        &self.cluster_domain
    }

    /// The CA itself as a key pair
    pub fn key_pair(&self) -> &KeyPair {
        &self.ca_key_pair
    }

    /// Classify a certificate read from a Secret
    ///
    /// A certificate is user-provided when it was not issued by an operator
    /// CA at all. One issued by an operator CA with a different key is
    /// ours but stale.
    fn is_byo(&self, cert_pem: &str) -> Result<bool, Error> {
        let info = inspect(cert_pem)?;
        Ok(info.issuer_common_name != CA_COMMON_NAME && !self.ca.signed(cert_pem)?)
    }

    /// Existing key pair, or a new one signed by the CA
    ///
    /// The stored key pair is reused when it is user-provided, or when it was
    /// signed by this CA, covers `dns_names` and has not expired.
    pub async fn get_or_create_key_pair<R: SecretReader + ?Sized>(
        &self,
        reader: &R,
        name: &str,
        namespace: &str,
        dns_names: &[String],
    ) -> Result<KeyPair, Error> {
        if let Some(existing) = self.get_key_pair(reader, name, namespace).await? {
            if existing.byo {
                debug!(secret = %name, "using user-provided certificate");
                return Ok(existing);
            }
            let info = inspect(&existing.cert_pem)?;
            if self.ca.signed(&existing.cert_pem)? && info.covers(dns_names) && !info.is_expired()
            {
                return Ok(existing);
            }
            info!(
                secret = %name,
                expired = info.is_expired(),
                "reissuing operator certificate"
            );
        }

        let (cert_pem, key_pem) = self
            .ca
            .sign_server_cert(dns_names)
            .map_err(|e| Error::certificate(name, e.to_string()))?;
        metrics::record_certificate_issued(name);
        info!(secret = %name, namespace = %namespace, "issued certificate");

        Ok(KeyPair {
            name: name.to_string(),
            namespace: namespace.to_string(),
            cert_pem,
            key_pem: Some(key_pem),
            byo: false,
        })
    }

    /// Existing key pair, without creating one
    ///
    /// `Ok(None)` when the Secret does not exist; an error when it exists but
    /// does not hold a certificate and key.
    pub async fn get_key_pair<R: SecretReader + ?Sized>(
        &self,
        reader: &R,
        name: &str,
        namespace: &str,
    ) -> Result<Option<KeyPair>, Error> {
        let Some(secret) = reader.get_secret(name, namespace).await? else {
            return Ok(None);
        };
        let cert_pem = required_field(&secret, TLS_CERT_KEY)?;
        let key_pem = required_field(&secret, TLS_KEY_KEY)?;
        let byo = self
            .is_byo(&cert_pem)
            .map_err(|e| Error::certificate(name, e.to_string()))?;

        Ok(Some(KeyPair {
            name: name.to_string(),
            namespace: namespace.to_string(),
            cert_pem,
            key_pem: Some(key_pem),
            byo,
        }))
    }

    /// Existing certificate without its key, for the trusted bundle
    pub async fn get_certificate<R: SecretReader + ?Sized>(
        &self,
        reader: &R,
        name: &str,
        namespace: &str,
    ) -> Result<Option<KeyPair>, Error> {
        let Some(secret) = reader.get_secret(name, namespace).await? else {
            return Ok(None);
        };
        let cert_pem = required_field(&secret, TLS_CERT_KEY)?;
        let byo = self
            .is_byo(&cert_pem)
            .map_err(|e| Error::certificate(name, e.to_string()))?;

        Ok(Some(KeyPair {
            name: name.to_string(),
            namespace: namespace.to_string(),
            cert_pem,
            key_pem: None,
            byo,
        }))
    }

    /// Bundle containing only the CA
    pub fn create_trusted_bundle(&self) -> TrustedBundle {
        TrustedBundle::new(&self.ca_key_pair)
    }
}
