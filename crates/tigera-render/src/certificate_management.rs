//! Persists operator-managed key pairs and the trusted bundle
//!
//! Key pairs issued during a reconcile only exist in memory until this
//! component writes them out. The copy in the operator ("truth") namespace
//! is what the next reconcile reads back; the copy in the app namespace is
//! what pods mount.

use tigera_common::crd::ImageSet;
use tigera_common::pki::{KeyPair, TrustedBundle};
use tigera_common::Result;
use tracing::debug;

use crate::{Component, Manifest};

/// Where a key pair gets written
#[derive(Clone, Debug)]
pub struct KeyPairOption {
    /// The key pair
    pub key_pair: KeyPair,
    /// Write a copy into the app namespace
    pub render_in_app_namespace: bool,
    /// Write a copy into the truth namespace
    ///
    /// Ignored for user-provided key pairs, which are never overwritten.
    pub render_in_truth_namespace: bool,
}

impl KeyPairOption {
    /// Option for `key_pair` with the two placement flags
    pub fn new(key_pair: KeyPair, app: bool, truth: bool) -> Self {
        Self {
            key_pair,
            render_in_app_namespace: app,
            render_in_truth_namespace: truth,
        }
    }
}

/// Inputs of the certificate-management component
#[derive(Clone, Debug)]
pub struct CertificateManagementConfig {
    /// Namespace of the consuming component
    pub namespace: String,
    /// Operator namespace holding the source of truth
    pub truth_namespace: String,
    /// Key pairs to persist
    pub key_pairs: Vec<KeyPairOption>,
    /// Bundle rendered as a ConfigMap in the app namespace
    pub trusted_bundle: Option<TrustedBundle>,
}

/// Certificate-management component
pub struct CertificateManagementComponent {
    cfg: CertificateManagementConfig,
}

/// Create the certificate-management component
pub fn certificate_management(cfg: CertificateManagementConfig) -> CertificateManagementComponent {
    CertificateManagementComponent { cfg }
}

impl Component for CertificateManagementComponent {
    fn name(&self) -> &str {
        "certificate-management"
    }

    fn resolve_images(&mut self, _image_set: Option<&ImageSet>) -> Result<()> {
        Ok(())
    }

    fn objects(&self) -> Result<(Vec<Manifest>, Vec<Manifest>)> {
        let app_ns = self.cfg.namespace.as_str();
        let truth_ns = self.cfg.truth_namespace.as_str();
        let mut objs = Vec::new();

        for opt in &self.cfg.key_pairs {
            let kp = &opt.key_pair;
            if opt.render_in_app_namespace {
                objs.push(Manifest::from_resource(&kp.secret(app_ns))?);
            }
            let to_truth = opt.render_in_truth_namespace && !kp.byo;
            if to_truth && !(opt.render_in_app_namespace && app_ns == truth_ns) {
                objs.push(Manifest::from_resource(&kp.secret(truth_ns))?);
            }
            if opt.render_in_truth_namespace && kp.byo {
                debug!(secret = %kp.name, "not copying user-provided key pair to {truth_ns}");
            }
        }

        if let Some(bundle) = &self.cfg.trusted_bundle {
            objs.push(Manifest::from_resource(&bundle.config_map(app_ns))?);
        }
        Ok((objs, Vec::new()))
    }

    fn ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_pair(name: &str, byo: bool, key: bool) -> KeyPair {
        KeyPair {
            name: name.to_string(),
            namespace: "tigera-operator".to_string(),
            cert_pem: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n".to_string(),
            key_pem: key.then(|| "key".to_string()),
            byo,
        }
    }

    fn placements(cfg: CertificateManagementConfig) -> Vec<(String, String, String)> {
        certificate_management(cfg)
            .objects()
            .unwrap()
            .0
            .iter()
            .map(|m| {
                (
                    m.kind().to_string(),
                    m.name().to_string(),
                    m.namespace().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn byo_key_pairs_stay_out_of_truth_namespace() {
        let cfg = CertificateManagementConfig {
            namespace: "tigera-manager".to_string(),
            truth_namespace: "tigera-operator".to_string(),
            key_pairs: vec![
                KeyPairOption::new(key_pair("manager-tls", false, true), true, true),
                KeyPairOption::new(key_pair("byo-tls", true, true), true, true),
                KeyPairOption::new(key_pair("tigera-ca-private", false, true), false, true),
            ],
            trusted_bundle: None,
        };
        assert_eq!(
            placements(cfg),
            vec![
                ("Secret".into(), "manager-tls".into(), "tigera-manager".into()),
                ("Secret".into(), "manager-tls".into(), "tigera-operator".into()),
                ("Secret".into(), "byo-tls".into(), "tigera-manager".into()),
                ("Secret".into(), "tigera-ca-private".into(), "tigera-operator".into()),
            ]
        );
    }

    #[test]
    fn certificate_only_pairs_render_without_key() {
        let kp = key_pair("internal-manager-tls", false, false);
        let secret = kp.secret("tigera-manager");
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert!(!secret.data.unwrap().contains_key("tls.key"));
    }

    #[test]
    fn trusted_bundle_lands_in_app_namespace() {
        let bundle = TrustedBundle::new(&key_pair("tigera-ca-private", false, true));
        let cfg = CertificateManagementConfig {
            namespace: "tigera-manager".to_string(),
            truth_namespace: "tigera-operator".to_string(),
            key_pairs: Vec::new(),
            trusted_bundle: Some(bundle),
        };
        assert_eq!(
            placements(cfg),
            vec![(
                "ConfigMap".into(),
                "tigera-ca-bundle".into(),
                "tigera-manager".into()
            )]
        );
    }
}
