//! Token validation settings derived from the Authentication resource
//!
//! Voltron and es-proxy validate bearer tokens issued either by the bundled
//! Dex or directly by an external OIDC provider. Both shapes end up as the
//! same set of `OIDC_AUTH_*` environment variables.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, EnvVar, Volume, VolumeMount,
};

use tigera_common::crd::{Authentication, OidcType};
use tigera_common::{Error, Result};

use crate::common::meta;

/// ConfigMap in the operator namespace with pre-fetched provider keys
pub const STATIC_JWKS_CONFIG_MAP: &str = "tigera-known-oidc-jwks";
/// Key of the JWKS document in [`STATIC_JWKS_CONFIG_MAP`]
pub const STATIC_JWKS_KEY: &str = "jwks";

/// OAuth client id the manager registers with
pub const MANAGER_CLIENT_ID: &str = "tigera-manager";

const DEX_NAMESPACE: &str = "tigera-dex";
const DEX_PORT: u16 = 5556;
const DEFAULT_USERNAME_CLAIM: &str = "email";
const DEFAULT_GROUPS_CLAIM: &str = "groups";
const JWKS_VOLUME: &str = "tigera-known-oidc-jwks";
const JWKS_MOUNT_DIR: &str = "/etc/tigera-known-oidc-jwks";

/// Who issues the tokens the components accept
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidatorKind {
    /// Bundled Dex, fronted by the manager domain
    Dex,
    /// External provider trusted directly
    Tigera,
}

/// Issuer, keys and claims used to validate tokens
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValidatorConfig {
    /// Issuer kind
    pub kind: ValidatorKind,
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected audience
    pub client_id: String,
    /// Where signing keys are fetched from; discovered from the issuer when unset
    pub jwks_url: Option<String>,
    /// Claim carrying the user name
    pub username_claim: String,
    /// Claim carrying the groups
    pub groups_claim: String,
    /// Prefix added to user names
    pub username_prefix: Option<String>,
    /// Prefix added to group names
    pub groups_prefix: Option<String>,
    /// Pre-fetched JWKS document, used instead of fetching keys at runtime
    pub static_jwks: Option<String>,
}

impl KeyValidatorConfig {
    /// Build the config from an Authentication resource
    ///
    /// Returns `None` without an Authentication resource. `static_jwks` is
    /// the known-JWKS ConfigMap and only applies to external providers.
    pub fn from_authentication(
        auth: Option<&Authentication>,
        static_jwks: Option<&ConfigMap>,
        cluster_domain: &str,
    ) -> Result<Option<Self>> {
        let Some(auth) = auth else {
            return Ok(None);
        };
        let resource = format!(
            "Authentication/{}",
            auth.metadata.name.as_deref().unwrap_or_default()
        );
        let spec = &auth.spec;

        let domain = spec
            .manager_domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::validation_for(&resource, "managerDomain is required"))?;
        if !domain.starts_with("https://") {
            return Err(Error::validation_for(
                &resource,
                format!("managerDomain {domain:?} must start with https://"),
            ));
        }
        let domain = domain.trim_end_matches('/');

        let oidc = spec.oidc.as_ref();
        let username_claim = oidc
            .and_then(|o| o.username_claim.clone())
            .unwrap_or_else(|| DEFAULT_USERNAME_CLAIM.to_string());
        let groups_claim = oidc
            .and_then(|o| o.groups_claim.clone())
            .unwrap_or_else(|| DEFAULT_GROUPS_CLAIM.to_string());

        let config = match oidc {
            Some(o) if o.type_ == OidcType::Tigera => {
                if o.issuer_url.is_empty() {
                    return Err(Error::validation_for(
                        &resource,
                        "oidc.issuerURL is required for type Tigera",
                    ));
                }
                let static_jwks = static_jwks
                    .and_then(|cm| cm.data.as_ref())
                    .and_then(|d| d.get(STATIC_JWKS_KEY))
                    .cloned();
                Self {
                    kind: ValidatorKind::Tigera,
                    issuer: o.issuer_url.clone(),
                    client_id: MANAGER_CLIENT_ID.to_string(),
                    jwks_url: None,
                    username_claim,
                    groups_claim,
                    username_prefix: spec.username_prefix.clone(),
                    groups_prefix: spec.groups_prefix.clone(),
                    static_jwks,
                }
            }
            _ => Self {
                kind: ValidatorKind::Dex,
                issuer: format!("{domain}/dex"),
                client_id: MANAGER_CLIENT_ID.to_string(),
                jwks_url: Some(format!(
                    "https://tigera-dex.{DEX_NAMESPACE}.svc.{cluster_domain}:{DEX_PORT}/dex/keys"
                )),
                username_claim,
                groups_claim,
                username_prefix: spec.username_prefix.clone(),
                groups_prefix: spec.groups_prefix.clone(),
                static_jwks: None,
            },
        };
        Ok(Some(config))
    }

    /// `<prefix>OIDC_AUTH_*` variables for a container
    pub fn required_env(&self, prefix: &str) -> Vec<EnvVar> {
        let var = |name: &str, value: &str| EnvVar {
            name: format!("{prefix}{name}"),
            value: Some(value.to_string()),
            ..Default::default()
        };
        let mut vars = vec![
            var("OIDC_AUTH_ENABLED", "true"),
            var("OIDC_AUTH_ISSUER", &self.issuer),
            var("OIDC_AUTH_CLIENT_ID", &self.client_id),
            var("OIDC_AUTH_USERNAME_CLAIM", &self.username_claim),
            var("OIDC_AUTH_GROUPS_CLAIM", &self.groups_claim),
        ];
        if let Some(url) = &self.jwks_url {
            vars.push(var("OIDC_AUTH_JWKSURL", url));
        }
        if self.static_jwks.is_some() {
            vars.push(var(
                "OIDC_AUTH_JWKSURL",
                &format!("file://{JWKS_MOUNT_DIR}/{STATIC_JWKS_KEY}"),
            ));
        }
        if let Some(p) = &self.username_prefix {
            vars.push(var("OIDC_AUTH_USERNAME_PREFIX", p));
        }
        if let Some(p) = &self.groups_prefix {
            vars.push(var("OIDC_AUTH_GROUPS_PREFIX", p));
        }
        vars
    }

    /// ConfigMaps the validating components need in `namespace`
    pub fn required_config_maps(&self, namespace: &str) -> Vec<ConfigMap> {
        self.static_jwks
            .iter()
            .map(|jwks| ConfigMap {
                metadata: meta(STATIC_JWKS_CONFIG_MAP, Some(namespace)),
                data: Some(BTreeMap::from([(
                    STATIC_JWKS_KEY.to_string(),
                    jwks.clone(),
                )])),
                ..Default::default()
            })
            .collect()
    }

    /// Volumes backing [`KeyValidatorConfig::required_volume_mounts`]
    pub fn required_volumes(&self) -> Vec<Volume> {
        if self.static_jwks.is_none() {
            return Vec::new();
        }
        vec![Volume {
            name: JWKS_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: STATIC_JWKS_CONFIG_MAP.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }]
    }

    /// Mounts for the static JWKS document, if any
    pub fn required_volume_mounts(&self) -> Vec<VolumeMount> {
        if self.static_jwks.is_none() {
            return Vec::new();
        }
        vec![VolumeMount {
            name: JWKS_VOLUME.to_string(),
            mount_path: JWKS_MOUNT_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]
    }
}
