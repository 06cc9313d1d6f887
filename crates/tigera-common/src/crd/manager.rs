//! Manager CRD: the web console of the security platform
//!
//! The operator supports a single instance named `tigera-secure`. Most
//! configuration comes from other resources (Installation, Authentication,
//! ManagementCluster); the Manager spec itself only carries the legacy
//! authentication block, which is restricted to `Token`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, TigeraStatusState};
use crate::Error;

/// Configuration of the manager web console.
///
/// Example:
/// ```yaml
/// apiVersion: operator.tigera.io/v1
/// kind: Manager
/// metadata:
///   name: tigera-secure
/// spec: {}
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.tigera.io",
    version = "v1",
    kind = "Manager",
    status = "ManagerStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSpec {
    /// Deprecated: authentication is configured through the Authentication CR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
}

/// Legacy manager authentication settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    /// How users authenticate to the manager
    #[serde(rename = "type", default)]
    pub type_: AuthType,

    /// OIDC authority (only meaningful for the removed OIDC type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,

    /// OIDC client id (only meaningful for the removed OIDC type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Legacy authentication types
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AuthType {
    /// Service account token login
    #[default]
    Token,
    /// Basic auth
    Basic,
    /// OpenID Connect
    #[serde(rename = "OIDC")]
    Oidc,
    /// OAuth
    OAuth,
}

/// Observed state of the Manager
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    /// Overall state of the manager deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TigeraStatusState>,

    /// Conditions mirrored from the `manager` TigeraStatus
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ManagerStatus {
    /// Set the state
    pub fn state(mut self, state: TigeraStatusState) -> Self {
        self.state = Some(state);
        self
    }

    /// Replace the conditions
    pub fn conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }
}

impl ManagerSpec {
    /// Reject configurations that moved to the Authentication CR
    pub fn validate(&self) -> Result<(), Error> {
        match &self.auth {
            Some(auth) if auth.type_ != AuthType::Token => Err(Error::validation_for(
                "Manager/tigera-secure",
                "auth types other than 'Token' can no longer be configured using the Manager CR, \
                 please use the Authentication CR instead",
            )),
            _ => Ok(()),
        }
    }
}
