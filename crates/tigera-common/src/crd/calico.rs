//! projectcalico.org/v3 resources served by the aggregated API server
//!
//! Only the fields the operator reads or renders are modelled.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Policy tier
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "projectcalico.org", version = "v3", kind = "Tier")]
#[serde(rename_all = "camelCase")]
pub struct TierSpec {
    /// Evaluation order, lower first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
}

/// Product license
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "projectcalico.org",
    version = "v3",
    kind = "LicenseKey",
    status = "LicenseKeyStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct LicenseKeySpec {
    /// Signed license token
    #[serde(default)]
    pub token: String,

    /// Certificate used to verify the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

/// Decoded license information
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LicenseKeyStatus {
    /// Expiry of the license
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Maximum number of licensed nodes
    #[serde(default, rename = "maxnodes", skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<i64>,

    /// License package (e.g., "Enterprise")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Features unlocked by the license
    #[serde(default)]
    pub features: Vec<String>,
}

impl LicenseKey {
    /// Whether the license grants a feature
    ///
    /// The API server already drops features of expired licenses, so only
    /// the feature list is consulted.
    pub fn is_feature_active(&self, feature: &str) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.features.iter().any(|f| f == feature))
    }
}

/// Type of compliance report with its rendering templates
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "projectcalico.org", version = "v3", kind = "GlobalReportType")]
#[serde(rename_all = "camelCase")]
pub struct ReportTypeSpec {
    /// Template rendered into the summary shown by the manager UI
    pub ui_summary_template: ReportTemplate,

    /// Downloadable report files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub download_templates: Vec<ReportTemplate>,

    /// Audit events the report needs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_events_selection: Option<AuditEventsSelection>,

    /// Whether endpoint data is collected
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_endpoint_data: bool,

    /// Whether flow log data per endpoint is collected
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_endpoint_flow_log_data: bool,

    /// Whether CIS benchmark results are collected
    #[serde(
        default,
        rename = "includeCISBenchmarkData",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub include_cis_benchmark_data: bool,
}

/// Named Go text/template rendered by the reporter
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ReportTemplate {
    /// File name of the rendered output (e.g., "summary.csv")
    pub name: String,
    /// Template body, passed through unchanged
    pub template: String,
}

impl ReportTemplate {
    /// Create a template
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }
}

/// Audit events included in a report
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AuditEventsSelection {
    /// Resources whose audit events are selected
    #[serde(default)]
    pub resources: Vec<AuditResource>,
}

/// Resource filter for audit events
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditResource {
    /// Plural resource name (e.g., "networkpolicies")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource: String,

    /// API group of the resource
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_group: String,

    /// API version of the resource
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    /// Restrict to one object name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Restrict to one namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl AuditResource {
    /// Select all audit events for a resource type
    pub fn resource(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }
}
