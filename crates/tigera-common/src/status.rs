//! TigeraStatus reporting
//!
//! A [`StatusManager`] collects what one reconcile pass learned about a
//! component (CR presence, degraded reason, workload readiness) and writes
//! it as Available/Progressing/Degraded conditions on the component's
//! TigeraStatus. Transition times of conditions whose status did not change
//! are kept from the previous write.

use async_trait::async_trait;
use chrono::Utc;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};

use crate::crd::{
    Condition, ConditionStatus, StatusReason, TigeraStatus, TigeraStatusSpec, TigeraStatusStatus,
};
use crate::kube_utils::is_not_found;
use crate::{metrics, Error, FIELD_MANAGER};

/// TigeraStatus condition types
pub const CONDITION_AVAILABLE: &str = "Available";
/// Progressing condition type
pub const CONDITION_PROGRESSING: &str = "Progressing";
/// Degraded condition type
pub const CONDITION_DEGRADED: &str = "Degraded";
/// Condition type used on operator CRs in place of `Available`
pub const CONDITION_READY: &str = "Ready";

/// Persistence of TigeraStatus objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Get a TigeraStatus, `None` when it does not exist
    async fn get_tigera_status(&self, name: &str) -> Result<Option<TigeraStatus>, Error>;

    /// Create or update a TigeraStatus together with its status
    async fn write_tigera_status(&self, status: &TigeraStatus) -> Result<(), Error>;

    /// Delete a TigeraStatus; missing objects are not an error
    async fn delete_tigera_status(&self, name: &str) -> Result<(), Error>;
}

#[async_trait]
impl StatusWriter for Client {
    async fn get_tigera_status(&self, name: &str) -> Result<Option<TigeraStatus>, Error> {
        let api: Api<TigeraStatus> = Api::all(self.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn write_tigera_status(&self, status: &TigeraStatus) -> Result<(), Error> {
        let name = status
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("status", "TigeraStatus has no name"))?;
        let api: Api<TigeraStatus> = Api::all(self.clone());
        let params = PatchParams::apply(FIELD_MANAGER).force();

        let object = serde_json::json!({
            "apiVersion": "operator.tigera.io/v1",
            "kind": "TigeraStatus",
            "metadata": { "name": name },
            "spec": {},
        });
        api.patch(name, &params, &Patch::Apply(&object)).await?;

        let patch = serde_json::json!({ "status": status.status });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn delete_tigera_status(&self, name: &str) -> Result<(), Error> {
        let api: Api<TigeraStatus> = Api::all(self.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Degraded {
    reason: StatusReason,
    message: String,
}

/// Status collected for one component during a reconcile pass
#[derive(Clone, Debug)]
pub struct StatusManager {
    name: String,
    cr_found: bool,
    degraded: Option<Degraded>,
    generation: Option<i64>,
    deployments: Vec<String>,
    daemonsets: Vec<String>,
    workloads_ready: bool,
}

impl StatusManager {
    /// Status for the TigeraStatus named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cr_found: false,
            degraded: None,
            generation: None,
            deployments: Vec::new(),
            daemonsets: Vec::new(),
            workloads_ready: false,
        }
    }

    /// Name of the TigeraStatus
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The component CR exists
    pub fn on_cr_found(&mut self) {
        self.cr_found = true;
    }

    /// The component CR is gone; the TigeraStatus is removed on flush
    pub fn on_cr_not_found(&mut self) {
        self.cr_found = false;
        self.degraded = None;
        self.deployments.clear();
        self.daemonsets.clear();
        self.workloads_ready = false;
    }

    /// Record the generation of the CR the conditions describe
    pub fn set_meta_data(&mut self, generation: Option<i64>) {
        self.generation = generation;
    }

    /// Mark the component degraded
    ///
    /// The error, when given, is appended to the message.
    pub fn set_degraded(
        &mut self,
        reason: StatusReason,
        message: impl Into<String>,
        error: Option<&Error>,
    ) {
        let mut message = message.into();
        if let Some(err) = error {
            message = if message.is_empty() {
                err.to_string()
            } else {
                format!("{message}: {err}")
            };
        }
        warn!(component = %self.name, %reason, %message, "component degraded");
        self.degraded = Some(Degraded { reason, message });
    }

    /// Clear a previously recorded degraded state
    pub fn clear_degraded(&mut self) {
        self.degraded = None;
    }

    /// Whether the component is degraded
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Workloads whose rollout determines availability
    pub fn track_workloads(&mut self, deployments: Vec<String>, daemonsets: Vec<String>) {
        self.deployments = deployments;
        self.daemonsets = daemonsets;
    }

    /// Names of tracked Deployments
    pub fn tracked_deployments(&self) -> &[String] {
        &self.deployments
    }

    /// Names of tracked DaemonSets
    pub fn tracked_daemonsets(&self) -> &[String] {
        &self.daemonsets
    }

    /// Record whether every tracked workload is rolled out
    pub fn set_workloads_ready(&mut self, ready: bool) {
        self.workloads_ready = ready;
    }

    /// CR present, not degraded and all workloads ready
    pub fn is_available(&self) -> bool {
        self.cr_found && self.degraded.is_none() && self.workloads_ready
    }

    /// Conditions describing the collected state, stamped with the current time
    pub fn conditions(&self) -> Vec<Condition> {
        let (degraded, progressing, available) = match &self.degraded {
            Some(d) => {
                let reason = d.reason.to_string();
                (
                    Condition::new(CONDITION_DEGRADED, ConditionStatus::True, &reason, &d.message),
                    Condition::new(CONDITION_PROGRESSING, ConditionStatus::False, &reason, ""),
                    Condition::new(CONDITION_AVAILABLE, ConditionStatus::False, &reason, &d.message),
                )
            }
            None if !self.workloads_ready => {
                let waiting = self.waiting_message();
                let reason = StatusReason::ResourceNotReady.to_string();
                (
                    Condition::new(CONDITION_DEGRADED, ConditionStatus::False, "", ""),
                    Condition::new(CONDITION_PROGRESSING, ConditionStatus::True, &reason, &waiting),
                    Condition::new(CONDITION_AVAILABLE, ConditionStatus::False, &reason, &waiting),
                )
            }
            None => (
                Condition::new(CONDITION_DEGRADED, ConditionStatus::False, "", ""),
                Condition::new(CONDITION_PROGRESSING, ConditionStatus::False, "", ""),
                Condition::new(
                    CONDITION_AVAILABLE,
                    ConditionStatus::True,
                    "AllObjectsAvailable",
                    "All objects are available",
                ),
            ),
        };

        vec![available, progressing, degraded]
            .into_iter()
            .map(|c| c.with_generation(self.generation))
            .collect()
    }

    fn waiting_message(&self) -> String {
        let pending: Vec<String> = self
            .deployments
            .iter()
            .map(|d| format!("Deployment {d}"))
            .chain(self.daemonsets.iter().map(|d| format!("DaemonSet {d}")))
            .collect();
        if pending.is_empty() {
            "Waiting for the component to be rendered".to_string()
        } else {
            format!("Waiting for {} to be available", pending.join(", "))
        }
    }

    /// Write the TigeraStatus, or delete it when the CR was not found
    pub async fn flush<W: StatusWriter + ?Sized>(&self, writer: &W) -> Result<(), Error> {
        metrics::record_degraded(
            &self.name,
            self.degraded.as_ref().map(|d| d.reason.to_string()).as_deref(),
        );

        if !self.cr_found {
            debug!(component = %self.name, "removing TigeraStatus");
            return writer.delete_tigera_status(&self.name).await;
        }

        let existing = writer.get_tigera_status(&self.name).await?;
        let previous = existing
            .as_ref()
            .and_then(|ts| ts.status.as_ref())
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        let conditions = merge_conditions(previous, self.conditions());

        if existing.is_some() && conditions_unchanged(previous, &conditions) {
            return Ok(());
        }

        let status = TigeraStatus {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            spec: TigeraStatusSpec {},
            status: Some(TigeraStatusStatus { conditions }),
        };
        writer.write_tigera_status(&status).await
    }
}

/// Keep the transition time of conditions whose status did not change
fn merge_conditions(previous: &[Condition], desired: Vec<Condition>) -> Vec<Condition> {
    desired
        .into_iter()
        .map(|mut c| {
            if let Some(old) = previous
                .iter()
                .find(|o| o.type_ == c.type_ && o.status == c.status)
            {
                c.last_transition_time = old.last_transition_time;
            }
            c
        })
        .collect()
}

fn conditions_unchanged(previous: &[Condition], current: &[Condition]) -> bool {
    previous.len() == current.len()
        && current.iter().all(|c| {
            previous
                .iter()
                .any(|p| p.same_state(c) && p.observed_generation == c.observed_generation)
        })
}

/// Convert TigeraStatus conditions into conditions for an operator CR status
///
/// `Available` becomes `Ready`; other types are kept. Entries whose status did
/// not change keep the transition time recorded in `existing`.
pub fn update_status_conditions(
    existing: &[Condition],
    tigera_conditions: &[Condition],
) -> Vec<Condition> {
    tigera_conditions
        .iter()
        .map(|tc| {
            let type_ = if tc.type_ == CONDITION_AVAILABLE {
                CONDITION_READY.to_string()
            } else {
                tc.type_.clone()
            };
            let reason = if tc.reason.is_empty() {
                StatusReason::Unknown.to_string()
            } else {
                tc.reason.clone()
            };
            let last_transition_time = existing
                .iter()
                .find(|e| e.type_ == type_ && e.status == tc.status)
                .map(|e| e.last_transition_time)
                .unwrap_or_else(Utc::now);

            Condition {
                type_,
                status: tc.status,
                reason,
                message: tc.message.clone(),
                last_transition_time,
                observed_generation: tc.observed_generation,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(conditions: &'a [Condition], type_: &str) -> &'a Condition {
        conditions
            .iter()
            .find(|c| c.type_ == type_)
            .expect("condition present")
    }

    // =========================================================================
    // Condition derivation
    // =========================================================================

    /// Story: a degraded manager reports the reason on Degraded and Available
    #[test]
    fn story_degraded_component_is_unavailable() {
        let mut status = StatusManager::new("manager");
        status.on_cr_found();
        status.set_workloads_ready(true);
        status.set_degraded(
            StatusReason::ResourceNotReady,
            "Waiting for Tigera API server to be ready",
            None,
        );

        let conditions = status.conditions();
        let degraded = find(&conditions, CONDITION_DEGRADED);
        assert_eq!(degraded.status, ConditionStatus::True);
        assert_eq!(degraded.reason, "ResourceNotReady");
        assert_eq!(degraded.message, "Waiting for Tigera API server to be ready");
        assert_eq!(
            find(&conditions, CONDITION_AVAILABLE).status,
            ConditionStatus::False
        );
        assert!(!status.is_available());
    }

    #[test]
    fn degraded_message_includes_error() {
        let mut status = StatusManager::new("manager");
        let err = Error::not_found("Installation", "default");
        status.set_degraded(
            StatusReason::ResourceReadError,
            "Error querying installation",
            Some(&err),
        );

        let conditions = status.conditions();
        assert_eq!(
            find(&conditions, CONDITION_DEGRADED).message,
            "Error querying installation: Installation default not found"
        );
    }

    /// Story: after rendering, the component progresses until workloads roll out
    #[test]
    fn story_progressing_until_workloads_ready() {
        let mut status = StatusManager::new("manager");
        status.on_cr_found();
        status.set_meta_data(Some(3));
        status.track_workloads(vec!["tigera-manager".to_string()], vec![]);

        let conditions = status.conditions();
        let progressing = find(&conditions, CONDITION_PROGRESSING);
        assert_eq!(progressing.status, ConditionStatus::True);
        assert_eq!(
            progressing.message,
            "Waiting for Deployment tigera-manager to be available"
        );
        assert_eq!(progressing.observed_generation, Some(3));

        status.set_workloads_ready(true);
        assert!(status.is_available());
        let conditions = status.conditions();
        assert_eq!(
            find(&conditions, CONDITION_AVAILABLE).status,
            ConditionStatus::True
        );
        assert_eq!(
            find(&conditions, CONDITION_PROGRESSING).status,
            ConditionStatus::False
        );
    }

    #[test]
    fn clear_degraded_restores_availability() {
        let mut status = StatusManager::new("manager");
        status.on_cr_found();
        status.set_workloads_ready(true);
        status.set_degraded(StatusReason::Unknown, "boom", None);
        status.clear_degraded();
        assert!(status.is_available());
    }

    // =========================================================================
    // Conversion to operator CR conditions
    // =========================================================================

    #[test]
    fn available_becomes_ready_and_reason_defaults() {
        let tigera = vec![
            Condition::new(CONDITION_AVAILABLE, ConditionStatus::True, "", "ok"),
            Condition::new(CONDITION_DEGRADED, ConditionStatus::False, "", ""),
        ];
        let converted = update_status_conditions(&[], &tigera);
        assert_eq!(converted[0].type_, CONDITION_READY);
        assert_eq!(converted[0].reason, "Unknown");
        assert_eq!(converted[1].type_, CONDITION_DEGRADED);
    }

    #[test]
    fn unchanged_status_keeps_transition_time() {
        let mut old = Condition::new(CONDITION_READY, ConditionStatus::True, "x", "");
        old.last_transition_time = Utc::now() - chrono::Duration::days(2);
        let tigera = vec![Condition::new(CONDITION_AVAILABLE, ConditionStatus::True, "x", "")];

        let converted = update_status_conditions(std::slice::from_ref(&old), &tigera);
        assert_eq!(converted[0].last_transition_time, old.last_transition_time);

        let flipped = vec![Condition::new(CONDITION_AVAILABLE, ConditionStatus::False, "x", "")];
        let converted = update_status_conditions(&[old.clone()], &flipped);
        assert_ne!(converted[0].last_transition_time, old.last_transition_time);
    }

    // =========================================================================
    // Flushing
    // =========================================================================

    #[tokio::test]
    async fn flush_deletes_when_cr_missing() {
        let mut writer = MockStatusWriter::new();
        writer
            .expect_delete_tigera_status()
            .withf(|name| name == "manager")
            .times(1)
            .returning(|_| Ok(()));
        writer.expect_write_tigera_status().never();

        let mut status = StatusManager::new("manager");
        status.on_cr_not_found();
        status.flush(&writer).await.unwrap();
    }

    #[tokio::test]
    async fn flush_writes_new_status() {
        let mut writer = MockStatusWriter::new();
        writer.expect_get_tigera_status().returning(|_| Ok(None));
        writer
            .expect_write_tigera_status()
            .withf(|ts| {
                ts.metadata.name.as_deref() == Some("manager")
                    && ts.status.as_ref().map(|s| s.conditions.len()) == Some(3)
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut status = StatusManager::new("manager");
        status.on_cr_found();
        status.flush(&writer).await.unwrap();
    }

    #[tokio::test]
    async fn flush_skips_identical_status() {
        let mut status = StatusManager::new("manager");
        status.on_cr_found();
        status.set_workloads_ready(true);
        let current = TigeraStatus {
            metadata: ObjectMeta {
                name: Some("manager".to_string()),
                ..Default::default()
            },
            spec: TigeraStatusSpec {},
            status: Some(TigeraStatusStatus {
                conditions: status.conditions(),
            }),
        };

        let mut writer = MockStatusWriter::new();
        writer
            .expect_get_tigera_status()
            .returning(move |_| Ok(Some(current.clone())));
        writer.expect_write_tigera_status().never();

        status.flush(&writer).await.unwrap();
    }
}
