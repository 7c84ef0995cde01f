//! installplan-operator core types

#![forbid(unsafe_code)]

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// API group served by OLM for both resource kinds we touch.
pub const OLM_GROUP: &str = "operators.coreos.com";
pub const OLM_VERSION: &str = "v1alpha1";

/// The two cluster object kinds the operator reads or writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Subscription,
    InstallPlan,
}

impl ResourceKind {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::Subscription => "Subscription",
            ResourceKind::InstallPlan => "InstallPlan",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Subscription => "subscriptions",
            ResourceKind::InstallPlan => "installplans",
        }
    }

    /// `group/version/Kind` key.
    pub fn gvk_key(&self) -> String {
        format!("{}/{}/{}", OLM_GROUP, OLM_VERSION, self.kind())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// One declarative update request, loaded from a single YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateSpec {
    /// Subscription name.
    pub name: String,
    pub namespace: String,
    /// ClusterServiceVersion name that may be approved, e.g. `my-operator.v1.2.3`.
    pub version: String,
}

/// Errors surfaced by a resource client.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("api error: {0}")]
    Api(String),
}

/// Change observed on the Subscription watch stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceChange {
    Applied { namespace: Option<String>, name: String },
    Deleted { namespace: Option<String>, name: String },
    /// The watch relisted; `count` objects were returned.
    Restarted { count: usize },
}

impl fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn key(ns: &Option<String>, name: &str) -> String {
            match ns {
                Some(ns) => format!("{}/{}", ns, name),
                None => name.to_string(),
            }
        }
        match self {
            ResourceChange::Applied { namespace, name } => write!(f, "+ {}", key(namespace, name)),
            ResourceChange::Deleted { namespace, name } => write!(f, "- {}", key(namespace, name)),
            ResourceChange::Restarted { count } => write!(f, "restart ({} objects)", count),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FsChangeKind {
    Created,
    Modified,
    Removed,
}

/// Filesystem change observed in the spec directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsChange {
    pub kind: FsChangeKind,
    pub paths: Vec<PathBuf>,
}

/// Anything that can wake the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Fs(FsChange),
    Subscription(ResourceChange),
    /// Synthesized when no other trigger arrived within the max interval.
    Timeout,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Fs(_) => "fs",
            Trigger::Subscription(_) => "subscription",
            Trigger::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Fs(c) => write!(f, "fs {:?} {} path(s)", c.kind, c.paths.len()),
            Trigger::Subscription(c) => write!(f, "subscription {}", c),
            Trigger::Timeout => f.write_str("timeout"),
        }
    }
}

/// Terminal outcome of processing one update spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Plan was pending and has been patched to `approved: true`.
    Approved,
    /// Plan was pending but approve mode is off.
    DryRun,
    AlreadyApproved,
    VersionMismatch { have: Option<String>, want: String },
    /// The subscription does not reference an InstallPlan yet.
    NoInstallPlan,
}

/// The `spec` block of an InstallPlan, as far as approval is concerned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlanSpec {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub cluster_service_version_names: Vec<String>,
}

impl InstallPlanSpec {
    /// Decode from the body of an InstallPlan object. A missing `spec` reads as
    /// an unapproved plan without versions.
    pub fn from_object(data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        match data.get("spec") {
            Some(spec) => serde_json::from_value(spec.clone()),
            None => Ok(Self::default()),
        }
    }

    /// Version under consideration (first CSV name).
    pub fn candidate_version(&self) -> Option<&str> {
        self.cluster_service_version_names.first().map(String::as_str)
    }
}

/// `status.installPlanRef.name` of a Subscription body.
pub fn current_install_plan(data: &serde_json::Value) -> Option<&str> {
    data.get("status")
        .and_then(|s| s.get("installPlanRef"))
        .and_then(|r| r.get("name"))
        .and_then(|n| n.as_str())
}

/// Immutable runtime configuration shared by the controller and approver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Patch pending plans when true; only log the intent otherwise.
    pub approve_updates: bool,
    pub config_dir: PathBuf,
    /// Reconcile at least this often even without triggers.
    pub max_interval: Duration,
    /// Ignore triggers arriving sooner than this after the last pass.
    pub min_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            approve_updates: false,
            config_dir: PathBuf::from("/subscriptions"),
            max_interval: Duration::from_secs(900),
            min_interval: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn install_plan_spec_reads_camel_case() {
        let body = json!({
            "spec": {
                "approved": true,
                "clusterServiceVersionNames": ["a.v1", "b.v1"],
                "approval": "Manual"
            }
        });
        let spec = InstallPlanSpec::from_object(&body).expect("decode");
        assert!(spec.approved);
        assert_eq!(spec.candidate_version(), Some("a.v1"));
    }

    #[test]
    fn install_plan_spec_defaults_when_missing() {
        let spec = InstallPlanSpec::from_object(&json!({})).expect("decode");
        assert!(!spec.approved);
        assert_eq!(spec.candidate_version(), None);

        let partial = InstallPlanSpec::from_object(&json!({"spec": {"approved": true}})).expect("decode");
        assert!(partial.approved);
        assert!(partial.cluster_service_version_names.is_empty());
    }

    #[test]
    fn install_plan_spec_rejects_wrong_types() {
        assert!(InstallPlanSpec::from_object(&json!({"spec": {"approved": "yes"}})).is_err());
    }

    #[test]
    fn current_install_plan_follows_status_ref() {
        let sub = json!({"status": {"installPlanRef": {"name": "install-abc12"}}});
        assert_eq!(current_install_plan(&sub), Some("install-abc12"));
        assert_eq!(current_install_plan(&json!({"status": {}})), None);
        assert_eq!(current_install_plan(&json!({})), None);
    }

    #[test]
    fn trigger_labels() {
        let fs = Trigger::Fs(FsChange { kind: FsChangeKind::Modified, paths: vec![PathBuf::from("a.yaml")] });
        let sub = Trigger::Subscription(ResourceChange::Restarted { count: 3 });
        assert_eq!(fs.label(), "fs");
        assert_eq!(sub.label(), "subscription");
        assert_eq!(Trigger::Timeout.label(), "timeout");
        assert_eq!(sub.to_string(), "subscription restart (3 objects)");
    }

    #[test]
    fn resource_kind_keys() {
        assert_eq!(ResourceKind::Subscription.gvk_key(), "operators.coreos.com/v1alpha1/Subscription");
        assert_eq!(ResourceKind::InstallPlan.plural(), "installplans");
    }

    #[test]
    fn update_spec_requires_all_keys() {
        let ok: Result<UpdateSpec, _> =
            serde_json::from_value(json!({"name": "a", "namespace": "b", "version": "c"}));
        assert!(ok.is_ok());
        let missing: Result<UpdateSpec, _> = serde_json::from_value(json!({"name": "a", "namespace": "b"}));
        assert!(missing.is_err());
    }

    #[test]
    fn config_defaults() {
        let cfg = OperatorConfig::default();
        assert!(!cfg.approve_updates);
        assert_eq!(cfg.max_interval, Duration::from_secs(900));
        assert_eq!(cfg.min_interval, Duration::from_secs(10));
        assert_eq!(cfg.config_dir, PathBuf::from("/subscriptions"));
    }
}
