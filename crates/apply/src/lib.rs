//! installplan-operator approval engine: resolve Subscription -> InstallPlan,
//! decide, and patch (or log the dry run).

#![forbid(unsafe_code)]

use std::sync::Arc;

use ipo_core::{current_install_plan, ClientError, Decision, InstallPlanSpec, OperatorConfig, ResourceKind, UpdateSpec};
use ipo_kubehub::ResourceClient;
use kube::core::DynamicObject;
use metrics::counter;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

pub struct Approver {
    client: Arc<dyn ResourceClient>,
    approve_updates: bool,
}

impl Approver {
    pub fn new(client: Arc<dyn ResourceClient>, config: &OperatorConfig) -> Self {
        Self { client, approve_updates: config.approve_updates }
    }

    /// Process a single update spec. `NotFound` is returned to the caller, which
    /// treats it as recoverable; every other error is fatal for the pass.
    pub async fn process_spec(&self, spec: &UpdateSpec) -> Result<Decision, ClientError> {
        info!(name = %spec.name, namespace = %spec.namespace, "processing subscription {} in namespace {}", spec.name, spec.namespace);

        let sub = self.client.get(ResourceKind::Subscription, &spec.name, &spec.namespace).await?;
        let plan_name = match current_install_plan(&sub.data) {
            Some(n) => n.to_string(),
            None => {
                warn!(name = %spec.name, "{}: subscription has no installplan yet", spec.name);
                return Ok(Decision::NoInstallPlan);
            }
        };
        debug!(name = %spec.name, plan = %plan_name, "{}: got installplan {}", spec.name, plan_name);

        let mut plan = self.client.get(ResourceKind::InstallPlan, &plan_name, &spec.namespace).await?;
        let state = InstallPlanSpec::from_object(&plan.data)
            .map_err(|e| ClientError::Api(format!("decoding installplan {}/{}: {}", spec.namespace, plan_name, e)))?;

        let have = state.candidate_version();
        if have != Some(spec.version.as_str()) {
            warn!(
                name = %spec.name,
                "{}: invalid version: have={}, want={}",
                spec.name,
                have.unwrap_or("<none>"),
                spec.version
            );
            return Ok(Decision::VersionMismatch { have: have.map(str::to_string), want: spec.version.clone() });
        }

        if state.approved {
            info!(name = %spec.name, "{}: version {} is already approved", spec.name, spec.version);
            return Ok(Decision::AlreadyApproved);
        }

        warn!(
            name = %spec.name,
            dry_run = !self.approve_updates,
            "{}: approve version {}{}",
            spec.name,
            spec.version,
            if self.approve_updates { "" } else { " (dry run)" }
        );
        if !self.approve_updates {
            counter!("ipo_installplans_dry_run_total", 1u64);
            return Ok(Decision::DryRun);
        }

        mark_approved(&mut plan);
        self.client.patch(ResourceKind::InstallPlan, &plan, &spec.namespace).await?;
        counter!("ipo_installplans_approved_total", 1u64);
        Ok(Decision::Approved)
    }
}

/// Set `spec.approved = true`, creating `spec` when absent.
fn mark_approved(plan: &mut DynamicObject) {
    if !plan.data.is_object() {
        plan.data = Json::Object(Default::default());
    }
    let spec = &mut plan.data["spec"];
    if !spec.is_object() {
        *spec = Json::Object(Default::default());
    }
    spec["approved"] = Json::Bool(true);
}
