//! Single-consumer reconciliation loop.

use std::sync::Arc;
use std::time::Duration;

use ipo_apply::Approver;
use ipo_core::{ClientError, Decision, OperatorConfig, Trigger};
use ipo_kubehub::ResourceClient;
use ipo_store::SpecStore;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::gate::{Admission, DebounceGate};
use crate::queue::EventQueue;
use crate::OperatorError;

/// Outcome counters of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Spec files discovered.
    pub specs: usize,
    pub approved: usize,
    pub dry_run: usize,
    pub already_approved: usize,
    pub mismatched: usize,
    /// Specs skipped: unreadable file, missing objects, or no plan yet.
    pub skipped: usize,
    pub elapsed: Duration,
}

impl PassSummary {
    fn record(&mut self, decision: &Decision) {
        match decision {
            Decision::Approved => self.approved += 1,
            Decision::DryRun => self.dry_run += 1,
            Decision::AlreadyApproved => self.already_approved += 1,
            Decision::VersionMismatch { .. } => self.mismatched += 1,
            Decision::NoInstallPlan => self.skipped += 1,
        }
    }
}

pub struct Reconciler {
    store: SpecStore,
    approver: Approver,
    gate: DebounceGate,
}

impl Reconciler {
    pub fn new(config: &OperatorConfig, client: Arc<dyn ResourceClient>) -> Self {
        Self {
            store: SpecStore::new(&config.config_dir),
            approver: Approver::new(client, config),
            gate: DebounceGate::new(config.min_interval),
        }
    }

    /// Consume triggers forever. Returns only on a fatal error.
    pub async fn run(&mut self, queue: &mut EventQueue) -> Result<(), OperatorError> {
        loop {
            let trigger = queue.next().await;
            self.on_trigger(&trigger).await?;
        }
    }

    /// Apply the debounce gate; on admission run a full pass.
    pub async fn on_trigger(&mut self, trigger: &Trigger) -> Result<Option<PassSummary>, OperatorError> {
        match self.gate.admit(Instant::now()) {
            Admission::TooSoon { elapsed } => {
                debug!(trigger = trigger.label(), ?elapsed, "ignoring {} event (too soon)", trigger.label());
                counter!("ipo_triggers_ignored_total", 1u64, "trigger" => trigger.label());
                Ok(None)
            }
            Admission::Admitted => {
                info!(trigger = %trigger, "subscription check triggered by {} event", trigger.label());
                let summary = self.run_pass().await?;
                info!(
                    specs = summary.specs,
                    approved = summary.approved,
                    dry_run = summary.dry_run,
                    skipped = summary.skipped,
                    "finished subscription check; {} subscriptions in {:?}",
                    summary.specs,
                    summary.elapsed
                );
                Ok(Some(summary))
            }
        }
    }

    /// One scan of every update spec. Per-spec lookups that find nothing and
    /// unreadable spec files are skipped; anything else aborts the pass.
    pub async fn run_pass(&self) -> Result<PassSummary, OperatorError> {
        let started = Instant::now();
        counter!("ipo_reconcile_passes_total", 1u64);
        let paths = self.store.discover()?;
        let mut summary = PassSummary { specs: paths.len(), ..Default::default() };

        for path in &paths {
            let spec = match self.store.load(path) {
                Ok(spec) => spec,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "skipping update spec");
                    summary.skipped += 1;
                    continue;
                }
            };
            match self.approver.process_spec(&spec).await {
                Ok(decision) => summary.record(&decision),
                Err(ClientError::NotFound(msg)) => {
                    error!(name = %spec.name, namespace = %spec.namespace, "unable to find requested resource: {}", msg);
                    summary.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        summary.elapsed = started.elapsed();
        histogram!("ipo_reconcile_pass_ms", summary.elapsed.as_secs_f64() * 1000.0);
        Ok(summary)
    }
}
