//! installplan-operator controller: event sources, trigger aggregation and the
//! debounced reconciliation loop.
//!
//! ```text
//! [fs watcher] ----\
//!                   +--> EventQueue --> Reconciler --> Approver --> ResourceClient
//! [sub watcher] ---/     (timeout)      (gate)
//! ```

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use ipo_core::{ClientError, OperatorConfig};
use ipo_kubehub::ResourceClient;
use ipo_store::DirUnavailable;
use tracing::info;

pub mod gate;
pub mod queue;
pub mod reconciler;
pub mod sources;

pub use gate::{Admission, DebounceGate};
pub use queue::{EventQueue, TriggerSender};
pub use reconciler::{PassSummary, Reconciler};

/// Conditions that end the operator. Each has its own message and exit code.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("authorization failed: {0}")]
    Unauthorized(String),
    #[error("unexpected api error: {0}")]
    Api(String),
    #[error("unable to open config directory {}: {reason}", path.display())]
    SpecDir { path: PathBuf, reason: String },
}

impl OperatorError {
    pub fn exit_code(&self) -> u8 {
        match self {
            OperatorError::Unauthorized(_) => 3,
            OperatorError::Api(_) => 4,
            OperatorError::SpecDir { .. } => 5,
        }
    }
}

impl From<ClientError> for OperatorError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Unauthorized(msg) => OperatorError::Unauthorized(msg),
            ClientError::Api(msg) => OperatorError::Api(msg),
            // Only reaches here when a caller chose not to recover from it
            ClientError::NotFound(msg) => OperatorError::Api(format!("not found: {}", msg)),
        }
    }
}

impl From<DirUnavailable> for OperatorError {
    fn from(e: DirUnavailable) -> Self {
        OperatorError::SpecDir { path: e.path, reason: e.source.to_string() }
    }
}

/// Start both event sources and run the reconciliation loop until a fatal
/// error. There is no shutdown path; the process exits around it.
pub async fn run(config: &OperatorConfig, client: Arc<dyn ResourceClient>) -> Result<(), OperatorError> {
    info!(
        config_dir = %config.config_dir.display(),
        approve_updates = config.approve_updates,
        max_interval = ?config.max_interval,
        min_interval = ?config.min_interval,
        "starting installplan operator"
    );
    let mut queue = EventQueue::new(config.max_interval);
    sources::spawn_fs_watcher(&config.config_dir, queue.sender())?;
    sources::spawn_subscription_watcher(Arc::clone(&client), queue.sender());

    let mut reconciler = Reconciler::new(config, client);
    reconciler.run(&mut queue).await
}
