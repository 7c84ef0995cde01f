//! Event sources feeding the trigger queue. Both run for the process lifetime
//! and never read from the queue.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use ipo_core::{FsChange, FsChangeKind, ResourceKind, Trigger};
use ipo_kubehub::ResourceClient;
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::TriggerSender;
use crate::OperatorError;

fn fs_change_from(ev: notify::Event) -> Option<FsChange> {
    let kind = match ev.kind {
        EventKind::Create(_) => FsChangeKind::Created,
        EventKind::Modify(_) => FsChangeKind::Modified,
        EventKind::Remove(_) => FsChangeKind::Removed,
        _ => return None,
    };
    Some(FsChange { kind, paths: ev.paths })
}

/// Watch `dir` (top level only) and push an `fs` trigger per change.
pub fn spawn_fs_watcher(dir: &Path, tx: TriggerSender) -> Result<JoinHandle<()>, OperatorError> {
    let unavailable = |e: notify::Error| OperatorError::SpecDir { path: dir.to_path_buf(), reason: e.to_string() };
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(ev) => {
            if let Some(change) = fs_change_from(ev) {
                debug!(kind = ?change.kind, paths = ?change.paths, "fs change");
                let _ = tx.send(Trigger::Fs(change));
            }
        }
        Err(e) => warn!(error = %e, "fs watcher error"),
    })
    .map_err(unavailable)?;
    watcher.watch(dir, RecursiveMode::NonRecursive).map_err(unavailable)?;
    info!(dir = %dir.display(), "fs watcher started");

    // The watcher stops when dropped; park it in a task.
    Ok(tokio::spawn(async move {
        let _watcher = watcher;
        std::future::pending::<()>().await;
    }))
}

/// Forward every Subscription watch event as a `subscription` trigger. The
/// task stops for good when the stream ends or fails.
pub fn spawn_subscription_watcher(client: Arc<dyn ResourceClient>, tx: TriggerSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = client.watch(ResourceKind::Subscription);
        while let Some(item) = stream.next().await {
            match item {
                Ok(change) => {
                    debug!(change = %change, "subscription change");
                    if tx.send(Trigger::Subscription(change)).is_err() {
                        debug!("trigger queue closed; stopping subscription watcher");
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "subscription watch failed; no further subscription triggers");
                    return;
                }
            }
        }
        warn!("subscription watch stream ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};
    use std::path::PathBuf;

    #[test]
    fn maps_notify_kinds() {
        let ev = |kind| notify::Event::new(kind).add_path(PathBuf::from("/subscriptions/a.yaml"));
        assert_eq!(fs_change_from(ev(EventKind::Create(CreateKind::File))).map(|c| c.kind), Some(FsChangeKind::Created));
        assert_eq!(fs_change_from(ev(EventKind::Modify(ModifyKind::Any))).map(|c| c.kind), Some(FsChangeKind::Modified));
        assert_eq!(fs_change_from(ev(EventKind::Remove(RemoveKind::File))).map(|c| c.kind), Some(FsChangeKind::Removed));
        assert_eq!(fs_change_from(ev(EventKind::Access(AccessKind::Any))), None);

        let change = fs_change_from(ev(EventKind::Create(CreateKind::File))).expect("change");
        assert_eq!(change.paths, vec![PathBuf::from("/subscriptions/a.yaml")]);
    }
}
