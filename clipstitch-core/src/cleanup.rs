//! Guaranteed cleanup of virtual-filesystem artifacts.
//!
//! The engine's virtual filesystem is shared process-wide state that grows
//! without bound if runs leak files. Every stage registers the names it
//! creates in a [`ScratchSet`] and cleanup runs on both the success and every
//! failure path. Deletion errors are logged and swallowed so a cleanup
//! failure never masks the operational error that preceded it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::SandboxEngine;

/// Records every virtual file a run creates and deletes them on demand.
pub struct ScratchSet {
    engine: Arc<dyn SandboxEngine>,
    names: Mutex<Vec<String>>,
}

impl ScratchSet {
    pub fn new(engine: Arc<dyn SandboxEngine>) -> Self {
        Self {
            engine,
            names: Mutex::new(Vec::new()),
        }
    }

    /// Registers a name for later deletion, returning it for chaining.
    pub fn track(&self, name: impl Into<String>) -> String {
        let name = name.into();
        self.names.lock().push(name.clone());
        name
    }

    /// Drops a name from the set after its file was already deleted inline.
    pub fn untrack(&self, name: &str) {
        self.names.lock().retain(|n| n != name);
    }

    /// Number of names currently tracked.
    pub fn tracked(&self) -> usize {
        self.names.lock().len()
    }

    /// Best-effort deletion of every tracked file. Never fails; per-file
    /// errors are logged at warn level and swallowed.
    pub async fn cleanup(&self) {
        let names: Vec<String> = std::mem::take(&mut *self.names.lock());
        for name in names {
            if let Err(e) = self.engine.delete_file(&name).await {
                tracing::warn!("Cleanup of {} failed (ignored): {}", name, e);
            }
        }
    }
}

/// Deletes every virtual file carrying the given run prefix.
///
/// Escape hatch for callers that abandon a run on their own deadline: the
/// engine cannot interrupt a command mid-flight, but its leftovers can still
/// be purged once the command settles.
pub async fn purge_run_files(engine: &Arc<dyn SandboxEngine>, run_prefix: &str) {
    for name in engine.list_files().await {
        if name.starts_with(run_prefix)
            && let Err(e) = engine.delete_file(&name).await
        {
            tracing::warn!("Purge of {} failed (ignored): {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::engine::SimulationEngine;

    #[tokio::test]
    async fn test_cleanup_deletes_every_tracked_file() {
        let engine: Arc<dyn SandboxEngine> = Arc::new(SimulationEngine::new());
        let scratch = ScratchSet::new(Arc::clone(&engine));

        for name in ["a.mp4", "b.mp4", "filelist.txt"] {
            engine
                .write_file(name, Bytes::from_static(b"x"))
                .await
                .unwrap();
            scratch.track(name);
        }
        scratch.cleanup().await;

        assert!(engine.list_files().await.is_empty());
        assert_eq!(scratch.tracked(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_already_deleted_files() {
        let engine: Arc<dyn SandboxEngine> = Arc::new(SimulationEngine::new());
        let scratch = ScratchSet::new(Arc::clone(&engine));
        scratch.track("gone.mp4");
        // Must not panic or error even though the file never existed.
        scratch.cleanup().await;
    }

    #[tokio::test]
    async fn test_untrack_skips_inline_deleted_files() {
        let engine: Arc<dyn SandboxEngine> = Arc::new(SimulationEngine::new());
        let scratch = ScratchSet::new(Arc::clone(&engine));
        scratch.track("input0.mp4");
        scratch.track("clip0.mp4");
        scratch.untrack("input0.mp4");
        assert_eq!(scratch.tracked(), 1);
    }

    #[tokio::test]
    async fn test_purge_only_touches_the_given_run() {
        let engine: Arc<dyn SandboxEngine> = Arc::new(SimulationEngine::new());
        engine
            .write_file("run-a-clip0.mp4", Bytes::from_static(b"x"))
            .await
            .unwrap();
        engine
            .write_file("run-b-clip0.mp4", Bytes::from_static(b"y"))
            .await
            .unwrap();

        purge_run_files(&engine, "run-a-").await;

        assert_eq!(
            engine.list_files().await,
            vec!["run-b-clip0.mp4".to_string()]
        );
    }
}
