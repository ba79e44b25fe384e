//! Sandboxed codec engine abstraction for both production and simulation modes.
//!
//! The engine owns a private, name-addressed virtual filesystem and executes
//! one codec command at a time. The production implementation drives a real
//! codec binary; the simulation implementation is fully in-memory and
//! scriptable for deterministic tests.

pub mod simulation;
pub mod system;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::OnceCell;

pub use simulation::SimulationEngine;
pub use system::SystemEngine;

use crate::config::EngineConfig;

/// Errors that can occur while loading or driving the codec engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The environment lacks a capability the engine requires. Fatal and not
    /// retryable; surfaced before any load is attempted.
    #[error("Environment unsupported: {reason}")]
    EnvironmentUnsupported { reason: String },

    /// Engine initialization failed. Retryable by the caller; a failed load
    /// never poisons the shared instance cache.
    #[error("Engine load failed: {reason}")]
    LoadFailed { reason: String },

    /// A codec command completed with a non-zero status.
    #[error("Engine command failed: {reason}")]
    CommandFailed { reason: String },

    /// A codec command exceeded the configured wall-time limit.
    #[error("Engine command timed out after {seconds} seconds")]
    CommandTimeout { seconds: u64 },

    /// A virtual file was requested that does not exist.
    #[error("Virtual file not found: {name}")]
    FileNotFound { name: String },

    /// I/O against the engine's scratch storage failed.
    #[error("IO error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// One codec engine instance with a private virtual filesystem.
///
/// The virtual filesystem is shared mutable state across every stage of a
/// run, keyed by string name. Implementations must serialize `execute`
/// internally: overlapping commands against one instance are never allowed.
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Runs one codec command to completion.
    ///
    /// # Errors
    ///
    /// - `EngineError::CommandFailed` - Command exited with non-zero status
    /// - `EngineError::CommandTimeout` - Command exceeded the wall-time limit
    async fn execute(&self, args: &[String]) -> EngineResult<()>;

    /// Writes a named byte buffer into the virtual filesystem.
    async fn write_file(&self, name: &str, data: Bytes) -> EngineResult<()>;

    /// Reads a named byte buffer back out of the virtual filesystem.
    ///
    /// # Errors
    ///
    /// - `EngineError::FileNotFound` - No file with this name exists
    async fn read_file(&self, name: &str) -> EngineResult<Bytes>;

    /// Deletes a named file. Deleting a name that does not exist is not an
    /// error; cleanup after a partial failure must never throw.
    async fn delete_file(&self, name: &str) -> EngineResult<()>;

    /// Lists every file currently present in the virtual filesystem.
    /// Used by cleanup accounting and abandoned-run purging.
    async fn list_files(&self) -> Vec<String>;
}

/// Process-wide shared engine instance.
///
/// Loading the engine is slow, so it happens once per process. The cell
/// coalesces concurrent first calls onto a single in-flight load and stays
/// empty after a failed load so a later call can retry.
static SHARED_ENGINE: OnceCell<Arc<SystemEngine>> = OnceCell::const_new();

/// Returns the shared production engine, loading it on first use.
///
/// Concurrent callers before the first load completes await the same load;
/// there is no unload. The configuration only takes effect on the call that
/// performs the actual load.
///
/// # Errors
///
/// - `EngineError::EnvironmentUnsupported` - Codec backend absent
/// - `EngineError::LoadFailed` - Backend probe failed during initialization
pub async fn shared_engine(config: &EngineConfig) -> EngineResult<Arc<dyn SandboxEngine>> {
    let engine = SHARED_ENGINE
        .get_or_try_init(|| async {
            let engine = SystemEngine::load(config.clone()).await?;
            Ok::<_, EngineError>(Arc::new(engine))
        })
        .await?;
    Ok(Arc::clone(engine) as Arc<dyn SandboxEngine>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_missing_file_is_not_an_error() {
        tokio_test::block_on(async {
            let engine = SimulationEngine::new();
            engine.delete_file("never-created.mp4").await.unwrap();
        });
    }

    #[tokio::test]
    async fn test_read_missing_file_is_an_error() {
        let engine = SimulationEngine::new();
        let result = engine.read_file("never-created.mp4").await;
        assert!(matches!(result, Err(EngineError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let engine = SimulationEngine::new();
        engine
            .write_file("clip.mp4", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        let data = engine.read_file("clip.mp4").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"payload"));
        assert_eq!(engine.list_files().await, vec!["clip.mp4".to_string()]);
    }
}
