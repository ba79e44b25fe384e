//! Production engine driving the system codec binary.

use std::collections::HashMap;
use std::io::ErrorKind;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::process::Command;

use super::{EngineError, EngineResult, SandboxEngine};
use crate::config::EngineConfig;

/// Codec engine backed by the system `ffmpeg` binary.
///
/// Virtual files live in memory; each `execute` materializes them into a
/// private scratch directory, runs the command there, and harvests every
/// file in the directory back into the virtual filesystem afterwards. The
/// scratch directory is removed even when the command fails.
pub struct SystemEngine {
    config: EngineConfig,
    /// Name-addressed virtual filesystem shared by all stages of a run.
    files: Mutex<HashMap<String, Bytes>>,
    /// Commands must never overlap against one engine instance.
    exec_lock: tokio::sync::Mutex<()>,
}

impl SystemEngine {
    /// Probes the codec backend and creates the engine.
    ///
    /// # Errors
    ///
    /// - `EngineError::EnvironmentUnsupported` - Binary absent from the environment
    /// - `EngineError::LoadFailed` - Binary present but the version probe failed
    pub async fn load(config: EngineConfig) -> EngineResult<Self> {
        let binary = binary_name(&config);
        tracing::info!("Loading codec engine: {}", binary.to_string_lossy());

        let probe = Command::new(&binary).arg("-version").output().await;
        match probe {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                return Err(EngineError::LoadFailed {
                    reason: format!("version probe exited with {}", output.status),
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::EnvironmentUnsupported {
                    reason: "codec binary not found in this environment".to_string(),
                });
            }
            Err(e) => {
                return Err(EngineError::LoadFailed {
                    reason: format!("version probe could not start: {e}"),
                });
            }
        }

        tracing::info!("Codec engine loaded");
        Ok(Self {
            config,
            files: Mutex::new(HashMap::new()),
            exec_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Snapshot of the virtual filesystem for materialization.
    fn snapshot(&self) -> Vec<(String, Bytes)> {
        self.files
            .lock()
            .iter()
            .map(|(name, data)| (name.clone(), data.clone()))
            .collect()
    }
}

fn binary_name(config: &EngineConfig) -> std::ffi::OsString {
    config
        .binary_path
        .as_deref()
        .map(|p| p.as_os_str().to_os_string())
        .unwrap_or_else(|| "ffmpeg".into())
}

fn io_error(operation: &str, source: std::io::Error) -> EngineError {
    EngineError::Io {
        operation: operation.to_string(),
        source,
    }
}

#[async_trait]
impl SandboxEngine for SystemEngine {
    async fn execute(&self, args: &[String]) -> EngineResult<()> {
        let _guard = self.exec_lock.lock().await;

        let scratch = tempfile::tempdir().map_err(|e| io_error("create scratch dir", e))?;
        for (name, data) in self.snapshot() {
            tokio::fs::write(scratch.path().join(&name), &data)
                .await
                .map_err(|e| io_error("materialize virtual file", e))?;
        }

        let mut cmd = Command::new(binary_name(&self.config));
        cmd.arg("-y").args(args).current_dir(scratch.path());
        tracing::debug!("Executing engine command: {:?}", args);

        let timeout = self.config.command_timeout;
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| EngineError::CommandTimeout {
                seconds: timeout.as_secs(),
            })?
            .map_err(|e| EngineError::CommandFailed {
                reason: format!("failed to start command: {e}"),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            tracing::error!("Engine command failed with {}: {}", output.status, stderr);
            return Err(EngineError::CommandFailed {
                reason: format!("exit status {}: {stderr}", output.status),
            });
        }
        if !stderr.is_empty() {
            tracing::debug!("Engine diagnostics: {}", stderr);
        }

        // Harvest everything back so outputs become virtual files.
        let mut entries = tokio::fs::read_dir(scratch.path())
            .await
            .map_err(|e| io_error("list scratch dir", e))?;
        let mut harvested = HashMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("list scratch dir", e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| io_error("stat scratch file", e))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let data = tokio::fs::read(entry.path())
                .await
                .map_err(|e| io_error("harvest scratch file", e))?;
            harvested.insert(name, Bytes::from(data));
        }
        self.files.lock().extend(harvested);

        Ok(())
    }

    async fn write_file(&self, name: &str, data: Bytes) -> EngineResult<()> {
        self.files.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> EngineResult<Bytes> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::FileNotFound {
                name: name.to_string(),
            })
    }

    async fn delete_file(&self, name: &str) -> EngineResult<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    async fn list_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_reports_missing_binary_as_unsupported() {
        let config = EngineConfig {
            binary_path: Some("definitely-not-a-real-codec-binary".into()),
            ..EngineConfig::default()
        };
        let result = SystemEngine::load(config).await;
        assert!(matches!(
            result,
            Err(EngineError::EnvironmentUnsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_virtual_filesystem_is_name_addressed() {
        // File operations do not need a loaded backend.
        let engine = SystemEngine {
            config: EngineConfig::default(),
            files: Mutex::new(HashMap::new()),
            exec_lock: tokio::sync::Mutex::new(()),
        };
        engine
            .write_file("a.mp4", Bytes::from_static(b"aa"))
            .await
            .unwrap();
        engine
            .write_file("b.mp4", Bytes::from_static(b"bb"))
            .await
            .unwrap();
        engine.delete_file("a.mp4").await.unwrap();
        assert_eq!(engine.list_files().await, vec!["b.mp4".to_string()]);
    }
}
