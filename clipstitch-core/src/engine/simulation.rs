//! In-memory engine for deterministic tests.
//!
//! Records every invocation and synthesizes output files from its inputs so
//! pipeline tests can assert ordering and invocation counts without a real
//! codec backend.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use super::{EngineError, EngineResult, SandboxEngine};

/// Scriptable in-memory codec engine.
///
/// Output synthesis: the final argument is treated as the output name. For a
/// demuxer-concat command the manifest is parsed and the referenced files are
/// concatenated in manifest order; for any other command every `-i` input is
/// concatenated. This keeps clip ordering observable in the output bytes.
pub struct SimulationEngine {
    files: Mutex<HashMap<String, Bytes>>,
    invocations: Mutex<Vec<Vec<String>>>,
    /// Number of upcoming `execute` calls that fail.
    fail_next: Mutex<usize>,
    /// Produce zero-byte outputs while still reporting success.
    empty_output: bool,
}

impl SimulationEngine {
    /// Create a new simulation engine with an empty virtual filesystem.
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
            fail_next: Mutex::new(0),
            empty_output: false,
        }
    }

    /// Fail the next `count` execute calls with a command error.
    pub fn with_failures(self, count: usize) -> Self {
        *self.fail_next.lock() = count;
        self
    }

    /// Report success from every command but write zero-byte outputs.
    pub fn with_empty_output(mut self) -> Self {
        self.empty_output = true;
        self
    }

    /// Every argument list passed to `execute`, in call order.
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().clone()
    }

    /// Total number of `execute` calls observed.
    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().len()
    }

    fn input_names(args: &[String]) -> Vec<String> {
        let mut names = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "-i"
                && let Some(name) = iter.next()
            {
                names.push(name.clone());
            }
        }
        names
    }

    fn is_concat(args: &[String]) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == "-f" && pair[1] == "concat")
    }

    /// Manifest lines look like `file 'clip0.mp4'`.
    fn manifest_entries(manifest: &str) -> Vec<String> {
        manifest
            .lines()
            .filter_map(|line| line.strip_prefix("file '"))
            .filter_map(|rest| rest.strip_suffix('\''))
            .map(str::to_string)
            .collect()
    }

    fn read_or_fail(&self, name: &str) -> EngineResult<Bytes> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::CommandFailed {
                reason: format!("input file does not exist: {name}"),
            })
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxEngine for SimulationEngine {
    async fn execute(&self, args: &[String]) -> EngineResult<()> {
        self.invocations.lock().push(args.to_vec());

        {
            let mut fail_next = self.fail_next.lock();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(EngineError::CommandFailed {
                    reason: "simulated command failure".to_string(),
                });
            }
        }

        let output_name = args.last().ok_or_else(|| EngineError::CommandFailed {
            reason: "empty argument list".to_string(),
        })?;

        let sources = if Self::is_concat(args) {
            let manifest_name =
                Self::input_names(args)
                    .into_iter()
                    .next()
                    .ok_or_else(|| EngineError::CommandFailed {
                        reason: "concat command without manifest input".to_string(),
                    })?;
            let manifest = self.read_or_fail(&manifest_name)?;
            Self::manifest_entries(&String::from_utf8_lossy(&manifest))
        } else {
            Self::input_names(args)
        };

        let mut synthesized = BytesMut::new();
        for source in &sources {
            synthesized.extend_from_slice(&self.read_or_fail(source)?);
        }

        let data = if self.empty_output {
            Bytes::new()
        } else {
            synthesized.freeze()
        };
        self.files.lock().insert(output_name.clone(), data);
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

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_execute_synthesizes_output_from_inputs() {
        let engine = SimulationEngine::new();
        engine
            .write_file("in.mp4", Bytes::from_static(b"video"))
            .await
            .unwrap();
        engine
            .execute(&args(&["-i", "in.mp4", "out.mp4"]))
            .await
            .unwrap();
        assert_eq!(
            engine.read_file("out.mp4").await.unwrap(),
            Bytes::from_static(b"video")
        );
        assert_eq!(engine.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_concat_follows_manifest_order() {
        let engine = SimulationEngine::new();
        engine
            .write_file("b.mp4", Bytes::from_static(b"B"))
            .await
            .unwrap();
        engine
            .write_file("a.mp4", Bytes::from_static(b"A"))
            .await
            .unwrap();
        engine
            .write_file(
                "filelist.txt",
                Bytes::from_static(b"file 'b.mp4'\nfile 'a.mp4'"),
            )
            .await
            .unwrap();
        engine
            .execute(&args(&[
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                "filelist.txt",
                "out.mp4",
            ]))
            .await
            .unwrap();
        assert_eq!(
            engine.read_file("out.mp4").await.unwrap(),
            Bytes::from_static(b"BA")
        );
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let engine = SimulationEngine::new().with_failures(1);
        engine
            .write_file("in.mp4", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let first = engine.execute(&args(&["-i", "in.mp4", "out.mp4"])).await;
        assert!(matches!(first, Err(EngineError::CommandFailed { .. })));

        engine
            .execute(&args(&["-i", "in.mp4", "out.mp4"]))
            .await
            .unwrap();
        assert_eq!(engine.invocation_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_output_mode_reports_success() {
        let engine = SimulationEngine::new().with_empty_output();
        engine
            .write_file("in.mp4", Bytes::from_static(b"x"))
            .await
            .unwrap();
        engine
            .execute(&args(&["-i", "in.mp4", "out.mp4"]))
            .await
            .unwrap();
        assert!(engine.read_file("out.mp4").await.unwrap().is_empty());
    }
}
