//! Ordered concatenation of normalized clips.
//!
//! The manifest lists clips in the exact caller-supplied order; nothing is
//! reordered or deduplicated. The concat command re-encodes rather than
//! stream-copies: normalized clips can still disagree on internal timing
//! parameters across sources, and a silently corrupted stream-copy output is
//! worse than the extra encode cost.

use std::sync::Arc;

use bytes::Bytes;

use crate::cleanup::ScratchSet;
use crate::config::EncodeConfig;
use crate::engine::SandboxEngine;
use crate::{AssemblyError, Result};

/// Renders the demuxer-concat manifest: one `file '<name>'` line per clip.
pub fn build_manifest(clips: &[String]) -> String {
    clips
        .iter()
        .map(|name| format!("file '{name}'"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the demuxer-concat argument list. Always a re-encode.
pub fn concat_args(manifest: &str, output: &str, encode: &EncodeConfig) -> Vec<String> {
    vec![
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        manifest.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        encode.preset.to_string(),
        "-crf".to_string(),
        encode.crf.to_string(),
        "-pix_fmt".to_string(),
        encode.pixel_format.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.to_string(),
    ]
}

/// Concatenates normalized clips into one continuous video.
///
/// Returns the combined video read back into memory. The manifest, the
/// per-clip inputs, and the engine output are all deleted before this
/// function returns, on success and on failure.
///
/// # Errors
///
/// - `AssemblyError::NoClips` - Empty clip list; fails before any engine call
/// - `AssemblyError::ConcatenationFailed` - Manifest or concat command failure
/// - `AssemblyError::OutputEmpty` - Engine reported success but wrote zero bytes
pub async fn concatenate(
    engine: &Arc<dyn SandboxEngine>,
    scratch: &ScratchSet,
    clips: &[String],
    run_prefix: &str,
    encode: &EncodeConfig,
) -> Result<Bytes> {
    if clips.is_empty() {
        return Err(AssemblyError::NoClips);
    }

    let manifest_name = scratch.track(format!("{run_prefix}filelist.txt"));
    let output = scratch.track(format!("{run_prefix}output.mp4"));
    tracing::info!("Concatenating {} clips -> {}", clips.len(), output);

    let outcome = run_concat(engine, clips, &manifest_name, &output, encode).await;

    // Stage-scoped release: every file this stage knows about goes away now,
    // whatever the outcome was.
    for name in clips.iter().chain([&manifest_name, &output]) {
        if let Err(e) = engine.delete_file(name).await {
            tracing::warn!("Cleanup of {} failed (ignored): {}", name, e);
        }
        scratch.untrack(name);
    }

    outcome
}

async fn run_concat(
    engine: &Arc<dyn SandboxEngine>,
    clips: &[String],
    manifest_name: &str,
    output: &str,
    encode: &EncodeConfig,
) -> Result<Bytes> {
    let manifest = build_manifest(clips);
    tracing::debug!("Concat manifest:\n{}", manifest);

    engine
        .write_file(manifest_name, Bytes::from(manifest))
        .await
        .map_err(|e| AssemblyError::ConcatenationFailed { source: e })?;

    engine
        .execute(&concat_args(manifest_name, output, encode))
        .await
        .map_err(|e| AssemblyError::ConcatenationFailed { source: e })?;

    let combined = engine
        .read_file(output)
        .await
        .map_err(|e| AssemblyError::ConcatenationFailed { source: e })?;
    if combined.is_empty() {
        return Err(AssemblyError::OutputEmpty {
            output: output.to_string(),
        });
    }

    tracing::info!("Concatenation produced {} bytes", combined.len());
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulationEngine;

    async fn seed_clips(engine: &Arc<dyn SandboxEngine>, names: &[(&str, &[u8])]) -> Vec<String> {
        let mut out = Vec::new();
        for (name, data) in names {
            engine
                .write_file(name, Bytes::copy_from_slice(data))
                .await
                .unwrap();
            out.push(name.to_string());
        }
        out
    }

    #[test]
    fn test_manifest_preserves_caller_order() {
        let clips = vec!["clip2.mp4".to_string(), "clip0.mp4".to_string()];
        assert_eq!(build_manifest(&clips), "file 'clip2.mp4'\nfile 'clip0.mp4'");
    }

    #[test]
    fn test_concat_args_re_encode_never_stream_copy() {
        let args = concat_args("filelist.txt", "output.mp4", &EncodeConfig::default());
        assert!(args.contains(&"libx264".to_string()));
        assert!(!args.contains(&"copy".to_string()));
    }

    #[tokio::test]
    async fn test_empty_clip_list_fails_before_any_engine_call() {
        let engine = Arc::new(SimulationEngine::new());
        let dyn_engine: Arc<dyn SandboxEngine> = engine.clone();
        let scratch = ScratchSet::new(Arc::clone(&dyn_engine));

        let result = concatenate(&dyn_engine, &scratch, &[], "run-", &EncodeConfig::default()).await;

        assert!(matches!(result, Err(AssemblyError::NoClips)));
        assert_eq!(engine.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_output_preserves_input_order() {
        let engine = Arc::new(SimulationEngine::new());
        let dyn_engine: Arc<dyn SandboxEngine> = engine.clone();
        let scratch = ScratchSet::new(Arc::clone(&dyn_engine));
        let clips = seed_clips(
            &dyn_engine,
            &[
                ("c0.mp4", &b"AAA"[..]),
                ("c1.mp4", &b"BB"[..]),
                ("c2.mp4", &b"C"[..]),
            ],
        )
        .await;

        let combined = concatenate(&dyn_engine, &scratch, &clips, "run-", &EncodeConfig::default())
            .await
            .unwrap();

        // The simulation engine concatenates manifest entries in order, so
        // byte layout is the order probe.
        assert_eq!(combined, Bytes::from_static(b"AAABBC"));
    }

    #[tokio::test]
    async fn test_all_stage_files_are_deleted_on_success() {
        let engine: Arc<dyn SandboxEngine> = Arc::new(SimulationEngine::new());
        let scratch = ScratchSet::new(Arc::clone(&engine));
        let clips = seed_clips(&engine, &[("c0.mp4", &b"A"[..]), ("c1.mp4", &b"B"[..])]).await;

        concatenate(&engine, &scratch, &clips, "run-", &EncodeConfig::default())
            .await
            .unwrap();

        assert!(engine.list_files().await.is_empty());
        assert_eq!(scratch.tracked(), 0);
    }

    #[tokio::test]
    async fn test_all_stage_files_are_deleted_on_failure() {
        let engine: Arc<dyn SandboxEngine> = Arc::new(SimulationEngine::new().with_failures(1));
        let scratch = ScratchSet::new(Arc::clone(&engine));
        let clips = seed_clips(&engine, &[("c0.mp4", &b"A"[..])]).await;

        let result =
            concatenate(&engine, &scratch, &clips, "run-", &EncodeConfig::default()).await;

        assert!(matches!(
            result,
            Err(AssemblyError::ConcatenationFailed { .. })
        ));
        assert!(engine.list_files().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_byte_combined_output_is_reported() {
        let engine: Arc<dyn SandboxEngine> =
            Arc::new(SimulationEngine::new().with_empty_output());
        let scratch = ScratchSet::new(Arc::clone(&engine));
        let clips = seed_clips(&engine, &[("c0.mp4", &b"A"[..])]).await;

        let result =
            concatenate(&engine, &scratch, &clips, "run-", &EncodeConfig::default()).await;

        assert!(matches!(result, Err(AssemblyError::OutputEmpty { .. })));
    }
}
