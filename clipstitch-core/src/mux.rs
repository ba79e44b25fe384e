//! Narration muxing onto the combined video.
//!
//! The video stream is copied unmodified; only the audio is re-encoded into
//! a container-compatible codec. Stream indices are mapped explicitly
//! because automatic selection can silently pick the wrong stream when an
//! input is itself a multi-stream container. A single conservative fallback
//! command is attempted on primary failure; the retry bound is encoded in an
//! explicit strategy table, not nested error handlers.

use std::sync::Arc;

use bytes::Bytes;

use crate::cleanup::ScratchSet;
use crate::engine::SandboxEngine;
use crate::{AssemblyError, Result};

/// One mux command variant.
struct MuxStrategy {
    name: &'static str,
    build: fn(&str, &str, &str) -> Vec<String>,
}

/// Primary first, then exactly one degraded fallback. Worst case is two
/// engine invocations for this stage, never more.
const STRATEGIES: [MuxStrategy; 2] = [
    MuxStrategy {
        name: "explicit-map",
        build: primary_args,
    },
    MuxStrategy {
        name: "legacy-shortest",
        build: fallback_args,
    },
];

/// Explicit mapping: video stream 0 of input 0, audio stream 0 of input 1.
/// The copied video drives the time base, so output duration is the video's.
fn primary_args(video: &str, audio: &str, output: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        video.to_string(),
        "-i".to_string(),
        audio.to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        output.to_string(),
    ]
}

/// Conservative legacy variant: coarse stream maps and explicit
/// shortest-stream truncation.
fn fallback_args(video: &str, audio: &str, output: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        video.to_string(),
        "-i".to_string(),
        audio.to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-shortest".to_string(),
        output.to_string(),
    ]
}

/// Muxes a narration track onto a combined video.
///
/// Returns the final container read back into memory. Both inputs and the
/// output are deleted before returning, success or failure.
///
/// # Errors
///
/// - `AssemblyError::MuxingFailed` - Both the primary and the fallback command failed
/// - `AssemblyError::OutputEmpty` - Engine reported success but wrote zero bytes
pub async fn mux_audio(
    engine: &Arc<dyn SandboxEngine>,
    scratch: &ScratchSet,
    video: Bytes,
    audio: Bytes,
    run_prefix: &str,
) -> Result<Bytes> {
    let video_name = scratch.track(format!("{run_prefix}combined.mp4"));
    let audio_name = scratch.track(format!("{run_prefix}narration.mp3"));
    let output = scratch.track(format!("{run_prefix}final.mp4"));

    tracing::info!(
        "Muxing narration ({} bytes) onto video ({} bytes)",
        audio.len(),
        video.len()
    );

    let outcome = run_mux(engine, &video_name, video, &audio_name, audio, &output).await;

    for name in [&video_name, &audio_name, &output] {
        if let Err(e) = engine.delete_file(name).await {
            tracing::warn!("Cleanup of {} failed (ignored): {}", name, e);
        }
        scratch.untrack(name);
    }

    outcome
}

async fn run_mux(
    engine: &Arc<dyn SandboxEngine>,
    video_name: &str,
    video: Bytes,
    audio_name: &str,
    audio: Bytes,
    output: &str,
) -> Result<Bytes> {
    engine
        .write_file(video_name, video)
        .await
        .map_err(|e| AssemblyError::MuxingFailed { source: e })?;
    engine
        .write_file(audio_name, audio)
        .await
        .map_err(|e| AssemblyError::MuxingFailed { source: e })?;

    let mut last_error = None;
    for strategy in &STRATEGIES {
        let args = (strategy.build)(video_name, audio_name, output);
        match engine.execute(&args).await {
            Ok(()) => {
                last_error = None;
                break;
            }
            Err(e) => {
                tracing::warn!("Mux strategy '{}' failed: {}", strategy.name, e);
                last_error = Some(e);
            }
        }
    }
    if let Some(source) = last_error {
        return Err(AssemblyError::MuxingFailed { source });
    }

    let muxed = engine
        .read_file(output)
        .await
        .map_err(|e| AssemblyError::MuxingFailed { source: e })?;
    if muxed.is_empty() {
        return Err(AssemblyError::OutputEmpty {
            output: output.to_string(),
        });
    }

    tracing::info!("Mux produced {} bytes", muxed.len());
    Ok(muxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulationEngine;

    #[test]
    fn test_primary_maps_streams_explicitly() {
        let args = primary_args("v.mp4", "a.mp3", "out.mp4");
        let joined = args.join(" ");
        assert!(joined.contains("-map 0:v:0"));
        assert!(joined.contains("-map 1:a:0"));
        assert!(!joined.contains("-shortest"));
    }

    #[test]
    fn test_fallback_truncates_to_shortest() {
        let args = fallback_args("v.mp4", "a.mp3", "out.mp4");
        assert!(args.contains(&"-shortest".to_string()));
    }

    #[tokio::test]
    async fn test_primary_success_needs_one_invocation() {
        let engine = Arc::new(SimulationEngine::new());
        let dyn_engine: Arc<dyn SandboxEngine> = engine.clone();
        let scratch = ScratchSet::new(Arc::clone(&dyn_engine));

        let muxed = mux_audio(
            &dyn_engine,
            &scratch,
            Bytes::from_static(b"VIDEO"),
            Bytes::from_static(b"AUDIO"),
            "run-",
        )
        .await
        .unwrap();

        assert_eq!(muxed, Bytes::from_static(b"VIDEOAUDIO"));
        assert_eq!(engine.invocation_count(), 1);
        assert!(engine.list_files().await.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_is_attempted_exactly_once() {
        let engine = Arc::new(SimulationEngine::new().with_failures(1));
        let dyn_engine: Arc<dyn SandboxEngine> = engine.clone();
        let scratch = ScratchSet::new(Arc::clone(&dyn_engine));

        let muxed = mux_audio(
            &dyn_engine,
            &scratch,
            Bytes::from_static(b"V"),
            Bytes::from_static(b"A"),
            "run-",
        )
        .await
        .unwrap();

        assert_eq!(muxed, Bytes::from_static(b"VA"));
        let invocations = engine.invocations();
        assert_eq!(invocations.len(), 2);
        assert!(invocations[1].contains(&"-shortest".to_string()));
    }

    #[tokio::test]
    async fn test_double_failure_stops_after_two_invocations() {
        let engine = Arc::new(SimulationEngine::new().with_failures(2));
        let dyn_engine: Arc<dyn SandboxEngine> = engine.clone();
        let scratch = ScratchSet::new(Arc::clone(&dyn_engine));

        let result = mux_audio(
            &dyn_engine,
            &scratch,
            Bytes::from_static(b"V"),
            Bytes::from_static(b"A"),
            "run-",
        )
        .await;

        assert!(matches!(result, Err(AssemblyError::MuxingFailed { .. })));
        assert_eq!(engine.invocation_count(), 2);
        // Inputs do not leak even when both strategies fail.
        assert!(engine.list_files().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_byte_final_output_is_reported() {
        let engine: Arc<dyn SandboxEngine> =
            Arc::new(SimulationEngine::new().with_empty_output());
        let scratch = ScratchSet::new(Arc::clone(&engine));

        let result = mux_audio(
            &engine,
            &scratch,
            Bytes::from_static(b"V"),
            Bytes::from_static(b"A"),
            "run-",
        )
        .await;

        assert!(matches!(result, Err(AssemblyError::OutputEmpty { .. })));
    }
}
