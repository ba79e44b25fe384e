//! Per-clip normalization into the canonical intermediate format.
//!
//! Captured clips differ in container, codec, frame rate, and dimensions.
//! Before concatenation every clip is re-encoded to H.264 / yuv420p at the
//! fixed target frame with fast-start layout, using the fastest acceptable
//! preset: the run environment has no transcoding hardware, so encode time is
//! user-perceived latency. When the silent combined track is being built the
//! audio stream is dropped entirely.

use std::sync::Arc;

use crate::cleanup::ScratchSet;
use crate::config::EncodeConfig;
use crate::container;
use crate::engine::SandboxEngine;
use crate::source::RawClipPayload;
use crate::{AssemblyError, Result};

/// Builds the canonical re-encode argument list for one clip.
///
/// Even dimensions are enforced by the scale/pad filter; odd-sized sources
/// are padded into the frame rather than rejected by the encoder.
pub fn normalize_args(
    input: &str,
    output: &str,
    encode: &EncodeConfig,
    strip_audio: bool,
) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        encode.preset.to_string(),
        "-crf".to_string(),
        encode.crf.to_string(),
        "-vf".to_string(),
        encode.frame_filter(),
        "-pix_fmt".to_string(),
        encode.pixel_format.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ];
    if strip_audio {
        args.push("-an".to_string());
    }
    args.push(output.to_string());
    args
}

/// Re-encodes one raw clip into the canonical format.
///
/// The scratch input is deleted as soon as the normalized output exists,
/// bounding the virtual filesystem to two files per in-flight clip instead
/// of accumulating every raw payload for the whole run.
///
/// Returns the virtual-filesystem name of the normalized clip.
///
/// # Errors
///
/// - `AssemblyError::NormalizationFailed` - Engine rejected or errored on this clip
/// - `AssemblyError::OutputEmpty` - Engine reported success but wrote zero bytes
pub async fn normalize(
    engine: &Arc<dyn SandboxEngine>,
    scratch: &ScratchSet,
    payload: &RawClipPayload,
    slot: usize,
    run_prefix: &str,
    encode: &EncodeConfig,
    strip_audio: bool,
) -> Result<String> {
    let ext = container::sniff_extension(&payload.data, Some(&payload.mime));
    let input = scratch.track(format!("{run_prefix}input{slot}.{ext}"));
    let output = scratch.track(format!("{run_prefix}clip{slot}.mp4"));

    tracing::info!(
        "Normalizing clip {}: {} bytes ({}) -> {}",
        slot,
        payload.data.len(),
        payload.mime,
        output
    );

    engine
        .write_file(&input, payload.data.clone())
        .await
        .map_err(|e| AssemblyError::NormalizationFailed {
            index: slot,
            source: e,
        })?;

    let args = normalize_args(&input, &output, encode, strip_audio);
    let exec = engine.execute(&args).await;

    // Drop the scratch input now regardless of outcome; the raw payload is
    // the largest artifact of this stage.
    if let Err(e) = engine.delete_file(&input).await {
        tracing::warn!("Cleanup of {} failed (ignored): {}", input, e);
    }
    scratch.untrack(&input);

    exec.map_err(|e| AssemblyError::NormalizationFailed {
        index: slot,
        source: e,
    })?;

    let normalized =
        engine
            .read_file(&output)
            .await
            .map_err(|e| AssemblyError::NormalizationFailed {
                index: slot,
                source: e,
            })?;
    if normalized.is_empty() {
        return Err(AssemblyError::OutputEmpty { output });
    }

    tracing::debug!("Clip {} normalized: {} bytes", slot, normalized.len());
    Ok(output)
}
