//! Top-level orchestration of a transcoding run.
//!
//! A run moves through acquisition, per-clip normalization, concatenation,
//! and optional narration muxing. Clip downloads may overlap, but the
//! transcode span of every run is serialized behind a process-wide lock: the
//! engine instance is shared state and its commands must never overlap. Every
//! virtual file a run creates carries the run's unique prefix and is deleted
//! before the run settles, on success and on failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use uuid::Uuid;

use crate::cleanup::ScratchSet;
use crate::concat::concatenate;
use crate::config::AssemblyConfig;
use crate::engine::{SandboxEngine, shared_engine};
use crate::mux::mux_audio;
use crate::normalize::normalize;
use crate::progress::{ProgressObserver, ProgressReporter, Stage, StageWeights};
use crate::source::{ClipFetcher, ClipReference, RawClipPayload, SignedUrlProvider};
use crate::{AssemblyError, Result};

/// Final output of a transcoding run. The engine never persists it;
/// uploading or saving the buffer is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub data: Bytes,
    pub mime: &'static str,
}

impl TranscodeResult {
    fn mp4(data: Bytes) -> Self {
        Self {
            data,
            mime: "video/mp4",
        }
    }
}

/// Engine commands of concurrent runs must be serialized; downloads before
/// the transcode span may still overlap freely.
static RUN_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Assembles captured clips into one continuous, optionally narrated video.
pub struct VideoAssembler {
    config: AssemblyConfig,
    fetcher: ClipFetcher,
    /// Engine override for tests; production resolves the shared singleton.
    engine: Option<Arc<dyn SandboxEngine>>,
}

impl VideoAssembler {
    pub fn new(config: AssemblyConfig) -> Self {
        let fetcher = ClipFetcher::new(config.fetch.clone());
        Self {
            config,
            fetcher,
            engine: None,
        }
    }

    /// Attach the storage collaborator used to refresh expiring signed URLs.
    #[must_use]
    pub fn with_url_provider(mut self, provider: Arc<dyn SignedUrlProvider>) -> Self {
        self.fetcher = self.fetcher.with_url_provider(provider);
        self
    }

    /// Use a specific engine instance instead of the process-wide singleton.
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn SandboxEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Downloads, normalizes, and concatenates clips into one muted video.
    ///
    /// Clips are concatenated in the exact order supplied, regardless of the
    /// order in which their downloads complete. A failed run leaves no
    /// virtual files behind and is restartable with the same inputs.
    ///
    /// # Errors
    ///
    /// - `AssemblyError::NoClips` - Empty clip list; fails before the engine loads
    /// - `AssemblyError::Fetch` - A download failed; identifies the clip index
    /// - `AssemblyError::NormalizationFailed` - A clip was rejected; the run aborts
    /// - `AssemblyError::ConcatenationFailed` / `OutputEmpty` - Combining failed
    pub async fn combine_clips(
        &self,
        clips: &[ClipReference],
        observer: Option<ProgressObserver>,
    ) -> Result<TranscodeResult> {
        if clips.is_empty() {
            return Err(AssemblyError::NoClips);
        }
        let reporter = ProgressReporter::new(observer, StageWeights::combine());

        let payloads = self.fetch_all(clips, &reporter).await?;
        self.combine_payloads_with(payloads, reporter).await
    }

    /// Combines clips that were captured in this session and are already in
    /// memory, skipping acquisition entirely.
    pub async fn combine_payloads(
        &self,
        payloads: Vec<RawClipPayload>,
        observer: Option<ProgressObserver>,
    ) -> Result<TranscodeResult> {
        let reporter = ProgressReporter::new(observer, StageWeights::combine());
        reporter.report(Stage::Download, 1.0);
        self.combine_payloads_with(payloads, reporter).await
    }

    /// Full pipeline: combine the clips, then mux the narration track.
    ///
    /// # Errors
    ///
    /// All `combine_clips` errors, plus `AssemblyError::MuxingFailed` when
    /// both the primary and the fallback mux command fail.
    pub async fn assemble_narrated(
        &self,
        clips: &[ClipReference],
        narration: &ClipReference,
        observer: Option<ProgressObserver>,
    ) -> Result<TranscodeResult> {
        if clips.is_empty() {
            return Err(AssemblyError::NoClips);
        }
        let reporter = ProgressReporter::new(observer, StageWeights::narrate());

        let payloads = self.fetch_all(clips, &reporter).await?;
        let audio = self.fetcher.fetch_clip(narration, clips.len()).await?;

        let engine = self.engine().await?;
        let run_prefix = run_prefix();
        let scratch = ScratchSet::new(Arc::clone(&engine));

        let _run = RUN_LOCK.lock().await;
        let outcome = async {
            let combined = self
                .transcode_combined(&engine, &scratch, &reporter, &payloads, &run_prefix)
                .await?;
            let muxed = mux_audio(&engine, &scratch, combined, audio.data, &run_prefix).await?;
            reporter.report(Stage::Mux, 1.0);
            Ok(TranscodeResult::mp4(muxed))
        }
        .await;

        scratch.cleanup().await;
        if outcome.is_ok() {
            reporter.finish();
        }
        outcome
    }

    /// Muxes narration onto an already-combined video held in memory.
    ///
    /// # Errors
    ///
    /// - `AssemblyError::MuxingFailed` - Both mux commands failed
    /// - `AssemblyError::OutputEmpty` - Engine succeeded with a zero-byte result
    pub async fn add_narration(
        &self,
        video: Bytes,
        audio: Bytes,
        observer: Option<ProgressObserver>,
    ) -> Result<TranscodeResult> {
        let reporter = ProgressReporter::new(observer, StageWeights::narration_only());
        reporter.report(Stage::Download, 1.0);

        let engine = self.engine().await?;
        let run_prefix = run_prefix();
        let scratch = ScratchSet::new(Arc::clone(&engine));

        let _run = RUN_LOCK.lock().await;
        let outcome = async {
            let muxed = mux_audio(&engine, &scratch, video, audio, &run_prefix).await?;
            reporter.report(Stage::Mux, 1.0);
            Ok(TranscodeResult::mp4(muxed))
        }
        .await;

        scratch.cleanup().await;
        if outcome.is_ok() {
            reporter.finish();
        }
        outcome
    }

    async fn combine_payloads_with(
        &self,
        payloads: Vec<RawClipPayload>,
        reporter: ProgressReporter,
    ) -> Result<TranscodeResult> {
        if payloads.is_empty() {
            return Err(AssemblyError::NoClips);
        }

        let engine = self.engine().await?;
        let run_prefix = run_prefix();
        let scratch = ScratchSet::new(Arc::clone(&engine));

        let _run = RUN_LOCK.lock().await;
        let outcome = self
            .transcode_combined(&engine, &scratch, &reporter, &payloads, &run_prefix)
            .await;

        scratch.cleanup().await;
        match outcome {
            Ok(combined) => {
                reporter.finish();
                Ok(TranscodeResult::mp4(combined))
            }
            Err(e) => Err(e),
        }
    }

    /// Normalize by slot index, then concatenate. Runs under the run lock.
    async fn transcode_combined(
        &self,
        engine: &Arc<dyn SandboxEngine>,
        scratch: &ScratchSet,
        reporter: &ProgressReporter,
        payloads: &[RawClipPayload],
        run_prefix: &str,
    ) -> Result<Bytes> {
        let total = payloads.len();
        let mut normalized = Vec::with_capacity(total);
        for (slot, payload) in payloads.iter().enumerate() {
            let name = normalize(
                engine,
                scratch,
                payload,
                slot,
                run_prefix,
                &self.config.encode,
                true, // the combined track is silent; narration comes later
            )
            .await?;
            normalized.push(name);
            reporter.report(Stage::Convert, (slot + 1) as f64 / total as f64);
        }

        let combined =
            concatenate(engine, scratch, &normalized, run_prefix, &self.config.encode).await?;
        reporter.report(Stage::Concat, 1.0);
        Ok(combined)
    }

    /// Concurrent downloads, results ordered by slot index (never completion
    /// time). Any failure aborts the run before normalization begins.
    async fn fetch_all(
        &self,
        clips: &[ClipReference],
        reporter: &ProgressReporter,
    ) -> Result<Vec<RawClipPayload>> {
        let total = clips.len();
        let completed = AtomicUsize::new(0);
        let completed = &completed;
        reporter.report(Stage::Download, 0.0);

        let payloads =
            futures::future::try_join_all(clips.iter().enumerate().map(|(index, clip)| {
                async move {
                    let payload = self.fetcher.fetch_clip(clip, index).await?;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    reporter.report(Stage::Download, done as f64 / total as f64);
                    Ok::<_, AssemblyError>(payload)
                }
            }))
            .await?;
        Ok(payloads)
    }

    async fn engine(&self) -> Result<Arc<dyn SandboxEngine>> {
        if let Some(engine) = &self.engine {
            return Ok(Arc::clone(engine));
        }
        Ok(shared_engine(&self.config.engine).await?)
    }
}

fn run_prefix() -> String {
    format!("{}-", Uuid::new_v4())
}
