//! Clipstitch Core - client-side video assembly engine
//!
//! This crate turns a set of independently captured clips into one continuous
//! video, optionally muxed with a separately produced narration track. It
//! provides the sandboxed codec engine adapter, source acquisition with
//! signed-URL refresh, per-clip normalization, ordered concatenation, audio
//! muxing with a bounded fallback, progress reporting, and guaranteed cleanup
//! of every transient artifact.

pub mod assembler;
pub mod cleanup;
pub mod concat;
pub mod config;
pub mod container;
pub mod engine;
pub mod mux;
pub mod normalize;
pub mod progress;
pub mod source;

// Re-export main types for convenient access
pub use assembler::{TranscodeResult, VideoAssembler};
pub use config::AssemblyConfig;
pub use engine::{EngineError, SandboxEngine};
pub use progress::{ProgressObserver, Stage};
pub use source::{ClipReference, FetchError, SignedUrlProvider};

/// Errors that can bubble up from any stage of a transcoding run.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Clip fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("No clips supplied")]
    NoClips,

    #[error("Normalization of clip {index} failed: {source}")]
    NormalizationFailed {
        /// Zero-based slot index of the clip that failed.
        index: usize,
        #[source]
        source: EngineError,
    },

    #[error("Concatenation failed: {source}")]
    ConcatenationFailed {
        #[source]
        source: EngineError,
    },

    #[error("Audio muxing failed after fallback: {source}")]
    MuxingFailed {
        #[source]
        source: EngineError,
    },

    #[error("Engine produced empty output: {output}")]
    OutputEmpty {
        /// Virtual filesystem name of the empty output.
        output: String,
    },
}

impl AssemblyError {
    /// Returns a user-friendly message with a suggested remediation, suitable
    /// for direct display. Never exposes a raw stack trace or command line.
    pub fn user_message(&self) -> String {
        match self {
            AssemblyError::Engine(e) => match e {
                EngineError::EnvironmentUnsupported { .. } => {
                    "This environment cannot run the video engine. Update your runtime or use a supported device."
                        .to_string()
                }
                EngineError::LoadFailed { .. } => {
                    "The video engine failed to load. Check your connection and retry.".to_string()
                }
                _ => "A video engine error occurred. Please retry the assembly.".to_string(),
            },
            AssemblyError::Fetch(e) => e.user_message(),
            AssemblyError::NoClips => {
                "No clips were supplied. Capture at least one shot before combining.".to_string()
            }
            AssemblyError::NormalizationFailed { index, .. } => format!(
                "Clip {} could not be converted. Re-record that shot and try again.",
                index + 1
            ),
            AssemblyError::ConcatenationFailed { .. } => {
                "Combining the clips failed. Please retry the assembly.".to_string()
            }
            AssemblyError::MuxingFailed { .. } => {
                "Adding the narration failed. Regenerate the narration audio and try again."
                    .to_string()
            }
            AssemblyError::OutputEmpty { .. } => {
                "The video engine produced an empty file. Please retry the assembly.".to_string()
            }
        }
    }

    /// Checks if this failure came from user-supplied input rather than the
    /// engine or the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AssemblyError::NoClips | AssemblyError::Fetch(FetchError::EmptyPayload { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
