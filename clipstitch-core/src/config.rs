//! Centralized configuration for Clipstitch.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the pipeline stages.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for a video assembly pipeline.
///
/// Groups related settings into logical sections. Construct once and share
/// across runs; individual runs never mutate it.
#[derive(Debug, Clone, Default)]
pub struct AssemblyConfig {
    pub engine: EngineConfig,
    pub fetch: FetchConfig,
    pub encode: EncodeConfig,
}

/// Codec engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Override path to the codec binary (None = resolve from PATH)
    pub binary_path: Option<PathBuf>,
    /// Maximum wall time for a single engine command
    pub command_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            command_timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Clip download configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// HTTP request timeout per clip download
    pub request_timeout: Duration,
    /// User agent for clip and narration downloads
    pub user_agent: &'static str,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            user_agent: "clipstitch/0.1.0",
        }
    }
}

/// Canonical encode settings applied during normalization and concatenation.
///
/// The preset is deliberately the fastest acceptable-quality profile: the
/// target environment has no dedicated transcoding hardware, so encode time
/// directly blocks user-perceived latency.
#[derive(Debug, Clone)]
pub struct EncodeConfig {
    /// Target frame width (portrait layout by default)
    pub target_width: u32,
    /// Target frame height
    pub target_height: u32,
    /// H.264 encoder preset
    pub preset: &'static str,
    /// Constant rate factor (higher = faster, lower quality)
    pub crf: u8,
    /// Pixel format for maximum decoder compatibility
    pub pixel_format: &'static str,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            target_width: 720,
            target_height: 1280, // portrait capture layout
            preset: "ultrafast",
            crf: 28,
            pixel_format: "yuv420p",
        }
    }
}

impl EncodeConfig {
    /// Scale-and-pad filter expression fitting any input inside the target
    /// frame. Dimensions are forced even; odd-sized sources are padded rather
    /// than rejected by the encoder.
    pub fn frame_filter(&self) -> String {
        let (w, h) = (self.target_width & !1, self.target_height & !1);
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_even_dimensioned() {
        let config = EncodeConfig::default();
        assert_eq!(config.target_width % 2, 0);
        assert_eq!(config.target_height % 2, 0);
    }

    #[test]
    fn test_frame_filter_forces_even_dimensions() {
        let config = EncodeConfig {
            target_width: 721,
            target_height: 1281,
            ..EncodeConfig::default()
        };
        let filter = config.frame_filter();
        assert!(filter.contains("scale=720:1280"));
        assert!(filter.contains("pad=720:1280"));
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.binary_path.is_none());
        assert!(config.command_timeout > Duration::ZERO);
    }
}
