//! Progress projection for transcoding runs.
//!
//! Each run carries its own reporter so queued runs can never cross-report
//! into another caller's handler. Percentages are projected from a fixed
//! per-stage weight table and clamped to a high-water mark: within one run
//! the reported percent never decreases.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Named phase of a transcoding run, used for progress weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Fetching raw clip bytes from storage
    Download,
    /// Normalizing each clip into the canonical format
    Convert,
    /// Concatenating normalized clips into one stream
    Concat,
    /// Muxing the narration track onto the combined video
    Mux,
    /// Deleting transient virtual-filesystem artifacts
    Cleanup,
}

impl Stage {
    /// Human-readable label delivered alongside the percent.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Download => "Downloading clips",
            Stage::Convert => "Converting clips",
            Stage::Concat => "Combining clips",
            Stage::Mux => "Adding narration",
            Stage::Cleanup => "Cleaning up",
        }
    }
}

/// Cumulative percent span assigned to each stage of a run.
#[derive(Debug, Clone)]
pub struct StageWeights {
    spans: Vec<(Stage, u8, u8)>,
}

impl StageWeights {
    /// Weight table for a combine-only run.
    pub fn combine() -> Self {
        Self {
            spans: vec![
                (Stage::Download, 0, 30),
                (Stage::Convert, 30, 60),
                (Stage::Concat, 60, 85),
                (Stage::Cleanup, 85, 100),
            ],
        }
    }

    /// Weight table for a run that also muxes narration.
    pub fn narrate() -> Self {
        Self {
            spans: vec![
                (Stage::Download, 0, 30),
                (Stage::Convert, 30, 60),
                (Stage::Concat, 60, 75),
                (Stage::Mux, 75, 90),
                (Stage::Cleanup, 90, 100),
            ],
        }
    }

    /// Weight table for a mux-only run.
    pub fn narration_only() -> Self {
        Self {
            spans: vec![
                (Stage::Download, 0, 20),
                (Stage::Mux, 20, 90),
                (Stage::Cleanup, 90, 100),
            ],
        }
    }

    fn span(&self, stage: Stage) -> Option<(u8, u8)> {
        self.spans
            .iter()
            .find(|(s, _, _)| *s == stage)
            .map(|(_, start, end)| (*start, *end))
    }
}

/// Caller-supplied progress callback: `(percent 0..=100, stage label)`.
pub type ProgressObserver = Arc<dyn Fn(u8, &str) + Send + Sync>;

/// Run-local progress reporter with monotonic clamping.
pub struct ProgressReporter {
    observer: Option<ProgressObserver>,
    weights: StageWeights,
    high_water: AtomicU8,
}

impl ProgressReporter {
    pub fn new(observer: Option<ProgressObserver>, weights: StageWeights) -> Self {
        Self {
            observer,
            weights,
            high_water: AtomicU8::new(0),
        }
    }

    /// Projects fractional completion of a stage onto the cumulative scale
    /// and fires the callback. Out-of-order reports clamp to the high-water
    /// mark rather than emitting a lower value.
    pub fn report(&self, stage: Stage, fraction: f64) {
        let Some((start, end)) = self.weights.span(stage) else {
            return;
        };
        let fraction = fraction.clamp(0.0, 1.0);
        let projected = f64::from(start) + f64::from(end - start) * fraction;
        let percent = (projected.round() as u8).min(100);

        let clamped = self
            .high_water
            .fetch_max(percent, Ordering::SeqCst)
            .max(percent);
        if let Some(observer) = &self.observer {
            observer(clamped, stage.label());
        }
    }

    /// Marks the run complete (cleanup finished).
    pub fn finish(&self) {
        self.report(Stage::Cleanup, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    fn recording_reporter(weights: StageWeights) -> (ProgressReporter, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: ProgressObserver = Arc::new(move |percent, _stage| {
            sink.lock().push(percent);
        });
        (
            ProgressReporter::new(Some(observer), weights),
            seen,
        )
    }

    #[test]
    fn test_projection_spans_the_weight_table() {
        let (reporter, seen) = recording_reporter(StageWeights::combine());
        reporter.report(Stage::Download, 0.0);
        reporter.report(Stage::Download, 1.0);
        reporter.report(Stage::Convert, 0.5);
        reporter.report(Stage::Concat, 1.0);
        reporter.finish();
        assert_eq!(*seen.lock(), vec![0, 30, 45, 85, 100]);
    }

    #[test]
    fn test_out_of_order_reports_clamp_instead_of_regressing() {
        let (reporter, seen) = recording_reporter(StageWeights::combine());
        reporter.report(Stage::Concat, 1.0); // 85
        reporter.report(Stage::Download, 0.5); // would be 15; clamps to 85
        let values = seen.lock().clone();
        assert_eq!(values, vec![85, 85]);
    }

    #[test]
    fn test_sequences_are_monotonically_non_decreasing() {
        let (reporter, seen) = recording_reporter(StageWeights::narrate());
        for stage in [Stage::Download, Stage::Convert, Stage::Concat, Stage::Mux] {
            reporter.report(stage, 0.25);
            reporter.report(stage, 1.0);
        }
        reporter.finish();
        let values = seen.lock().clone();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 100);
    }

    #[test]
    fn test_stage_absent_from_table_is_ignored() {
        let (reporter, seen) = recording_reporter(StageWeights::combine());
        reporter.report(Stage::Mux, 1.0); // combine table has no mux span
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_fraction_is_clamped_to_unit_interval() {
        let (reporter, seen) = recording_reporter(StageWeights::combine());
        reporter.report(Stage::Download, 4.2);
        assert_eq!(*seen.lock(), vec![30]);
    }

    #[test]
    fn test_missing_observer_is_fire_and_forget() {
        let reporter = ProgressReporter::new(None, StageWeights::combine());
        reporter.report(Stage::Download, 1.0);
        reporter.finish();
    }
}
