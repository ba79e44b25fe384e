//! End-to-end assembly pipeline: download, normalize, concatenate, narrate.
//!
//! These tests run the real acquisition path against local HTTP fixtures and
//! the simulation engine for the transcode phases, so clip ordering,
//! invocation counts, and the cleanup invariant are all observable.

use std::sync::Arc;

use axum::Router;
use axum::http::header;
use axum::routing::get;
use bytes::Bytes;
use clipstitch_core::engine::SimulationEngine;
use clipstitch_core::progress::ProgressObserver;
use clipstitch_core::source::ClipReference;
use clipstitch_core::{AssemblyConfig, AssemblyError, SandboxEngine, VideoAssembler};
use parking_lot::Mutex;

use crate::support::{mp4_payload, spawn_fixture};

const MB: usize = 1024 * 1024;

fn clip_route(data: Vec<u8>) -> axum::routing::MethodRouter {
    get(move || {
        let data = data.clone();
        async move { ([(header::CONTENT_TYPE, "video/mp4")], data) }
    })
}

/// Three valid clips of different sizes, one narration track.
async fn fixture_base() -> String {
    let app = Router::new()
        .route("/shot0.mp4", clip_route(mp4_payload(2 * MB, b'0')))
        .route("/shot1.mp4", clip_route(mp4_payload(3 * MB, b'1')))
        .route("/shot2.mp4", clip_route(mp4_payload(MB, b'2')))
        .route("/narration.mp3", clip_route(b"NARRATION".to_vec()));
    spawn_fixture(app).await
}

fn clip_refs(base: &str) -> Vec<ClipReference> {
    (0..3)
        .map(|i| ClipReference::from_url(format!("{base}/shot{i}.mp4")))
        .collect()
}

fn recording_observer() -> (ProgressObserver, Arc<Mutex<Vec<(u8, String)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: ProgressObserver = Arc::new(move |percent, stage| {
        sink.lock().push((percent, stage.to_string()));
    });
    (observer, seen)
}

#[tokio::test]
async fn test_three_clips_combine_in_order_with_summed_size() {
    let base = fixture_base().await;
    let engine = Arc::new(SimulationEngine::new());
    let assembler =
        VideoAssembler::new(AssemblyConfig::default()).with_engine(engine.clone());

    let result = assembler.combine_clips(&clip_refs(&base), None).await.unwrap();

    // The simulation passes bytes through normalize and concatenates in
    // manifest order, so total size is the sum of the three inputs and the
    // order markers appear in caller order.
    assert_eq!(result.data.len(), 6 * MB);
    assert_eq!(result.mime, "video/mp4");
    // Marker bytes sit at offset 16 inside each source payload.
    assert_eq!(result.data[16], b'0');
    assert_eq!(result.data[2 * MB + 16], b'1');
    assert_eq!(result.data[5 * MB + 16], b'2');

    // One normalize per clip plus one concat; nothing left behind.
    assert_eq!(engine.invocation_count(), 4);
    assert!(engine.list_files().await.is_empty());
}

#[tokio::test]
async fn test_narrated_assembly_appends_audio_and_cleans_up() {
    let base = fixture_base().await;
    let engine = Arc::new(SimulationEngine::new());
    let assembler =
        VideoAssembler::new(AssemblyConfig::default()).with_engine(engine.clone());

    let narration = ClipReference::from_url(format!("{base}/narration.mp3"));
    let result = assembler
        .assemble_narrated(&clip_refs(&base), &narration, None)
        .await
        .unwrap();

    // Combined video plus the re-encoded narration track.
    assert_eq!(result.data.len(), 6 * MB + b"NARRATION".len());
    assert!(result.data.ends_with(b"NARRATION"));

    // Three normalizes, one concat, one mux.
    assert_eq!(engine.invocation_count(), 5);
    assert!(engine.list_files().await.is_empty());
}

#[tokio::test]
async fn test_malformed_narration_fails_after_exactly_two_mux_attempts() {
    let engine = Arc::new(SimulationEngine::new().with_failures(2));
    let assembler =
        VideoAssembler::new(AssemblyConfig::default()).with_engine(engine.clone());

    let result = assembler
        .add_narration(
            Bytes::from_static(b"COMBINED"),
            Bytes::from_static(b"BADAUDIO"),
            None,
        )
        .await;

    assert!(matches!(result, Err(AssemblyError::MuxingFailed { .. })));
    // Primary plus one degraded fallback, never a retry loop.
    assert_eq!(engine.invocation_count(), 2);
    assert!(engine.list_files().await.is_empty());
}

#[tokio::test]
async fn test_mux_fallback_recovers_from_primary_failure() {
    let engine = Arc::new(SimulationEngine::new().with_failures(1));
    let assembler =
        VideoAssembler::new(AssemblyConfig::default()).with_engine(engine.clone());

    let result = assembler
        .add_narration(
            Bytes::from_static(b"COMBINED"),
            Bytes::from_static(b"AUDIO"),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.data, Bytes::from_static(b"COMBINEDAUDIO"));
    let invocations = engine.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[1].contains(&"-shortest".to_string()));
}

#[tokio::test]
async fn test_progress_covers_every_stage_monotonically() {
    let base = fixture_base().await;
    let engine = Arc::new(SimulationEngine::new());
    let assembler =
        VideoAssembler::new(AssemblyConfig::default()).with_engine(engine.clone());
    let (observer, seen) = recording_observer();

    let narration = ClipReference::from_url(format!("{base}/narration.mp3"));
    assembler
        .assemble_narrated(&clip_refs(&base), &narration, Some(observer))
        .await
        .unwrap();

    let events = seen.lock().clone();
    let percents: Vec<u8> = events.iter().map(|(p, _)| *p).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*percents.last().unwrap(), 100);

    let stages: Vec<&str> = events.iter().map(|(_, s)| s.as_str()).collect();
    for label in [
        "Downloading clips",
        "Converting clips",
        "Combining clips",
        "Adding narration",
        "Cleaning up",
    ] {
        assert!(stages.contains(&label), "missing stage label: {label}");
    }
}

#[tokio::test]
async fn test_queued_runs_never_cross_report_progress() {
    let base = fixture_base().await;
    let engine = Arc::new(SimulationEngine::new());
    let assembler = Arc::new(
        VideoAssembler::new(AssemblyConfig::default()).with_engine(engine.clone()),
    );

    let (observer_a, seen_a) = recording_observer();
    let (observer_b, seen_b) = recording_observer();

    let refs_a = clip_refs(&base);
    let refs_b = clip_refs(&base);
    let run_a = assembler.combine_clips(&refs_a, Some(observer_a));
    let run_b = assembler.combine_clips(&refs_b, Some(observer_b));
    let (a, b) = tokio::join!(run_a, run_b);
    a.unwrap();
    b.unwrap();

    // Each observer sees its own complete, monotone run.
    for seen in [seen_a, seen_b] {
        let percents: Vec<u8> = seen.lock().iter().map(|(p, _)| *p).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }

    // Serialized transcode spans leave a clean filesystem behind.
    assert!(engine.list_files().await.is_empty());
}
