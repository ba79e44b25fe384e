//! Integration tests for Clipstitch
//!
//! These tests verify the assembly pipeline end to end: acquisition over
//! real HTTP fixtures, normalization, ordered concatenation, narration
//! muxing with its bounded fallback, progress reporting, and the cleanup
//! invariant across success and failure paths.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/assembly_pipeline.rs"]
mod assembly_pipeline;

#[path = "integration/clip_acquisition.rs"]
mod clip_acquisition;
