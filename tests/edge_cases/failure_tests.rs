//! Failure paths: I/O errors, cancellation, and scratch store cleanup

use crate::common::{sample_data, TestFixture};
use keydiff::{CancellationToken, Phase, Pipeline, PipelineState};
use std::fs;
use std::time::{Duration, Instant};

#[test]
fn test_missing_input_file_is_io_error_in_load_phase() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &sample_data::people_old());
    let missing = fixture.root().join("does_not_exist.csv");

    let err = fixture.run_diff(&old, &missing, "id").unwrap_err();

    assert_eq!(err.category(), "io");
    assert_eq!(err.phase(), Some(Phase::Load));
    assert!(err.to_string().contains("does_not_exist.csv"));
    assert!(fixture.scratch_is_clean());
}

#[test]
fn test_sibling_failure_reports_primary_cause() {
    let fixture = TestFixture::new();
    let big = fixture.create_sequential_csv("big.csv", 0, 20_000);
    let missing = fixture.root().join("missing.csv");

    let mut config = fixture.config(&big, &missing, "id");
    config.batch_size = 100;
    let err = fixture.run_config(config).unwrap_err();

    // The big load may be cancelled, but the surfaced error is the missing file
    assert_eq!(err.category(), "io");
    assert!(!err.is_cancelled());
    assert!(fixture.scratch_is_clean());
}

#[test]
fn test_unwritable_output_fails_diff_phase() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &sample_data::people_old());
    let new = fixture.create_csv("new.csv", &sample_data::people_new());
    // A plain file where the output directory should be
    let blocked = fixture.create_csv_raw("blocked", "not a directory");

    let mut config = fixture.config(&old, &new, "id");
    config.output_dir = blocked;
    let pipeline = Pipeline::new(config);
    let err = pipeline.run(&CancellationToken::new()).unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Diff));
    assert_eq!(err.category(), "io");
    assert!(err.to_string().starts_with("diff/write phase failed"));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(fixture.scratch_is_clean());
}

#[test]
fn test_cancelled_before_start() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &sample_data::people_old());
    let new = fixture.create_csv("new.csv", &sample_data::people_new());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let pipeline = Pipeline::new(fixture.config(&old, &new, "id"));
    let err = pipeline.run(&cancel).unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(fixture.scratch_is_clean());
    assert!(!fixture.output_dir().join(pipeline.run_id()).exists());
}

#[test]
fn test_cancel_from_another_thread_stops_run() {
    let fixture = TestFixture::new();
    let old = fixture.create_sequential_csv("old.csv", 0, 400_000);
    let new = fixture.create_sequential_csv("new.csv", 200_000, 400_000);

    let mut config = fixture.config(&old, &new, "id");
    config.batch_size = 1_000;
    let pipeline = Pipeline::new(config);
    let cancel = CancellationToken::new();
    // Fires while the loads are still running
    let _deadline = cancel.cancel_after(Duration::from_millis(50));

    let start = Instant::now();
    let err = pipeline.run(&cancel).unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_cancelled(), "unexpected error: {}", err);
    assert_eq!(err.phase(), Some(Phase::Load));
    assert!(elapsed < Duration::from_secs(3), "cancel took {:?}", elapsed);
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(fixture.scratch_is_clean());
}

#[test]
fn test_scratch_dir_created_when_missing() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &sample_data::people_old());
    let new = fixture.create_csv("new.csv", &sample_data::people_new());
    let nested = fixture.root().join("deep").join("scratch");

    let mut config = fixture.config(&old, &new, "id");
    config.scratch_dir = Some(nested.clone());
    fixture.run_config(config).unwrap();

    assert!(nested.exists());
    assert_eq!(fs::read_dir(&nested).unwrap().count(), 0);
}
