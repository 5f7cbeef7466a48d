//! End-to-end diff scenarios with known answers

use crate::common::{read_header, read_rows, rows, sample_data, TestFixture};
use keydiff::loader::DuplicatePolicy;
use std::fs;

#[test]
fn test_added_and_removed_people() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &sample_data::people_old());
    let new = fixture.create_csv("new.csv", &sample_data::people_new());

    let summary = fixture.run_diff(&old, &new, "id").unwrap();

    assert_eq!(summary.added, 1);
    assert_eq!(summary.removed, 1);
    assert_eq!(read_rows(&summary.added_path), rows(&[&["4", "Dee"]]));
    assert_eq!(read_rows(&summary.removed_path), rows(&[&["1", "Ann"]]));
    assert_eq!(read_header(&summary.added_path), vec!["id", "name"]);
    assert!(fixture.scratch_is_clean());
}

#[test]
fn test_identical_files_have_no_differences() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &sample_data::people_old());
    let new = fixture.create_csv("new.csv", &sample_data::people_old());

    let summary = fixture.run_diff(&old, &new, "id").unwrap();

    assert_eq!(summary.added, 0);
    assert_eq!(summary.removed, 0);
    assert!(read_rows(&summary.added_path).is_empty());
    assert!(read_rows(&summary.removed_path).is_empty());
}

#[test]
fn test_identical_duplicates_collapse_to_one_match() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv(
        "old.csv",
        &[vec!["id", "name"], vec!["1", "Ann"], vec!["1", "Ann"], vec!["2", "Bob"]],
    );
    let new = fixture.create_csv("new.csv", &[vec!["id", "name"], vec!["1", "Ann"]]);

    let summary = fixture.run_diff(&old, &new, "id").unwrap();

    assert_eq!(summary.old.rows, 3);
    assert_eq!(summary.old.duplicate_conflicts, 0);
    assert_eq!(summary.added, 0);
    assert_eq!(read_rows(&summary.removed_path), rows(&[&["2", "Bob"]]));
}

#[test]
fn test_removed_key_with_identical_duplicates_emitted_once() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv(
        "old.csv",
        &[vec!["id", "name"], vec!["7", "Gus"], vec!["7", "Gus"]],
    );
    let new = fixture.create_csv("new.csv", &[vec!["id", "name"]]);

    let summary = fixture.run_diff(&old, &new, "id").unwrap();
    assert_eq!(summary.removed, 1);
}

#[test]
fn test_conflicting_duplicates_kept_by_default() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv(
        "old.csv",
        &[vec!["id", "name"], vec!["5", "Eve"], vec!["5", "Eva"]],
    );
    let new = fixture.create_csv("new.csv", &[vec!["id", "name"], vec!["6", "Fay"]]);

    let summary = fixture.run_diff(&old, &new, "id").unwrap();

    assert_eq!(summary.old.duplicate_conflicts, 1);
    assert_eq!(
        read_rows(&summary.removed_path),
        rows(&[&["5", "Eve"], &["5", "Eva"]])
    );
}

#[test]
fn test_conflicting_duplicates_rejected_on_request() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv(
        "old.csv",
        &[vec!["id", "name"], vec!["5", "Eve"], vec!["5", "Eva"]],
    );
    let new = fixture.create_csv("new.csv", &[vec!["id", "name"], vec!["5", "Eve"]]);

    let mut config = fixture.config(&old, &new, "id");
    config.duplicate_policy = DuplicatePolicy::Reject;
    let err = fixture.run_config(config).unwrap_err();

    assert_eq!(err.category(), "duplicate-key");
    assert!(err.to_string().starts_with("load phase failed"));
    assert!(fixture.scratch_is_clean());
}

#[test]
fn test_changed_content_under_same_key_is_not_reported() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &[vec!["id", "name"], vec!["1", "Ann"]]);
    let new = fixture.create_csv("new.csv", &[vec!["id", "name"], vec!["1", "Anne"]]);

    let summary = fixture.run_diff(&old, &new, "id").unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.removed, 0);
}

#[test]
fn test_headers_follow_their_source_file() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &[vec!["name", "id"], vec!["Ann", "1"]]);
    let new = fixture.create_csv("new.csv", &[vec!["id", "name", "team"], vec!["2", "Bob", "x"]]);

    let summary = fixture.run_diff(&old, &new, "id").unwrap();

    assert_eq!(read_header(&summary.removed_path), vec!["name", "id"]);
    assert_eq!(read_header(&summary.added_path), vec!["id", "name", "team"]);
    assert_eq!(read_rows(&summary.removed_path), rows(&[&["Ann", "1"]]));
    assert_eq!(read_rows(&summary.added_path), rows(&[&["2", "Bob", "x"]]));
}

#[test]
fn test_summary_json_written_with_run() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv("old.csv", &sample_data::people_old());
    let new = fixture.create_csv("new.csv", &sample_data::people_new());

    let summary = fixture.run_diff(&old, &new, "id").unwrap();

    let run_dir = fixture.output_dir().join(&summary.run_id);
    let content = fs::read_to_string(run_dir.join("summary.json")).unwrap();
    let on_disk: keydiff::RunSummary = serde_json::from_str(&content).unwrap();
    assert_eq!(on_disk, summary);
    assert_eq!(on_disk.old.rows, 3);
    assert_eq!(on_disk.new.rows, 3);
}
