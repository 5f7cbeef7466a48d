//! Edge case tests for malformed and unusual input data

use crate::common::{read_rows, rows, TestFixture};

#[test]
fn test_missing_key_column_is_schema_error() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,name\n1,Ann\n");
    let new = fixture.create_csv_raw("new.csv", "Id,name\n1,Ann\n");

    let err = fixture.run_diff(&old, &new, "id").unwrap_err();

    assert_eq!(err.category(), "schema");
    assert_eq!(err.phase(), Some(keydiff::Phase::Load));
    assert!(err.to_string().contains("'id'"));
}

#[test]
fn test_inconsistent_field_count_is_parse_error() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,name,price\n1,A,1.0\n2,B,2.0,extra\n");
    let new = fixture.create_csv_raw("new.csv", "id,name,price\n1,A,1.0\n");

    let err = fixture.run_diff(&old, &new, "id").unwrap_err();

    assert_eq!(err.category(), "parse");
    assert!(err.to_string().contains("line 3"), "{}", err);
}

#[test]
fn test_empty_key_value_is_parse_error() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,name\n1,Ann\n,Nobody\n");
    let new = fixture.create_csv_raw("new.csv", "id,name\n1,Ann\n");

    let err = fixture.run_diff(&old, &new, "id").unwrap_err();
    assert_eq!(err.category(), "parse");
    assert!(err.to_string().contains("empty value in key column"));
}

#[test]
fn test_completely_empty_file_is_schema_error() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "");
    let new = fixture.create_csv_raw("new.csv", "id\n1\n");

    let err = fixture.run_diff(&old, &new, "id").unwrap_err();
    assert_eq!(err.category(), "schema");
}

#[test]
fn test_header_only_files_diff_to_nothing() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,name\n");
    let new = fixture.create_csv_raw("new.csv", "id,name\n");

    let summary = fixture.run_diff(&old, &new, "id").unwrap();

    assert_eq!(summary.old.rows, 0);
    assert_eq!(summary.added + summary.removed, 0);
    // Outputs exist even when empty
    assert!(summary.added_path.exists());
    assert!(summary.removed_path.exists());
}

#[test]
fn test_quoted_fields_and_embedded_newlines() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,text\n\"1\",\"a, b\"\n2,\"line one\nline two\"\n");
    let new = fixture.create_csv_raw("new.csv", "id,text\n3,\"He said \"\"yo\"\"\"\n");

    let summary = fixture.run_diff(&old, &new, "id").unwrap();

    assert_eq!(
        read_rows(&summary.removed_path),
        rows(&[&["1", "a, b"], &["2", "line one\nline two"]])
    );
    assert_eq!(read_rows(&summary.added_path), rows(&[&["3", "He said \"yo\""]]));
}

#[test]
fn test_unicode_keys_and_values() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "clé,nom\nü1,Zoë\n日本,東京\n");
    let new = fixture.create_csv_raw("new.csv", "clé,nom\n日本,東京\n");

    let summary = fixture.run_diff(&old, &new, "clé").unwrap();
    assert_eq!(read_rows(&summary.removed_path), rows(&[&["ü1", "Zoë"]]));
}

#[test]
fn test_key_match_is_case_sensitive_and_exact() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,name\nA1,x\na1,y\n");
    let new = fixture.create_csv_raw("new.csv", "id,name\na1,y\n");

    let summary = fixture.run_diff(&old, &new, "id").unwrap();
    assert_eq!(read_rows(&summary.removed_path), rows(&[&["A1", "x"]]));
}

#[test]
fn test_whitespace_in_key_is_significant() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,name\n1,x\n");
    let new = fixture.create_csv_raw("new.csv", "id,name\n 1,x\n");

    let summary = fixture.run_diff(&old, &new, "id").unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.removed, 1);
}

#[test]
fn test_invalid_utf8_is_parse_error() {
    let fixture = TestFixture::new();
    let old = fixture.root().join("old.csv");
    std::fs::write(&old, b"id,name\n1,\xff\xfe\n").unwrap();
    let new = fixture.create_csv_raw("new.csv", "id,name\n");

    let err = fixture.run_diff(&old, &new, "id").unwrap_err();
    assert_eq!(err.category(), "parse");
}

#[test]
fn test_unterminated_quote_is_parse_error() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,name\n1,\"Ann\n2,Bob\n");
    let new = fixture.create_csv_raw("new.csv", "id,name\n2,Bob\n");

    let err = fixture.run_diff(&old, &new, "id").unwrap_err();

    assert_eq!(err.category(), "parse");
    assert_eq!(err.phase(), Some(keydiff::Phase::Load));
    assert!(err.to_string().contains("line 2"), "{}", err);
    assert!(err.to_string().contains("unterminated quoted field"), "{}", err);
    assert!(fixture.scratch_is_clean());
}

#[test]
fn test_quote_inside_unquoted_field_is_parse_error() {
    let fixture = TestFixture::new();
    let old = fixture.create_csv_raw("old.csv", "id,name\n1,Ann\n");
    let new = fixture.create_csv_raw("new.csv", "id,name\n1,A\"nn\n");

    let err = fixture.run_diff(&old, &new, "id").unwrap_err();

    assert_eq!(err.category(), "parse");
    assert!(err.to_string().contains("new.csv"), "{}", err);
    assert!(err.to_string().contains("line 2"), "{}", err);
}
