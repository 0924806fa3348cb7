/*!
 * Tests for dataset ingestion and output serialization
 */

use tabtrans::dataset::{clean_translated, read_rows, write_rows};
use tabtrans::tag_codec::TagCodec;

use crate::common::write_input_file;

#[test]
fn test_read_rows_shouldAssignOrdinalIdsStartingAtOne() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input_file(dir.path(), "input.csv", &["first", "second", "third"]);

    let mut codec = TagCodec::new();
    let rows = read_rows(&input, &mut codec).expect("read rows");

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[2].id, 3);
    assert_eq!(rows[1].original_text, "second");
}

#[test]
fn test_read_rows_shouldNormalizeMarkupThroughCodec() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input_file(dir.path(), "input.csv", &["<b>Hi</b>", "Plain"]);

    let mut codec = TagCodec::new();
    let rows = read_rows(&input, &mut codec).expect("read rows");

    assert_eq!(rows[0].normalized_text, "{{tag_0}}Hi{{tag_1}}");
    assert_eq!(rows[1].normalized_text, "Plain");
    assert_eq!(codec.len(), 2);
}

#[test]
fn test_write_rows_shouldMatchInputSchema() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("out.csv");

    write_rows(&output, &["a".to_string(), "b".to_string()]).expect("write rows");

    let content = std::fs::read_to_string(&output).expect("read back");
    assert_eq!(content, "a\nb\n");
}

#[test]
fn test_write_rows_withEmptyOutput_shouldWriteEmptyFile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("out.csv");

    write_rows(&output, &[]).expect("write rows");

    assert_eq!(std::fs::read_to_string(&output).expect("read back"), "");
}

#[test]
fn test_clean_translated_shouldStripEscapedQuotes() {
    assert_eq!(clean_translated(r#"a \" b"#), "a  b");
    assert_eq!(clean_translated("untouched \" quote"), "untouched \" quote");
    assert_eq!(clean_translated("plain"), "plain");
}
