/*!
 * Tests for placeholder extraction and restoration
 */

use tabtrans::tag_codec::TagCodec;

#[test]
fn test_extract_withHtmlTags_shouldReplaceWithPlaceholders() {
    let mut codec = TagCodec::new();
    let normalized = codec.extract("<b>Hi</b>");

    assert_eq!(normalized, "{{tag_0}}Hi{{tag_1}}");
    assert_eq!(codec.lookup(0), Some("<b>"));
    assert_eq!(codec.lookup(1), Some("</b>"));
}

#[test]
fn test_extract_withWorkedExample_shouldMatchExpectedMapping() {
    let mut codec = TagCodec::new();
    let rows = ["<b>Hi</b>", "Price: |||10|||", "Plain"];

    let normalized: Vec<String> = rows.iter().map(|r| codec.extract(r)).collect();

    assert_eq!(normalized[0], "{{tag_0}}Hi{{tag_1}}");
    assert_eq!(normalized[1], "Price: {{tag_2}}10{{tag_3}}");
    assert_eq!(normalized[2], "Plain");

    assert_eq!(codec.len(), 4);
    assert_eq!(codec.lookup(0), Some("<b>"));
    assert_eq!(codec.lookup(1), Some("</b>"));
    assert_eq!(codec.lookup(2), Some("|||"));
    assert_eq!(codec.lookup(3), Some("|||"));
}

#[test]
fn test_roundTrip_withMarkupHeavyText_shouldReproduceOriginal() {
    let texts = [
        "<p class=\"intro\">Hello <b>world</b></p>",
        "Line one\nLine two",
        "Quote: \"inside\" and more",
        "Braces {{{ and }}} around |||",
        "<img src=\"x.png\"/>|||42|||<br/>",
        "No markup at all",
    ];

    let mut codec = TagCodec::new();
    for text in texts {
        let normalized = codec.extract(text);
        let restored = codec.restore(&normalized);
        assert!(restored.is_clean());
        assert_eq!(restored.text, text);
    }
}

#[test]
fn test_extract_withRepeatedSubstring_shouldNeverReuseKeys() {
    let mut codec = TagCodec::new();
    codec.extract("<b>one</b>");
    codec.extract("<b>two</b>");

    // Identical markup gets distinct placeholder keys
    assert_eq!(codec.len(), 4);
    assert_eq!(codec.lookup(0), Some("<b>"));
    assert_eq!(codec.lookup(2), Some("<b>"));
}

#[test]
fn test_extract_acrossRows_shouldShareOneCounter() {
    let mut codec = TagCodec::new();
    let first = codec.extract("<a>");
    let second = codec.extract("<b>");

    assert_eq!(first, "{{tag_0}}");
    assert_eq!(second, "{{tag_1}}");
}

#[test]
fn test_restore_withUnknownPlaceholder_shouldKeepLiteralAndFlag() {
    let mut codec = TagCodec::new();
    codec.extract("<b>");

    let restored = codec.restore("{{tag_0}} then {{tag_99}}");

    assert!(!restored.is_clean());
    assert_eq!(restored.text, "<b> then {{tag_99}}");
    assert_eq!(restored.dangling, vec!["{{tag_99}}".to_string()]);
}

#[test]
fn test_restore_withEmptyCodec_shouldLeaveTextUntouched() {
    let codec = TagCodec::new();
    let restored = codec.restore("Nothing to see");
    assert!(restored.is_clean());
    assert_eq!(restored.text, "Nothing to see");
}

#[test]
fn test_saveAndLoad_shouldPreserveMapping() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tag_dict.json");

    let mut codec = TagCodec::new();
    let normalized = codec.extract("<b>Hi</b>\n\"quoted\"");
    codec.save_to_file(&path).expect("save tag dict");

    let reloaded = TagCodec::load_from_file(&path).expect("load tag dict");
    assert_eq!(reloaded.len(), codec.len());

    let restored = reloaded.restore(&normalized);
    assert!(restored.is_clean());
    assert_eq!(restored.text, "<b>Hi</b>\n\"quoted\"");
}

#[test]
fn test_load_withManyEntries_shouldIndexNumerically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tag_dict.json");

    // More than ten entries so lexicographic key order differs from
    // numeric placeholder order
    let mut codec = TagCodec::new();
    let source: String = (0..12).map(|i| format!("<t{}>", i)).collect();
    let normalized = codec.extract(&source);
    codec.save_to_file(&path).expect("save tag dict");

    let reloaded = TagCodec::load_from_file(&path).expect("load tag dict");
    assert_eq!(reloaded.restore(&normalized).text, source);
}
