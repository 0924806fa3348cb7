/*!
 * Dataset ingestion and output serialization.
 *
 * The translatable unit is one CSV line. Line internals (column quoting,
 * delimiters) are opaque to the pipeline: the tag codec shields quotes and
 * markup before the model ever sees them, so rows travel through the
 * pipeline as plain text and come back structurally identical.
 */

use std::path::Path;

use anyhow::Result;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::file_utils::FileManager;
use crate::tag_codec::TagCodec;

// @const: Backslash-escaped quotes occasionally emitted by the model
static ESCAPED_QUOTE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\\""#).unwrap());

/// One translatable unit of the dataset.
///
/// `id` is assigned once at ingestion, never changes, and is the sole
/// ordering key used to reassemble the final output.
#[derive(Debug, Clone)]
pub struct Row {
    /// Ordinal assigned at ingestion, starting at 1
    pub id: u64,
    /// The raw input line
    pub original_text: String,
    /// The line after placeholder extraction
    pub normalized_text: String,
}

/// Read a CSV file into rows and normalize each one through the codec.
///
/// Normalization is a single sequential pass: the codec's counter and
/// mapping are fully populated before any concurrent job work begins.
pub fn read_rows<P: AsRef<Path>>(path: P, codec: &mut TagCodec) -> Result<Vec<Row>> {
    let content = FileManager::read_to_string(&path)?;

    let rows: Vec<Row> = content
        .lines()
        .enumerate()
        .map(|(idx, line)| Row {
            id: idx as u64 + 1,
            original_text: line.to_string(),
            normalized_text: codec.extract(line),
        })
        .collect();

    debug!(
        "Ingested {} rows from {:?}, {} placeholders issued",
        rows.len(),
        path.as_ref(),
        codec.len()
    );

    Ok(rows)
}

/// Write translated rows, already in input order, to the output file
/// with the same one-line-per-row schema as the input.
pub fn write_rows<P: AsRef<Path>>(path: P, rows: &[String]) -> Result<()> {
    let mut content = rows.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    FileManager::write_to_file(path, &content)
}

/// Strip backslash-escaped quotes the model sometimes invents.
///
/// Real quotes are shielded as placeholders before submission, so any
/// `\"` sequence in translated output is model noise, not data.
pub fn clean_translated(text: &str) -> String {
    ESCAPED_QUOTE_REGEX.replace_all(text, "").into_owned()
}
