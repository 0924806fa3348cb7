/*!
 * Reversible placeholder substitution for structural markup.
 *
 * Markup and reserved delimiter sequences do not need translation, waste
 * model tokens, and are easily mangled by the model. Before submission they
 * are swapped for compact `{{tag_N}}` placeholders; after the translated
 * text comes back the placeholders are swapped back for the originals.
 */

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

// @const: Markup and reserved delimiter patterns shielded from the model.
// Pattern classes are disjoint, so a single left-to-right pass suffices.
static MARKUP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<[^>]+>|\{\{\{|\}\}\}|\|\|\||\n|""#).unwrap()
});

// @const: Placeholder token as it appears in normalized and translated text
static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{tag_(\d+)\}\}").unwrap()
});

/// Result of restoring a translated text: the rebuilt text plus any
/// placeholder tokens the model produced that were never issued.
#[derive(Debug, Clone)]
pub struct RestoredText {
    /// Text with all known placeholders substituted back
    pub text: String,
    /// Placeholders found in the text but absent from the mapping.
    /// They are left literal in `text` rather than dropped.
    pub dangling: Vec<String>,
}

impl RestoredText {
    /// Whether every placeholder in the translated text was known
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty()
    }
}

/// Placeholder codec shared across one whole translation run.
///
/// The counter increases monotonically and is never reused, so placeholder
/// keys are globally unique even when the same markup substring occurs in
/// many rows. The mapping is append-only: normalization happens in a single
/// pass before any concurrent work starts, after which the codec is only
/// read.
#[derive(Debug, Default, Clone)]
pub struct TagCodec {
    /// Replaced substrings, indexed by placeholder number
    mapping: Vec<String>,
}

impl TagCodec {
    /// Create an empty codec
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of placeholders issued so far
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether no placeholders have been issued
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Look up the original substring for a placeholder number
    pub fn lookup(&self, key: u64) -> Option<&str> {
        self.mapping.get(key as usize).map(|s| s.as_str())
    }

    /// Replace every markup span in `text` with a fresh placeholder,
    /// recording the replaced substring in the shared mapping.
    pub fn extract(&mut self, text: &str) -> String {
        let mapping = &mut self.mapping;
        MARKUP_REGEX
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let placeholder = format!("{{{{tag_{}}}}}", mapping.len());
                mapping.push(caps[0].to_string());
                placeholder
            })
            .into_owned()
    }

    /// Substitute every known `{{tag_N}}` occurrence back to its original
    /// substring. Unknown placeholders are kept literal and reported so the
    /// caller can flag the row instead of aborting the run.
    pub fn restore(&self, text: &str) -> RestoredText {
        let mut dangling = Vec::new();
        let restored = PLACEHOLDER_REGEX
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let key: u64 = caps[1].parse().unwrap_or(u64::MAX);
                match self.lookup(key) {
                    Some(original) => original.to_string(),
                    None => {
                        dangling.push(caps[0].to_string());
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();

        RestoredText {
            text: restored,
            dangling,
        }
    }

    /// Persist the mapping as a `{"{{tag_0}}": "<b>", ...}` JSON object
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut object = BTreeMap::new();
        for (idx, original) in self.mapping.iter().enumerate() {
            object.insert(format!("{{{{tag_{}}}}}", idx), original.clone());
        }

        let json = serde_json::to_string_pretty(&object)
            .context("Failed to serialize tag dictionary")?;
        crate::file_utils::FileManager::write_to_file(&path, &json)?;

        Ok(())
    }

    /// Reload a mapping previously written by `save_to_file`
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = crate::file_utils::FileManager::read_to_string(&path)?;
        let object: BTreeMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse tag dictionary: {:?}", path.as_ref()))?;

        let mut mapping = vec![String::new(); object.len()];
        for (key, original) in object {
            let caps = PLACEHOLDER_REGEX
                .captures(&key)
                .ok_or_else(|| anyhow!("Malformed tag dictionary key: {}", key))?;
            let idx: usize = caps[1]
                .parse()
                .with_context(|| format!("Malformed tag dictionary key: {}", key))?;
            if idx >= mapping.len() {
                return Err(anyhow!("Tag dictionary key out of range: {}", key));
            }
            mapping[idx] = original;
        }

        Ok(Self { mapping })
    }
}
