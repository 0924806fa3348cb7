/*!
 * Result merging, ordering, and completeness checking.
 *
 * Jobs finish in arbitrary order and batches may have been split by
 * capacity retries, so results arrive interleaved. The aggregator is the
 * single place where input order is re-imposed: every result is keyed by
 * the row id decoded from its custom_id, sorted ascending, and run back
 * through the tag codec to restore the shielded markup.
 */

use std::collections::HashSet;

use log::{error, warn};

use crate::batching::TranslationRequest;
use crate::dataset::clean_translated;
use crate::errors::PipelineError;
use crate::jobs::TranslatedResult;
use crate::tag_codec::TagCodec;

/// One output row with restored markup
#[derive(Debug, Clone)]
pub struct TranslatedRow {
    /// Originating row id
    pub id: u64,
    /// Translated text with placeholders restored
    pub text: String,
    /// Whether the model emitted placeholders this run never issued;
    /// those are left literal in `text`
    pub corrupted: bool,
}

/// Merged, ordered, restored output of a run
#[derive(Debug, Default)]
pub struct AggregatedOutput {
    /// Rows sorted ascending by row id
    pub rows: Vec<TranslatedRow>,
    /// Row ids flagged as corrupted
    pub corrupted_ids: Vec<u64>,
    /// Row ids seen more than once; later duplicates were dropped
    pub duplicate_ids: Vec<u64>,
    /// Expected row ids with no result
    pub missing_ids: Vec<u64>,
}

impl AggregatedOutput {
    /// The completeness verdict: an error listing every missing row id,
    /// or None when all rows are accounted for
    pub fn completeness_error(&self) -> Option<PipelineError> {
        if self.missing_ids.is_empty() {
            None
        } else {
            Some(PipelineError::IncompleteTranslation {
                missing_ids: self.missing_ids.clone(),
            })
        }
    }
}

/// Merges completed result sets into final ordered rows
pub struct ResultAggregator<'a> {
    codec: &'a TagCodec,
}

impl<'a> ResultAggregator<'a> {
    /// Create an aggregator over the run's shared placeholder mapping
    pub fn new(codec: &'a TagCodec) -> Self {
        Self { codec }
    }

    /// Merge all completed results, restore original order and markup,
    /// and account for every expected row id.
    ///
    /// Results with an undecodable custom_id are logged and skipped: they
    /// cannot be placed in the output and will surface as missing ids.
    /// Duplicate ids keep the first occurrence. Rows whose translation
    /// references unknown placeholders are kept but flagged rather than
    /// dropped.
    pub fn merge(
        &self,
        results: Vec<TranslatedResult>,
        expected_ids: &[u64],
    ) -> AggregatedOutput {
        let mut keyed: Vec<(u64, TranslatedResult)> = Vec::with_capacity(results.len());
        for result in results {
            match TranslationRequest::decode_row_id(&result.custom_id) {
                Some(id) => keyed.push((id, result)),
                None => {
                    error!(
                        "Result with unrecognized custom_id {:?} cannot be placed, skipping",
                        result.custom_id
                    );
                }
            }
        }

        // The single ordering-correctness linchpin: ascending row id
        keyed.sort_by_key(|(id, _)| *id);

        let mut output = AggregatedOutput::default();
        let mut seen: HashSet<u64> = HashSet::new();

        for (id, result) in keyed {
            if !seen.insert(id) {
                warn!("Duplicate result for row {}, keeping the first", id);
                output.duplicate_ids.push(id);
                continue;
            }

            let restored = self.codec.restore(&result.translated_text);
            if !restored.is_clean() {
                for placeholder in &restored.dangling {
                    let flag = PipelineError::UnknownPlaceholder {
                        custom_id: result.custom_id.clone(),
                        placeholder: placeholder.clone(),
                    };
                    warn!("{}", flag);
                }
                output.corrupted_ids.push(id);
            }

            output.rows.push(TranslatedRow {
                id,
                text: clean_translated(&restored.text),
                corrupted: !restored.is_clean(),
            });
        }

        output.missing_ids = expected_ids
            .iter()
            .copied()
            .filter(|id| !seen.contains(id))
            .collect();
        output.missing_ids.sort_unstable();

        output
    }
}
