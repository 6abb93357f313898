//! Deterministic text edits against the document's `content.text` string.
//!
//! Edits apply sequentially: each edit searches the text as modified by the
//! previous edit, not the original. Matching is exact-substring,
//! non-overlapping, left to right; ambiguity must be resolved with an
//! explicit 1-based `occurrence`.

use memvault_store::TextPatchEdit;

use crate::error::{CoreError, CoreResult};

/// Apply `edits` in order to `text`, returning the edited string.
/// All-or-nothing: any failing edit aborts the whole list.
pub fn apply_edits(text: &str, edits: &[TextPatchEdit]) -> CoreResult<String> {
    edits.iter().try_fold(text.to_string(), apply_edit)
}

fn apply_edit(current: String, edit: &TextPatchEdit) -> CoreResult<String> {
    if edit.old_text.is_empty() {
        return Err(CoreError::InvalidPatch(
            "old_text must be non-empty".to_string(),
        ));
    }

    let starts: Vec<usize> = current
        .match_indices(&edit.old_text)
        .map(|(start, _)| start)
        .collect();

    let start = match (starts.len(), edit.occurrence) {
        (0, _) => {
            return Err(CoreError::PatchMatchNotFound {
                old_text: edit.old_text.clone(),
            })
        }
        (1, None) => starts[0],
        (matches, None) => {
            return Err(CoreError::PatchMatchAmbiguous {
                old_text: edit.old_text.clone(),
                matches,
            })
        }
        (matches, Some(occurrence)) => {
            if occurrence < 1 || occurrence > matches {
                return Err(CoreError::PatchOccurrenceOutOfRange {
                    occurrence,
                    matches,
                });
            }
            starts[occurrence - 1]
        }
    };

    let mut edited = current;
    edited.replace_range(start..start + edit.old_text.len(), &edit.new_text);
    Ok(edited)
}
