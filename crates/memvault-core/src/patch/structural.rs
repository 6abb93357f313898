//! Structural JSON patch over the full envelope tree.
//!
//! JSON-Pointer semantics: `add` inserts into objects or appends/inserts
//! into arrays, `replace` overwrites an existing value, `remove` deletes.
//! Targets are addressed against the serialized envelope, so `/content/...`
//! reaches the payload and the metadata fields are patchable too.

use serde_json::Value;

use memvault_store::{DocumentEnvelope, PatchOpKind, PatchOperation};

use crate::error::{CoreError, CoreResult};

/// Apply `ops` in order against `envelope`, returning the patched envelope.
/// Any failure aborts the whole list; the input is never mutated.
pub fn apply_ops(envelope: &DocumentEnvelope, ops: &[PatchOperation]) -> CoreResult<DocumentEnvelope> {
    let mut tree = serde_json::to_value(envelope)
        .map_err(|e| CoreError::InvalidDocument(e.to_string()))?;
    for op in ops {
        apply_op(&mut tree, op)?;
    }
    serde_json::from_value(tree).map_err(|e| CoreError::InvalidDocument(e.to_string()))
}

/// Split a JSON pointer into unescaped reference tokens.
fn parse_pointer(pointer: &str) -> CoreResult<Vec<String>> {
    if pointer.is_empty() || !pointer.starts_with('/') {
        return Err(CoreError::InvalidPatch(format!(
            "invalid JSON pointer: {pointer:?}"
        )));
    }
    Ok(pointer
        .split('/')
        .skip(1)
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn array_index(token: &str, len: usize, allow_end: bool) -> CoreResult<usize> {
    if token == "-" {
        if allow_end {
            return Ok(len);
        }
        return Err(CoreError::InvalidPatch(
            "'-' is only valid for add".to_string(),
        ));
    }
    // Leading zeros and signs are not valid array indices.
    if token.len() > 1 && token.starts_with('0') {
        return Err(CoreError::InvalidPatch(format!(
            "invalid array index: {token:?}"
        )));
    }
    let index: usize = token
        .parse()
        .map_err(|_| CoreError::InvalidPatch(format!("invalid array index: {token:?}")))?;
    let bound = if allow_end { len + 1 } else { len };
    if index >= bound {
        return Err(CoreError::InvalidPatch(format!(
            "array index {index} out of bounds (len {len})"
        )));
    }
    Ok(index)
}

fn apply_op(root: &mut Value, op: &PatchOperation) -> CoreResult<()> {
    let tokens = parse_pointer(&op.path)?;
    let (last, parents) = tokens
        .split_last()
        .expect("parse_pointer rejects empty pointers");

    // Walk to the parent container.
    let mut current = root;
    for token in parents {
        current = match current {
            Value::Object(map) => map.get_mut(token).ok_or_else(|| {
                CoreError::InvalidPatch(format!("path segment not found: {token:?}"))
            })?,
            Value::Array(arr) => {
                let len = arr.len();
                let index = array_index(token, len, false)?;
                &mut arr[index]
            }
            _ => {
                return Err(CoreError::InvalidPatch(format!(
                    "cannot descend into non-container at {token:?}"
                )))
            }
        };
    }

    match op.op {
        PatchOpKind::Add => {
            let value = op
                .value
                .clone()
                .ok_or_else(|| CoreError::InvalidPatch("add requires a value".to_string()))?;
            match current {
                Value::Object(map) => {
                    map.insert(last.clone(), value);
                }
                Value::Array(arr) => {
                    let index = array_index(last, arr.len(), true)?;
                    arr.insert(index, value);
                }
                _ => {
                    return Err(CoreError::InvalidPatch(format!(
                        "cannot add into non-container at {last:?}"
                    )))
                }
            }
        }
        PatchOpKind::Replace => {
            let value = op
                .value
                .clone()
                .ok_or_else(|| CoreError::InvalidPatch("replace requires a value".to_string()))?;
            match current {
                Value::Object(map) => {
                    let slot = map.get_mut(last.as_str()).ok_or_else(|| {
                        CoreError::InvalidPatch(format!("replace target not found: {last:?}"))
                    })?;
                    *slot = value;
                }
                Value::Array(arr) => {
                    let index = array_index(last, arr.len(), false)?;
                    arr[index] = value;
                }
                _ => {
                    return Err(CoreError::InvalidPatch(format!(
                        "cannot replace in non-container at {last:?}"
                    )))
                }
            }
        }
        PatchOpKind::Remove => match current {
            Value::Object(map) => {
                map.remove(last.as_str()).ok_or_else(|| {
                    CoreError::InvalidPatch(format!("remove target not found: {last:?}"))
                })?;
            }
            Value::Array(arr) => {
                let index = array_index(last, arr.len(), false)?;
                arr.remove(index);
            }
            _ => {
                return Err(CoreError::InvalidPatch(format!(
                    "cannot remove from non-container at {last:?}"
                )))
            }
        },
    }
    Ok(())
}
