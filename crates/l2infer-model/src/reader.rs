//! Quick, read-only field-value extraction for stages that only need the raw
//! bytes of one field across every message of a symbol (address lookup,
//! clustering, sequence/checksum sampling) and would rather not pay for a
//! full layout walk to get them.

use thiserror::Error;

use crate::layout::FieldLayout;
use crate::message::Message;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VariableFieldError {
    #[error("field at index {0} has no fixed width; only fields entirely preceded by fixed-width fields can be read directly")]
    PrecedingFieldNotFixed(usize),
    #[error("field index {0} is out of range for a layout of {1} fields")]
    IndexOutOfRange(usize, usize),
}

/// Returns, for every message, the slice of bytes covered by the field at
/// `field_index` in `layout`.
///
/// Requires every field strictly before `field_index` to be fixed-size — the
/// offset is computed as a plain sum, not a per-message walk. The target
/// field itself may be variable-size; its `max_bytes` is used as the read
/// width, the same max-based offset convention `FieldLayout::offsets` uses.
/// A message shorter than the field's end offset contributes whatever bytes
/// remain rather than erroring, mirroring the tolerant slicing the reference
/// implementation relies on when messages are ragged.
pub fn read_field_values(
    layout: &FieldLayout,
    messages: &[Message],
    field_index: usize,
) -> Result<Vec<Vec<u8>>, VariableFieldError> {
    let fields = layout.fields();
    if field_index >= fields.len() {
        return Err(VariableFieldError::IndexOutOfRange(field_index, fields.len()));
    }

    let mut offset = 0usize;
    for (i, f) in fields.iter().enumerate().take(field_index) {
        if !f.is_fixed() {
            return Err(VariableFieldError::PrecedingFieldNotFixed(i));
        }
        offset += f.max_bytes;
    }
    let width = fields[field_index].max_bytes;
    let end = offset + width;

    Ok(messages
        .iter()
        .map(|m| {
            if m.data.len() >= end {
                m.data[offset..end].to_vec()
            } else if m.data.len() > offset {
                m.data[offset..].to_vec()
            } else {
                Vec::new()
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Field;

    fn msg(bytes: &[u8]) -> Message {
        Message::new(bytes.to_vec(), 0)
    }

    #[test]
    fn reads_middle_field_across_messages() {
        let layout = FieldLayout::new(vec![
            Field::fixed("Address", 2),
            Field::fixed("SEQ", 1),
            Field::fixed("Field", 3),
        ]);
        let messages = vec![msg(&[1, 2, 9, 4, 5, 6]), msg(&[7, 8, 10, 1, 2, 3])];
        let values = read_field_values(&layout, &messages, 1).unwrap();
        assert_eq!(values, vec![vec![9u8], vec![10u8]]);
    }

    #[test]
    fn errors_when_preceding_field_is_variable() {
        let layout = FieldLayout::new(vec![Field::new("Field", 0, 4), Field::fixed("SEQ", 1)]);
        let messages = vec![msg(&[1, 2, 3, 4, 5])];
        assert_eq!(
            read_field_values(&layout, &messages, 1),
            Err(VariableFieldError::PrecedingFieldNotFixed(0))
        );
    }

    #[test]
    fn short_message_yields_truncated_slice() {
        let layout = FieldLayout::new(vec![Field::fixed("Address", 2), Field::fixed("Field", 4)]);
        let messages = vec![msg(&[1, 2, 3])];
        let values = read_field_values(&layout, &messages, 1).unwrap();
        assert_eq!(values, vec![vec![3u8]]);
    }

    #[test]
    fn target_field_itself_may_be_variable_size() {
        // The field being read, not just its predecessors, is allowed to be
        // variable — e.g. TypeClusterer reading the trailing residual field
        // that follows two fixed Address fields with no gap between them.
        let layout = FieldLayout::new(vec![Field::fixed("Address", 2), Field::new("Field", 0, 4)]);
        let messages = vec![msg(&[1, 2, 9, 4, 5, 6])];
        let values = read_field_values(&layout, &messages, 1).unwrap();
        assert_eq!(values, vec![vec![9u8, 4, 5, 6]]);
    }

    #[test]
    fn out_of_range_index_errors() {
        let layout = FieldLayout::new(vec![Field::fixed("Address", 2)]);
        let messages = vec![msg(&[1, 2])];
        assert_eq!(
            read_field_values(&layout, &messages, 3),
            Err(VariableFieldError::IndexOutOfRange(3, 1))
        );
    }
}
