//! AddressFinder (spec §4.2): locates one or more fixed-width address
//! fields by looking for byte n-grams that recur at a small, stable, and
//! non-overlapping set of offsets across a trace's messages.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, instrument, trace};

use l2infer_model::{field_names, Field, FieldLayout, Message, Symbol};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoAddressFieldError {
    #[error("no n-gram width between 2 and 6 bytes yielded an accepted address candidate across {message_count} messages")]
    NoCandidateAccepted { message_count: usize },
}

/// Widths tried, widest first: a wider address is assumed more likely to be
/// correct than the shorter prefix of the same field.
const CANDIDATE_WIDTHS: [usize; 5] = [6, 5, 4, 3, 2];

#[instrument(skip(messages), fields(message_count = messages.len()))]
pub fn find_addresses(messages: Vec<Message>) -> Result<Symbol, NoAddressFieldError> {
    let first = messages
        .first()
        .expect("caller guarantees at least one message per trace");

    for &width in &CANDIDATE_WIDTHS {
        if first.data.len() < width {
            continue;
        }
        for ngram_start in 0..=(first.data.len() - width) {
            let candidate = &first.data[ngram_start..ngram_start + width];
            let positions = positions_of(candidate, &messages);
            if let Some(offsets) = accept(&positions, width) {
                debug!(width, ?offsets, "accepted address candidate");
                return Ok(build_symbol(&offsets, width, messages));
            }
        }
    }

    Err(NoAddressFieldError::NoCandidateAccepted {
        message_count: messages.len(),
    })
}

/// Every distinct offset `candidate` occurs at, across all messages, mapped
/// to how many times it was seen there.
fn positions_of(candidate: &[u8], messages: &[Message]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for m in messages {
        let mut begin = 0usize;
        while begin + candidate.len() <= m.data.len() {
            if let Some(found) = find_subslice(&m.data[begin..], candidate) {
                let pos = begin + found;
                *counts.entry(pos).or_insert(0usize) += 1;
                begin = pos + 1;
            } else {
                break;
            }
        }
    }
    counts
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Accept the candidate iff it was seen at 2, 3, or 4 distinct offsets and
/// none of those offsets overlap a `width`-byte neighbour.
fn accept(positions: &BTreeMap<usize, usize>, width: usize) -> Option<Vec<usize>> {
    if positions.len() < 2 || positions.len() > 4 {
        return None;
    }
    let offsets: Vec<usize> = positions.keys().copied().collect();
    for pair in offsets.windows(2) {
        if pair[1] < pair[0] + width {
            return None;
        }
    }
    Some(offsets)
}

/// Places an `Address` field at each accepted offset, fills the gaps before
/// and between them with unnamed fixed fields, and appends a trailing
/// variable field spanning up to the longest message in the trace.
fn build_symbol(offsets: &[usize], width: usize, messages: Vec<Message>) -> Symbol {
    let max_len = messages.iter().map(|m| m.data.len()).max().unwrap_or(0);
    let mut fields = Vec::new();
    let mut cursor = 0usize;

    for &pos in offsets {
        if pos > cursor {
            fields.push(Field::fixed(field_names::FIELD, pos - cursor));
        }
        fields.push(Field::fixed(field_names::ADDRESS, width));
        cursor = pos + width;
    }
    if cursor < max_len {
        fields.push(Field::new(field_names::FIELD, 0, max_len - cursor));
    }

    Symbol::new("Symbol", FieldLayout::new(fields), messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(bytes: &[u8]) -> Message {
        Message::new(bytes.to_vec(), 0)
    }

    #[test]
    fn finds_same_value_recurring_at_two_non_overlapping_offsets() {
        // The algorithm only recognizes an address n-gram that recurs at
        // several offsets within a message, per spec S1: a constant 6-byte
        // value at both [4..10) and [10..16) of every message.
        let addr = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06];
        let mut messages = Vec::new();
        for i in 0..20u8 {
            let mut data = vec![0xAAu8, 0xBB, 0xCC, 0xDD];
            data.extend_from_slice(&addr);
            data.extend_from_slice(&addr);
            data.push(i);
            messages.push(msg(&data));
        }
        let symbol = find_addresses(messages).unwrap();
        let names: Vec<_> = symbol
            .layout
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["Field", "Address", "Address", "Field"]);
        assert_eq!(symbol.layout.fields()[1].max_bytes, 6);
        assert_eq!(symbol.layout.fields()[2].max_bytes, 6);
    }

    #[test]
    fn rejects_candidate_seen_at_overlapping_offsets() {
        // a 2-byte value repeating every byte overlaps itself constantly
        let data = vec![0xAAu8; 10];
        let messages = vec![msg(&data), msg(&data)];
        let err = find_addresses(messages).unwrap_err();
        assert_eq!(
            err,
            NoAddressFieldError::NoCandidateAccepted { message_count: 2 }
        );
    }

    #[test]
    fn fails_when_no_width_yields_an_accepted_candidate() {
        let messages = vec![msg(&[1, 2, 3]), msg(&[4, 5, 6])];
        assert!(find_addresses(messages).is_err());
    }
}
