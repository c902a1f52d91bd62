//! Deduplicator (spec §4.9): collapses messages that differ only in the
//! fields the pipeline itself identified as mutable (`SEQ` and the checksum
//! variants), while keeping the untouched message set around under
//! `orig_messages` so exporters can still see everything that was captured.

use std::collections::HashSet;

use tracing::{debug, instrument};

use l2infer_model::{field_names, Symbol};

const MUTABLE_FIELD_NAMES: [&str; 4] = [
    field_names::SEQ,
    field_names::CRC32,
    field_names::ADLER32,
    field_names::CHECKSUM_UNKNOWN,
];

/// Zero-masks every byte range covered by a mutable field in a scratch copy
/// of each message, then retains only the first message observed for each
/// distinct masked byte sequence. `symbol.messages` is replaced with the
/// deduplicated set; the pre-dedup set and the dedup snapshot are both
/// recorded on the symbol (spec §3/§6).
#[instrument(skip(symbol), fields(symbol = %symbol.name, before = symbol.messages.len()))]
pub fn deduplicate(mut symbol: Symbol) -> Symbol {
    let mask_ranges: Vec<(usize, usize)> = symbol
        .layout
        .fields()
        .iter()
        .zip(symbol.layout.offsets())
        .filter(|(field, _)| MUTABLE_FIELD_NAMES.contains(&field.name.as_str()))
        .map(|(_, range)| range)
        .collect();

    let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(symbol.messages.len());
    let mut deduped = Vec::with_capacity(symbol.messages.len());

    for message in &symbol.messages {
        let masked = mask(&message.data, &mask_ranges);
        if seen.insert(masked) {
            deduped.push(message.clone());
        }
    }

    debug!(after = deduped.len(), "deduplicated messages");
    symbol.mark_deduplicated(deduped);
    symbol
}

/// Returns a fresh buffer equal to `data` with every `[start, end)` range in
/// `ranges` zeroed out. Ranges are clamped to `data`'s actual length since a
/// layout's max-based offsets can run past a particular message's end.
fn mask(data: &[u8], ranges: &[(usize, usize)]) -> Vec<u8> {
    let mut masked = data.to_vec();
    for &(start, end) in ranges {
        let start = start.min(masked.len());
        let end = end.min(masked.len());
        for byte in &mut masked[start..end] {
            *byte = 0;
        }
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2infer_model::{field_names, Field, FieldLayout, Message};

    fn msg(bytes: &[u8]) -> Message {
        Message::new(bytes.to_vec(), 0)
    }

    #[test]
    fn collapses_messages_that_differ_only_in_seq_field() {
        let layout = FieldLayout::new(vec![
            Field::fixed(field_names::ADDRESS, 4),
            Field::fixed(field_names::SEQ, 2),
        ]);
        let messages: Vec<Message> = (0u16..1000)
            .map(|i| {
                let mut data = vec![1, 2, 3, 4];
                data.extend_from_slice(&i.to_be_bytes());
                msg(&data)
            })
            .collect();
        let symbol = Symbol::new("Symbol", layout, messages);
        let deduped = deduplicate(symbol);
        assert_eq!(deduped.messages.len(), 1);
        assert_eq!(deduped.orig_messages.as_ref().unwrap().len(), 1000);
        assert_eq!(deduped.dedup_messages.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn keeps_messages_distinct_outside_mutable_fields() {
        let layout = FieldLayout::new(vec![
            Field::fixed(field_names::ADDRESS, 4),
            Field::fixed(field_names::SEQ, 2),
            Field::new(field_names::FIELD, 0, 4),
        ]);
        let messages = vec![
            msg(&[1, 2, 3, 4, 0, 1, 9, 9]),
            msg(&[1, 2, 3, 4, 0, 2, 8, 8]),
        ];
        let symbol = Symbol::new("Symbol", layout, messages);
        let deduped = deduplicate(symbol);
        assert_eq!(deduped.messages.len(), 2);
    }

    #[test]
    fn no_mutable_fields_means_exact_duplicates_only() {
        let layout = FieldLayout::new(vec![Field::fixed(field_names::ADDRESS, 4)]);
        let messages = vec![msg(&[1, 2, 3, 4]), msg(&[1, 2, 3, 4]), msg(&[5, 6, 7, 8])];
        let symbol = Symbol::new("Symbol", layout, messages);
        let deduped = deduplicate(symbol);
        assert_eq!(deduped.messages.len(), 2);
    }
}
