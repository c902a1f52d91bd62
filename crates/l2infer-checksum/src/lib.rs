//! ChecksumClassifier (spec §4.6): tests whether a penultimate high-entropy
//! 4-byte field is actually a well-known checksum of the bytes before it.

use tracing::{debug, instrument};

use l2infer_model::{field_names, Symbol};

const SAMPLE_LIMIT: usize = 10;

/// If the penultimate field is a fixed 4-byte `High_entropy` field, samples
/// up to 10 messages and renames it to `crc32`, `adler32`, or `Checksum?`
/// depending on whether `data[:-4]` hashes to the trailing four bytes.
/// Leaves the symbol untouched otherwise.
#[instrument(skip(symbol), fields(symbol = %symbol.name))]
pub fn classify_checksum(mut symbol: Symbol) -> Symbol {
    let fields = symbol.layout.fields();
    let len = fields.len();
    if len < 2 {
        return symbol;
    }
    let penultimate_index = len - 2;
    let penultimate = &fields[penultimate_index];
    if penultimate.name != field_names::HIGH_ENTROPY
        || !penultimate.is_fixed()
        || penultimate.max_bytes != 4
    {
        return symbol;
    }

    let sample_count = symbol.messages.len().min(SAMPLE_LIMIT);
    let mut classification = field_names::CHECKSUM_UNKNOWN;

    for message in symbol.messages.iter().take(sample_count) {
        if message.data.len() < 4 {
            continue;
        }
        let (body, trailer) = message.data.split_at(message.data.len() - 4);
        let crc = crc32fast::hash(body).to_le_bytes();
        let adler = adler32::RollingAdler32::from_buffer(body).hash().to_le_bytes();

        if trailer == crc {
            classification = field_names::CRC32;
            break;
        } else if trailer == adler {
            classification = field_names::ADLER32;
            break;
        } else {
            classification = field_names::CHECKSUM_UNKNOWN;
        }
    }

    debug!(classification, "classified trailing checksum field");
    symbol.layout.fields_mut()[penultimate_index].name = classification.to_string();
    symbol
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2infer_model::{Field, FieldLayout, Message};

    fn symbol_with_trailer(trailers: Vec<Vec<u8>>) -> Symbol {
        let layout = FieldLayout::new(vec![
            Field::fixed(field_names::ADDRESS, 6),
            Field::fixed(field_names::HIGH_ENTROPY, 4),
            Field::new(field_names::FIELD, 0, 10),
        ]);
        let messages = trailers
            .into_iter()
            .map(|bytes| Message::new(bytes, 0))
            .collect();
        Symbol::new("Symbol", layout, messages)
    }

    #[test]
    fn recognizes_crc32_trailer() {
        let body = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut data = body.clone();
        data.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        let symbol = symbol_with_trailer(vec![data]);
        let updated = classify_checksum(symbol);
        assert_eq!(
            updated.layout.fields()[1].name,
            field_names::CRC32
        );
    }

    #[test]
    fn recognizes_adler32_trailer() {
        let body = vec![9u8, 8, 7, 6, 5];
        let mut data = body.clone();
        let adler = adler32::RollingAdler32::from_buffer(&body).hash();
        data.extend_from_slice(&adler.to_le_bytes());
        let symbol = symbol_with_trailer(vec![data]);
        let updated = classify_checksum(symbol);
        assert_eq!(updated.layout.fields()[1].name, field_names::ADLER32);
    }

    #[test]
    fn falls_back_to_unknown_checksum_marker() {
        let data = vec![1u8, 2, 3, 4, 0xDE, 0xAD, 0xBE, 0xEF];
        let symbol = symbol_with_trailer(vec![data]);
        let updated = classify_checksum(symbol);
        assert_eq!(
            updated.layout.fields()[1].name,
            field_names::CHECKSUM_UNKNOWN
        );
    }

    #[test]
    fn leaves_layout_untouched_when_penultimate_field_is_not_high_entropy() {
        let layout = FieldLayout::new(vec![Field::fixed(field_names::ADDRESS, 6)]);
        let symbol = Symbol::new("Symbol", layout, vec![Message::new(vec![1; 6], 0)]);
        let updated = classify_checksum(symbol);
        assert_eq!(updated.layout.fields()[0].name, field_names::ADDRESS);
    }
}
