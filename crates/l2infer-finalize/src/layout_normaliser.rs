//! LayoutNormaliser (spec §4.8): the last stage to touch a symbol's layout.
//! Every earlier stage only ever widens or narrows the layout relative to
//! the messages it saw at the time; this stage is the one place that makes
//! the layout's cumulative min/max match the symbol's own final message set
//! exactly, which is what spec §8's post-stage invariant requires.

use tracing::{debug, instrument};

use l2infer_model::Symbol;

/// Calls `FieldLayout::adapt_last` with `symbol`'s own observed shortest and
/// longest message lengths.
#[instrument(skip(symbol), fields(symbol = %symbol.name))]
pub fn normalise_layout(mut symbol: Symbol) -> Symbol {
    let min_len = symbol.shortest_message_len();
    let max_len = symbol.longest_message_len();
    debug!(
        min_len,
        max_len,
        total_min_before = symbol.layout.total_min(),
        total_max_before = symbol.layout.total_max(),
        "normalising layout to observed message lengths"
    );
    symbol.layout.adapt_last(min_len, max_len);
    symbol
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2infer_model::{field_names, Field, FieldLayout, Message};

    fn msg(bytes: &[u8]) -> Message {
        Message::new(bytes.to_vec(), 0)
    }

    #[test]
    fn shrinks_trailing_field_to_match_shorter_final_messages() {
        let layout = FieldLayout::new(vec![
            Field::fixed(field_names::ADDRESS, 6),
            Field::new(field_names::FIELD, 0, 20),
        ]);
        let messages = vec![msg(&[0; 10]), msg(&[0; 12])];
        let symbol = Symbol::new("Symbol", layout, messages);
        let normalised = normalise_layout(symbol);
        assert_eq!(normalised.layout.total_max(), 12);
        assert_eq!(normalised.layout.total_min(), 10);
    }

    #[test]
    fn leaves_already_matching_layout_untouched() {
        let layout = FieldLayout::new(vec![Field::fixed(field_names::ADDRESS, 6)]);
        let symbol = Symbol::new("Symbol", layout, vec![msg(&[0; 6]), msg(&[1; 6])]);
        let normalised = normalise_layout(symbol);
        assert_eq!(normalised.layout.total_max(), 6);
        assert_eq!(normalised.layout.total_min(), 6);
    }
}
