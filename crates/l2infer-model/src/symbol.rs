//! The unit stages operate on after clustering: a named group of messages
//! sharing one evolving [`FieldLayout`].

use crate::layout::FieldLayout;
use crate::message::Message;

/// A group of messages believed to share the same wire format, plus the
/// layout inferred for them so far.
///
/// `orig_messages` and `dedup_messages` are `None` until `Deduplicator`
/// (spec §4.9) runs; at that point `orig_messages` snapshots what `messages`
/// held beforehand and `dedup_messages` snapshots the deduplicated result,
/// which is also what `messages` itself is replaced with.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub layout: FieldLayout,
    pub messages: Vec<Message>,
    pub orig_messages: Option<Vec<Message>>,
    pub dedup_messages: Option<Vec<Message>>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, layout: FieldLayout, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            layout,
            messages,
            orig_messages: None,
            dedup_messages: None,
        }
    }

    pub fn shortest_message_len(&self) -> usize {
        self.messages.iter().map(|m| m.data.len()).min().unwrap_or(0)
    }

    pub fn longest_message_len(&self) -> usize {
        self.messages.iter().map(|m| m.data.len()).max().unwrap_or(0)
    }

    /// Records `messages` as the pre-dedup snapshot (if not already taken —
    /// re-running the stage should not overwrite the original sample) and
    /// installs `deduped` as both `messages` and the dedup snapshot.
    pub fn mark_deduplicated(&mut self, deduped: Vec<Message>) {
        if self.orig_messages.is_none() {
            self.orig_messages = Some(self.messages.clone());
        }
        self.dedup_messages = Some(deduped.clone());
        self.messages = deduped;
    }
}

/// A set of symbols produced by one run of `TypeClusterer` over a single
/// address bucket.
pub type Cluster = Vec<Symbol>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Field;

    fn msg(bytes: &[u8]) -> Message {
        Message::new(bytes.to_vec(), 0)
    }

    #[test]
    fn tracks_shortest_and_longest_message_lengths() {
        let layout = FieldLayout::new(vec![Field::new("Field", 0, 10)]);
        let symbol = Symbol::new("Symbol_0", layout, vec![msg(&[1, 2, 3]), msg(&[1, 2, 3, 4, 5])]);
        assert_eq!(symbol.shortest_message_len(), 3);
        assert_eq!(symbol.longest_message_len(), 5);
        assert_eq!(symbol.orig_messages, None);
        assert_eq!(symbol.dedup_messages, None);
    }

    #[test]
    fn mark_deduplicated_snapshots_original_and_deduped_messages() {
        let layout = FieldLayout::new(vec![Field::fixed("Address", 2)]);
        let mut symbol = Symbol::new("Symbol_0", layout, vec![msg(&[1, 2]), msg(&[1, 2])]);
        symbol.mark_deduplicated(vec![msg(&[1, 2])]);
        assert_eq!(symbol.orig_messages.as_ref().unwrap().len(), 2);
        assert_eq!(symbol.dedup_messages.as_ref().unwrap().len(), 1);
        assert_eq!(symbol.messages.len(), 1);
    }
}
