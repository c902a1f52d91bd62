use std::collections::BTreeMap;

/// Capture-native timestamp. Carried through the pipeline but never computed
/// with, so there is no reason to pull in a full date/time crate for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub secs: u32,
    pub micros: u32,
}

/// Per-trace context dictionary. A `BTreeMap` rather than a `HashMap` so that
/// key iteration order is deterministic — `ContextCorrelator` joins context
/// key names together to build a field name, and reproducibility (spec'd as
/// a hard law) requires that join to be stable across runs.
pub type Metadata = BTreeMap<String, String>;

/// An immutable-until-deduplication captured message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub data: Vec<u8>,
    pub date: Option<Timestamp>,
    pub metadata: Option<Metadata>,
    pub payload_data: Option<Vec<u8>>,
    pub payload_summary: Option<String>,
    /// Index of the trace (capture file) this message originated from.
    pub trace_origin: usize,
}

impl Message {
    pub fn new(data: Vec<u8>, trace_origin: usize) -> Self {
        assert!(!data.is_empty(), "message data must be non-empty");
        Self {
            data,
            date: None,
            metadata: None,
            payload_data: None,
            payload_summary: None,
            trace_origin,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_date(mut self, date: Timestamp) -> Self {
        self.date = Some(date);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_set_optional_fields() {
        let mut meta = Metadata::new();
        meta.insert("region".into(), "eu".into());
        let msg = Message::new(vec![1, 2, 3], 0)
            .with_metadata(meta.clone())
            .with_date(Timestamp { secs: 10, micros: 5 });
        assert_eq!(msg.metadata, Some(meta));
        assert_eq!(msg.date, Some(Timestamp { secs: 10, micros: 5 }));
        assert_eq!(msg.trace_origin, 0);
    }
}
