//! SequenceDetector (spec §4.5): finds 1- and 2-byte counters that increment
//! per sender, by correlating each byte position against its neighbours
//! across consecutive messages from the same address.

mod entropy;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, instrument};

use l2infer_model::{field_names, read_field_values, Symbol, VariableFieldError};

pub use entropy::entropy_at;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error(transparent)]
    VariableField(#[from] VariableFieldError),
    #[error(transparent)]
    Layout(#[from] l2infer_model::LayoutError),
}

const MIN_MESSAGES: usize = 50;
/// High-entropy threshold, in bits/byte, above which a non-sequence
/// position is flagged for the checksum classifier to examine.
const HIGH_ENTROPY_THRESHOLD: f64 = 7.0;

#[derive(Default)]
struct PositionStats {
    eq_prev_count: usize,
    less_prev_count: usize,
    left_is_msb: bool,
    left_is_lsb: bool,
    right_is_msb: bool,
    right_is_lsb: bool,
}

impl PositionStats {
    fn new() -> Self {
        Self {
            eq_prev_count: 0,
            less_prev_count: 0,
            left_is_msb: true,
            left_is_lsb: true,
            right_is_msb: true,
            right_is_lsb: true,
        }
    }
}

/// Runs sequence detection over `symbol`, scheduling `SEQ` and
/// `High_entropy` fields and applying them via `FieldLayout::insert_many`.
///
/// Returns the symbol unchanged, without error, if it has no `Address`
/// field or fewer than 50 messages — this is the spec's non-fatal
/// precondition skip, not a failure.
#[instrument(skip(symbol), fields(symbol = %symbol.name))]
pub fn detect_sequences(mut symbol: Symbol) -> Result<Symbol, SequenceError> {
    let addr_indices: Vec<usize> = symbol
        .layout
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name == field_names::ADDRESS)
        .map(|(i, _)| i)
        .collect();

    if addr_indices.is_empty() || symbol.messages.len() < MIN_MESSAGES {
        debug!(
            address_fields = addr_indices.len(),
            messages = symbol.messages.len(),
            "skipping sequence detection: too few messages or no address field"
        );
        return Ok(symbol);
    }

    let sender_field_index = if addr_indices.len() == 1 {
        addr_indices[0]
    } else {
        addr_indices[1]
    };

    let sender_values = read_field_values(&symbol.layout, &symbol.messages, sender_field_index)?;
    let src_addrs: BTreeSet<&Vec<u8>> = sender_values.iter().collect();

    let raw_messages: Vec<&[u8]> = symbol.messages.iter().map(|m| m.data.as_slice()).collect();
    let max_len = raw_messages.iter().map(|m| m.len()).max().unwrap_or(0);
    let total_messages = symbol.messages.len();

    let mut to_insert: BTreeMap<usize, (usize, String)> = BTreeMap::new();
    let mut skip_next = false;

    let mut pos = 1usize;
    while pos < max_len {
        if skip_next {
            skip_next = false;
            pos += 1;
            continue;
        }

        let mut stats = PositionStats::new();

        for src in &src_addrs {
            let mut prev: Option<(u8, u8, u8)> = None;
            for (i, val) in sender_values.iter().enumerate() {
                if val != *src {
                    continue;
                }
                let data = raw_messages[i];
                if pos >= data.len() {
                    break;
                }
                let l = data[pos - 1];
                let b = data[pos];
                let r = data.get(pos + 1).copied().unwrap_or(0);

                let Some((l_prev, b_prev, r_prev)) = prev else {
                    prev = Some((l, b, r));
                    continue;
                };

                use std::cmp::Ordering::*;
                match b.cmp(&b_prev) {
                    Equal => {
                        stats.eq_prev_count += 1;
                        if l < l_prev {
                            stats.left_is_msb = false;
                        }
                        if r < r_prev {
                            stats.right_is_msb = false;
                        }
                    }
                    Greater => {
                        if l >= l_prev {
                            stats.left_is_msb = false;
                        }
                        if r >= r_prev {
                            stats.right_is_msb = false;
                        }
                    }
                    Less => {
                        stats.less_prev_count += 1;
                        if l <= l_prev {
                            stats.left_is_lsb = false;
                        }
                        if r <= r_prev {
                            stats.right_is_lsb = false;
                        }
                    }
                }

                prev = Some((l, b, r));
            }
        }

        let eq = stats.eq_prev_count as f64 / total_messages as f64;
        let lt = stats.less_prev_count as f64 / total_messages as f64;

        if (stats.left_is_msb && eq < 0.95 && lt < 0.1) || (stats.left_is_lsb && eq < 0.25) {
            to_insert.insert(pos - 1, (2, field_names::SEQ.to_string()));
        } else if (stats.right_is_msb && eq < 0.95 && lt < 0.1) || (stats.right_is_lsb && eq < 0.25)
        {
            to_insert.insert(pos, (2, field_names::SEQ.to_string()));
            skip_next = true;
        } else if eq < 0.25 && lt < 0.1 {
            to_insert.insert(pos, (1, field_names::SEQ.to_string()));
        } else {
            let e = entropy_at(
                &symbol.messages.iter().map(|m| m.data.clone()).collect::<Vec<_>>(),
                pos,
            );
            if e > HIGH_ENTROPY_THRESHOLD {
                to_insert.insert(pos, (1, field_names::HIGH_ENTROPY.to_string()));
            }
        }

        pos += 1;
    }

    if !to_insert.is_empty() {
        debug!(scheduled = to_insert.len(), "applying detected sequence fields");
        let shortest = symbol.shortest_message_len();
        symbol.layout.insert_many(&to_insert, shortest)?;
    }

    Ok(symbol)
}
