//! ContextCorrelator (spec §4.7): looks for byte positions that are
//! constant within every symbol of a same-named bucket but differ in value
//! between symbols, and checks whether that difference lines up with a
//! difference in the per-trace context metadata — naming a field after the
//! metadata keys that explain it.
//!
//! Only meaningful once messages from ≥ 2 traces have been clustered; the
//! caller decides whether to invoke this at all.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use l2infer_model::{Cluster, FieldLayout, Metadata, Symbol};
use l2infer_sequence::entropy_at;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("merging context buckets lost symbols: {input_buckets} buckets in, {output_symbols} symbols out")]
    MergeLoss {
        input_buckets: usize,
        output_symbols: usize,
    },
    #[error(transparent)]
    Layout(#[from] l2infer_model::LayoutError),
}

/// Groups symbols from every cluster by name, derives context-correlated
/// fields for each bucket, and merges same-shaped symbols back into one.
#[instrument(skip(clusters))]
pub fn correlate_context(clusters: Vec<Cluster>) -> Result<Vec<Symbol>, ContextError> {
    let mut buckets: Vec<(String, Vec<Symbol>)> = Vec::new();
    for cluster in clusters {
        for symbol in cluster {
            match buckets.iter_mut().find(|(name, _)| *name == symbol.name) {
                Some((_, syms)) => syms.push(symbol),
                None => buckets.push((symbol.name.clone(), vec![symbol])),
            }
        }
    }
    let input_buckets = buckets.len();

    let mut result = Vec::new();
    for (_, sym_list) in buckets {
        if sym_list.iter().all(|s| s.messages.len() < 2) {
            debug!("bucket lacks any symbol with 2+ messages, skipping context correlation");
            result.extend(merge_symbols(sym_list));
            continue;
        }

        let entropy_lists: Vec<Vec<f64>> = sym_list
            .iter()
            .map(|sym| {
                if sym.messages.len() == 1 {
                    vec![0.0; sym.messages[0].data.len()]
                } else {
                    let raw: Vec<Vec<u8>> = sym.messages.iter().map(|m| m.data.clone()).collect();
                    let len = raw.iter().map(|m| m.len()).max().unwrap_or(0);
                    (0..len).map(|i| entropy_at(&raw, i)).collect()
                }
            })
            .collect();

        let scan_len = entropy_lists.iter().map(|e| e.len()).min().unwrap_or(0);
        let mut feature_per_position: BTreeMap<usize, (usize, String)> = BTreeMap::new();

        for i in 0..scan_len {
            let all_zero = entropy_lists.iter().all(|e| e[i] == 0.0);
            if !all_zero {
                continue;
            }

            // value at position i -> metadata of every first-message that has it,
            // in order of first appearance.
            let mut vals: Vec<(u8, Vec<Metadata>)> = Vec::new();
            for sym in &sym_list {
                let first = &sym.messages[0];
                if first.data.len() <= i {
                    break;
                }
                let val = first.data[i];
                let meta = first.metadata.clone().unwrap_or_default();
                match vals.iter_mut().find(|(v, _)| *v == val) {
                    Some((_, metas)) => metas.push(meta),
                    None => vals.push((val, vec![meta])),
                }
            }

            if vals.len() <= 1 {
                continue;
            }

            let fixed_context: Vec<(u8, Metadata)> = vals
                .into_iter()
                .map(|(val, metas)| (val, intersect_all(&metas)))
                .collect();

            // Mirrors the reference implementation's sequential fold exactly:
            // only adjacent fixed contexts are diffed, and an empty fixed
            // context resets the chain (treated the same as "no previous
            // value yet") rather than diffing against it.
            let mut context_changes: BTreeSet<String> = BTreeSet::new();
            let mut prev: Option<&Metadata> = None;
            for (_, meta) in &fixed_context {
                if let Some(prev_meta) = prev {
                    if !prev_meta.is_empty() {
                        for (key, prev_val) in prev_meta {
                            if let Some(curr_val) = meta.get(key) {
                                if curr_val != prev_val {
                                    context_changes.insert(key.clone());
                                }
                            }
                        }
                    }
                }
                prev = Some(meta);
            }

            if !context_changes.is_empty() {
                let name = context_changes.into_iter().collect::<Vec<_>>().join(":");
                feature_per_position.insert(i, (1, name));
            }
        }

        let merged = merge_symbols(sym_list);
        for mut symbol in merged {
            if !feature_per_position.is_empty() {
                let shortest = symbol.shortest_message_len();
                symbol.layout.insert_many(&feature_per_position, shortest)?;
            }
            result.push(symbol);
        }
    }

    if input_buckets > result.len() {
        return Err(ContextError::MergeLoss {
            input_buckets,
            output_symbols: result.len(),
        });
    }

    Ok(result)
}

/// Intersection (matching key *and* value) of every metadata map in `metas`,
/// folded left to right — equivalent to the full intersection regardless of
/// fold order since set intersection is associative.
fn intersect_all(metas: &[Metadata]) -> Metadata {
    let mut iter = metas.iter();
    let Some(first) = iter.next() else {
        return Metadata::new();
    };
    let mut acc = first.clone();
    for meta in iter {
        acc.retain(|k, v| meta.get(k) == Some(v));
    }
    acc
}

/// Merges symbols sharing a bucket when their layouts are similar to the
/// bucket's first symbol; otherwise keeps them apart, suffixing the name.
///
/// Comparisons are always against the bucket's first symbol (not the
/// previous one), so a run of [A, B, C] where B differs from A but C
/// happens to match A again still produces two groups, not three.
fn merge_symbols(sym_list: Vec<Symbol>) -> Vec<Symbol> {
    let mut merged: Vec<Symbol> = Vec::new();
    let mut suffix = 1usize;

    for symbol in sym_list {
        if merged.is_empty() {
            merged.push(symbol);
            continue;
        }
        if fields_are_similar(&merged[0].layout, &symbol.layout) && merged[0].name == symbol.name {
            merged[0].messages.extend(symbol.messages);
        } else {
            warn!(
                bucket = %symbol.name,
                "symbols from different traces did not share a layout; keeping both"
            );
            let mut renamed = symbol;
            renamed.name = format!("{}-{}", renamed.name, suffix);
            suffix += 1;
            merged.push(renamed);
        }
    }

    merged
}

fn fields_are_similar(a: &FieldLayout, b: &FieldLayout) -> bool {
    let fields_a = a.fields();
    let fields_b = b.fields();
    if fields_a.len() != fields_b.len() {
        return false;
    }
    let last = fields_a.len();
    for (idx, (fa, fb)) in fields_a.iter().zip(fields_b.iter()).enumerate() {
        let equal_size = fa.min_bytes == fb.min_bytes && fa.max_bytes == fb.max_bytes;
        if !equal_size && idx + 1 < last {
            return false;
        }
    }
    true
}
