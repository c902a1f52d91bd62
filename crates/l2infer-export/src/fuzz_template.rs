//! Fuzz template export (spec §1.1): a structured, non-executable fuzzing
//! seed description per symbol, mirroring the `Request(children=(...))`
//! shape `original_source/src/exportFunctions.py: exportFuzz` builds for
//! `boofuzz`. Emitted as JSON rather than Python source, since `boofuzz`
//! has no Rust equivalent in this workspace's dependency stack.

use std::path::{Path, PathBuf};

use serde::Serialize;

use l2infer_model::{field_names, Symbol};

use crate::{ensure_dir, ExportError};

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FuzzHint {
    /// Constant across every message of the symbol; `boofuzz`'s `Static`.
    Static { default_value: Vec<u8> },
    /// Varies but must not be mutated by the fuzzer (`SEQ`, checksums).
    DoNotFuzz {
        default_value: Vec<u8>,
        field_kind: String,
    },
    /// Free to mutate, optionally bounded to an observed byte length.
    Fuzzable {
        default_value: Vec<u8>,
        min_bytes: usize,
        max_bytes: usize,
    },
}

#[derive(Debug, Serialize)]
pub struct FuzzField {
    pub name: String,
    pub offset: usize,
    pub hint: FuzzHint,
}

#[derive(Debug, Serialize)]
pub struct FuzzSymbol {
    pub name: String,
    pub fields: Vec<FuzzField>,
}

pub fn write(
    symbols: &[Symbol],
    out_dir: &Path,
    filename: &str,
) -> Result<PathBuf, ExportError> {
    ensure_dir(out_dir)?;
    let path = out_dir.join(filename);
    let templates = build(symbols);
    let json = serde_json::to_string_pretty(&templates)?;
    std::fs::write(&path, json).map_err(|source| ExportError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

pub fn build(symbols: &[Symbol]) -> Vec<FuzzSymbol> {
    symbols.iter().map(build_one).collect()
}

fn build_one(symbol: &Symbol) -> FuzzSymbol {
    let sample = symbol.messages.first();
    let mut offset = 0usize;
    let mut fields = Vec::with_capacity(symbol.layout.len());

    for field in symbol.layout.fields() {
        let end = (offset + field.max_bytes).min(sample.map(|m| m.data.len()).unwrap_or(0));
        let default_value = sample
            .map(|m| {
                if offset < m.data.len() {
                    m.data[offset..end.max(offset)].to_vec()
                } else {
                    Vec::new()
                }
            })
            .unwrap_or_default();

        let hint = match field.name.as_str() {
            field_names::SEQ | field_names::CRC32 | field_names::ADLER32 | field_names::CHECKSUM_UNKNOWN => {
                FuzzHint::DoNotFuzz {
                    default_value,
                    field_kind: field.name.clone(),
                }
            }
            _ if field.is_fixed() && constant_across_messages(symbol, offset, field.max_bytes) => {
                FuzzHint::Static { default_value }
            }
            _ => FuzzHint::Fuzzable {
                default_value,
                min_bytes: field.min_bytes,
                max_bytes: field.max_bytes,
            },
        };

        fields.push(FuzzField {
            name: field.name.clone(),
            offset,
            hint,
        });
        offset += field.max_bytes;
    }

    FuzzSymbol {
        name: symbol.name.clone(),
        fields,
    }
}

fn constant_across_messages(symbol: &Symbol, offset: usize, width: usize) -> bool {
    let mut values = symbol.messages.iter().filter_map(|m| {
        let end = offset + width;
        if m.data.len() >= end {
            Some(&m.data[offset..end])
        } else {
            None
        }
    });
    let Some(first) = values.next() else {
        return false;
    };
    values.all(|v| v == first)
}
