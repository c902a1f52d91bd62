//! Wireshark dissector export (spec §1.1): a best-effort Lua dissector
//! skeleton, one `ProtoField` per named field, dispatching on the
//! `Frame_type` byte value baked into each symbol's name.
//!
//! `original_source/src/exportFunctions.py: exportWiresharkDissector`
//! delegates this to netzob's dissector generator; this workspace has no
//! netzob equivalent, so the Lua source is emitted directly here instead.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use l2infer_model::Symbol;

use crate::{ensure_dir, ExportError};

pub fn write(
    symbols: &[Symbol],
    protocol_name: &str,
    out_dir: &Path,
    filename: &str,
) -> Result<PathBuf, ExportError> {
    ensure_dir(out_dir)?;
    let path = out_dir.join(filename);
    let rendered = render(symbols, protocol_name);
    std::fs::write(&path, rendered).map_err(|source| ExportError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

pub fn render(symbols: &[Symbol], protocol_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "-- Auto-generated dissector for {protocol_name}");
    let _ = writeln!(out, "local p = Proto(\"{protocol_name}\", \"{protocol_name}\")");
    let _ = writeln!(out);

    let mut field_decls: Vec<(String, String)> = Vec::new();
    for symbol in symbols {
        for (i, field) in symbol.layout.fields().iter().enumerate() {
            let lua_name = lua_field_name(&symbol.name, i, &field.name);
            let ftype = lua_field_type(field.max_bytes);
            field_decls.push((lua_name, ftype));
        }
    }
    field_decls.sort();
    field_decls.dedup();
    for (name, ftype) in &field_decls {
        let _ = writeln!(out, "p.fields.{name} = ProtoField.{ftype}(\"{protocol_name}.{name}\", \"{name}\")");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "function p.dissector(buffer, pinfo, tree)");
    let _ = writeln!(out, "  local subtree = tree:add(p, buffer())");
    let _ = writeln!(out, "  pinfo.cols.protocol = \"{protocol_name}\"");
    let _ = writeln!(out, "  local frame_type = nil");
    let _ = writeln!(
        out,
        "  if buffer:len() >= 1 then frame_type = buffer(0,1):uint() end"
    );
    let _ = writeln!(out);

    for symbol in symbols {
        let Some(frame_type_hex) = frame_type_suffix(&symbol.name) else {
            continue;
        };
        let _ = writeln!(out, "  if frame_type == 0x{frame_type_hex} then");
        let mut offset = 0usize;
        for (i, field) in symbol.layout.fields().iter().enumerate() {
            let lua_name = lua_field_name(&symbol.name, i, &field.name);
            let _ = writeln!(
                out,
                "    subtree:add(p.fields.{lua_name}, buffer({offset}, {}))",
                field.max_bytes.max(1)
            );
            offset += field.max_bytes;
        }
        let _ = writeln!(out, "  end");
    }

    let _ = writeln!(out, "end");
    let _ = writeln!(out);
    let _ = writeln!(out, "-- register with a placeholder port; adjust to taste");
    let _ = writeln!(out, "local wtap_encap_table = DissectorTable.get(\"wtap_encap\")");
    let _ = writeln!(out, "if wtap_encap_table then");
    let _ = writeln!(
        out,
        "  wtap_encap_table:add(wtap.USER0, p)"
    );
    let _ = writeln!(out, "end");

    out
}

fn lua_field_name(symbol_name: &str, index: usize, field_name: &str) -> String {
    let sanitized: String = field_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}_{}", sanitize(symbol_name), index, sanitized.to_lowercase())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

fn lua_field_type(width: usize) -> &'static str {
    match width {
        0 | 1 => "uint8",
        2 => "uint16",
        3 | 4 => "uint32",
        _ => "bytes",
    }
}

/// Extracts the hex suffix from a `Symbol_<hex>`-shaped name, if any.
fn frame_type_suffix(symbol_name: &str) -> Option<&str> {
    symbol_name
        .strip_prefix(&format!("{}_", "Symbol"))
        .filter(|rest| rest.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2infer_model::{field_names, Field, FieldLayout, Message};

    #[test]
    fn renders_protofields_for_every_field() {
        let layout = FieldLayout::new(vec![
            Field::fixed(field_names::FRAME_TYPE, 1),
            Field::fixed(field_names::ADDRESS, 6),
        ]);
        let symbol = Symbol::new("Symbol_01", layout, vec![Message::new(vec![1; 7], 0)]);
        let rendered = render(&[symbol], "l2infer");
        assert!(rendered.contains("ProtoField.uint8"));
        assert!(rendered.contains("frame_type == 0x01"));
    }

    #[test]
    fn symbols_without_a_hex_suffix_get_no_dispatch_branch() {
        let layout = FieldLayout::new(vec![Field::fixed(field_names::ADDRESS, 4)]);
        let symbol = Symbol::new("Symbol", layout, vec![Message::new(vec![1; 4], 0)]);
        let rendered = render(&[symbol], "l2infer");
        assert!(!rendered.contains("frame_type =="));
    }
}
