//! Human-readable protocol format export (spec §1.1), the equivalent of
//! `original_source/src/exportFunctions.py: exportPF`: one plain-text block
//! per symbol naming its fields and message counts.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use l2infer_model::Symbol;

use crate::{ensure_dir, ExportError};

/// Renders `symbols` as plain text and writes it to `<out_dir>/<filename>`,
/// creating `out_dir` if necessary. Returns the path written.
pub fn write(symbols: &[Symbol], out_dir: &Path, filename: &str) -> Result<PathBuf, ExportError> {
    ensure_dir(out_dir)?;
    let path = out_dir.join(filename);
    let rendered = render(symbols);
    std::fs::write(&path, rendered).map_err(|source| ExportError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Builds the report text without touching the filesystem, so the rendering
/// logic is testable independently of a temp directory.
pub fn render(symbols: &[Symbol]) -> String {
    let mut out = String::from("Protocol Format\n");
    for symbol in symbols {
        let _ = write!(
            out,
            "\n{}: {} unique messages (of {} messages)\n",
            symbol.name,
            symbol.messages.len(),
            symbol
                .orig_messages
                .as_ref()
                .map(|m| m.len())
                .unwrap_or(symbol.messages.len())
        );
        let mut offset = 0usize;
        for field in symbol.layout.fields() {
            if field.is_fixed() {
                let _ = writeln!(
                    out,
                    "  [{offset:>4}] {:<16} {} bytes",
                    field.name, field.max_bytes
                );
            } else {
                let _ = writeln!(
                    out,
                    "  [{offset:>4}] {:<16} {}..{} bytes",
                    field.name, field.min_bytes, field.max_bytes
                );
            }
            offset += field.max_bytes;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2infer_model::{field_names, Field, FieldLayout, Message};

    #[test]
    fn renders_symbol_name_and_field_table() {
        let layout = FieldLayout::new(vec![
            Field::fixed(field_names::ADDRESS, 6),
            Field::new(field_names::FIELD, 0, 4),
        ]);
        let symbol = Symbol::new(
            "Symbol_01",
            layout,
            vec![Message::new(vec![0; 10], 0), Message::new(vec![0; 10], 0)],
        );
        let rendered = render(&[symbol]);
        assert!(rendered.contains("Symbol_01: 2 unique messages"));
        assert!(rendered.contains("Address"));
        assert!(rendered.contains("0..4 bytes"));
    }

    #[test]
    fn write_creates_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("reports");
        let layout = FieldLayout::new(vec![Field::fixed(field_names::ADDRESS, 4)]);
        let symbol = Symbol::new("Symbol_01", layout, vec![Message::new(vec![0; 4], 0)]);
        let path = write(&[symbol], &out_dir, "protocol_format.txt").unwrap();
        assert!(path.exists());
    }
}
