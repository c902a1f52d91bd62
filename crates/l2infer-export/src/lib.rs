//! Report exporters (spec §1.1, §6): three read-only renderers of the final
//! `Vec<Symbol>` a pipeline run produces. None of these mutate a symbol's
//! layout or message set; they only ever look at it.

pub mod dissector;
pub mod format;
pub mod fuzz_template;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not create export directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write export file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not serialize export to JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn ensure_dir(dir: &std::path::Path) -> Result<(), ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}
