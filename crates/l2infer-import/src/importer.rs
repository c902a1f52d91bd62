//! Packet importer: reads capture files into a flat per-trace `Vec<Message>`,
//! attaching a sidecar `.yaml` context dictionary when present.
//!
//! Grounded in `original_source/src/utils.py: import_messages`, which wraps
//! netzob's `PCAPImporter`; here that role is played by `pcap-parser`
//! directly, since this workspace has no netzob equivalent.

use std::fs::File;
use std::path::{Path, PathBuf};

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{Block, PcapBlockOwned, PcapError};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use l2infer_model::{Message, Metadata, Timestamp};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse capture file {path}: {source}")]
    Parse { path: PathBuf, source: String },
    #[error("failed to parse sidecar context file {path}: {source}")]
    Context {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("capture file {path} contained no frames")]
    Empty { path: PathBuf },
}

/// One capture file's worth of messages plus the context dictionary shared
/// by every message imported from it (spec §3: "Messages from a single
/// trace share one context dictionary").
pub struct Trace {
    pub messages: Vec<Message>,
    pub context: Option<Metadata>,
}

/// Imports every capture file in `files`. A file is reported as its own
/// `Err` entry at its position in the returned `Vec` rather than aborting
/// the whole batch — the caller decides whether the remaining successes are
/// enough to proceed (spec §7: import failures are per-file, not fatal to
/// the run unless they leave zero usable traces).
#[instrument(skip(files))]
pub fn import_traces(files: &[PathBuf]) -> Vec<Result<Trace, ImportError>> {
    files
        .iter()
        .enumerate()
        .map(|(index, path)| import_one(path, index))
        .collect()
}

fn import_one(path: &Path, trace_index: usize) -> Result<Trace, ImportError> {
    let messages = read_capture(path, trace_index)?;
    if messages.is_empty() {
        return Err(ImportError::Empty {
            path: path.to_path_buf(),
        });
    }

    let context = read_sidecar_context(path)?;
    let messages = match &context {
        Some(ctx) => messages
            .into_iter()
            .map(|m| m.with_metadata(ctx.clone()))
            .collect(),
        None => messages,
    };

    debug!(
        path = %path.display(),
        frames = messages.len(),
        has_context = context.is_some(),
        "imported trace"
    );
    Ok(Trace { messages, context })
}

fn read_capture(path: &Path, trace_index: usize) -> Result<Vec<Message>, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = pcap_parser::create_reader(65536, file).map_err(|e| ImportError::Parse {
        path: path.to_path_buf(),
        source: e.to_string(),
    })?;

    let mut messages = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let Some(message) = block_to_message(block, trace_index) {
                    messages.push(message);
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| ImportError::Parse {
                    path: path.to_path_buf(),
                    source: e.to_string(),
                })?;
            }
            Err(e) => {
                return Err(ImportError::Parse {
                    path: path.to_path_buf(),
                    source: e.to_string(),
                })
            }
        }
    }
    Ok(messages)
}

/// Pulls the captured frame bytes and timestamp out of one block, regardless
/// of whether the file was legacy pcap or pcapng. Blocks that carry no frame
/// (section headers, interface descriptions, statistics, ...) yield `None`.
fn block_to_message(block: PcapBlockOwned, trace_index: usize) -> Option<Message> {
    match block {
        PcapBlockOwned::Legacy(b) => {
            let data = b.data[..(b.caplen as usize).min(b.data.len())].to_vec();
            if data.is_empty() {
                return None;
            }
            let ts = Timestamp {
                secs: b.ts_sec,
                micros: b.ts_usec,
            };
            Some(Message::new(data, trace_index).with_date(ts))
        }
        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
            let data = epb.data[..(epb.caplen as usize).min(epb.data.len())].to_vec();
            if data.is_empty() {
                return None;
            }
            let ts = Timestamp {
                secs: epb.ts_high,
                micros: epb.ts_low,
            };
            Some(Message::new(data, trace_index).with_date(ts))
        }
        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
            let data = spb.data.to_vec();
            if data.is_empty() {
                None
            } else {
                Some(Message::new(data, trace_index))
            }
        }
        _ => None,
    }
}

/// `<capture-file>.yaml`, not `<capture-file-without-extension>.yaml` — the
/// sidecar path appends rather than replaces, matching `isfile(f+'.yaml')`
/// in the reference implementation.
fn read_sidecar_context(path: &Path) -> Result<Option<Metadata>, ImportError> {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(".yaml");
    let sidecar = PathBuf::from(sidecar);
    if !sidecar.is_file() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&sidecar).map_err(|source| ImportError::Open {
        path: sidecar.clone(),
        source,
    })?;
    let context: Metadata =
        serde_yaml::from_str(&contents).map_err(|source| ImportError::Context {
            path: sidecar.clone(),
            source,
        })?;
    if context.is_empty() {
        warn!(path = %sidecar.display(), "sidecar context file parsed but was empty");
        return Ok(None);
    }
    Ok(Some(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_legacy_pcap(path: &Path, frames: &[&[u8]]) {
        let mut f = File::create(path).unwrap();
        // pcap global header: magic, version major/minor, thiszone,
        // sigfigs, snaplen, linktype (Ethernet = 1)
        f.write_all(&0xa1b2c3d4u32.to_le_bytes()).unwrap();
        f.write_all(&2u16.to_le_bytes()).unwrap();
        f.write_all(&4u16.to_le_bytes()).unwrap();
        f.write_all(&0i32.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        f.write_all(&65535u32.to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap();
        for frame in frames {
            f.write_all(&0u32.to_le_bytes()).unwrap(); // ts_sec
            f.write_all(&0u32.to_le_bytes()).unwrap(); // ts_usec
            f.write_all(&(frame.len() as u32).to_le_bytes()).unwrap(); // caplen
            f.write_all(&(frame.len() as u32).to_le_bytes()).unwrap(); // origlen
            f.write_all(frame).unwrap();
        }
    }

    #[test]
    fn imports_frames_from_a_legacy_pcap_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.pcap");
        write_legacy_pcap(&path, &[&[1, 2, 3, 4], &[5, 6, 7, 8]]);

        let results = import_traces(&[path]);
        assert_eq!(results.len(), 1);
        let trace = results.into_iter().next().unwrap().unwrap();
        assert_eq!(trace.messages.len(), 2);
        assert_eq!(trace.messages[0].data, vec![1, 2, 3, 4]);
        assert!(trace.context.is_none());
    }

    #[test]
    fn attaches_sidecar_context_to_every_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.pcap");
        write_legacy_pcap(&path, &[&[1, 2, 3, 4]]);
        let mut sidecar_name = path.as_os_str().to_owned();
        sidecar_name.push(".yaml");
        std::fs::write(sidecar_name, "region: eu\n").unwrap();

        let results = import_traces(&[path]);
        let trace = results.into_iter().next().unwrap().unwrap();
        assert_eq!(
            trace.messages[0].metadata.as_ref().unwrap().get("region"),
            Some(&"eu".to_string())
        );
    }

    #[test]
    fn missing_file_is_reported_without_aborting_other_imports() {
        let missing = PathBuf::from("/nonexistent/trace.pcap");
        let results = import_traces(&[missing]);
        assert!(results[0].is_err());
    }
}
