//! `l2infer` entrypoint: wires the importer, payload stripper, the seven
//! inference stages, and the report exporters into one run, following the
//! shape of `original_source/src/l2pre.py: main`.

use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use tracing_appender::non_blocking::WorkerGuard;

use l2infer_import::{ImportError, PayloadStripperConfig};
use l2infer_model::{Message, Symbol};

/// Layer 2 Protocol Reverse Engineering.
#[derive(Parser, Debug)]
#[command(name = "l2infer", version, about = "Reverse-engineer an unknown layer-2 wire format from packet traces")]
struct Args {
    /// pcap/pcapng files with network traffic to analyze.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Do not look for Ethernet encapsulation while stripping payloads; use
    /// for traces of a layer-2 protocol that itself replaces Ethernet.
    #[arg(long = "no-tunnel", default_value_t = false)]
    no_tunnel: bool,

    /// Write the human-readable protocol format report. Takes the output
    /// directory, or the configured default export directory if omitted.
    #[arg(long = "export-format", num_args = 0..=1, default_missing_value = "")]
    export_format: Option<PathBuf>,

    /// Write a Wireshark Lua dissector skeleton. Takes the output directory,
    /// or the configured default export directory if omitted.
    #[arg(long = "export-dissector", num_args = 0..=1, default_missing_value = "")]
    export_dissector: Option<PathBuf>,

    /// Write a structured fuzz seed template (JSON). Takes the output
    /// directory, or the configured default export directory if omitted.
    #[arg(long = "export-fuzz", num_args = 0..=1, default_missing_value = "")]
    export_fuzz: Option<PathBuf>,

    /// Override discovery of `l2infer.toml`.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Override the payload stripper's per-trace message sample size.
    #[arg(long = "payload-candidate-sample")]
    payload_candidate_sample: Option<usize>,
}

#[derive(Debug, Error)]
enum TraceError {
    #[error(transparent)]
    NoAddress(#[from] l2infer_address::NoAddressFieldError),
    #[error(transparent)]
    Cluster(#[from] l2infer_cluster::ClusterError),
    #[error(transparent)]
    Sequence(#[from] l2infer_sequence::SequenceError),
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging();
    install_panic_hook();

    info!(target: "runtime", files = args.files.len(), "startup");

    let config = l2infer_config::load(args.config.as_deref())?;

    let traces = import_traces(&args.files)?;
    info!(target: "import", usable_traces = traces.len(), "import complete");

    let payload_config = PayloadStripperConfig {
        sample_size: args
            .payload_candidate_sample
            .unwrap_or(config.payload().candidate_sample_size),
        omit_ethernet: args.no_tunnel,
    };

    let clusters: Vec<Vec<Symbol>> = traces
        .into_par_iter()
        .enumerate()
        .filter_map(|(trace_index, messages)| {
            let stripped = l2infer_import::strip_payloads(messages, &payload_config);
            match run_trace_pipeline(stripped) {
                Ok(cluster) => Some(cluster),
                Err(e) => {
                    warn!(target: "inference", trace_index, error = %e, "skipping trace: inference failed");
                    None
                }
            }
        })
        .collect();

    if clusters.is_empty() {
        anyhow::bail!("inference failed for every trace; nothing to report");
    }

    let multi_trace = clusters.len() >= 2;
    let mut symbols: Vec<Symbol> = if multi_trace {
        info!(target: "context", clusters = clusters.len(), "correlating context across traces");
        l2infer_context::correlate_context(clusters).context("context correlation failed")?
    } else {
        clusters.into_iter().flatten().collect()
    };

    symbols = symbols
        .into_par_iter()
        .map(|symbol| {
            let symbol = l2infer_finalize::normalise_layout(symbol);
            l2infer_finalize::deduplicate(symbol)
        })
        .collect();

    symbols.sort_by(|a, b| a.name.cmp(&b.name));

    print_summary(&symbols);

    run_exports(&args, &config, &symbols)?;

    Ok(())
}

/// Resolves an export flag to an output directory: the path given on the
/// command line, or the config's default export directory when the flag
/// was present with no value (`default_missing_value = ""`).
fn resolve_export_dir<'a>(flag: &'a Option<PathBuf>, config: &'a l2infer_config::Config) -> Option<&'a Path> {
    flag.as_ref().map(|dir| {
        if dir.as_os_str().is_empty() {
            config.export().default_dir.as_path()
        } else {
            dir.as_path()
        }
    })
}

/// Imports every capture file, logging and discarding per-file failures
/// (spec §7: import errors are per-trace, not fatal to the run unless they
/// leave zero usable traces).
fn import_traces(files: &[PathBuf]) -> Result<Vec<Vec<Message>>> {
    let results = l2infer_import::import_traces(files);
    let mut traces = Vec::with_capacity(results.len());
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(trace) => traces.push(trace.messages),
            Err(ImportError::Empty { .. }) => {
                warn!(target: "import", path = %path.display(), "capture file contained no frames, skipping");
            }
            Err(e) => {
                warn!(target: "import", path = %path.display(), error = %e, "failed to import capture file, skipping");
            }
        }
    }
    if traces.is_empty() {
        anyhow::bail!("no capture file could be imported; nothing to analyze");
    }
    Ok(traces)
}

/// Runs AddressFinder, TypeClusterer, SequenceDetector, and
/// ChecksumClassifier over one trace's messages (spec §2, stages 1-4).
#[instrument(skip(messages), fields(message_count = messages.len()))]
fn run_trace_pipeline(messages: Vec<Message>) -> Result<Vec<Symbol>, TraceError> {
    let root = l2infer_address::find_addresses(messages)?;
    let children = l2infer_cluster::cluster_by_frame_type(root)?;

    children
        .into_iter()
        .map(|symbol| {
            let symbol = l2infer_sequence::detect_sequences(symbol)?;
            Ok(l2infer_checksum::classify_checksum(symbol))
        })
        .collect()
}

fn print_summary(symbols: &[Symbol]) {
    for symbol in symbols {
        let orig_count = symbol
            .orig_messages
            .as_ref()
            .map(|m| m.len())
            .unwrap_or(symbol.messages.len());
        println!(
            "{}: {} unique messages (of {} messages)",
            symbol.name,
            symbol.messages.len(),
            orig_count
        );
        for field in symbol.layout.fields() {
            if field.is_fixed() {
                println!("  {:<16} {} bytes", field.name, field.max_bytes);
            } else {
                println!(
                    "  {:<16} {}..{} bytes",
                    field.name, field.min_bytes, field.max_bytes
                );
            }
        }
    }
}

fn run_exports(args: &Args, config: &l2infer_config::Config, symbols: &[Symbol]) -> Result<()> {
    if let Some(dir) = resolve_export_dir(&args.export_format, config) {
        let path = l2infer_export::format::write(symbols, dir, "protocol_format.txt")
            .context("exporting protocol format")?;
        info!(target: "export", path = %path.display(), "wrote protocol format report");
    }
    if let Some(dir) = resolve_export_dir(&args.export_dissector, config) {
        let path = l2infer_export::dissector::write(symbols, "l2infer", dir, "dissector.lua")
            .context("exporting wireshark dissector")?;
        info!(target: "export", path = %path.display(), "wrote wireshark dissector");
    }
    if let Some(dir) = resolve_export_dir(&args.export_fuzz, config) {
        let path = l2infer_export::fuzz_template::write(symbols, dir, "fuzz_template.json")
            .context("exporting fuzz template")?;
        info!(target: "export", path = %path.display(), "wrote fuzz template");
    }
    Ok(())
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("l2infer.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "l2infer.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_err) => {
            // A global subscriber is already installed (e.g. under test harnesses).
            None
        }
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2infer_model::Message;

    /// Same 6-byte address value recurring at two non-overlapping offsets
    /// (0 and 6, Ethernet-style dst/src), with no leading residual field —
    /// AddressFinder needs the candidate to occur at 2-4 distinct offsets
    /// (spec §4.2), which a single occurrence at offset 0 cannot satisfy.
    /// This also leaves TypeClusterer's "first unnamed field" as the
    /// trailing variable-size residual, exercising the case where the
    /// clustering key itself (not just its predecessors) has no fixed width.
    fn addressed_messages(count: usize) -> Vec<Message> {
        let addr = [0xAAu8, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        (0..count)
            .map(|_| {
                let mut data = addr.to_vec();
                data.extend_from_slice(&addr);
                data.extend_from_slice(&[0x11, 0x22, 0x33]);
                Message::new(data, 0)
            })
            .collect()
    }

    #[test]
    fn single_trace_pipeline_produces_a_symbol_with_an_address_field() {
        let symbols = run_trace_pipeline(addressed_messages(60)).unwrap();
        assert!(!symbols.is_empty());
        assert!(symbols[0]
            .layout
            .fields()
            .iter()
            .any(|f| f.name == l2infer_model::field_names::ADDRESS));
    }

    #[test]
    fn pipeline_fails_on_messages_with_no_recurring_pattern() {
        let messages = vec![Message::new(vec![1, 2, 3], 0), Message::new(vec![4, 5, 6], 0)];
        assert!(run_trace_pipeline(messages).is_err());
    }
}
