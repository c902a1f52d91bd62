//! Packet importer and payload stripper (spec §1.1): the two "external
//! collaborator" pieces spec.md deliberately leaves out of the inference
//! core. Neither crate feeds anything back into the pipeline except a flat
//! `Vec<Message>` per trace — the pipeline crates never know a pcap file or
//! an upper-layer protocol exists.

pub mod importer;
pub mod payload;

pub use importer::{import_traces, ImportError, Trace};
pub use payload::{strip_payloads, PayloadStripperConfig};
