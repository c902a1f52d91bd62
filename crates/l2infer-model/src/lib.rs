//! Shared data model for the field-inference pipeline: messages, named
//! byte-ranged fields, the mutable field layout every stage edits, and the
//! symbol/cluster aggregates stages produce.
//!
//! Field positions are never stored explicitly — a field's byte offset is
//! always the sum of `max_bytes` of the fields before it in its layout. This
//! avoids the cyclic field/message back-references the tool this pipeline
//! was distilled from relied on.

pub mod field_names {
    //! Reserved field names, stable across the pipeline's external contract.
    pub const ADDRESS: &str = "Address";
    pub const FRAME_TYPE: &str = "Frame_type";
    pub const FIELD: &str = "Field";
    pub const SEQ: &str = "SEQ";
    pub const HIGH_ENTROPY: &str = "High_entropy";
    pub const CHECKSUM_UNKNOWN: &str = "Checksum?";
    pub const CRC32: &str = "crc32";
    pub const ADLER32: &str = "adler32";
}

mod layout;
mod message;
mod reader;
mod symbol;

pub use layout::{Field, FieldLayout, LayoutError};
pub use message::{Message, Metadata, Timestamp};
pub use reader::{read_field_values, VariableFieldError};
pub use symbol::{Cluster, Symbol};
