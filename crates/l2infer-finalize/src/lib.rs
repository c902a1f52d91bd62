//! LayoutNormaliser and Deduplicator (spec §4.8, §4.9) — the two stages that
//! close out the pipeline for a finished symbol: reconciling its layout's
//! cumulative size with its own observed message lengths, then collapsing
//! messages that differ only in mutable fields.

mod deduplicator;
mod layout_normaliser;

pub use deduplicator::deduplicate;
pub use layout_normaliser::normalise_layout;
