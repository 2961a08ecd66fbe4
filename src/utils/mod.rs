//! Utilities module aggregator exposing the archive codec and testing helpers.

pub mod archive;
