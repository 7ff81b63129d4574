//! File-level context: what to index, how to fingerprint it, how to split it

pub mod files;
