//! File system helpers: atomic writes, metadata, backup directory scans.

pub mod atomic;
pub mod metadata;
pub mod walker;
