//! I/O: compression-transparent line streams and storage interfaces.

pub mod blob;
pub mod compression;
pub mod lines;
