//! eclipse-container: the `.zip` wrapper around exported backup documents
//!
//! # Overview
//! - `crc32`: table-driven CRC-32 used for the per-entry checksum
//! - `zip`: store-only archive encode/decode (single and multi-entry)
//!
//! Anything that fails to decode reports `InvalidContainer` or
//! `UnsupportedCompression`; callers treat both as "not a container" and fall
//! back to raw JSON.

pub mod crc32;
pub mod zip;

pub use zip::{decode, decode_entries, encode, encode_at, encode_entries, encode_entries_at, ContainerEntry};
