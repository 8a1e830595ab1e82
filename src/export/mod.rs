//! Exporters for decoded records
//!
//! Serde already covers JSON for every record type; the modules here
//! cover the binary interchange formats external analyzer tools expect.

pub mod btsnoop;

pub use btsnoop::{to_btsnoop_bytes, write_btsnoop};
