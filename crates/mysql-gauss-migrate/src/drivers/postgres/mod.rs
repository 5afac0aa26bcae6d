//! GaussDB target driver over the PostgreSQL wire protocol.
//!
//! - [`GaussWriter`]: metadata, transactions and batched inserts
//! - `encode`: binary parameter encoding of row values

mod encode;
mod writer;

pub use writer::GaussWriter;
