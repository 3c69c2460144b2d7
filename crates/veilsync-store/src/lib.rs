//! # veilsync-store
//!
//! Persistent state for the veilsync daemon, backed by SQLite.
//!
//! A [`Database`] hands out a short-lived connection per operation and
//! provides typed helpers for the block index, the address and peer
//! directories, and the command queue. Block content lives beside it in a
//! write-once [`BlobDir`]; [`BlockStore`] ties the two together.

pub mod addresses;
pub mod blobs;
pub mod block_store;
pub mod blocks;
pub mod database;
pub mod fields;
pub mod migrations;
pub mod models;
pub mod peers;
pub mod queue;

mod error;

pub use blobs::BlobDir;
pub use block_store::BlockStore;
pub use database::{Database, DATABASE_FILE};
pub use error::{Result, StoreError};
pub use fields::{AddressField, PeerField};
pub use models::*;
