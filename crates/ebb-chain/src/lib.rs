//! # ebb-chain: Block index, UTXO ledger, fork choice, and storage.
//!
//! Composes the persistent side of the Ebb ledger:
//! - [`chain::Chain`]: block acceptance, fork choice, reorganization
//! - [`ledger::Ledger`]: UTXO connection and disconnection
//! - [`index::BlockIndex`]: the in-memory block tree over the store
//! - [`store`]: the [`store::ChainDb`] table abstraction with RocksDB
//!   and in-memory backends
//! - [`blockfile::BlockFile`]: append-only block body storage
//! - [`orphans::OrphanPool`] / [`mempool::Mempool`]: blocks waiting on
//!   parents, transactions waiting on blocks
//! - [`config::LedgerConfig`]: data directory layout

pub mod blockfile;
pub mod chain;
pub mod config;
pub mod entry;
pub mod index;
pub mod ledger;
pub mod mempool;
pub mod orphans;
pub mod store;

pub use chain::{Chain, ProcessOutcome};
pub use config::LedgerConfig;
pub use entry::{ChainState, IndexEntry};
pub use ledger::Ledger;
pub use store::{ChainDb, MemoryDb, RocksDb};
