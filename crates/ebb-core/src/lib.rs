//! # ebb-core
//! Foundation types and consensus primitives for the Ebb protocol.

pub mod block_validation;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod genesis;
pub mod merkle;
pub mod reward;
pub mod script;
pub mod types;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
