//! # ebb-consensus: Chain trust scoring and stake modifier computation.
//!
//! Pure consensus arithmetic over facts supplied by the chain layer:
//! per-block trust contributions ([`trust`]), stake modifier generation
//! and checksums ([`modifier`]), and checkpoint pinning ([`checkpoint`]).
//! Nothing here touches storage; callers pass ancestor facts and
//! candidate lists explicitly.

pub mod checkpoint;
pub mod modifier;
pub mod trust;

pub use modifier::{compute_next_modifier, entropy_bit, kernel_hash, modifier_checksum};
pub use trust::{AncestorFacts, block_trust};
