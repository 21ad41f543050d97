//! Script oracle interface and the reference Ed25519 implementation.
//!
//! The ledger never interprets locking scripts itself; it consults a
//! [`ScriptOracle`] for signature verification and sigop counting. The
//! reference oracle understands two script forms:
//!
//! - **Pay-to-pubkey**: the locking script is the raw 32-byte Ed25519
//!   public key; the unlocking script is a 64-byte signature over the
//!   transaction sighash.
//! - **Pay-to-script-hash**: the locking script is [`P2SH_TAG`] followed by
//!   the BLAKE3 hash of a redeem script; the unlocking script is the
//!   64-byte signature followed by the redeem script (itself pay-to-pubkey).
//!
//! Also hosts the canonical block-height serialization that every coinbase
//! unlocking script must begin with.

use crate::crypto;
use crate::types::Transaction;

/// No optional verification behavior.
pub const SCRIPT_VERIFY_NONE: u32 = 0;
/// Evaluate pay-to-script-hash redemption.
pub const SCRIPT_VERIFY_P2SH: u32 = 1 << 0;

/// Tag byte introducing a pay-to-script-hash locking script.
pub const P2SH_TAG: u8 = 0x05;

const PUBKEY_LEN: usize = 32;
const SIG_LEN: usize = 64;

/// Signature verification and sigop counting, consumed by block connection.
///
/// Implementations must be deterministic: consensus depends on every node
/// reaching the same verdict for the same inputs.
pub trait ScriptOracle: Send + Sync {
    /// Verify that `script_sig` satisfies `script_pubkey` for the given
    /// input of `tx`.
    fn verify(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        tx: &Transaction,
        input_index: usize,
        flags: u32,
    ) -> bool;

    /// Count the signature operations a script performs.
    ///
    /// With [`SCRIPT_VERIFY_P2SH`] set, an unlocking script carrying a
    /// redeem script also counts the redeem script's operations.
    fn sig_op_count(&self, script: &[u8], flags: u32) -> u32;

    /// Whether a locking script is pay-to-script-hash.
    fn is_pay_to_script_hash(&self, script: &[u8]) -> bool;
}

/// The reference oracle: Ed25519 pay-to-pubkey and BLAKE3 pay-to-script-hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Oracle;

impl ScriptOracle for Ed25519Oracle {
    fn verify(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        tx: &Transaction,
        input_index: usize,
        flags: u32,
    ) -> bool {
        if script_pubkey.len() == PUBKEY_LEN {
            return crypto::verify_transaction_input(tx, input_index, script_pubkey).is_ok();
        }

        if self.is_pay_to_script_hash(script_pubkey) {
            if flags & SCRIPT_VERIFY_P2SH == 0 {
                return false;
            }
            if script_sig.len() != SIG_LEN + PUBKEY_LEN {
                return false;
            }
            let redeem = &script_sig[SIG_LEN..];
            let redeem_hash: [u8; 32] = blake3::hash(redeem).into();
            if redeem_hash[..] != script_pubkey[1..] {
                return false;
            }
            // Redeem scripts are pay-to-pubkey; the signature still covers
            // the standard sighash.
            let sighash = match crypto::signing_hash(tx, input_index) {
                Ok(h) => h,
                Err(_) => return false,
            };
            let pk = match crypto::PublicKey::from_script(redeem) {
                Ok(pk) => pk,
                Err(_) => return false,
            };
            let sig: [u8; 64] = match script_sig[..SIG_LEN].try_into() {
                Ok(sig) => sig,
                Err(_) => return false,
            };
            return pk.verify(sighash.as_bytes(), &sig).is_ok();
        }

        false
    }

    fn sig_op_count(&self, script: &[u8], flags: u32) -> u32 {
        match script.len() {
            PUBKEY_LEN => 1,
            len if len == SIG_LEN + PUBKEY_LEN && flags & SCRIPT_VERIFY_P2SH != 0 => {
                // Unlocking script carrying a pay-to-pubkey redeem script.
                1
            }
            _ => 0,
        }
    }

    fn is_pay_to_script_hash(&self, script: &[u8]) -> bool {
        script.len() == 1 + PUBKEY_LEN && script[0] == P2SH_TAG
    }
}

/// Build a pay-to-script-hash locking script for a redeem script.
pub fn p2sh_script(redeem: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(1 + PUBKEY_LEN);
    script.push(P2SH_TAG);
    script.extend_from_slice(blake3::hash(redeem).as_bytes());
    script
}

/// Canonical serialization of a block height: minimal little-endian bytes
/// preceded by a one-byte length.
///
/// Every coinbase unlocking script must begin with the serialization of the
/// block's own height, so coinbases at different heights can never collide.
pub fn encode_height(height: u64) -> Vec<u8> {
    let le = height.to_le_bytes();
    let significant = 8 - le.iter().rev().take_while(|b| **b == 0).count();
    let len = significant.max(1);
    let mut out = Vec::with_capacity(1 + len);
    out.push(len as u8);
    out.extend_from_slice(&le[..len]);
    out
}

/// Check that a coinbase unlocking script begins with the canonical
/// serialization of `height`.
pub fn script_starts_with_height(script_sig: &[u8], height: u64) -> bool {
    let prefix = encode_height(height);
    script_sig.starts_with(&prefix)
}
