//! Per-transaction structural validation.
//!
//! Context-free checks on transaction format and internal consistency; no
//! UTXO access required. Contextual input checks (value conservation,
//! maturity, scripts) run during block connection, where the spent outputs
//! are in hand.

use std::collections::HashSet;

use crate::constants::{MAX_COINBASE_DATA, MAX_MONEY, MAX_TX_SIZE};
use crate::error::TransactionError;
use crate::types::Transaction;

/// Validate transaction structure (context-free).
///
/// Checks that apply to every transaction:
/// - Non-empty inputs and outputs
/// - Output values within the money range, individually and in total
/// - Serialized size within [`MAX_TX_SIZE`]
///
/// Coinbase: exactly one null-outpoint input with bounded script data.
/// Coinstake: empty marker first output, at least one real output.
/// Other transactions: no null outpoints, no duplicate input outpoints.
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), TransactionError> {
    // --- Common checks ---

    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }

    let mut total: u64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value > MAX_MONEY {
            return Err(TransactionError::OutputMoneyRange(i));
        }
        total = total
            .checked_add(output.value)
            .ok_or(TransactionError::ValueOverflow)?;
        if total > MAX_MONEY {
            return Err(TransactionError::ValueOverflow);
        }
    }

    let encoded = bincode::encode_to_vec(tx, bincode::config::standard())
        .map_err(|e| TransactionError::Serialization(e.to_string()))?;
    if encoded.len() > MAX_TX_SIZE {
        return Err(TransactionError::OversizedTransaction {
            size: encoded.len(),
            max: MAX_TX_SIZE,
        });
    }

    // --- Type-specific checks ---

    if tx.is_coinbase() {
        validate_coinbase_structure(tx)?;
    } else {
        validate_regular_structure(tx)?;
    }

    Ok(())
}

/// Coinbase-specific structure: one null-outpoint input, bounded data.
fn validate_coinbase_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.len() != 1 {
        return Err(TransactionError::InvalidCoinbase(
            "must have exactly one input".into(),
        ));
    }

    let data_len = tx.inputs[0].script_sig.len();
    if data_len < 2 || data_len > MAX_COINBASE_DATA {
        return Err(TransactionError::InvalidCoinbase(format!(
            "script data length {data_len} outside 2..={MAX_COINBASE_DATA}",
        )));
    }

    Ok(())
}

/// Structure of coinstake and ordinary transactions: real outpoints only,
/// no duplicates, empty outputs only as the coinstake marker.
fn validate_regular_structure(tx: &Transaction) -> Result<(), TransactionError> {
    let mut seen = HashSet::with_capacity(tx.inputs.len());

    for (i, input) in tx.inputs.iter().enumerate() {
        if input.previous_output.is_null() {
            return Err(TransactionError::NullOutpointInRegularTx(i));
        }

        if !seen.insert(&input.previous_output) {
            return Err(TransactionError::DuplicateInput(
                input.previous_output.to_string(),
            ));
        }
    }

    let is_coinstake = tx.is_coinstake();
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.is_empty() && !(is_coinstake && i == 0) {
            return Err(TransactionError::InvalidCoinstake(format!(
                "empty output at index {i} outside coinstake marker position",
            )));
        }
    }

    if is_coinstake && tx.time == 0 {
        return Err(TransactionError::InvalidCoinstake(
            "coinstake requires a timestamp".into(),
        ));
    }

    Ok(())
}
