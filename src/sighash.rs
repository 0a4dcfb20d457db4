//! Legacy (pre-segwit) signature hash

use crate::constants::SIGHASH_ALL;
use crate::error::{HashLockError, Result};
use crate::hash::sha256d;
use crate::transaction::serialize_transaction;
use crate::types::{Hash, Transaction};

/// Digest a signature for input `input_index` commits to.
///
/// All scriptSigs are blanked, the signed input's is replaced with
/// `script_code` (the redeem script for a P2SH spend), and the 4-byte
/// sighash type is appended before double SHA256. Only `SIGHASH_ALL` is
/// supported.
pub fn legacy_signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: u32,
) -> Result<Hash> {
    if input_index >= tx.inputs.len() {
        return Err(HashLockError::InvalidTransaction(format!(
            "input index {} out of range for {} inputs",
            input_index,
            tx.inputs.len()
        )));
    }
    if sighash_type != SIGHASH_ALL {
        return Err(HashLockError::InvalidSignature(format!(
            "unsupported sighash type {:#04x}",
            sighash_type
        )));
    }

    let mut copy = tx.clone();
    for (i, input) in copy.inputs.iter_mut().enumerate() {
        input.script_sig = if i == input_index {
            script_code.to_vec()
        } else {
            Vec::new()
        };
    }

    let mut data = serialize_transaction(&copy);
    data.extend_from_slice(&sighash_type.to_le_bytes());
    Ok(sha256d(&data))
}
