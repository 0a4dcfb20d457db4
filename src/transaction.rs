//! Transaction assembly and legacy wire serialization
//!
//! Unlocking inputs go in the scriptSig field; nothing is placed in a
//! witness, since the hash-or-signature P2SH template spends through the
//! legacy path.

use serde::{Deserialize, Serialize};

use crate::address::{p2sh_script_hash, Address};
use crate::constants::*;
use crate::error::{HashLockError, Result};
use crate::hash::sha256d;
use crate::types::*;
use crate::unlocking::{InputFinalizer, UnlockingInput};

/// Destination and amount of one output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub script_pubkey: ByteString,
    pub amount: u64,
}

impl Payment {
    pub fn to_address(address: &Address, amount: u64) -> Self {
        Payment {
            script_pubkey: address.script_pubkey(),
            amount,
        }
    }
}

/// Assembly policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    pub version: u32,
    pub lock_time: u32,
    pub sequence: u32,
    /// Reject spends whose implied fee rate exceeds this many sat/vB
    pub max_fee_rate: u64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        AssemblerConfig {
            version: DEFAULT_TX_VERSION,
            lock_time: 0,
            sequence: SEQUENCE_FINAL,
            max_fee_rate: DEFAULT_MAX_FEE_RATE,
        }
    }
}

/// A fully-formed transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledTransaction {
    pub transaction: Transaction,
    pub bytes: ByteString,
    pub txid: Txid,
    pub input_value: u64,
    pub output_value: u64,
}

impl AssembledTransaction {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn fee(&self) -> u64 {
        self.input_value - self.output_value
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Assembler {
    config: AssemblerConfig,
}

impl Assembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Assembler { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Unsigned transaction spending `inputs` into `outputs`.
    ///
    /// Every scriptSig is empty. This is the form signature hashes are
    /// computed over; conservation is already enforced here.
    pub fn draft(&self, inputs: &[UtxoRef], outputs: &[Payment]) -> Result<Transaction> {
        check_amounts(inputs, outputs)?;

        Ok(Transaction {
            version: self.config.version,
            inputs: inputs
                .iter()
                .map(|utxo| TransactionInput {
                    prevout: utxo.outpoint,
                    script_sig: Vec::new(),
                    sequence: self.config.sequence,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|p| TransactionOutput {
                    value: p.amount,
                    script_pubkey: p.script_pubkey.clone(),
                })
                .collect(),
            lock_time: self.config.lock_time,
        })
    }

    /// Assemble with a pre-built unlocking input per spent output
    pub fn assemble(
        &self,
        inputs: &[(UtxoRef, UnlockingInput)],
        outputs: &[Payment],
    ) -> Result<AssembledTransaction> {
        let finalizers: Vec<(UtxoRef, &dyn InputFinalizer)> = inputs
            .iter()
            .map(|(utxo, unlock)| (utxo.clone(), unlock as &dyn InputFinalizer))
            .collect();
        self.assemble_with(&finalizers, outputs)
    }

    /// Assemble, asking each input's finalizer for its unlocking input
    pub fn assemble_with(
        &self,
        inputs: &[(UtxoRef, &dyn InputFinalizer)],
        outputs: &[Payment],
    ) -> Result<AssembledTransaction> {
        let utxos: Vec<UtxoRef> = inputs.iter().map(|(u, _)| u.clone()).collect();
        let mut tx = self.draft(&utxos, outputs)?;

        let mut script_sigs = Vec::with_capacity(inputs.len());
        for (i, (utxo, finalizer)) in inputs.iter().enumerate() {
            let unlock = finalizer.finalize(&tx, i, utxo)?;
            check_redeem_script(i, utxo, &unlock)?;
            script_sigs.push(unlock.into_script_sig());
        }
        for (input, script_sig) in tx.inputs.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }

        let bytes = serialize_transaction(&tx);
        let input_value: u64 = utxos.iter().map(|u| u.amount).sum();
        let output_value = tx.total_output_value();
        let fee = input_value - output_value;
        let fee_rate = fee / bytes.len() as u64;
        if fee_rate > self.config.max_fee_rate {
            return Err(HashLockError::ExcessiveFeeSuspected {
                fee,
                fee_rate,
                max_fee_rate: self.config.max_fee_rate,
            });
        }

        let txid = Txid(sha256d(&bytes));
        tracing::info!(
            txid = %txid,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee,
            size = bytes.len(),
            "assembled transaction"
        );

        Ok(AssembledTransaction {
            transaction: tx,
            bytes,
            txid,
            input_value,
            output_value,
        })
    }
}

/// Assemble with the default policy, paying to addresses
pub fn assemble(
    inputs: &[(UtxoRef, UnlockingInput)],
    outputs: &[(Address, u64)],
) -> Result<AssembledTransaction> {
    let payments: Vec<Payment> = outputs
        .iter()
        .map(|(address, amount)| Payment::to_address(address, *amount))
        .collect();
    Assembler::default().assemble(inputs, &payments)
}

/// Single payment sweeping `utxos` to `destination`, leaving `fee` behind
pub fn pay_all_minus_fee(utxos: &[UtxoRef], destination: &Address, fee: u64) -> Result<Payment> {
    let total = sum_amounts(utxos.iter().map(|u| u.amount))?;
    let amount = total.checked_sub(fee).ok_or_else(|| {
        HashLockError::InvalidTransaction(format!("fee {} exceeds funded total {}", fee, total))
    })?;
    Ok(Payment::to_address(destination, amount))
}

/// Structural and value checks shared by draft and assembly
fn check_amounts(inputs: &[UtxoRef], outputs: &[Payment]) -> Result<()> {
    if inputs.is_empty() || outputs.is_empty() {
        return Err(HashLockError::InvalidTransaction(
            "Empty inputs or outputs".to_string(),
        ));
    }
    if inputs.len() > MAX_INPUTS {
        return Err(HashLockError::InvalidTransaction(format!(
            "Too many inputs: {}",
            inputs.len()
        )));
    }
    if outputs.len() > MAX_OUTPUTS {
        return Err(HashLockError::InvalidTransaction(format!(
            "Too many outputs: {}",
            outputs.len()
        )));
    }

    for (i, utxo) in inputs.iter().enumerate() {
        if utxo.amount > MAX_MONEY {
            return Err(HashLockError::InvalidTransaction(format!(
                "Invalid input amount {} at index {}",
                utxo.amount, i
            )));
        }
    }
    for (i, output) in outputs.iter().enumerate() {
        if output.amount > MAX_MONEY {
            return Err(HashLockError::InvalidTransaction(format!(
                "Invalid output value {} at index {}",
                output.amount, i
            )));
        }
    }

    let total_in = sum_amounts(inputs.iter().map(|u| u.amount))?;
    let total_out = sum_amounts(outputs.iter().map(|p| p.amount))?;
    if total_out > total_in {
        return Err(HashLockError::ConservationViolation {
            inputs: total_in,
            outputs: total_out,
        });
    }
    Ok(())
}

fn sum_amounts(amounts: impl Iterator<Item = u64>) -> Result<u64> {
    let mut total = 0u64;
    for amount in amounts {
        total = total
            .checked_add(amount)
            .filter(|t| *t <= MAX_MONEY)
            .ok_or_else(|| HashLockError::InvalidTransaction("Amount total out of range".to_string()))?;
    }
    Ok(total)
}

/// A P2SH output only accepts the redeem script its hash commits to
fn check_redeem_script(index: usize, utxo: &UtxoRef, unlock: &UnlockingInput) -> Result<()> {
    if let Some(expected) = p2sh_script_hash(&utxo.script_pubkey) {
        if unlock.redeem_script().script_hash() != expected {
            return Err(HashLockError::BranchMismatch(format!(
                "input {} redeem script does not hash to the spent output's script hash",
                index
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Wire format
// =============================================================================

/// Legacy serialization: version, inputs, outputs, lock time
pub fn serialize_transaction(tx: &Transaction) -> ByteString {
    let mut data = Vec::new();

    // Version (4 bytes, little-endian)
    data.extend_from_slice(&tx.version.to_le_bytes());

    data.extend_from_slice(&encode_varint(tx.inputs.len() as u64));
    for input in &tx.inputs {
        data.extend_from_slice(&input.prevout.txid.0);
        data.extend_from_slice(&input.prevout.vout.to_le_bytes());
        data.extend_from_slice(&encode_varint(input.script_sig.len() as u64));
        data.extend_from_slice(&input.script_sig);
        data.extend_from_slice(&input.sequence.to_le_bytes());
    }

    data.extend_from_slice(&encode_varint(tx.outputs.len() as u64));
    for output in &tx.outputs {
        data.extend_from_slice(&output.value.to_le_bytes());
        data.extend_from_slice(&encode_varint(output.script_pubkey.len() as u64));
        data.extend_from_slice(&output.script_pubkey);
    }

    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data
}

/// Transaction id: double SHA256 of the legacy serialization
pub fn compute_txid(tx: &Transaction) -> Txid {
    Txid(sha256d(&serialize_transaction(tx)))
}

/// Parse a legacy-serialized transaction
pub fn deserialize_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = Reader { bytes, pos: 0 };

    let version = reader.read_u32()?;
    let input_count = reader.read_varint()?;
    if input_count == 0 {
        return Err(HashLockError::InvalidTransaction(
            "witness serialization is not supported".to_string(),
        ));
    }

    let mut inputs = Vec::new();
    for _ in 0..input_count {
        let mut txid = [0u8; 32];
        txid.copy_from_slice(reader.take(32)?);
        let vout = reader.read_u32()?;
        let script_len = reader.read_varint()? as usize;
        let script_sig = reader.take(script_len)?.to_vec();
        let sequence = reader.read_u32()?;
        inputs.push(TransactionInput {
            prevout: OutPoint {
                txid: Txid(txid),
                vout,
            },
            script_sig,
            sequence,
        });
    }

    let output_count = reader.read_varint()?;
    let mut outputs = Vec::new();
    for _ in 0..output_count {
        let value = reader.read_u64()?;
        let script_len = reader.read_varint()? as usize;
        let script_pubkey = reader.take(script_len)?.to_vec();
        outputs.push(TransactionOutput {
            value,
            script_pubkey,
        });
    }

    let lock_time = reader.read_u32()?;
    if reader.pos != bytes.len() {
        return Err(HashLockError::InvalidTransaction(format!(
            "{} trailing bytes",
            bytes.len() - reader.pos
        )));
    }

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
    })
}

/// Encode a number as a Bitcoin varint
pub fn encode_varint(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut result = vec![0xfd];
        result.extend_from_slice(&(value as u16).to_le_bytes());
        result
    } else if value <= 0xffffffff {
        let mut result = vec![0xfe];
        result.extend_from_slice(&(value as u32).to_le_bytes());
        result
    } else {
        let mut result = vec![0xff];
        result.extend_from_slice(&value.to_le_bytes());
        result
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| HashLockError::InvalidTransaction("unexpected end of data".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_varint(&mut self) -> Result<u64> {
        let first = self.take(1)?[0];
        match first {
            0xfd => {
                let mut buf = [0u8; 2];
                buf.copy_from_slice(self.take(2)?);
                Ok(u16::from_le_bytes(buf) as u64)
            }
            0xfe => Ok(self.read_u32()? as u64),
            0xff => self.read_u64(),
            n => Ok(n as u64),
        }
    }
}
