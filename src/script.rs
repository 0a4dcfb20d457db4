//! Reference script interpreter
//!
//! Enough of the legacy script machine to run the hash-or-signature template
//! end to end: data pushes, flow control, a handful of stack and arithmetic
//! ops, the hash opcodes, and CHECKSIG over the legacy sighash. P2SH outputs
//! get the second evaluation of the redeem script.
//!
//! Resource limits (script size, op count, stack depth, element size) abort
//! with `ScriptExecution`; any other failure makes the script evaluate to
//! false.

use secp256k1::{ecdsa::Signature, Context, Message, PublicKey, Secp256k1, Verification};

use crate::address::p2sh_script_hash;
use crate::compiler::{decompile, is_push_only};
use crate::constants::*;
use crate::error::{HashLockError, Result};
use crate::hash::{hash160, sha256, sha256d};
use crate::opcodes::*;
use crate::sighash::legacy_signature_hash;
use crate::types::*;

use ripemd::{Digest, Ripemd160};

/// Decides whether a signature from the stack is valid for a public key.
///
/// `script_code` is the script currently executing; for a P2SH spend that is
/// the redeem script.
pub trait SignatureChecker {
    fn check_sig(&self, signature: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool;
}

/// Rejects every signature; for evaluating scripts outside a transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignatureChecker;

impl SignatureChecker for NoSignatureChecker {
    fn check_sig(&self, _signature: &[u8], _pubkey: &[u8], _script_code: &[u8]) -> bool {
        false
    }
}

/// Checks signatures against the legacy sighash of one transaction input
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize) -> Self {
        TransactionSignatureChecker { tx, input_index }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_sig(&self, signature: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool {
        let Some((sighash_type, der)) = signature.split_last() else {
            return false;
        };
        let sighash = match legacy_signature_hash(self.tx, self.input_index, script_code, *sighash_type as u32) {
            Ok(hash) => hash,
            Err(_) => return false,
        };
        let secp = Secp256k1::verification_only();
        verify_signature(&secp, pubkey, der, &sighash)
    }
}

/// Run `script` against `stack` and apply the final-stack rule: exactly one
/// element left, and it is true.
pub fn eval_script(script: &[u8], stack: &mut Vec<ByteString>, checker: &dyn SignatureChecker) -> Result<bool> {
    if !execute(script, stack, checker)? {
        return Ok(false);
    }
    Ok(is_clean_true(stack))
}

/// Verify a scriptSig against the scriptPubKey it spends.
///
/// When `script_pubkey` is P2SH, the scriptSig must be push-only and its
/// last push is run as the redeem script on the remaining stack.
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    checker: &dyn SignatureChecker,
) -> Result<bool> {
    let mut stack = Vec::new();

    // Execute scriptSig
    if !execute(script_sig, &mut stack, checker)? {
        return Ok(false);
    }

    let is_p2sh = p2sh_script_hash(script_pubkey).is_some();
    if is_p2sh && !is_push_only(script_sig)? {
        tracing::debug!("P2SH scriptSig is not push-only");
        return Ok(false);
    }
    let stack_copy = stack.clone();

    // Execute scriptPubKey
    if !execute(script_pubkey, &mut stack, checker)? {
        return Ok(false);
    }
    if !stack.last().map_or(false, |top| cast_to_bool(top)) {
        return Ok(false);
    }

    if !is_p2sh {
        return Ok(stack.len() == 1);
    }

    // Execute the redeem script
    let mut stack = stack_copy;
    let Some(redeem_script) = stack.pop() else {
        return Ok(false);
    };
    if !execute(&redeem_script, &mut stack, checker)? {
        return Ok(false);
    }
    Ok(is_clean_true(&stack))
}

/// Verify input `input_index` of `tx` against the output it spends
pub fn verify_input(tx: &Transaction, input_index: usize, spent: &UtxoRef) -> Result<bool> {
    let input = tx.inputs.get(input_index).ok_or_else(|| {
        HashLockError::InvalidTransaction(format!("no input at index {}", input_index))
    })?;
    let checker = TransactionSignatureChecker::new(tx, input_index);
    let valid = verify_script(&input.script_sig, &spent.script_pubkey, &checker)?;
    tracing::debug!(input_index, valid, "verified input");
    Ok(valid)
}

fn is_clean_true(stack: &[ByteString]) -> bool {
    stack.len() == 1 && cast_to_bool(&stack[0])
}

/// Script truthiness: any non-zero byte, except a lone sign bit at the end
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, b) in bytes.iter().enumerate() {
        if *b != 0 {
            return !(i == bytes.len() - 1 && *b == 0x80);
        }
    }
    false
}

/// Run a script to completion without the final-stack rule.
///
/// `Ok(false)` means the script failed; `Err` means a resource limit was hit
/// or the bytes don't parse.
fn execute(script: &[u8], stack: &mut Vec<ByteString>, checker: &dyn SignatureChecker) -> Result<bool> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(HashLockError::ScriptExecution("Script size limit exceeded".to_string()));
    }

    let elements = decompile(script)?;
    let mut exec_stack: Vec<bool> = Vec::new();
    let mut op_count = 0;

    for element in &elements {
        let executing = exec_stack.iter().all(|branch| *branch);

        match element {
            ScriptElement::Data(data) => {
                if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(HashLockError::ScriptExecution(format!(
                        "Push of {} bytes exceeds element limit",
                        data.len()
                    )));
                }
                if executing {
                    stack.push(data.clone());
                }
            }
            ScriptElement::Op(op) => {
                // Check operation limit
                if *op > OP_16 {
                    op_count += 1;
                    if op_count > MAX_SCRIPT_OPS {
                        return Err(HashLockError::ScriptExecution("Operation limit exceeded".to_string()));
                    }
                }

                match *op {
                    OP_IF | OP_NOTIF => {
                        let mut value = false;
                        if executing {
                            let Some(top) = stack.pop() else {
                                return Ok(false);
                            };
                            value = cast_to_bool(&top);
                            if *op == OP_NOTIF {
                                value = !value;
                            }
                        }
                        exec_stack.push(value);
                    }
                    OP_ELSE => match exec_stack.last_mut() {
                        Some(branch) => *branch = !*branch,
                        None => return Ok(false),
                    },
                    OP_ENDIF => {
                        if exec_stack.pop().is_none() {
                            return Ok(false);
                        }
                    }
                    _ if !executing => {}
                    _ => {
                        if !execute_opcode(*op, stack, checker, script) {
                            return Ok(false);
                        }
                    }
                }
            }
        }

        // Check stack size
        if stack.len() > MAX_STACK_SIZE {
            return Err(HashLockError::ScriptExecution("Stack overflow".to_string()));
        }
    }

    // Unbalanced conditional
    Ok(exec_stack.is_empty())
}

/// Execute a single non-flow-control opcode
fn execute_opcode(
    opcode: u8,
    stack: &mut Vec<ByteString>,
    checker: &dyn SignatureChecker,
    script_code: &[u8],
) -> bool {
    match opcode {
        // OP_0 - push empty array
        OP_0 => {
            stack.push(vec![]);
            true
        }

        OP_1NEGATE => {
            stack.push(vec![0x81]);
            true
        }

        // OP_1 to OP_16 - push numbers 1-16
        OP_1..=OP_16 => {
            stack.push(vec![opcode - OP_1 + 1]);
            true
        }

        OP_NOP => true,

        // OP_VERIFY - check if top stack item is true
        OP_VERIFY => match stack.pop() {
            Some(item) => cast_to_bool(&item),
            None => false,
        },

        // OP_RETURN - always fail
        OP_RETURN => false,

        // OP_2DROP - remove top 2 stack items
        OP_2DROP => {
            if stack.len() < 2 {
                return false;
            }
            stack.truncate(stack.len() - 2);
            true
        }

        // OP_2DUP - duplicate top 2 stack items
        OP_2DUP => {
            if stack.len() < 2 {
                return false;
            }
            let second = stack[stack.len() - 2].clone();
            let top = stack[stack.len() - 1].clone();
            stack.push(second);
            stack.push(top);
            true
        }

        // OP_DEPTH - push stack size
        OP_DEPTH => {
            let depth = encode_num(stack.len() as i64);
            stack.push(depth);
            true
        }

        // OP_DROP - remove top stack item
        OP_DROP => stack.pop().is_some(),

        // OP_DUP - duplicate top stack item
        OP_DUP => match stack.last().cloned() {
            Some(item) => {
                stack.push(item);
                true
            }
            None => false,
        },

        // OP_NIP - remove second-to-top stack item
        OP_NIP => {
            if stack.len() < 2 {
                return false;
            }
            stack.remove(stack.len() - 2);
            true
        }

        // OP_OVER - copy second-to-top stack item to top
        OP_OVER => {
            if stack.len() < 2 {
                return false;
            }
            let second = stack[stack.len() - 2].clone();
            stack.push(second);
            true
        }

        // OP_SWAP - swap top 2 stack items
        OP_SWAP => {
            if stack.len() < 2 {
                return false;
            }
            let len = stack.len();
            stack.swap(len - 1, len - 2);
            true
        }

        // OP_SIZE - push size of top stack item
        OP_SIZE => match stack.last() {
            Some(item) => {
                let size = encode_num(item.len() as i64);
                stack.push(size);
                true
            }
            None => false,
        },

        OP_EQUAL | OP_EQUALVERIFY => {
            let (Some(a), Some(b)) = (stack.pop(), stack.pop()) else {
                return false;
            };
            if opcode == OP_EQUALVERIFY {
                return a == b;
            }
            stack.push(bool_item(a == b));
            true
        }

        OP_ADD | OP_SUB => {
            let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                return false;
            };
            let (Some(a), Some(b)) = (decode_num(&a), decode_num(&b)) else {
                return false;
            };
            let result = if opcode == OP_ADD { a + b } else { a - b };
            stack.push(encode_num(result));
            true
        }

        OP_RIPEMD160 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
            let Some(item) = stack.pop() else {
                return false;
            };
            let digest = match opcode {
                OP_RIPEMD160 => Ripemd160::digest(&item).to_vec(),
                OP_SHA256 => sha256(&item).to_vec(),
                OP_HASH160 => hash160(&item).to_vec(),
                _ => sha256d(&item).to_vec(),
            };
            stack.push(digest);
            true
        }

        // OP_CHECKSIG - verify ECDSA signature
        OP_CHECKSIG | OP_CHECKSIGVERIFY => {
            let (Some(pubkey), Some(signature)) = (stack.pop(), stack.pop()) else {
                return false;
            };
            let valid = checker.check_sig(&signature, &pubkey, script_code);
            if opcode == OP_CHECKSIGVERIFY {
                return valid;
            }
            stack.push(bool_item(valid));
            true
        }

        // Unknown opcode
        _ => false,
    }
}

fn bool_item(value: bool) -> ByteString {
    if value {
        vec![1]
    } else {
        vec![]
    }
}

/// Minimal little-endian sign-magnitude encoding of a script number
fn encode_num(value: i64) -> ByteString {
    if value == 0 {
        return vec![];
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if out[out.len() - 1] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let last = out.len() - 1;
        out[last] |= 0x80;
    }
    out
}

/// Arithmetic operands are at most 4 bytes
fn decode_num(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 4 {
        return None;
    }
    let Some((last, _)) = bytes.split_last() else {
        return Some(0);
    };
    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= (*b as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        value &= !(0x80i64 << (8 * (bytes.len() - 1)));
        value = -value;
    }
    Some(value)
}

/// Verify an ECDSA signature over a 32-byte digest using secp256k1
fn verify_signature<C: Context + Verification>(
    secp: &Secp256k1<C>,
    pubkey_bytes: &[u8],
    signature_bytes: &[u8],
    digest: &Hash,
) -> bool {
    // Parse public key
    let pubkey = match PublicKey::from_slice(pubkey_bytes) {
        Ok(pk) => pk,
        Err(_) => return false,
    };

    // Parse signature (strict DER), low-S form for libsecp256k1
    let mut signature = match Signature::from_der(signature_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    signature.normalize_s();

    let message = match Message::from_digest_slice(digest) {
        Ok(m) => m,
        Err(_) => return false,
    };

    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}
