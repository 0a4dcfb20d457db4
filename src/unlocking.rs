//! Unlocking inputs for the hash-or-signature template
//!
//! Both branches end with the full redeem script as the last push, which is
//! what P2SH evaluation pops and hashes against the spent output.
//!
//! | branch    | scriptSig                           |
//! |-----------|-------------------------------------|
//! | hash      | `<secret> OP_TRUE <redeem script>`  |
//! | signature | `<sig> OP_0 <redeem script>`        |

use secp256k1::ecdsa::Signature;

use crate::compiler::compile;
use crate::constants::SIGHASH_ALL;
use crate::error::{HashLockError, Result};
use crate::hash::hash160;
use crate::locking::{check_pubkey, HashOrSigTemplate};
use crate::opcodes::{OP_0, OP_TRUE};
use crate::sighash::legacy_signature_hash;
use crate::types::{ByteString, CompiledScript, Hash, ScriptElement, Transaction, UtxoRef};

/// Which side of the OP_IF an unlocking input takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Hash,
    Signature,
}

/// Everything needed to fill in one input's scriptSig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockingInput {
    branch: Branch,
    script_sig: ByteString,
    redeem_script: CompiledScript,
}

impl UnlockingInput {
    pub fn branch(&self) -> Branch {
        self.branch
    }

    pub fn script_sig(&self) -> &[u8] {
        &self.script_sig
    }

    pub fn redeem_script(&self) -> &CompiledScript {
        &self.redeem_script
    }

    pub fn into_script_sig(self) -> ByteString {
        self.script_sig
    }
}

/// Unlock through the hash branch by revealing `secret`.
///
/// Fails with `BranchMismatch` when `hash160(secret)` is not the digest
/// embedded in `redeem_script`; a scriptSig that can never verify is not
/// produced.
pub fn build_hash_unlock(secret: &[u8], redeem_script: &CompiledScript) -> Result<UnlockingInput> {
    let template = HashOrSigTemplate::parse(redeem_script)?;
    if hash160(secret) != template.digest {
        return Err(HashLockError::BranchMismatch(
            "secret does not hash to the script's digest".to_string(),
        ));
    }

    let script_sig = compile(&[
        ScriptElement::data(secret),
        ScriptElement::Op(OP_TRUE),
        ScriptElement::data(redeem_script),
    ])?;

    tracing::debug!(
        secret_len = secret.len(),
        script_sig_len = script_sig.len(),
        "built hash-branch unlock"
    );

    Ok(UnlockingInput {
        branch: Branch::Hash,
        script_sig: script_sig.into_bytes(),
        redeem_script: redeem_script.clone(),
    })
}

/// Unlock through the signature branch.
///
/// `signature` is DER with the sighash-type byte appended. `pubkey` must be
/// the key embedded in `redeem_script`; it is checked but not pushed, since
/// the script carries it.
pub fn build_sig_unlock(
    signature: &[u8],
    pubkey: &[u8],
    redeem_script: &CompiledScript,
) -> Result<UnlockingInput> {
    check_pubkey(pubkey)?;
    check_signature_encoding(signature)?;

    let template = HashOrSigTemplate::parse(redeem_script)?;
    if template.pubkey != pubkey {
        return Err(HashLockError::BranchMismatch(
            "public key is not the one the script commits to".to_string(),
        ));
    }

    let script_sig = compile(&[
        ScriptElement::data(signature),
        ScriptElement::Op(OP_0),
        ScriptElement::data(redeem_script),
    ])?;

    tracing::debug!(
        sig_len = signature.len(),
        script_sig_len = script_sig.len(),
        "built signature-branch unlock"
    );

    Ok(UnlockingInput {
        branch: Branch::Signature,
        script_sig: script_sig.into_bytes(),
        redeem_script: redeem_script.clone(),
    })
}

/// Strict DER plus a trailing SIGHASH_ALL byte
fn check_signature_encoding(signature: &[u8]) -> Result<()> {
    let (sighash_type, der) = signature
        .split_last()
        .ok_or_else(|| HashLockError::InvalidSignature("empty signature".to_string()))?;
    if *sighash_type as u32 != SIGHASH_ALL {
        return Err(HashLockError::InvalidSignature(format!(
            "unsupported sighash type {:#04x}",
            sighash_type
        )));
    }
    Signature::from_der(der).map_err(|e| HashLockError::InvalidSignature(e.to_string()))?;
    Ok(())
}

/// Produces the unlocking input for one input of a draft transaction.
///
/// The draft has every scriptSig empty; signature-based finalizers hash it
/// to get the digest they sign.
pub trait InputFinalizer {
    fn finalize(&self, tx: &Transaction, input_index: usize, spent: &UtxoRef) -> Result<UnlockingInput>;
}

/// A pre-built unlocking input needs no transaction context
impl InputFinalizer for UnlockingInput {
    fn finalize(&self, _tx: &Transaction, _input_index: usize, _spent: &UtxoRef) -> Result<UnlockingInput> {
        Ok(self.clone())
    }
}

/// Something holding a private key, typically a node wallet
pub trait Signer {
    /// DER-encoded ECDSA signature over `digest` by the key behind `pubkey`,
    /// without a sighash-type byte
    fn sign_digest(&self, pubkey: &[u8], digest: &Hash) -> Result<ByteString>;
}

/// Finalizes a signature-branch input once the draft transaction is known
pub struct SignatureFinalizer<'a> {
    signer: &'a dyn Signer,
    pubkey: ByteString,
    redeem_script: CompiledScript,
}

impl<'a> SignatureFinalizer<'a> {
    pub fn new(signer: &'a dyn Signer, pubkey: &[u8], redeem_script: CompiledScript) -> Self {
        SignatureFinalizer {
            signer,
            pubkey: pubkey.to_vec(),
            redeem_script,
        }
    }
}

impl InputFinalizer for SignatureFinalizer<'_> {
    fn finalize(&self, tx: &Transaction, input_index: usize, _spent: &UtxoRef) -> Result<UnlockingInput> {
        let digest = legacy_signature_hash(tx, input_index, self.redeem_script.as_bytes(), SIGHASH_ALL)?;
        let mut signature = self.signer.sign_digest(&self.pubkey, &digest)?;
        signature.push(SIGHASH_ALL as u8);
        build_sig_unlock(&signature, &self.pubkey, &self.redeem_script)
    }
}
