//! # p2sh-hashlock
//!
//! Build, fund and redeem a P2SH output locked by "reveal a secret whose
//! hash160 is D, or sign with key K".
//!
//! ## Architecture
//!
//! The crate is a pipeline of pure functions over byte buffers:
//! - Locking script builder (element sequence for the template)
//! - Script compiler (elements to canonical bytes)
//! - Address deriver (hash160 + base58check)
//! - Unlocking input builder (hash or signature branch)
//! - Transaction assembler (legacy serialization, fee sanity checks)
//!
//! A reference interpreter checks that an assembled spend satisfies the
//! script it unlocks, and the `node` module describes the wallet calls the
//! funding and redemption workflows make.
//!
//! ## Usage
//!
//! ```rust
//! use p2sh_hashlock::{Network, P2shHashLock};
//!
//! let pubkey = hex::decode(
//!     "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
//! ).unwrap();
//! let lock = P2shHashLock::new(Network::Regtest);
//! let params = lock.lock_to_secret(b"secret data", &pubkey).unwrap();
//! assert_eq!(
//!     params.address().unwrap().as_str(),
//!     "2NCQAwQjsG9AhTijHM7bErtAqrMyA46Rpg2"
//! );
//! ```

pub mod address;
pub mod compiler;
pub mod constants;
pub mod error;
pub mod hash;
pub mod locking;
pub mod node;
pub mod opcodes;
pub mod script;
pub mod sighash;
pub mod transaction;
pub mod types;
pub mod unlocking;

// Re-export commonly used types
pub use address::{derive_address, Address, Network};
pub use compiler::compile;
pub use error::{HashLockError, Result};
pub use locking::{build_hash_or_sig_script, HashLockParams, HashOrSigTemplate};
pub use transaction::{AssembledTransaction, Assembler, AssemblerConfig, Payment};
pub use types::*;
pub use unlocking::{build_hash_unlock, build_sig_unlock, Branch, InputFinalizer, UnlockingInput};

/// Hash-or-signature lock operations bound to one network and assembly policy
///
/// # Examples
///
/// ```
/// use p2sh_hashlock::{Network, P2shHashLock, Payment, Txid, UtxoRef};
///
/// let pubkey = hex::decode(
///     "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
/// ).unwrap();
/// let lock = P2shHashLock::new(Network::Regtest);
/// let params = lock.lock_to_secret(b"secret data", &pubkey).unwrap();
/// let address = params.address().unwrap();
///
/// let utxo = UtxoRef::new(
///     Txid::from_hex("9f71ceb4feaab6c8d8e209763e1e9bece87c0054024a234ae75a96082a5572ca").unwrap(),
///     0,
///     100_000_000,
///     address.script_pubkey(),
/// );
/// let unlock = lock.hash_unlock(b"secret data", &params.redeem_script().unwrap()).unwrap();
/// let tx = lock
///     .assemble(&[(utxo.clone(), unlock)], &[Payment::to_address(&address, 99_999_000)])
///     .unwrap();
///
/// assert_eq!(tx.fee(), 1000);
/// assert!(lock.verify_input(&tx.transaction, 0, &utxo).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct P2shHashLock {
    network: Network,
    assembler: Assembler,
}

impl P2shHashLock {
    pub fn new(network: Network) -> Self {
        P2shHashLock {
            network,
            assembler: Assembler::default(),
        }
    }

    pub fn with_config(network: Network, config: AssemblerConfig) -> Self {
        P2shHashLock {
            network,
            assembler: Assembler::new(config),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Compile the template for `digest` and `pubkey`
    pub fn redeem_script(&self, digest: &[u8], pubkey: &[u8]) -> Result<CompiledScript> {
        locking::compile_hash_or_sig_script(digest, pubkey)
    }

    /// P2SH address of a redeem script on this network
    pub fn address(&self, redeem_script: &CompiledScript) -> Address {
        derive_address(redeem_script, self.network)
    }

    /// Parameters locking to `hash160(secret)` or `pubkey`
    pub fn lock_to_secret(&self, secret: &[u8], pubkey: &[u8]) -> Result<HashLockParams> {
        HashLockParams::from_secret(secret, pubkey, self.network)
    }

    pub fn hash_unlock(&self, secret: &[u8], redeem_script: &CompiledScript) -> Result<UnlockingInput> {
        build_hash_unlock(secret, redeem_script)
    }

    pub fn sig_unlock(
        &self,
        signature: &[u8],
        pubkey: &[u8],
        redeem_script: &CompiledScript,
    ) -> Result<UnlockingInput> {
        build_sig_unlock(signature, pubkey, redeem_script)
    }

    /// Unsigned form of a spend, for computing signature hashes
    pub fn draft(&self, inputs: &[UtxoRef], outputs: &[Payment]) -> Result<Transaction> {
        self.assembler.draft(inputs, outputs)
    }

    /// Legacy SIGHASH_ALL digest a signature-branch signer must sign
    pub fn signature_hash(&self, draft: &Transaction, input_index: usize, redeem_script: &CompiledScript) -> Result<Hash> {
        sighash::legacy_signature_hash(draft, input_index, redeem_script.as_bytes(), constants::SIGHASH_ALL)
    }

    pub fn assemble(
        &self,
        inputs: &[(UtxoRef, UnlockingInput)],
        outputs: &[Payment],
    ) -> Result<AssembledTransaction> {
        self.assembler.assemble(inputs, outputs)
    }

    pub fn assemble_with(
        &self,
        inputs: &[(UtxoRef, &dyn InputFinalizer)],
        outputs: &[Payment],
    ) -> Result<AssembledTransaction> {
        self.assembler.assemble_with(inputs, outputs)
    }

    /// Run input `input_index` through the reference interpreter
    pub fn verify_input(&self, tx: &Transaction, input_index: usize, spent: &UtxoRef) -> Result<bool> {
        script::verify_input(tx, input_index, spent)
    }
}

impl Default for P2shHashLock {
    /// Regtest, default assembly policy
    fn default() -> Self {
        Self::new(Network::Regtest)
    }
}
