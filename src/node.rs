//! Node collaborator boundary
//!
//! The library never talks to a node itself. [`NodeClient`] is the narrow set
//! of wallet and relay calls the funding and redemption workflows need; an RPC
//! client, a test double, or anything else can stand behind it.

use thiserror::Error;

use crate::address::{Address, Network};
use crate::error::{HashLockError, Result};
use crate::hash::hash160;
use crate::locking::HashLockParams;
use crate::script::verify_input;
use crate::transaction::{pay_all_minus_fee, AssembledTransaction, Assembler};
use crate::types::{ByteString, Hash, Txid, UtxoRef};
use crate::unlocking::{build_hash_unlock, InputFinalizer, SignatureFinalizer, Signer};

/// Failures reported by a node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("Wallet already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by node: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;

/// Wallet and relay operations of a Bitcoin node
pub trait NodeClient {
    /// Fails with `AlreadyExists` when a wallet of that name is on disk
    fn create_wallet(&self, name: &str) -> NodeResult<()>;

    fn load_wallet(&self, name: &str) -> NodeResult<()>;

    /// Names of the currently loaded wallets
    fn list_wallets(&self) -> NodeResult<Vec<String>>;

    /// Outputs the node has seen paying `address`
    fn received_outputs(&self, address: &Address) -> NodeResult<Vec<UtxoRef>>;

    /// A public key held by the wallet, SEC1-encoded
    fn public_key(&self) -> NodeResult<ByteString>;

    /// DER ECDSA signature over `digest` by the wallet key behind `pubkey`
    fn sign_digest(&self, pubkey: &[u8], digest: &Hash) -> NodeResult<ByteString>;

    fn send_to_address(&self, address: &Address, amount: u64) -> NodeResult<Txid>;

    /// Submit a raw transaction; `Rejected` carries the node's reason
    fn broadcast(&self, raw_hex: &str) -> NodeResult<Txid>;
}

/// How `ensure_wallet` got the wallet ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    Created,
    Loaded,
    AlreadyLoaded,
}

/// Create `name`, or load it if it already exists
pub fn ensure_wallet<N: NodeClient + ?Sized>(node: &N, name: &str) -> Result<WalletStatus> {
    let status = match node.create_wallet(name) {
        Ok(()) => WalletStatus::Created,
        Err(NodeError::AlreadyExists(_)) => {
            if node.list_wallets()?.iter().any(|w| w == name) {
                WalletStatus::AlreadyLoaded
            } else {
                node.load_wallet(name)?;
                WalletStatus::Loaded
            }
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(wallet = name, ?status, "wallet ready");
    Ok(status)
}

/// A hash lock the wallet has paid into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundedLock {
    pub params: HashLockParams,
    pub address: Address,
    pub txid: Txid,
}

/// Lock `amount` to `hash160(secret)` or the wallet's own key
pub fn fund_hash_lock<N: NodeClient + ?Sized>(
    node: &N,
    secret: &[u8],
    network: Network,
    amount: u64,
) -> Result<FundedLock> {
    let pubkey = node.public_key()?;
    let params = HashLockParams::from_secret(secret, &pubkey, network)?;
    let address = params.address()?;
    let txid = node.send_to_address(&address, amount)?;

    tracing::info!(address = %address, txid = %txid, amount, "funded hash lock");
    Ok(FundedLock {
        params,
        address,
        txid,
    })
}

/// Outputs currently locked to `params`
pub fn find_funding<N: NodeClient + ?Sized>(node: &N, params: &HashLockParams) -> Result<Vec<UtxoRef>> {
    let address = params.address()?;
    let script_pubkey = address.script_pubkey();
    let utxos: Vec<UtxoRef> = node
        .received_outputs(&address)?
        .into_iter()
        .filter(|u| u.script_pubkey == script_pubkey)
        .collect();

    if utxos.is_empty() {
        return Err(NodeError::NotFound(format!("no outputs pay {}", address)).into());
    }
    tracing::debug!(address = %address, count = utxos.len(), "found funding outputs");
    Ok(utxos)
}

/// Sweep every output of the lock back to the wallet by revealing `secret`.
///
/// `assembler` carries the spend policy, including the fee-rate ceiling.
pub fn redeem_hash_branch<N: NodeClient + ?Sized>(
    node: &N,
    assembler: &Assembler,
    params: &HashLockParams,
    secret: &[u8],
    fee: u64,
) -> Result<Txid> {
    let redeem_script = params.redeem_script()?;
    let unlock = build_hash_unlock(secret, &redeem_script)?;
    let utxos = find_funding(node, params)?;

    let inputs: Vec<(UtxoRef, &dyn InputFinalizer)> = utxos
        .iter()
        .map(|u| (u.clone(), &unlock as &dyn InputFinalizer))
        .collect();
    redeem_to_wallet(node, assembler, params.network, &utxos, &inputs, fee)
}

/// Sweep every output of the lock back to the wallet with a wallet signature
pub fn redeem_signature_branch<N: NodeClient + ?Sized>(
    node: &N,
    assembler: &Assembler,
    params: &HashLockParams,
    fee: u64,
) -> Result<Txid> {
    let signer = NodeSigner { node };
    let finalizer = SignatureFinalizer::new(&signer, &params.pubkey, params.redeem_script()?);
    let utxos = find_funding(node, params)?;

    let inputs: Vec<(UtxoRef, &dyn InputFinalizer)> = utxos
        .iter()
        .map(|u| (u.clone(), &finalizer as &dyn InputFinalizer))
        .collect();
    redeem_to_wallet(node, assembler, params.network, &utxos, &inputs, fee)
}

fn redeem_to_wallet<N: NodeClient + ?Sized>(
    node: &N,
    assembler: &Assembler,
    network: Network,
    utxos: &[UtxoRef],
    inputs: &[(UtxoRef, &dyn InputFinalizer)],
    fee: u64,
) -> Result<Txid> {
    let destination = Address::p2pkh_from_hash(hash160(&node.public_key()?), network);
    let payment = pay_all_minus_fee(utxos, &destination, fee)?;
    let assembled = assembler.assemble_with(inputs, &[payment])?;
    check_spends(&assembled, utxos)?;

    let txid = node.broadcast(&assembled.to_hex())?;
    tracing::info!(txid = %txid, destination = %destination, "broadcast redemption");
    Ok(txid)
}

/// Run every input through the interpreter before handing it to the node
fn check_spends(assembled: &AssembledTransaction, utxos: &[UtxoRef]) -> Result<()> {
    for (i, utxo) in utxos.iter().enumerate() {
        if !verify_input(&assembled.transaction, i, utxo)? {
            return Err(HashLockError::ScriptExecution(format!(
                "input {} does not satisfy {}",
                i, utxo.outpoint.txid
            )));
        }
    }
    Ok(())
}

/// Lets a node wallet act as a [`Signer`]
pub struct NodeSigner<'a, N: NodeClient + ?Sized> {
    pub node: &'a N,
}

impl<N: NodeClient + ?Sized> Signer for NodeSigner<'_, N> {
    fn sign_digest(&self, pubkey: &[u8], digest: &Hash) -> Result<ByteString> {
        Ok(self.node.sign_digest(pubkey, digest)?)
    }
}
