//! Funding and redemption workflows against an in-memory node

use std::cell::RefCell;

use p2sh_hashlock::node::{
    ensure_wallet, find_funding, fund_hash_lock, redeem_hash_branch, redeem_signature_branch, NodeClient, NodeError,
    NodeResult, WalletStatus,
};
use p2sh_hashlock::script::verify_input;
use p2sh_hashlock::transaction::deserialize_transaction;
use p2sh_hashlock::*;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

struct TestNode {
    key: SecretKey,
    utxos: RefCell<Vec<UtxoRef>>,
    broadcasts: RefCell<Vec<String>>,
    reject_with: Option<String>,
    offline: bool,
}

impl TestNode {
    fn new() -> Self {
        TestNode {
            key: SecretKey::from_slice(&[0xcd; 32]).unwrap(),
            utxos: RefCell::new(Vec::new()),
            broadcasts: RefCell::new(Vec::new()),
            reject_with: None,
            offline: false,
        }
    }

    fn rejecting(reason: &str) -> Self {
        TestNode {
            reject_with: Some(reason.to_string()),
            ..TestNode::new()
        }
    }

    fn offline() -> Self {
        TestNode {
            offline: true,
            ..TestNode::new()
        }
    }

    fn last_broadcast(&self) -> Transaction {
        let raw = self.broadcasts.borrow().last().cloned().unwrap();
        deserialize_transaction(&hex::decode(raw).unwrap()).unwrap()
    }
}

impl NodeClient for TestNode {
    fn create_wallet(&self, name: &str) -> NodeResult<()> {
        if self.offline {
            return Err(NodeError::Transport("connection refused".to_string()));
        }
        Err(NodeError::AlreadyExists(name.to_string()))
    }

    fn load_wallet(&self, _name: &str) -> NodeResult<()> {
        Ok(())
    }

    fn list_wallets(&self) -> NodeResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn received_outputs(&self, _address: &Address) -> NodeResult<Vec<UtxoRef>> {
        Ok(self.utxos.borrow().clone())
    }

    fn public_key(&self) -> NodeResult<ByteString> {
        let secp = Secp256k1::new();
        Ok(PublicKey::from_secret_key(&secp, &self.key).serialize().to_vec())
    }

    fn sign_digest(&self, _pubkey: &[u8], digest: &Hash) -> NodeResult<ByteString> {
        let secp = Secp256k1::new();
        let msg = Message::from_digest_slice(digest).map_err(|e| NodeError::Rejected(e.to_string()))?;
        Ok(secp.sign_ecdsa(&msg, &self.key).serialize_der().to_vec())
    }

    fn send_to_address(&self, address: &Address, amount: u64) -> NodeResult<Txid> {
        let mut utxos = self.utxos.borrow_mut();
        let txid = Txid([utxos.len() as u8 + 1; 32]);
        utxos.push(UtxoRef::new(txid, 0, amount, address.script_pubkey()));
        Ok(txid)
    }

    fn broadcast(&self, raw_hex: &str) -> NodeResult<Txid> {
        if let Some(reason) = &self.reject_with {
            return Err(NodeError::Rejected(reason.clone()));
        }
        self.broadcasts.borrow_mut().push(raw_hex.to_string());
        let bytes = hex::decode(raw_hex).map_err(|e| NodeError::Rejected(e.to_string()))?;
        let tx = deserialize_transaction(&bytes).map_err(|e| NodeError::Rejected(e.to_string()))?;
        Ok(transaction::compute_txid(&tx))
    }
}

#[test]
fn test_existing_wallet_is_loaded() {
    let node = TestNode::new();
    assert_eq!(ensure_wallet(&node, "hashlock").unwrap(), WalletStatus::Loaded);
}

#[test]
fn test_transport_error_surfaces() {
    let node = TestNode::offline();
    assert!(matches!(
        ensure_wallet(&node, "hashlock"),
        Err(HashLockError::Node(NodeError::Transport(_)))
    ));
}

#[test]
fn test_hash_redemption_broadcasts_valid_spend() {
    let node = TestNode::new();
    let funded = fund_hash_lock(&node, b"secret data", Network::Regtest, 100_000_000).unwrap();
    let txid = redeem_hash_branch(&node, &Assembler::default(), &funded.params, b"secret data", 1000).unwrap();

    let tx = node.last_broadcast();
    assert_eq!(transaction::compute_txid(&tx), txid);
    assert_eq!(tx.inputs.len(), 1);
    assert_eq!(tx.outputs[0].value, 100_000_000 - 1000);

    let utxo = node.utxos.borrow()[0].clone();
    assert!(verify_input(&tx, 0, &utxo).unwrap());
}

#[test]
fn test_signature_redemption_sweeps_all_outputs() {
    let node = TestNode::new();
    let funded = fund_hash_lock(&node, b"secret data", Network::Regtest, 40_000).unwrap();
    node.send_to_address(&funded.address, 60_000).unwrap();

    redeem_signature_branch(&node, &Assembler::default(), &funded.params, 2000).unwrap();

    let tx = node.last_broadcast();
    assert_eq!(tx.inputs.len(), 2);
    assert_eq!(tx.outputs[0].value, 98_000);
    for (i, utxo) in node.utxos.borrow().iter().enumerate() {
        assert!(verify_input(&tx, i, utxo).unwrap());
    }
}

#[test]
fn test_rejection_propagates() {
    let node = TestNode::rejecting("bad-txns-inputs-missingorspent");
    let funded = fund_hash_lock(&node, b"secret data", Network::Regtest, 100_000).unwrap();
    let result = redeem_hash_branch(&node, &Assembler::default(), &funded.params, b"secret data", 1000);
    match result {
        Err(HashLockError::Node(NodeError::Rejected(reason))) => {
            assert_eq!(reason, "bad-txns-inputs-missingorspent");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_fee_above_funding() {
    let node = TestNode::new();
    let funded = fund_hash_lock(&node, b"secret data", Network::Regtest, 500).unwrap();
    let result = redeem_hash_branch(&node, &Assembler::default(), &funded.params, b"secret data", 1000);
    assert!(matches!(result, Err(HashLockError::InvalidTransaction(_))));
    assert!(node.broadcasts.borrow().is_empty());
}

#[test]
fn test_unfunded_lock() {
    let node = TestNode::new();
    let pubkey = node.public_key().unwrap();
    let params = HashLockParams::from_secret(b"never funded", &pubkey, Network::Regtest).unwrap();
    assert!(matches!(
        find_funding(&node, &params),
        Err(HashLockError::Node(NodeError::NotFound(_)))
    ));
}

#[test]
fn test_fee_rate_ceiling_follows_assembler() {
    let node = TestNode::new();
    let funded = fund_hash_lock(&node, b"secret data", Network::Regtest, 2_000_000).unwrap();

    // Roughly 9_400 sat/vB on a 160-byte single-input sweep
    let fee = 1_500_000;
    let result = redeem_hash_branch(&node, &Assembler::default(), &funded.params, b"secret data", fee);
    assert!(matches!(result, Err(HashLockError::ExcessiveFeeSuspected { .. })));
    assert!(node.broadcasts.borrow().is_empty());

    let lenient = Assembler::new(AssemblerConfig {
        max_fee_rate: 20_000,
        ..AssemblerConfig::default()
    });
    redeem_hash_branch(&node, &lenient, &funded.params, b"secret data", fee).unwrap();
    assert_eq!(node.last_broadcast().outputs[0].value, 2_000_000 - fee);
}
