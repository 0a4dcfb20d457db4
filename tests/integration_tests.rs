//! End-to-end lock and redemption through both branches

use p2sh_hashlock::constants::SIGHASH_ALL;
use p2sh_hashlock::hash::hash160;
use p2sh_hashlock::script::verify_input;
use p2sh_hashlock::transaction::deserialize_transaction;
use p2sh_hashlock::unlocking::{SignatureFinalizer, Signer};
use p2sh_hashlock::*;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

const PUBKEY_HEX: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
const FUNDING_TXID: &str = "9f71ceb4feaab6c8d8e209763e1e9bece87c0054024a234ae75a96082a5572ca";

struct KeySigner(SecretKey);

impl Signer for KeySigner {
    fn sign_digest(&self, _pubkey: &[u8], digest: &Hash) -> Result<ByteString> {
        let secp = Secp256k1::new();
        let msg = Message::from_digest_slice(digest).map_err(|e| HashLockError::InvalidSignature(e.to_string()))?;
        Ok(secp.sign_ecdsa(&msg, &self.0).serialize_der().to_vec())
    }
}

fn wallet_key() -> (SecretKey, Vec<u8>) {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[0xcd; 32]).unwrap();
    let pk = PublicKey::from_secret_key(&secp, &sk).serialize().to_vec();
    (sk, pk)
}

#[test]
fn test_demo_vectors() {
    let pubkey = hex::decode(PUBKEY_HEX).unwrap();
    let elements = build_hash_or_sig_script(&hash160(b"secret data"), &pubkey).unwrap();
    let redeem_script = compile(&elements).unwrap();

    assert_eq!(
        redeem_script.to_hex(),
        "63a914ad582075f9ec4af34c04628bcc33eec55060cd638767210279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798ac68"
    );
    assert_eq!(
        hex::encode(redeem_script.script_hash()),
        "d21b96817060f096bd13ec782b60785dd846f80c"
    );
    assert_eq!(
        derive_address(&redeem_script, Network::Regtest).as_str(),
        "2NCQAwQjsG9AhTijHM7bErtAqrMyA46Rpg2"
    );
    assert_eq!(
        derive_address(&redeem_script, Network::Testnet).as_str(),
        "2NCQAwQjsG9AhTijHM7bErtAqrMyA46Rpg2"
    );
    assert_eq!(
        derive_address(&redeem_script, Network::Mainnet).as_str(),
        "3LqxsfoqegfMFw6jfyyNEwBae1kzFmkxWz"
    );
}

#[test]
fn test_hash_branch_redemption() {
    let pubkey = hex::decode(PUBKEY_HEX).unwrap();
    let lock = P2shHashLock::new(Network::Regtest);
    let params = lock.lock_to_secret(b"secret data", &pubkey).unwrap();
    let redeem_script = params.redeem_script().unwrap();
    let address = params.address().unwrap();

    let unlock = build_hash_unlock(b"secret data", &redeem_script).unwrap();
    assert_eq!(
        hex::encode(unlock.script_sig()),
        "0b7365637265742064617461513d63a914ad582075f9ec4af34c04628bcc33eec55060cd638767210279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798ac68"
    );

    let utxo = UtxoRef::new(
        Txid::from_hex(FUNDING_TXID).unwrap(),
        0,
        100_000_000,
        address.script_pubkey(),
    );
    let tx = lock
        .assemble(&[(utxo.clone(), unlock)], &[Payment::to_address(&address, 100_000_000 - 1000)])
        .unwrap();

    assert_eq!(
        tx.to_hex(),
        "0200000001ca72552a08965ae74a234a0254007ce8ec9b1e3e7609e2d8c8b6aafeb4ce719f000000004b0b7365637265742064617461513d63a914ad582075f9ec4af34c04628bcc33eec55060cd638767210279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798ac68ffffffff0118ddf5050000000017a914d21b96817060f096bd13ec782b60785dd846f80c8700000000"
    );
    assert_eq!(
        tx.txid.to_string(),
        "8f560b4120147cf9890a6faff0b663ce3cb71f75ca94c369c5b5eb46630194a6"
    );
    assert!(verify_input(&tx.transaction, 0, &utxo).unwrap());

    // What a node would read back
    let parsed = deserialize_transaction(&tx.bytes).unwrap();
    assert!(verify_input(&parsed, 0, &utxo).unwrap());
}

#[test]
fn test_signature_branch_redemption() {
    let (sk, pubkey) = wallet_key();
    let lock = P2shHashLock::new(Network::Regtest);
    let params = lock.lock_to_secret(b"secret data", &pubkey).unwrap();
    let redeem_script = params.redeem_script().unwrap();
    let address = params.address().unwrap();
    let utxo = UtxoRef::new(Txid([7; 32]), 1, 50_000, address.script_pubkey());

    let signer = KeySigner(sk);
    let finalizer = SignatureFinalizer::new(&signer, &pubkey, redeem_script);
    let tx = lock
        .assemble_with(&[(utxo.clone(), &finalizer as &dyn InputFinalizer)], &[Payment::to_address(&address, 49_000)])
        .unwrap();

    assert!(verify_input(&tx.transaction, 0, &utxo).unwrap());
}

#[test]
fn test_signature_branch_two_step() {
    // Digest computed offline, signed elsewhere, then attached
    let (sk, pubkey) = wallet_key();
    let lock = P2shHashLock::new(Network::Regtest);
    let params = lock.lock_to_secret(b"secret data", &pubkey).unwrap();
    let redeem_script = params.redeem_script().unwrap();
    let address = params.address().unwrap();
    let utxo = UtxoRef::new(Txid([7; 32]), 0, 50_000, address.script_pubkey());
    let payment = Payment::to_address(&address, 49_000);

    let draft = lock.draft(&[utxo.clone()], &[payment.clone()]).unwrap();
    let digest = lock.signature_hash(&draft, 0, &redeem_script).unwrap();
    let mut signature = KeySigner(sk).sign_digest(&pubkey, &digest).unwrap();
    signature.push(SIGHASH_ALL as u8);

    let unlock = build_sig_unlock(&signature, &pubkey, &redeem_script).unwrap();
    assert_eq!(unlock.branch(), Branch::Signature);
    let tx = lock.assemble(&[(utxo.clone(), unlock)], &[payment]).unwrap();
    assert!(verify_input(&tx.transaction, 0, &utxo).unwrap());
}

#[test]
fn test_signature_over_other_outputs_fails_verification() {
    let (sk, pubkey) = wallet_key();
    let lock = P2shHashLock::new(Network::Regtest);
    let params = lock.lock_to_secret(b"secret data", &pubkey).unwrap();
    let redeem_script = params.redeem_script().unwrap();
    let address = params.address().unwrap();
    let utxo = UtxoRef::new(Txid([7; 32]), 0, 50_000, address.script_pubkey());

    // Signed for 49_000, spent as 48_000
    let draft = lock
        .draft(&[utxo.clone()], &[Payment::to_address(&address, 49_000)])
        .unwrap();
    let digest = lock.signature_hash(&draft, 0, &redeem_script).unwrap();
    let mut signature = KeySigner(sk).sign_digest(&pubkey, &digest).unwrap();
    signature.push(SIGHASH_ALL as u8);

    let unlock = build_sig_unlock(&signature, &pubkey, &redeem_script).unwrap();
    let tx = lock
        .assemble(&[(utxo.clone(), unlock)], &[Payment::to_address(&address, 48_000)])
        .unwrap();
    assert!(!verify_input(&tx.transaction, 0, &utxo).unwrap());
}

#[test]
fn test_two_inputs_same_lock() {
    let (sk, pubkey) = wallet_key();
    let lock = P2shHashLock::new(Network::Regtest);
    let params = lock.lock_to_secret(b"secret data", &pubkey).unwrap();
    let redeem_script = params.redeem_script().unwrap();
    let address = params.address().unwrap();
    let first = UtxoRef::new(Txid([1; 32]), 0, 30_000, address.script_pubkey());
    let second = UtxoRef::new(Txid([2; 32]), 3, 20_000, address.script_pubkey());

    // One input through each branch
    let hash_unlock = build_hash_unlock(b"secret data", &redeem_script).unwrap();
    let signer = KeySigner(sk);
    let finalizer = SignatureFinalizer::new(&signer, &pubkey, redeem_script);
    let destination = Address::p2pkh_from_hash(hash160(&pubkey), Network::Regtest);

    let tx = lock
        .assemble_with(
            &[
                (first.clone(), &hash_unlock as &dyn InputFinalizer),
                (second.clone(), &finalizer as &dyn InputFinalizer),
            ],
            &[Payment::to_address(&destination, 49_000)],
        )
        .unwrap();

    assert_eq!(tx.fee(), 1000);
    assert!(verify_input(&tx.transaction, 0, &first).unwrap());
    assert!(verify_input(&tx.transaction, 1, &second).unwrap());
}

#[test]
fn test_params_record_reproduces_address() {
    let pubkey = hex::decode(PUBKEY_HEX).unwrap();
    let params = HashLockParams::from_secret(b"secret data", &pubkey, Network::Regtest).unwrap();
    let json = params.to_json().unwrap();

    let restored = HashLockParams::from_json(&json).unwrap();
    let address = restored.address().unwrap();
    assert!(address.matches_script(&restored.redeem_script().unwrap()));
    assert_eq!(address.as_str(), "2NCQAwQjsG9AhTijHM7bErtAqrMyA46Rpg2");
}
