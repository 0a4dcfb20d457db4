//! Core types shared by the compiler, builders and assembler

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{HashLockError, Result};

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Hash type: 160-bit hash
pub type Digest160 = [u8; 20];

/// Byte string type
pub type ByteString = Vec<u8>;

/// One element of an uncompiled script: an opcode or a data push
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptElement {
    Op(u8),
    Data(ByteString),
}

impl ScriptElement {
    pub fn data(bytes: impl AsRef<[u8]>) -> Self {
        ScriptElement::Data(bytes.as_ref().to_vec())
    }
}

/// Serialized script program
///
/// Only produced by [`crate::compiler::compile`] or by wrapping raw bytes
/// read back from the ledger; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompiledScript(ByteString);

impl CompiledScript {
    pub fn from_bytes(bytes: impl Into<ByteString>) -> Self {
        CompiledScript(bytes.into())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(CompiledScript)
            .map_err(|e| HashLockError::Serialization(format!("script hex: {}", e)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> ByteString {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// RIPEMD160(SHA256(script)), the value a P2SH output commits to
    pub fn script_hash(&self) -> Digest160 {
        crate::hash::hash160(&self.0)
    }
}

impl AsRef<[u8]> for CompiledScript {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Transaction id in internal (little-endian) byte order.
///
/// Text form is the byte-reversed hex that node RPC interfaces print, and
/// serde uses the same form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Txid(pub Hash);

impl Txid {
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| HashLockError::Serialization(format!("txid hex: {}", e)))?;
        if bytes.len() != 32 {
            return Err(HashLockError::InvalidParameterLength {
                what: "txid",
                expected: "32",
                actual: bytes.len(),
            });
        }
        let mut hash = [0u8; 32];
        for (i, b) in bytes.iter().rev().enumerate() {
            hash[i] = *b;
        }
        Ok(Txid(hash))
    }

    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Txid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Txid::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({})", self.to_hex())
    }
}

/// Reference to a previous transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

/// A spendable output: where it is, what it holds, and the script it is locked by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRef {
    pub outpoint: OutPoint,
    pub amount: u64,
    pub script_pubkey: ByteString,
}

impl UtxoRef {
    pub fn new(txid: Txid, vout: u32, amount: u64, script_pubkey: ByteString) -> Self {
        UtxoRef {
            outpoint: OutPoint { txid, vout },
            amount,
            script_pubkey,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: u64,
    pub script_pubkey: ByteString,
}

/// Legacy (non-witness) transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txid_hex_is_byte_reversed() {
        let txid = Txid::from_hex(
            "9f71ceb4feaab6c8d8e209763e1e9bece87c0054024a234ae75a96082a5572ca",
        )
        .unwrap();
        assert_eq!(txid.0[0], 0xca);
        assert_eq!(txid.0[31], 0x9f);
        assert_eq!(
            txid.to_string(),
            "9f71ceb4feaab6c8d8e209763e1e9bece87c0054024a234ae75a96082a5572ca"
        );
    }

    #[test]
    fn test_txid_wrong_length() {
        let result = Txid::from_hex("abcd");
        assert!(matches!(
            result,
            Err(HashLockError::InvalidParameterLength { what: "txid", actual: 2, .. })
        ));
    }

    #[test]
    fn test_txid_bad_hex() {
        assert!(matches!(Txid::from_hex("zz"), Err(HashLockError::Serialization(_))));
    }

    #[test]
    fn test_txid_json_uses_rpc_hex() {
        let hex = "9f71ceb4feaab6c8d8e209763e1e9bece87c0054024a234ae75a96082a5572ca";
        let utxo = UtxoRef::new(Txid::from_hex(hex).unwrap(), 0, 1000, vec![0x51]);

        let json = serde_json::to_string(&utxo).unwrap();
        assert!(json.contains(&format!("\"txid\":\"{}\"", hex)));

        let back: UtxoRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, utxo);
        assert!(serde_json::from_str::<Txid>("\"abcd\"").is_err());
    }

    #[test]
    fn test_compiled_script_hex() {
        let script = CompiledScript::from_hex("51").unwrap();
        assert_eq!(script.as_bytes(), &[0x51]);
        assert_eq!(script.len(), 1);
        assert_eq!(script.to_hex(), "51");
    }
}
