//! Hash-or-signature locking script
//!
//! ```text
//! OP_IF
//!     OP_HASH160 <digest> OP_EQUAL
//! OP_ELSE
//!     <pubkey> OP_CHECKSIG
//! OP_ENDIF
//! ```
//!
//! The redeemer picks a branch by pushing a truthy or falsy selector right
//! before the redeem script, so OP_IF consumes it first.

use serde::{Deserialize, Serialize};

use crate::address::{derive_address, Address, Network};
use crate::compiler::{compile, decompile};
use crate::constants::{COMPRESSED_PUBKEY_LEN, HASH160_LEN, UNCOMPRESSED_PUBKEY_LEN};
use crate::error::{HashLockError, Result};
use crate::hash::hash160;
use crate::opcodes::*;
use crate::types::{ByteString, CompiledScript, Digest160, ScriptElement};

/// Element sequence of the hash-or-signature template.
///
/// `digest` must be 20 bytes and `pubkey` a 33- or 65-byte SEC1 key.
pub fn build_hash_or_sig_script(digest: &[u8], pubkey: &[u8]) -> Result<Vec<ScriptElement>> {
    check_digest(digest)?;
    check_pubkey(pubkey)?;

    Ok(vec![
        ScriptElement::Op(OP_IF),
        ScriptElement::Op(OP_HASH160),
        ScriptElement::data(digest),
        ScriptElement::Op(OP_EQUAL),
        ScriptElement::Op(OP_ELSE),
        ScriptElement::data(pubkey),
        ScriptElement::Op(OP_CHECKSIG),
        ScriptElement::Op(OP_ENDIF),
    ])
}

/// Build and compile the template in one step
pub fn compile_hash_or_sig_script(digest: &[u8], pubkey: &[u8]) -> Result<CompiledScript> {
    compile(&build_hash_or_sig_script(digest, pubkey)?)
}

pub(crate) fn check_digest(digest: &[u8]) -> Result<()> {
    if digest.len() != HASH160_LEN {
        return Err(HashLockError::InvalidParameterLength {
            what: "digest",
            expected: "20",
            actual: digest.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_pubkey(pubkey: &[u8]) -> Result<()> {
    if pubkey.len() != COMPRESSED_PUBKEY_LEN && pubkey.len() != UNCOMPRESSED_PUBKEY_LEN {
        return Err(HashLockError::InvalidParameterLength {
            what: "pubkey",
            expected: "33 or 65",
            actual: pubkey.len(),
        });
    }
    Ok(())
}

/// Parameters recovered from a compiled hash-or-signature script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOrSigTemplate {
    pub digest: Digest160,
    pub pubkey: ByteString,
}

impl HashOrSigTemplate {
    /// Recognize a compiled script as the template and extract its parameters
    pub fn parse(script: &CompiledScript) -> Result<Self> {
        let elements = decompile(script.as_bytes())?;

        match elements.as_slice() {
            [ScriptElement::Op(OP_IF), ScriptElement::Op(OP_HASH160), ScriptElement::Data(digest), ScriptElement::Op(OP_EQUAL), ScriptElement::Op(OP_ELSE), ScriptElement::Data(pubkey), ScriptElement::Op(OP_CHECKSIG), ScriptElement::Op(OP_ENDIF)] =>
            {
                check_digest(digest)?;
                check_pubkey(pubkey)?;
                let mut out = [0u8; 20];
                out.copy_from_slice(digest);
                Ok(HashOrSigTemplate {
                    digest: out,
                    pubkey: pubkey.clone(),
                })
            }
            _ => Err(HashLockError::MalformedScript(
                "not a hash-or-signature script".to_string(),
            )),
        }
    }

    pub fn compile(&self) -> Result<CompiledScript> {
        compile_hash_or_sig_script(&self.digest, &self.pubkey)
    }
}

/// What a redeemer has to keep between funding and redemption.
///
/// The redeem script itself is never stored; it is recompiled from these
/// parameters and reproduces the funded address byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashLockParams {
    pub network: Network,
    #[serde(with = "hex_digest")]
    pub digest: Digest160,
    #[serde(with = "hex_bytes")]
    pub pubkey: ByteString,
}

impl HashLockParams {
    pub fn new(network: Network, digest: &[u8], pubkey: &[u8]) -> Result<Self> {
        check_digest(digest)?;
        check_pubkey(pubkey)?;
        let mut out = [0u8; 20];
        out.copy_from_slice(digest);
        Ok(HashLockParams {
            network,
            digest: out,
            pubkey: pubkey.to_vec(),
        })
    }

    /// Parameters locking funds to `hash160(secret)` or `pubkey`
    pub fn from_secret(secret: &[u8], pubkey: &[u8], network: Network) -> Result<Self> {
        Self::new(network, &hash160(secret), pubkey)
    }

    pub fn redeem_script(&self) -> Result<CompiledScript> {
        compile_hash_or_sig_script(&self.digest, &self.pubkey)
    }

    pub fn address(&self) -> Result<Address> {
        Ok(derive_address(&self.redeem_script()?, self.network))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| HashLockError::Serialization(e.to_string()))
    }

    /// Parse a stored record, re-checking parameter lengths
    pub fn from_json(s: &str) -> Result<Self> {
        let params: HashLockParams =
            serde_json::from_str(s).map_err(|e| HashLockError::Serialization(e.to_string()))?;
        check_pubkey(&params.pubkey)?;
        Ok(params)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 20], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::custom(format!("digest of {} bytes", v.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY_HEX: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn pubkey() -> Vec<u8> {
        hex::decode(PUBKEY_HEX).unwrap()
    }

    #[test]
    fn test_build_template_shape() {
        let digest = hash160(b"secret data");
        let elements = build_hash_or_sig_script(&digest, &pubkey()).unwrap();
        assert_eq!(elements.len(), 8);
        assert_eq!(elements[0], ScriptElement::Op(OP_IF));
        assert_eq!(elements[2], ScriptElement::Data(digest.to_vec()));
        assert_eq!(elements[5], ScriptElement::Data(pubkey()));
        assert_eq!(elements[7], ScriptElement::Op(OP_ENDIF));
    }

    #[test]
    fn test_compiled_template_bytes() {
        let digest = hash160(b"secret data");
        let script = compile_hash_or_sig_script(&digest, &pubkey()).unwrap();
        assert_eq!(script.len(), 61);
        assert_eq!(
            script.to_hex(),
            "63a914ad582075f9ec4af34c04628bcc33eec55060cd638767210279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798ac68"
        );
    }

    #[test]
    fn test_uncompressed_pubkey_accepted() {
        let mut key = vec![0x04];
        key.extend_from_slice(&[0x11; 64]);
        let script = compile_hash_or_sig_script(&[0u8; 20], &key).unwrap();
        assert_eq!(script.len(), 1 + 1 + 21 + 1 + 1 + 66 + 1 + 1);
    }

    #[test]
    fn test_wrong_digest_length() {
        let result = build_hash_or_sig_script(&[0u8; 32], &pubkey());
        assert!(matches!(
            result,
            Err(HashLockError::InvalidParameterLength { what: "digest", actual: 32, .. })
        ));
    }

    #[test]
    fn test_wrong_pubkey_length() {
        let result = build_hash_or_sig_script(&[0u8; 20], &[0x02; 32]);
        assert!(matches!(
            result,
            Err(HashLockError::InvalidParameterLength { what: "pubkey", actual: 32, .. })
        ));
    }

    #[test]
    fn test_parse_template() {
        let digest = hash160(b"secret data");
        let script = compile_hash_or_sig_script(&digest, &pubkey()).unwrap();
        let parsed = HashOrSigTemplate::parse(&script).unwrap();
        assert_eq!(parsed.digest, digest);
        assert_eq!(parsed.pubkey, pubkey());
        assert_eq!(parsed.compile().unwrap(), script);
    }

    #[test]
    fn test_parse_rejects_other_scripts() {
        let script = CompiledScript::from_bytes(vec![OP_5, OP_8, OP_ADD, OP_13, OP_EQUAL]);
        assert!(matches!(
            HashOrSigTemplate::parse(&script),
            Err(HashLockError::MalformedScript(_))
        ));
    }

    #[test]
    fn test_params_json_round_trip() {
        let params = HashLockParams::from_secret(b"secret data", &pubkey(), Network::Regtest).unwrap();
        let json = params.to_json().unwrap();
        assert!(json.contains("\"regtest\""));
        assert!(json.contains("ad582075f9ec4af34c04628bcc33eec55060cd63"));
        let restored = HashLockParams::from_json(&json).unwrap();
        assert_eq!(restored, params);
        assert_eq!(
            restored.address().unwrap().as_str(),
            "2NCQAwQjsG9AhTijHM7bErtAqrMyA46Rpg2"
        );
    }

    #[test]
    fn test_params_json_rejects_short_digest() {
        let json = r#"{"network":"regtest","digest":"abcd","pubkey":"02"}"#;
        assert!(matches!(
            HashLockParams::from_json(json),
            Err(HashLockError::Serialization(_))
        ));
    }
}
