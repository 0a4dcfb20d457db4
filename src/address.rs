//! Address derivation and parsing
//!
//! P2SH addresses are derived from a compiled redeem script as
//! Base58Check(version || hash160(script)). Parsing also accepts P2PKH and
//! segwit v0 addresses so a spend can pay back into an ordinary wallet address.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::HASH160_LEN;
use crate::error::{HashLockError, Result};
use crate::hash::{hash160, sha256d};
use crate::opcodes::*;
use crate::types::{ByteString, CompiledScript, Digest160};

/// Ledger network an address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    pub fn p2pkh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            _ => 0x6f,
        }
    }

    pub fn p2sh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            _ => 0xc4,
        }
    }

    pub fn bech32_hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "bc",
            Network::Testnet | Network::Signet => "tb",
            Network::Regtest => "bcrt",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }
}

impl FromStr for Network {
    type Err = HashLockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" | "bitcoin" => Ok(Network::Mainnet),
            "test" | "testnet" | "testnet3" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(HashLockError::UnsupportedNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an address commits to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressPayload {
    PubkeyHash(Digest160),
    ScriptHash(Digest160),
    WitnessV0(ByteString),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub network: Network,
    pub payload: AddressPayload,
    text: String,
}

impl Address {
    /// P2SH address for a script hash
    pub fn p2sh_from_hash(script_hash: Digest160, network: Network) -> Self {
        let text = base58check_encode(network.p2sh_version(), &script_hash);
        Address {
            network,
            payload: AddressPayload::ScriptHash(script_hash),
            text,
        }
    }

    /// P2PKH address for a public key hash
    pub fn p2pkh_from_hash(pubkey_hash: Digest160, network: Network) -> Self {
        let text = base58check_encode(network.p2pkh_version(), &pubkey_hash);
        Address {
            network,
            payload: AddressPayload::PubkeyHash(pubkey_hash),
            text,
        }
    }

    /// Parse an address and check that it belongs to `network`.
    ///
    /// Testnet, signet and regtest share base58 version bytes, so the network
    /// has to be supplied rather than inferred.
    pub fn parse(s: &str, network: Network) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        let hrp_prefix = format!("{}1", network.bech32_hrp());
        if lower.starts_with(&hrp_prefix) {
            return parse_segwit(s, network);
        }
        parse_base58(s, network)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The 20-byte hash committed to by a P2SH or P2PKH address
    pub fn hash(&self) -> Option<Digest160> {
        match &self.payload {
            AddressPayload::PubkeyHash(h) | AddressPayload::ScriptHash(h) => Some(*h),
            AddressPayload::WitnessV0(_) => None,
        }
    }

    /// Output script paying to this address
    pub fn script_pubkey(&self) -> ByteString {
        match &self.payload {
            AddressPayload::PubkeyHash(h) => {
                let mut script = vec![OP_DUP, OP_HASH160, HASH160_LEN as u8];
                script.extend_from_slice(h);
                script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
                script
            }
            AddressPayload::ScriptHash(h) => p2sh_script_pubkey(h),
            AddressPayload::WitnessV0(program) => {
                let mut script = vec![OP_0, program.len() as u8];
                script.extend_from_slice(program);
                script
            }
        }
    }

    /// True when this is a P2SH address committing to `script`
    pub fn matches_script(&self, script: &CompiledScript) -> bool {
        match &self.payload {
            AddressPayload::ScriptHash(h) => *h == script.script_hash(),
            _ => false,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Derive the P2SH address of a redeem script
pub fn derive_address(script: &CompiledScript, network: Network) -> Address {
    let address = Address::p2sh_from_hash(script.script_hash(), network);
    tracing::debug!(
        network = %network,
        script_len = script.len(),
        address = %address,
        "derived P2SH address"
    );
    address
}

/// Derive the P2SH address of a redeem script for a network given by name
pub fn derive_address_for(script: &CompiledScript, network: &str) -> Result<Address> {
    let network = Network::from_str(network)?;
    Ok(derive_address(script, network))
}

/// OP_HASH160 <script_hash> OP_EQUAL
pub fn p2sh_script_pubkey(script_hash: &Digest160) -> ByteString {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    script.push(HASH160_LEN as u8);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// Script hash of a P2SH output script, if it is one
pub fn p2sh_script_hash(script_pubkey: &[u8]) -> Option<Digest160> {
    match script_pubkey {
        [OP_HASH160, 0x14, hash @ .., OP_EQUAL] if hash.len() == HASH160_LEN => {
            let mut out = [0u8; 20];
            out.copy_from_slice(hash);
            Some(out)
        }
        _ => None,
    }
}

// =============================================================================
// Base58Check
// =============================================================================

fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = sha256d(&data);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

fn parse_base58(s: &str, network: Network) -> Result<Address> {
    let decoded = bs58::decode(s)
        .into_vec()
        .map_err(|_| HashLockError::InvalidAddress(format!("bad base58 in '{}'", s)))?;

    if decoded.len() != 25 {
        return Err(HashLockError::InvalidAddress(format!(
            "'{}' decodes to {} bytes, expected 25",
            s,
            decoded.len()
        )));
    }

    let checksum = sha256d(&decoded[..21]);
    if decoded[21..25] != checksum[..4] {
        return Err(HashLockError::InvalidAddress(format!("checksum mismatch in '{}'", s)));
    }

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&decoded[1..21]);

    let payload = if decoded[0] == network.p2sh_version() {
        AddressPayload::ScriptHash(hash)
    } else if decoded[0] == network.p2pkh_version() {
        AddressPayload::PubkeyHash(hash)
    } else {
        return Err(HashLockError::InvalidAddress(format!(
            "version byte 0x{:02x} of '{}' does not belong to {}",
            decoded[0], s, network
        )));
    };

    Ok(Address {
        network,
        payload,
        text: s.to_string(),
    })
}

// =============================================================================
// Bech32 (BIP173), witness version 0 only
// =============================================================================

const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

fn parse_segwit(s: &str, network: Network) -> Result<Address> {
    if s.chars().any(|c| c.is_ascii_uppercase()) && s.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(HashLockError::InvalidAddress(format!("mixed case in '{}'", s)));
    }
    let lower = s.to_ascii_lowercase();

    let pos = lower
        .rfind('1')
        .ok_or_else(|| HashLockError::InvalidAddress(format!("no separator in '{}'", s)))?;
    if pos < 1 || pos + 7 > lower.len() {
        return Err(HashLockError::InvalidAddress(format!("bad length of '{}'", s)));
    }

    let hrp = &lower[..pos];
    if hrp != network.bech32_hrp() {
        return Err(HashLockError::InvalidAddress(format!(
            "hrp '{}' does not belong to {}",
            hrp, network
        )));
    }

    let mut values = Vec::with_capacity(lower.len() - pos - 1);
    for c in lower[pos + 1..].bytes() {
        let idx = BECH32_CHARSET
            .iter()
            .position(|&x| x == c)
            .ok_or_else(|| HashLockError::InvalidAddress(format!("bad character in '{}'", s)))?;
        values.push(idx as u8);
    }

    if bech32_polymod_with_hrp(hrp, &values) != 1 {
        return Err(HashLockError::InvalidAddress(format!("checksum mismatch in '{}'", s)));
    }

    let version = values[0];
    if version != 0 {
        return Err(HashLockError::InvalidAddress(format!(
            "witness version {} is not supported",
            version
        )));
    }

    let program = convert_bits(&values[1..values.len() - 6], 5, 8, false)
        .ok_or_else(|| HashLockError::InvalidAddress(format!("bad padding in '{}'", s)))?;
    if program.len() != 20 && program.len() != 32 {
        return Err(HashLockError::InvalidAddress(format!(
            "witness v0 program of {} bytes",
            program.len()
        )));
    }

    Ok(Address {
        network,
        payload: AddressPayload::WitnessV0(program),
        text: lower,
    })
}

fn bech32_polymod_with_hrp(hrp: &str, data: &[u8]) -> u32 {
    let mut values: Vec<u8> = hrp.bytes().map(|c| c >> 5).collect();
    values.push(0);
    values.extend(hrp.bytes().map(|c| c & 31));
    values.extend_from_slice(data);
    bech32_polymod(&values)
}

fn bech32_polymod(values: &[u8]) -> u32 {
    let generator: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    let mut chk: u32 = 1;

    for v in values {
        let top = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ (*v as u32);
        for (i, g) in generator.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }

    chk
}

fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut ret = Vec::new();
    let maxv: u32 = (1 << to_bits) - 1;

    for value in data {
        acc = ((acc << from_bits) | (*value as u32)) & 0xfff;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }

    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return None;
    }

    Some(ret)
}
