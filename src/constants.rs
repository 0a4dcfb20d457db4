//! Consensus and policy constants used by script construction and assembly

/// Maximum money supply: 21,000,000 BTC in satoshis
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: u64 = 100_000_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum stack size during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations in a script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Maximum number of inputs per assembled transaction
pub const MAX_INPUTS: usize = 1000;

/// Maximum number of outputs per assembled transaction
pub const MAX_OUTPUTS: usize = 1000;

/// Length of a hash160 digest
pub const HASH160_LEN: usize = 20;

/// Length of a compressed SEC1 public key
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Length of an uncompressed SEC1 public key
pub const UNCOMPRESSED_PUBKEY_LEN: usize = 65;

/// Transaction version used for assembled spends
pub const DEFAULT_TX_VERSION: u32 = 2;

/// Sequence number for final transaction
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Ceiling on the implied fee rate, in satoshis per virtual byte
pub const DEFAULT_MAX_FEE_RATE: u64 = 5_000;

/// Sign all inputs and all outputs
pub const SIGHASH_ALL: u32 = 0x01;
