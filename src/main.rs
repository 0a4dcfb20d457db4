use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use p2sh_hashlock::compiler::to_asm;
use p2sh_hashlock::constants::{DEFAULT_MAX_FEE_RATE, SATOSHIS_PER_BTC};
use p2sh_hashlock::*;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hashlock")]
#[command(about = "Hash-or-signature P2SH locks, offline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the redeem script and P2SH address for a secret and key
    Lock {
        #[command(flatten)]
        secret: SecretArg,
        /// Public key (hex, 33 or 65 bytes)
        #[arg(long)]
        pubkey: String,
        #[arg(long, default_value = "regtest")]
        network: String,
        /// Write the parameter record here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Spend a funded lock through the hash branch
    Redeem {
        /// Parameter record written by `lock`
        #[arg(long)]
        params: PathBuf,
        #[command(flatten)]
        secret: SecretArg,
        #[command(flatten)]
        spend: SpendArgs,
    },

    /// Print the digest a wallet must sign to spend through the key branch
    SignRedeemDigest {
        #[arg(long)]
        params: PathBuf,
        #[command(flatten)]
        spend: SpendArgs,
    },

    /// Spend a funded lock through the key branch with an external signature
    RedeemSig {
        #[arg(long)]
        params: PathBuf,
        /// DER signature over the digest from `sign-redeem-digest` (hex)
        #[arg(long)]
        signature: String,
        #[command(flatten)]
        spend: SpendArgs,
    },

    /// Show what an address pays to
    DecodeAddress {
        address: String,
        #[arg(long, default_value = "regtest")]
        network: String,
    },
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct SecretArg {
    /// Secret as UTF-8 text
    #[arg(long)]
    secret: Option<String>,
    /// Secret as hex
    #[arg(long)]
    secret_hex: Option<String>,
}

impl SecretArg {
    fn bytes(&self) -> Result<Vec<u8>> {
        match (&self.secret, &self.secret_hex) {
            (Some(text), _) => Ok(text.as_bytes().to_vec()),
            (None, Some(h)) => hex::decode(h).context("secret is not valid hex"),
            (None, None) => bail!("one of --secret or --secret-hex is required"),
        }
    }
}

#[derive(clap::Args)]
struct SpendArgs {
    /// Funding transaction id
    #[arg(long)]
    txid: String,
    #[arg(long, default_value = "0")]
    vout: u32,
    /// Funded amount in satoshis
    #[arg(long)]
    amount: u64,
    /// Destination address
    #[arg(long)]
    to: String,
    /// Fee in satoshis
    #[arg(long, default_value = "1000")]
    fee: u64,
    /// Fee rate ceiling in sat/vB
    #[arg(long, default_value_t = DEFAULT_MAX_FEE_RATE)]
    max_fee_rate: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "p2sh_hashlock=info,hashlock=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Lock { secret, pubkey, network, out } => {
            lock(&secret.bytes()?, &pubkey, &network, out, &mut std::io::stdout().lock())
        }
        Command::Redeem { params, secret, spend } => {
            let params = read_params(&params)?;
            let unlock = build_hash_unlock(&secret.bytes()?, &params.redeem_script()?)?;
            finish_spend(&params, unlock, &spend)
        }
        Command::SignRedeemDigest { params, spend } => {
            let params = read_params(&params)?;
            let (lock, utxo, payment) = spend_context(&params, &spend)?;
            let draft = lock.draft(&[utxo], &[payment])?;
            let digest = lock.signature_hash(&draft, 0, &params.redeem_script()?)?;
            println!("{}", hex::encode(digest));
            Ok(())
        }
        Command::RedeemSig { params, signature, spend } => {
            let params = read_params(&params)?;
            let mut signature = hex::decode(&signature).context("signature is not valid hex")?;
            signature.push(constants::SIGHASH_ALL as u8);
            let unlock = build_sig_unlock(&signature, &params.pubkey, &params.redeem_script()?)?;
            finish_spend(&params, unlock, &spend)
        }
        Command::DecodeAddress { address, network } => decode_address(&address, &network),
    }
}

/// Writes the parameter record to `out`, or to `stdout` when no path is given.
/// The human-readable summary goes to stderr so stdout stays a valid record.
fn lock(secret: &[u8], pubkey: &str, network: &str, out: Option<PathBuf>, stdout: &mut impl Write) -> Result<()> {
    let network: Network = network.parse()?;
    let pubkey = hex::decode(pubkey).context("pubkey is not valid hex")?;
    let params = HashLockParams::from_secret(secret, &pubkey, network)?;
    let redeem_script = params.redeem_script()?;
    let json = params.to_json()?;

    match out {
        Some(path) => {
            std::fs::write(&path, &json).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "saved lock parameters");
        }
        None => writeln!(stdout, "{}", json)?,
    }
    eprintln!("address:       {}", params.address()?);
    eprintln!("redeem script: {}", redeem_script.to_hex());
    eprintln!("asm:           {}", to_asm(redeem_script.as_bytes())?);
    Ok(())
}

fn read_params(path: &PathBuf) -> Result<HashLockParams> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(HashLockParams::from_json(&json)?)
}

fn spend_context(params: &HashLockParams, spend: &SpendArgs) -> Result<(P2shHashLock, UtxoRef, Payment)> {
    let lock = P2shHashLock::with_config(
        params.network,
        AssemblerConfig {
            max_fee_rate: spend.max_fee_rate,
            ..AssemblerConfig::default()
        },
    );
    let funded = params.address()?;
    let utxo = UtxoRef::new(Txid::from_hex(&spend.txid)?, spend.vout, spend.amount, funded.script_pubkey());

    let destination = Address::parse(&spend.to, params.network)?;
    let Some(amount) = spend.amount.checked_sub(spend.fee) else {
        bail!("fee {} exceeds funded amount {}", spend.fee, spend.amount);
    };
    Ok((lock, utxo, Payment::to_address(&destination, amount)))
}

fn finish_spend(params: &HashLockParams, unlock: UnlockingInput, spend: &SpendArgs) -> Result<()> {
    let (lock, utxo, payment) = spend_context(params, spend)?;
    let tx = lock.assemble(&[(utxo.clone(), unlock)], &[payment])?;

    if !lock.verify_input(&tx.transaction, 0, &utxo)? {
        bail!("assembled input does not satisfy the lock");
    }
    tracing::info!(
        fee_btc = %format!("{:.8}", tx.fee() as f64 / SATOSHIS_PER_BTC as f64),
        size = tx.size(),
        "spend verified"
    );

    println!("txid: {}", tx.txid);
    println!("{}", tx.to_hex());
    Ok(())
}

fn decode_address(text: &str, network: &str) -> Result<()> {
    let network: Network = network.parse()?;
    let address = Address::parse(text, network)?;
    let (kind, payload) = match &address.payload {
        address::AddressPayload::PubkeyHash(h) => ("p2pkh", hex::encode(h)),
        address::AddressPayload::ScriptHash(h) => ("p2sh", hex::encode(h)),
        address::AddressPayload::WitnessV0(p) if p.len() == 20 => ("p2wpkh", hex::encode(p)),
        address::AddressPayload::WitnessV0(p) => ("p2wsh", hex::encode(p)),
    };
    println!("network:       {}", address.network);
    println!("type:          {}", kind);
    println!("payload:       {}", payload);
    println!("script_pubkey: {}", hex::encode(address.script_pubkey()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY_HEX: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_lock_stdout_is_only_the_record() {
        let mut stdout = Vec::new();
        lock(b"secret data", PUBKEY_HEX, "regtest", None, &mut stdout).unwrap();

        let record = String::from_utf8(stdout).unwrap();
        let params = HashLockParams::from_json(&record).unwrap();
        assert_eq!(params.address().unwrap().as_str(), "2NCQAwQjsG9AhTijHM7bErtAqrMyA46Rpg2");
    }

    #[test]
    fn test_lock_out_file_leaves_stdout_empty() {
        let path = std::env::temp_dir().join(format!("hashlock-params-{}.json", std::process::id()));
        let mut stdout = Vec::new();
        lock(b"secret data", PUBKEY_HEX, "regtest", Some(path.clone()), &mut stdout).unwrap();

        assert!(stdout.is_empty());
        let params = read_params(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(params.pubkey, hex::decode(PUBKEY_HEX).unwrap());
    }
}
