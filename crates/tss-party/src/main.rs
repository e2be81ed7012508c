//! TSS Party CLI
//!
//! Runs every party of a threshold Schnorr setup in one process, over the
//! in-memory network:
//! - Distributed Key Generation (DKG)
//! - Key Redistribution under a new threshold
//! - Signing with a jointly generated nonce

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tss_core::keygen::{DistributedKeyGeneration, KeyRedistribution};
use tss_core::math::encoding;
use tss_core::mpc::{MemoryHub, Mpc, RoundProtocol};
use tss_core::sign::{
    combine_partial_signatures, create_partial_signature, schnorr_verify,
    schnorr_verify_with_nonce_address,
};
use tss_core::types::new_protocol_id;
use tss_core::{CurveContext, DistKey, MpcConfig, PartyId, SchnorrSignature};

/// TSS Party - threshold Schnorr party simulator
#[derive(Parser)]
#[command(name = "tss-party")]
#[command(about = "Threshold Schnorr MPC party simulator")]
#[command(version)]
struct Cli {
    /// Data directory for key shares
    #[arg(short, long, env = "TSS_DEST", default_value = "./data")]
    dest: PathBuf,

    /// Per-round timeout in milliseconds
    #[arg(long, env = "TSS_TIMEOUT_MS", default_value_t = 20_000)]
    timeout_ms: u64,

    /// Parties that never answer their partners (comma-separated)
    #[arg(long, value_delimiter = ',')]
    offline: Vec<PartyId>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run distributed key generation
    Keygen {
        /// Number of parties
        #[arg(short, long, default_value_t = tss_core::DEFAULT_PARTIES as u64)]
        n: u64,

        /// Threshold (t-of-n)
        #[arg(short, long, default_value_t = tss_core::DEFAULT_THRESHOLD)]
        t: usize,

        /// Fixed secret contribution of every party (0x + 64 hex)
        #[arg(long)]
        value: Option<String>,
    },

    /// Re-share the stored key under a new threshold
    Reshare {
        /// New threshold
        #[arg(short, long)]
        t: usize,
    },

    /// Sign a message
    Sign {
        /// Message text, or a 32-byte hash as 0x + 64 hex
        #[arg(short, long)]
        message: String,

        /// Signing party IDs (comma-separated), all key holders by default
        #[arg(short, long, value_delimiter = ',')]
        signers: Vec<PartyId>,
    },

    /// Show key share info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    // Ensure data directory exists
    std::fs::create_dir_all(&cli.dest)?;

    let hub = MemoryHub::new();
    for party in &cli.offline {
        warn!(party_id = %party, "Party marked offline");
        hub.silence(*party);
    }
    let timeout = Duration::from_millis(cli.timeout_ms);

    match cli.command {
        Commands::Keygen { n, t, ref value } => {
            let value = value
                .as_deref()
                .map(encoding::scalar_from_hex)
                .transpose()?;
            let keys = run_keygen(&hub, timeout, n, t, value).await?;
            save_keys(&cli.dest, &keys)?;
            println!("Public Key: {}", encoding::point_to_hex(&keys[0].public_key));
            println!("Address: {}", keys[0].address);
        }
        Commands::Reshare { t } => {
            let old = load_keys(&cli.dest)?;
            let keys = run_reshare(&hub, timeout, &old, t).await?;
            save_keys(&cli.dest, &keys)?;
            println!("Redistributed to {} parties, threshold {}", keys.len(), t);
            println!("Address: {}", keys[0].address);
        }
        Commands::Sign {
            ref message,
            ref signers,
        } => {
            let keys = load_keys(&cli.dest)?;
            let message_hash = parse_message(message)?;
            let (signature, nonce_address) =
                run_sign(&hub, timeout, &keys, signers, &message_hash).await?;
            println!("Message Hash: 0x{}", hex::encode(message_hash));
            println!("Nonce Address: {}", nonce_address);
            println!("Signature: {}", signature);
        }
        Commands::Info => {
            show_info(&cli.dest)?;
        }
    }

    Ok(())
}

async fn run_keygen(
    hub: &Arc<MemoryHub>,
    timeout: Duration,
    n: u64,
    t: usize,
    value: Option<k256::Scalar>,
) -> Result<Vec<DistKey>> {
    info!(n_parties = n, threshold = t, "Starting DKG");

    let results = run_parties(hub, &PartyId::range(n), t, "dkg", timeout, |config| {
        DistributedKeyGeneration::new(config, value)
    })
    .await?;
    let keys = successful(results)?;

    info!(
        address = %keys[0].address,
        parties = keys.len(),
        "DKG completed"
    );
    Ok(keys)
}

async fn run_reshare(
    hub: &Arc<MemoryHub>,
    timeout: Duration,
    old: &[DistKey],
    t: usize,
) -> Result<Vec<DistKey>> {
    let by_index: BTreeMap<PartyId, &DistKey> = old.iter().map(|k| (k.index, k)).collect();
    let partners: Vec<PartyId> = by_index.keys().copied().collect();
    let previous = old.first().ok_or_else(|| anyhow!("no key shares found"))?;

    info!(
        parties = partners.len(),
        previous_t = previous.curve.t,
        threshold = t,
        "Starting key redistribution"
    );

    let results = run_parties(hub, &partners, t, "kdist", timeout, |config| {
        let key = by_index.get(&config.party_id).ok_or_else(|| {
            tss_core::Error::InvalidConfig(format!("no key share for {}", config.party_id))
        })?;
        KeyRedistribution::from_dist_key(config, key)
    })
    .await?;
    let keys = successful(results)?;

    if keys[0].public_key != previous.public_key {
        bail!("redistribution changed the public key");
    }
    info!(address = %keys[0].address, "Key redistribution completed");
    Ok(keys)
}

/// Generate a joint nonce among `signers`, sign with every signer holding
/// both shares and aggregate
async fn run_sign(
    hub: &Arc<MemoryHub>,
    timeout: Duration,
    keys: &[DistKey],
    signers: &[PartyId],
    message_hash: &[u8; 32],
) -> Result<(SchnorrSignature, String)> {
    let key = keys.first().ok_or_else(|| anyhow!("no key shares found"))?;
    let t = key.curve.t;
    let signers: Vec<PartyId> = if signers.is_empty() {
        keys.iter().map(|k| k.index).collect()
    } else {
        signers.to_vec()
    };

    info!(signers = ?signers, threshold = t, "Starting signing");

    let results = run_parties(hub, &signers, t, "nonce", timeout, |config| {
        DistributedKeyGeneration::new(config, None)
    })
    .await?;
    let nonces = successful(results)?;

    let by_index: BTreeMap<PartyId, &DistKey> = keys.iter().map(|k| (k.index, k)).collect();
    let partials = nonces
        .iter()
        .filter_map(|nonce| {
            by_index
                .get(&nonce.index)
                .map(|key| create_partial_signature(key, nonce, message_hash))
        })
        .collect::<tss_core::Result<Vec<_>>>()?;
    if partials.len() < t {
        bail!("only {} signers hold both shares, {} required", partials.len(), t);
    }

    let signature = combine_partial_signatures(t, &partials)?;
    let curve = CurveContext::secp256k1();
    if !schnorr_verify(&curve, &key.public_key, message_hash, &signature) {
        bail!("aggregated signature does not verify");
    }
    let s: [u8; 32] = signature.s.to_bytes().into();
    if !schnorr_verify_with_nonce_address(message_hash, &s, &nonces[0].address, &key.public_key)? {
        bail!("aggregated signature does not verify against the nonce address");
    }
    if key.public_key_larger_than_half_n() {
        warn!("Public key x coordinate exceeds n/2, on-chain verifiers may reject it");
    }

    info!(signature = %signature, "Signature generated");
    Ok((signature, nonces[0].address.clone()))
}

/// Run one protocol instance per party concurrently over `hub`
async fn run_parties<P, F>(
    hub: &Arc<MemoryHub>,
    partners: &[PartyId],
    t: usize,
    prefix: &str,
    timeout: Duration,
    make: F,
) -> Result<BTreeMap<PartyId, tss_core::Result<P::Output>>>
where
    P: RoundProtocol + 'static,
    P::Message: 'static,
    P::Output: 'static,
    F: Fn(MpcConfig) -> tss_core::Result<P>,
{
    let protocol_id = new_protocol_id(prefix);
    let mut runs = Vec::with_capacity(partners.len());
    for id in partners {
        let config = MpcConfig::new(protocol_id.clone(), *id, partners.to_vec(), t)?;
        let mut mpc = Mpc::new(make(config)?);
        let network = hub.network(*id);
        let id = *id;
        runs.push(tokio::spawn(async move {
            (id, mpc.run_by_network(&network, timeout).await)
        }));
    }

    let joined = join_all(runs).await;
    for id in partners {
        hub.unregister(id, &protocol_id);
    }

    let mut results = BTreeMap::new();
    for outcome in joined {
        let (id, result) = outcome?;
        results.insert(id, result);
    }
    Ok(results)
}

/// Keys of the parties that completed, which must agree on the public key
fn successful(results: BTreeMap<PartyId, tss_core::Result<DistKey>>) -> Result<Vec<DistKey>> {
    let mut keys = Vec::new();
    for (id, result) in results {
        match result {
            Ok(key) => keys.push(key),
            Err(e) => warn!(party_id = %id, error = %e, "Party did not complete"),
        }
    }

    let first = keys.first().ok_or_else(|| anyhow!("no party completed"))?;
    if keys.iter().any(|k| k.public_key != first.public_key) {
        bail!("parties disagree on the public key");
    }
    Ok(keys)
}

fn parse_message(message: &str) -> Result<[u8; 32]> {
    if let Some(digits) = message.strip_prefix("0x") {
        if digits.len() == 64 {
            let mut hash = [0u8; 32];
            hex::decode_to_slice(digits, &mut hash).context("invalid message hash")?;
            return Ok(hash);
        }
    }
    Ok(encoding::keccak256(&[message.as_bytes()]))
}

fn key_path(dest: &Path, index: &PartyId) -> PathBuf {
    dest.join(format!("distkey.{}.json", index))
}

fn key_files(dest: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dest)? {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.starts_with("distkey.") && name.ends_with(".json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Replace every stored key share with `keys`
fn save_keys(dest: &Path, keys: &[DistKey]) -> Result<()> {
    for stale in key_files(dest)? {
        std::fs::remove_file(stale)?;
    }
    for key in keys {
        let path = key_path(dest, &key.index);
        let json = serde_json::to_string_pretty(key)?;
        std::fs::write(&path, json)?;
        info!(party_id = %key.index, path = ?path, "Key share saved");
    }
    Ok(())
}

fn load_keys(dest: &Path) -> Result<Vec<DistKey>> {
    let mut keys = Vec::new();
    for path in key_files(dest)? {
        let json = std::fs::read_to_string(&path)?;
        let key: DistKey =
            serde_json::from_str(&json).with_context(|| format!("loading {}", path.display()))?;
        keys.push(key);
    }
    if keys.is_empty() {
        bail!("no key shares in {}", dest.display());
    }
    keys.sort_by_key(|k| k.index);
    Ok(keys)
}

fn show_info(dest: &Path) -> Result<()> {
    let keys = load_keys(dest)?;

    for key in &keys {
        println!("Key Share Info:");
        println!("  Party ID: {}", key.index);
        println!("  Threshold: {}", key.curve.t);
        println!("  Partners: {:?}", key.partners.iter().map(|p| p.get()).collect::<Vec<_>>());
        println!("  Address: {}", key.address);
        println!("  Public Key: {}", encoding::point_to_hex(&key.public_key));
        println!(
            "  Public Share: {}",
            encoding::point_to_hex(&key.public_key_of(&key.index))
        );
        println!("  Above n/2: {}", key.public_key_larger_than_half_n());
    }

    Ok(())
}
