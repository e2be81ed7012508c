//! # TSS Core
//!
//! Threshold Schnorr signatures over secp256k1.
//!
//! This crate provides the fundamental building blocks for:
//! - Shamir secret sharing and Feldman commitments
//! - A round-based MPC engine with partner exclusion
//! - Distributed Key Generation (DKG)
//! - Key Redistribution under a new threshold
//! - Partial Schnorr signatures and their aggregation
//!
//! ## Protocol Overview
//!
//! Every party runs the same protocol instance over a pull-based network:
//! it publishes its round outputs locally and fetches what each partner
//! published for it. Partners that stay silent past the round deadline or
//! send invalid data are dropped; the run completes as long as at least
//! `threshold` partners remain.
//!
//! Signatures bind the addresses of the nonce point and of the public key,
//! making them cheap to verify on-chain.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tss_core::{keygen, mpc::MemoryHub, MpcConfig, PartyId};
//!
//! let hub = MemoryHub::new();
//! let config = MpcConfig::new("dkg-1", PartyId::new(1)?, PartyId::range(3), 2)?;
//!
//! let network = hub.network(config.party_id);
//!
//! // Run distributed key generation
//! let key = keygen::run_dkg(config, None, &network, timeout).await?;
//! ```

pub mod error;
pub mod keygen;
pub mod math;
pub mod mpc;
pub mod sign;
pub mod types;

pub use error::{Error, Result};
pub use math::CurveContext;
pub use sign::SchnorrSignature;
pub use types::{DistKey, DistKeyJson, MpcConfig, PartyId, ProtocolId};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default threshold for a 3-party setup
pub const DEFAULT_THRESHOLD: usize = 2;

/// Default number of parties
pub const DEFAULT_PARTIES: usize = 3;
