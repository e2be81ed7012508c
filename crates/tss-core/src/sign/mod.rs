//! Threshold Schnorr signing
//!
//! Each signer holds a share of the signing key and a share of a jointly
//! generated nonce key (a second DKG run over the same partners). Partial
//! signatures over the same message combine into one signature valid under
//! the joint public key.

mod schnorr;

pub use schnorr::{
    schnorr_aggregate_sigs, schnorr_hash, schnorr_sign, schnorr_verify,
    schnorr_verify_with_nonce_address, SchnorrSignature,
};

use crate::{DistKey, Error, PartyId, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Partial signature from one party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    /// Party ID
    pub party_id: PartyId,
    /// Signature made with the party's key and nonce shares
    pub signature: SchnorrSignature,
}

/// Create a partial signature with a key share and a nonce share
pub fn create_partial_signature(
    key: &DistKey,
    nonce: &DistKey,
    message: &[u8],
) -> Result<PartialSignature> {
    if key.index != nonce.index {
        return Err(Error::InvalidConfig(format!(
            "Key share of party {} paired with nonce share of party {}",
            key.index, nonce.index
        )));
    }
    if key.curve.t != nonce.curve.t {
        return Err(Error::InvalidConfig(format!(
            "Key threshold {} differs from nonce threshold {}",
            key.curve.t, nonce.curve.t
        )));
    }

    debug!(party_id = %key.index, "Creating partial signature");
    let signature = schnorr_sign(
        &key.share,
        &nonce.share,
        &nonce.public_key,
        &key.public_key,
        message,
    );
    Ok(PartialSignature {
        party_id: key.index,
        signature,
    })
}

/// Combine the partial signatures of at least `t` parties
pub fn combine_partial_signatures(
    t: usize,
    partials: &[PartialSignature],
) -> Result<SchnorrSignature> {
    let signatures: Vec<SchnorrSignature> = partials.iter().map(|p| p.signature).collect();
    let indices: Vec<PartyId> = partials.iter().map(|p| p.party_id).collect();
    schnorr_aggregate_sigs(t, &signatures, &indices)
}
