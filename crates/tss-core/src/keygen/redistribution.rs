//! Key redistribution protocol
//!
//! Holders of an existing key re-share it under a new threshold without
//! changing the joint public key. Each party runs key generation with its
//! current share as the fixed secret; the qualified contributions are then
//! interpolated at zero under the previous threshold.

use super::dkg::{Completion, CompletionInput, KeyGeneration};
use crate::math::{calc_poly_point, reconstruct_key, reconstruct_pub_key};
use crate::mpc::{Mpc, MpcNetwork};
use crate::types::{PolynomialInfo, PublicShare, Share};
use crate::{DistKey, Error, MpcConfig, PartyId, Result};
use k256::{ProjectivePoint, Scalar};
use std::time::Duration;
use tracing::{info, instrument};

/// Completion interpolating contributions under the previous threshold
#[derive(Debug, Clone)]
pub struct Redistribute {
    previous_t: usize,
    /// Commitments of the key being redistributed, when known
    previous_fx: Option<Vec<ProjectivePoint>>,
}

impl Redistribute {
    pub fn new(previous_t: usize) -> Self {
        Self {
            previous_t,
            previous_fx: None,
        }
    }

    /// Also require each partner's secret to be its public share of `key`
    pub fn of_key(key: &DistKey) -> Self {
        Self {
            previous_t: key.curve.t,
            previous_fx: Some(key.curve.fx.clone()),
        }
    }

    pub fn previous_t(&self) -> usize {
        self.previous_t
    }
}

impl Completion for Redistribute {
    fn check_commitments(
        &self,
        from: &PartyId,
        commitments: &[ProjectivePoint],
    ) -> std::result::Result<(), String> {
        let Some(previous_fx) = &self.previous_fx else {
            return Ok(());
        };
        if commitments.first() != Some(&calc_poly_point(from.get(), previous_fx)) {
            return Err("contribution does not match previous public share".into());
        }
        Ok(())
    }

    fn complete(&self, input: CompletionInput<'_>) -> Result<DistKey> {
        if input.contributions.len() < input.threshold {
            return Err(Error::InsufficientPartners {
                required: input.threshold,
                actual: input.contributions.len(),
                excluded: Vec::new(),
            });
        }

        let shares: Vec<Share> = input
            .contributions
            .iter()
            .map(|c| Share {
                index: c.from,
                value: c.share,
            })
            .collect();
        let share = reconstruct_key(&shares, self.previous_t, 0)?;

        let fx = (0..input.threshold)
            .map(|j| {
                let points = input
                    .contributions
                    .iter()
                    .map(|c| {
                        c.commitments
                            .get(j)
                            .map(|point| PublicShare {
                                index: c.from,
                                point: *point,
                            })
                            .ok_or_else(|| {
                                Error::InvalidPayload(format!(
                                    "party {} sent too few commitments",
                                    c.from
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                reconstruct_pub_key(&points, self.previous_t, 0)
            })
            .collect::<Result<Vec<_>>>()?;

        let public_key = fx
            .first()
            .copied()
            .ok_or_else(|| Error::Internal("empty commitment vector".into()))?;
        Ok(DistKey::new(
            input.index,
            share,
            public_key,
            input.qualified.to_vec(),
            PolynomialInfo {
                t: input.threshold,
                fx,
            },
        ))
    }
}

/// Key generation re-sharing an existing key
pub type KeyRedistribution = KeyGeneration<Redistribute>;

impl KeyGeneration<Redistribute> {
    /// Re-share `share`, a share of a key with threshold `previous_t`
    pub fn redistribute(config: MpcConfig, previous_t: usize, share: Scalar) -> Result<Self> {
        if previous_t == 0 {
            return Err(Error::InvalidConfig(
                "Previous threshold must be positive".into(),
            ));
        }
        Self::with_completion(config, Some(share), Redistribute::new(previous_t))
    }

    /// Re-share a held key. Partners' contributions are checked against the
    /// key's public shares.
    pub fn from_dist_key(config: MpcConfig, key: &DistKey) -> Result<Self> {
        if key.index != config.party_id {
            return Err(Error::InvalidConfig(format!(
                "Key belongs to party {}, not {}",
                key.index, config.party_id
            )));
        }
        Self::with_completion(config, Some(key.share), Redistribute::of_key(key))
    }
}

/// Run the key redistribution protocol for one party
#[instrument(skip(key, network))]
pub async fn run_key_redistribution<N: MpcNetwork + ?Sized>(
    config: MpcConfig,
    key: &DistKey,
    network: &N,
    timeout: Duration,
) -> Result<DistKey> {
    info!(
        party_id = %config.party_id,
        previous_t = key.curve.t,
        threshold = config.threshold,
        "Starting key redistribution"
    );
    let mut mpc = Mpc::new(KeyRedistribution::from_dist_key(config, key)?);
    let redistributed = mpc.run_by_network(network, timeout).await?;

    if redistributed.public_key != key.public_key {
        return Err(Error::Internal("redistribution changed the public key".into()));
    }
    Ok(redistributed)
}
