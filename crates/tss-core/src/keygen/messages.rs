//! DKG message types

use crate::math::encoding::{self, hex_point, hex_points, hex_scalar};
use crate::sign::SchnorrSignature;
use crate::{Error, PartyId, Result};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Schnorr proof that the sender knows the discrete log of `Fx[0]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfPossession {
    /// Nonce point `R`
    #[serde(with = "hex_point")]
    pub nonce: ProjectivePoint,
    pub signature: SchnorrSignature,
}

/// Round 1 broadcast: commitments to the secret polynomial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round1Broadcast {
    /// Feldman commitments, one per coefficient
    #[serde(rename = "Fx", with = "hex_points")]
    pub fx: Vec<ProjectivePoint>,
    pub sig: ProofOfPossession,
}

/// Round 2 private message: the sender's polynomial evaluated at the receiver
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round2Send {
    #[serde(with = "hex_scalar")]
    pub f: Scalar,
}

impl fmt::Debug for Round2Send {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Round2Send").finish_non_exhaustive()
    }
}

/// Round 2 broadcast: hash of every round 1 commitment vector as received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round2Broadcast {
    #[serde(rename = "allPartiesFxHash")]
    pub all_parties_fx_hash: BTreeMap<PartyId, CommitmentHash>,
}

/// Round 3 broadcast: partners the sender found cheating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round3Broadcast {
    pub malicious: Vec<PartyId>,
}

/// Validated DKG payload from one partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DkgMessage {
    Round1(Round1Broadcast),
    Round2 {
        send: Round2Send,
        broadcast: Round2Broadcast,
    },
    Round3(Round3Broadcast),
}

impl DkgMessage {
    pub fn as_round1(&self) -> Option<&Round1Broadcast> {
        match self {
            DkgMessage::Round1(broadcast) => Some(broadcast),
            _ => None,
        }
    }

    pub fn as_round2(&self) -> Option<(&Round2Send, &Round2Broadcast)> {
        match self {
            DkgMessage::Round2 { send, broadcast } => Some((send, broadcast)),
            _ => None,
        }
    }

    pub fn as_round3(&self) -> Option<&Round3Broadcast> {
        match self {
            DkgMessage::Round3(broadcast) => Some(broadcast),
            _ => None,
        }
    }
}

/// Keccak-256 of a commitment vector
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitmentHash(pub [u8; 32]);

impl CommitmentHash {
    /// Hash of the concatenated compressed points
    pub fn of(fx: &[ProjectivePoint]) -> Self {
        let encoded: Vec<Vec<u8>> = fx.iter().map(encoding::point_to_bytes).collect();
        let parts: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
        Self(encoding::keccak256(&parts))
    }
}

impl fmt::Debug for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitmentHash({})", self)
    }
}

impl fmt::Display for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for CommitmentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| Error::InvalidPayload(format!("commitment hash: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for CommitmentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CommitmentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

/// Message signed by the round 1 proof of possession:
/// `keccak256(u64_be(party) || protocol_id || Fx[0] || R)`
pub fn pop_message(
    party: &PartyId,
    protocol_id: &str,
    fx0: &ProjectivePoint,
    nonce: &ProjectivePoint,
) -> [u8; 32] {
    encoding::keccak256(&[
        &party.get().to_be_bytes(),
        protocol_id.as_bytes(),
        &encoding::point_to_bytes(fx0),
        &encoding::point_to_bytes(nonce),
    ])
}
