//! Core types for threshold key generation

use crate::math::{self, encoding};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Unique identifier of a protocol run, routed on by the network
pub type ProtocolId = String;

/// Identifier of a party in the MPC network.
///
/// Party ids double as the x coordinate at which the party's shares are
/// evaluated, so they are strictly positive. On the wire they are decimal
/// strings without leading zeros (`"1"`, `"42"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartyId(u64);

impl PartyId {
    /// Create a party id, rejecting zero
    pub fn new(index: u64) -> Result<Self> {
        if index == 0 {
            return Err(Error::InvalidConfig("Party id must be positive".into()));
        }
        Ok(Self(index))
    }

    /// Numeric value of the id
    pub fn get(&self) -> u64 {
        self.0
    }

    /// The id as a field element, i.e. the evaluation point of this party
    pub fn to_scalar(&self) -> Scalar {
        Scalar::from(self.0)
    }

    /// Party ids `1..=n`
    pub fn range(n: u64) -> Vec<PartyId> {
        (1..=n).map(PartyId).collect()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PartyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let valid = s.starts_with(|c: char| ('1'..='9').contains(&c))
            && s.chars().all(|c| c.is_ascii_digit());
        if !valid {
            return Err(Error::InvalidConfig(format!("Invalid party id: {:?}", s)));
        }
        s.parse::<u64>()
            .map(PartyId)
            .map_err(|e| Error::InvalidConfig(format!("Invalid party id {:?}: {}", s, e)))
    }
}

impl TryFrom<String> for PartyId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PartyId> for String {
    fn from(id: PartyId) -> Self {
        id.to_string()
    }
}

/// Create a fresh protocol id with the given prefix
pub fn new_protocol_id(prefix: &str) -> ProtocolId {
    let nonce: [u8; 8] = rand::random();
    format!("{}-{}", prefix, hex::encode(nonce))
}

/// Configuration of one party's view of a protocol run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpcConfig {
    /// Protocol run identifier
    pub protocol_id: ProtocolId,

    /// This party's ID
    pub party_id: PartyId,

    /// All participating party IDs, this party included
    pub partners: Vec<PartyId>,

    /// Threshold (t-of-n)
    pub threshold: usize,
}

impl MpcConfig {
    /// Create a new protocol configuration
    pub fn new(
        protocol_id: impl Into<ProtocolId>,
        party_id: PartyId,
        partners: Vec<PartyId>,
        threshold: usize,
    ) -> Result<Self> {
        let protocol_id = protocol_id.into();
        if protocol_id.is_empty() {
            return Err(Error::InvalidConfig("Protocol id cannot be empty".into()));
        }
        if threshold < 2 {
            return Err(Error::InvalidConfig("Threshold must be at least 2".into()));
        }
        if threshold > partners.len() {
            return Err(Error::InvalidConfig(
                "Threshold cannot exceed number of parties".into(),
            ));
        }
        if !partners.contains(&party_id) {
            return Err(Error::InvalidConfig(format!(
                "Party {} is not among the partners",
                party_id
            )));
        }
        let mut sorted = partners.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != partners.len() {
            return Err(Error::InvalidConfig("Duplicate party ids".into()));
        }

        Ok(Self {
            protocol_id,
            party_id,
            partners,
            threshold,
        })
    }

    /// Number of parties
    pub fn n_parties(&self) -> usize {
        self.partners.len()
    }
}

/// One evaluation of a secret polynomial
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Share {
    /// Index the polynomial was evaluated at
    pub index: PartyId,
    /// Evaluation result
    pub value: Scalar,
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// One evaluation of a secret polynomial, lifted to the curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicShare {
    /// Index the polynomial was evaluated at
    pub index: PartyId,
    /// `G * value`
    pub point: ProjectivePoint,
}

/// Threshold and combined Feldman commitment of a distributed key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolynomialInfo {
    /// Threshold
    pub t: usize,
    /// Commitments to the combined polynomial's coefficients
    pub fx: Vec<ProjectivePoint>,
}

/// Key share held by a party after key generation or redistribution
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DistKeyJson", into = "DistKeyJson")]
pub struct DistKey {
    /// This party's ID
    pub index: PartyId,

    /// This party's secret share
    pub share: Scalar,

    /// Address derived from the public key
    pub address: String,

    /// Joint public key
    pub public_key: ProjectivePoint,

    /// Partners qualified at completion
    pub partners: Vec<PartyId>,

    /// Threshold and combined commitments
    pub curve: PolynomialInfo,
}

impl DistKey {
    /// Assemble a key, deriving its address from the public key
    pub fn new(
        index: PartyId,
        share: Scalar,
        public_key: ProjectivePoint,
        partners: Vec<PartyId>,
        curve: PolynomialInfo,
    ) -> Self {
        Self {
            index,
            share,
            address: encoding::pub_to_address(&public_key),
            public_key,
            partners,
            curve,
        }
    }

    /// Public share of the party with the given index
    pub fn public_key_of(&self, index: &PartyId) -> ProjectivePoint {
        math::calc_poly_point(index.get(), &self.curve.fx)
    }

    /// Whether the x coordinate of the public key exceeds `n/2 + 1`
    pub fn public_key_larger_than_half_n(&self) -> bool {
        math::is_larger_than_half_n(&self.public_key)
    }

    /// Canonical persisted form
    pub fn to_json(&self) -> DistKeyJson {
        DistKeyJson {
            index: self.index,
            share: encoding::scalar_to_hex(&self.share),
            address: self.address.clone(),
            public_key: encoding::point_to_hex(&self.public_key),
            partners: self.partners.clone(),
            curve: PolynomialInfoJson {
                t: self.curve.t,
                fx: self.curve.fx.iter().map(encoding::point_to_hex).collect(),
            },
        }
    }

    /// Load a key from its persisted form.
    ///
    /// The address is recomputed from the public key and must match the
    /// stored one (case-insensitively).
    pub fn from_json(json: &DistKeyJson) -> Result<Self> {
        let public_key = encoding::point_from_hex(&json.public_key)?;
        let address = encoding::pub_to_address(&public_key);
        if !address.eq_ignore_ascii_case(&json.address) {
            return Err(Error::AddressMismatch {
                expected: address,
                actual: json.address.clone(),
            });
        }
        let fx = json
            .curve
            .fx
            .iter()
            .map(|p| encoding::point_from_hex(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            index: json.index,
            share: encoding::scalar_from_hex(&json.share)?,
            address,
            public_key,
            partners: json.partners.clone(),
            curve: PolynomialInfo { t: json.curve.t, fx },
        })
    }
}

impl fmt::Debug for DistKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistKey")
            .field("index", &self.index)
            .field("address", &self.address)
            .field("public_key", &encoding::point_to_hex(&self.public_key))
            .field("partners", &self.partners)
            .field("t", &self.curve.t)
            .finish_non_exhaustive()
    }
}

impl TryFrom<DistKeyJson> for DistKey {
    type Error = Error;

    fn try_from(json: DistKeyJson) -> Result<Self> {
        DistKey::from_json(&json)
    }
}

impl From<DistKey> for DistKeyJson {
    fn from(key: DistKey) -> Self {
        key.to_json()
    }
}

/// Persisted/transport form of [`DistKey`]
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DistKeyJson {
    #[zeroize(skip)]
    pub index: PartyId,

    /// `0x` + 64 hex digits
    pub share: String,

    #[zeroize(skip)]
    pub address: String,

    /// Compressed point, 66 hex digits
    #[zeroize(skip)]
    #[serde(rename = "publicKey")]
    pub public_key: String,

    #[zeroize(skip)]
    pub partners: Vec<PartyId>,

    #[zeroize(skip)]
    pub curve: PolynomialInfoJson,
}

/// Persisted form of [`PolynomialInfo`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolynomialInfoJson {
    pub t: usize,
    #[serde(rename = "Fx")]
    pub fx: Vec<String>,
}
