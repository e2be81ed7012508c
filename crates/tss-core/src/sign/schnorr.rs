//! Schnorr signatures with address-bound challenges

use crate::math::{encoding, lagrange_coefficient, validate_public_key, CurveContext};
use crate::types::PartyId;
use crate::{Error, Result};
use elliptic_curve::{point::AffineCoordinates, PrimeField};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::{FieldBytes, ProjectivePoint, Scalar};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Schnorr signature `(s, e)`.
///
/// Encoded as `0x` + e (64 hex digits) + s (64 hex digits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchnorrSignature {
    pub s: Scalar,
    pub e: Scalar,
}

impl fmt::Display for SchnorrSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{}{}",
            hex::encode(self.e.to_bytes()),
            hex::encode(self.s.to_bytes())
        )
    }
}

impl FromStr for SchnorrSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 128 {
            return Err(Error::InvalidSignature(format!(
                "expected 128 hex digits, got {}",
                digits.len()
            )));
        }
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;

        let mut e = [0u8; 32];
        let mut s = [0u8; 32];
        e.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Self {
            s: encoding::scalar_from_bytes(&s),
            e: encoding::scalar_from_bytes(&e),
        })
    }
}

impl Serialize for SchnorrSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SchnorrSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

/// Challenge `e = keccak256(address(R) || address(P) || message)`, reduced mod n
pub fn schnorr_hash(
    nonce_point: &ProjectivePoint,
    public_key: &ProjectivePoint,
    message: &[u8],
) -> Scalar {
    challenge(&encoding::address_bytes(nonce_point), public_key, message)
}

fn challenge(nonce_address: &[u8; 20], public_key: &ProjectivePoint, message: &[u8]) -> Scalar {
    let digest = encoding::keccak256(&[
        nonce_address,
        &encoding::address_bytes(public_key),
        message,
    ]);
    encoding::scalar_from_bytes(&digest)
}

/// Sign with a (share of a) private key: `s = k - x * e`
pub fn schnorr_sign(
    private_key: &Scalar,
    nonce: &Scalar,
    nonce_point: &ProjectivePoint,
    public_key: &ProjectivePoint,
    message: &[u8],
) -> SchnorrSignature {
    let e = schnorr_hash(nonce_point, public_key, message);
    let s = nonce - &(private_key * &e);
    SchnorrSignature { s, e }
}

/// Verify by recomputing `R' = G * s + P * e` and comparing challenges.
///
/// The identity is never accepted as a public key.
pub fn schnorr_verify(
    curve: &CurveContext,
    public_key: &ProjectivePoint,
    message: &[u8],
    signature: &SchnorrSignature,
) -> bool {
    if !validate_public_key(public_key) {
        return false;
    }
    let nonce_point = curve.g() * &signature.s + public_key * &signature.e;
    schnorr_hash(&nonce_point, public_key, message) == signature.e
}

/// Verify knowing only the address of the nonce point, as an on-chain
/// verifier does with `ecrecover`.
///
/// `ecrecover(-Px * s, parity(P), Px, e * Px)` recovers `G * s + P * e`,
/// whose address must be `nonce_address`. `signature` is the big-endian `s`
/// and must be below n. Zero inputs are rejected.
pub fn schnorr_verify_with_nonce_address(
    message: &[u8; 32],
    signature: &[u8; 32],
    nonce_address: &str,
    public_key: &ProjectivePoint,
) -> Result<bool> {
    let s = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(signature)))
        .ok_or_else(|| Error::InvalidSignature("signature must be reduced modulo n".into()))?;
    let nonce = encoding::address_from_hex(nonce_address)?;
    if bool::from(s.is_zero()) || nonce == [0u8; 20] || message == &[0u8; 32] {
        return Err(Error::InvalidSignature("zero inputs are not allowed".into()));
    }
    if !validate_public_key(public_key) {
        return Ok(false);
    }

    let e = challenge(&nonce, public_key, message);
    let affine = public_key.to_affine();
    let Some(px) = Option::<Scalar>::from(Scalar::from_repr(affine.x())) else {
        return Ok(false);
    };

    let prehash = (-(px * s)).to_bytes();
    let Ok(ecdsa) = Signature::from_scalars(px.to_bytes(), (e * px).to_bytes()) else {
        return Ok(false);
    };
    // recovery is only defined for low-s signatures; negating s flips R
    let mut y_is_odd = bool::from(affine.y_is_odd());
    let ecdsa = match ecdsa.normalize_s() {
        Some(low) => {
            y_is_odd = !y_is_odd;
            low
        }
        None => ecdsa,
    };
    let recovery_id = RecoveryId::new(y_is_odd, false);
    let Ok(recovered) = VerifyingKey::recover_from_prehash(&prehash, &ecdsa, recovery_id) else {
        return Ok(false);
    };
    let recovered = ProjectivePoint::from(*recovered.as_affine());
    Ok(encoding::address_bytes(&recovered) == nonce)
}

/// Combine per-share signatures made with the same joint nonce.
///
/// `s` is interpolated at zero over the first `t` entries; every entry must
/// carry the same challenge.
pub fn schnorr_aggregate_sigs(
    t: usize,
    signatures: &[SchnorrSignature],
    indices: &[PartyId],
) -> Result<SchnorrSignature> {
    if signatures.len() != indices.len() {
        return Err(Error::InvalidConfig(format!(
            "{} signatures for {} indices",
            signatures.len(),
            indices.len()
        )));
    }
    if t == 0 || signatures.len() < t {
        return Err(Error::InsufficientShares {
            required: t,
            actual: signatures.len(),
        });
    }

    let e = signatures[0].e;
    if signatures.iter().take(t).any(|sig| sig.e != e) {
        return Err(Error::InvalidSignature(
            "partial signatures carry different challenges".into(),
        ));
    }

    let mut s = Scalar::ZERO;
    for (j, signature) in signatures.iter().take(t).enumerate() {
        s += signature.s * lagrange_coefficient(j, t, indices, 0)?;
    }
    Ok(SchnorrSignature { s, e })
}
