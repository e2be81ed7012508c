//! Curve arithmetic and Shamir secret sharing over secp256k1
//!
//! All primitives take an explicit [`CurveContext`] (or are context-free)
//! instead of reaching for global curve state.

pub mod encoding;
mod lagrange;
mod polynomial;

pub use lagrange::{lagrange_coefficient, reconstruct_key, reconstruct_pub_key, share_key};
pub use polynomial::Polynomial;

use elliptic_curve::{point::AffineCoordinates, Field};
use k256::{NonZeroScalar, ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;

/// `floor(n / 2) + 1` as big-endian bytes
pub const HALF_N: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa1,
];

/// Second generator with unknown discrete log relative to `G`, uncompressed
const H_UNCOMPRESSED: &str = "04206ae271fa934801b55f5144bec8416be0b85f22d452ad410f3f0fca1083dc7ae41249696c446f8c5b166760377115943662991c35ff02f9585f892970af89ed";

/// Immutable curve parameters handed to every primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveContext {
    g: ProjectivePoint,
    h: ProjectivePoint,
}

impl CurveContext {
    /// secp256k1 with the standard generator and the fixed second generator `H`
    ///
    /// # Panics
    ///
    /// Never in practice: `H` is a constant verified to lie on the curve.
    pub fn secp256k1() -> Self {
        let h = hex::decode(H_UNCOMPRESSED)
            .ok()
            .and_then(|bytes| encoding::point_from_bytes(&bytes).ok())
            .expect("second generator is a valid curve point");
        Self {
            g: ProjectivePoint::GENERATOR,
            h,
        }
    }

    /// Base point `G`
    pub fn g(&self) -> &ProjectivePoint {
        &self.g
    }

    /// Second generator `H`
    pub fn h(&self) -> &ProjectivePoint {
        &self.h
    }
}

impl Default for CurveContext {
    fn default() -> Self {
        Self::secp256k1()
    }
}

/// Uniformly random non-zero scalar
pub fn random_scalar(rng: &mut impl CryptoRngCore) -> Scalar {
    *NonZeroScalar::random(rng)
}

/// Uniformly random scalar, zero included
pub fn random_field_element(rng: &mut impl CryptoRngCore) -> Scalar {
    Scalar::random(rng)
}

/// Public point of a private scalar
pub fn key_to_public(curve: &CurveContext, key: &Scalar) -> ProjectivePoint {
    curve.g * key
}

/// Addition that treats an absent operand as the neutral element.
///
/// Returns `None` only when both operands are absent.
pub fn point_add(
    a: Option<&ProjectivePoint>,
    b: Option<&ProjectivePoint>,
) -> Option<ProjectivePoint> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (Some(p), None) | (None, Some(p)) => Some(*p),
        (None, None) => None,
    }
}

/// Evaluate a committed polynomial in the exponent: `sum(fx[i] * x^i)`
pub fn calc_poly_point(x: u64, fx: &[ProjectivePoint]) -> ProjectivePoint {
    let x = Scalar::from(x);
    fx.iter()
        .rev()
        .fold(ProjectivePoint::IDENTITY, |acc, coefficient| {
            acc * x + coefficient
        })
}

/// Whether a point is usable as a public key
pub fn validate_public_key(point: &ProjectivePoint) -> bool {
    *point != ProjectivePoint::IDENTITY
}

/// Whether a hex encoded compressed point decodes to a usable public key
pub fn validate_public_key_hex(encoded: &str) -> bool {
    encoding::point_from_hex(encoded)
        .map(|p| validate_public_key(&p))
        .unwrap_or(false)
}

/// Whether the affine x coordinate of `point` exceeds [`HALF_N`]
pub fn is_larger_than_half_n(point: &ProjectivePoint) -> bool {
    let x = point.to_affine().x();
    x.as_slice() > HALF_N.as_slice()
}
