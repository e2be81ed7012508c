//! Lagrange interpolation over scalars and points

use super::{CurveContext, Polynomial};
use crate::types::{PartyId, PublicShare, Share};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;
use std::ops::{Add, Mul};

/// Lagrange basis polynomial of the `j`-th index among the first `t`,
/// evaluated at `x`
pub fn lagrange_coefficient(j: usize, t: usize, indices: &[PartyId], x: u64) -> Result<Scalar> {
    let xj = indices
        .get(j)
        .ok_or(Error::InsufficientShares {
            required: j + 1,
            actual: indices.len(),
        })?
        .to_scalar();
    let x = Scalar::from(x);

    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;
    for (k, index) in indices.iter().take(t).enumerate() {
        if k == j {
            continue;
        }
        let xk = index.to_scalar();
        numerator *= x - xk;
        denominator *= xj - xk;
    }

    Option::<Scalar>::from(denominator.invert())
        .map(|inverse| numerator * inverse)
        .ok_or_else(|| Error::DuplicateIndex(indices[j].to_string()))
}

/// Interpolate the values at the first `t` indices and evaluate at `x`
fn interpolate<V>(indices: &[PartyId], values: &[V], t: usize, x: u64, zero: V) -> Result<V>
where
    V: Copy + Add<Output = V> + Mul<Scalar, Output = V>,
{
    if t == 0 {
        return Err(Error::InvalidConfig("Threshold must be positive".into()));
    }
    if indices.len() < t {
        return Err(Error::InsufficientShares {
            required: t,
            actual: indices.len(),
        });
    }

    let mut sum = zero;
    for (j, value) in values.iter().take(t).enumerate() {
        sum = sum + *value * lagrange_coefficient(j, t, indices, x)?;
    }
    Ok(sum)
}

/// Recover `f(x)` from at least `t` scalar shares; only the first `t` are used
pub fn reconstruct_key(shares: &[Share], t: usize, x: u64) -> Result<Scalar> {
    let (indices, values): (Vec<_>, Vec<_>) = shares.iter().map(|s| (s.index, s.value)).unzip();
    interpolate(&indices, &values, t, x, Scalar::ZERO)
}

/// Recover `G * f(x)` from at least `t` public shares; only the first `t` are used
pub fn reconstruct_pub_key(shares: &[PublicShare], t: usize, x: u64) -> Result<ProjectivePoint> {
    let (indices, points): (Vec<_>, Vec<_>) = shares.iter().map(|s| (s.index, s.point)).unzip();
    interpolate(&indices, &points, t, x, ProjectivePoint::IDENTITY)
}

/// Split `secret` into shares for `indices` with a fresh degree `t - 1` polynomial
pub fn share_key(
    curve: &CurveContext,
    secret: Scalar,
    t: usize,
    indices: &[PartyId],
    rng: &mut impl CryptoRngCore,
) -> Result<(Polynomial, Vec<Share>)> {
    let polynomial = Polynomial::new(t, curve, Some(secret), rng)?;
    let shares = indices
        .iter()
        .map(|index| Share {
            index: *index,
            value: polynomial.evaluate_at(index),
        })
        .collect();
    Ok((polynomial, shares))
}
