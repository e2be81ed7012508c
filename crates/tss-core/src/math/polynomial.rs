//! Secret polynomials and their commitments

use super::{random_field_element, random_scalar, CurveContext};
use crate::types::PartyId;
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;
use std::fmt;
use std::sync::OnceLock;
use zeroize::Zeroize;

/// Polynomial of degree `t - 1` with scalar coefficients.
///
/// Coefficient 0 is the secret. Coefficients are wiped on drop.
pub struct Polynomial {
    coefficients: Vec<Scalar>,
    curve: CurveContext,
    commitments: OnceLock<Vec<ProjectivePoint>>,
}

impl Polynomial {
    /// Random polynomial with `t` coefficients.
    ///
    /// When `secret` is given it becomes coefficient 0, otherwise coefficient
    /// 0 is drawn non-zero. The remaining coefficients are uniform.
    pub fn new(
        t: usize,
        curve: &CurveContext,
        secret: Option<Scalar>,
        rng: &mut impl CryptoRngCore,
    ) -> Result<Self> {
        if t == 0 {
            return Err(Error::InvalidConfig("Threshold must be positive".into()));
        }
        if secret == Some(Scalar::ZERO) {
            return Err(Error::InvalidConfig("Secret cannot be zero".into()));
        }
        let mut coefficients = Vec::with_capacity(t);
        coefficients.push(match secret {
            Some(secret) => secret,
            None => random_scalar(rng),
        });
        for _ in 1..t {
            coefficients.push(random_field_element(rng));
        }
        Ok(Self::with_coefficients(coefficients, curve))
    }

    /// Polynomial with the given coefficients, lowest degree first
    pub fn from_coefficients(coefficients: Vec<Scalar>, curve: &CurveContext) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(Error::InvalidConfig(
                "Polynomial needs at least one coefficient".into(),
            ));
        }
        Ok(Self::with_coefficients(coefficients, curve))
    }

    fn with_coefficients(coefficients: Vec<Scalar>, curve: &CurveContext) -> Self {
        Self {
            coefficients,
            curve: *curve,
            commitments: OnceLock::new(),
        }
    }

    /// Number of coefficients, i.e. the reconstruction threshold
    pub fn threshold(&self) -> usize {
        self.coefficients.len()
    }

    /// Coefficient 0
    pub fn secret(&self) -> &Scalar {
        &self.coefficients[0]
    }

    pub fn coefficients(&self) -> &[Scalar] {
        &self.coefficients
    }

    /// `f(x)`
    pub fn evaluate(&self, x: &Scalar) -> Scalar {
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coefficient| acc * x + coefficient)
    }

    /// `f(index)`
    pub fn evaluate_at(&self, index: &PartyId) -> Scalar {
        self.evaluate(&index.to_scalar())
    }

    /// Feldman commitments `coefficient[i] * G`, computed once
    pub fn commitments(&self) -> &[ProjectivePoint] {
        self.commitments
            .get_or_init(|| self.commitments_with(self.curve.g()))
    }

    /// Commitments against an arbitrary base point
    pub fn commitments_with(&self, base: &ProjectivePoint) -> Vec<ProjectivePoint> {
        self.coefficients.iter().map(|c| base * c).collect()
    }

    /// Hiding commitments `coefficient[i] * G + blinding[i] * H`
    pub fn pedersen_commitments(&self, blinding: &Polynomial) -> Result<Vec<ProjectivePoint>> {
        if blinding.threshold() != self.threshold() {
            return Err(Error::InvalidConfig(format!(
                "Blinding polynomial has {} coefficients, expected {}",
                blinding.threshold(),
                self.threshold()
            )));
        }
        let g = self.curve.g();
        let h = self.curve.h();
        Ok(self
            .coefficients
            .iter()
            .zip(&blinding.coefficients)
            .map(|(a, b)| g * a + h * b)
            .collect())
    }
}

impl fmt::Debug for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Polynomial")
            .field("t", &self.threshold())
            .finish_non_exhaustive()
    }
}

impl Drop for Polynomial {
    fn drop(&mut self) {
        self.coefficients.zeroize();
    }
}
