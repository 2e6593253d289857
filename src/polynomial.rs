// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! VSS share polynomials, their "in the exponent" images, and Lagrange
//! interpolation at zero.

use crate::{
    curve::CurvePoint,
    errors::{InternalError, Result},
    party::PartyId,
    transcript::TranscriptWrite,
};
use k256::{elliptic_curve::Field, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::error;
use zeroize::ZeroizeOnDrop;

/// `f(X) = a₀ + a₁·X + … + aₜ·Xᵗ` over the secp256k1 scalar field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ZeroizeOnDrop)]
pub(crate) struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Debug for Polynomial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polynomial")
            .field("degree", &self.degree())
            .field("coefficients", &"[redacted]")
            .finish()
    }
}

impl Polynomial {
    /// Sample a degree-`t` polynomial with the given constant term.
    pub(crate) fn new<R: RngCore + CryptoRng>(degree: usize, constant: Scalar, rng: &mut R) -> Self {
        let mut coefficients = Vec::with_capacity(degree + 1);
        coefficients.push(constant);
        for _ in 0..degree {
            coefficients.push(Scalar::random(&mut *rng));
        }
        Self { coefficients }
    }

    /// Evaluate at `x` with Horner's method. Evaluating at zero would reveal
    /// the secret constant and is rejected.
    pub(crate) fn evaluate(&self, x: &Scalar) -> Result<Scalar> {
        if bool::from(x.is_zero()) {
            error!("Attempted to evaluate a share polynomial at zero");
            return Err(InternalError::InternalInvariantFailed);
        }
        let result = self
            .coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coeff| acc * x + coeff);
        Ok(result)
    }

    pub(crate) fn constant(&self) -> Scalar {
        self.coefficients[0]
    }

    pub(crate) fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// The image `f(X)·G` of this polynomial.
    pub(crate) fn to_exponent(&self) -> ExponentPolynomial {
        let is_constant = bool::from(self.coefficients[0].is_zero());
        let coefficients = self
            .coefficients
            .iter()
            .skip(usize::from(is_constant))
            .map(CurvePoint::scale_generator)
            .collect();
        ExponentPolynomial {
            is_constant,
            coefficients,
        }
    }
}

/// `F(X) = f(X)·G`: a polynomial whose coefficients are curve points.
///
/// When the underlying constant term is zero, the constant coefficient is
/// omitted rather than encoded as the identity point; `is_constant` records
/// that choice so evaluation and degree stay correct.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub(crate) struct ExponentPolynomial {
    pub(crate) is_constant: bool,
    coefficients: Vec<CurvePoint>,
}

impl ExponentPolynomial {
    /// `F(x)` by Horner's method over the curve.
    pub(crate) fn evaluate(&self, x: &Scalar) -> CurvePoint {
        let mut result = self
            .coefficients
            .iter()
            .rev()
            .fold(CurvePoint::IDENTITY, |acc, coeff| {
                acc.multiply_by_scalar(x) + *coeff
            });
        if self.is_constant {
            // The loop produced B₁; we want B₀ = x·B₁ since A₀ is omitted.
            result = result.multiply_by_scalar(x);
        }
        result
    }

    pub(crate) fn degree(&self) -> usize {
        if self.is_constant {
            self.coefficients.len()
        } else {
            self.coefficients.len() - 1
        }
    }

    /// The constant coefficient (the identity when `is_constant`).
    pub(crate) fn constant(&self) -> CurvePoint {
        if self.is_constant {
            CurvePoint::IDENTITY
        } else {
            self.coefficients[0]
        }
    }

    /// Coefficient-wise sum of polynomials of identical shape.
    pub(crate) fn sum(polynomials: &[&ExponentPolynomial]) -> Result<ExponentPolynomial> {
        let first = polynomials.first().ok_or_else(|| {
            error!("Attempted to sum an empty set of exponent polynomials");
            InternalError::InternalInvariantFailed
        })?;
        let mut summed = (*first).clone();
        for poly in &polynomials[1..] {
            if poly.coefficients.len() != summed.coefficients.len()
                || poly.is_constant != summed.is_constant
            {
                error!("Exponent polynomials have mismatched shapes");
                return Err(InternalError::ProtocolError(None));
            }
            for (acc, coeff) in summed.coefficients.iter_mut().zip(&poly.coefficients) {
                *acc = *acc + *coeff;
            }
        }
        Ok(summed)
    }
}

impl TranscriptWrite for ExponentPolynomial {
    fn domain(&self) -> &'static str {
        "Exponent Polynomial"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![u8::from(self.is_constant)];
        for coeff in &self.coefficients {
            bytes.extend(coeff.to_bytes());
        }
        bytes
    }
}

/// The Lagrange coefficient `Lⱼ(0)` for party `j` within the given signer
/// set, evaluated at the parties' ID-derived points.
pub(crate) fn lagrange_coefficient_at_zero(j: &PartyId, signers: &[PartyId]) -> Result<Scalar> {
    let xj = j.as_scalar();
    let mut result = Scalar::ONE;
    for k in signers {
        if k == j {
            continue;
        }
        let xk = k.as_scalar();
        let denominator = xk - xj;
        let inv = Option::<Scalar>::from(denominator.invert()).ok_or_else(|| {
            error!("Two parties share an evaluation point");
            InternalError::InternalInvariantFailed
        })?;
        result *= xk * inv;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_rng;

    #[test]
    fn exponent_polynomial_tracks_scalar_polynomial() {
        let rng = &mut test_rng();
        let secret = Scalar::random(&mut *rng);
        let poly = Polynomial::new(3, secret, rng);
        let exponent = poly.to_exponent();

        assert_eq!(poly.degree(), 3);
        assert_eq!(exponent.degree(), 3);

        let x = Scalar::random(&mut *rng);
        let expected = CurvePoint::scale_generator(&poly.evaluate(&x).unwrap());
        assert_eq!(exponent.evaluate(&x), expected);
    }

    #[test]
    fn constant_flag_hides_zero_constant() {
        let rng = &mut test_rng();
        let poly = Polynomial::new(2, Scalar::ZERO, rng);
        let exponent = poly.to_exponent();

        assert!(exponent.is_constant);
        assert_eq!(exponent.degree(), 2);
        assert!(exponent.constant().is_identity());

        let x = Scalar::random(&mut *rng);
        let expected = CurvePoint::scale_generator(&poly.evaluate(&x).unwrap());
        assert_eq!(exponent.evaluate(&x), expected);
    }

    #[test]
    fn evaluation_at_zero_is_rejected() {
        let rng = &mut test_rng();
        let poly = Polynomial::new(2, Scalar::ONE, rng);
        assert!(poly.evaluate(&Scalar::ZERO).is_err());
    }

    #[test]
    fn lagrange_reconstructs_shared_secret() {
        let rng = &mut test_rng();
        let parties: Vec<PartyId> = ["alice", "bob", "charlie"]
            .into_iter()
            .map(PartyId::from)
            .collect();

        let secret = Scalar::random(&mut *rng);
        let poly = Polynomial::new(1, secret, rng);

        // Any 2-of-3 subset reconstructs the constant term.
        for subset in [[0usize, 1], [0, 2], [1, 2]] {
            let signers: Vec<PartyId> = subset.iter().map(|&i| parties[i].clone()).collect();
            let mut reconstructed = Scalar::ZERO;
            for j in &signers {
                let share = poly.evaluate(&j.as_scalar()).unwrap();
                let coeff = lagrange_coefficient_at_zero(j, &signers).unwrap();
                reconstructed += share * coeff;
            }
            assert_eq!(reconstructed, secret);
        }
    }

    #[test]
    fn summed_polynomials_evaluate_to_summed_points() {
        let rng = &mut test_rng();
        let poly_a = Polynomial::new(2, Scalar::random(&mut *rng), rng);
        let poly_b = Polynomial::new(2, Scalar::random(&mut *rng), rng);

        let exp_a = poly_a.to_exponent();
        let exp_b = poly_b.to_exponent();
        let summed = ExponentPolynomial::sum(&[&exp_a, &exp_b]).unwrap();

        let x = Scalar::random(&mut *rng);
        let expected = exp_a.evaluate(&x) + exp_b.evaluate(&x);
        assert_eq!(summed.evaluate(&x), expected);
    }
}
