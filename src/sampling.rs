// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Random draws from the integer domains the zero-knowledge proofs are
//! defined over.
//!
//! Each sampler is named for the interval it covers in the protocol
//! description: `ℓ` and `ℓ′` are the plaintext bounds, `ε` the slack added
//! to prover nonces, and the `_scaled` variants stretch an interval by a
//! ring-Pedersen modulus so the Pedersen masks statistically hide the
//! committed value.

use crate::{
    errors::{CallerError, Result},
    parameters::{ELL, ELL_PRIME, EPSILON, PRIME_BITS},
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, Rng, RngCore};
use tracing::error;

/// How often a rejection-sampling loop may retry before reporting failure.
pub(crate) const SAMPLING_RETRY_LIMIT: usize = 500;

/// A draw from the closed interval `[-bound, bound]`.
fn symmetric<R: RngCore + CryptoRng>(rng: &mut R, bound: &BigNumber) -> BigNumber {
    // from_rng covers [0, m); widen by one so the bound itself can occur,
    // then attach an independent sign.
    let magnitude = BigNumber::from_rng(&(bound + 1), rng);
    if rng.gen::<bool>() {
        magnitude
    } else {
        -magnitude
    }
}

/// A draw from `[-2^bits, 2^bits]`.
pub(crate) fn symmetric_by_bits<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> BigNumber {
    symmetric(rng, &(BigNumber::one() << bits))
}

/// `±2^ℓ`: the range a well-formed nonce share lives in.
pub(crate) fn interval_l<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    symmetric_by_bits(rng, ELL)
}

/// `±2^ℓ′`: the range of the MtA additive masks.
pub(crate) fn interval_l_prime<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    symmetric_by_bits(rng, ELL_PRIME)
}

/// `±2^(ℓ+ε)`: prover nonces masking an `ℓ`-bit witness.
pub(crate) fn interval_l_eps<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    symmetric_by_bits(rng, ELL + EPSILON)
}

/// `±2^(ℓ′+ε)`: prover nonces masking an `ℓ′`-bit witness.
pub(crate) fn interval_l_prime_eps<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    symmetric_by_bits(rng, ELL_PRIME + EPSILON)
}

/// `±2^(ℓ+ε)·√N`: nonces masking a prime factor, with `√N` approximated
/// from above by a power of two.
pub(crate) fn interval_l_eps_sqrt_n<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    symmetric_by_bits(rng, ELL + EPSILON + PRIME_BITS)
}

/// `±2^ℓ·m`: Pedersen mask for a committed `ℓ`-bit value over modulus `m`.
pub(crate) fn interval_l_scaled<R: RngCore + CryptoRng>(
    rng: &mut R,
    modulus: &BigNumber,
) -> BigNumber {
    symmetric(rng, &((BigNumber::one() << ELL) * modulus))
}

/// `±2^(ℓ+ε)·m`: Pedersen mask for a prover nonce over modulus `m`.
pub(crate) fn interval_l_eps_scaled<R: RngCore + CryptoRng>(
    rng: &mut R,
    modulus: &BigNumber,
) -> BigNumber {
    symmetric(rng, &((BigNumber::one() << (ELL + EPSILON)) * modulus))
}

/// A unit of `Z_n*`, for Paillier and Pedersen nonces.
///
/// A draw sharing a factor with `n` would hand us the factorization of a
/// peer's modulus; such draws are vanishingly rare and are rejected along
/// with zero.
pub(crate) fn unit_mod_n<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> Result<BigNumber> {
    for _ in 0..SAMPLING_RETRY_LIMIT {
        let candidate = BigNumber::from_rng(n, rng);
        if candidate != BigNumber::zero() && candidate.gcd(n) == BigNumber::one() {
            return Ok(candidate);
        }
    }
    error!("Could not sample a unit modulo n");
    Err(CallerError::RetryFailed)?
}

/// Whether a proof response landed inside `[-2^bits, 2^bits]`.
pub(crate) fn in_symmetric_range(value: &BigNumber, bits: usize) -> bool {
    let upper = BigNumber::one() << bits;
    let lower = -upper.clone();
    value >= &lower && value <= &upper
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_rng;

    #[test]
    fn symmetric_draws_respect_bounds_and_cover_both_signs() {
        let mut rng = test_rng();
        let mut negatives = 0;
        for _ in 0..64 {
            let value = symmetric_by_bits(&mut rng, 96);
            assert!(in_symmetric_range(&value, 96));
            if value < BigNumber::zero() {
                negatives += 1;
            }
        }
        assert!(negatives > 0 && negatives < 64);
    }

    #[test]
    fn scaled_intervals_exceed_their_unscaled_counterparts() {
        let mut rng = test_rng();
        let modulus = BigNumber::one() << 256;
        // A scaled draw may leave the unscaled interval; over many draws at
        // least one should.
        let escaped = (0..64)
            .map(|_| interval_l_scaled(&mut rng, &modulus))
            .any(|v| !in_symmetric_range(&v, ELL));
        assert!(escaped);
    }

    #[test]
    fn units_are_invertible() {
        let mut rng = test_rng();
        let n = BigNumber::from(143u64); // 11 · 13
        for _ in 0..16 {
            let unit = unit_mod_n(&mut rng, &n).unwrap();
            assert!(unit.invert(&n).is_some());
        }
    }

    #[test]
    fn range_check_is_inclusive() {
        let limit = BigNumber::one() << 16;
        assert!(in_symmetric_range(&limit, 16));
        assert!(in_symmetric_range(&-limit.clone(), 16));
        assert!(!in_symmetric_range(&(limit + 1), 16));
    }
}
