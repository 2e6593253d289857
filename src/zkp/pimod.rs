// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that a Paillier modulus is a Blum-like integer (`Π[mod]`): an odd
//! composite `N = p·q` with `p ≡ q ≡ 3 (mod 4)`, shown by extracting fourth
//! roots of challenge values over `STAT_PARAM` iterations.

use crate::{
    errors::{CallerError, InternalError, Result},
    parameters::STAT_PARAM,
    sampling::SAMPLING_RETRY_LIMIT,
    transcript::Transcript,
    zkp::Proof,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    modulus: &'a BigNumber,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(modulus: &'a BigNumber) -> Self {
        Self { modulus }
    }
}

pub(crate) struct ProverSecret<'a> {
    p: &'a BigNumber,
    q: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(p: &'a BigNumber, q: &'a BigNumber) -> Self {
        Self { p, q }
    }
}

/// One iteration's response: a fourth root of the adjusted challenge, the
/// adjustment bits, and an N-th root of the challenge.
#[derive(Clone, Serialize, Deserialize, Debug)]
struct PiModElement {
    x: BigNumber,
    a: bool,
    b: bool,
    z: BigNumber,
}

/// Proof that a modulus is a Blum-like integer.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct PiModProof {
    /// A fixed non-residue with Jacobi symbol −1.
    w: BigNumber,
    elements: Vec<PiModElement>,
}

/// The Jacobi symbol `(a/n)` for odd positive `n`.
pub(crate) fn jacobi(a: &BigNumber, n: &BigNumber) -> i32 {
    let zero = BigNumber::zero();
    let one = BigNumber::one();
    let two = BigNumber::from(2u64);
    let three = BigNumber::from(3u64);
    let four = BigNumber::from(4u64);
    let five = BigNumber::from(5u64);
    let eight = BigNumber::from(8u64);

    let mut a = a.nmod(n);
    let mut n = n.clone();
    let mut result = 1i32;
    while a != zero {
        while a.nmod(&two) == zero {
            a = a / &two;
            let r = n.nmod(&eight);
            if r == three || r == five {
                result = -result;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if a.nmod(&four) == three && n.nmod(&four) == three {
            result = -result;
        }
        a = a.nmod(&n);
    }
    if n == one {
        result
    } else {
        0
    }
}

/// The Legendre symbol is 1 iff `a` is a quadratic residue mod prime `p`.
fn is_qr_mod_prime(a: &BigNumber, p: &BigNumber) -> bool {
    let exp = (p - 1) / BigNumber::from(2u64);
    a.nmod(p).modpow(&exp, p) == BigNumber::one()
}

/// The square root of a quadratic residue mod a prime `p ≡ 3 (mod 4)`,
/// adjusted so that the returned root is itself a quadratic residue.
fn sqrt_qr_mod_prime(v: &BigNumber, p: &BigNumber) -> Result<BigNumber> {
    let exp = (p + 1) / BigNumber::from(4u64);
    let root = v.nmod(p).modpow(&exp, p);
    if (&root * &root).nmod(p) != v.nmod(p) {
        error!("Value has no square root mod p");
        return Err(InternalError::InternalInvariantFailed);
    }
    // Exactly one of ±root is a residue, because -1 is a non-residue for
    // p ≡ 3 (mod 4).
    if is_qr_mod_prime(&root, p) {
        Ok(root)
    } else {
        Ok((p - root).nmod(p))
    }
}

/// CRT-combine residues mod `p` and `q`.
fn crt_combine(
    rp: &BigNumber,
    rq: &BigNumber,
    p: &BigNumber,
    q: &BigNumber,
) -> Result<BigNumber> {
    let p_inv = p.invert(q).ok_or_else(|| {
        error!("CRT moduli are not coprime");
        InternalError::InternalInvariantFailed
    })?;
    let n = p * q;
    let diff = (rq - rp).nmod(q);
    Ok((rp + p * ((diff * p_inv).nmod(q))).nmod(&n))
}

/// A fourth root of a quadratic residue mod `N = p·q` with
/// `p ≡ q ≡ 3 (mod 4)`.
fn fourth_root(v: &BigNumber, p: &BigNumber, q: &BigNumber) -> Result<BigNumber> {
    let sqrt_p = sqrt_qr_mod_prime(&sqrt_qr_mod_prime(v, p)?, p)?;
    let sqrt_q = sqrt_qr_mod_prime(&sqrt_qr_mod_prime(v, q)?, q)?;
    crt_combine(&sqrt_p, &sqrt_q, p, q)
}

fn derive_challenges(
    transcript: &mut Transcript,
    input: &CommonInput<'_>,
    w: &BigNumber,
) -> Result<Vec<BigNumber>> {
    transcript.append(input.modulus);
    transcript.append(w);
    let mut digest = transcript.digest();
    (0..STAT_PARAM)
        .map(|_| digest.positive_bn_below(input.modulus))
        .collect()
}

impl Proof for PiModProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let n = input.modulus;
        if &(secret.p * secret.q) != n {
            error!("PiMod witness does not factor the modulus");
            return Err(InternalError::InternalInvariantFailed);
        }

        // A non-residue with Jacobi symbol −1 exists for half of Z_N*.
        let mut w = BigNumber::from_rng(n, rng);
        let mut retries = 0;
        while jacobi(&w, n) != -1 {
            w = BigNumber::from_rng(n, rng);
            retries += 1;
            if retries > SAMPLING_RETRY_LIMIT {
                Err(CallerError::RetryFailed)?;
            }
        }

        let phi = (secret.p - 1) * (secret.q - 1);
        let n_inv = n.invert(&phi).ok_or_else(|| {
            error!("Modulus is not invertible mod its own totient");
            InternalError::InternalInvariantFailed
        })?;

        let challenges = derive_challenges(transcript, &input, &w)?;
        let elements = challenges
            .into_iter()
            .map(|y| {
                let z = y.modpow(&n_inv, n);

                // Exactly one of (±1)·w^b·y is a quadratic residue mod both
                // primes.
                let mut chosen = None;
                for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
                    let mut candidate = y.clone();
                    if b {
                        candidate = (candidate * &w).nmod(n);
                    }
                    if a {
                        candidate = (n - candidate).nmod(n);
                    }
                    if is_qr_mod_prime(&candidate, secret.p) && is_qr_mod_prime(&candidate, secret.q)
                    {
                        chosen = Some((candidate, a, b));
                        break;
                    }
                }
                let (adjusted, a, b) = chosen.ok_or_else(|| {
                    error!("No quadratic-residue adjustment exists; modulus is not Blum-like");
                    InternalError::InternalInvariantFailed
                })?;
                let x = fourth_root(&adjusted, secret.p, secret.q)?;
                Ok(PiModElement { x, a, b, z })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { w, elements })
    }

    fn verify(self, input: Self::CommonInput<'_>, transcript: &mut Transcript) -> Result<()> {
        let n = input.modulus;
        let two = BigNumber::from(2u64);

        if n.nmod(&two) == BigNumber::zero() {
            error!("PiMod modulus is even");
            return Err(InternalError::ProtocolError(None));
        }
        if n.is_prime() {
            error!("PiMod modulus is prime");
            return Err(InternalError::ProtocolError(None));
        }
        if self.w <= BigNumber::zero() || &self.w >= n || jacobi(&self.w, n) != -1 {
            error!("PiMod non-residue is invalid");
            return Err(InternalError::ProtocolError(None));
        }
        if self.elements.len() != STAT_PARAM {
            error!("PiMod proof has the wrong number of iterations");
            return Err(InternalError::ProtocolError(None));
        }

        let challenges = derive_challenges(transcript, &input, &self.w)?;
        for (element, y) in self.elements.iter().zip(&challenges) {
            // zᵢ^N == yᵢ (mod N)
            if element.z.modpow(n, n) != y.nmod(n) {
                error!("PiMod N-th root check failed");
                return Err(InternalError::ProtocolError(None));
            }

            // xᵢ⁴ == (−1)^a·w^b·yᵢ (mod N)
            let mut expected = y.clone();
            if element.b {
                expected = (expected * &self.w).nmod(n);
            }
            if element.a {
                expected = (n - expected).nmod(n);
            }
            let x_squared = (&element.x * &element.x).nmod(n);
            let x_fourth = (&x_squared * &x_squared).nmod(n);
            if x_fourth != expected {
                error!("PiMod fourth-root check failed");
                return Err(InternalError::ProtocolError(None));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{paillier::DecryptionKey, testing::test_rng};

    fn transcript() -> Transcript {
        Transcript::new("PiModProof Test")
    }

    #[test]
    fn proof_verifies_for_blum_modulus() {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let modulus = dk.modulus().clone();

        let input = CommonInput::new(&modulus);
        let proof = PiModProof::prove(
            input.clone(),
            ProverSecret::new(dk.p(), dk.q()),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_ok());
    }

    #[test]
    fn proof_rejects_swapped_modulus() {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let other_dk = DecryptionKey::generate(&mut rng).unwrap();
        let modulus = dk.modulus().clone();
        let other_modulus = other_dk.modulus().clone();

        let input = CommonInput::new(&modulus);
        let proof = PiModProof::prove(
            input,
            ProverSecret::new(dk.p(), dk.q()),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        let bad_input = CommonInput::new(&other_modulus);
        assert!(proof.verify(bad_input, &mut transcript()).is_err());
    }

    #[test]
    fn proof_rejects_tampered_roots() {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let modulus = dk.modulus().clone();

        let input = CommonInput::new(&modulus);
        let mut proof = PiModProof::prove(
            input.clone(),
            ProverSecret::new(dk.p(), dk.q()),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        proof.elements[0].x = (&proof.elements[0].x + BigNumber::one()).nmod(&modulus);
        assert!(proof.verify(input, &mut transcript()).is_err());
    }

    #[test]
    fn jacobi_symbol_matches_known_values() {
        // (2/15) = 1, (7/15) = -1, (3/15) = 0 for the classic small case.
        let fifteen = BigNumber::from(15u64);
        assert_eq!(jacobi(&BigNumber::from(2u64), &fifteen), 1);
        assert_eq!(jacobi(&BigNumber::from(7u64), &fifteen), -1);
        assert_eq!(jacobi(&BigNumber::from(3u64), &fifteen), 0);
    }
}
