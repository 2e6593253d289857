// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Ring-Pedersen commitment parameters `(N̂, s, t)` used as the auxiliary
//! setup for every range proof in the protocol.

use crate::{
    errors::{InternalError, Result},
    paillier::{modpow_signed, DecryptionKey},
    sampling::unit_mod_n,
    transcript::{bn_transcript_bytes, TranscriptWrite},
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Public ring-Pedersen parameters for one party.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub(crate) struct RingPedersen {
    n: BigNumber,
    s: BigNumber,
    t: BigNumber,
}

impl RingPedersen {
    pub(crate) fn from_parts(n: BigNumber, s: BigNumber, t: BigNumber) -> Self {
        Self { n, s, t }
    }

    /// Generate parameters over a party's own Paillier modulus.
    ///
    /// Returns the parameters together with the secret exponent `λ` with
    /// `s = t^λ (mod N̂)`.
    pub(crate) fn gen<R: RngCore + CryptoRng>(
        rng: &mut R,
        dk: &DecryptionKey,
    ) -> Result<(Self, BigNumber)> {
        let n = dk.modulus().clone();
        let phi = dk.totient();
        let lambda = BigNumber::from_rng(&phi, rng);
        let r = unit_mod_n(rng, &n)?;
        let t = (&r * &r).nmod(&n);
        let s = t.modpow(&lambda, &n);
        Ok((Self { n, s, t }, lambda))
    }

    pub(crate) fn modulus(&self) -> &BigNumber {
        &self.n
    }

    pub(crate) fn s(&self) -> &BigNumber {
        &self.s
    }

    pub(crate) fn t(&self) -> &BigNumber {
        &self.t
    }

    /// Reject parameters outside the multiplicative group of `N̂`.
    pub(crate) fn validate(&self) -> Result<()> {
        let in_group = |v: &BigNumber| {
            v > &BigNumber::zero() && v < &self.n && v.gcd(&self.n) == BigNumber::one()
        };
        if !in_group(&self.s) || !in_group(&self.t) {
            error!("Ring-Pedersen parameters are not units mod N̂");
            return Err(InternalError::ProtocolError(None));
        }
        if self.s == self.t {
            error!("Ring-Pedersen parameters s and t coincide");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(())
    }

    /// `commit(x, r) = sˣ·tʳ (mod N̂)`. Both exponents may be negative.
    pub(crate) fn commit(&self, x: &BigNumber, r: &BigNumber) -> Result<BigNumber> {
        let sx = modpow_signed(&self.s, x, &self.n)?;
        let tr = modpow_signed(&self.t, r, &self.n)?;
        Ok((sx * tr).nmod(&self.n))
    }

    /// Check a masked opening: `s^a·t^b == A·Bᵉ (mod N̂)`, where `A`
    /// commits to the nonces and `B` to the secrets.
    pub(crate) fn verify_response(
        &self,
        a: &BigNumber,
        b: &BigNumber,
        e: &BigNumber,
        nonce_commitment: &BigNumber,
        secret_commitment: &BigNumber,
    ) -> Result<bool> {
        let lhs = self.commit(a, b)?;
        let rhs =
            (nonce_commitment * modpow_signed(secret_commitment, e, &self.n)?).nmod(&self.n);
        Ok(lhs == rhs)
    }
}

impl TranscriptWrite for RingPedersen {
    fn domain(&self) -> &'static str {
        "Ring-Pedersen Parameters"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        let mut bytes = bn_transcript_bytes(&self.n);
        bytes.extend(bn_transcript_bytes(&self.s));
        bytes.extend(bn_transcript_bytes(&self.t));
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sampling::symmetric_by_bits, testing::test_rng};

    fn setup() -> (rand::rngs::StdRng, RingPedersen, BigNumber) {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let (params, lambda) = RingPedersen::gen(&mut rng, &dk).unwrap();
        (rng, params, lambda)
    }

    #[test]
    fn generated_parameters_validate() {
        let (_, params, _) = setup();
        assert!(params.validate().is_ok());
    }

    #[test]
    fn masked_openings_verify() {
        let (mut rng, params, _) = setup();

        // Schnorr-style: commit to x with mask m, respond z = α + e·x,
        // w = γ + e·m.
        let x = symmetric_by_bits(&mut rng, 256);
        let m = symmetric_by_bits(&mut rng, 256);
        let alpha = symmetric_by_bits(&mut rng, 512);
        let gamma = symmetric_by_bits(&mut rng, 512);
        let e = symmetric_by_bits(&mut rng, 128);

        let secret_commitment = params.commit(&x, &m).unwrap();
        let nonce_commitment = params.commit(&alpha, &gamma).unwrap();

        let z = &alpha + &e * &x;
        let w = &gamma + &e * &m;
        assert!(params
            .verify_response(&z, &w, &e, &nonce_commitment, &secret_commitment)
            .unwrap());

        let bad_z = z + BigNumber::one();
        assert!(!params
            .verify_response(&bad_z, &w, &e, &nonce_commitment, &secret_commitment)
            .unwrap());
    }

    #[test]
    fn tampered_parameters_fail_validation() {
        let (_, params, _) = setup();
        let bad = RingPedersen::from_parts(
            params.modulus().clone(),
            params.modulus().clone(),
            params.t().clone(),
        );
        assert!(bad.validate().is_err());
    }
}
