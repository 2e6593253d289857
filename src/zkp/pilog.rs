// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that a Paillier ciphertext and a group element share the same
//! (short) exponent (`Π[log*]`): `C = Enc(x; ρ)` and `X = x·B` for a
//! designated base `B`.
//!
//! Sign round 2 uses it with `B = G` to link `Gᵢ` to `Γᵢ`; round 3 uses it
//! with `B = Γ` to link `Kᵢ` to `Δᵢ`.

use crate::{
    curve::{bn_to_scalar, curve_order, CurvePoint},
    errors::{InternalError, Result},
    paillier::{Ciphertext, EncryptionKey, Nonce},
    parameters::{ELL, EPSILON},
    ring_pedersen::RingPedersen,
    sampling,
    transcript::Transcript,
    zkp::Proof,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Statement: `C = Enc_prover(x; ρ)` and `X = x·B` with `|x| ≤ 2^ℓ`.
#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    ciphertext: &'a Ciphertext,
    public: &'a CurvePoint,
    base: &'a CurvePoint,
    prover: &'a EncryptionKey,
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        ciphertext: &'a Ciphertext,
        public: &'a CurvePoint,
        base: &'a CurvePoint,
        prover: &'a EncryptionKey,
        aux: &'a RingPedersen,
    ) -> Self {
        Self {
            ciphertext,
            public,
            base,
            prover,
            aux,
        }
    }
}

pub(crate) struct ProverSecret<'a> {
    x: &'a BigNumber,
    rho: &'a Nonce,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(x: &'a BigNumber, rho: &'a Nonce) -> Self {
        Self { x, rho }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
struct PiLogCommitment {
    /// `S = sˣ·tᵘ (mod N̂)`.
    s: BigNumber,
    /// `A = Enc(α; r)`.
    a: Ciphertext,
    /// `Y = α·B`.
    y: CurvePoint,
    /// `D = sᵅ·tᵞ (mod N̂)`.
    d: BigNumber,
}

/// Proof that a ciphertext and a group element open to the same exponent.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct PiLogProof {
    commitment: PiLogCommitment,
    /// `z₁ = α + e·x`.
    z1: BigNumber,
    /// `z₂ = r·ρᵉ (mod N)`.
    z2: BigNumber,
    /// `z₃ = γ + e·μ`.
    z3: BigNumber,
}

fn fill_transcript(
    transcript: &mut Transcript,
    input: &CommonInput<'_>,
    commitment: &PiLogCommitment,
) {
    transcript.append(input.aux);
    transcript.append(input.prover);
    transcript.append(input.ciphertext);
    transcript.append(input.public);
    transcript.append(input.base);
    transcript.append(&commitment.s);
    transcript.append(&commitment.a);
    transcript.append(&commitment.y);
    transcript.append(&commitment.d);
}

fn challenge(transcript: &mut Transcript) -> Result<BigNumber> {
    transcript.digest().plusminus_bn(&curve_order())
}

impl Proof for PiLogProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let alpha = sampling::interval_l_eps(rng);
        let r = sampling::unit_mod_n(rng, input.prover.modulus())?;
        let mu = sampling::interval_l_scaled(rng, input.aux.modulus());
        let gamma = sampling::interval_l_eps_scaled(rng, input.aux.modulus());

        let commitment = PiLogCommitment {
            s: input.aux.commit(secret.x, &mu)?,
            a: input.prover.encrypt_with_nonce(&alpha, &r)?,
            y: input.base.multiply_by_bignum(&alpha)?,
            d: input.aux.commit(&alpha, &gamma)?,
        };

        fill_transcript(transcript, &input, &commitment);
        let e = challenge(transcript)?;

        let z1 = &alpha + &e * secret.x;
        let z2 =
            (r * secret.rho.modpow(&e, input.prover.modulus())).nmod(input.prover.modulus());
        let z3 = &gamma + &e * &mu;

        Ok(Self {
            commitment,
            z1,
            z2,
            z3,
        })
    }

    fn verify(self, input: Self::CommonInput<'_>, transcript: &mut Transcript) -> Result<()> {
        if !input.prover.validate_ciphertext(&self.commitment.a) {
            error!("PiLog commitment ciphertext is invalid");
            return Err(InternalError::ProtocolError(None));
        }
        if !sampling::in_symmetric_range(&self.z1, ELL + EPSILON + 1) {
            error!("PiLog response z1 is out of range");
            return Err(InternalError::ProtocolError(None));
        }

        fill_transcript(transcript, &input, &self.commitment);
        let e = challenge(transcript)?;

        if !input
            .aux
            .verify_response(&self.z1, &self.z3, &e, &self.commitment.d, &self.commitment.s)?
        {
            error!("PiLog Pedersen response check failed");
            return Err(InternalError::ProtocolError(None));
        }

        // Enc(z₁; z₂) == A ⊕ (e ⊙ C)
        let lhs = input.prover.encrypt_with_nonce(&self.z1, &self.z2)?;
        let rhs = input
            .prover
            .add(&self.commitment.a, &input.prover.mul(input.ciphertext, &e)?);
        if lhs != rhs {
            error!("PiLog ciphertext equation failed");
            return Err(InternalError::ProtocolError(None));
        }

        // z₁·B == Y + e·X
        let lhs_point = input.base.multiply_by_bignum(&self.z1)?;
        let rhs_point =
            self.commitment.y + input.public.multiply_by_scalar(&bn_to_scalar(&e)?);
        if lhs_point != rhs_point {
            error!("PiLog group equation failed");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{paillier::DecryptionKey, sampling::interval_l, testing::test_rng};

    fn transcript() -> Transcript {
        Transcript::new("PiLogProof Test")
    }

    fn setup() -> (rand::rngs::StdRng, EncryptionKey, RingPedersen) {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let pk = dk.encryption_key();
        let aux_dk = DecryptionKey::generate(&mut rng).unwrap();
        let (aux, _) = RingPedersen::gen(&mut rng, &aux_dk).unwrap();
        (rng, pk, aux)
    }

    #[test]
    fn proof_verifies_with_default_base() {
        let (mut rng, pk, aux) = setup();
        let x = interval_l(&mut rng);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &x).unwrap();
        let base = CurvePoint::GENERATOR;
        let public = base.multiply_by_bignum(&x).unwrap();

        let input = CommonInput::new(&ciphertext, &public, &base, &pk, &aux);
        let proof = PiLogProof::prove(
            input.clone(),
            ProverSecret::new(&x, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_ok());
    }

    #[test]
    fn proof_verifies_with_custom_base() {
        let (mut rng, pk, aux) = setup();
        let x = interval_l(&mut rng);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &x).unwrap();
        let base_exponent = interval_l(&mut rng);
        let base = CurvePoint::GENERATOR
            .multiply_by_bignum(&base_exponent)
            .unwrap();
        let public = base.multiply_by_bignum(&x).unwrap();

        let input = CommonInput::new(&ciphertext, &public, &base, &pk, &aux);
        let proof = PiLogProof::prove(
            input.clone(),
            ProverSecret::new(&x, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_ok());
    }

    #[test]
    fn proof_rejects_mismatched_public_point() {
        let (mut rng, pk, aux) = setup();
        let x = interval_l(&mut rng);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &x).unwrap();
        let base = CurvePoint::GENERATOR;
        let public = base.multiply_by_bignum(&x).unwrap();
        let wrong_public = base
            .multiply_by_bignum(&interval_l(&mut rng))
            .unwrap();

        let input = CommonInput::new(&ciphertext, &public, &base, &pk, &aux);
        let proof = PiLogProof::prove(
            input,
            ProverSecret::new(&x, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();

        let bad_input = CommonInput::new(&ciphertext, &wrong_public, &base, &pk, &aux);
        assert!(proof.verify(bad_input, &mut transcript()).is_err());
    }

    #[test]
    fn proof_rejects_wrong_base() {
        let (mut rng, pk, aux) = setup();
        let x = interval_l(&mut rng);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &x).unwrap();
        let base = CurvePoint::GENERATOR;
        let public = base.multiply_by_bignum(&x).unwrap();
        let other_base = base.multiply_by_bignum(&BigNumber::from(7u64)).unwrap();

        let input = CommonInput::new(&ciphertext, &public, &base, &pk, &aux);
        let proof = PiLogProof::prove(
            input,
            ProverSecret::new(&x, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();

        let bad_input = CommonInput::new(&ciphertext, &public, &other_base, &pk, &aux);
        assert!(proof.verify(bad_input, &mut transcript()).is_err());
    }
}
