// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that a Paillier ciphertext decrypts to a plaintext congruent to a
//! given scalar (`Π[dec]`). The protocol family uses it in its
//! identified-abort paths; the signing happy path never sends one.

use crate::{
    curve::{bn_to_scalar, curve_order, CurvePoint},
    errors::{InternalError, Result},
    paillier::{Ciphertext, EncryptionKey, Nonce},
    ring_pedersen::RingPedersen,
    sampling,
    transcript::Transcript,
    zkp::Proof,
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Statement: `C = Enc_prover(y; ρ)` and `y ≡ x (mod q)`.
#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    ciphertext: &'a Ciphertext,
    plaintext_scalar: &'a Scalar,
    prover: &'a EncryptionKey,
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        ciphertext: &'a Ciphertext,
        plaintext_scalar: &'a Scalar,
        prover: &'a EncryptionKey,
        aux: &'a RingPedersen,
    ) -> Self {
        Self {
            ciphertext,
            plaintext_scalar,
            prover,
            aux,
        }
    }
}

pub(crate) struct ProverSecret<'a> {
    y: &'a BigNumber,
    rho: &'a Nonce,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(y: &'a BigNumber, rho: &'a Nonce) -> Self {
        Self { y, rho }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
struct PiDecCommitment {
    /// `S = sʸ·tᵘ (mod N̂)`.
    s: BigNumber,
    /// `T = sᵅ·tᵛ (mod N̂)`.
    t: BigNumber,
    /// `A = Enc(α; r)`.
    a: Ciphertext,
    /// `γ = α (mod q)`.
    gamma: Scalar,
}

/// Proof of correct decryption to a scalar.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct PiDecProof {
    commitment: PiDecCommitment,
    /// `z₁ = α + e·y`.
    z1: BigNumber,
    /// `z₂ = ν + e·μ`.
    z2: BigNumber,
    /// `w = r·ρᵉ (mod N)`.
    w: BigNumber,
}

fn fill_transcript(
    transcript: &mut Transcript,
    input: &CommonInput<'_>,
    commitment: &PiDecCommitment,
) {
    transcript.append(input.aux);
    transcript.append(input.prover);
    transcript.append(input.ciphertext);
    transcript.append(input.plaintext_scalar);
    transcript.append(&commitment.s);
    transcript.append(&commitment.t);
    transcript.append(&commitment.a);
    transcript.append(&commitment.gamma);
}

fn challenge(transcript: &mut Transcript) -> Result<BigNumber> {
    transcript.digest().plusminus_bn(&curve_order())
}

impl Proof for PiDecProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let alpha = sampling::interval_l_eps(rng);
        let mu = sampling::interval_l_scaled(rng, input.aux.modulus());
        let nu = sampling::interval_l_eps_scaled(rng, input.aux.modulus());
        let r = sampling::unit_mod_n(rng, input.prover.modulus())?;

        let commitment = PiDecCommitment {
            s: input.aux.commit(secret.y, &mu)?,
            t: input.aux.commit(&alpha, &nu)?,
            a: input.prover.encrypt_with_nonce(&alpha, &r)?,
            gamma: bn_to_scalar(&alpha)?,
        };

        fill_transcript(transcript, &input, &commitment);
        let e = challenge(transcript)?;

        let z1 = &alpha + &e * secret.y;
        let z2 = &nu + &e * &mu;
        let w = (r * secret.rho.modpow(&e, input.prover.modulus()))
            .nmod(input.prover.modulus());

        Ok(Self {
            commitment,
            z1,
            z2,
            w,
        })
    }

    fn verify(self, input: Self::CommonInput<'_>, transcript: &mut Transcript) -> Result<()> {
        if !input.prover.validate_ciphertext(&self.commitment.a) {
            error!("PiDec commitment ciphertext is invalid");
            return Err(InternalError::ProtocolError(None));
        }

        fill_transcript(transcript, &input, &self.commitment);
        let e = challenge(transcript)?;

        if !input
            .aux
            .verify_response(&self.z1, &self.z2, &e, &self.commitment.t, &self.commitment.s)?
        {
            error!("PiDec Pedersen response check failed");
            return Err(InternalError::ProtocolError(None));
        }

        // Enc(z₁; w) == A ⊕ (e ⊙ C)
        let lhs = input.prover.encrypt_with_nonce(&self.z1, &self.w)?;
        let rhs = input
            .prover
            .add(&self.commitment.a, &input.prover.mul(input.ciphertext, &e)?);
        if lhs != rhs {
            error!("PiDec ciphertext equation failed");
            return Err(InternalError::ProtocolError(None));
        }

        // z₁ == γ + e·x (mod q)
        let lhs_scalar = bn_to_scalar(&self.z1)?;
        let rhs_scalar = self.commitment.gamma + bn_to_scalar(&e)? * input.plaintext_scalar;
        if lhs_scalar != rhs_scalar {
            error!("PiDec scalar equation failed");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{curve::scalar_to_bn, paillier::DecryptionKey, testing::test_rng};
    use k256::elliptic_curve::Field;

    fn transcript() -> Transcript {
        Transcript::new("PiDecProof Test")
    }

    fn setup() -> (rand::rngs::StdRng, EncryptionKey, RingPedersen) {
        let mut rng = test_rng();
        let pk = DecryptionKey::generate(&mut rng).unwrap().encryption_key();
        let aux_dk = DecryptionKey::generate(&mut rng).unwrap();
        let (aux, _) = RingPedersen::gen(&mut rng, &aux_dk).unwrap();
        (rng, pk, aux)
    }

    #[test]
    fn proof_verifies_for_matching_scalar() {
        let (mut rng, pk, aux) = setup();
        let x = Scalar::random(&mut rng);
        let y = scalar_to_bn(&x);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &y).unwrap();

        let input = CommonInput::new(&ciphertext, &x, &pk, &aux);
        let proof = PiDecProof::prove(
            input.clone(),
            ProverSecret::new(&y, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_ok());
    }

    #[test]
    fn proof_rejects_wrong_scalar() {
        let (mut rng, pk, aux) = setup();
        let x = Scalar::random(&mut rng);
        let wrong = Scalar::random(&mut rng);
        let y = scalar_to_bn(&x);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &y).unwrap();

        let input = CommonInput::new(&ciphertext, &x, &pk, &aux);
        let proof = PiDecProof::prove(
            input,
            ProverSecret::new(&y, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();

        let bad_input = CommonInput::new(&ciphertext, &wrong, &pk, &aux);
        assert!(proof.verify(bad_input, &mut transcript()).is_err());
    }

    #[test]
    fn proof_rejects_wrong_ciphertext() {
        let (mut rng, pk, aux) = setup();
        let x = Scalar::random(&mut rng);
        let y = scalar_to_bn(&x);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &y).unwrap();
        let (other, _) = pk.encrypt(&mut rng, &y).unwrap();

        let input = CommonInput::new(&ciphertext, &x, &pk, &aux);
        let proof = PiDecProof::prove(
            input,
            ProverSecret::new(&y, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();

        let bad_input = CommonInput::new(&other, &x, &pk, &aux);
        assert!(proof.verify(bad_input, &mut transcript()).is_err());
    }
}
