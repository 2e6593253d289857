// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that a Paillier ciphertext encrypts a value in the range `±2^ℓ`
//! (`Π[enc]`). Used in sign round 1 to show that `Kᵢ` encrypts a properly
//! short `kᵢ`.

use crate::{
    curve::curve_order,
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

/// Statement: `K = Enc_prover(k; ρ)` with `|k| ≤ 2^ℓ`.
#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    ciphertext: &'a Ciphertext,
    prover: &'a EncryptionKey,
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        ciphertext: &'a Ciphertext,
        prover: &'a EncryptionKey,
        aux: &'a RingPedersen,
    ) -> Self {
        Self {
            ciphertext,
            prover,
            aux,
        }
    }
}

pub(crate) struct ProverSecret<'a> {
    k: &'a BigNumber,
    rho: &'a Nonce,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(k: &'a BigNumber, rho: &'a Nonce) -> Self {
        Self { k, rho }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
struct PiEncCommitment {
    /// `S = sᵏ·tᵘ (mod N̂)`.
    s: BigNumber,
    /// `A = Enc(α; r)`.
    a: Ciphertext,
    /// `C = sᵅ·tᵞ (mod N̂)`.
    c: BigNumber,
}

/// Proof of knowledge of a short Paillier plaintext.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct PiEncProof {
    commitment: PiEncCommitment,
    /// `z₁ = α + e·k`.
    z1: BigNumber,
    /// `z₂ = r·ρᵉ (mod N)`.
    z2: BigNumber,
    /// `z₃ = γ + e·μ`.
    z3: BigNumber,
}

fn fill_transcript(
    transcript: &mut Transcript,
    input: &CommonInput<'_>,
    commitment: &PiEncCommitment,
) {
    transcript.append(input.aux);
    transcript.append(input.prover);
    transcript.append(input.ciphertext);
    transcript.append(&commitment.s);
    transcript.append(&commitment.a);
    transcript.append(&commitment.c);
}

fn challenge(transcript: &mut Transcript) -> Result<BigNumber> {
    transcript.digest().plusminus_bn(&curve_order())
}

impl Proof for PiEncProof {
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

        let commitment = PiEncCommitment {
            s: input.aux.commit(secret.k, &mu)?,
            a: input.prover.encrypt_with_nonce(&alpha, &r)?,
            c: input.aux.commit(&alpha, &gamma)?,
        };

        fill_transcript(transcript, &input, &commitment);
        let e = challenge(transcript)?;

        let z1 = &alpha + &e * secret.k;
        let z2 = (r * secret.rho.modpow(&e, input.prover.modulus()))
            .nmod(input.prover.modulus());
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
            error!("PiEnc commitment ciphertext is invalid");
            return Err(InternalError::ProtocolError(None));
        }
        // Tolerance of one extra bit over the sampling interval.
        if !sampling::in_symmetric_range(&self.z1, ELL + EPSILON + 1) {
            error!("PiEnc response z1 is out of range");
            return Err(InternalError::ProtocolError(None));
        }

        fill_transcript(transcript, &input, &self.commitment);
        let e = challenge(transcript)?;

        if !input
            .aux
            .verify_response(&self.z1, &self.z3, &e, &self.commitment.c, &self.commitment.s)?
        {
            error!("PiEnc Pedersen response check failed");
            return Err(InternalError::ProtocolError(None));
        }

        // Enc(z₁; z₂) == A ⊕ (e ⊙ K)
        let lhs = input.prover.encrypt_with_nonce(&self.z1, &self.z2)?;
        let rhs = input
            .prover
            .add(&self.commitment.a, &input.prover.mul(input.ciphertext, &e)?);
        if lhs != rhs {
            error!("PiEnc ciphertext equation failed");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        paillier::DecryptionKey,
        sampling::{interval_l, symmetric_by_bits},
        testing::test_rng,
    };

    fn transcript() -> Transcript {
        Transcript::new("PiEncProof Test")
    }

    fn setup() -> (
        rand::rngs::StdRng,
        EncryptionKey,
        RingPedersen,
    ) {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let pk = dk.encryption_key();
        let aux_dk = DecryptionKey::generate(&mut rng).unwrap();
        let (aux, _) = RingPedersen::gen(&mut rng, &aux_dk).unwrap();
        (rng, pk, aux)
    }

    #[test]
    fn proof_verifies_for_short_plaintext() {
        let (mut rng, pk, aux) = setup();
        let k = interval_l(&mut rng);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &k).unwrap();

        let input = CommonInput::new(&ciphertext, &pk, &aux);
        let proof = PiEncProof::prove(
            input.clone(),
            ProverSecret::new(&k, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_ok());
    }

    #[test]
    fn proof_rejects_oversized_plaintext() {
        let (mut rng, pk, aux) = setup();
        // A plaintext far outside ±2^(ℓ+ε) makes z1 land outside the checked
        // interval.
        let k = symmetric_by_bits(&mut rng, ELL + EPSILON + 128);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &k).unwrap();

        let input = CommonInput::new(&ciphertext, &pk, &aux);
        let proof = PiEncProof::prove(
            input.clone(),
            ProverSecret::new(&k, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_err());
    }

    #[test]
    fn proof_rejects_wrong_ciphertext() {
        let (mut rng, pk, aux) = setup();
        let k = interval_l(&mut rng);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &k).unwrap();
        let (other_ciphertext, _) = pk.encrypt(&mut rng, &k).unwrap();

        let input = CommonInput::new(&ciphertext, &pk, &aux);
        let proof = PiEncProof::prove(
            input,
            ProverSecret::new(&k, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();

        let other_input = CommonInput::new(&other_ciphertext, &pk, &aux);
        assert!(proof.verify(other_input, &mut transcript()).is_err());
    }

    #[test]
    fn proof_responses_bind_to_challenge() {
        let (mut rng, pk, aux) = setup();
        let k = interval_l(&mut rng);
        let (ciphertext, rho) = pk.encrypt(&mut rng, &k).unwrap();

        let input = CommonInput::new(&ciphertext, &pk, &aux);
        let mut proof = PiEncProof::prove(
            input.clone(),
            ProverSecret::new(&k, &rho),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        proof.z1 = &proof.z1 + BigNumber::one();
        assert!(proof.verify(input, &mut transcript()).is_err());
    }
}
