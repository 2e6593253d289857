// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that ring-Pedersen parameters are well-formed (`Π[prm]`):
//! `s ∈ ⟨t⟩ (mod N̂)`, via `STAT_PARAM` parallel Schnorr iterations with bit
//! challenges.

use crate::{
    errors::{InternalError, Result},
    parameters::STAT_PARAM,
    ring_pedersen::RingPedersen,
    transcript::Transcript,
    zkp::Proof,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Statement: the ring-Pedersen parameters themselves.
#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(aux: &'a RingPedersen) -> Self {
        Self { aux }
    }
}

/// Witness: `λ` with `s = t^λ`, and `φ(N̂)`.
pub(crate) struct ProverSecret<'a> {
    lambda: &'a BigNumber,
    totient: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(lambda: &'a BigNumber, totient: &'a BigNumber) -> Self {
        Self { lambda, totient }
    }
}

/// Proof that `s` lies in the subgroup generated by `t`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct PiPrmProof {
    /// `Aᵢ = t^{aᵢ} (mod N̂)`.
    commitments: Vec<BigNumber>,
    /// `zᵢ = aᵢ + eᵢ·λ (mod φ(N̂))`.
    responses: Vec<BigNumber>,
}

fn challenge_bits(transcript: &mut Transcript) -> Vec<bool> {
    let mut digest = transcript.digest();
    (0..STAT_PARAM).map(|_| digest.bit()).collect()
}

fn fill_transcript(transcript: &mut Transcript, input: &CommonInput<'_>, commitments: &[BigNumber]) {
    transcript.append(input.aux);
    for commitment in commitments {
        transcript.append(commitment);
    }
}

impl Proof for PiPrmProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let nonces: Vec<BigNumber> = (0..STAT_PARAM)
            .map(|_| BigNumber::from_rng(secret.totient, rng))
            .collect();
        let commitments: Vec<BigNumber> = nonces
            .iter()
            .map(|a| input.aux.t().modpow(a, input.aux.modulus()))
            .collect();

        fill_transcript(transcript, &input, &commitments);
        let challenges = challenge_bits(transcript);

        let responses = nonces
            .iter()
            .zip(&challenges)
            .map(|(a, e)| {
                if *e {
                    (a + secret.lambda).nmod(secret.totient)
                } else {
                    a.clone()
                }
            })
            .collect();

        Ok(Self {
            commitments,
            responses,
        })
    }

    fn verify(self, input: Self::CommonInput<'_>, transcript: &mut Transcript) -> Result<()> {
        if self.commitments.len() != STAT_PARAM || self.responses.len() != STAT_PARAM {
            error!("PiPrm proof has the wrong number of iterations");
            return Err(InternalError::ProtocolError(None));
        }
        input.aux.validate()?;

        fill_transcript(transcript, &input, &self.commitments);
        let challenges = challenge_bits(transcript);

        for ((commitment, response), e) in
            self.commitments.iter().zip(&self.responses).zip(&challenges)
        {
            // t^{zᵢ} == Aᵢ·s^{eᵢ} (mod N̂)
            let lhs = input.aux.t().modpow(response, input.aux.modulus());
            let rhs = if *e {
                (commitment * input.aux.s()).nmod(input.aux.modulus())
            } else {
                commitment.nmod(input.aux.modulus())
            };
            if lhs != rhs {
                error!("PiPrm iteration failed");
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
        Transcript::new("PiPrmProof Test")
    }

    #[test]
    fn proof_verifies_for_honest_parameters() {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let (aux, lambda) = RingPedersen::gen(&mut rng, &dk).unwrap();
        let totient = dk.totient();

        let input = CommonInput::new(&aux);
        let proof = PiPrmProof::prove(
            input.clone(),
            ProverSecret::new(&lambda, &totient),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_ok());
    }

    #[test]
    fn proof_rejects_wrong_lambda() {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let (aux, lambda) = RingPedersen::gen(&mut rng, &dk).unwrap();
        let totient = dk.totient();
        let wrong_lambda = (&lambda + BigNumber::one()).nmod(&totient);

        let input = CommonInput::new(&aux);
        let proof = PiPrmProof::prove(
            input.clone(),
            ProverSecret::new(&wrong_lambda, &totient),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_err());
    }

    #[test]
    fn truncated_proofs_are_rejected() {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let (aux, lambda) = RingPedersen::gen(&mut rng, &dk).unwrap();
        let totient = dk.totient();

        let input = CommonInput::new(&aux);
        let mut proof = PiPrmProof::prove(
            input.clone(),
            ProverSecret::new(&lambda, &totient),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        proof.commitments.pop();
        proof.responses.pop();
        assert!(proof.verify(input, &mut transcript()).is_err());
    }
}
