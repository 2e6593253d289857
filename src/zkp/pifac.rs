// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that neither factor of a Paillier modulus is small (`Π[fac]`),
//! relative to the verifier's ring-Pedersen parameters. Sent peer-to-peer in
//! keygen round 3.

use crate::{
    errors::{InternalError, Result},
    paillier::modpow_signed,
    parameters::{ELL, EPSILON, PRIME_BITS},
    ring_pedersen::RingPedersen,
    sampling,
    transcript::{Digest, Transcript},
    zkp::Proof,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Statement: the prover knows `p, q` with `N₀ = p·q` and both factors of
/// size roughly `√N₀`.
#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    modulus: &'a BigNumber,
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(modulus: &'a BigNumber, aux: &'a RingPedersen) -> Self {
        Self { modulus, aux }
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

#[derive(Clone, Serialize, Deserialize, Debug)]
struct PiFacCommitment {
    /// `P = sᵖ·tᵘ (mod N̂)`.
    p_commit: BigNumber,
    /// `Q = s^q·tᵛ (mod N̂)`.
    q_commit: BigNumber,
    /// `A = sᵅ·tˣ (mod N̂)`.
    a_commit: BigNumber,
    /// `B = sᵝ·tʸ (mod N̂)`.
    b_commit: BigNumber,
    /// `T = Qᵅ·tʳ (mod N̂)`.
    t_commit: BigNumber,
    /// `σ`, published alongside the commitment.
    sigma: BigNumber,
}

/// Proof that the factors of a modulus are large.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct PiFacProof {
    commitment: PiFacCommitment,
    /// `z₁ = α + e·p`.
    z1: BigNumber,
    /// `z₂ = β + e·q`.
    z2: BigNumber,
    /// `w₁ = x + e·μ`.
    w1: BigNumber,
    /// `w₂ = y + e·ν`.
    w2: BigNumber,
    /// `v = r + e·σ̂`, with `σ̂ = σ − ν·p`.
    v: BigNumber,
}

fn fill_transcript(
    transcript: &mut Transcript,
    input: &CommonInput<'_>,
    commitment: &PiFacCommitment,
) {
    transcript.append(input.aux);
    transcript.append(input.modulus);
    transcript.append(&commitment.p_commit);
    transcript.append(&commitment.q_commit);
    transcript.append(&commitment.a_commit);
    transcript.append(&commitment.b_commit);
    transcript.append(&commitment.t_commit);
    transcript.append(&commitment.sigma);
}

/// The challenge for `Π[fac]` is drawn from `±2^ℓ`.
///
/// The protocol paper specifies `±q` here; this implementation keeps the
/// `±2^ℓ` interval. Widening it is a one-line change at this site.
fn fac_challenge(digest: &mut Digest) -> BigNumber {
    digest.plusminus_bn_by_size(ELL)
}

impl Proof for PiFacProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        // √N₀ is approximated from above by 2^(PRIME_BITS).
        let alpha = sampling::interval_l_eps_sqrt_n(rng);
        let beta = sampling::interval_l_eps_sqrt_n(rng);
        let mu = sampling::interval_l_scaled(rng, input.aux.modulus());
        let nu = sampling::interval_l_scaled(rng, input.aux.modulus());
        let n_hat_squared = input.aux.modulus() * input.aux.modulus();
        let sigma = sampling::interval_l_scaled(rng, &n_hat_squared);
        let r = sampling::interval_l_eps_scaled(rng, &n_hat_squared);
        let x = sampling::interval_l_eps_scaled(rng, input.aux.modulus());
        let y = sampling::interval_l_eps_scaled(rng, input.aux.modulus());

        let q_commit = input.aux.commit(secret.q, &nu)?;
        let t_commit = (modpow_signed(&q_commit, &alpha, input.aux.modulus())?
            * modpow_signed(input.aux.t(), &r, input.aux.modulus())?)
        .nmod(input.aux.modulus());
        let commitment = PiFacCommitment {
            p_commit: input.aux.commit(secret.p, &mu)?,
            q_commit,
            a_commit: input.aux.commit(&alpha, &x)?,
            b_commit: input.aux.commit(&beta, &y)?,
            t_commit,
            sigma: sigma.clone(),
        };

        fill_transcript(transcript, &input, &commitment);
        let e = fac_challenge(&mut transcript.digest());

        let z1 = &alpha + &e * secret.p;
        let z2 = &beta + &e * secret.q;
        let w1 = &x + &e * &mu;
        let w2 = &y + &e * &nu;
        let sigma_hat = &sigma - &nu * secret.p;
        let v = &r + &e * &sigma_hat;

        Ok(Self {
            commitment,
            z1,
            z2,
            w1,
            w2,
            v,
        })
    }

    fn verify(self, input: Self::CommonInput<'_>, transcript: &mut Transcript) -> Result<()> {
        fill_transcript(transcript, &input, &self.commitment);
        let e = fac_challenge(&mut transcript.digest());

        if !input.aux.verify_response(
            &self.z1,
            &self.w1,
            &e,
            &self.commitment.a_commit,
            &self.commitment.p_commit,
        )? {
            error!("PiFac Pedersen response check for p failed");
            return Err(InternalError::ProtocolError(None));
        }
        if !input.aux.verify_response(
            &self.z2,
            &self.w2,
            &e,
            &self.commitment.b_commit,
            &self.commitment.q_commit,
        )? {
            error!("PiFac Pedersen response check for q failed");
            return Err(InternalError::ProtocolError(None));
        }

        // R = s^{N₀}·t^{σ}; check Q^{z₁}·t^{v} == T·Rᵉ (mod N̂).
        let r_value = input.aux.commit(input.modulus, &self.commitment.sigma)?;
        let lhs = (modpow_signed(&self.commitment.q_commit, &self.z1, input.aux.modulus())?
            * modpow_signed(input.aux.t(), &self.v, input.aux.modulus())?)
        .nmod(input.aux.modulus());
        let rhs = (&self.commitment.t_commit
            * modpow_signed(&r_value, &e, input.aux.modulus())?)
        .nmod(input.aux.modulus());
        if lhs != rhs {
            error!("PiFac aggregate equation failed");
            return Err(InternalError::ProtocolError(None));
        }

        // One extra bit over the sampling interval, to avoid spurious
        // failures at the boundary.
        if !sampling::in_symmetric_range(&self.z1, ELL + EPSILON + PRIME_BITS + 1)
            || !sampling::in_symmetric_range(&self.z2, ELL + EPSILON + PRIME_BITS + 1)
        {
            error!("PiFac factor responses are out of range");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{paillier::DecryptionKey, testing::test_rng};

    fn transcript() -> Transcript {
        Transcript::new("PiFacProof Test")
    }

    fn setup() -> (rand::rngs::StdRng, DecryptionKey, RingPedersen) {
        let mut rng = test_rng();
        let dk = DecryptionKey::generate(&mut rng).unwrap();
        let aux_dk = DecryptionKey::generate(&mut rng).unwrap();
        let (aux, _) = RingPedersen::gen(&mut rng, &aux_dk).unwrap();
        (rng, dk, aux)
    }

    #[test]
    fn proof_verifies_for_honest_modulus() {
        let (mut rng, dk, aux) = setup();
        let modulus = dk.modulus().clone();

        let input = CommonInput::new(&modulus, &aux);
        let proof = PiFacProof::prove(
            input.clone(),
            ProverSecret::new(dk.p(), dk.q()),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_ok());
    }

    #[test]
    fn proof_rejects_factors_of_a_different_modulus() {
        let (mut rng, dk, aux) = setup();
        let other_dk = DecryptionKey::generate(&mut rng).unwrap();
        let modulus = dk.modulus().clone();

        let input = CommonInput::new(&modulus, &aux);
        let proof = PiFacProof::prove(
            input.clone(),
            ProverSecret::new(other_dk.p(), other_dk.q()),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_err());
    }

    #[test]
    fn proof_rejects_tampered_responses() {
        let (mut rng, dk, aux) = setup();
        let modulus = dk.modulus().clone();

        let input = CommonInput::new(&modulus, &aux);
        let mut proof = PiFacProof::prove(
            input.clone(),
            ProverSecret::new(dk.p(), dk.q()),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        proof.z1 = &proof.z1 + BigNumber::one();
        assert!(proof.verify(input, &mut transcript()).is_err());
    }
}
