// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Schnorr proof of knowledge of a discrete logarithm (`Π[sch]`).
//!
//! The keygen protocol splits this proof across rounds: the commitment
//! `A = a·G` is produced (and committed to) in round 1, while the response
//! arrives only in round 5, after the prover's public share is fixed. The
//! precommitment type keeps the nonce `a` private until then.

use crate::{
    curve::CurvePoint,
    errors::{InternalError, Result},
    transcript::Transcript,
    zkp::Proof,
};
use k256::{elliptic_curve::Field, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::error;

/// The prover's state after the first move: the secret nonce and its public
/// commitment.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct SchPrecommit {
    a: Scalar,
    commitment: SchCommit,
}

impl Debug for SchPrecommit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchPrecommit")
            .field("a", &"[redacted]")
            .field("commitment", &self.commitment)
            .finish()
    }
}

/// The public commitment `A = a·G`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SchCommit(CurvePoint);

/// The response `z = a + e·x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SchResponse(Scalar);

impl SchPrecommit {
    /// Sample a fresh nonce and its commitment.
    pub(crate) fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let a = Scalar::random(rng);
        let commitment = SchCommit(CurvePoint::scale_generator(&a));
        Self { a, commitment }
    }

    pub(crate) fn commitment(&self) -> SchCommit {
        self.commitment
    }

    /// Complete the proof for public `X = x·G`.
    pub(crate) fn respond(
        &self,
        public: &CurvePoint,
        secret: &Scalar,
        transcript: &mut Transcript,
    ) -> Result<SchResponse> {
        if public.is_identity() || bool::from(secret.is_zero()) {
            error!("Schnorr statement is degenerate");
            return Err(InternalError::InternalInvariantFailed);
        }
        let e = challenge(&self.commitment, public, transcript);
        Ok(SchResponse(self.a + e * secret))
    }
}

impl SchCommit {
    pub(crate) fn point(&self) -> &CurvePoint {
        &self.0
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.0.is_identity()
    }
}

impl SchResponse {
    pub(crate) fn is_valid(&self) -> bool {
        !bool::from(self.0.is_zero())
    }

    /// Check `z·G == A + e·X`.
    pub(crate) fn verify(
        &self,
        public: &CurvePoint,
        commitment: &SchCommit,
        transcript: &mut Transcript,
    ) -> Result<()> {
        if !self.is_valid() || !commitment.is_valid() || public.is_identity() {
            error!("Schnorr proof has degenerate elements");
            return Err(InternalError::ProtocolError(None));
        }
        let e = challenge(commitment, public, transcript);
        let lhs = CurvePoint::scale_generator(&self.0);
        let rhs = commitment.0 + public.multiply_by_scalar(&e);
        if lhs != rhs {
            error!("Schnorr response verification failed");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(())
    }
}

fn challenge(commitment: &SchCommit, public: &CurvePoint, transcript: &mut Transcript) -> Scalar {
    transcript.append(&commitment.0);
    transcript.append(public);
    transcript.digest().scalar()
}

/// A self-contained Schnorr proof, for callers that do not need the split
/// flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiSchProof {
    commitment: SchCommit,
    response: SchResponse,
}

/// Statement: knowledge of `x` with `X = x·G`.
pub(crate) struct CommonInput<'a> {
    public: &'a CurvePoint,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(public: &'a CurvePoint) -> Self {
        Self { public }
    }
}

pub(crate) struct ProverSecret<'a> {
    x: &'a Scalar,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(x: &'a Scalar) -> Self {
        Self { x }
    }
}

impl Proof for PiSchProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let precommit = SchPrecommit::new(rng);
        let response = precommit.respond(input.public, secret.x, transcript)?;
        Ok(Self {
            commitment: precommit.commitment(),
            response,
        })
    }

    fn verify(self, input: Self::CommonInput<'_>, transcript: &mut Transcript) -> Result<()> {
        self.response
            .verify(input.public, &self.commitment, transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_rng;

    fn transcript() -> Transcript {
        Transcript::new("PiSchProof Test")
    }

    #[test]
    fn proof_verifies() {
        let rng = &mut test_rng();
        let x = Scalar::random(&mut *rng);
        let public = CurvePoint::scale_generator(&x);

        let proof = PiSchProof::prove(
            CommonInput::new(&public),
            ProverSecret::new(&x),
            &mut transcript(),
            rng,
        )
        .unwrap();
        assert!(proof
            .verify(CommonInput::new(&public), &mut transcript())
            .is_ok());
    }

    #[test]
    fn proof_fails_for_wrong_statement() {
        let rng = &mut test_rng();
        let x = Scalar::random(&mut *rng);
        let public = CurvePoint::scale_generator(&x);
        let other = CurvePoint::scale_generator(&Scalar::random(&mut *rng));

        let proof = PiSchProof::prove(
            CommonInput::new(&public),
            ProverSecret::new(&x),
            &mut transcript(),
            rng,
        )
        .unwrap();
        assert!(proof
            .verify(CommonInput::new(&other), &mut transcript())
            .is_err());
    }

    #[test]
    fn proof_fails_for_modified_transcript() {
        let rng = &mut test_rng();
        let x = Scalar::random(&mut *rng);
        let public = CurvePoint::scale_generator(&x);

        let proof = PiSchProof::prove(
            CommonInput::new(&public),
            ProverSecret::new(&x),
            &mut transcript(),
            rng,
        )
        .unwrap();

        let mut other_transcript = Transcript::new("A Different Context");
        assert!(proof
            .verify(CommonInput::new(&public), &mut other_transcript)
            .is_err());
    }

    #[test]
    fn split_flow_matches_combined_flow() {
        let rng = &mut test_rng();
        let x = Scalar::random(&mut *rng);
        let public = CurvePoint::scale_generator(&x);

        // Round 1: precommit. Round 5: respond.
        let precommit = SchPrecommit::new(rng);
        let commitment = precommit.commitment();
        let response = precommit.respond(&public, &x, &mut transcript()).unwrap();
        assert!(response
            .verify(&public, &commitment, &mut transcript())
            .is_ok());
    }
}
