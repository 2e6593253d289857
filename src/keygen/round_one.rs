// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::CurvePoint,
    errors::Result,
    keygen::round_two::Round2,
    paillier::DecryptionKey,
    party::PartyId,
    polynomial::{ExponentPolynomial, Polynomial},
    protocol::{Content, Helper, RoundMessage, Session},
    ring_pedersen::RingPedersen,
    transcript::{BytesWithDomain, Commitment, Transcript},
    zkp::pisch::{SchCommit, SchPrecommit},
};
use k256::{elliptic_curve::Field, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The commitment `Vᵢ` to all of round 2's opening data.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Broadcast2 {
    pub(crate) commitment: Commitment,
}

/// Round 1 has no inbound messages: it samples every secret and commits.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct Round1 {
    pub(crate) helper: Helper,
    /// `fᵢ(X)`, with `fᵢ(0)` this party's additive secret.
    pub(crate) vss_secret: Polynomial,
}

/// The canonical transcript encoding of a round-2 opening. Both the
/// committer (round 1) and the verifier (round 3) must absorb the values in
/// this order.
pub(crate) fn append_opening(
    transcript: &mut Transcript,
    rid: &[u8; 32],
    chain_key: &[u8; 32],
    vss_polynomial: &ExponentPolynomial,
    schnorr_commitment: &SchCommit,
    elgamal_public: &CurvePoint,
    pedersen: &RingPedersen,
) {
    transcript.append(&BytesWithDomain {
        domain: "RID Contribution",
        bytes: rid,
    });
    transcript.append(&BytesWithDomain {
        domain: "Chain Key Contribution",
        bytes: chain_key,
    });
    transcript.append(vss_polynomial);
    transcript.append(schnorr_commitment.point());
    transcript.append(elgamal_public);
    transcript.append(pedersen);
}

impl Round1 {
    pub(crate) fn new<R: RngCore + CryptoRng>(helper: Helper, rng: &mut R) -> Self {
        let secret = Scalar::random(&mut *rng);
        let vss_secret = Polynomial::new(helper.threshold(), secret, rng);
        Self { helper, vss_secret }
    }

    /// Sample the party's long-term material, commit to the round-2 opening,
    /// and broadcast the commitment.
    pub(crate) fn finalize<R: RngCore + CryptoRng>(
        self,
        out: &mut Vec<RoundMessage>,
        rng: &mut R,
    ) -> Result<Session> {
        let paillier_secret = DecryptionKey::generate(rng)?;
        let (pedersen, pedersen_secret) = RingPedersen::gen(rng, &paillier_secret)?;

        let elgamal_secret = Scalar::random(&mut *rng);
        let elgamal_public = CurvePoint::scale_generator(&elgamal_secret);

        // Save our own share already so we are consistent with what we
        // receive from others.
        let self_id = self.helper.self_id().clone();
        let self_share = self.vss_secret.evaluate(&self_id.as_scalar())?;
        let vss_polynomial = self.vss_secret.to_exponent();

        let schnorr_precommit = SchPrecommit::new(rng);

        let mut rid = [0u8; 32];
        let mut chain_key = [0u8; 32];
        rng.fill_bytes(&mut rid);
        rng.fill_bytes(&mut chain_key);

        let mut commit_transcript = self.helper.transcript_for_party(&self_id);
        append_opening(
            &mut commit_transcript,
            &rid,
            &chain_key,
            &vss_polynomial,
            &schnorr_precommit.commitment(),
            &elgamal_public,
            &pedersen,
        );
        let (commitment, decommitment) = commit_transcript.commit(rng);

        self.helper
            .broadcast(out, Content::KeygenCommitment(Broadcast2 { commitment }));

        let mut round2 = Round2 {
            round1: self,
            commitments: BTreeMap::new(),
            rids: BTreeMap::new(),
            chain_keys: BTreeMap::new(),
            shares_received: BTreeMap::new(),
            vss_polynomials: BTreeMap::new(),
            elgamal_publics: BTreeMap::new(),
            pedersens: BTreeMap::new(),
            elgamal_secret,
            paillier_secret,
            pedersen_secret,
            schnorr_precommit,
            decommitment,
        };
        round2.commitments.insert(self_id.clone(), commitment);
        round2.rids.insert(self_id.clone(), rid);
        round2.chain_keys.insert(self_id.clone(), chain_key);
        round2.shares_received.insert(self_id.clone(), self_share);
        round2
            .vss_polynomials
            .insert(self_id.clone(), vss_polynomial);
        round2.elgamal_publics.insert(self_id.clone(), elgamal_public);
        round2.pedersens.insert(self_id, pedersen);

        Ok(Session::KeygenRound2(Box::new(round2)))
    }

    pub(crate) fn helper(&self) -> &Helper {
        &self.helper
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        &mut self.helper
    }
}

/// XOR-combine 32-byte contributions in sorted party order.
pub(crate) fn xor_contributions(contributions: &BTreeMap<PartyId, [u8; 32]>) -> [u8; 32] {
    let mut combined = [0u8; 32];
    for contribution in contributions.values() {
        for (acc, byte) in combined.iter_mut().zip(contribution) {
            *acc ^= byte;
        }
    }
    combined
}

/// Domain wrapper for the agreed RID once it enters the session transcript.
pub(crate) fn rid_for_transcript(rid: &[u8; 32]) -> BytesWithDomain<'_> {
    BytesWithDomain {
        domain: "RID",
        bytes: rid,
    }
}
