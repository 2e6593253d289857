// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::scalar_to_bn,
    errors::{InternalError, Result},
    keygen::{
        round_one::{append_opening, rid_for_transcript, xor_contributions},
        round_two::{Broadcast3, Round2},
        round_four::Round4,
    },
    paillier::{validate_modulus, Ciphertext, EncryptionKey},
    party::PartyId,
    protocol::{Content, Helper, RoundMessage, Session},
    zkp::{
        pifac::{self, PiFacProof},
        pimod::{self, PiModProof},
        piprm::{self, PiPrmProof},
        pisch::SchCommit,
        Proof,
    },
};
use k256::elliptic_curve::Field;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

/// The broadcast proofs of round 3: `Nᵢ` is Blum-like, `(sᵢ, tᵢ)` are
/// well-formed.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Broadcast4 {
    pub(crate) mod_proof: PiModProof,
    pub(crate) prm_proof: PiPrmProof,
}

/// The peer-to-peer payload of round 3: a no-small-factor proof relative to
/// the recipient's Pedersen parameters, and the recipient's encrypted share
/// evaluation `Cᵢⱼ = Enc_{Nⱼ}(fᵢ(j))`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Message4 {
    pub(crate) fac_proof: PiFacProof,
    pub(crate) encrypted_share: Ciphertext,
}

/// Round 3 verifies the openings of every commitment, agrees on the shared
/// RID and chain key, and produces the proofs about its own modulus.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct Round3 {
    pub(crate) round2: Round2,
    /// `Aⱼ` per party, answered in round 5.
    pub(crate) schnorr_commitments: BTreeMap<PartyId, SchCommit>,
}

impl Round3 {
    /// Verify an opening against its round-2 commitment, validate the
    /// announced parameters, and store everything.
    pub(crate) fn store_broadcast_message(
        &mut self,
        from: &PartyId,
        body: Broadcast3,
    ) -> Result<()> {
        let expect_constant =
            bool::from(self.round2.round1.vss_secret.constant().is_zero());
        body.validate_shape(self.helper().threshold(), expect_constant)
            .map_err(|_| InternalError::ProtocolError(Some(from.clone())))?;

        // Nⱼ doubles as the Paillier modulus and the Pedersen modulus.
        validate_modulus(body.pedersen.modulus())
            .map_err(|_| InternalError::ProtocolError(Some(from.clone())))?;
        body.pedersen
            .validate()
            .map_err(|_| InternalError::ProtocolError(Some(from.clone())))?;

        let commitment = self.round2.commitments.get(from).ok_or_else(|| {
            error!("Received an opening without a matching commitment");
            InternalError::ProtocolError(Some(from.clone()))
        })?;
        let mut transcript = self.helper().transcript_for_party(from);
        append_opening(
            &mut transcript,
            &body.rid,
            &body.chain_key,
            &body.vss_polynomial,
            &body.schnorr_commitment,
            &body.elgamal_public,
            &body.pedersen,
        );
        if !transcript.decommit(commitment, &body.decommitment) {
            error!("Failed to open round-1 commitment");
            return Err(InternalError::ProtocolError(Some(from.clone())));
        }

        self.round2.rids.insert(from.clone(), body.rid);
        self.round2.chain_keys.insert(from.clone(), body.chain_key);
        self.round2
            .vss_polynomials
            .insert(from.clone(), body.vss_polynomial);
        self.round2
            .elgamal_publics
            .insert(from.clone(), body.elgamal_public);
        self.round2.pedersens.insert(from.clone(), body.pedersen);
        self.schnorr_commitments
            .insert(from.clone(), body.schnorr_commitment);
        Ok(())
    }

    /// Combine the RID and chain-key contributions, prove the modulus
    /// claims, and distribute encrypted share evaluations.
    pub(crate) fn finalize<R: RngCore + CryptoRng>(
        mut self,
        out: &mut Vec<RoundMessage>,
        rng: &mut R,
    ) -> Result<Session> {
        let rid = xor_contributions(&self.round2.rids);
        let chain_key = xor_contributions(&self.round2.chain_keys);

        // Proof transcripts are bound to the agreed RID; the session
        // transcript itself is extended only after the proofs are built, so
        // forks here must add the RID explicitly.
        let self_id = self.helper().self_id().clone();
        let mut base = self.helper().transcript();
        base.append(&rid_for_transcript(&rid));
        let mut prover_base = base.fork();
        prover_base.append(&self_id);

        let paillier_secret = &self.round2.paillier_secret;
        let self_pedersen = &self.round2.pedersens[&self_id];
        let modulus = paillier_secret.modulus().clone();
        let totient = paillier_secret.totient();

        let mod_proof = PiModProof::prove(
            pimod::CommonInput::new(&modulus),
            pimod::ProverSecret::new(paillier_secret.p(), paillier_secret.q()),
            &mut prover_base.fork(),
            rng,
        )?;
        let prm_proof = PiPrmProof::prove(
            piprm::CommonInput::new(self_pedersen),
            piprm::ProverSecret::new(&self.round2.pedersen_secret, &totient),
            &mut prover_base.fork(),
            rng,
        )?;
        self.helper().broadcast(
            out,
            Content::KeygenProofs(Box::new(Broadcast4 {
                mod_proof,
                prm_proof,
            })),
        );

        for j in self.helper().other_party_ids() {
            let fac_proof = PiFacProof::prove(
                pifac::CommonInput::new(&modulus, &self.round2.pedersens[&j]),
                pifac::ProverSecret::new(paillier_secret.p(), paillier_secret.q()),
                &mut prover_base.fork(),
                rng,
            )?;
            // fᵢ(j), encrypted to party j.
            let share = self.round2.round1.vss_secret.evaluate(&j.as_scalar())?;
            let receiver_key = EncryptionKey::new(self.round2.pedersens[&j].modulus().clone());
            let (encrypted_share, _nonce) =
                receiver_key.encrypt(rng, &scalar_to_bn(&share))?;

            self.helper().send(
                out,
                Content::KeygenShare(Box::new(Message4 {
                    fac_proof,
                    encrypted_share,
                })),
                &j,
            );
        }

        // From round 4 on, every transcript fork carries the RID.
        self.helper_mut().update_transcript(&rid_for_transcript(&rid));

        Ok(Session::KeygenRound4(Box::new(Round4 {
            round3: self,
            rid,
            chain_key,
        })))
    }

    pub(crate) fn helper(&self) -> &Helper {
        self.round2.helper()
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        self.round2.helper_mut()
    }
}
