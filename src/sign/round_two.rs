// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{scalar_to_bn, CurvePoint},
    errors::{CallerError, InternalError, Result},
    paillier::{Ciphertext, Nonce},
    party::PartyId,
    protocol::{Content, Helper, RoundMessage, Session},
    sign::{
        mta,
        round_one::{Broadcast2, Round1},
        round_three::Round3,
    },
    zkp::{
        piaffg::PiAffgProof,
        pienc::{self, PiEncProof},
        pilog::{self, PiLogProof},
        Proof,
    },
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug};
use tracing::error;

/// `Γᵢ = γᵢ·G`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Broadcast3 {
    pub(crate) big_gamma: CurvePoint,
}

/// The range proof for `Kᵢ`, sent to each peer separately.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Message2 {
    pub(crate) proof: PiEncProof,
}

/// One peer's MtA bundle: both conversions plus the `Γᵢ` consistency proof.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Message3 {
    /// `Dᵢⱼ` for the δ conversion.
    pub(crate) delta_d: Ciphertext,
    /// `Fᵢⱼ` for the δ conversion.
    pub(crate) delta_f: Ciphertext,
    pub(crate) delta_proof: PiAffgProof,
    /// `D̂ᵢⱼ` for the χ conversion.
    pub(crate) chi_d: Ciphertext,
    /// `F̂ᵢⱼ` for the χ conversion.
    pub(crate) chi_f: Ciphertext,
    pub(crate) chi_proof: PiAffgProof,
    /// Links `Gᵢ` to `Γᵢ`.
    pub(crate) log_proof: PiLogProof,
}

/// Round 2 collects `(Kⱼ, Gⱼ)` and the range proofs, then runs MtA with
/// every peer.
#[derive(Serialize, Deserialize)]
pub(crate) struct Round2 {
    pub(crate) round1: Round1,

    pub(crate) k_ciphertexts: BTreeMap<PartyId, Ciphertext>,
    pub(crate) g_ciphertexts: BTreeMap<PartyId, Ciphertext>,
    pub(crate) big_gammas: BTreeMap<PartyId, CurvePoint>,

    /// `γᵢ` as an integer.
    pub(crate) gamma: BigNumber,
    /// `kᵢ`.
    pub(crate) k: Scalar,
    /// `ρᵢ`, the nonce of `Kᵢ`.
    pub(crate) k_nonce: Nonce,
    /// `νᵢ`, the nonce of `Gᵢ`.
    pub(crate) g_nonce: Nonce,
}

impl Debug for Round2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("sign::Round2")
            .field("self_id", self.helper().self_id())
            .field("gamma", &"[redacted]")
            .field("k", &"[redacted]")
            .finish()
    }
}

impl Round2 {
    /// Store `(Kⱼ, Gⱼ)` after validating the ciphertexts.
    pub(crate) fn store_broadcast_message(
        &mut self,
        from: &PartyId,
        body: Broadcast2,
    ) -> Result<()> {
        if !self.round1.paillier[from].validate_ciphertexts(&[&body.k, &body.g]) {
            error!("Received invalid nonce ciphertexts");
            return Err(InternalError::ProtocolError(Some(from.clone())));
        }
        self.k_ciphertexts.insert(from.clone(), body.k);
        self.g_ciphertexts.insert(from.clone(), body.g);
        Ok(())
    }

    /// Verify the peer's range proof for `Kⱼ`.
    pub(crate) fn verify_message(&self, msg: &RoundMessage) -> Result<()> {
        let from = &msg.from;
        let body = match &msg.content {
            Content::SignEncProof(body) => body,
            _ => Err(CallerError::InvalidContent)?,
        };
        let self_id = self.helper().self_id();
        body.proof
            .clone()
            .verify(
                pienc::CommonInput::new(
                    &self.k_ciphertexts[from],
                    &self.round1.paillier[from],
                    &self.round1.pedersen[self_id],
                ),
                &mut self.helper().transcript_for_party(from),
            )
            .map_err(|_| {
                error!("Failed to validate range proof for K");
                InternalError::ProtocolError(Some(from.clone()))
            })
    }

    pub(crate) fn store_message(&mut self, _from: &PartyId, _body: Message2) -> Result<()> {
        Ok(())
    }

    /// Reveal `Γᵢ` and run both MtA conversions with every peer.
    pub(crate) fn finalize<R: rand::RngCore + rand::CryptoRng>(
        self,
        out: &mut Vec<RoundMessage>,
        rng: &mut R,
    ) -> Result<Session> {
        let self_id = self.helper().self_id().clone();
        let self_key = &self.round1.paillier[&self_id];
        let big_gamma = self.big_gammas[&self_id];
        let secret_bn = scalar_to_bn(&self.round1.secret_ecdsa);

        self.helper()
            .broadcast(out, Content::SignBigGamma(Broadcast3 { big_gamma }));

        let mut delta_betas = BTreeMap::new();
        let mut chi_betas = BTreeMap::new();
        for j in self.helper().other_party_ids() {
            // δ half: additive shares of γᵢ·kⱼ.
            let delta = mta::prove_affg(
                &self.gamma,
                &big_gamma,
                &self.k_ciphertexts[&j],
                self_key,
                &self.round1.paillier[&j],
                &self.round1.pedersen[&j],
                &mut self.helper().transcript_for_party(&self_id),
                rng,
            )?;
            // χ half: additive shares of xᵢ·kⱼ.
            let chi = mta::prove_affg(
                &secret_bn,
                &self.round1.ecdsa[&self_id],
                &self.k_ciphertexts[&j],
                self_key,
                &self.round1.paillier[&j],
                &self.round1.pedersen[&j],
                &mut self.helper().transcript_for_party(&self_id),
                rng,
            )?;

            let log_proof = PiLogProof::prove(
                pilog::CommonInput::new(
                    &self.g_ciphertexts[&self_id],
                    &big_gamma,
                    &CurvePoint::GENERATOR,
                    self_key,
                    &self.round1.pedersen[&j],
                ),
                pilog::ProverSecret::new(&self.gamma, &self.g_nonce),
                &mut self.helper().transcript_for_party(&self_id),
                rng,
            )?;

            self.helper().send(
                out,
                Content::SignMta(Box::new(Message3 {
                    delta_d: delta.d,
                    delta_f: delta.f,
                    delta_proof: delta.proof,
                    chi_d: chi.d,
                    chi_f: chi.f,
                    chi_proof: chi.proof,
                    log_proof,
                })),
                &j,
            );
            delta_betas.insert(j.clone(), delta.beta);
            chi_betas.insert(j.clone(), chi.beta);
        }

        Ok(Session::SignRound3(Box::new(Round3 {
            round2: self,
            delta_betas,
            chi_betas,
            delta_alphas: BTreeMap::new(),
            chi_alphas: BTreeMap::new(),
        })))
    }

    pub(crate) fn helper(&self) -> &Helper {
        self.round1.helper()
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        self.round1.helper_mut()
    }
}
