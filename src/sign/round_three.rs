// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{bn_to_scalar, scalar_to_bn, CurvePoint},
    errors::{CallerError, InternalError, Result},
    party::PartyId,
    protocol::{Content, Helper, RoundMessage, Session},
    sign::{
        round_four::{Message4, Round4},
        round_two::{Broadcast3, Message3, Round2},
    },
    zkp::{
        piaffg,
        pilog::{self, PiLogProof},
        Proof,
    },
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug};
use tracing::error;

/// `(δᵢ, Δᵢ)`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Broadcast4 {
    pub(crate) delta: Scalar,
    pub(crate) big_delta: CurvePoint,
}

/// Round 3 absorbs the MtA outputs and reveals the `δ` and `Δ` shares.
#[derive(Serialize, Deserialize)]
pub(crate) struct Round3 {
    pub(crate) round2: Round2,

    /// `βᵢⱼ` for the δ conversion, per peer.
    pub(crate) delta_betas: BTreeMap<PartyId, BigNumber>,
    /// `β̂ᵢⱼ` for the χ conversion, per peer.
    pub(crate) chi_betas: BTreeMap<PartyId, BigNumber>,
    /// `αᵢⱼ`, decrypted from each peer's `Dⱼᵢ`.
    pub(crate) delta_alphas: BTreeMap<PartyId, BigNumber>,
    /// `α̂ᵢⱼ`, decrypted from each peer's `D̂ⱼᵢ`.
    pub(crate) chi_alphas: BTreeMap<PartyId, BigNumber>,
}

impl Debug for Round3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("sign::Round3")
            .field("self_id", self.helper().self_id())
            .field("mta_shares", &"[redacted]")
            .finish()
    }
}

impl Round3 {
    /// Store `Γⱼ`.
    pub(crate) fn store_broadcast_message(
        &mut self,
        from: &PartyId,
        body: Broadcast3,
    ) -> Result<()> {
        if body.big_gamma.is_identity() {
            error!("Received an identity Γ share");
            return Err(InternalError::ProtocolError(Some(from.clone())));
        }
        self.round2.big_gammas.insert(from.clone(), body.big_gamma);
        Ok(())
    }

    /// Verify both affine-group proofs and the `Γⱼ` consistency proof.
    pub(crate) fn verify_message(&self, msg: &RoundMessage) -> Result<()> {
        let from = &msg.from;
        let body = match &msg.content {
            Content::SignMta(body) => body,
            _ => Err(CallerError::InvalidContent)?,
        };
        let self_id = self.helper().self_id();
        let verifier_key = &self.round2.round1.paillier[self_id];
        let prover_key = &self.round2.round1.paillier[from];
        let aux = &self.round2.round1.pedersen[self_id];

        body.delta_proof
            .clone()
            .verify(
                piaffg::CommonInput::new(
                    &self.round2.k_ciphertexts[self_id],
                    &body.delta_d,
                    &body.delta_f,
                    &self.round2.big_gammas[from],
                    prover_key,
                    verifier_key,
                    aux,
                ),
                &mut self.helper().transcript_for_party(from),
            )
            .map_err(|_| {
                error!("Failed to validate affine-group proof for the δ conversion");
                InternalError::ProtocolError(Some(from.clone()))
            })?;

        body.chi_proof
            .clone()
            .verify(
                piaffg::CommonInput::new(
                    &self.round2.k_ciphertexts[self_id],
                    &body.chi_d,
                    &body.chi_f,
                    &self.round2.round1.ecdsa[from],
                    prover_key,
                    verifier_key,
                    aux,
                ),
                &mut self.helper().transcript_for_party(from),
            )
            .map_err(|_| {
                error!("Failed to validate affine-group proof for the χ conversion");
                InternalError::ProtocolError(Some(from.clone()))
            })?;

        body.log_proof
            .clone()
            .verify(
                pilog::CommonInput::new(
                    &self.round2.g_ciphertexts[from],
                    &self.round2.big_gammas[from],
                    &CurvePoint::GENERATOR,
                    prover_key,
                    aux,
                ),
                &mut self.helper().transcript_for_party(from),
            )
            .map_err(|_| {
                error!("Failed to validate log proof for Γ");
                InternalError::ProtocolError(Some(from.clone()))
            })
    }

    /// Decrypt the MtA shares `αᵢⱼ` and `α̂ᵢⱼ`.
    pub(crate) fn store_message(&mut self, from: &PartyId, body: Message3) -> Result<()> {
        let dk = &self.round2.round1.paillier_secret;
        let delta_alpha = dk.decrypt(&body.delta_d).map_err(|_| {
            error!("Failed to decrypt the δ MtA share");
            InternalError::ProtocolError(Some(from.clone()))
        })?;
        let chi_alpha = dk.decrypt(&body.chi_d).map_err(|_| {
            error!("Failed to decrypt the χ MtA share");
            InternalError::ProtocolError(Some(from.clone()))
        })?;
        self.delta_alphas.insert(from.clone(), delta_alpha);
        self.chi_alphas.insert(from.clone(), chi_alpha);
        Ok(())
    }

    /// Combine `Γ`, compute `Δᵢ`, `δᵢ`, `χᵢ`, and prove `Δᵢ` consistent
    /// with `Kᵢ`.
    pub(crate) fn finalize<R: rand::RngCore + rand::CryptoRng>(
        self,
        out: &mut Vec<RoundMessage>,
        rng: &mut R,
    ) -> Result<Session> {
        let self_id = self.helper().self_id().clone();

        // Γ = Σⱼ Γⱼ
        let big_gamma = self
            .round2
            .big_gammas
            .values()
            .fold(CurvePoint::IDENTITY, |sum, share| sum + *share);

        // Δᵢ = kᵢ·Γ
        let big_delta = big_gamma.multiply_by_scalar(&self.round2.k);

        let k_bn = scalar_to_bn(&self.round2.k);
        let secret_bn = scalar_to_bn(&self.round2.round1.secret_ecdsa);

        // δᵢ = γᵢ·kᵢ + Σⱼ (αᵢⱼ − βᵢⱼ)
        let mut delta_int = &self.round2.gamma * &k_bn;
        // χᵢ = xᵢ·kᵢ + Σⱼ (α̂ᵢⱼ − β̂ᵢⱼ)
        let mut chi_int = &secret_bn * &k_bn;
        for j in self.helper().other_party_ids() {
            delta_int = delta_int + &self.delta_alphas[&j] - &self.delta_betas[&j];
            chi_int = chi_int + &self.chi_alphas[&j] - &self.chi_betas[&j];
        }
        let delta = bn_to_scalar(&delta_int)?;
        let chi = bn_to_scalar(&chi_int)?;

        self.helper().broadcast(
            out,
            Content::SignDeltaShare(Broadcast4 { delta, big_delta }),
        );

        for j in self.helper().other_party_ids() {
            let log_proof = PiLogProof::prove(
                pilog::CommonInput::new(
                    &self.round2.k_ciphertexts[&self_id],
                    &big_delta,
                    &big_gamma,
                    &self.round2.round1.paillier[&self_id],
                    &self.round2.round1.pedersen[&j],
                ),
                pilog::ProverSecret::new(&k_bn, &self.round2.k_nonce),
                &mut self.helper().transcript_for_party(&self_id),
                rng,
            )?;
            self.helper().send(
                out,
                Content::SignDeltaProof(Box::new(Message4 { log_proof })),
                &j,
            );
        }

        let mut round4 = Round4 {
            round3: self,
            deltas: BTreeMap::new(),
            big_deltas: BTreeMap::new(),
            big_gamma,
            chi,
        };
        round4.deltas.insert(self_id.clone(), delta);
        round4.big_deltas.insert(self_id, big_delta);
        Ok(Session::SignRound4(Box::new(round4)))
    }

    pub(crate) fn helper(&self) -> &Helper {
        self.round2.helper()
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        self.round2.helper_mut()
    }
}
