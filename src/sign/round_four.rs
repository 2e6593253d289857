// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{scalar_from_hash, CurvePoint},
    errors::{CallerError, InternalError, Result},
    party::PartyId,
    protocol::{Content, Helper, RoundMessage, Session},
    sign::{
        presignature::PreSignature,
        round_five::Round5,
        round_three::{Broadcast4, Round3},
        sum_scalars,
    },
    zkp::{
        pilog::{self, PiLogProof},
        Proof,
    },
};
use k256::{elliptic_curve::Field, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug};
use tracing::error;

/// `σᵢ = r·χᵢ + kᵢ·m`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Broadcast5 {
    pub(crate) sigma: Scalar,
}

/// The `Δⱼ` consistency proof.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Message4 {
    pub(crate) log_proof: PiLogProof,
}

/// Round 4 checks the `δ`/`Δ` consistency, derives the pre-signature, and
/// produces the signature share.
#[derive(Serialize, Deserialize)]
pub(crate) struct Round4 {
    pub(crate) round3: Round3,

    /// `δⱼ` per signer.
    pub(crate) deltas: BTreeMap<PartyId, Scalar>,
    /// `Δⱼ` per signer.
    pub(crate) big_deltas: BTreeMap<PartyId, CurvePoint>,
    /// `Γ = Σⱼ Γⱼ`.
    pub(crate) big_gamma: CurvePoint,
    /// `χᵢ`.
    pub(crate) chi: Scalar,
}

impl Debug for Round4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("sign::Round4")
            .field("self_id", self.helper().self_id())
            .field("chi", &"[redacted]")
            .finish()
    }
}

impl Round4 {
    /// Store `(δⱼ, Δⱼ)`.
    pub(crate) fn store_broadcast_message(
        &mut self,
        from: &PartyId,
        body: Broadcast4,
    ) -> Result<()> {
        if bool::from(body.delta.is_zero()) || body.big_delta.is_identity() {
            error!("Received degenerate δ/Δ shares");
            return Err(InternalError::ProtocolError(Some(from.clone())));
        }
        self.deltas.insert(from.clone(), body.delta);
        self.big_deltas.insert(from.clone(), body.big_delta);
        Ok(())
    }

    /// Verify `Π[log*](Kⱼ, Δⱼ; base Γ)`.
    pub(crate) fn verify_message(&self, msg: &RoundMessage) -> Result<()> {
        let from = &msg.from;
        let body = match &msg.content {
            Content::SignDeltaProof(body) => body,
            _ => Err(CallerError::InvalidContent)?,
        };
        let self_id = self.helper().self_id();
        body.log_proof
            .clone()
            .verify(
                pilog::CommonInput::new(
                    &self.round3.round2.k_ciphertexts[from],
                    &self.big_deltas[from],
                    &self.big_gamma,
                    &self.round3.round2.round1.paillier[from],
                    &self.round3.round2.round1.pedersen[self_id],
                ),
                &mut self.helper().transcript_for_party(from),
            )
            .map_err(|_| {
                error!("Failed to validate log proof for Δ");
                InternalError::ProtocolError(Some(from.clone()))
            })
    }

    pub(crate) fn store_message(&mut self, _from: &PartyId, _body: Message4) -> Result<()> {
        Ok(())
    }

    /// Check `δ·G == Δ`, build the pre-signature, and emit `σᵢ`.
    pub(crate) fn finalize<R: RngCore + CryptoRng>(
        self,
        out: &mut Vec<RoundMessage>,
        rng: &mut R,
    ) -> Result<Session> {
        // δ = Σⱼ δⱼ, Δ = Σⱼ Δⱼ
        let delta = sum_scalars(self.deltas.values());
        let big_delta = self
            .big_deltas
            .values()
            .fold(CurvePoint::IDENTITY, |sum, share| sum + *share);

        // δ·G must equal Δ; otherwise some party lied about its shares.
        if CurvePoint::scale_generator(&delta) != big_delta {
            error!("Computed Δ is inconsistent with δ·G");
            return Ok(Session::abort(
                self.helper().clone(),
                "signature inconsistency: delta shares do not match".into(),
                vec![],
            ));
        }

        let presignature = PreSignature::new(
            &delta,
            &self.big_gamma,
            &self.big_deltas,
            self.round3.round2.k,
            self.chi,
            rng,
        )?;
        presignature.validate()?;

        // σᵢ = r·χᵢ + kᵢ·m
        let message_scalar = scalar_from_hash(&self.round3.round2.round1.digest);
        let sigma = presignature.signature_share(&message_scalar)?;

        self.helper()
            .broadcast(out, Content::SignSigmaShare(Broadcast5 { sigma }));

        let self_id = self.helper().self_id().clone();
        let mut round5 = Round5 {
            round4: self,
            presignature,
            sigmas: BTreeMap::new(),
        };
        round5.sigmas.insert(self_id, sigma);
        Ok(Session::SignRound5(Box::new(round5)))
    }

    pub(crate) fn helper(&self) -> &Helper {
        self.round3.helper()
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        self.round3.helper_mut()
    }
}
