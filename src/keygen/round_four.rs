// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    config::{Config, PublicData},
    curve::{bn_to_scalar, curve_order, CurvePoint},
    errors::{InternalError, Result},
    keygen::{
        round_five::Round5,
        round_three::{Broadcast4, Message4, Round3},
    },
    paillier::EncryptionKey,
    party::PartyId,
    polynomial::ExponentPolynomial,
    protocol::{Content, Helper, RoundMessage, Session},
    zkp::{
        pifac, pimod, piprm,
        pisch::SchResponse,
        Proof,
    },
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

/// The Schnorr response for the party's final share, answering the round-1
/// commitment.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Broadcast5 {
    pub(crate) schnorr_response: SchResponse,
}

/// Round 4 verifies every modulus proof, decrypts the incoming share
/// evaluations, and derives the final share material.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct Round4 {
    pub(crate) round3: Round3,
    /// `rid = ⊕ⱼ ridⱼ`.
    pub(crate) rid: [u8; 32],
    /// `c = ⊕ⱼ cⱼ`.
    pub(crate) chain_key: [u8; 32],
}

impl Round4 {
    /// Verify a peer's `Π[mod]` and `Π[prm]` proofs.
    pub(crate) fn store_broadcast_message(
        &mut self,
        from: &PartyId,
        body: Broadcast4,
    ) -> Result<()> {
        let modulus = self.round3.round2.pedersens[from].modulus().clone();
        let mut transcript = self.helper().transcript_for_party(from);
        body.mod_proof
            .verify(pimod::CommonInput::new(&modulus), &mut transcript.fork())
            .map_err(|_| {
                error!("Blum modulus proof failed");
                InternalError::ProtocolError(Some(from.clone()))
            })?;
        body.prm_proof
            .verify(
                piprm::CommonInput::new(&self.round3.round2.pedersens[from]),
                &mut transcript.fork(),
            )
            .map_err(|_| {
                error!("Pedersen parameter proof failed");
                InternalError::ProtocolError(Some(from.clone()))
            })?;
        Ok(())
    }

    /// Verify a peer's `Π[fac]` proof against our own Pedersen parameters.
    pub(crate) fn verify_message(&self, msg: &RoundMessage) -> Result<()> {
        let from = &msg.from;
        let body = match &msg.content {
            Content::KeygenShare(body) => body,
            _ => Err(crate::errors::CallerError::InvalidContent)?,
        };
        let self_id = self.helper().self_id().clone();
        let prover_modulus = self.round3.round2.pedersens[from].modulus().clone();
        let mut transcript = self.helper().transcript_for_party(from);
        body.fac_proof
            .clone()
            .verify(
                pifac::CommonInput::new(&prover_modulus, &self.round3.round2.pedersens[&self_id]),
                &mut transcript,
            )
            .map_err(|_| {
                error!("No-small-factor proof failed");
                InternalError::ProtocolError(Some(from.clone()))
            })
    }

    /// Decrypt `fⱼ(i)` and check it against `Fⱼ(i)` in the exponent.
    pub(crate) fn store_message(&mut self, from: &PartyId, body: Message4) -> Result<()> {
        let share_bn = self
            .round3
            .round2
            .paillier_secret
            .decrypt(&body.encrypted_share)
            .map_err(|_| {
                error!("Failed to decrypt share evaluation");
                InternalError::ProtocolError(Some(from.clone()))
            })?;
        if share_bn < BigNumber::zero() || share_bn >= curve_order() {
            error!("Decrypted share evaluation is out of range");
            return Err(InternalError::ProtocolError(Some(from.clone())));
        }
        let share = bn_to_scalar(&share_bn)?;

        // The plaintext must match the public polynomial: fⱼ(i)·G == Fⱼ(i).
        let self_point = self.helper().self_id().as_scalar();
        let expected = self.round3.round2.vss_polynomials[from].evaluate(&self_point);
        if CurvePoint::scale_generator(&share) != expected {
            error!("Share evaluation does not match the VSS polynomial");
            return Err(InternalError::ProtocolError(Some(from.clone())));
        }

        self.round3.round2.shares_received.insert(from.clone(), share);
        Ok(())
    }

    /// Derive the final share, build the config, and answer the Schnorr
    /// commitment.
    pub(crate) fn finalize(self, out: &mut Vec<RoundMessage>) -> Result<Session> {
        let self_id = self.helper().self_id().clone();

        // xᵢ = Σⱼ fⱼ(i)
        let final_share = self
            .round3
            .round2
            .shares_received
            .values()
            .fold(Scalar::ZERO, |sum, share| sum + share);

        // F(X) = Σₖ Fₖ(X); the public share of party j is F(j).
        let polynomials: Vec<&ExponentPolynomial> =
            self.round3.round2.vss_polynomials.values().collect();
        let summed = ExponentPolynomial::sum(&polynomials)?;

        let mut public = BTreeMap::new();
        for j in self.helper().party_ids() {
            let public_share = summed.evaluate(&j.as_scalar());
            if public_share.is_identity() {
                error!("A party's public share summed to the identity");
                return Err(InternalError::ProtocolError(None));
            }
            public.insert(
                j.clone(),
                PublicData {
                    ecdsa: public_share,
                    elgamal: self.round3.round2.elgamal_publics[j],
                    paillier: EncryptionKey::new(
                        self.round3.round2.pedersens[j].modulus().clone(),
                    ),
                    pedersen: self.round3.round2.pedersens[j].clone(),
                },
            );
        }

        // The response to the round-1 commitment, now that the share exists.
        let mut transcript = self.helper().transcript_for_party(&self_id);
        let schnorr_response = self.round3.round2.schnorr_precommit.respond(
            &public[&self_id].ecdsa,
            &final_share,
            &mut transcript,
        )?;

        let config = Config::new(
            self_id,
            self.helper().threshold(),
            final_share,
            self.round3.round2.elgamal_secret,
            self.round3.round2.paillier_secret.clone(),
            self.rid,
            self.chain_key,
            public,
        )?;

        self.helper()
            .broadcast(out, Content::KeygenSchnorrResponse(Broadcast5 { schnorr_response }));

        Ok(Session::KeygenRound5(Box::new(Round5 {
            round4: self,
            config: Box::new(config),
        })))
    }

    pub(crate) fn helper(&self) -> &Helper {
        self.round3.helper()
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        self.round3.helper_mut()
    }
}
