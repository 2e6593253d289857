// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, Result},
    keygen::{
        round_one::{Broadcast2, Round1},
        round_three::Round3,
    },
    paillier::DecryptionKey,
    party::PartyId,
    polynomial::ExponentPolynomial,
    protocol::{Content, Helper, RoundMessage, Session},
    ring_pedersen::RingPedersen,
    transcript::{Commitment, Decommitment},
    zkp::pisch::{SchCommit, SchPrecommit},
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

/// The opening of a round-1 commitment: everything a party contributes to
/// the shared state.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Broadcast3 {
    pub(crate) rid: [u8; 32],
    pub(crate) chain_key: [u8; 32],
    /// `Fᵢ(X) = fᵢ(X)·G`.
    pub(crate) vss_polynomial: ExponentPolynomial,
    /// `Aᵢ`, the Schnorr commitment answered in round 5.
    pub(crate) schnorr_commitment: SchCommit,
    pub(crate) elgamal_public: CurvePoint,
    /// `(Nᵢ, sᵢ, tᵢ)`; `Nᵢ` doubles as the Paillier modulus.
    pub(crate) pedersen: RingPedersen,
    pub(crate) decommitment: Decommitment,
}

/// Round 2 collects commitments `Vⱼ`, then opens its own.
#[derive(Serialize, Deserialize)]
pub(crate) struct Round2 {
    pub(crate) round1: Round1,

    /// `Vⱼ` per party.
    pub(crate) commitments: BTreeMap<PartyId, Commitment>,
    /// `ridⱼ` per party, filled as openings verify in round 3.
    pub(crate) rids: BTreeMap<PartyId, [u8; 32]>,
    pub(crate) chain_keys: BTreeMap<PartyId, [u8; 32]>,
    /// `fⱼ(i)`: the share evaluations received from each party.
    pub(crate) shares_received: BTreeMap<PartyId, Scalar>,
    pub(crate) vss_polynomials: BTreeMap<PartyId, ExponentPolynomial>,
    pub(crate) elgamal_publics: BTreeMap<PartyId, CurvePoint>,
    pub(crate) pedersens: BTreeMap<PartyId, RingPedersen>,

    pub(crate) elgamal_secret: Scalar,
    pub(crate) paillier_secret: DecryptionKey,
    /// `λᵢ` behind the ring-Pedersen parameters.
    pub(crate) pedersen_secret: BigNumber,
    pub(crate) schnorr_precommit: SchPrecommit,
    /// `uᵢ`, the opening for `Vᵢ`.
    pub(crate) decommitment: Decommitment,
}

impl std::fmt::Debug for Round2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("keygen::Round2")
            .field("self_id", self.helper().self_id())
            .field("commitments", &self.commitments.keys().collect::<Vec<_>>())
            .field("secrets", &"[redacted]")
            .finish()
    }
}

impl Round2 {
    /// Save a commitment `Vⱼ`.
    pub(crate) fn store_broadcast_message(
        &mut self,
        from: &PartyId,
        body: Broadcast2,
    ) -> Result<()> {
        self.commitments.insert(from.clone(), body.commitment);
        Ok(())
    }

    /// Open: send all committed data.
    pub(crate) fn finalize(self, out: &mut Vec<RoundMessage>) -> Result<Session> {
        let self_id = self.helper().self_id().clone();
        let opening = Broadcast3 {
            rid: self.rids[&self_id],
            chain_key: self.chain_keys[&self_id],
            vss_polynomial: self.vss_polynomials[&self_id].clone(),
            schnorr_commitment: self.schnorr_precommit.commitment(),
            elgamal_public: self.elgamal_publics[&self_id],
            pedersen: self.pedersens[&self_id].clone(),
            decommitment: self.decommitment,
        };
        self.helper()
            .broadcast(out, Content::KeygenDecommitment(Box::new(opening)));

        Ok(Session::KeygenRound3(Box::new(Round3 {
            round2: self,
            schnorr_commitments: BTreeMap::new(),
        })))
    }

    pub(crate) fn helper(&self) -> &Helper {
        self.round1.helper()
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        self.round1.helper_mut()
    }
}

impl Broadcast3 {
    /// Sanity-check the opening's shape before any cryptographic checks.
    ///
    /// In a fresh keygen the constant term must be hidden but nonzero; a
    /// refresh would expect the opposite, so the caller passes its own
    /// polynomial's shape as the expectation.
    pub(crate) fn validate_shape(&self, threshold: usize, expect_constant: bool) -> Result<()> {
        if self.vss_polynomial.is_constant != expect_constant {
            error!("VSS polynomial has an incorrect constant term");
            Err(CallerError::NilFields)?;
        }
        if self.vss_polynomial.degree() != threshold {
            error!("VSS polynomial has incorrect degree");
            Err(CallerError::InvalidContent)?;
        }
        if self.elgamal_public.is_identity() || !self.schnorr_commitment.is_valid() {
            error!("Opening contains degenerate group elements");
            Err(CallerError::NilFields)?;
        }
        Ok(())
    }
}
