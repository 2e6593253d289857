// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The five-round threshold signing protocol.
//!
//! # High-level protocol description
//! Signing runs among a subset of the keygen parties of size at least
//! `t+1`. Each signer first lifts its share to the Lagrange-adjusted share
//! so the adjusted shares sum to the joint secret.
//!
//! - Round 1 samples the nonce share `kᵢ` and the mask share `γᵢ`, encrypts
//!   both under the party's own Paillier key (`Kᵢ`, `Gᵢ`), broadcasts the
//!   ciphertexts and proves to each peer that `Kᵢ` encrypts a short value.
//! - Round 2 reveals `Γᵢ = γᵢ·G` and runs two MtA conversions with every
//!   peer — one turning `γᵢ·kⱼ` into additive shares (for `δ`), one turning
//!   `xᵢ·kⱼ` into additive shares (for `χ`) — each justified by an
//!   affine-group proof, plus a `Π[log*]` proof linking `Gᵢ` to `Γᵢ`.
//! - Round 3 combines `Γ = Σ Γⱼ`, computes `Δᵢ = kᵢ·Γ` and the additive
//!   shares `δᵢ`, `χᵢ`, broadcasts `(δᵢ, Δᵢ)` and proves `Δᵢ` consistent
//!   with `Kᵢ`.
//! - Round 4 checks `(Σ δⱼ)·G == Σ Δⱼ`, derives the pre-signature
//!   `R = δ⁻¹·Γ`, and broadcasts the signature share
//!   `σᵢ = r·χᵢ + kᵢ·m`.
//! - Round 5 assembles `s = Σ σⱼ` and verifies the ECDSA signature before
//!   returning it.

mod mta;
mod presignature;
mod round_five;
mod round_four;
mod round_one;
mod round_three;
mod round_two;

pub use presignature::PreSignature;
pub(crate) use round_five::Round5;
pub(crate) use round_four::{Broadcast5, Message4, Round4};
pub(crate) use round_one::{Broadcast2, Round1};
pub(crate) use round_three::{Broadcast4, Round3};
pub(crate) use round_two::{Broadcast3, Message2, Message3, Round2};

use crate::{
    config::Config,
    curve::CurvePoint,
    errors::{CallerError, Result},
    party::{PartyId, PartySet},
    polynomial::lagrange_coefficient_at_zero,
    protocol::{Helper, Session, SessionInfo},
    transcript::{BytesWithDomain, TranscriptWrite},
};
use k256::Scalar;
use std::collections::BTreeMap;
use tracing::error;

pub(crate) const PROTOCOL_ID: &str = "cmp/sign-threshold-ecdsa-secp256k1";
pub(crate) const FINAL_ROUND: u8 = 5;

/// Create the first signing round for the config's party among `signers`,
/// over the pre-hashed message `digest`.
pub(crate) fn new_session(
    config: &Config,
    signers: &[PartyId],
    digest: [u8; 32],
    session_id: Option<&[u8]>,
) -> Result<Session> {
    let signer_set = PartySet::new(signers)?;
    if !config.can_sign(&signer_set) {
        error!("Signer set cannot sign with this config");
        Err(CallerError::BadSessionConfig)?;
    }

    let info = SessionInfo {
        protocol_id: PROTOCOL_ID.into(),
        final_round: FINAL_ROUND,
        self_id: config.id().clone(),
        parties: signer_set.clone(),
        threshold: config.threshold(),
    };
    // The transcript binds every proof to the config and the message being
    // signed.
    let config_bytes = config.transcript_bytes();
    let helper = Helper::new(
        info,
        session_id,
        &[
            BytesWithDomain {
                domain: "CMP Config",
                bytes: &config_bytes,
            },
            BytesWithDomain {
                domain: "Signed Message",
                bytes: &digest,
            },
        ],
    )?;

    // Lift the stored additive shares to the signer subset: with
    // ℓⱼ = Lⱼ(0) over the signers, Σⱼ ℓⱼ·xⱼ equals the joint secret.
    let signer_ids = signer_set.as_slice();
    let self_coefficient = lagrange_coefficient_at_zero(config.id(), signer_ids)?;
    let secret_ecdsa = *config.ecdsa_share() * self_coefficient;

    let mut ecdsa = BTreeMap::new();
    for j in signer_ids {
        let coefficient = lagrange_coefficient_at_zero(j, signer_ids)?;
        ecdsa.insert(
            j.clone(),
            config.public_share(j)?.multiply_by_scalar(&coefficient),
        );
    }
    let public_key: CurvePoint = ecdsa
        .values()
        .fold(CurvePoint::IDENTITY, |sum, point| sum + *point);

    let mut paillier = BTreeMap::new();
    let mut pedersen = BTreeMap::new();
    for j in signer_ids {
        let data = config.public_data(j)?;
        paillier.insert(j.clone(), data.paillier.clone());
        pedersen.insert(j.clone(), data.pedersen.clone());
    }

    Ok(Session::SignRound1(Box::new(Round1 {
        helper,
        public_key,
        secret_ecdsa,
        paillier_secret: config.paillier_secret().clone(),
        paillier,
        pedersen,
        ecdsa,
        digest,
    })))
}

/// Sum a collection of scalar shares.
pub(crate) fn sum_scalars<'a>(shares: impl Iterator<Item = &'a Scalar>) -> Scalar {
    shares.fold(Scalar::ZERO, |sum, share| sum + share)
}
