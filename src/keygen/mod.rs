// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The five-round distributed key generation protocol.
//!
//! # High-level protocol description
//! - Round 1 samples every per-party secret: the Paillier primes and derived
//!   ring-Pedersen parameters, an ElGamal key pair, the VSS share polynomial
//!   `fᵢ(X)` of degree `t` whose constant term is the party's additive
//!   secret, Schnorr randomness for the final proof of knowledge, and the
//!   32-byte RID and chain-key contributions. It broadcasts a commitment to
//!   all of it.
//! - Round 2 collects commitments and broadcasts the opening.
//! - Round 3 checks every opening, combines the RID and chain-key
//!   contributions by XOR, then proves the Paillier modulus is Blum-like
//!   (`Π[mod]`), the Pedersen parameters well-formed (`Π[prm]`), and — to
//!   each peer separately — that the modulus has no small factors
//!   (`Π[fac]`), alongside the peer's encrypted VSS share evaluation.
//! - Round 4 verifies all proofs, decrypts the incoming share evaluations,
//!   checks them against the public polynomials "in the exponent", and
//!   assembles the final share `xᵢ = Σⱼ fⱼ(i)` plus everyone's public
//!   shares. It answers the round-1 Schnorr commitment with a response for
//!   the new share.
//! - Round 5 verifies every Schnorr response and outputs the [`Config`].
//!
//! [`Config`]: crate::Config

mod round_five;
mod round_four;
mod round_one;
mod round_three;
mod round_two;

pub(crate) use round_five::Round5;
pub(crate) use round_four::{Broadcast5, Round4};
pub(crate) use round_one::{Broadcast2, Round1};
pub(crate) use round_three::{Broadcast4, Message4, Round3};
pub(crate) use round_two::{Broadcast3, Round2};

use crate::{
    errors::Result,
    party::{PartyId, PartySet},
    protocol::{Helper, Session, SessionInfo},
};
use rand::{CryptoRng, RngCore};

pub(crate) const PROTOCOL_ID: &str = "cmp/keygen-threshold-ecdsa-secp256k1";
pub(crate) const FINAL_ROUND: u8 = 5;

/// Create the first keygen round for `self_id` among `participants`.
pub(crate) fn new_session<R: RngCore + CryptoRng>(
    participants: &[PartyId],
    self_id: &PartyId,
    threshold: usize,
    session_id: Option<&[u8]>,
    rng: &mut R,
) -> Result<Session> {
    let info = SessionInfo {
        protocol_id: PROTOCOL_ID.into(),
        final_round: FINAL_ROUND,
        self_id: self_id.clone(),
        parties: PartySet::new(participants)?,
        threshold,
    };
    let helper = Helper::new(info, session_id, &[])?;
    Ok(Session::KeygenRound1(Box::new(Round1::new(helper, rng))))
}
