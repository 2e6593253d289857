// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    config::Config,
    curve::Signature,
    errors::{CallerError, Result},
    keygen, party::PartyId,
    protocol::{Content, Helper, RoundMessage},
    sign,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// The output of a completed protocol execution.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub enum ProtocolResult {
    /// A keygen run produced this party's key material.
    Keygen(Box<Config>),
    /// A signing run produced a signature.
    Sign(Signature),
}

/// A terminal session holding the protocol output.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct Output {
    pub(crate) helper: Helper,
    pub(crate) result: ProtocolResult,
}

/// A terminal session naming the parties that caused a failure, when they
/// could be identified.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct Abort {
    pub(crate) helper: Helper,
    pub(crate) culprits: Vec<PartyId>,
    pub(crate) error: String,
}

/// One round of a protocol execution, as driven by the handler.
///
/// A closed enum rather than a trait object: every transition is a match on
/// the (session, content) pair, so an unexpected combination is a checked
/// error instead of a downcast surprise, and serialization needs no type
/// registry.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum Session {
    KeygenRound1(Box<keygen::Round1>),
    KeygenRound2(Box<keygen::Round2>),
    KeygenRound3(Box<keygen::Round3>),
    KeygenRound4(Box<keygen::Round4>),
    KeygenRound5(Box<keygen::Round5>),
    SignRound1(Box<sign::Round1>),
    SignRound2(Box<sign::Round2>),
    SignRound3(Box<sign::Round3>),
    SignRound4(Box<sign::Round4>),
    SignRound5(Box<sign::Round5>),
    Output(Output),
    Abort(Abort),
}

impl Session {
    pub(crate) fn output(helper: Helper, result: ProtocolResult) -> Self {
        Session::Output(Output { helper, result })
    }

    pub(crate) fn abort(helper: Helper, error: String, culprits: Vec<PartyId>) -> Self {
        Session::Abort(Abort {
            helper,
            culprits,
            error,
        })
    }

    /// The current round number; terminal sessions report zero.
    pub(crate) fn number(&self) -> u8 {
        match self {
            Session::KeygenRound1(_) | Session::SignRound1(_) => 1,
            Session::KeygenRound2(_) | Session::SignRound2(_) => 2,
            Session::KeygenRound3(_) | Session::SignRound3(_) => 3,
            Session::KeygenRound4(_) | Session::SignRound4(_) => 4,
            Session::KeygenRound5(_) | Session::SignRound5(_) => 5,
            Session::Output(_) | Session::Abort(_) => 0,
        }
    }

    pub(crate) fn helper(&self) -> &Helper {
        match self {
            Session::KeygenRound1(r) => r.helper(),
            Session::KeygenRound2(r) => r.helper(),
            Session::KeygenRound3(r) => r.helper(),
            Session::KeygenRound4(r) => r.helper(),
            Session::KeygenRound5(r) => r.helper(),
            Session::SignRound1(r) => r.helper(),
            Session::SignRound2(r) => r.helper(),
            Session::SignRound3(r) => r.helper(),
            Session::SignRound4(r) => r.helper(),
            Session::SignRound5(r) => r.helper(),
            Session::Output(o) => &o.helper,
            Session::Abort(a) => &a.helper,
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, Session::Output(_) | Session::Abort(_))
    }

    /// True if this round consumes a broadcast from every party.
    pub(crate) fn expects_broadcast(&self) -> bool {
        matches!(
            self,
            Session::KeygenRound2(_)
                | Session::KeygenRound3(_)
                | Session::KeygenRound4(_)
                | Session::KeygenRound5(_)
                | Session::SignRound2(_)
                | Session::SignRound3(_)
                | Session::SignRound4(_)
                | Session::SignRound5(_)
        )
    }

    /// True if this round consumes a peer-to-peer message from every other
    /// party.
    pub(crate) fn expects_p2p(&self) -> bool {
        matches!(
            self,
            Session::KeygenRound4(_)
                | Session::SignRound2(_)
                | Session::SignRound3(_)
                | Session::SignRound4(_)
        )
    }

    /// Stateless checks of a peer-to-peer message against this round.
    pub(crate) fn verify_message(&self, msg: &RoundMessage) -> Result<()> {
        match self {
            Session::KeygenRound4(r) => r.verify_message(msg),
            Session::SignRound2(r) => r.verify_message(msg),
            Session::SignRound3(r) => r.verify_message(msg),
            Session::SignRound4(r) => r.verify_message(msg),
            _ => Err(CallerError::InvalidContent)?,
        }
    }

    /// Absorb a verified peer-to-peer message.
    pub(crate) fn store_message(&mut self, msg: RoundMessage) -> Result<()> {
        let from = msg.from.clone();
        match (self, msg.content) {
            (Session::KeygenRound4(r), Content::KeygenShare(body)) => {
                r.store_message(&from, *body)
            }
            (Session::SignRound2(r), Content::SignEncProof(body)) => {
                r.store_message(&from, *body)
            }
            (Session::SignRound3(r), Content::SignMta(body)) => r.store_message(&from, *body),
            (Session::SignRound4(r), Content::SignDeltaProof(body)) => {
                r.store_message(&from, *body)
            }
            _ => Err(CallerError::InvalidContent)?,
        }
    }

    /// Absorb a broadcast message; rounds perform their per-sender checks
    /// here.
    pub(crate) fn store_broadcast_message(&mut self, msg: RoundMessage) -> Result<()> {
        let from = msg.from.clone();
        match (self, msg.content) {
            (Session::KeygenRound2(r), Content::KeygenCommitment(body)) => {
                r.store_broadcast_message(&from, body)
            }
            (Session::KeygenRound3(r), Content::KeygenDecommitment(body)) => {
                r.store_broadcast_message(&from, *body)
            }
            (Session::KeygenRound4(r), Content::KeygenProofs(body)) => {
                r.store_broadcast_message(&from, *body)
            }
            (Session::KeygenRound5(r), Content::KeygenSchnorrResponse(body)) => {
                r.store_broadcast_message(&from, body)
            }
            (Session::SignRound2(r), Content::SignEncryptedNonces(body)) => {
                r.store_broadcast_message(&from, body)
            }
            (Session::SignRound3(r), Content::SignBigGamma(body)) => {
                r.store_broadcast_message(&from, body)
            }
            (Session::SignRound4(r), Content::SignDeltaShare(body)) => {
                r.store_broadcast_message(&from, body)
            }
            (Session::SignRound5(r), Content::SignSigmaShare(body)) => {
                r.store_broadcast_message(&from, body)
            }
            _ => Err(CallerError::InvalidContent)?,
        }
    }

    /// Complete the round, producing the next session and this round's
    /// outbound messages.
    pub(crate) fn finalize<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<(Session, Vec<RoundMessage>)> {
        let mut out = Vec::new();
        let next = match self {
            Session::KeygenRound1(r) => r.finalize(&mut out, rng)?,
            Session::KeygenRound2(r) => r.finalize(&mut out)?,
            Session::KeygenRound3(r) => r.finalize(&mut out, rng)?,
            Session::KeygenRound4(r) => r.finalize(&mut out)?,
            Session::KeygenRound5(r) => r.finalize(&mut out)?,
            Session::SignRound1(r) => r.finalize(&mut out, rng)?,
            Session::SignRound2(r) => r.finalize(&mut out, rng)?,
            Session::SignRound3(r) => r.finalize(&mut out, rng)?,
            Session::SignRound4(r) => r.finalize(&mut out, rng)?,
            Session::SignRound5(r) => r.finalize(&mut out)?,
            terminal @ (Session::Output(_) | Session::Abort(_)) => terminal,
        };
        Ok((next, out))
    }
}
