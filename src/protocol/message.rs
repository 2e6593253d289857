// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    errors::{CallerError, Result},
    keygen, party::PartyId, sign,
    transcript::Transcript,
};
use serde::{Deserialize, Serialize};

/// Every round content across both protocols, as one closed enum.
///
/// Deserialization dispatches on the variant tag, so an unexpected content
/// kind is a decode error rather than a missing-field surprise. Each variant
/// knows the round that consumes it and whether it travels as a broadcast.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) enum Content {
    KeygenCommitment(keygen::Broadcast2),
    KeygenDecommitment(Box<keygen::Broadcast3>),
    KeygenProofs(Box<keygen::Broadcast4>),
    KeygenShare(Box<keygen::Message4>),
    KeygenSchnorrResponse(keygen::Broadcast5),
    SignEncryptedNonces(sign::Broadcast2),
    SignEncProof(Box<sign::Message2>),
    SignBigGamma(sign::Broadcast3),
    SignMta(Box<sign::Message3>),
    SignDeltaShare(sign::Broadcast4),
    SignDeltaProof(Box<sign::Message4>),
    SignSigmaShare(sign::Broadcast5),
}

impl Content {
    /// The round that consumes this content.
    pub(crate) fn round_number(&self) -> u8 {
        match self {
            Content::KeygenCommitment(_) => 2,
            Content::KeygenDecommitment(_) => 3,
            Content::KeygenProofs(_) => 4,
            Content::KeygenShare(_) => 4,
            Content::KeygenSchnorrResponse(_) => 5,
            Content::SignEncryptedNonces(_) => 2,
            Content::SignEncProof(_) => 2,
            Content::SignBigGamma(_) => 3,
            Content::SignMta(_) => 3,
            Content::SignDeltaShare(_) => 4,
            Content::SignDeltaProof(_) => 4,
            Content::SignSigmaShare(_) => 5,
        }
    }

    /// True if this content travels as a (reliable) broadcast.
    pub(crate) fn is_broadcast(&self) -> bool {
        match self {
            Content::KeygenCommitment(_)
            | Content::KeygenDecommitment(_)
            | Content::KeygenProofs(_)
            | Content::KeygenSchnorrResponse(_)
            | Content::SignEncryptedNonces(_)
            | Content::SignBigGamma(_)
            | Content::SignDeltaShare(_)
            | Content::SignSigmaShare(_) => true,
            Content::KeygenShare(_)
            | Content::SignEncProof(_)
            | Content::SignMta(_)
            | Content::SignDeltaProof(_) => false,
        }
    }
}

/// A content-bearing message as the rounds see it, before the wire envelope
/// is attached (outbound) or after it has been stripped (inbound).
#[derive(Clone, Debug)]
pub(crate) struct RoundMessage {
    pub(crate) from: PartyId,
    /// `None` addresses all parties.
    pub(crate) to: Option<PartyId>,
    pub(crate) broadcast: bool,
    pub(crate) content: Content,
}

/// The wire envelope exchanged between parties.
///
/// A `round_number` of zero signals an abort; `data` then carries the error
/// string instead of serialized content.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Message {
    /// The session identifier this message belongs to.
    pub ssid: Vec<u8>,
    /// The sender.
    pub from: PartyId,
    /// The recipient; `None` addresses all parties.
    pub to: Option<PartyId>,
    /// The protocol identifier.
    pub protocol: String,
    /// The round that consumes this message, or zero for an abort.
    pub round_number: u8,
    /// Serialized [`Content`], or an error string for aborts.
    pub data: Vec<u8>,
    /// Whether this message must be reliably broadcast.
    pub broadcast: bool,
    /// The sender's echo hash over the previous round's broadcasts.
    pub broadcast_verification: Option<Vec<u8>>,
}

impl Message {
    /// Decode the payload, checking that the advertised round number and
    /// broadcast flag match the content's own.
    pub(crate) fn content(&self) -> Result<Content> {
        let content: Content = deserialize!(&self.data)?;
        if content.round_number() != self.round_number || content.is_broadcast() != self.broadcast
        {
            Err(CallerError::InvalidContent)?;
        }
        Ok(content)
    }

    pub(crate) fn to_round_message(&self) -> Result<RoundMessage> {
        Ok(RoundMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            broadcast: self.broadcast,
            content: self.content()?,
        })
    }

    /// A collision-resistant hash of the full message, used to build the
    /// per-round broadcast echo hash.
    pub(crate) fn hash(&self) -> [u8; 32] {
        let mut transcript = Transcript::new("Message Hash");
        transcript.append_bytes("SSID", &self.ssid);
        transcript.append(&self.from);
        if let Some(to) = &self.to {
            transcript.append(to);
        }
        transcript.append_bytes("Protocol", self.protocol.as_bytes());
        transcript.append_bytes("Round", &[self.round_number]);
        transcript.append_bytes("Data", &self.data);
        transcript.append_bytes("Broadcast", &[u8::from(self.broadcast)]);
        transcript.digest_bytes()
    }
}
