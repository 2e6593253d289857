// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Error types for the CMP protocol engine.
//!
//! Errors are split along the recoverability boundary the handler cares
//! about: [`CallerError`]s are induced by input from the calling application
//! or a peer and leave the handler usable (the offending message is dropped),
//! while the remaining [`InternalError`] variants are terminal for the
//! protocol execution.

use crate::party::PartyId;

/// The default Result type used in this crate.
pub type Result<T> = std::result::Result<T, InternalError>;

/// Errors triggered by the calling application or by malformed peer input.
///
/// These are recoverable at the accept site: the handler drops the message
/// and proceeds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallerError {
    /// The message content could not be deserialized or had the wrong type
    /// for the current round.
    #[error("message content is invalid for this round")]
    InvalidContent,
    /// A required field of the message was missing, zero, or the identity.
    #[error("message has missing or nil fields")]
    NilFields,
    /// The message's SSID does not match this protocol execution.
    #[error("message SSID does not match this session")]
    WrongSsid,
    /// The message names a different protocol.
    #[error("message protocol id does not match this session")]
    WrongProtocolId,
    /// The sender is not a member of the party set.
    #[error("message sender is not a participant of this session")]
    UnknownSender,
    /// The message was addressed to a different party.
    #[error("message is not addressed to this party")]
    WrongDestination,
    /// The round number is out of range for this protocol.
    #[error("message round number is invalid")]
    InvalidRoundNumber,
    /// A message of the same kind from this sender was already stored for
    /// this round.
    #[error("duplicate message")]
    Duplicate,
    /// The message claims to come from this party.
    #[error("message claims to be from self")]
    MessageFromSelf,
    /// A party list was not sorted.
    #[error("party list is not sorted")]
    Unsorted,
    /// A party list contained duplicates.
    #[error("party list contains duplicates")]
    ContainsDuplicates,
    /// A serialized blob could not be decoded.
    #[error("deserialization failed")]
    DeserializationFailed,
    /// Serialization of a value failed.
    #[error("serialization failed")]
    SerializationFailed,
    /// A bounded random-sampling loop ran out of retries.
    #[error("ran out of retries while sampling")]
    RetryFailed,
    /// The session configuration is invalid (threshold out of bounds, self
    /// not in the party set, or too few signers).
    #[error("invalid session configuration")]
    BadSessionConfig,
    /// A BIP32 derivation path was malformed or requested a hardened index.
    #[error("invalid derivation path")]
    InvalidDerivationPath,
    /// The protocol has not yet produced a result.
    #[error("protocol is not finished")]
    ProtocolNotFinished,
}

/// Terminal errors of a protocol execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    /// A cryptographic check failed: proof verification, decommitment,
    /// ciphertext validation, parameter validation, the final ECDSA check,
    /// or the broadcast-echo comparison. The offending party is named when
    /// it can be identified.
    #[error("protocol error{}", display_culprit(.0))]
    ProtocolError(Option<PartyId>),
    /// An internal invariant of this implementation was violated. This is a
    /// bug, not a peer failure.
    #[error("internal invariant failed")]
    InternalInvariantFailed,
    /// The calling application made a mistake.
    #[error("caller error: {0}")]
    CallingApplicationMistake(#[from] CallerError),
}

fn display_culprit(culprit: &Option<PartyId>) -> String {
    match culprit {
        Some(id) => format!(" (caused by {id})"),
        None => String::new(),
    }
}

impl InternalError {
    /// The party to blame, if one was identified.
    pub(crate) fn culprit(&self) -> Option<PartyId> {
        match self {
            InternalError::ProtocolError(culprit) => culprit.clone(),
            _ => None,
        }
    }

    /// True if the error is recoverable at the accept site.
    pub(crate) fn is_content_error(&self) -> bool {
        matches!(self, InternalError::CallingApplicationMistake(_))
    }
}
