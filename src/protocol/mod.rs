// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The round framework: immutable session information, the [`Helper`] each
//! protocol embeds, the message envelope, and the [`Session`] state machine
//! driven by the handler.

mod helper;
mod message;
mod session;

pub(crate) use helper::Helper;
pub(crate) use message::{Content, RoundMessage};
pub use message::Message;
pub(crate) use session::Session;
pub use session::ProtocolResult;

use crate::{
    errors::{CallerError, Result},
    party::{PartyId, PartySet},
};
use serde::{Deserialize, Serialize};

/// Immutable information describing one protocol execution.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub(crate) struct SessionInfo {
    /// An identifier for the protocol being run.
    pub(crate) protocol_id: String,
    /// The number of rounds before the output round.
    pub(crate) final_round: u8,
    /// This party's ID.
    pub(crate) self_id: PartyId,
    /// The sorted set of participating parties.
    pub(crate) parties: PartySet,
    /// The maximum number of corrupted parties tolerated.
    pub(crate) threshold: usize,
}

impl SessionInfo {
    /// Validate the basic session invariants: `self` participates, there are
    /// at least two parties, and `0 ≤ t ≤ n−1`.
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.parties.contains(&self.self_id) {
            Err(CallerError::BadSessionConfig)?;
        }
        let n = self.parties.len();
        if n < 2 || self.threshold > n - 1 {
            Err(CallerError::BadSessionConfig)?;
        }
        Ok(())
    }
}
