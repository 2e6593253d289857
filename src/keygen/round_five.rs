// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    config::Config,
    errors::{InternalError, Result},
    keygen::round_four::{Broadcast5, Round4},
    party::PartyId,
    protocol::{Helper, ProtocolResult, RoundMessage, Session},
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Round 5 checks everyone's Schnorr response and outputs the config.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct Round5 {
    pub(crate) round4: Round4,
    pub(crate) config: Box<Config>,
}

impl Round5 {
    /// Verify a peer's proof of knowledge of its final share.
    pub(crate) fn store_broadcast_message(
        &mut self,
        from: &PartyId,
        body: Broadcast5,
    ) -> Result<()> {
        let commitment = self
            .round4
            .round3
            .schnorr_commitments
            .get(from)
            .ok_or_else(|| {
                error!("Missing Schnorr commitment for sender");
                InternalError::ProtocolError(Some(from.clone()))
            })?;
        let public = &self.config.public_data(from)?.ecdsa;
        let mut transcript = self.helper().transcript_for_party(from);
        body.schnorr_response
            .verify(public, commitment, &mut transcript)
            .map_err(|_| {
                error!("Failed to validate Schnorr proof for received share");
                InternalError::ProtocolError(Some(from.clone()))
            })
    }

    pub(crate) fn finalize(self, _out: &mut Vec<RoundMessage>) -> Result<Session> {
        let helper = self.helper().clone();
        Ok(Session::output(
            helper,
            ProtocolResult::Keygen(self.config),
        ))
    }

    pub(crate) fn helper(&self) -> &Helper {
        self.round4.helper()
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        self.round4.helper_mut()
    }
}
