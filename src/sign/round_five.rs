// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    errors::{InternalError, Result},
    party::PartyId,
    protocol::{Helper, ProtocolResult, RoundMessage, Session},
    sign::{presignature::PreSignature, round_four::{Broadcast5, Round4}},
};
use k256::{elliptic_curve::Field, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

/// Round 5 combines the `σⱼ` shares and verifies the resulting signature.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct Round5 {
    pub(crate) round4: Round4,
    pub(crate) presignature: PreSignature,
    /// `σⱼ` per signer.
    pub(crate) sigmas: BTreeMap<PartyId, Scalar>,
}

impl Round5 {
    /// Store `σⱼ`.
    pub(crate) fn store_broadcast_message(
        &mut self,
        from: &PartyId,
        body: Broadcast5,
    ) -> Result<()> {
        if bool::from(body.sigma.is_zero()) {
            error!("Received a zero signature share");
            return Err(InternalError::ProtocolError(Some(from.clone())));
        }
        self.sigmas.insert(from.clone(), body.sigma);
        Ok(())
    }

    /// Assemble and verify the signature.
    pub(crate) fn finalize(self, _out: &mut Vec<RoundMessage>) -> Result<Session> {
        let signature = self.presignature.signature(&self.sigmas);
        let digest = self.round4.round3.round2.round1.digest;
        let public_key = self.round4.round3.round2.round1.public_key;

        if !signature.verify(&public_key, &digest) {
            error!("Combined signature failed to validate");
            return Ok(Session::abort(
                self.helper().clone(),
                "failed to validate signature".into(),
                vec![],
            ));
        }

        let helper = self.helper().clone();
        Ok(Session::output(helper, ProtocolResult::Sign(signature)))
    }

    pub(crate) fn helper(&self) -> &Helper {
        self.round4.helper()
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        self.round4.helper_mut()
    }
}
