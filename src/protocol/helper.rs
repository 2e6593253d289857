// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    errors::Result,
    party::PartyId,
    protocol::{Content, RoundMessage, SessionInfo},
    transcript::{BytesWithDomain, Transcript, TranscriptWrite},
};
use serde::{Deserialize, Serialize};

/// The immutable core of a protocol session: party bookkeeping, the SSID,
/// and the running transcript every proof challenge is derived from.
///
/// The first round of each protocol embeds a `Helper`; later rounds reach it
/// through their round chain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub(crate) struct Helper {
    info: SessionInfo,
    ssid: Vec<u8>,
    transcript: Transcript,
}

impl Helper {
    /// Create a session helper.
    ///
    /// The transcript is seeded with the optional caller-provided session
    /// id, the protocol id, the curve name, the sorted party set, and the
    /// threshold, followed by any protocol-specific auxiliary data. The SSID
    /// is the digest of that seeded state, so every honest party running the
    /// same instance computes the same SSID.
    pub(crate) fn new(
        info: SessionInfo,
        session_id: Option<&[u8]>,
        aux_data: &[BytesWithDomain<'_>],
    ) -> Result<Self> {
        info.validate()?;

        let mut transcript = Transcript::new("CMP Session");
        if let Some(session_id) = session_id {
            transcript.append(&BytesWithDomain {
                domain: "Session ID",
                bytes: session_id,
            });
        }
        transcript.append(&BytesWithDomain {
            domain: "Protocol ID",
            bytes: info.protocol_id.as_bytes(),
        });
        transcript.append(&BytesWithDomain {
            domain: "Group Name",
            bytes: b"secp256k1",
        });
        transcript.append(&info.parties);
        transcript.append(&BytesWithDomain {
            domain: "Threshold",
            bytes: &(info.threshold as u64).to_be_bytes(),
        });
        for aux in aux_data {
            transcript.append(aux);
        }

        let ssid = transcript.digest_bytes().to_vec();
        Ok(Self {
            info,
            ssid,
            transcript,
        })
    }

    pub(crate) fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub(crate) fn ssid(&self) -> &[u8] {
        &self.ssid
    }

    pub(crate) fn protocol_id(&self) -> &str {
        &self.info.protocol_id
    }

    pub(crate) fn final_round(&self) -> u8 {
        self.info.final_round
    }

    pub(crate) fn self_id(&self) -> &PartyId {
        &self.info.self_id
    }

    pub(crate) fn party_ids(&self) -> &[PartyId] {
        self.info.parties.as_slice()
    }

    pub(crate) fn other_party_ids(&self) -> Vec<PartyId> {
        self.info.parties.others(&self.info.self_id)
    }

    pub(crate) fn threshold(&self) -> usize {
        self.info.threshold
    }

    pub(crate) fn n(&self) -> usize {
        self.info.parties.len()
    }

    /// A fork of the session transcript. Mutating it never affects the
    /// session state.
    pub(crate) fn transcript(&self) -> Transcript {
        self.transcript.fork()
    }

    /// A fork of the session transcript bound to one party, used to derive
    /// that party's proof challenges.
    pub(crate) fn transcript_for_party(&self, id: &PartyId) -> Transcript {
        let mut forked = self.transcript.fork();
        forked.append(id);
        forked
    }

    /// Absorb additional session data (such as the agreed RID) into the
    /// running transcript. Affects every transcript forked afterwards.
    pub(crate) fn update_transcript(&mut self, value: &impl TranscriptWrite) {
        self.transcript.append(value);
    }

    /// Queue a broadcast message.
    pub(crate) fn broadcast(&self, out: &mut Vec<RoundMessage>, content: Content) {
        out.push(RoundMessage {
            from: self.info.self_id.clone(),
            to: None,
            broadcast: true,
            content,
        });
    }

    /// Queue a message to a single party.
    pub(crate) fn send(&self, out: &mut Vec<RoundMessage>, content: Content, to: &PartyId) {
        out.push(RoundMessage {
            from: self.info.self_id.clone(),
            to: Some(to.clone()),
            broadcast: false,
            content,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::party::PartySet;

    fn info(self_id: &str) -> SessionInfo {
        let parties: Vec<PartyId> = ["alice", "bob", "charlie"]
            .into_iter()
            .map(PartyId::from)
            .collect();
        SessionInfo {
            protocol_id: "cmp/keygen-test".into(),
            final_round: 5,
            self_id: PartyId::from(self_id),
            parties: PartySet::new(&parties).unwrap(),
            threshold: 1,
        }
    }

    #[test]
    fn all_parties_compute_the_same_ssid() {
        let alice = Helper::new(info("alice"), Some(b"session"), &[]).unwrap();
        let bob = Helper::new(info("bob"), Some(b"session"), &[]).unwrap();
        assert_eq!(alice.ssid(), bob.ssid());
    }

    #[test]
    fn different_session_ids_give_different_ssids() {
        let a = Helper::new(info("alice"), Some(b"one"), &[]).unwrap();
        let b = Helper::new(info("alice"), Some(b"two"), &[]).unwrap();
        assert_ne!(a.ssid(), b.ssid());
    }

    #[test]
    fn per_party_transcripts_diverge() {
        let helper = Helper::new(info("alice"), Some(b"session"), &[]).unwrap();
        let a = helper
            .transcript_for_party(&PartyId::from("alice"))
            .digest_bytes();
        let b = helper
            .transcript_for_party(&PartyId::from("bob"))
            .digest_bytes();
        assert_ne!(a, b);
        // Forking never mutates the parent.
        assert_eq!(
            helper.transcript().digest_bytes(),
            helper.transcript().digest_bytes()
        );
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let mut bad = info("alice");
        bad.threshold = 3;
        assert!(Helper::new(bad, None, &[]).is_err());

        let mut not_member = info("alice");
        not_member.self_id = PartyId::from("mallory");
        assert!(Helper::new(not_member, None, &[]).is_err());
    }
}
