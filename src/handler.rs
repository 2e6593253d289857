// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The per-party protocol driver.
//!
//! A [`Handler`] owns one party's round state machine and the message
//! queues around it. The calling application is the transport: it feeds
//! inbound messages to [`Handler::accept`] and, once
//! [`Handler::received_all`] holds, calls [`Handler::process_round`] to
//! advance the round and collect outbound messages. All state — including
//! secrets — serializes through [`Handler::to_bytes`], so an execution can
//! pause between rounds and resume in another process. Treat serialized
//! handlers as confidential.

use crate::{
    config::Config,
    errors::{CallerError, Result},
    keygen,
    party::PartyId,
    protocol::{Message, ProtocolResult, Session},
    sign,
    transcript::BytesWithDomain,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A terminal protocol failure, naming the culprits when they could be
/// identified.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct ProtocolError {
    pub culprits: Vec<PartyId>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct Queued {
    message: Message,
    /// Whether the round state machine has absorbed this message.
    processed: bool,
}

/// One party's protocol execution.
#[derive(Serialize, Deserialize, Debug)]
pub struct Handler {
    /// `None` only transiently, while a round is being finalized.
    current: Option<Session>,
    /// Queued peer-to-peer messages, keyed by round and sender.
    messages: BTreeMap<u8, BTreeMap<PartyId, Queued>>,
    /// Queued broadcast messages, keyed by round and sender.
    broadcasts: BTreeMap<u8, BTreeMap<PartyId, Queued>>,
    /// The echo hash over each completed round's broadcasts.
    broadcast_hashes: BTreeMap<u8, Vec<u8>>,
    /// Outbound messages from the latest `process_round` (plus any terminal
    /// abort message).
    out: Vec<Message>,
    result: Option<ProtocolResult>,
    error: Option<ProtocolError>,

    // Cached session coordinates, usable even while `current` is detached.
    ssid: Vec<u8>,
    protocol: String,
    self_id: PartyId,
    final_round: u8,
}

impl Handler {
    fn new(session: Session) -> Self {
        let helper = session.helper();
        Self {
            ssid: helper.ssid().to_vec(),
            protocol: helper.protocol_id().to_string(),
            self_id: helper.self_id().clone(),
            final_round: helper.final_round(),
            current: Some(session),
            messages: BTreeMap::new(),
            broadcasts: BTreeMap::new(),
            broadcast_hashes: BTreeMap::new(),
            out: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// Start a keygen execution.
    pub fn new_keygen<R: RngCore + CryptoRng>(
        participants: &[PartyId],
        self_id: &PartyId,
        threshold: usize,
        session_id: Option<&[u8]>,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(Self::new(keygen::new_session(
            participants,
            self_id,
            threshold,
            session_id,
            rng,
        )?))
    }

    /// Start a signing execution over a pre-hashed message.
    pub fn new_sign(
        config: &Config,
        signers: &[PartyId],
        digest: [u8; 32],
        session_id: Option<&[u8]>,
    ) -> Result<Self> {
        Ok(Self::new(sign::new_session(
            config, signers, digest, session_id,
        )?))
    }

    /// The current round number; zero once the execution is terminal.
    pub fn current_round(&self) -> u8 {
        self.current.as_ref().map(Session::number).unwrap_or(0)
    }

    /// The session identifier shared by all messages of this execution.
    pub fn ssid(&self) -> &[u8] {
        &self.ssid
    }

    /// The protocol output, if the execution completed successfully.
    pub fn result(&self) -> Option<&ProtocolResult> {
        self.result.as_ref()
    }

    /// The terminal error, if the execution aborted.
    pub fn error(&self) -> Option<&ProtocolError> {
        self.error.as_ref()
    }

    /// Outbound messages produced by the latest round transition.
    pub fn outbound(&self) -> &[Message] {
        &self.out
    }

    /// Serialize the full mid-protocol state, secrets included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize!(self)
    }

    /// Restore a handler previously serialized with [`Handler::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes)
    }

    /// Abort an idle execution, queueing a terminal message for the peers.
    pub fn stop(&mut self) {
        if self.result.is_none() && self.error.is_none() {
            self.abort("aborted by user".into(), vec![]);
        }
    }

    /// True iff the message belongs to this execution and could still be
    /// consumed: addressed to us, right protocol and SSID, known sender,
    /// current-or-future round with content attached.
    pub fn can_accept(&self, msg: &Message) -> bool {
        let session = match &self.current {
            Some(session) => session,
            None => return false,
        };
        if session.is_terminal() {
            return false;
        }
        if let Some(to) = &msg.to {
            if to != &self.self_id {
                debug!("Rejecting message: wrong destination");
                return false;
            }
        }
        if msg.protocol != self.protocol {
            debug!("Rejecting message: wrong protocol id");
            return false;
        }
        if msg.ssid != self.ssid {
            debug!("Rejecting message: wrong SSID");
            return false;
        }
        if !session.helper().party_ids().contains(&msg.from) {
            debug!("Rejecting message: unknown sender");
            return false;
        }
        if msg.from == self.self_id {
            debug!("Rejecting message: claims to be from self");
            return false;
        }
        if msg.data.is_empty() {
            debug!("Rejecting message: no content");
            return false;
        }
        if msg.round_number > self.final_round {
            debug!("Rejecting message: round number too large");
            return false;
        }
        if msg.round_number != 0 && msg.round_number < session.number() {
            debug!("Rejecting message: round number from a past round");
            return false;
        }
        true
    }

    /// True if the same (round, sender, kind) slot is already occupied.
    fn duplicate(&self, msg: &Message) -> bool {
        if msg.round_number == 0 {
            return false;
        }
        let queue = if msg.broadcast {
            &self.broadcasts
        } else {
            &self.messages
        };
        queue
            .get(&msg.round_number)
            .is_some_and(|q| q.contains_key(&msg.from))
    }

    /// Take in one message: queue it, and absorb it into the current round
    /// when it belongs there. Invalid messages are dropped; cryptographic
    /// failures abort the execution.
    pub fn accept(&mut self, msg: Message) {
        if self.result.is_some() || self.error.is_some() {
            return;
        }
        if !self.can_accept(&msg) {
            return;
        }

        // A message with round number zero is an abort from another party.
        if msg.round_number == 0 {
            let reason = String::from_utf8_lossy(&msg.data).into_owned();
            let from = msg.from;
            self.abort(
                format!("aborted by other party with error: \"{reason}\""),
                vec![from],
            );
            return;
        }

        if self.duplicate(&msg) {
            debug!("Dropping duplicate message");
            return;
        }

        let round = msg.round_number;
        let from = msg.from.clone();
        let broadcast = msg.broadcast;
        self.enqueue(msg);

        if Some(round) != self.current.as_ref().map(Session::number) {
            return;
        }

        if broadcast {
            self.process_queued(round, &from, true);
            // A peer-to-peer message from the same sender may have been
            // waiting for this broadcast.
            if self.has_unprocessed(round, &from, false) && self.error.is_none() {
                self.process_queued(round, &from, false);
            }
        } else {
            let gated = self
                .current
                .as_ref()
                .map(|s| s.expects_broadcast() && !self.is_processed(round, &from, true))
                .unwrap_or(true);
            if !gated {
                self.process_queued(round, &from, false);
            }
        }
    }

    fn enqueue(&mut self, msg: Message) {
        let queue = if msg.broadcast {
            &mut self.broadcasts
        } else {
            &mut self.messages
        };
        queue.entry(msg.round_number).or_default().insert(
            msg.from.clone(),
            Queued {
                message: msg,
                processed: false,
            },
        );
    }

    fn queue(&self, broadcast: bool) -> &BTreeMap<u8, BTreeMap<PartyId, Queued>> {
        if broadcast {
            &self.broadcasts
        } else {
            &self.messages
        }
    }

    fn is_processed(&self, round: u8, from: &PartyId, broadcast: bool) -> bool {
        self.queue(broadcast)
            .get(&round)
            .and_then(|q| q.get(from))
            .map(|entry| entry.processed)
            .unwrap_or(false)
    }

    fn has_unprocessed(&self, round: u8, from: &PartyId, broadcast: bool) -> bool {
        self.queue(broadcast)
            .get(&round)
            .and_then(|q| q.get(from))
            .map(|entry| !entry.processed)
            .unwrap_or(false)
    }

    /// Run one queued message through the round state machine.
    fn process_queued(&mut self, round: u8, from: &PartyId, broadcast: bool) {
        let session = match self.current.as_mut() {
            Some(session) => session,
            None => return,
        };
        let queue = if broadcast {
            &mut self.broadcasts
        } else {
            &mut self.messages
        };
        let entry = match queue.get_mut(&round).and_then(|q| q.get_mut(from)) {
            Some(entry) if !entry.processed => entry,
            _ => return,
        };

        let round_msg = match entry.message.to_round_message() {
            Ok(round_msg) => round_msg,
            Err(_) => {
                warn!("Dropping message with undecodable content from {from}");
                if let Some(q) = queue.get_mut(&round) {
                    q.remove(from);
                }
                return;
            }
        };

        let outcome = if broadcast {
            session.store_broadcast_message(round_msg)
        } else {
            session
                .verify_message(&round_msg)
                .and_then(|_| session.store_message(round_msg))
        };
        match outcome {
            Ok(()) => {
                entry.processed = true;
            }
            Err(e) if e.is_content_error() => {
                warn!("Dropping invalid message from {from}: {e}");
                if let Some(q) = queue.get_mut(&round) {
                    q.remove(from);
                }
            }
            Err(e) => {
                let culprit = e.culprit().unwrap_or_else(|| from.clone());
                self.abort(e.to_string(), vec![culprit]);
            }
        }
    }

    /// Absorb every queued-but-unprocessed message for the current round,
    /// broadcasts first, in sorted sender order.
    fn drain_current_round(&mut self) {
        let round = match self.current.as_ref() {
            Some(session) if !session.is_terminal() => session.number(),
            _ => return,
        };
        for broadcast in [true, false] {
            let pending: Vec<PartyId> = self
                .queue(broadcast)
                .get(&round)
                .map(|q| {
                    q.iter()
                        .filter(|(_, entry)| !entry.processed)
                        .map(|(id, _)| id.clone())
                        .collect()
                })
                .unwrap_or_default();
            for from in pending {
                if self.error.is_some() {
                    return;
                }
                // Keep the broadcast-before-p2p gate even while draining.
                if !broadcast {
                    let gated = self
                        .current
                        .as_ref()
                        .map(|s| s.expects_broadcast() && !self.is_processed(round, &from, true))
                        .unwrap_or(true);
                    if gated {
                        continue;
                    }
                }
                self.process_queued(round, &from, broadcast);
            }
        }
    }

    /// True once every expected message for the current round has arrived.
    /// Computes the round's broadcast echo hash as a side effect.
    pub fn received_all(&mut self) -> bool {
        let session = match self.current.as_ref() {
            Some(session) if !session.is_terminal() => session,
            _ => return false,
        };
        let round = session.number();
        let party_ids: Vec<PartyId> = session.helper().party_ids().to_vec();
        let n = party_ids.len();

        if session.expects_broadcast() {
            let queue = self.broadcasts.get(&round);
            for id in &party_ids {
                if queue.map_or(true, |q| !q.contains_key(id)) {
                    return false;
                }
            }
            // The echo envelope is skipped for two parties: with a single
            // peer there is nobody to cross-check against, so n = 2 gets no
            // equivocation guarantee.
            if n > 2 && !self.broadcast_hashes.contains_key(&round) {
                let mut transcript = session.helper().transcript();
                let queue = self.broadcasts.get(&round).expect("presence checked above");
                for id in &party_ids {
                    let hash = queue[id].message.hash();
                    transcript.append(&BytesWithDomain {
                        domain: "Message",
                        bytes: &hash,
                    });
                }
                self.broadcast_hashes
                    .insert(round, transcript.digest_bytes().to_vec());
            }
        }

        if session.expects_p2p() {
            let queue = self.messages.get(&round);
            for id in session.helper().other_party_ids() {
                if queue.map_or(true, |q| !q.contains_key(&id)) {
                    return false;
                }
            }
        }
        true
    }

    /// Compare the `broadcast_verification` field of every stored
    /// current-round message against the previous round's echo hash,
    /// returning the senders that disagree.
    fn check_broadcast_hash(&self) -> Vec<PartyId> {
        let round = match self.current.as_ref() {
            Some(session) => session.number(),
            None => return vec![],
        };
        let previous = match round
            .checked_sub(1)
            .and_then(|r| self.broadcast_hashes.get(&r))
        {
            Some(previous) => previous,
            None => return vec![],
        };
        let mut mismatched = Vec::new();
        for queue in [&self.messages, &self.broadcasts] {
            if let Some(q) = queue.get(&round) {
                for (from, entry) in q {
                    if from == &self.self_id {
                        continue;
                    }
                    if entry.message.broadcast_verification.as_deref() != Some(previous.as_slice())
                    {
                        mismatched.push(from.clone());
                    }
                }
            }
        }
        mismatched.sort();
        mismatched.dedup();
        mismatched
    }

    /// Finalize the current round if every expected message has arrived,
    /// returning the outbound messages for the next round. Calling this
    /// before `received_all` holds is a no-op returning no messages.
    pub fn process_round<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Vec<Message> {
        if self.result.is_some() || self.error.is_some() {
            return Vec::new();
        }

        self.drain_current_round();
        if self.error.is_some() {
            return self.out.clone();
        }

        if !self.received_all() {
            debug!("Not ready to process the round yet");
            return Vec::new();
        }

        let mismatched = self.check_broadcast_hash();
        if !mismatched.is_empty() {
            self.abort("broadcast verification failed".into(), mismatched);
            return self.out.clone();
        }

        let session = match self.current.take() {
            Some(session) => session,
            None => return Vec::new(),
        };
        let previous_round = session.number();
        self.out.clear();

        let (next, round_msgs) = match session.finalize(rng) {
            Ok(result) => result,
            Err(e) => {
                // A local failure; no peer to blame.
                self.abort(e.to_string(), vec![self.self_id.clone()]);
                return self.out.clone();
            }
        };

        match &next {
            Session::Abort(abort) => {
                let error = abort.error.clone();
                let culprits = abort.culprits.clone();
                self.current = Some(next);
                self.abort(error, culprits);
                return self.out.clone();
            }
            Session::Output(output) => {
                self.result = Some(output.result.clone());
                self.current = Some(next);
                return Vec::new();
            }
            _ => {}
        }
        self.current = Some(next);

        // Envelope each outbound message; previous_round's echo hash rides
        // along for the receivers' cross-check.
        let verification = self
            .broadcast_hashes
            .get(&previous_round)
            .cloned();
        let mut out = Vec::with_capacity(round_msgs.len());
        for round_msg in round_msgs {
            let data = match serialize!(&round_msg.content) {
                Ok(data) => data,
                Err(e) => {
                    self.abort(e.to_string(), vec![self.self_id.clone()]);
                    return self.out.clone();
                }
            };
            let msg = Message {
                ssid: self.ssid.clone(),
                from: self.self_id.clone(),
                to: round_msg.to,
                protocol: self.protocol.clone(),
                round_number: round_msg.content.round_number(),
                data,
                broadcast: round_msg.broadcast,
                broadcast_verification: verification.clone(),
            };
            if msg.broadcast {
                // Our own broadcast participates in the echo hash; it is
                // already absorbed into the round state.
                let mut own = msg.clone();
                own.to = None;
                self.broadcasts.entry(own.round_number).or_default().insert(
                    self.self_id.clone(),
                    Queued {
                        message: own,
                        processed: true,
                    },
                );
            }
            out.push(msg);
        }
        self.out = out.clone();

        // Messages that arrived early for the new round are absorbed
        // immediately.
        self.drain_current_round();
        if self.error.is_some() {
            return self.out.clone();
        }
        out
    }

    /// Record a terminal failure and queue the abort message peers use to
    /// halt.
    fn abort(&mut self, message: String, culprits: Vec<PartyId>) {
        warn!("Aborting protocol execution: {message}");
        self.error = Some(ProtocolError {
            culprits,
            message: message.clone(),
        });
        self.out.push(Message {
            ssid: self.ssid.clone(),
            from: self.self_id.clone(),
            to: None,
            protocol: self.protocol.clone(),
            round_number: 0,
            data: message.into_bytes(),
            broadcast: false,
            broadcast_verification: None,
        });
    }

    /// The result as a fallible accessor, for callers that only want the
    /// terminal state.
    pub fn final_result(&self) -> Result<ProtocolResult> {
        match (&self.result, &self.error) {
            (Some(result), _) => Ok(result.clone()),
            (None, Some(_)) => Err(crate::errors::InternalError::ProtocolError(
                self.error.as_ref().and_then(|e| e.culprits.first().cloned()),
            )),
            (None, None) => Err(CallerError::ProtocolNotFinished.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, curve::CurvePoint, polynomial::lagrange_coefficient_at_zero};
    use k256::Scalar;
    use rand::{rngs::StdRng, SeedableRng};
    use sha2::{Digest, Sha256};
    use std::collections::BTreeMap;

    fn seed_from(label: &[u8]) -> [u8; 32] {
        let mut seed = [0u8; 32];
        seed[..label.len()].copy_from_slice(label);
        seed
    }

    fn party_rngs(parties: &[PartyId], label: &[u8]) -> BTreeMap<PartyId, StdRng> {
        parties
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut seed = seed_from(label);
                seed[31] ^= i as u8 + 1;
                (id.clone(), StdRng::from_seed(seed))
            })
            .collect()
    }

    /// Deliver messages to every addressed handler.
    fn deliver(handlers: &mut BTreeMap<PartyId, Handler>, msgs: &[Message]) {
        for msg in msgs {
            for (id, handler) in handlers.iter_mut() {
                if *id == msg.from {
                    continue;
                }
                if let Some(to) = &msg.to {
                    if to != id {
                        continue;
                    }
                }
                handler.accept(msg.clone());
            }
        }
    }

    /// Drive all handlers to termination, in lockstep rounds.
    fn run_to_completion(
        handlers: &mut BTreeMap<PartyId, Handler>,
        rngs: &mut BTreeMap<PartyId, StdRng>,
    ) {
        for _ in 0..20 {
            let mut batch = Vec::new();
            for (id, handler) in handlers.iter_mut() {
                batch.extend(handler.process_round(rngs.get_mut(id).unwrap()));
            }
            deliver(handlers, &batch);
            if handlers
                .values()
                .any(|h| h.result().is_some() || h.error().is_some())
            {
                // Let everyone else catch up on buffered messages.
                for (id, handler) in handlers.iter_mut() {
                    handler.process_round(rngs.get_mut(id).unwrap());
                }
            }
            if handlers
                .values()
                .all(|h| h.result().is_some() || h.error().is_some())
            {
                return;
            }
        }
        panic!("protocol did not terminate within the round budget");
    }

    fn keygen_configs(
        parties: &[PartyId],
        threshold: usize,
        session_id: &[u8],
        rng_label: &[u8],
    ) -> BTreeMap<PartyId, Config> {
        let mut rngs = party_rngs(parties, rng_label);
        let mut handlers: BTreeMap<PartyId, Handler> = parties
            .iter()
            .map(|id| {
                let rng = rngs.get_mut(id).unwrap();
                let handler =
                    Handler::new_keygen(parties, id, threshold, Some(session_id), rng).unwrap();
                (id.clone(), handler)
            })
            .collect();
        run_to_completion(&mut handlers, &mut rngs);

        handlers
            .into_iter()
            .map(|(id, handler)| {
                let result = handler
                    .result()
                    .unwrap_or_else(|| panic!("{id} failed: {:?}", handler.error()))
                    .clone();
                match result {
                    ProtocolResult::Keygen(config) => (id, *config),
                    other => panic!("unexpected result {other:?}"),
                }
            })
            .collect()
    }

    fn test_parties() -> Vec<PartyId> {
        ["alice", "bob", "charlie"]
            .into_iter()
            .map(PartyId::from)
            .collect()
    }

    #[test]
    fn keygen_2of3_produces_consistent_configs() {
        let parties = test_parties();
        let configs = keygen_configs(&parties, 1, b"abc-2of3-test", b"test-1");

        // Everybody agrees on the joint public key.
        let public_point = configs[&parties[0]].public_point().unwrap();
        for config in configs.values() {
            assert_eq!(config.public_point().unwrap(), public_point);
        }

        // Any 2-of-3 subset of shares reconstructs the joint secret.
        for subset in [[0usize, 1], [0, 2], [1, 2]] {
            let signers: Vec<PartyId> = subset.iter().map(|&i| parties[i].clone()).collect();
            let mut reconstructed = Scalar::ZERO;
            for j in &signers {
                let coefficient = lagrange_coefficient_at_zero(j, &signers).unwrap();
                reconstructed += *configs[j].ecdsa_share() * coefficient;
            }
            assert_eq!(CurvePoint::scale_generator(&reconstructed), public_point);
        }

        // Everybody agrees on RID and chain key.
        for config in configs.values() {
            assert_eq!(config.rid(), configs[&parties[0]].rid());
            assert_eq!(config.chain_key(), configs[&parties[0]].chain_key());
        }

        // BIP32 derivation: the per-party child configs agree with the
        // child of the master public point at path m/0/0/0.
        let mut expected_point = public_point;
        let mut expected_chain = *configs[&parties[0]].chain_key();
        for _ in 0..3 {
            let (shift, next_chain) =
                crate::config::derive_scalar(&expected_point, &expected_chain, 0).unwrap();
            expected_point = expected_point + CurvePoint::scale_generator(&shift);
            expected_chain = next_chain;
        }
        for config in configs.values() {
            let child = config.derive_path("m/0/0/0").unwrap();
            assert_eq!(child.public_point().unwrap(), expected_point);
            assert_eq!(child.chain_key(), &expected_chain);
        }

        // Hardened indices are rejected without touching the config.
        for config in configs.values() {
            assert!(config.derive_path("m/0'/0/0").is_err());
            assert!(config.derive_path("m/0/0").is_err());
            assert_eq!(config.public_point().unwrap(), public_point);
        }
    }

    #[test]
    fn sign_2of2_produces_identical_valid_signatures() {
        let parties: Vec<PartyId> = ["alice", "bob"].into_iter().map(PartyId::from).collect();
        let configs = keygen_configs(&parties, 1, b"keygen-session-ab", b"test-2");
        let public_point = configs[&parties[0]].public_point().unwrap();

        let digest: [u8; 32] = Sha256::digest(b"dummy message").into();
        let mut rngs = party_rngs(&parties, b"sign-rng");
        let mut handlers: BTreeMap<PartyId, Handler> = parties
            .iter()
            .map(|id| {
                let handler = Handler::new_sign(
                    &configs[id],
                    &parties,
                    digest,
                    Some(b"sign-session-ab"),
                )
                .unwrap();
                (id.clone(), handler)
            })
            .collect();
        run_to_completion(&mut handlers, &mut rngs);

        let signatures: Vec<crate::Signature> = handlers
            .values()
            .map(|handler| match handler.result().unwrap() {
                ProtocolResult::Sign(sig) => *sig,
                other => panic!("unexpected result {other:?}"),
            })
            .collect();

        assert_eq!(signatures[0], signatures[1]);
        assert_eq!(signatures[0].to_compact(), signatures[1].to_compact());
        assert!(signatures[0].verify(&public_point, &digest));
    }

    #[test]
    fn tampered_broadcast_aborts_naming_the_culprit() {
        let parties = test_parties();
        let alice = parties[0].clone();
        let bob = parties[1].clone();
        let mut rngs = party_rngs(&parties, b"tamper-rng");
        let mut handlers: BTreeMap<PartyId, Handler> = parties
            .iter()
            .map(|id| {
                let rng = rngs.get_mut(id).unwrap();
                let handler =
                    Handler::new_keygen(&parties, id, 1, Some(b"tamper-session"), rng).unwrap();
                (id.clone(), handler)
            })
            .collect();

        for _ in 0..20 {
            let mut batch = Vec::new();
            for (id, handler) in handlers.iter_mut() {
                batch.extend(handler.process_round(rngs.get_mut(id).unwrap()));
            }
            // Flip one byte of the RID field in alice's round-3 broadcast
            // as delivered to bob; charlie receives it untouched.
            for msg in &batch {
                if msg.from == alice && msg.round_number == 3 && msg.broadcast {
                    let mut tampered = msg.clone();
                    // Skip the content enum tag; the RID array is the first
                    // field of the decommitment payload.
                    tampered.data[8] ^= 0x01;
                    handlers.get_mut(&bob).unwrap().accept(tampered);
                }
            }
            for msg in &batch {
                for (id, handler) in handlers.iter_mut() {
                    if *id == msg.from || (*id == bob && msg.from == alice && msg.round_number == 3)
                    {
                        continue;
                    }
                    if let Some(to) = &msg.to {
                        if to != id {
                            continue;
                        }
                    }
                    handler.accept(msg.clone());
                }
            }
            if handlers[&bob].error().is_some() {
                break;
            }
        }

        let error = handlers[&bob].error().expect("bob must abort").clone();
        assert!(error.culprits.contains(&alice));
        // The outbound queue carries the terminal abort message.
        let abort_msg = handlers[&bob]
            .outbound()
            .iter()
            .find(|msg| msg.round_number == 0)
            .expect("terminal abort message must be queued");
        assert_eq!(abort_msg.from, bob);
    }

    #[test]
    fn mismatched_broadcast_verification_aborts() {
        let parties = test_parties();
        let alice = parties[0].clone();
        let bob = parties[1].clone();
        let mut rngs = party_rngs(&parties, b"echo-rng");
        let mut handlers: BTreeMap<PartyId, Handler> = parties
            .iter()
            .map(|id| {
                let rng = rngs.get_mut(id).unwrap();
                let handler =
                    Handler::new_keygen(&parties, id, 1, Some(b"echo-session"), rng).unwrap();
                (id.clone(), handler)
            })
            .collect();

        for _ in 0..20 {
            let mut batch = Vec::new();
            for (id, handler) in handlers.iter_mut() {
                batch.extend(handler.process_round(rngs.get_mut(id).unwrap()));
            }
            // Simulate alice equivocating in round 2: her round-3 messages
            // to bob carry an echo hash nobody else computed.
            for msg in &mut batch {
                if msg.from == alice && msg.round_number == 3 {
                    msg.broadcast_verification = Some(vec![0u8; 32]);
                }
            }
            deliver(&mut handlers, &batch);
            if handlers[&bob].error().is_some() {
                break;
            }
        }

        let error = handlers[&bob].error().expect("bob must abort").clone();
        assert_eq!(error.message, "broadcast verification failed");
        assert_eq!(error.culprits, vec![alice]);
    }

    #[test]
    fn handler_round_trips_mid_protocol() {
        let parties = test_parties();
        let alice = parties[0].clone();

        let run = |snapshot: bool| -> Config {
            let mut rngs = party_rngs(&parties, b"resume-rng");
            let mut handlers: BTreeMap<PartyId, Handler> = parties
                .iter()
                .map(|id| {
                    let rng = rngs.get_mut(id).unwrap();
                    let handler =
                        Handler::new_keygen(&parties, id, 1, Some(b"resume-session"), rng)
                            .unwrap();
                    (id.clone(), handler)
                })
                .collect();

            let mut snapshotted = false;
            for _ in 0..20 {
                let mut batch = Vec::new();
                for (id, handler) in handlers.iter_mut() {
                    batch.extend(handler.process_round(rngs.get_mut(id).unwrap()));
                }
                deliver(&mut handlers, &batch);

                // Between rounds 2 and 3, drop alice's handler and restore
                // it from bytes.
                if snapshot && !snapshotted && handlers[&alice].current_round() == 3 {
                    let bytes = handlers[&alice].to_bytes().unwrap();
                    let restored = Handler::from_bytes(&bytes).unwrap();
                    handlers.insert(alice.clone(), restored);
                    snapshotted = true;
                }

                if handlers
                    .values()
                    .all(|h| h.result().is_some() || h.error().is_some())
                {
                    break;
                }
            }
            match handlers[&alice].result().expect("alice must finish") {
                ProtocolResult::Keygen(config) => (**config).clone(),
                other => panic!("unexpected result {other:?}"),
            }
        };

        let with_snapshot = run(true);
        let without_snapshot = run(false);
        assert_eq!(with_snapshot, without_snapshot);
    }

    #[test]
    fn process_round_is_idempotent_before_received_all() {
        let parties = test_parties();
        let alice = parties[0].clone();
        let mut rng = StdRng::from_seed(seed_from(b"idempotence"));
        let mut handler =
            Handler::new_keygen(&parties, &alice, 1, Some(b"idempotence-session"), &mut rng)
                .unwrap();

        // Round 1 finalizes unconditionally.
        let first = handler.process_round(&mut rng);
        assert!(!first.is_empty());
        assert_eq!(handler.current_round(), 2);

        // Round 2 is missing everyone else's broadcasts: no output, no
        // round advance, no state change.
        let before = handler.to_bytes().unwrap();
        let second = handler.process_round(&mut rng);
        assert!(second.is_empty());
        assert_eq!(handler.current_round(), 2);
        assert_eq!(handler.to_bytes().unwrap(), before);
    }

    #[test]
    fn can_accept_rejects_foreign_messages_without_mutation() {
        let parties = test_parties();
        let alice = parties[0].clone();
        let bob = parties[1].clone();
        let mut rng = StdRng::from_seed(seed_from(b"can-accept"));
        let mut handler =
            Handler::new_keygen(&parties, &alice, 1, Some(b"accept-session"), &mut rng).unwrap();
        let first = handler.process_round(&mut rng);
        let template = first[0].clone();
        let before = handler.to_bytes().unwrap();

        // Wrong SSID.
        let mut wrong_ssid = template.clone();
        wrong_ssid.from = bob.clone();
        wrong_ssid.ssid = vec![1, 2, 3];
        assert!(!handler.can_accept(&wrong_ssid));
        handler.accept(wrong_ssid);

        // Wrong protocol.
        let mut wrong_protocol = template.clone();
        wrong_protocol.from = bob.clone();
        wrong_protocol.protocol = "cmp/other".into();
        assert!(!handler.can_accept(&wrong_protocol));
        handler.accept(wrong_protocol);

        // Wrong recipient.
        let mut wrong_recipient = template.clone();
        wrong_recipient.from = bob.clone();
        wrong_recipient.to = Some(PartyId::from("charlie"));
        assert!(!handler.can_accept(&wrong_recipient));
        handler.accept(wrong_recipient);

        // Unknown sender.
        let mut unknown_sender = template.clone();
        unknown_sender.from = PartyId::from("mallory");
        assert!(!handler.can_accept(&unknown_sender));
        handler.accept(unknown_sender);

        // From self.
        assert!(!handler.can_accept(&template));

        assert_eq!(handler.to_bytes().unwrap(), before);
    }

    #[test]
    fn stop_emits_a_terminal_abort() {
        let parties = test_parties();
        let alice = parties[0].clone();
        let mut rng = StdRng::from_seed(seed_from(b"stop"));
        let mut handler =
            Handler::new_keygen(&parties, &alice, 1, Some(b"stop-session"), &mut rng).unwrap();

        handler.stop();
        assert!(handler.error().is_some());
        assert!(handler
            .outbound()
            .iter()
            .any(|msg| msg.round_number == 0 && !msg.data.is_empty()));
        // Terminal: no further processing.
        assert!(handler.process_round(&mut rng).is_empty());
    }

    #[test]
    fn peer_abort_message_halts_the_handler() {
        let parties = test_parties();
        let alice = parties[0].clone();
        let bob = parties[1].clone();
        let mut rng = StdRng::from_seed(seed_from(b"peer-abort"));
        let mut handler =
            Handler::new_keygen(&parties, &alice, 1, Some(b"peer-abort-session"), &mut rng)
                .unwrap();
        handler.process_round(&mut rng);

        let abort = Message {
            ssid: handler.ssid().to_vec(),
            from: bob.clone(),
            to: None,
            protocol: crate::keygen::PROTOCOL_ID.into(),
            round_number: 0,
            data: b"something went wrong".to_vec(),
            broadcast: false,
            broadcast_verification: None,
        };
        handler.accept(abort);

        let error = handler.error().expect("handler must abort").clone();
        assert_eq!(error.culprits, vec![bob]);
        assert!(error.message.contains("something went wrong"));
    }
}
