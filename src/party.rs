// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Party identifiers and sorted party sets.

use crate::{
    errors::{CallerError, Result},
    transcript::{Transcript, TranscriptWrite},
};
use k256::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// An opaque, totally ordered identifier for a protocol participant.
///
/// IDs are short strings chosen by the calling application ("alice", "bob").
/// All per-party iteration in this crate runs in the `Ord` order of the IDs,
/// so every party computes the same echo hashes and the same sums.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(String);

impl PartyId {
    /// Wrap an application-chosen identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The scalar at which this party's share polynomial is evaluated.
    ///
    /// Derived from the ID bytes through the transcript so that it is total
    /// for IDs of any length and never zero.
    pub(crate) fn as_scalar(&self) -> Scalar {
        let mut transcript = Transcript::new("Party Evaluation Point");
        transcript.append(self);
        let mut digest = transcript.digest();
        loop {
            let scalar = digest.scalar();
            if !bool::from(k256::elliptic_curve::Field::is_zero(&scalar)) {
                return scalar;
            }
        }
    }
}

impl TranscriptWrite for PartyId {
    fn domain(&self) -> &'static str {
        "Party ID"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PartyId({})", self.0)
    }
}

impl From<&str> for PartyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A sorted, duplicate-free set of party identifiers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PartySet(Vec<PartyId>);

impl PartySet {
    /// Build a set from an arbitrary list, sorting it. Rejects duplicates.
    pub fn new(ids: &[PartyId]) -> Result<Self> {
        let mut sorted = ids.to_vec();
        sorted.sort();
        Self::from_sorted(sorted)
    }

    /// Build a set from a list that must already be sorted and unique.
    pub(crate) fn from_sorted(ids: Vec<PartyId>) -> Result<Self> {
        if ids.windows(2).any(|w| w[0] >= w[1]) {
            if ids.windows(2).any(|w| w[0] == w[1]) {
                Err(CallerError::ContainsDuplicates)?;
            }
            Err(CallerError::Unsorted)?;
        }
        Ok(Self(ids))
    }

    pub(crate) fn contains(&self, id: &PartyId) -> bool {
        self.0.binary_search(id).is_ok()
    }

    /// All members except `id`, in sorted order.
    pub(crate) fn others(&self, id: &PartyId) -> Vec<PartyId> {
        self.0.iter().filter(|j| *j != id).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, PartyId> {
        self.0.iter()
    }

    pub(crate) fn as_slice(&self) -> &[PartyId] {
        &self.0
    }
}

impl TranscriptWrite for PartySet {
    fn domain(&self) -> &'static str {
        "Party Set"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for id in &self.0 {
            bytes.extend_from_slice(&(id.as_bytes().len() as u64).to_be_bytes());
            bytes.extend_from_slice(id.as_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_sets_sort_and_reject_duplicates() {
        let ids: Vec<PartyId> = ["charlie", "alice", "bob"]
            .into_iter()
            .map(PartyId::from)
            .collect();
        let set = PartySet::new(&ids).unwrap();
        let sorted: Vec<_> = set.iter().map(|id| id.to_string()).collect();
        assert_eq!(sorted, vec!["alice", "bob", "charlie"]);

        let dupes: Vec<PartyId> = ["alice", "alice"].into_iter().map(PartyId::from).collect();
        assert!(PartySet::new(&dupes).is_err());
    }

    #[test]
    fn evaluation_points_are_distinct_and_nonzero() {
        let alice = PartyId::from("alice").as_scalar();
        let bob = PartyId::from("bob").as_scalar();
        assert_ne!(alice, bob);
        assert!(!bool::from(k256::elliptic_curve::Field::is_zero(&alice)));
    }

    #[test]
    fn from_sorted_enforces_order() {
        let ids: Vec<PartyId> = ["bob", "alice"].into_iter().map(PartyId::from).collect();
        assert!(PartySet::from_sorted(ids).is_err());
    }
}
