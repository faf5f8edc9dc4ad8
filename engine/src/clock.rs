//! Vector clocks: the causal ordering primitive document revisions are
//! built from.
//!
//! A clock is a map from replica_uid to a positive generation counter,
//! serialized in lexicographic replica_uid order as `uid1:gen1|uid2:gen2`.
//! The empty clock serializes to the empty string.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How two vector clocks relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    Equal,
    Newer,
    Older,
    Concurrent,
}

/// A vector clock: replica_uid -> generation, kept in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    /// The empty clock, used for documents with no known prior revision.
    pub fn empty() -> Self {
        VectorClock {
            entries: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the canonical wire form. Empty string is the empty clock.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::empty());
        }
        let mut entries = BTreeMap::new();
        for piece in s.split('|') {
            let (uid, gen_str) = piece
                .split_once(':')
                .ok_or_else(|| Error::InvalidParameter(format!("malformed clock entry: {piece}")))?;
            if uid.is_empty() {
                return Err(Error::InvalidParameter(format!(
                    "empty replica uid in clock entry: {piece}"
                )));
            }
            if gen_str.is_empty() || !gen_str.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidParameter(format!(
                    "non-numeric generation in clock entry: {piece}"
                )));
            }
            let generation: u64 = gen_str
                .parse()
                .map_err(|_| Error::InvalidParameter(format!("generation overflow: {piece}")))?;
            if entries.insert(uid.to_string(), generation).is_some() {
                return Err(Error::InvalidParameter(format!(
                    "duplicate replica uid in clock: {uid}"
                )));
            }
        }
        Ok(VectorClock { entries })
    }

    /// Canonical wire form.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(uid, gen)| format!("{uid}:{gen}"))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Generation this clock records for `replica_uid`, 0 if absent.
    pub fn generation_of(&self, replica_uid: &str) -> u64 {
        self.entries.get(replica_uid).copied().unwrap_or(0)
    }

    /// Bump `replica_uid`'s generation by one (inserting it at 1 if
    /// absent). The result is always strictly newer than `self` was.
    pub fn increment(&self, replica_uid: &str) -> Self {
        let mut entries = self.entries.clone();
        entries
            .entry(replica_uid.to_string())
            .and_modify(|g| *g += 1)
            .or_insert(1);
        VectorClock { entries }
    }

    /// Componentwise maximum over the union of keys. Idempotent and
    /// commutative.
    pub fn maximize(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (uid, gen) in &other.entries {
            entries
                .entry(uid.clone())
                .and_modify(|g| *g = (*g).max(*gen))
                .or_insert(*gen);
        }
        VectorClock { entries }
    }

    /// True iff, for every uid present in `other`, `self` has that uid
    /// with generation >= other's, and at least one strict inequality
    /// exists (a larger generation, or a uid present only in `self`).
    /// The empty clock is never newer than anything; any non-empty
    /// clock is newer than the empty clock.
    pub fn is_newer(&self, other: &Self) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        if other.entries.is_empty() {
            return true;
        }
        let mut strictly_newer = false;
        for (uid, &other_gen) in &other.entries {
            match self.entries.get(uid) {
                None => return false,
                Some(&self_gen) => {
                    if self_gen < other_gen {
                        return false;
                    } else if self_gen > other_gen {
                        strictly_newer = true;
                    }
                }
            }
        }
        if self.entries.len() > other.entries.len() {
            strictly_newer = true;
        }
        strictly_newer
    }

    /// Classify the relationship between `self` and `other`.
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        if self == other {
            ClockOrdering::Equal
        } else if self.is_newer(other) {
            ClockOrdering::Newer
        } else if other.is_newer(self) {
            ClockOrdering::Older
        } else {
            ClockOrdering::Concurrent
        }
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl TryFrom<String> for VectorClock {
    type Error = Error;
    fn try_from(value: String) -> Result<Self> {
        VectorClock::parse(&value)
    }
}

impl From<VectorClock> for String {
    fn from(value: VectorClock) -> Self {
        value.serialize()
    }
}
