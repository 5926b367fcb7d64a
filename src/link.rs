//! Versioned link: the two-slot rollback primitive that every dangerous
//! pointer in the engine (the three root links, and the link embedded
//! in each document-index entry) is built from.
//!
//! A link holds two `(counter, page_id)` slots. Writers always touch
//! exactly one slot per update — the uninitialised one if there is
//! one, otherwise the older of the two — which is what keeps the two
//! slots' counters from drifting by more than one tick apart, and is
//! the property [`crate::version::VersionCounter::compare`] relies on.

use parking_lot::Mutex;

use crate::version::VersionCounter;

pub const ENCODED_LEN: usize = 10;

const UNINITIALISED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    version: VersionCounter,
    page_id: i32,
}

impl Slot {
    const fn uninitialised() -> Self {
        Self { version: VersionCounter::new(0), page_id: UNINITIALISED }
    }

    const fn is_initialised(&self) -> bool {
        self.page_id != UNINITIALISED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkState {
    a: Slot,
    b: Slot,
}

/// Which of a link's two targets to retrieve: the current value or
/// the one it rolled over from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    Newest,
    Previous,
}

pub struct VersionedLink {
    state: Mutex<LinkState>,
}

impl VersionedLink {
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(LinkState { a: Slot::uninitialised(), b: Slot::uninitialised() }) }
    }

    #[must_use]
    pub fn decode(bytes: &[u8; ENCODED_LEN]) -> Self {
        let a = Slot { version: VersionCounter::new(bytes[0]), page_id: read_i32(&bytes[1..5]) };
        let b = Slot { version: VersionCounter::new(bytes[5]), page_id: read_i32(&bytes[6..10]) };
        Self { state: Mutex::new(LinkState { a, b }) }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let s = self.state.lock();
        let mut out = [0u8; ENCODED_LEN];
        out[0] = s.a.version.0;
        out[1..5].copy_from_slice(&s.a.page_id.to_be_bytes());
        out[5] = s.b.version.0;
        out[6..10].copy_from_slice(&s.b.page_id.to_be_bytes());
        out
    }

    /// Returns the page id for the requested revision, or `None` if
    /// that revision has never been written.
    #[must_use]
    pub fn try_get(&self, revision: Revision) -> Option<i32> {
        let s = self.state.lock();
        let (newer, older) = order(&s);
        match revision {
            Revision::Newest => newer.filter(|s| s.is_initialised()).map(|s| s.page_id),
            Revision::Previous => older.filter(|s| s.is_initialised()).map(|s| s.page_id),
        }
    }

    /// Writes `page_id` as the new current value, returning the page id
    /// that was displaced (`-1` if the link had no prior value in the
    /// slot that got overwritten).
    ///
    /// # Panics
    /// Panics if the link is found with both slots initialised and
    /// equal counters — an invariant violation that indicates a bug
    /// elsewhere in the engine, not a recoverable condition.
    pub fn write_new(&self, page_id: i32) -> i32 {
        let mut s = self.state.lock();
        if !s.a.is_initialised() {
            s.a = Slot { version: VersionCounter::new(0), page_id };
            return UNINITIALISED;
        }
        if !s.b.is_initialised() {
            s.b = Slot { version: s.a.version.next(), page_id };
            return UNINITIALISED;
        }
        assert!(
            s.a.version.compare(s.b.version) != 0,
            "versioned link invariant violated: both slots initialised with equal counters"
        );
        let write_to_a = s.a.version.compare(s.b.version) < 0;
        let (displaced, newer_version) = if write_to_a {
            (s.a.page_id, s.b.version)
        } else {
            (s.b.page_id, s.a.version)
        };
        let new_slot = Slot { version: newer_version.next(), page_id };
        if write_to_a {
            s.a = new_slot;
        } else {
            s.b = new_slot;
        }
        displaced
    }
}

impl Default for VersionedLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Orders the two slots as (newer, older). If only one slot is
/// initialised it is reported as newer and the uninitialised slot as
/// older (so `try_get(Previous)` correctly reports not-found).
fn order(s: &LinkState) -> (Option<Slot>, Option<Slot>) {
    match (s.a.is_initialised(), s.b.is_initialised()) {
        (false, false) => (None, None),
        (true, false) => (Some(s.a), Some(s.b)),
        (false, true) => (Some(s.b), Some(s.a)),
        (true, true) => {
            if s.a.version.compare(s.b.version) >= 0 {
                (Some(s.a), Some(s.b))
            } else {
                (Some(s.b), Some(s.a))
            }
        }
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_be_bytes(bytes.try_into().expect("4-byte slice"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_link_has_no_revisions() {
        let link = VersionedLink::new();
        assert_eq!(link.try_get(Revision::Newest), None);
        assert_eq!(link.try_get(Revision::Previous), None);
    }

    #[test]
    fn first_write_fills_slot_a_and_displaces_nothing() {
        let link = VersionedLink::new();
        assert_eq!(link.write_new(10), -1);
        assert_eq!(link.try_get(Revision::Newest), Some(10));
        assert_eq!(link.try_get(Revision::Previous), None);
    }

    #[test]
    fn second_write_fills_slot_b_newest_tracks_latest() {
        let link = VersionedLink::new();
        link.write_new(10);
        assert_eq!(link.write_new(20), -1);
        assert_eq!(link.try_get(Revision::Newest), Some(20));
        assert_eq!(link.try_get(Revision::Previous), Some(10));
    }

    #[test]
    fn third_write_overwrites_older_slot_and_displaces_it() {
        let link = VersionedLink::new();
        link.write_new(10);
        link.write_new(20);
        let displaced = link.write_new(30);
        assert_eq!(displaced, 10);
        assert_eq!(link.try_get(Revision::Newest), Some(30));
        assert_eq!(link.try_get(Revision::Previous), Some(20));
    }

    #[test]
    fn many_writes_keep_newest_and_previous_consistent() {
        let link = VersionedLink::new();
        let mut prev_two: Vec<i32> = Vec::new();
        for i in 0..200i32 {
            let displaced = link.write_new(i);
            if i >= 2 {
                assert_eq!(displaced, prev_two[prev_two.len() - 2]);
            }
            prev_two.push(i);
        }
        assert_eq!(link.try_get(Revision::Newest), Some(199));
        assert_eq!(link.try_get(Revision::Previous), Some(198));
    }

    #[test]
    fn freeze_then_defrost_round_trips() {
        let link = VersionedLink::new();
        link.write_new(5);
        link.write_new(9);
        let bytes = link.encode();
        let restored = VersionedLink::decode(&bytes);
        assert_eq!(restored.try_get(Revision::Newest), link.try_get(Revision::Newest));
        assert_eq!(restored.try_get(Revision::Previous), link.try_get(Revision::Previous));
        assert_eq!(restored.encode(), bytes);
    }
}
