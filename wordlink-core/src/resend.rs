//! Resend ledger: per-peer FIFO of message sends awaiting retry.
//!
//! All fail-count bookkeeping happens in [`ResendLedger::record_failure`], whether the failure
//! came from a first attempt or from a sweep, so the ceiling is checked in exactly one place.

use std::collections::{HashMap, VecDeque};

use crate::outbound::{MessageSend, PendingSend};
use crate::peer::PeerAddress;
use crate::protocol::MAX_SEND_FAIL;

/// What happened to an entry after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Still queued; `fail_count` failed attempts so far.
    Retrying { fail_count: u32 },
    /// Reached the ceiling and was removed from the ledger.
    Exhausted(PendingSend),
}

pub struct ResendLedger {
    queues: HashMap<PeerAddress, VecDeque<PendingSend>>,
    max_fail: u32,
}

impl ResendLedger {
    pub fn new() -> Self {
        Self::with_max_fail(MAX_SEND_FAIL)
    }

    fn with_max_fail(max_fail: u32) -> Self {
        Self {
            queues: HashMap::new(),
            max_fail: max_fail.max(1),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.queues.values().any(|q| !q.is_empty())
    }

    pub fn has_pending_for(&self, peer: &PeerAddress) -> bool {
        self.queues.get(peer).is_some_and(|q| !q.is_empty())
    }

    /// Total queued entries across all peers.
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Peers with something queued, sorted so sweeps are deterministic.
    pub fn peers(&self) -> Vec<PeerAddress> {
        let mut peers: Vec<PeerAddress> = self
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(p, _)| p.clone())
            .collect();
        peers.sort();
        peers
    }

    /// Oldest entry for `peer`: the next one a sweep must try.
    pub fn front(&self, peer: &PeerAddress) -> Option<&PendingSend> {
        self.queues.get(peer).and_then(VecDeque::front)
    }

    /// Entries for `peer` in retry order.
    pub fn pending_for(&self, peer: &PeerAddress) -> Vec<&PendingSend> {
        self.queues
            .get(peer)
            .map(|q| q.iter().collect())
            .unwrap_or_default()
    }

    /// The front entry was delivered: remove it and discard its fail count.
    pub fn complete_front(&mut self, peer: &PeerAddress) -> Option<PendingSend> {
        let q = self.queues.get_mut(peer)?;
        let done = q.pop_front();
        if q.is_empty() {
            self.queues.remove(peer);
        }
        done
    }

    /// The front entry failed again. It keeps its place at the front unless exhausted.
    pub fn fail_front(&mut self, peer: &PeerAddress) -> Option<RetryOutcome> {
        let pending = self.queues.get_mut(peer)?.pop_front()?;
        Some(self.record_failure(pending, true))
    }

    /// A new send failed on its first attempt: queue it behind older entries.
    pub fn fail_new(&mut self, send: MessageSend) -> RetryOutcome {
        self.record_failure(PendingSend::new(send), false)
    }

    /// Queue a send that was not attempted because older entries for its peer are still pending.
    pub fn defer(&mut self, send: MessageSend) {
        let pending = PendingSend::new(send);
        self.queues
            .entry(pending.send.peer.clone())
            .or_default()
            .push_back(pending);
    }

    /// Remove every entry for a game that no longer exists. Returns what was removed.
    pub fn drop_game(&mut self, game_id: i32) -> Vec<PendingSend> {
        let mut dropped = Vec::new();
        for q in self.queues.values_mut() {
            let (gone, keep): (VecDeque<_>, VecDeque<_>) =
                q.drain(..).partition(|p| p.send.game_id == game_id);
            *q = keep;
            dropped.extend(gone);
        }
        self.queues.retain(|_, q| !q.is_empty());
        dropped
    }

    fn record_failure(&mut self, mut pending: PendingSend, at_front: bool) -> RetryOutcome {
        pending.fail_count += 1;
        let peer = pending.send.peer.clone();
        if pending.fail_count >= self.max_fail {
            if self.queues.get(&peer).is_some_and(VecDeque::is_empty) {
                self.queues.remove(&peer);
            }
            return RetryOutcome::Exhausted(pending);
        }
        let fail_count = pending.fail_count;
        let q = self.queues.entry(peer).or_default();
        if at_front {
            q.push_front(pending);
        } else {
            q.push_back(pending);
        }
        RetryOutcome::Retrying { fail_count }
    }
}

impl Default for ResendLedger {
    fn default() -> Self {
        Self::new()
    }
}
