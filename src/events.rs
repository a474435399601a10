// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Append-only journal of ledger events.
//!
//! Every successful mutation is recorded with a sequence number. The full
//! history is kept for the life of the bond; a separate pending queue lets
//! a consumer pick up new events without rescanning.

use crate::base::{AccountId, Amount, CouponIndex, Timestamp};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Subscribed {
        investor: AccountId,
        amount: Amount,
    },
    IssuanceClosed {
        issuance_date: Timestamp,
    },
    ProceedsWithdrawn {
        issuer: AccountId,
        amount: Amount,
    },
    BondClaimed {
        investor: AccountId,
        receipt: Amount,
        units: Amount,
    },
    CouponDeposited {
        index: CouponIndex,
        amount: Amount,
    },
    CouponClaimed {
        investor: AccountId,
        index: CouponIndex,
        payout: Amount,
    },
    DefaultTriggered {
        index: CouponIndex,
        due: Timestamp,
    },
    PrincipalReturned {
        amount: Amount,
    },
    Redeemed {
        investor: AccountId,
        units: Amount,
        payout: Amount,
    },
    UnitsTransferred {
        from: AccountId,
        to: AccountId,
        units: Amount,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerEvent {
    pub seq: u64,
    pub at: Timestamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Thread-safe event journal.
///
/// Combines a [`DashMap`] keyed by sequence number for the permanent
/// history with a [`SegQueue`] of events not yet drained by a consumer.
#[derive(Debug, Default)]
pub struct EventLog {
    history: DashMap<u64, Arc<LedgerEvent>>,
    pending: SegQueue<Arc<LedgerEvent>>,
    next_seq: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns it with its sequence number.
    pub fn record(&self, at: Timestamp, kind: EventKind) -> Arc<LedgerEvent> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = Arc::new(LedgerEvent { seq, at, kind });
        self.history.insert(seq, Arc::clone(&event));
        self.pending.push(Arc::clone(&event));
        event
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn get(&self, seq: u64) -> Option<Arc<LedgerEvent>> {
        self.history.get(&seq).map(|entry| Arc::clone(entry.value()))
    }

    /// Full history in sequence order.
    pub fn history(&self) -> Vec<Arc<LedgerEvent>> {
        let mut events: Vec<_> = self
            .history
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        events.sort_by_key(|event| event.seq);
        events
    }

    /// Removes and returns events recorded since the last drain.
    pub fn drain_pending(&self) -> Vec<Arc<LedgerEvent>> {
        std::iter::from_fn(|| self.pending.pop()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_assigns_increasing_sequence() {
        let log = EventLog::new();
        let first = log.record(Timestamp(1), EventKind::PrincipalReturned { amount: 5 });
        let second = log.record(
            Timestamp(2),
            EventKind::IssuanceClosed {
                issuance_date: Timestamp(2),
            },
        );
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1).unwrap().at, Timestamp(2));
    }

    #[test]
    fn drain_empties_pending_but_keeps_history() {
        let log = EventLog::new();
        log.record(Timestamp(1), EventKind::PrincipalReturned { amount: 5 });
        log.record(Timestamp(1), EventKind::PrincipalReturned { amount: 6 });

        let drained = log.drain_pending();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].seq, 0);
        assert!(log.drain_pending().is_empty());
        assert_eq!(log.history().len(), 2);
    }

    #[test]
    fn events_serialize_with_flat_tag() {
        let log = EventLog::new();
        let event = log.record(
            Timestamp(7),
            EventKind::CouponClaimed {
                investor: AccountId(3),
                index: CouponIndex(1),
                payout: 1_250,
            },
        );
        let json = serde_json::to_value(&*event).unwrap();
        assert_eq!(json["type"], "coupon_claimed");
        assert_eq!(json["seq"], 0);
        assert_eq!(json["at"], 7);
        assert_eq!(json["investor"], 3);
        assert_eq!(json["payout"], 1_250);
    }
}
