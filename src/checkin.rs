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

//! Gate check-in log.
//!
//! Append-only record of accepted scans, at most one per ticket. Only the
//! winner of the ticket row's `Valid -> Used` race appends here, so the log
//! holding exactly one acceptance per used ticket is a consequence of the
//! conditional update, and the entry API makes a duplicate append loud instead
//! of silent.

use crate::base::TicketId;
use crate::error::EngineError;
use crate::order::TicketSnapshot;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;

/// One accepted scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInRecord {
    pub ticket_id: TicketId,
    pub scanned_at: DateTime<Utc>,
    /// Gate or operator identity that performed the scan.
    pub scanner: String,
}

/// Why a scan was rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RejectReason {
    /// No ticket carries this code.
    Unknown,
    /// The ticket was cancelled before the scan.
    Cancelled,
    /// The ticket was already consumed; `checked_in_at` is the original
    /// acceptance time and is stable across repeated scans.
    AlreadyUsed { checked_in_at: DateTime<Utc> },
}

/// Result of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CheckInOutcome {
    Accepted(TicketSnapshot),
    Rejected(RejectReason),
}

impl CheckInOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CheckInOutcome::Accepted(_))
    }
}

/// Thread-safe acceptance log.
///
/// Combines a [`DashMap`] for O(1) per-ticket duplicate detection with a
/// [`SegQueue`] preserving acceptance order for reporting.
#[derive(Debug, Default)]
pub struct CheckInLog {
    /// Acceptance per ticket.
    records: DashMap<TicketId, Arc<CheckInRecord>>,
    /// Ticket ids in acceptance order.
    sequence: SegQueue<TicketId>,
}

impl CheckInLog {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            sequence: SegQueue::new(),
        }
    }

    /// Appends an acceptance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateAcceptance`] if the ticket already has
    /// one. The check-in conditional update admits a single winner per ticket,
    /// so this firing means a caller bypassed it.
    pub(crate) fn record(&self, record: CheckInRecord) -> Result<(), EngineError> {
        let ticket_id = record.ticket_id;
        match self.records.entry(ticket_id) {
            Entry::Occupied(_) => Err(EngineError::DuplicateAcceptance(ticket_id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(record));
                self.sequence.push(ticket_id);
                Ok(())
            }
        }
    }

    /// The acceptance for a ticket, if it was ever checked in.
    pub fn acceptance(&self, ticket_id: &TicketId) -> Option<Arc<CheckInRecord>> {
        self.records.get(ticket_id).map(|r| Arc::clone(r.value()))
    }

    /// Number of accepted scans.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drains the acceptance ordering and returns the records in the order
    /// they were accepted. Per-ticket lookups via [`CheckInLog::acceptance`]
    /// keep working afterwards; only the ordering is consumed.
    pub fn drain_ordered(&self) -> Vec<Arc<CheckInRecord>> {
        let mut out = Vec::with_capacity(self.records.len());
        while let Some(ticket_id) = self.sequence.pop() {
            if let Some(record) = self.records.get(&ticket_id) {
                out.push(Arc::clone(record.value()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(ticket: u64, minute: u32) -> CheckInRecord {
        CheckInRecord {
            ticket_id: TicketId(ticket),
            scanned_at: Utc.with_ymd_and_hms(2026, 6, 1, 18, minute, 0).unwrap(),
            scanner: "gate-a".to_string(),
        }
    }

    #[test]
    fn records_single_acceptance() {
        let log = CheckInLog::new();
        log.record(record_at(1, 0)).unwrap();
        assert_eq!(log.len(), 1);

        let record = log.acceptance(&TicketId(1)).unwrap();
        assert_eq!(record.scanner, "gate-a");
    }

    #[test]
    fn second_acceptance_is_rejected() {
        let log = CheckInLog::new();
        log.record(record_at(1, 0)).unwrap();
        let result = log.record(record_at(1, 5));
        assert_eq!(result, Err(EngineError::DuplicateAcceptance(TicketId(1))));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn drain_preserves_acceptance_order() {
        let log = CheckInLog::new();
        for ticket in [3u64, 1, 2] {
            log.record(record_at(ticket, ticket as u32)).unwrap();
        }

        let drained = log.drain_ordered();
        let ids: Vec<u64> = drained.iter().map(|r| r.ticket_id.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);

        // Lookups survive the drain.
        assert!(log.acceptance(&TicketId(1)).is_some());
        assert!(log.drain_ordered().is_empty());
    }
}
