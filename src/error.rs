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

//! Error types for engine operations.
//!
//! Business denials (sold out, already used, schedule conflict) are *not*
//! errors; every operation returns them as typed outcome values on the `Ok`
//! side so callers can branch on them. This enum covers the rest: contract
//! violations, unknown entities, invalid state transitions, and transient
//! contention.

use crate::base::{OrderId, SessionId, TicketId, TicketTypeId};
use crate::order::OrderStatus;
use thiserror::Error;

/// Engine operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Request rejected before any storage access (zero quantity, malformed
    /// QR code, empty scanner identity, inverted time interval).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Ticket type is not registered with the engine.
    #[error("unknown ticket type {0}")]
    UnknownTicketType(TicketTypeId),

    /// Order does not exist.
    #[error("unknown order {0}")]
    UnknownOrder(OrderId),

    /// Session does not exist.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// Ticket type id registered twice.
    #[error("ticket type {0} already registered")]
    DuplicateTicketType(TicketTypeId),

    /// A second acceptance was recorded for the same ticket.
    #[error("check-in already recorded for ticket {0}")]
    DuplicateAcceptance(TicketId),

    /// Order transition attempted from a state that does not allow it.
    #[error("order {order} is {actual}, transition not allowed")]
    InvalidState { order: OrderId, actual: OrderStatus },

    /// Row lock could not be acquired within the retry budget.
    ///
    /// Safe to re-issue: every mutation re-checks its guard, so a retried
    /// reserve cannot double-count inventory and a retried check-in on a ticket
    /// that already went through reports `AlreadyUsed`.
    #[error("contention on {entity} row after {attempts} attempts")]
    Contention { entity: &'static str, attempts: u32 },
}

impl EngineError {
    /// Whether the caller may safely re-issue the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Contention { .. })
    }
}
