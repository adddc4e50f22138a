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

//! Order and ticket rows.
//!
//! State machines:
//!
//! - Order:  `Pending ──confirm──► Paid`, `Pending/Paid ──cancel──► Cancelled`
//! - Ticket: `Valid ──check-in──► Used`, `Valid ──cancel──► Cancelled`
//!
//! A `Used` ticket survives order cancellation as consumed history; it is never
//! flipped back to `Valid` and its inventory unit is never returned. Every
//! transition is a guarded update under the row lock, so concurrent callers
//! race for a single winner instead of double-applying.

use crate::base::{EventId, OrderId, QrCode, TicketId, TicketTypeId};
use crate::error::EngineError;
use crate::inventory::DenyReason;
use crate::retry::{RetryPolicy, lock_with_retry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{label}")
    }
}

/// Ticket lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Valid,
    Used,
    Cancelled,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TicketStatus::Valid => "VALID",
            TicketStatus::Used => "USED",
            TicketStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{label}")
    }
}

/// One (ticket type, quantity, attendee) entry of a purchase request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    /// Attendee name stamped on each ticket issued for this entry.
    pub attendee: String,
}

/// Result of a purchase request.
///
/// Denial carries the first line item that could not be reserved; every
/// reservation granted before it has already been released when this value is
/// returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CreateOrderOutcome {
    Placed(OrderSnapshot),
    Denied {
        ticket_type_id: TicketTypeId,
        reason: DenyReason,
    },
}

impl CreateOrderOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, CreateOrderOutcome::Placed(_))
    }
}

#[derive(Debug)]
struct OrderData {
    id: OrderId,
    event_id: EventId,
    buyer: String,
    status: OrderStatus,
    total: Decimal,
    created_at: DateTime<Utc>,
    ticket_ids: Vec<TicketId>,
}

/// Order row.
#[derive(Debug)]
pub struct Order {
    inner: Mutex<OrderData>,
}

impl Order {
    pub(crate) fn new(
        id: OrderId,
        event_id: EventId,
        buyer: String,
        total: Decimal,
        created_at: DateTime<Utc>,
        ticket_ids: Vec<TicketId>,
    ) -> Self {
        Self {
            inner: Mutex::new(OrderData {
                id,
                event_id,
                buyer,
                status: OrderStatus::Pending,
                total,
                created_at,
                ticket_ids,
            }),
        }
    }

    /// Guarded `Pending -> Paid`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] when the order is not `Pending`.
    pub(crate) fn confirm(&self, policy: &RetryPolicy) -> Result<(), EngineError> {
        let mut data = lock_with_retry("order", &self.inner, policy)?;
        if data.status != OrderStatus::Pending {
            return Err(EngineError::InvalidState {
                order: data.id,
                actual: data.status,
            });
        }
        data.status = OrderStatus::Paid;
        Ok(())
    }

    /// Guarded `Pending/Paid -> Cancelled`. Returns the owned ticket ids so the
    /// caller can cascade.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] when the order is already `Cancelled`.
    pub(crate) fn cancel(&self, policy: &RetryPolicy) -> Result<Vec<TicketId>, EngineError> {
        let mut data = lock_with_retry("order", &self.inner, policy)?;
        if data.status == OrderStatus::Cancelled {
            return Err(EngineError::InvalidState {
                order: data.id,
                actual: data.status,
            });
        }
        data.status = OrderStatus::Cancelled;
        Ok(data.ticket_ids.clone())
    }

    /// Guarded expiry check used by the sweep: cancels only a `Pending` order
    /// created at or before `cutoff`. `None` means the order was not eligible.
    pub(crate) fn cancel_if_expired(
        &self,
        cutoff: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<Option<Vec<TicketId>>, EngineError> {
        let mut data = lock_with_retry("order", &self.inner, policy)?;
        if data.status != OrderStatus::Pending || data.created_at > cutoff {
            return Ok(None);
        }
        data.status = OrderStatus::Cancelled;
        Ok(Some(data.ticket_ids.clone()))
    }

    pub fn status(&self) -> OrderStatus {
        self.inner.lock().status
    }

    pub fn total(&self) -> Decimal {
        self.inner.lock().total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.lock().created_at
    }

    pub(crate) fn head(&self) -> OrderHead {
        let data = self.inner.lock();
        OrderHead {
            id: data.id,
            event_id: data.event_id,
            buyer: data.buyer.clone(),
            status: data.status,
            total: data.total,
            created_at: data.created_at,
            ticket_ids: data.ticket_ids.clone(),
        }
    }
}

/// Order fields without the ticket rows; the engine joins tickets in when
/// building an [`OrderSnapshot`].
#[derive(Debug, Clone)]
pub(crate) struct OrderHead {
    pub id: OrderId,
    pub event_id: EventId,
    pub buyer: String,
    pub status: OrderStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub ticket_ids: Vec<TicketId>,
}

/// Point-in-time view of an order and its tickets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub event_id: EventId,
    pub buyer: String,
    pub status: OrderStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<TicketSnapshot>,
}

#[derive(Debug)]
struct TicketData {
    id: TicketId,
    order_id: OrderId,
    ticket_type_id: TicketTypeId,
    holder: String,
    qr_code: QrCode,
    status: TicketStatus,
    checked_in_at: Option<DateTime<Utc>>,
}

/// Outcome of a guarded `Valid -> Used` attempt. Exactly one caller per ticket
/// ever observes `Won`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UseAttempt {
    Won(TicketSnapshot),
    AlreadyUsed { checked_in_at: DateTime<Utc> },
    Cancelled,
}

/// Ticket row.
#[derive(Debug)]
pub struct Ticket {
    inner: Mutex<TicketData>,
}

impl Ticket {
    pub(crate) fn new(
        id: TicketId,
        order_id: OrderId,
        ticket_type_id: TicketTypeId,
        holder: String,
        qr_code: QrCode,
    ) -> Self {
        Self {
            inner: Mutex::new(TicketData {
                id,
                order_id,
                ticket_type_id,
                holder,
                qr_code,
                status: TicketStatus::Valid,
                checked_in_at: None,
            }),
        }
    }

    /// Guarded `Valid -> Used`, stamping `checked_in_at`.
    ///
    /// Under concurrent scans of the same code the row lock serializes the
    /// attempts: the first caller finds `Valid` and wins, every later caller
    /// finds `Used` and gets the original timestamp back.
    pub(crate) fn mark_used(
        &self,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<UseAttempt, EngineError> {
        let mut data = lock_with_retry("ticket", &self.inner, policy)?;
        match data.status {
            TicketStatus::Valid => {
                data.status = TicketStatus::Used;
                data.checked_in_at = Some(now);
                Ok(UseAttempt::Won(snapshot_of(&data)))
            }
            TicketStatus::Used => {
                // checked_in_at is stamped together with the Used status.
                let checked_in_at = data.checked_in_at.unwrap_or(now);
                Ok(UseAttempt::AlreadyUsed { checked_in_at })
            }
            TicketStatus::Cancelled => Ok(UseAttempt::Cancelled),
        }
    }

    /// Guarded `Valid -> Cancelled` used by order cancellation. Returns the
    /// ticket type to return one unit to when this call flipped the status;
    /// `None` when the ticket was already `Used` or `Cancelled`.
    ///
    /// Waits for the row lock: cancellation must run to completion once the
    /// order row has committed to `Cancelled`.
    pub(crate) fn cancel_if_valid(&self) -> Option<TicketTypeId> {
        let mut data = self.inner.lock();
        if data.status != TicketStatus::Valid {
            return None;
        }
        data.status = TicketStatus::Cancelled;
        Some(data.ticket_type_id)
    }

    pub fn status(&self) -> TicketStatus {
        self.inner.lock().status
    }

    pub fn order_id(&self) -> OrderId {
        self.inner.lock().order_id
    }

    pub fn snapshot(&self) -> TicketSnapshot {
        snapshot_of(&self.inner.lock())
    }
}

fn snapshot_of(data: &TicketData) -> TicketSnapshot {
    TicketSnapshot {
        id: data.id,
        order_id: data.order_id,
        ticket_type_id: data.ticket_type_id,
        holder: data.holder.clone(),
        qr_code: data.qr_code.clone(),
        status: data.status,
        checked_in_at: data.checked_in_at,
    }
}

/// Point-in-time view of a ticket row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketSnapshot {
    pub id: TicketId,
    pub order_id: OrderId,
    pub ticket_type_id: TicketTypeId,
    pub holder: String,
    pub qr_code: QrCode,
    pub status: TicketStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
}
