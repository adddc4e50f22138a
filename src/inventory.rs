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

//! Ticket inventory ledger.
//!
//! Each [`TicketType`] row is the sole authority for one admission pool:
//! `quantity_sold` may only move through [`TicketType::reserve`] and
//! [`TicketType::release`], both executed as a guarded update inside a single
//! critical section. The check (`sold + n <= total`, sales window open) and the
//! increment happen under the same row lock, so two reservations can never both
//! observe room for the last unit.
//!
//! # Invariants
//!
//! - `0 <= quantity_sold <= quantity_total` at every instant.
//! - `quantity_total` is immutable after registration.
//! - Denial (sold out, outside the sales window) is a normal outcome, not an
//!   error.

use crate::base::{EventId, TicketTypeId};
use crate::error::EngineError;
use crate::retry::{RetryPolicy, lock_with_retry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Catalog definition used to register a ticket type with the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketTypeDef {
    pub id: TicketTypeId,
    pub event_id: EventId,
    /// Unit price charged per issued ticket.
    pub price: Decimal,
    /// Immutable ceiling on the number of tickets this pool may ever hold.
    pub quantity_total: u32,
    /// Start of the sales window (inclusive).
    pub sales_start: DateTime<Utc>,
    /// End of the sales window (exclusive).
    pub sales_end: DateTime<Utc>,
}

/// Why a reservation was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    /// Fewer than the requested units remain.
    SoldOut { remaining: u32 },
    /// The current time is outside `[sales_start, sales_end)`.
    OutsideSalesWindow,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReserveOutcome {
    /// Units were claimed; `unit_price` is the price at reservation time.
    Granted { unit_price: Decimal },
    Denied(DenyReason),
}

impl ReserveOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, ReserveOutcome::Granted { .. })
    }
}

#[derive(Debug)]
struct TicketTypeData {
    id: TicketTypeId,
    event_id: EventId,
    price: Decimal,
    quantity_total: u32,
    quantity_sold: u32,
    sales_start: DateTime<Utc>,
    sales_end: DateTime<Utc>,
}

impl TicketTypeData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.quantity_sold <= self.quantity_total,
            "Invariant violated: quantity_sold {} exceeds quantity_total {}",
            self.quantity_sold,
            self.quantity_total
        );
    }

    /// Guarded increment: succeeds only if the window is open and room remains.
    fn reserve(&mut self, n: u32, now: DateTime<Utc>) -> ReserveOutcome {
        if now < self.sales_start || now >= self.sales_end {
            return ReserveOutcome::Denied(DenyReason::OutsideSalesWindow);
        }
        let remaining = self.quantity_total - self.quantity_sold;
        if n > remaining {
            return ReserveOutcome::Denied(DenyReason::SoldOut { remaining });
        }
        self.quantity_sold += n;
        self.assert_invariants();
        ReserveOutcome::Granted {
            unit_price: self.price,
        }
    }

    /// Guarded decrement, floored at zero. Returns the units actually released.
    fn release(&mut self, n: u32) -> u32 {
        let released = n.min(self.quantity_sold);
        self.quantity_sold -= released;
        self.assert_invariants();
        released
    }
}

/// Inventory row for one ticket type.
#[derive(Debug)]
pub struct TicketType {
    inner: Mutex<TicketTypeData>,
}

impl TicketType {
    pub(crate) fn new(def: TicketTypeDef) -> Self {
        Self {
            inner: Mutex::new(TicketTypeData {
                id: def.id,
                event_id: def.event_id,
                price: def.price,
                quantity_total: def.quantity_total,
                quantity_sold: 0,
                sales_start: def.sales_start,
                sales_end: def.sales_end,
            }),
        }
    }

    /// Attempts to claim `n` units at time `now`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Contention`] when the row lock cannot be acquired within
    /// the retry budget. Denial is returned on the `Ok` side.
    pub(crate) fn reserve(
        &self,
        n: u32,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<ReserveOutcome, EngineError> {
        let mut data = lock_with_retry("ticket type", &self.inner, policy)?;
        Ok(data.reserve(n, now))
    }

    /// Returns `n` units to the pool, floored at zero sold.
    pub(crate) fn release(&self, n: u32, policy: &RetryPolicy) -> Result<u32, EngineError> {
        let mut data = lock_with_retry("ticket type", &self.inner, policy)?;
        Ok(data.release(n))
    }

    /// Release used on compensation and cancellation paths. Giving up there
    /// would strand sold units, so this variant waits for the row lock.
    pub(crate) fn release_blocking(&self, n: u32) -> u32 {
        self.inner.lock().release(n)
    }

    pub fn event_id(&self) -> EventId {
        self.inner.lock().event_id
    }

    pub fn price(&self) -> Decimal {
        self.inner.lock().price
    }

    pub fn quantity_total(&self) -> u32 {
        self.inner.lock().quantity_total
    }

    pub fn quantity_sold(&self) -> u32 {
        self.inner.lock().quantity_sold
    }

    /// Units still available for sale.
    pub fn remaining(&self) -> u32 {
        let data = self.inner.lock();
        data.quantity_total - data.quantity_sold
    }

    pub fn snapshot(&self) -> TicketTypeSnapshot {
        let data = self.inner.lock();
        TicketTypeSnapshot {
            id: data.id,
            event_id: data.event_id,
            price: data.price,
            quantity_total: data.quantity_total,
            quantity_sold: data.quantity_sold,
            remaining: data.quantity_total - data.quantity_sold,
            sales_start: data.sales_start,
            sales_end: data.sales_end,
        }
    }
}

/// Point-in-time view of a ticket type row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketTypeSnapshot {
    pub id: TicketTypeId,
    pub event_id: EventId,
    pub price: Decimal,
    pub quantity_total: u32,
    pub quantity_sold: u32,
    pub remaining: u32,
    pub sales_start: DateTime<Utc>,
    pub sales_end: DateTime<Utc>,
}
