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

//! Ticketing engine.
//!
//! The [`Engine`] is the central component that manages ticket inventory,
//! order and ticket lifecycles, gate check-in, and session scheduling. It
//! processes purchases against per-ticket-type inventory pools, issues
//! tickets with unguessable QR codes, validates scans at most once per
//! ticket, and admits room assignments only into free slots.
//!
//! # Operations
//!
//! - **Reserve/Release**: claim or return inventory units of a ticket type.
//! - **CreateOrder**: all-or-nothing purchase across line items; partial
//!   failures release every reservation already granted in the call.
//! - **ConfirmPayment/CancelOrder**: order status transitions; cancellation
//!   cascades to tickets and returns their inventory.
//! - **CheckIn**: consume a scanned QR code exactly once.
//! - **ValidateSession/UpsertSession**: room schedule conflict admission.
//!
//! # Thread Safety
//!
//! The engine uses [`DashMap`] registries for concurrent access to rows. Every
//! admission decision is a guarded update inside a single row-lock critical
//! section, never a read-then-write round trip, so concurrent requests for the
//! last inventory unit or the same QR code admit exactly one winner. No
//! operation holds two row locks at once; multi-row flows sequence single-row
//! updates with compensation instead.

use crate::base::{
    Clock, EventId, OrderId, QrCode, RoomId, SessionId, SystemClock, TicketId, TicketTypeId,
};
use crate::checkin::{CheckInLog, CheckInOutcome, CheckInRecord, RejectReason};
use crate::error::EngineError;
use crate::inventory::{ReserveOutcome, TicketType, TicketTypeDef, TicketTypeSnapshot};
use crate::order::{
    CreateOrderOutcome, LineItem, Order, OrderSnapshot, Ticket, TicketSnapshot, UseAttempt,
};
use crate::retry::RetryPolicy;
use crate::schedule::{ScheduleBoard, ScheduleOutcome, Session};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a `Pending` order may await payment confirmation before
    /// [`Engine::sweep_expired`] cancels it and returns its inventory.
    pub reservation_timeout: chrono::Duration,
    /// Row lock acquisition budget for conditional updates.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_timeout: chrono::Duration::minutes(15),
            retry: RetryPolicy::default(),
        }
    }
}

/// Ticketing engine managing inventory, orders, tickets, check-ins, and the
/// session schedule.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    /// Inventory rows indexed by ticket type id.
    ticket_types: DashMap<TicketTypeId, Arc<TicketType>>,
    /// Order rows indexed by order id.
    orders: DashMap<OrderId, Arc<Order>>,
    /// Ticket rows indexed by ticket id.
    tickets: DashMap<TicketId, Arc<Ticket>>,
    /// QR code to ticket id lookup for gate scans.
    tickets_by_qr: DashMap<QrCode, TicketId>,
    /// Accepted scans, at most one per ticket.
    check_ins: CheckInLog,
    /// Session schedule with per-room conflict admission.
    schedule: ScheduleBoard,
    order_seq: AtomicU64,
    ticket_seq: AtomicU64,
}

impl Engine {
    /// Creates an engine with default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            ticket_types: DashMap::new(),
            orders: DashMap::new(),
            tickets: DashMap::new(),
            tickets_by_qr: DashMap::new(),
            check_ins: CheckInLog::new(),
            schedule: ScheduleBoard::new(),
            order_seq: AtomicU64::new(0),
            ticket_seq: AtomicU64::new(0),
        }
    }

    // === Inventory ===

    /// Registers a ticket type from catalog data with zero units sold.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidArgument`] - Inverted sales window.
    /// - [`EngineError::DuplicateTicketType`] - Id already registered.
    pub fn register_ticket_type(&self, def: TicketTypeDef) -> Result<(), EngineError> {
        if def.sales_start >= def.sales_end {
            return Err(EngineError::InvalidArgument(
                "sales window must satisfy start < end",
            ));
        }
        match self.ticket_types.entry(def.id) {
            Entry::Occupied(_) => Err(EngineError::DuplicateTicketType(def.id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(TicketType::new(def)));
                Ok(())
            }
        }
    }

    /// Attempts to claim `n` units of a ticket type.
    ///
    /// Denial (sold out, outside the sales window) is an `Ok` outcome; the
    /// caller decides how to present it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidArgument`] - `n` is zero.
    /// - [`EngineError::UnknownTicketType`] - Unregistered id.
    /// - [`EngineError::Contention`] - Row lock budget exhausted; retryable.
    pub fn reserve(
        &self,
        ticket_type_id: TicketTypeId,
        n: u32,
    ) -> Result<ReserveOutcome, EngineError> {
        if n == 0 {
            return Err(EngineError::InvalidArgument("quantity must be at least 1"));
        }
        let row = self.ticket_type_row(&ticket_type_id)?;
        row.reserve(n, self.clock.now(), &self.config.retry)
    }

    /// Returns `n` units of a ticket type to the pool, floored at zero sold.
    /// Returns the number of units actually released.
    pub fn release(&self, ticket_type_id: TicketTypeId, n: u32) -> Result<u32, EngineError> {
        if n == 0 {
            return Err(EngineError::InvalidArgument("quantity must be at least 1"));
        }
        let row = self.ticket_type_row(&ticket_type_id)?;
        row.release(n, &self.config.retry)
    }

    // === Order lifecycle ===

    /// Places an order for the given line items, all-or-nothing.
    ///
    /// Reservations run item by item; the first denial or error releases every
    /// reservation already granted in this call (in reverse order) before
    /// returning, so a failed purchase leaves no phantom decrements and no
    /// orphaned rows. On success the order is persisted as `Pending` with one
    /// `Valid` ticket per reserved unit, each carrying a fresh QR code.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidArgument`] - No line items, a zero quantity, or
    ///   a ticket type belonging to a different event.
    /// - [`EngineError::UnknownTicketType`] - Unregistered line item.
    /// - [`EngineError::Contention`] - Row lock budget exhausted; retryable
    ///   (granted reservations have been compensated).
    pub fn create_order(
        &self,
        event_id: EventId,
        buyer: &str,
        line_items: &[LineItem],
    ) -> Result<CreateOrderOutcome, EngineError> {
        if line_items.is_empty() {
            return Err(EngineError::InvalidArgument(
                "order must contain at least one line item",
            ));
        }
        if line_items.iter().any(|item| item.quantity == 0) {
            return Err(EngineError::InvalidArgument("quantity must be at least 1"));
        }

        let now = self.clock.now();

        // Forward pass: reserve each line item, keeping the inverse list so a
        // failure can unwind the saga.
        let mut granted: Vec<(Arc<TicketType>, u32)> = Vec::with_capacity(line_items.len());
        let mut total = Decimal::ZERO;
        for item in line_items {
            let row = match self.ticket_type_row(&item.ticket_type_id) {
                Ok(row) => row,
                Err(err) => {
                    self.compensate(&granted);
                    return Err(err);
                }
            };
            if row.event_id() != event_id {
                self.compensate(&granted);
                return Err(EngineError::InvalidArgument(
                    "ticket type does not belong to the event",
                ));
            }
            match row.reserve(item.quantity, now, &self.config.retry) {
                Ok(ReserveOutcome::Granted { unit_price }) => {
                    total += unit_price * Decimal::from(item.quantity);
                    granted.push((row, item.quantity));
                }
                Ok(ReserveOutcome::Denied(reason)) => {
                    self.compensate(&granted);
                    return Ok(CreateOrderOutcome::Denied {
                        ticket_type_id: item.ticket_type_id,
                        reason,
                    });
                }
                Err(err) => {
                    self.compensate(&granted);
                    return Err(err);
                }
            }
        }

        // Every reservation held: issue the order and its tickets.
        let order_id = OrderId(self.order_seq.fetch_add(1, Ordering::Relaxed) + 1);
        let mut ticket_ids = Vec::new();
        for item in line_items {
            for _ in 0..item.quantity {
                let ticket_id = TicketId(self.ticket_seq.fetch_add(1, Ordering::Relaxed) + 1);
                let qr_code = self.claim_qr_code(ticket_id);
                let ticket = Arc::new(Ticket::new(
                    ticket_id,
                    order_id,
                    item.ticket_type_id,
                    item.attendee.clone(),
                    qr_code,
                ));
                self.tickets.insert(ticket_id, ticket);
                ticket_ids.push(ticket_id);
            }
        }
        let order = Arc::new(Order::new(
            order_id,
            event_id,
            buyer.to_string(),
            total,
            now,
            ticket_ids,
        ));
        self.orders.insert(order_id, Arc::clone(&order));
        Ok(CreateOrderOutcome::Placed(self.snapshot_order(&order)))
    }

    /// Transitions an order `Pending -> Paid`. No inventory effect; the units
    /// were claimed at creation.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownOrder`] - No such order.
    /// - [`EngineError::InvalidState`] - Order is not `Pending`.
    /// - [`EngineError::Contention`] - Row lock budget exhausted; retryable.
    pub fn confirm_payment(&self, order_id: OrderId) -> Result<OrderSnapshot, EngineError> {
        let order = self.order_row(&order_id)?;
        order.confirm(&self.config.retry)?;
        Ok(self.snapshot_order(&order))
    }

    /// Cancels an order, cascading to its tickets and returning inventory.
    ///
    /// Tickets still `Valid` become `Cancelled` and their units go back to the
    /// pool. Tickets already `Used` stay `Used`: a consumed entry cannot be
    /// un-consumed, and the cancelled order flag is what surfaces them to
    /// operators for reconciliation.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownOrder`] - No such order.
    /// - [`EngineError::InvalidState`] - Order already `Cancelled`.
    /// - [`EngineError::Contention`] - Order row lock budget exhausted;
    ///   retryable (the cascade has not started).
    pub fn cancel_order(&self, order_id: OrderId) -> Result<OrderSnapshot, EngineError> {
        let order = self.order_row(&order_id)?;
        let ticket_ids = order.cancel(&self.config.retry)?;
        self.cancel_tickets(&ticket_ids);
        Ok(self.snapshot_order(&order))
    }

    /// Cancels every `Pending` order older than the configured reservation
    /// timeout, returning the ids it cancelled. Run periodically so abandoned
    /// checkouts do not starve inventory.
    pub fn sweep_expired(&self) -> Vec<OrderId> {
        let cutoff = self.clock.now() - self.config.reservation_timeout;
        let candidates: Vec<Arc<Order>> = self
            .orders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut cancelled = Vec::new();
        for order in candidates {
            // Contended rows are skipped and picked up by the next sweep.
            if let Ok(Some(ticket_ids)) = order.cancel_if_expired(cutoff, &self.config.retry) {
                self.cancel_tickets(&ticket_ids);
                cancelled.push(order.head().id);
            }
        }
        cancelled.sort();
        cancelled
    }

    // === Check-in ===

    /// Validates a scanned QR code and consumes the ticket at most once.
    ///
    /// Exactly one of any number of concurrent scans of the same `Valid`
    /// ticket returns `Accepted` and appends the acceptance record; all others
    /// observe `Rejected(AlreadyUsed)` with the winner's timestamp. Repeated
    /// scans of a consumed ticket keep returning the same timestamp.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidArgument`] - Malformed code or empty scanner
    ///   identity, rejected before any lookup.
    /// - [`EngineError::Contention`] - Ticket row lock budget exhausted;
    ///   retryable (an uncertain previous attempt that went through will
    ///   surface as `AlreadyUsed`).
    pub fn check_in(&self, code: &str, scanner: &str) -> Result<CheckInOutcome, EngineError> {
        let qr_code = QrCode::parse(code)?;
        if scanner.trim().is_empty() {
            return Err(EngineError::InvalidArgument("scanner identity required"));
        }

        let Some(ticket_id) = self.tickets_by_qr.get(&qr_code).map(|r| *r.value()) else {
            return Ok(CheckInOutcome::Rejected(RejectReason::Unknown));
        };
        let Some(ticket) = self.tickets.get(&ticket_id).map(|r| Arc::clone(r.value())) else {
            return Ok(CheckInOutcome::Rejected(RejectReason::Unknown));
        };

        let now = self.clock.now();
        match ticket.mark_used(now, &self.config.retry)? {
            UseAttempt::Won(snapshot) => {
                self.check_ins.record(CheckInRecord {
                    ticket_id,
                    scanned_at: now,
                    scanner: scanner.to_string(),
                })?;
                Ok(CheckInOutcome::Accepted(snapshot))
            }
            UseAttempt::AlreadyUsed { checked_in_at } => Ok(CheckInOutcome::Rejected(
                RejectReason::AlreadyUsed { checked_in_at },
            )),
            UseAttempt::Cancelled => Ok(CheckInOutcome::Rejected(RejectReason::Cancelled)),
        }
    }

    /// The acceptance log.
    pub fn check_ins(&self) -> &CheckInLog {
        &self.check_ins
    }

    // === Schedule ===

    /// Checks whether a (room, time range) assignment is free, excluding the
    /// session being updated. Advisory: persist through
    /// [`Engine::upsert_session`], which re-validates atomically.
    pub fn validate_session(
        &self,
        exclude: Option<SessionId>,
        room_id: Option<RoomId>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, EngineError> {
        self.schedule.validate(exclude, room_id, start_at, end_at)
    }

    /// Creates or updates a session, admitting the room assignment only if the
    /// slot is still free at persist time.
    pub fn upsert_session(&self, session: Session) -> Result<ScheduleOutcome, EngineError> {
        self.schedule.upsert(session, &self.config.retry)
    }

    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.schedule.session(id)
    }

    /// All sessions, sorted by id.
    pub fn sessions(&self) -> Vec<Session> {
        self.schedule.sessions()
    }

    // === Read access ===

    pub fn ticket_type(&self, id: &TicketTypeId) -> Option<TicketTypeSnapshot> {
        self.ticket_types.get(id).map(|row| row.snapshot())
    }

    /// All ticket types, sorted by id.
    pub fn ticket_types(&self) -> Vec<TicketTypeSnapshot> {
        let mut out: Vec<TicketTypeSnapshot> = self
            .ticket_types
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        out.sort_by_key(|snapshot| snapshot.id.0);
        out
    }

    pub fn order(&self, id: &OrderId) -> Option<OrderSnapshot> {
        self.orders
            .get(id)
            .map(|entry| self.snapshot_order(entry.value()))
    }

    /// All orders, sorted by id.
    pub fn orders(&self) -> Vec<OrderSnapshot> {
        let mut rows: Vec<Arc<Order>> = self
            .orders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        rows.sort_by_key(|order| order.head().id);
        rows.iter().map(|order| self.snapshot_order(order)).collect()
    }

    pub fn ticket(&self, id: &TicketId) -> Option<TicketSnapshot> {
        self.tickets.get(id).map(|entry| entry.value().snapshot())
    }

    pub fn ticket_by_qr(&self, qr_code: &QrCode) -> Option<TicketSnapshot> {
        let ticket_id = *self.tickets_by_qr.get(qr_code)?.value();
        self.ticket(&ticket_id)
    }

    /// All tickets, sorted by id.
    pub fn tickets(&self) -> Vec<TicketSnapshot> {
        let mut out: Vec<TicketSnapshot> = self
            .tickets
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        out.sort_by_key(|snapshot| snapshot.id.0);
        out
    }

    // === Internals ===

    fn ticket_type_row(&self, id: &TicketTypeId) -> Result<Arc<TicketType>, EngineError> {
        self.ticket_types
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::UnknownTicketType(*id))
    }

    fn order_row(&self, id: &OrderId) -> Result<Arc<Order>, EngineError> {
        self.orders
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::UnknownOrder(*id))
    }

    /// Inverse of the forward reservations, applied in reverse order. Uses the
    /// blocking release: giving up here would strand sold units.
    fn compensate(&self, granted: &[(Arc<TicketType>, u32)]) {
        for (row, n) in granted.iter().rev() {
            row.release_blocking(*n);
        }
    }

    /// Flips every still-`Valid` ticket to `Cancelled` and returns the freed
    /// units per ticket type. Tickets that concurrently became `Used` keep
    /// their unit.
    fn cancel_tickets(&self, ticket_ids: &[TicketId]) {
        let mut to_release: HashMap<TicketTypeId, u32> = HashMap::new();
        for ticket_id in ticket_ids {
            if let Some(ticket) = self.tickets.get(ticket_id) {
                if let Some(ticket_type_id) = ticket.value().cancel_if_valid() {
                    *to_release.entry(ticket_type_id).or_insert(0) += 1;
                }
            }
        }
        for (ticket_type_id, n) in to_release {
            if let Some(row) = self.ticket_types.get(&ticket_type_id) {
                row.value().release_blocking(n);
            }
        }
    }

    /// Generates a QR code and atomically claims it in the lookup index.
    /// Regenerates on the (astronomically unlikely) collision.
    fn claim_qr_code(&self, ticket_id: TicketId) -> QrCode {
        loop {
            let candidate = QrCode::generate();
            match self.tickets_by_qr.entry(candidate.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    entry.insert(ticket_id);
                    return candidate;
                }
            }
        }
    }

    fn snapshot_order(&self, order: &Order) -> OrderSnapshot {
        let head = order.head();
        let tickets = head
            .ticket_ids
            .iter()
            .filter_map(|ticket_id| self.ticket(ticket_id))
            .collect();
        OrderSnapshot {
            id: head.id,
            event_id: head.event_id,
            buyer: head.buyer,
            status: head.status,
            total: head.total,
            created_at: head.created_at,
            tickets,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
