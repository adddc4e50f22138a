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

//! # Boxoffice
//!
//! This library provides a ticketing engine for event inventory allocation and
//! check-in validation: reserving finite, time-boxed ticket inventory under
//! concurrency, issuing orders and QR-coded tickets, consuming tickets exactly
//! once at the gate, and admitting session room assignments only into free
//! slots.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central façade managing inventory, orders, check-ins, and the
//!   session schedule
//! - [`TicketTypeDef`] / [`ReserveOutcome`]: Inventory pool registration and
//!   admission results
//! - [`CreateOrderOutcome`] / [`OrderSnapshot`]: Purchase results
//! - [`CheckInOutcome`]: Gate scan results
//! - [`ScheduleOutcome`] / [`Session`]: Room schedule admission
//! - [`EngineError`]: Errors distinct from business denials
//!
//! ## Example
//!
//! ```
//! use boxoffice_rs::{CreateOrderOutcome, Engine, EventId, LineItem, TicketTypeDef, TicketTypeId};
//! use chrono::{Duration, Utc};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! engine
//!     .register_ticket_type(TicketTypeDef {
//!         id: TicketTypeId(1),
//!         event_id: EventId(1),
//!         price: dec!(25.00),
//!         quantity_total: 100,
//!         sales_start: Utc::now() - Duration::hours(1),
//!         sales_end: Utc::now() + Duration::hours(1),
//!     })
//!     .unwrap();
//!
//! // Place an order for two tickets.
//! let outcome = engine
//!     .create_order(
//!         EventId(1),
//!         "ada@example.com",
//!         &[LineItem {
//!             ticket_type_id: TicketTypeId(1),
//!             quantity: 2,
//!             attendee: "Ada".to_string(),
//!         }],
//!     )
//!     .unwrap();
//!
//! let CreateOrderOutcome::Placed(order) = outcome else {
//!     panic!("sold out");
//! };
//! assert_eq!(order.tickets.len(), 2);
//! assert_eq!(order.total, dec!(50.00));
//!
//! // Scan one of the tickets at the gate.
//! let scan = engine
//!     .check_in(order.tickets[0].qr_code.as_str(), "gate-a")
//!     .unwrap();
//! assert!(scan.is_accepted());
//! ```
//!
//! ## Thread Safety
//!
//! All coordination happens through per-row guarded updates: concurrent
//! reservations of the last unit, concurrent scans of the same QR code, and
//! concurrent claims on the same room slot each admit exactly one winner.

mod base;
mod checkin;
mod engine;
pub mod error;
mod inventory;
mod order;
mod retry;
mod schedule;

pub use base::{
    Clock, EventId, ManualClock, OrderId, QrCode, RoomId, SessionId, SystemClock, TicketId,
    TicketTypeId,
};
pub use checkin::{CheckInLog, CheckInOutcome, CheckInRecord, RejectReason};
pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use inventory::{DenyReason, ReserveOutcome, TicketType, TicketTypeDef, TicketTypeSnapshot};
pub use order::{
    CreateOrderOutcome, LineItem, Order, OrderSnapshot, OrderStatus, Ticket, TicketSnapshot,
    TicketStatus,
};
pub use retry::RetryPolicy;
pub use schedule::{ScheduleBoard, ScheduleOutcome, Session};
