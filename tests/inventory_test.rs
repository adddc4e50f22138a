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

//! Inventory ledger public API integration tests.

use boxoffice_rs::{
    DenyReason, Engine, EngineConfig, EngineError, EventId, ManualClock, ReserveOutcome,
    TicketTypeDef, TicketTypeId,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;

// === Helper Functions ===

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

fn engine_at_noon() -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(noon()));
    let engine = Engine::with_config(EngineConfig::default(), clock.clone());
    (engine, clock)
}

fn open_pool(engine: &Engine, id: u32, total: u32) {
    engine
        .register_ticket_type(TicketTypeDef {
            id: TicketTypeId(id),
            event_id: EventId(1),
            price: dec!(25.00),
            quantity_total: total,
            sales_start: noon() - Duration::hours(1),
            sales_end: noon() + Duration::hours(1),
        })
        .unwrap();
}

// === Reservation ===

#[test]
fn reserve_grants_within_capacity() {
    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, 10);

    let outcome = engine.reserve(TicketTypeId(1), 4).unwrap();
    assert_eq!(
        outcome,
        ReserveOutcome::Granted {
            unit_price: dec!(25.00)
        }
    );

    let snapshot = engine.ticket_type(&TicketTypeId(1)).unwrap();
    assert_eq!(snapshot.quantity_sold, 4);
    assert_eq!(snapshot.remaining, 6);
}

#[test]
fn reserve_denied_when_sold_out() {
    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, 3);

    engine.reserve(TicketTypeId(1), 3).unwrap();
    let outcome = engine.reserve(TicketTypeId(1), 1).unwrap();
    assert_eq!(
        outcome,
        ReserveOutcome::Denied(DenyReason::SoldOut { remaining: 0 })
    );

    // Denial changed nothing.
    assert_eq!(engine.ticket_type(&TicketTypeId(1)).unwrap().quantity_sold, 3);
}

#[test]
fn reserve_denied_outside_sales_window() {
    let (engine, clock) = engine_at_noon();
    open_pool(&engine, 1, 10);

    clock.set(noon() - Duration::hours(2));
    assert_eq!(
        engine.reserve(TicketTypeId(1), 1).unwrap(),
        ReserveOutcome::Denied(DenyReason::OutsideSalesWindow)
    );

    clock.set(noon() + Duration::hours(2));
    assert_eq!(
        engine.reserve(TicketTypeId(1), 1).unwrap(),
        ReserveOutcome::Denied(DenyReason::OutsideSalesWindow)
    );

    assert_eq!(engine.ticket_type(&TicketTypeId(1)).unwrap().quantity_sold, 0);
}

#[test]
fn reserve_zero_units_is_invalid_argument() {
    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, 10);

    let result = engine.reserve(TicketTypeId(1), 0);
    assert_eq!(
        result,
        Err(EngineError::InvalidArgument("quantity must be at least 1"))
    );
}

#[test]
fn reserve_unknown_ticket_type() {
    let (engine, _clock) = engine_at_noon();
    let result = engine.reserve(TicketTypeId(42), 1);
    assert_eq!(result, Err(EngineError::UnknownTicketType(TicketTypeId(42))));
}

// === Registration ===

#[test]
fn duplicate_registration_rejected() {
    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, 10);

    let result = engine.register_ticket_type(TicketTypeDef {
        id: TicketTypeId(1),
        event_id: EventId(1),
        price: dec!(10.00),
        quantity_total: 5,
        sales_start: noon(),
        sales_end: noon() + Duration::hours(1),
    });
    assert_eq!(result, Err(EngineError::DuplicateTicketType(TicketTypeId(1))));

    // Original registration untouched.
    assert_eq!(engine.ticket_type(&TicketTypeId(1)).unwrap().quantity_total, 10);
}

#[test]
fn inverted_sales_window_rejected() {
    let (engine, _clock) = engine_at_noon();
    let result = engine.register_ticket_type(TicketTypeDef {
        id: TicketTypeId(1),
        event_id: EventId(1),
        price: dec!(10.00),
        quantity_total: 5,
        sales_start: noon(),
        sales_end: noon(),
    });
    assert_eq!(
        result,
        Err(EngineError::InvalidArgument(
            "sales window must satisfy start < end"
        ))
    );
}

// === Release ===

#[test]
fn release_restores_reserved_units_exactly() {
    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, 10);

    engine.reserve(TicketTypeId(1), 3).unwrap();
    let released = engine.release(TicketTypeId(1), 3).unwrap();
    assert_eq!(released, 3);
    assert_eq!(engine.ticket_type(&TicketTypeId(1)).unwrap().quantity_sold, 0);
}

#[test]
fn release_floors_at_zero() {
    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, 10);

    engine.reserve(TicketTypeId(1), 2).unwrap();
    let released = engine.release(TicketTypeId(1), 7).unwrap();
    assert_eq!(released, 2);
    assert_eq!(engine.ticket_type(&TicketTypeId(1)).unwrap().quantity_sold, 0);
}

#[test]
fn release_zero_units_is_invalid_argument() {
    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, 10);
    assert!(engine.release(TicketTypeId(1), 0).is_err());
}

#[test]
fn released_units_can_be_reserved_again() {
    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, 1);

    engine.reserve(TicketTypeId(1), 1).unwrap();
    assert!(!engine.reserve(TicketTypeId(1), 1).unwrap().is_granted());

    engine.release(TicketTypeId(1), 1).unwrap();
    assert!(engine.reserve(TicketTypeId(1), 1).unwrap().is_granted());
}

// === Concurrency ===

#[test]
fn concurrent_reserves_never_oversell() {
    const TOTAL: u32 = 100;
    const THREADS: usize = 8;
    const ATTEMPTS_PER_THREAD: usize = 50;

    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, TOTAL);
    let engine = Arc::new(engine);

    let mut handles = Vec::with_capacity(THREADS);
    for _ in 0..THREADS {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let mut granted = 0u32;
            for _ in 0..ATTEMPTS_PER_THREAD {
                match engine.reserve(TicketTypeId(1), 1) {
                    Ok(outcome) if outcome.is_granted() => granted += 1,
                    Ok(_) => {}
                    Err(err) => assert!(err.is_retryable(), "unexpected error: {err}"),
                }
            }
            granted
        }));
    }

    let granted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // 400 attempts raced for 100 units: every unit went to exactly one caller.
    assert_eq!(granted, TOTAL);
    let snapshot = engine.ticket_type(&TicketTypeId(1)).unwrap();
    assert_eq!(snapshot.quantity_sold, TOTAL);
    assert_eq!(snapshot.remaining, 0);
}

#[test]
fn concurrent_reserve_release_stays_within_bounds() {
    const TOTAL: u32 = 20;
    const THREADS: usize = 6;

    let (engine, _clock) = engine_at_noon();
    open_pool(&engine, 1, TOTAL);
    let engine = Arc::new(engine);

    let mut handles = Vec::with_capacity(THREADS);
    for i in 0..THREADS {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                if i % 2 == 0 {
                    let _ = engine.reserve(TicketTypeId(1), 2);
                } else {
                    let _ = engine.release(TicketTypeId(1), 1);
                }
                let snapshot = engine.ticket_type(&TicketTypeId(1)).unwrap();
                assert!(snapshot.quantity_sold <= snapshot.quantity_total);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
