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

//! Benchmarks for the ticketing engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded reservation and purchase throughput
//! - Multi-threaded reservation contention on one pool
//! - Parallel gate scans
//! - Schedule validation as the board grows

use boxoffice_rs::{
    Engine, EventId, LineItem, RoomId, Session, SessionId, TicketTypeDef, TicketTypeId,
};
use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal_macros::dec;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_pool(engine: &Engine, id: u32, total: u32) {
    engine
        .register_ticket_type(TicketTypeDef {
            id: TicketTypeId(id),
            event_id: EventId(1),
            price: dec!(25.00),
            quantity_total: total,
            sales_start: Utc::now() - Duration::hours(1),
            sales_end: Utc::now() + Duration::hours(24),
        })
        .unwrap();
}

fn line_item(id: u32, quantity: u32) -> LineItem {
    LineItem {
        ticket_type_id: TicketTypeId(id),
        quantity,
        attendee: "Attendee".to_string(),
    }
}

fn session(id: u32, room: u32, start_hour: i64) -> Session {
    let base = Utc::now();
    Session {
        id: SessionId(id),
        event_id: EventId(1),
        room_id: Some(RoomId(room)),
        start_at: base + Duration::hours(start_hour),
        end_at: base + Duration::hours(start_hour + 1),
    }
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_single_reserve(c: &mut Criterion) {
    c.bench_function("single_reserve", |b| {
        b.iter(|| {
            let engine = Engine::new();
            open_pool(&engine, 1, 1000);
            engine.reserve(black_box(TicketTypeId(1)), 1).unwrap();
        })
    });
}

fn bench_reserve_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_throughput");

    for count in [100u32, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = Engine::new();
                open_pool(&engine, 1, count);
                for _ in 0..count {
                    engine.reserve(TicketTypeId(1), 1).unwrap();
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_create_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_order");

    group.bench_function("single_item", |b| {
        b.iter(|| {
            let engine = Engine::new();
            open_pool(&engine, 1, 100);
            engine
                .create_order(EventId(1), "buyer", &[line_item(1, 2)])
                .unwrap();
        })
    });

    group.bench_function("multi_item", |b| {
        b.iter(|| {
            let engine = Engine::new();
            for id in 1..=5 {
                open_pool(&engine, id, 100);
            }
            let items: Vec<LineItem> = (1..=5).map(|id| line_item(id, 2)).collect();
            engine.create_order(EventId(1), "buyer", &items).unwrap();
        })
    });

    group.finish();
}

fn bench_purchase_lifecycle(c: &mut Criterion) {
    c.bench_function("purchase_confirm_checkin", |b| {
        b.iter(|| {
            let engine = Engine::new();
            open_pool(&engine, 1, 10);
            let outcome = engine
                .create_order(EventId(1), "buyer", &[line_item(1, 1)])
                .unwrap();
            let boxoffice_rs::CreateOrderOutcome::Placed(order) = outcome else {
                unreachable!("pool has room");
            };
            engine.confirm_payment(order.id).unwrap();
            engine
                .check_in(order.tickets[0].qr_code.as_str(), "gate-a")
                .unwrap();
        })
    });
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_reserve_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_reserve_contention");

    for count in [1_000u32, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = Engine::new();
                // All requests hammer the same pool; half are denied.
                open_pool(&engine, 1, count / 2);
                (0..count).into_par_iter().for_each(|_| {
                    let _ = engine.reserve(TicketTypeId(1), 1);
                });
                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_parallel_reserve_different_pools(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_reserve_different_pools");

    for count in [1_000u32, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = Engine::new();
                for id in 1..=100 {
                    open_pool(&engine, id, count);
                }
                (0..count).into_par_iter().for_each(|i| {
                    let id = i % 100 + 1;
                    engine.reserve(TicketTypeId(id), 1).unwrap();
                });
                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_parallel_checkin(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_checkin");

    for count in [100u32, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || {
                    // Setup: issue `count` tickets.
                    let engine = Engine::new();
                    open_pool(&engine, 1, count);
                    let outcome = engine
                        .create_order(EventId(1), "buyer", &[line_item(1, count)])
                        .unwrap();
                    let boxoffice_rs::CreateOrderOutcome::Placed(order) = outcome else {
                        unreachable!("pool has room");
                    };
                    let codes: Vec<String> = order
                        .tickets
                        .iter()
                        .map(|t| t.qr_code.as_str().to_string())
                        .collect();
                    (engine, codes)
                },
                |(engine, codes)| {
                    codes.par_iter().for_each(|code| {
                        engine.check_in(code, "gate-a").unwrap();
                    });
                    black_box(&engine);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_sellout_race(c: &mut Criterion) {
    c.bench_function("sellout_race", |b| {
        b.iter(|| {
            let engine = Engine::new();
            open_pool(&engine, 1, 100);
            // 1000 buyers race for 100 units.
            (0..1_000).into_par_iter().for_each(|_| {
                let _ = engine.create_order(EventId(1), "buyer", &[line_item(1, 1)]);
            });
            black_box(&engine);
        })
    });
}

// =============================================================================
// Schedule Benchmarks
// =============================================================================

fn bench_schedule_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_validate");

    for board_size in [10u32, 100, 1_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(board_size),
            board_size,
            |b, &board_size| {
                b.iter_batched(
                    || {
                        let engine = Engine::new();
                        // Non-overlapping sessions spread over 10 rooms.
                        for i in 0..board_size {
                            engine
                                .upsert_session(session(i, i % 10, (i / 10) as i64 * 2))
                                .unwrap();
                        }
                        engine
                    },
                    |engine| {
                        let probe = session(u32::MAX, 5, 1);
                        let outcome = engine
                            .validate_session(
                                None,
                                probe.room_id,
                                probe.start_at,
                                probe.end_at,
                            )
                            .unwrap();
                        black_box(outcome);
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    single_threaded,
    bench_single_reserve,
    bench_reserve_throughput,
    bench_create_order,
    bench_purchase_lifecycle,
);

criterion_group!(
    multi_threaded,
    bench_parallel_reserve_contention,
    bench_parallel_reserve_different_pools,
    bench_parallel_checkin,
    bench_sellout_race,
);

criterion_group!(schedule, bench_schedule_validate,);

criterion_main!(single_threaded, multi_threaded, schedule);
