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

use boxoffice_rs::{Engine, EventId, LineItem, OrderId, TicketId, TicketTypeDef, TicketTypeId};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;

/// All rows in one run belong to a single implicit event.
const EVENT: EventId = EventId(1);

/// Boxoffice - Process ticketing operation CSV files
///
/// Reads operations from a CSV file, runs them through the ticketing engine,
/// and outputs the resulting state to stdout.
#[derive(Parser, Debug)]
#[command(name = "boxoffice-rs")]
#[command(about = "A ticketing engine that processes operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,ticket_type,order,ticket,quantity,price,who
    /// Example: cargo run -- operations.csv > tickets.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Which table to write to stdout
    #[arg(long, value_enum, default_value = "tickets")]
    output: Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    /// Issued tickets with status and check-in timestamps
    Tickets,
    /// Inventory counters per ticket type
    Inventory,
    /// Accepted scans in acceptance order
    Checkins,
}

fn main() {
    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match process_operations(BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    let result = match args.output {
        Output::Tickets => write_tickets(&engine, std::io::stdout()),
        Output::Inventory => write_inventory(&engine, std::io::stdout()),
        Output::Checkins => write_check_ins(&engine, std::io::stdout()),
    };
    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, ticket_type, order, ticket, quantity, price, who`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    ticket_type: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    order: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    ticket: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    quantity: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    price: Option<Decimal>,
    who: Option<String>,
}

/// One parsed operation.
#[derive(Debug)]
enum Operation {
    /// Register a ticket type with an always-open sales window.
    Open {
        ticket_type: TicketTypeId,
        quantity_total: u32,
        price: Decimal,
    },
    /// Place and keep a pending order for one line item.
    Purchase {
        ticket_type: TicketTypeId,
        quantity: u32,
        who: String,
    },
    Confirm {
        order: OrderId,
    },
    Cancel {
        order: OrderId,
    },
    /// Scan a ticket issued earlier in this run.
    CheckIn {
        ticket: TicketId,
        who: String,
    },
    Sweep,
}

impl CsvRecord {
    /// Converts a CSV record to an operation.
    ///
    /// Returns `None` for unknown operations or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        let who = self.who.filter(|w| !w.is_empty());
        match self.op.to_lowercase().as_str() {
            "open" => Some(Operation::Open {
                ticket_type: TicketTypeId(self.ticket_type?),
                quantity_total: self.quantity?,
                price: self.price.unwrap_or(Decimal::ZERO),
            }),
            "purchase" => Some(Operation::Purchase {
                ticket_type: TicketTypeId(self.ticket_type?),
                quantity: self.quantity?,
                who: who.unwrap_or_else(|| "anonymous".to_string()),
            }),
            "confirm" => Some(Operation::Confirm {
                order: OrderId(self.order?),
            }),
            "cancel" => Some(Operation::Cancel {
                order: OrderId(self.order?),
            }),
            "checkin" => Some(Operation::CheckIn {
                ticket: TicketId(self.ticket?),
                who: who.unwrap_or_else(|| "gate".to_string()),
            }),
            "sweep" => Some(Operation::Sweep),
            _ => None,
        }
    }
}

/// Process operations from a CSV reader.
///
/// Streaming: rows are applied to the engine as they are parsed, so order ids
/// and ticket ids are assigned in row order (orders and tickets both count up
/// from 1) and later rows can reference them. Malformed rows and operations
/// the engine denies or rejects are skipped.
///
/// # CSV Format
///
/// Expected columns: `op, ticket_type, order, ticket, quantity, price, who`
/// - `op`: Operation (open, purchase, confirm, cancel, checkin, sweep)
/// - `ticket_type`: Ticket type ID (open, purchase)
/// - `order`: Order ID (confirm, cancel)
/// - `ticket`: Ticket ID (checkin)
/// - `quantity`: Pool size for open, units for purchase
/// - `price`: Unit price (open; defaults to 0)
/// - `who`: Buyer/attendee for purchase, scanner identity for checkin
///
/// # Example
///
/// ```csv
/// op,ticket_type,order,ticket,quantity,price,who
/// open,1,,,100,25.00,
/// purchase,1,,,2,,ada
/// confirm,,1,,,,
/// checkin,,,1,,,gate-a
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
/// Individual operation failures are logged in debug mode but don't stop
/// processing.
pub fn process_operations<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let engine = Engine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(operation) = record.into_operation() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid operation record");
                    continue;
                };
                if let Err(_e) = apply(&engine, operation) {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping operation: {}", _e);
                }
            }
            Err(_e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", _e);
                continue;
            }
        }
    }

    Ok(engine)
}

fn apply(engine: &Engine, operation: Operation) -> Result<(), boxoffice_rs::EngineError> {
    match operation {
        Operation::Open {
            ticket_type,
            quantity_total,
            price,
        } => {
            // Batch runs are not time-boxed: register an always-open window.
            engine.register_ticket_type(TicketTypeDef {
                id: ticket_type,
                event_id: EVENT,
                price,
                quantity_total,
                sales_start: DateTime::<Utc>::MIN_UTC,
                sales_end: DateTime::<Utc>::MAX_UTC,
            })
        }
        Operation::Purchase {
            ticket_type,
            quantity,
            who,
        } => {
            let line_items = [LineItem {
                ticket_type_id: ticket_type,
                quantity,
                attendee: who.clone(),
            }];
            // Denials (sold out) are ordinary outcomes; the row simply
            // produces no tickets.
            engine.create_order(EVENT, &who, &line_items).map(|_| ())
        }
        Operation::Confirm { order } => engine.confirm_payment(order).map(|_| ()),
        Operation::Cancel { order } => engine.cancel_order(order).map(|_| ()),
        Operation::CheckIn { ticket, who } => {
            let snapshot = engine
                .ticket(&ticket)
                .ok_or(boxoffice_rs::EngineError::InvalidArgument("unknown ticket"))?;
            engine.check_in(snapshot.qr_code.as_str(), &who).map(|_| ())
        }
        Operation::Sweep => {
            engine.sweep_expired();
            Ok(())
        }
    }
}

/// Write issued tickets to a CSV writer.
///
/// Columns: `id, order_id, ticket_type_id, holder, qr_code, status, checked_in_at`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_tickets<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for ticket in engine.tickets() {
        wtr.serialize(&ticket)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write inventory counters to a CSV writer.
///
/// Columns: `id, event_id, price, quantity_total, quantity_sold, remaining,
/// sales_start, sales_end`
pub fn write_inventory<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for ticket_type in engine.ticket_types() {
        wtr.serialize(&ticket_type)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write accepted scans in acceptance order to a CSV writer.
///
/// Columns: `ticket_id, scanned_at, scanner`
pub fn write_check_ins<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for record in engine.check_ins().drain_ordered() {
        wtr.serialize(record.as_ref())?;
    }
    wtr.flush()?;
    Ok(())
}
